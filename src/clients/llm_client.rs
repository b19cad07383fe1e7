//! 推理服务客户端
//!
//! 纯 I/O 边界：一次请求对应一次模型往返，不做重试也不含业务逻辑。
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 兼容 OpenAI API 的服务（Ollama、vLLM 等）

use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::LlmConfig;
use crate::error::ServiceError;

/// 模型返回空内容时使用的占位标记
pub const EMPTY_RESPONSE_MARKER: &str = "<empty/>";

/// 推理服务接口
///
/// `JudgmentEngine` 只依赖这个 trait，测试中可以替换为脚本化的实现。
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// 发送一条 user 消息，返回模型的原始文本
    async fn evaluate(&self, model: &str, prompt: &str) -> Result<String, ServiceError>;

    /// 列出服务上可用的模型
    async fn list_models(&self) -> Result<Vec<String>, ServiceError>;
}

/// 基于 async-openai 的客户端
pub struct OpenAiCompatibleClient {
    client: Client<OpenAIConfig>,
    api_base_url: String,
    temperature: f32,
    timeout: Duration,
}

impl OpenAiCompatibleClient {
    /// 创建新的客户端
    pub fn new(config: &LlmConfig) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.api_key)
            .with_api_base(&config.api_base_url);

        Self {
            client: Client::with_config(openai_config),
            api_base_url: config.api_base_url.clone(),
            temperature: config.temperature,
            timeout: config.request_timeout_duration(),
        }
    }

    fn map_error(&self, model: &str, err: OpenAIError) -> ServiceError {
        match err {
            OpenAIError::ApiError(api) => ServiceError::BadStatus {
                model: model.to_string(),
                message: api.message,
            },
            OpenAIError::InvalidArgument(message) => ServiceError::InvalidRequest(message),
            other => ServiceError::Connection {
                endpoint: self.api_base_url.clone(),
                message: other.to_string(),
            },
        }
    }
}

#[async_trait]
impl InferenceClient for OpenAiCompatibleClient {
    async fn evaluate(&self, model: &str, prompt: &str) -> Result<String, ServiceError> {
        debug!("调用推理服务，模型: {}, 提示词长度: {} 字符", model, prompt.len());

        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt)
            .build()
            .map_err(|e| ServiceError::InvalidRequest(e.to_string()))?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(vec![ChatCompletionRequestMessage::User(user_msg)])
            .temperature(self.temperature)
            .build()
            .map_err(|e| ServiceError::InvalidRequest(e.to_string()))?;

        let response = tokio::time::timeout(self.timeout, self.client.chat().create(request))
            .await
            .map_err(|_| ServiceError::Timeout {
                model: model.to_string(),
                seconds: self.timeout.as_secs_f64(),
            })?
            .map_err(|e| {
                warn!("推理服务调用失败: {}", e);
                self.map_error(model, e)
            })?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .filter(|content| !content.trim().is_empty())
            .unwrap_or_else(|| EMPTY_RESPONSE_MARKER.to_string());

        debug!("推理服务调用成功，响应长度: {} 字符", content.len());
        Ok(content)
    }

    async fn list_models(&self) -> Result<Vec<String>, ServiceError> {
        let response = tokio::time::timeout(self.timeout, self.client.models().list())
            .await
            .map_err(|_| ServiceError::Timeout {
                model: "<list>".to_string(),
                seconds: self.timeout.as_secs_f64(),
            })?
            .map_err(|e| self.map_error("<list>", e))?;

        Ok(response
            .data
            .into_iter()
            .map(|model| model.id)
            .filter(|id| !id.is_empty())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_config() -> LlmConfig {
        LlmConfig {
            api_base_url: "http://localhost:11434/v1".to_string(),
            ..Default::default()
        }
    }

    /// 需要本地运行 Ollama：
    /// ```bash
    /// cargo test test_list_models_against_local_service -- --ignored --nocapture
    /// ```
    #[tokio::test]
    #[ignore]
    async fn test_list_models_against_local_service() {
        let _ = tracing_subscriber::fmt::try_init();

        let client = OpenAiCompatibleClient::new(&local_config());
        let models = client.list_models().await.expect("无法列出模型");
        println!("可用模型: {:?}", models);
        assert!(!models.is_empty());
    }

    #[tokio::test]
    #[ignore]
    async fn test_evaluate_against_local_service() {
        let _ = tracing_subscriber::fmt::try_init();

        let client = OpenAiCompatibleClient::new(&local_config());
        let models = client.list_models().await.expect("无法列出模型");
        let response = client
            .evaluate(&models[0], "Reply with the single word: pong")
            .await
            .expect("推理调用失败");
        println!("模型响应: {}", response);
        assert!(!response.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_service_is_service_error() {
        let config = LlmConfig {
            api_base_url: "http://127.0.0.1:9/v1".to_string(),
            request_timeout: 5.0,
            ..Default::default()
        };
        let client = OpenAiCompatibleClient::new(&config);
        let result = client.evaluate("any-model", "hello").await;
        assert!(result.is_err());
    }
}
