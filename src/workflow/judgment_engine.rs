//! 单篇论文判断流程 - 流程层
//!
//! 把一篇论文变成一个 [`PaperResult`]：构建提示词 → 调用模型 → 解析响应，
//! 失败按配置的次数重试。本流程永远不会返回错误，重试耗尽时给出 Unknown 结果。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::OnceCell;
use tokio::time::sleep;
use tracing::{debug, error, info, warn, Instrument, Span};

use crate::clients::InferenceClient;
use crate::config::{LlmConfig, SurveyConfig};
use crate::error::ServiceError;
use crate::models::judgment::{Judgment, PaperResult};
use crate::models::paper::Paper;
use crate::services::{PromptBuilder, ResponseParser};
use crate::utils::logging::truncate_text;

/// 重试耗尽时的兜底说明
pub const EXHAUSTED_REASONING: &str =
    "Failed to get valid LLM response after multiple attempts - unable to determine relevance";

/// 单次尝试失败的原因
#[derive(Debug)]
enum AttemptError {
    Service(ServiceError),
    Parse {
        error: crate::error::ParseError,
        response: String,
    },
}

impl std::fmt::Display for AttemptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptError::Service(e) => write!(f, "{}", e),
            AttemptError::Parse { error, .. } => write!(f, "{}", error),
        }
    }
}

/// 判断引擎
pub struct JudgmentEngine {
    client: Arc<dyn InferenceClient>,
    parser: ResponseParser,
    prompts: PromptBuilder,
    configured_model: String,
    /// 启动检查后实际使用的模型
    model: OnceCell<String>,
    max_retries: u32,
    retry_delay: Duration,
    span: Span,
}

impl JudgmentEngine {
    pub fn new(
        client: Arc<dyn InferenceClient>,
        survey: &SurveyConfig,
        llm: &LlmConfig,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            client,
            parser: ResponseParser::new()?,
            prompts: PromptBuilder::new(survey),
            configured_model: llm.model_name.clone(),
            model: OnceCell::new(),
            max_retries: llm.max_retries.max(1),
            retry_delay: llm.retry_delay_duration(),
            span: tracing::info_span!("judge", topic = %survey.topic),
        })
    }

    /// 确认模型可用（只执行一次）
    ///
    /// 配置的模型不在服务列表中时改用第一个可用模型；服务上没有任何模型时返回错误。
    pub async fn ensure_ready(&self) -> Result<&str, ServiceError> {
        let model = self
            .model
            .get_or_try_init(|| self.resolve_model().instrument(self.span.clone()))
            .await?;
        Ok(model.as_str())
    }

    async fn resolve_model(&self) -> Result<String, ServiceError> {
        info!("🔌 检查推理服务，配置模型: {}", self.configured_model);

        let available = self.client.list_models().await?;
        debug!("可用模型: {:?}", available);

        if available.iter().any(|m| m == &self.configured_model) {
            info!("✓ 模型可用: {}", self.configured_model);
            return Ok(self.configured_model.clone());
        }

        warn!("⚠️ 模型 {} 不在可用模型列表中", self.configured_model);
        match available.into_iter().next() {
            Some(first) => {
                warn!("⚠️ 改用第一个可用模型: {}", first);
                Ok(first)
            }
            None => {
                error!("❌ 推理服务上没有可用模型");
                Err(ServiceError::NoModelsAvailable)
            }
        }
    }

    /// 当前使用的模型（未做启动检查时为配置的模型）
    pub fn model(&self) -> &str {
        self.model
            .get()
            .map(String::as_str)
            .unwrap_or(self.configured_model.as_str())
    }

    /// 判断单篇论文，不会失败
    pub async fn judge_one(&self, paper: &Paper) -> PaperResult {
        self.judge_with_retry(paper)
            .instrument(self.span.clone())
            .await
    }

    async fn judge_with_retry(&self, paper: &Paper) -> PaperResult {
        let prompt = self.prompts.build(paper);

        for attempt in 1..=self.max_retries {
            match self.attempt(&prompt).await {
                Ok(judgment) => return PaperResult::new(paper, judgment),
                Err(e) => {
                    warn!(
                        "尝试 {}/{} 失败 [{}]: {}",
                        attempt,
                        self.max_retries,
                        truncate_text(&paper.title, 60),
                        e
                    );
                    if let AttemptError::Parse { response, .. } = &e {
                        debug!("完整响应 ({} 字符): {:?}", response.len(), response);
                    }

                    if attempt < self.max_retries {
                        info!("⏳ {:.1} 秒后重试...", self.retry_delay.as_secs_f64());
                        sleep(self.retry_delay).await;
                    }
                }
            }
        }

        error!(
            "❌ 全部 {} 次尝试失败，标记为 Unknown: {}",
            self.max_retries,
            truncate_text(&paper.title, 60)
        );
        PaperResult::new(paper, Judgment::unknown(EXHAUSTED_REASONING))
    }

    async fn attempt(&self, prompt: &str) -> Result<Judgment, AttemptError> {
        let response = self
            .client
            .evaluate(self.model(), prompt)
            .await
            .map_err(AttemptError::Service)?;

        self.parser
            .parse(&response)
            .map_err(|error| AttemptError::Parse { error, response })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::judgment::RelevanceRating;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// 按顺序返回预设响应的客户端
    struct ScriptedClient {
        models: Vec<String>,
        responses: Mutex<VecDeque<Result<String, ServiceError>>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedClient {
        fn new(responses: Vec<Result<String, ServiceError>>) -> Self {
            Self {
                models: vec!["test-model".to_string()],
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl InferenceClient for ScriptedClient {
        async fn evaluate(&self, model: &str, _prompt: &str) -> Result<String, ServiceError> {
            self.calls.lock().unwrap().push(model.to_string());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok("no json here".to_string()))
        }

        async fn list_models(&self) -> Result<Vec<String>, ServiceError> {
            Ok(self.models.clone())
        }
    }

    fn paper() -> Paper {
        Paper {
            title: "Retrieval-Augmented Generation at Scale".to_string(),
            authors: vec!["Grace".to_string()],
            abstract_text: Some("We scale RAG.".to_string()),
            publication_year: 2024,
            conference_name: "ACL".to_string(),
            venue_type: "conference".to_string(),
            track: None,
            session: None,
            topic: None,
            pdf_url: None,
            abstract_url: None,
            openreview_url: None,
            scraped_at: NaiveDate::from_ymd_opt(2024, 6, 1)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
        }
    }

    fn engine(client: Arc<ScriptedClient>, max_retries: u32) -> JudgmentEngine {
        let survey = SurveyConfig {
            topic: "Retrieval-augmented generation".to_string(),
            description: String::new(),
        };
        let llm = LlmConfig {
            model_name: "test-model".to_string(),
            max_retries,
            retry_delay: 0.0,
            ..Default::default()
        };
        JudgmentEngine::new(client, &survey, &llm).unwrap()
    }

    const GOOD: &str = r#"{"relevance_rating": "High", "confidence_score": 0.9, "reasoning": "Core RAG contribution."}"#;

    #[tokio::test]
    async fn test_first_valid_response_wins() {
        let client = Arc::new(ScriptedClient::new(vec![Ok(GOOD.to_string())]));
        let result = engine(client.clone(), 3).judge_one(&paper()).await;

        assert_eq!(result.rating(), RelevanceRating::High);
        assert_eq!(result.title, "Retrieval-Augmented Generation at Scale");
        assert_eq!(result.conference, "ACL");
        assert!(result.file_source.is_empty());
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_service_and_parse_failures() {
        let client = Arc::new(ScriptedClient::new(vec![
            Err(ServiceError::Timeout {
                model: "test-model".to_string(),
                seconds: 1.0,
            }),
            Ok("I cannot decide.".to_string()),
            Ok(GOOD.to_string()),
        ]));
        let result = engine(client.clone(), 3).judge_one(&paper()).await;

        assert_eq!(result.rating(), RelevanceRating::High);
        assert_eq!(client.call_count(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_yield_unknown() {
        let client = Arc::new(ScriptedClient::new(vec![
            Ok("garbage".to_string()),
            Ok("<empty/>".to_string()),
        ]));
        let result = engine(client.clone(), 2).judge_one(&paper()).await;

        assert_eq!(result.rating(), RelevanceRating::Unknown);
        assert_eq!(result.judgment.confidence_score, Some(0.0));
        assert_eq!(result.judgment.reasoning.as_deref(), Some(EXHAUSTED_REASONING));
        assert_eq!(client.call_count(), 2);
    }

    #[tokio::test]
    async fn test_ensure_ready_falls_back_to_first_model() {
        let client = Arc::new(ScriptedClient {
            models: vec!["other-model".to_string(), "second".to_string()],
            ..ScriptedClient::new(vec![Ok(GOOD.to_string())])
        });
        let engine = engine(client.clone(), 1);

        assert_eq!(engine.model(), "test-model");
        assert_eq!(engine.ensure_ready().await.unwrap(), "other-model");
        assert_eq!(engine.model(), "other-model");

        engine.judge_one(&paper()).await;
        assert_eq!(client.calls.lock().unwrap()[0], "other-model");
    }

    #[tokio::test]
    async fn test_ensure_ready_without_models_fails() {
        let client = Arc::new(ScriptedClient {
            models: Vec::new(),
            ..ScriptedClient::new(Vec::new())
        });
        let err = engine(client, 1).ensure_ready().await.unwrap_err();
        assert!(matches!(err, ServiceError::NoModelsAvailable));
    }
}
