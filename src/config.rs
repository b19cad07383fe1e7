//! 程序配置
//!
//! 加载顺序：默认值 → TOML 配置文件（可选）→ 环境变量 → 命令行参数。
//! 最终由 [`Config::validate`] 检查，任何错误都会在处理开始前终止运行。

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// 程序配置文件
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub survey: SurveyConfig,
    pub processing: ProcessingConfig,
    pub llm: LlmConfig,
    pub logging: LoggingConfig,
    pub filter: FilterConfig,
    pub app: AppConfig,
}

/// 调研主题
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct SurveyConfig {
    /// 调研主题，检查点按此字符串精确匹配
    pub topic: String,
    /// 调研范围的详细描述（可选）
    pub description: String,
}

/// 批处理参数
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProcessingConfig {
    /// 论文 JSON 文件所在目录
    pub input_dir: PathBuf,
    /// 结果 CSV 文件
    pub output_file: PathBuf,
    /// 每批论文数量
    pub batch_size: usize,
    /// 检查点文件
    pub checkpoint_file: PathBuf,
    /// 每批完成后保存检查点
    pub save_every_batch: bool,
    /// 同时进行的推理请求上限
    pub max_concurrent_requests: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("data/papers"),
            output_file: PathBuf::from("data/results/relevance_index.csv"),
            batch_size: 10,
            checkpoint_file: PathBuf::from("data/checkpoints/processing_checkpoint.json"),
            save_every_batch: true,
            max_concurrent_requests: 10,
        }
    }
}

/// 推理服务配置（兼容 OpenAI API 的服务，如 Ollama）
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    pub api_base_url: String,
    pub api_key: String,
    pub model_name: String,
    /// 每篇论文的最大尝试次数
    pub max_retries: u32,
    /// 两次尝试之间的等待秒数
    pub retry_delay: f64,
    /// 单次请求超时秒数
    pub request_timeout: f64,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:11434/v1".to_string(),
            api_key: "ollama".to_string(),
            model_name: "hf.co/unsloth/Qwen3-30B-A3B-GGUF:latest".to_string(),
            max_retries: 3,
            retry_delay: 1.0,
            request_timeout: 300.0,
            temperature: 0.3,
        }
    }
}

/// 重试间隔和请求超时的上限（秒）
pub const MAX_WAIT_SECS: f64 = 86_400.0;

impl LlmConfig {
    pub fn retry_delay_duration(&self) -> Duration {
        seconds(self.retry_delay)
    }

    pub fn request_timeout_duration(&self) -> Duration {
        seconds(self.request_timeout)
    }
}

fn seconds(value: f64) -> Duration {
    Duration::from_secs_f64(value.max(0.0).min(MAX_WAIT_SECS))
}

/// 日志配置
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_level: String,
    /// 额外写入的日志文件（始终为 DEBUG 级别）
    pub log_file: Option<PathBuf>,
    /// 等同于 log_level = "debug"
    pub verbose: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_file: None,
            verbose: false,
        }
    }
}

/// 过滤条件
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct FilterConfig {
    /// 年份范围（闭区间）
    pub years: Option<(i32, i32)>,
    pub conferences: Vec<String>,
    pub keywords: Vec<String>,
}

/// 运行模式
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// 只展示语料概要，不调用模型
    pub dry_run: bool,
    /// 为每个评级单独导出 CSV
    pub create_separate_csvs: bool,
}

impl Config {
    /// 从 TOML 文件加载（缺失的字段使用默认值）
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::FileReadFailed {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        toml::from_str(&content).map_err(|e| ConfigError::TomlParseFailed {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// 用环境变量覆盖当前配置
    pub fn apply_env(mut self) -> Result<Self, ConfigError> {
        if let Ok(v) = std::env::var("SURVEY_TOPIC") {
            self.survey.topic = v;
        }
        if let Ok(v) = std::env::var("SURVEY_DESCRIPTION") {
            self.survey.description = v;
        }
        if let Ok(v) = std::env::var("INPUT_DIR") {
            self.processing.input_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("OUTPUT_FILE") {
            self.processing.output_file = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("CHECKPOINT_FILE") {
            self.processing.checkpoint_file = PathBuf::from(v);
        }
        if let Some(v) = env_parse("BATCH_SIZE", "usize")? {
            self.processing.batch_size = v;
        }
        if let Some(v) = env_parse("SAVE_EVERY_BATCH", "bool")? {
            self.processing.save_every_batch = v;
        }
        if let Some(v) = env_parse("MAX_CONCURRENT_REQUESTS", "usize")? {
            self.processing.max_concurrent_requests = v;
        }
        if let Ok(v) = std::env::var("LLM_API_BASE_URL") {
            self.llm.api_base_url = v;
        }
        if let Ok(v) = std::env::var("LLM_API_KEY") {
            self.llm.api_key = v;
        }
        if let Ok(v) = std::env::var("LLM_MODEL_NAME") {
            self.llm.model_name = v;
        }
        if let Some(v) = env_parse("MAX_RETRIES", "u32")? {
            self.llm.max_retries = v;
        }
        if let Some(v) = env_parse("RETRY_DELAY", "f64")? {
            self.llm.retry_delay = v;
        }
        if let Some(v) = env_parse("REQUEST_TIMEOUT", "f64")? {
            self.llm.request_timeout = v;
        }
        if let Ok(v) = std::env::var("LOG_LEVEL") {
            self.logging.log_level = v;
        }
        Ok(self)
    }

    /// 检查配置是否可以开始运行
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.survey.topic.trim().is_empty() {
            return Err(ConfigError::MissingTopic);
        }
        if self.processing.batch_size == 0 {
            return Err(ConfigError::invalid("batch_size", "必须大于 0"));
        }
        if self.processing.max_concurrent_requests == 0 {
            return Err(ConfigError::invalid("max_concurrent_requests", "必须大于 0"));
        }
        if self.llm.max_retries == 0 {
            return Err(ConfigError::invalid("max_retries", "必须大于 0"));
        }
        if !self.llm.retry_delay.is_finite() || self.llm.retry_delay < 0.0 {
            return Err(ConfigError::invalid(
                "retry_delay",
                format!("不能为负数: {}", self.llm.retry_delay),
            ));
        }
        if self.llm.retry_delay > MAX_WAIT_SECS {
            return Err(ConfigError::invalid(
                "retry_delay",
                format!("不能超过 {} 秒: {}", MAX_WAIT_SECS, self.llm.retry_delay),
            ));
        }
        if !self.llm.request_timeout.is_finite() || self.llm.request_timeout <= 0.0 {
            return Err(ConfigError::invalid(
                "request_timeout",
                format!("必须大于 0: {}", self.llm.request_timeout),
            ));
        }
        if self.llm.request_timeout > MAX_WAIT_SECS {
            return Err(ConfigError::invalid(
                "request_timeout",
                format!("不能超过 {} 秒: {}", MAX_WAIT_SECS, self.llm.request_timeout),
            ));
        }
        if self.llm.model_name.trim().is_empty() {
            return Err(ConfigError::invalid("model_name", "不能为空"));
        }
        if let Some((start, end)) = self.filter.years {
            if start > end {
                return Err(ConfigError::InvalidYearRange { start, end });
            }
        }
        Ok(())
    }
}

fn env_parse<T: FromStr>(var_name: &str, expected_type: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(var_name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::EnvVarParseFailed {
                var_name: var_name.to_string(),
                value,
                expected_type: expected_type.to_string(),
            }),
        Err(_) => Ok(None),
    }
}
