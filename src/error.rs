use std::path::PathBuf;

use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 推理服务错误（仅在启动阶段的模型检查中致命）
    #[error("推理服务错误: {0}")]
    Service(#[from] ServiceError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 输入数据错误
    #[error("数据错误: {0}")]
    Validation(#[from] ValidationError),
    /// 文件读写错误
    #[error("文件错误 ({path}): {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// JSON 序列化错误
    #[error("JSON错误: {0}")]
    Json(#[from] serde_json::Error),
    /// 内置正则表达式无效
    #[error("正则表达式错误: {0}")]
    Regex(#[from] regex::Error),
    /// 全部文件处理完毕，但没有得到任何结果
    #[error("没有处理任何论文，请检查过滤条件和输入目录")]
    NoResults,
    /// 无法交互确认是否恢复，检查点保持不变
    #[error("无法确认是否从检查点恢复 ({0})，检查点已保留，请使用 --resume 或 --fresh")]
    ResumePrompt(String),
    /// 用户中断
    #[error("处理被用户中断，已处理 {processed} 篇论文")]
    Interrupted { processed: usize },
}

/// 推理服务错误
///
/// 连接失败、超时、非成功状态都归为此类，由调用方决定是否重试。
#[derive(Debug, Error)]
pub enum ServiceError {
    /// 无法连接推理服务
    #[error("无法连接推理服务 ({endpoint}): {message}")]
    Connection { endpoint: String, message: String },
    /// 请求超时
    #[error("推理请求超时 (模型: {model}, 超时: {seconds}秒)")]
    Timeout { model: String, seconds: f64 },
    /// 服务返回错误响应
    #[error("推理服务返回错误 (模型: {model}): {message}")]
    BadStatus { model: String, message: String },
    /// 请求构建失败
    #[error("无法构建推理请求: {0}")]
    InvalidRequest(String),
    /// 服务上没有任何可用模型
    #[error("no models available")]
    NoModelsAvailable,
}

/// 模型响应解析错误
#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    /// 候选文本不是合法 JSON
    #[error("JSON解析失败: {0}")]
    InvalidJson(String),
    /// JSON 合法但不满足字段约束
    #[error("字段 {field} 校验失败: {reason}")]
    Schema { field: &'static str, reason: String },
    /// 所有候选都无法通过校验，`diagnostic` 为（清理后的）响应前 300 个字符
    #[error("无法解析模型响应 (含思考标签: {had_thinking}): {diagnostic}")]
    NoValidCandidate {
        diagnostic: String,
        had_thinking: bool,
    },
}

impl ParseError {
    pub(crate) fn schema(field: &'static str, reason: impl Into<String>) -> Self {
        ParseError::Schema {
            field,
            reason: reason.into(),
        }
    }
}

/// 输入数据错误：记录日志后跳过该条目，运行继续
#[derive(Debug, Error)]
pub enum ValidationError {
    /// 论文记录结构不合法
    #[error("论文记录无效 ({file} 第 {index} 条): {message}")]
    InvalidPaper {
        file: String,
        index: usize,
        message: String,
    },
    /// 论文文件不是 JSON 数组
    #[error("论文文件无法解析 ({file}): {message}")]
    InvalidPaperFile { file: String, message: String },
    /// 检查点文件损坏
    #[error("检查点文件损坏 ({}): {message}", .path.display())]
    CorruptCheckpoint { path: PathBuf, message: String },
}

/// 配置错误：在开始处理之前终止运行
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// 未指定调研主题
    #[error("未指定调研主题，请使用 --survey-topic 或设置 SURVEY_TOPIC")]
    MissingTopic,
    /// 数值参数超出范围
    #[error("参数 {name} 无效: {reason}")]
    InvalidValue { name: &'static str, reason: String },
    /// 年份范围颠倒
    #[error("年份范围无效: 起始年份 {start} 大于结束年份 {end}")]
    InvalidYearRange { start: i32, end: i32 },
    /// 输入目录不存在
    #[error("输入目录不存在: {0}")]
    InputDirNotFound(String),
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 配置文件读取失败
    #[error("无法读取配置文件 ({path}): {message}")]
    FileReadFailed { path: String, message: String },
    /// TOML 解析失败
    #[error("TOML解析失败 ({path}): {message}")]
    TomlParseFailed { path: String, message: String },
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建文件读写错误
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        AppError::Io {
            path: path.into(),
            source,
        }
    }
}

impl ConfigError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            name,
            reason: reason.into(),
        }
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
