//! # Survey Relevance
//!
//! 使用大模型批量判断学术论文与调研主题相关性的 Rust 应用程序
//!
//! ## 架构设计
//!
//! 本系统采用分层架构：
//!
//! ### ① 客户端层（Clients）
//! - `clients/` - 推理服务 I/O 边界，不含业务逻辑
//! - `InferenceClient` - 可替换的推理接口（测试中使用脚本化实现）
//! - `OpenAiCompatibleClient` - 基于 async-openai 的实现（Ollama、vLLM 等）
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，不关心流程
//! - `PromptBuilder` - 构建判断提示词
//! - `ResponseParser` - 从自由文本中提取并校验判断结果
//! - `CheckpointStore` - 原子读写检查点
//! - `CsvExporter` - 导出结果和统计
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一篇论文"的完整判断流程
//! - `JudgmentEngine` - 提示词 → 推理 → 解析，带重试，永不失败
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_coordinator` - 批内并发，保持顺序
//! - `orchestrator/pipeline_driver` - 文件/批次推进、检查点恢复、中断、导出
//!
//! ## 模块结构

pub mod cli;
pub mod clients;
pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use clients::{InferenceClient, OpenAiCompatibleClient};
pub use config::Config;
pub use error::{AppError, AppResult};
pub use models::{Checkpoint, Judgment, Paper, PaperResult, RelevanceRating};
pub use orchestrator::{PipelineDriver, ResumeMode, RunOutcome, RunReport};
pub use utils::CancelToken;
pub use workflow::JudgmentEngine;
