//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量处理和流程调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `pipeline_driver` - 流水线驱动
//! - 检查点恢复决策（主题匹配、交互确认）
//! - 逐文件、逐批推进，每批后保存检查点
//! - 响应中断信号，尽力保存进度
//! - 导出 CSV 并输出全局统计
//!
//! ### `batch_coordinator` - 批次协调器
//! - 一批论文并发判断（Semaphore + tokio::spawn）
//! - 保持输入顺序，任务失败时补 Unknown 结果
//! - 标记来源文件，输出逐篇审计日志
//!
//! ## 层次关系
//!
//! ```text
//! pipeline_driver (处理 文件 → 批次)
//!     ↓
//! batch_coordinator (处理 Vec<Paper>)
//!     ↓
//! workflow::JudgmentEngine (处理单篇 Paper)
//!     ↓
//! services (能力层：prompt / parse / checkpoint / export)
//!     ↓
//! clients (推理服务 I/O)
//! ```

pub mod batch_coordinator;
pub mod pipeline_driver;

// 重新导出主要类型
pub use batch_coordinator::{BatchCoordinator, UNEXPECTED_REASONING};
pub use pipeline_driver::{PipelineDriver, ResumeMode, RunOutcome, RunPhase, RunReport};
