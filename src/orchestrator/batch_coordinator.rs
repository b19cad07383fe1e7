//! 批次并发协调器 - 编排层
//!
//! ## 职责
//!
//! 1. **并发判断**：本批每篇论文一个 tokio 任务，Semaphore 限制同时进行的请求数
//! 2. **顺序保持**：按输入顺序等待任务，输出与输入一一对应
//! 3. **故障隔离**：任务 panic 或被取消时生成 Unknown 结果，不影响同批其他论文
//! 4. **来源标记**：统一填写 `file_source`，并为每篇论文输出一行审计日志
//!
//! 不处理单篇论文的细节，向下委托 [`JudgmentEngine`]。

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{error, info, Instrument, Span};

use crate::models::judgment::{Judgment, PaperResult, RatingCounts};
use crate::models::paper::Paper;
use crate::utils::logging::truncate_text;
use crate::workflow::JudgmentEngine;

/// 任务意外失败时的说明
pub const UNEXPECTED_REASONING: &str = "Unexpected error happened - unable to determine relevance";

/// 批次协调器
pub struct BatchCoordinator {
    engine: Arc<JudgmentEngine>,
    semaphore: Arc<Semaphore>,
    span: Span,
}

impl BatchCoordinator {
    pub fn new(engine: Arc<JudgmentEngine>, max_concurrent: usize) -> Self {
        Self {
            engine,
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            span: tracing::info_span!("batch"),
        }
    }

    pub fn engine(&self) -> &JudgmentEngine {
        &self.engine
    }

    /// 并发判断一批论文，结果顺序与输入一致，长度相同
    pub async fn judge_batch(&self, papers: &[Paper], source_file: &str) -> Vec<PaperResult> {
        let mut handles = Vec::with_capacity(papers.len());

        for paper in papers {
            let engine = Arc::clone(&self.engine);
            let semaphore = Arc::clone(&self.semaphore);
            let paper = paper.clone();

            let handle = tokio::spawn(
                async move {
                    // 信号量不会被关闭，获取失败时不限流继续执行
                    let _permit = semaphore.acquire_owned().await.ok();
                    engine.judge_one(&paper).await
                }
                .instrument(self.span.clone()),
            );
            handles.push(handle);
        }

        let mut results = Vec::with_capacity(papers.len());
        for (index, (paper, handle)) in papers.iter().zip(handles).enumerate() {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    let _guard = self.span.enter();
                    error!("[论文 {}] ❌ 任务执行失败: {}", index + 1, e);
                    PaperResult::new(paper, Judgment::unknown(UNEXPECTED_REASONING))
                }
            };
            results.push(result.with_file_source(source_file));
        }

        self.log_audit(&results, source_file);
        results
    }

    fn log_audit(&self, results: &[PaperResult], source_file: &str) {
        let _guard = self.span.enter();
        let total = results.len();
        for (index, result) in results.iter().enumerate() {
            info!(
                "[{}] 论文 {}/{}: {} - {} - {}",
                source_file,
                index + 1,
                total,
                result.rating(),
                truncate_text(&result.title, 80),
                result
                    .judgment
                    .reasoning
                    .as_deref()
                    .unwrap_or("No reasoning provided")
            );
        }

        let counts = RatingCounts::tally(results);
        info!(
            "[{}] 本批评级: High={} Medium={} Low={} Unknown={}",
            source_file, counts.high, counts.medium, counts.low, counts.unknown
        );
    }
}
