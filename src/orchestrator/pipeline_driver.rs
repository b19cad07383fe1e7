//! 流水线驱动 - 编排层
//!
//! ## 职责
//!
//! 1. **恢复决策**：发现检查点时展示概要，按主题匹配情况和运行模式决定恢复或重新开始
//! 2. **逐文件逐批处理**：文件和批次严格顺序执行，批内并发委托 [`BatchCoordinator`]
//! 3. **进度持久化**：每批完成后写检查点；中断时尽力保存一次
//! 4. **结果导出**：全部完成后导出 CSV，并删除检查点
//!
//! ## 状态流转
//!
//! ```text
//! Idle → ResumeDecision → FreshRun | ResumingRun → PerFile ⇄ PerBatch → Exporting → Done
//!                                                   └──────┴──→ Interrupted
//! ```

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use dialoguer::{theme::ColorfulTheme, Confirm};
use futures::StreamExt;
use tracing::{debug, error, info, warn, Instrument, Span};

use crate::clients::InferenceClient;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{
    Checkpoint, CheckpointSummary, CollectionSummary, Paper, PaperFilter, PaperLoader,
    PaperResult, RatingCounts, RelevanceRating,
};
use crate::orchestrator::BatchCoordinator;
use crate::services::{CheckpointStore, CsvExporter};
use crate::utils::cancel::CancelToken;
use crate::utils::logging;
use crate::workflow::JudgmentEngine;

/// 存在检查点时如何处理
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResumeMode {
    /// 交互式询问
    #[default]
    Ask,
    /// 主题一致时直接恢复
    Resume,
    /// 丢弃检查点
    Fresh,
}

/// 运行阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    ResumeDecision,
    FreshRun,
    ResumingRun,
    PerFile,
    PerBatch,
    Exporting,
    Done,
    Interrupted,
}

/// 成功运行的结果
#[derive(Debug, Clone)]
pub struct RunReport {
    pub counts: RatingCounts,
    pub total_processed: usize,
    pub output_file: PathBuf,
    pub summary_file: PathBuf,
    pub filtered_files: Vec<PathBuf>,
    pub resumed: bool,
    pub elapsed: Duration,
}

/// 运行结束方式
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// dry-run：只统计语料
    DryRun(CollectionSummary),
    Completed(RunReport),
}

/// 运行过程中由驱动独占的可变状态，只在批次之间修改
struct RunState {
    phase: RunPhase,
    results: Vec<PaperResult>,
    total_processed: usize,
    processed_files: BTreeSet<String>,
    /// 检查点中的断点：(文件名, 下一个批次)
    resume_point: Option<(String, usize)>,
    /// 正在处理的文件和批次
    in_flight: Option<(String, usize)>,
    resumed: bool,
}

impl RunState {
    fn fresh() -> Self {
        Self {
            phase: RunPhase::Idle,
            results: Vec::new(),
            total_processed: 0,
            processed_files: BTreeSet::new(),
            resume_point: None,
            in_flight: None,
            resumed: false,
        }
    }

    fn from_checkpoint(checkpoint: Checkpoint) -> Self {
        let resume_point = checkpoint
            .current_file
            .map(|file| (file, checkpoint.current_batch_index));
        Self {
            phase: RunPhase::Idle,
            results: checkpoint.results,
            total_processed: checkpoint.total_processed,
            processed_files: checkpoint.processed_files,
            resume_point,
            in_flight: None,
            resumed: true,
        }
    }

    fn transition(&mut self, to: RunPhase) {
        debug!("阶段切换: {:?} → {:?}", self.phase, to);
        self.phase = to;
    }

    /// 文件完成：加入已完成集合，清除相关断点
    fn finish_file(&mut self, filename: String) {
        if self
            .resume_point
            .as_ref()
            .is_some_and(|(file, _)| file == &filename)
        {
            self.resume_point = None;
        }
        self.in_flight = None;
        self.processed_files.insert(filename);
    }

    fn has_progress(&self) -> bool {
        !self.results.is_empty() || !self.processed_files.is_empty()
    }
}

/// 流水线驱动
pub struct PipelineDriver {
    config: Config,
    loader: PaperLoader,
    filter: PaperFilter,
    coordinator: BatchCoordinator,
    store: CheckpointStore,
    exporter: CsvExporter,
    cancel: CancelToken,
    resume_mode: ResumeMode,
    span: Span,
}

impl PipelineDriver {
    /// 创建驱动；输入目录不存在时返回配置错误
    pub fn new(
        config: Config,
        client: Arc<dyn InferenceClient>,
        cancel: CancelToken,
        resume_mode: ResumeMode,
    ) -> AppResult<Self> {
        let loader = PaperLoader::new(&config.processing.input_dir)?;
        let engine = JudgmentEngine::new(client, &config.survey, &config.llm)?;
        let coordinator = BatchCoordinator::new(
            Arc::new(engine),
            config.processing.max_concurrent_requests,
        );

        Ok(Self {
            filter: PaperFilter::new(&config.filter),
            store: CheckpointStore::new(&config.processing.checkpoint_file),
            exporter: CsvExporter::new(&config.processing.output_file),
            span: tracing::info_span!("pipeline"),
            loader,
            coordinator,
            cancel,
            resume_mode,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 执行完整流程
    pub async fn run(&self) -> AppResult<RunOutcome> {
        self.run_inner().instrument(self.span.clone()).await
    }

    async fn run_inner(&self) -> AppResult<RunOutcome> {
        let started = Instant::now();

        info!("🔍 正在统计论文语料...");
        let collection = self.loader.collection_summary().await?;
        log_collection(&collection);

        if self.config.app.dry_run {
            info!("✓ dry-run 完成，去掉 --dry-run 以开始处理");
            return Ok(RunOutcome::DryRun(collection));
        }

        let mut state = self.decide_resume().await?;

        self.coordinator.engine().ensure_ready().await?;

        state.transition(RunPhase::PerFile);
        if let Err(e) = self.process_files(&mut state, started).await {
            if matches!(e, AppError::Interrupted { .. }) {
                state.transition(RunPhase::Interrupted);
                self.save_on_interrupt(&state).await;
            }
            return Err(e);
        }

        if state.results.is_empty() {
            error!("❌ 没有处理任何论文，请检查过滤条件和输入目录");
            return Err(AppError::NoResults);
        }

        state.transition(RunPhase::Exporting);
        let report = self.export(&state, started).await?;

        // 完成后无条件删除检查点
        self.store.clear().await;
        state.transition(RunPhase::Done);

        logging::print_final_stats(&report.counts, &report.output_file.display().to_string());
        info!("⏱️ 总耗时: {:.1} 秒", report.elapsed.as_secs_f64());
        Ok(RunOutcome::Completed(report))
    }

    /// 恢复决策：只有主题完全一致且（询问后）确认时才恢复
    ///
    /// 询问失败或被中断时返回错误，检查点保持不变。
    async fn decide_resume(&self) -> AppResult<RunState> {
        let mut fresh = RunState::fresh();
        fresh.transition(RunPhase::ResumeDecision);

        if !self.store.exists() {
            fresh.transition(RunPhase::FreshRun);
            return Ok(fresh);
        }

        let Some(summary) = self.store.summarize().await else {
            warn!("⚠️ 检查点无法读取，重新开始");
            self.store.clear().await;
            fresh.transition(RunPhase::FreshRun);
            return Ok(fresh);
        };
        log_checkpoint_summary(&summary);

        if summary.survey_topic != self.config.survey.topic {
            warn!(
                "⚠️ 调研主题已变更 ('{}' → '{}')，重新开始",
                summary.survey_topic, self.config.survey.topic
            );
            self.store.clear().await;
            fresh.transition(RunPhase::FreshRun);
            return Ok(fresh);
        }

        let resume = match self.resume_mode {
            ResumeMode::Resume => true,
            ResumeMode::Fresh => false,
            ResumeMode::Ask => {
                self.check_cancelled(&fresh)?;
                let answer = confirm_resume().await;
                self.check_cancelled(&fresh)?;
                answer.map_err(AppError::ResumePrompt)?
            }
        };

        if !resume {
            info!("🆕 重新开始处理");
            self.store.clear().await;
            fresh.transition(RunPhase::FreshRun);
            return Ok(fresh);
        }

        match self.store.load().await {
            Some(checkpoint) => {
                if checkpoint.total_processed != checkpoint.results.len() {
                    warn!(
                        "⚠️ 检查点计数不一致: total_processed={}，结果数={}",
                        checkpoint.total_processed,
                        checkpoint.results.len()
                    );
                }
                let mut state = RunState::from_checkpoint(checkpoint);
                info!(
                    "▶️ 从检查点恢复: 已恢复 {} 条结果，{} 个文件已完成",
                    state.results.len(),
                    state.processed_files.len()
                );
                state.transition(RunPhase::ResumingRun);
                Ok(state)
            }
            None => {
                warn!("⚠️ 检查点加载失败，重新开始");
                self.store.clear().await;
                fresh.transition(RunPhase::FreshRun);
                Ok(fresh)
            }
        }
    }

    async fn process_files(&self, state: &mut RunState, started: Instant) -> AppResult<()> {
        // 断点所在的文件最先完成，检查点里始终只有一个断点
        if let Some((file, _)) = state.resume_point.clone() {
            if !state.processed_files.contains(&file) {
                self.check_cancelled(state)?;
                let path = self.loader.input_dir().join(&file);
                if path.is_file() {
                    let papers = self.loader.load_papers_from_file(&path).await;
                    self.process_papers(state, papers, file, started).await?;
                } else {
                    warn!("[文件 {}] ⚠️ 断点所在文件已不存在，忽略断点", file);
                    state.resume_point = None;
                }
            }
        }

        let files = self.loader.load_all_papers().await?;
        futures::pin_mut!(files);

        while let Some((papers, filename)) = files.next().await {
            self.check_cancelled(state)?;

            if state.processed_files.contains(&filename) {
                info!("[文件 {}] ⏭️ 已处理，跳过", filename);
                continue;
            }

            self.process_papers(state, papers, filename, started).await?;
        }

        Ok(())
    }

    /// 过滤一个文件的论文并逐批处理，完成后标记该文件
    async fn process_papers(
        &self,
        state: &mut RunState,
        papers: Vec<Paper>,
        filename: String,
        started: Instant,
    ) -> AppResult<()> {
        let loaded = papers.len();
        let papers = self.filter.apply(papers);
        if !self.filter.is_empty() {
            info!("[文件 {}] 过滤后剩余 {}/{} 篇论文", filename, papers.len(), loaded);
        }

        if papers.is_empty() {
            warn!("[文件 {}] ⚠️ 过滤后没有论文，跳过", filename);
        } else {
            self.process_file(state, &papers, &filename, started).await?;
        }
        state.finish_file(filename);
        Ok(())
    }

    async fn process_file(
        &self,
        state: &mut RunState,
        papers: &[Paper],
        filename: &str,
        started: Instant,
    ) -> AppResult<()> {
        let batch_size = self.config.processing.batch_size;
        let total_batches = papers.len().div_ceil(batch_size);

        let start_batch = match &state.resume_point {
            Some((file, index)) if file == filename => *index,
            _ => 0,
        };
        logging::log_file_start(filename, papers.len(), total_batches, start_batch);

        for (index, batch) in papers.chunks(batch_size).enumerate().skip(start_batch) {
            state.in_flight = Some((filename.to_string(), index));
            self.check_cancelled(state)?;
            state.transition(RunPhase::PerBatch);

            let batch_num = index + 1;
            let first = index * batch_size + 1;
            logging::log_batch_start(
                filename,
                batch_num,
                total_batches,
                first,
                first + batch.len() - 1,
                papers.len(),
            );

            let batch_results = self.coordinator.judge_batch(batch, filename).await;
            if batch_results.len() != batch.len() {
                warn!(
                    "[文件 {}] ⚠️ 结果数量 {} 与批次大小 {} 不一致",
                    filename,
                    batch_results.len(),
                    batch.len()
                );
            }

            logging::log_batch_complete(filename, batch_num, &RatingCounts::tally(&batch_results));
            state.results.extend(batch_results);
            state.total_processed += batch.len();

            let elapsed = started.elapsed().as_secs_f64();
            let rate = if elapsed > 0.0 {
                state.total_processed as f64 / elapsed
            } else {
                0.0
            };
            info!(
                "📈 进度: 已处理 {} 篇论文 ({:.1} 篇/秒)",
                state.total_processed, rate
            );

            if self.config.processing.save_every_batch {
                let checkpoint = if batch_num == total_batches {
                    self.snapshot(state, Some(filename), None)
                } else {
                    self.snapshot(state, None, Some((filename, batch_num)))
                };
                self.store.save(&checkpoint).await;
            }

            state.transition(RunPhase::PerFile);
        }

        Ok(())
    }

    /// 构建检查点：`completed` 会加入已完成文件，`current` 为断点
    fn snapshot(
        &self,
        state: &RunState,
        completed: Option<&str>,
        current: Option<(&str, usize)>,
    ) -> Checkpoint {
        let mut processed_files = state.processed_files.clone();
        if let Some(file) = completed {
            processed_files.insert(file.to_string());
        }
        // 尚未到达的旧断点需要保留
        let pending = state
            .resume_point
            .as_ref()
            .filter(|(file, _)| !processed_files.contains(file))
            .map(|(file, index)| (file.as_str(), *index));
        let (current_file, current_batch_index) = match current.or(pending) {
            Some((file, index)) => (Some(file.to_string()), index),
            None => (None, 0),
        };

        Checkpoint {
            survey_topic: self.config.survey.topic.clone(),
            processed_files,
            current_file,
            current_batch_index,
            results: state.results.clone(),
            total_processed: state.total_processed,
            timestamp: Utc::now(),
        }
    }

    fn check_cancelled(&self, state: &RunState) -> AppResult<()> {
        if self.cancel.is_cancelled() {
            warn!("🛑 处理已中断，已处理 {} 篇论文", state.total_processed);
            return Err(AppError::Interrupted {
                processed: state.total_processed,
            });
        }
        Ok(())
    }

    /// 中断时尽力保存一次检查点
    async fn save_on_interrupt(&self, state: &RunState) {
        if !state.has_progress() {
            debug!("没有可保存的进度");
            return;
        }
        info!("💾 正在保存中断时的进度...");
        let current = state
            .in_flight
            .as_ref()
            .map(|(file, index)| (file.as_str(), *index));
        let checkpoint = self.snapshot(state, None, current);
        self.store.save(&checkpoint).await;
    }

    async fn export(&self, state: &RunState, started: Instant) -> AppResult<RunReport> {
        info!("📤 正在导出结果...");
        self.exporter.export_results(&state.results).await?;
        let summary_file = self.exporter.export_summary_stats(&state.results).await?;

        let mut filtered_files = Vec::new();
        if self.config.app.create_separate_csvs {
            info!("📤 正在按评级导出 CSV...");
            for rating in RelevanceRating::ALL {
                if let Some(path) = self
                    .exporter
                    .create_filtered_csv(&state.results, rating)
                    .await?
                {
                    filtered_files.push(path);
                }
            }
        }

        Ok(RunReport {
            counts: RatingCounts::tally(&state.results),
            total_processed: state.total_processed,
            output_file: self.exporter.output_file().to_path_buf(),
            summary_file,
            filtered_files,
            resumed: state.resumed,
            elapsed: started.elapsed(),
        })
    }
}

/// 交互式确认是否恢复；无法交互（非终端、按下 Ctrl-C）时返回错误
async fn confirm_resume() -> Result<bool, String> {
    tokio::task::spawn_blocking(|| {
        Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt("是否从检查点恢复？")
            .default(true)
            .interact()
            .map_err(|e| e.to_string())
    })
    .await
    .map_err(|e| e.to_string())?
}

fn log_collection(summary: &CollectionSummary) {
    info!(
        "📚 共 {} 个文件，{} 篇论文",
        summary.files_processed, summary.total_papers
    );
    let conferences: Vec<_> = summary.papers_by_conference.keys().collect();
    let years: Vec<_> = summary.papers_by_year.keys().collect();
    info!("会议: {:?}", conferences);
    info!("年份: {:?}", years);
    for detail in &summary.file_details {
        debug!(
            "  - {}: {} 篇，会议 {:?}，年份 {:?}",
            detail.filename, detail.paper_count, detail.conferences, detail.years
        );
    }
}

fn log_checkpoint_summary(summary: &CheckpointSummary) {
    info!("📂 发现检查点 ({})", summary.timestamp);
    info!(
        "上次运行: 已处理 {} 篇论文，保存了 {} 条结果，{} 个文件已完成",
        summary.total_processed, summary.result_count, summary.processed_file_count
    );
    info!("调研主题: {}", summary.survey_topic);
    if let Some(file) = &summary.current_file {
        info!("中断位置: {}", file);
    }
}
