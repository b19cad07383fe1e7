//! 检查点存储 - 业务能力层
//!
//! 只负责"读写检查点文件"能力，不关心恢复策略。
//! 保存失败只记录日志，不会中断处理流程。

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, error, info, warn, Instrument, Span};

use crate::error::{AppError, AppResult, ValidationError};
use crate::models::checkpoint::{Checkpoint, CheckpointSummary};

/// 检查点存储
pub struct CheckpointStore {
    path: PathBuf,
    span: Span,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let span = tracing::info_span!("checkpoint", path = %path.display());
        Self { path, span }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// 读取检查点概要（不构造结果对象）
    pub async fn summarize(&self) -> Option<CheckpointSummary> {
        let content = self.read().instrument(self.span.clone()).await?;
        match serde_json::from_str::<CheckpointSummary>(&content) {
            Ok(summary) => Some(summary),
            Err(e) => {
                self.report_corrupt(e);
                None
            }
        }
    }

    /// 整体覆盖保存（先写临时文件再重命名）
    pub async fn save(&self, checkpoint: &Checkpoint) {
        match self.write_atomic(checkpoint).instrument(self.span.clone()).await {
            Ok(()) => {
                let _guard = self.span.enter();
                info!(
                    "💾 检查点已保存: 已完成 {} 个文件，已处理 {} 篇论文",
                    checkpoint.processed_files.len(),
                    checkpoint.total_processed
                );
            }
            Err(e) => {
                let _guard = self.span.enter();
                error!("❌ 检查点保存失败: {}", e);
            }
        }
    }

    /// 加载检查点；文件不存在或损坏时返回 None
    pub async fn load(&self) -> Option<Checkpoint> {
        let content = self.read().instrument(self.span.clone()).await?;
        match serde_json::from_str::<Checkpoint>(&content) {
            Ok(checkpoint) => {
                let _guard = self.span.enter();
                info!(
                    "📂 已加载检查点: 主题 '{}'，{} 条结果",
                    checkpoint.survey_topic,
                    checkpoint.results.len()
                );
                Some(checkpoint)
            }
            Err(e) => {
                self.report_corrupt(e);
                None
            }
        }
    }

    /// 删除检查点文件，文件不存在时什么也不做
    pub async fn clear(&self) {
        let removed = fs::remove_file(&self.path).await;
        let _guard = self.span.enter();
        match removed {
            Ok(()) => info!("🗑️ 检查点已清除"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("检查点不存在，无需清除")
            }
            Err(e) => warn!("⚠️ 检查点清除失败: {}", e),
        }
    }

    async fn read(&self) -> Option<String> {
        match fs::read_to_string(&self.path).await {
            Ok(content) => Some(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!("⚠️ 无法读取检查点: {}", e);
                None
            }
        }
    }

    async fn write_atomic(&self, checkpoint: &Checkpoint) -> AppResult<()> {
        let display = self.path.display().to_string();

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::io(parent.display().to_string(), e))?;
        }

        let mut data = serde_json::to_vec_pretty(checkpoint)?;
        data.push(b'\n');

        let tmp_path = self.tmp_path();
        fs::write(&tmp_path, &data)
            .await
            .map_err(|e| AppError::io(tmp_path.display().to_string(), e))?;
        fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| AppError::io(&display, e))?;

        debug!("检查点写入 {} 字节", data.len());
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn report_corrupt(&self, e: serde_json::Error) {
        let _guard = self.span.enter();
        let err = ValidationError::CorruptCheckpoint {
            path: self.path.clone(),
            message: e.to_string(),
        };
        warn!("⚠️ {}", err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::judgment::{Judgment, PaperResult, RelevanceRating};

    fn result(title: &str, rating: RelevanceRating) -> PaperResult {
        PaperResult {
            title: title.to_string(),
            authors: vec!["A. Author".to_string(), "B. Author".to_string()],
            conference: "NeurIPS".to_string(),
            year: 2023,
            judgment: Judgment {
                relevance_rating: rating,
                confidence_score: Some(0.75),
                reasoning: Some("Matches the survey scope closely.".to_string()),
            },
            file_source: "neurips_2023.json".to_string(),
        }
    }

    #[tokio::test]
    async fn test_round_trip_with_empty_fields() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("nested/cp.json"));
        assert!(!store.exists());

        let checkpoint = Checkpoint::fresh("Federated learning");
        store.save(&checkpoint).await;
        assert!(store.exists());

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, checkpoint);
        assert!(loaded.processed_files.is_empty());
        assert!(loaded.current_file.is_none());
    }

    #[tokio::test]
    async fn test_round_trip_with_results() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("cp.json"));

        let mut checkpoint = Checkpoint::fresh("Federated learning");
        checkpoint.processed_files.insert("a.json".to_string());
        checkpoint.current_file = Some("b.json".to_string());
        checkpoint.current_batch_index = 2;
        checkpoint.results = vec![
            result("one", RelevanceRating::High),
            PaperResult {
                judgment: Judgment::unknown("no answer"),
                ..result("two", RelevanceRating::Low)
            },
        ];
        checkpoint.total_processed = 2;
        store.save(&checkpoint).await;

        assert_eq!(store.load().await.unwrap(), checkpoint);
        assert!(!dir.path().join("cp.json.tmp").exists());

        let summary = store.summarize().await.unwrap();
        assert_eq!(summary.result_count, 2);
        assert_eq!(summary.processed_file_count, 1);
        assert_eq!(summary.current_file.as_deref(), Some("b.json"));
    }

    #[tokio::test]
    async fn test_corrupt_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cp.json");
        std::fs::write(&path, "{ \"survey_topic\": ").unwrap();

        let store = CheckpointStore::new(&path);
        assert!(store.exists());
        assert!(store.load().await.is_none());
        assert!(store.summarize().await.is_none());
    }

    #[tokio::test]
    async fn test_missing_file_and_idempotent_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("cp.json"));
        assert!(store.load().await.is_none());

        store.save(&Checkpoint::fresh("topic")).await;
        store.clear().await;
        assert!(!store.exists());
        store.clear().await;
        assert!(!store.exists());
    }

    #[tokio::test]
    async fn test_save_failure_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        // 父路径是普通文件，无法创建目录
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let store = CheckpointStore::new(blocker.join("cp.json"));

        store.save(&Checkpoint::fresh("topic")).await;
        assert!(!store.exists());
    }
}
