use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use futures::stream::{self, Stream, StreamExt};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult, ConfigError, ValidationError};
use crate::models::paper::Paper;

/// 语料加载器
///
/// 输入目录中的每个 `*.json` 文件是一个论文对象数组，按文件名排序处理。
#[derive(Debug, Clone)]
pub struct PaperLoader {
    input_dir: PathBuf,
}

/// 单个文件的概要
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileDetail {
    pub filename: String,
    pub paper_count: usize,
    pub conferences: BTreeSet<String>,
    pub years: BTreeSet<i32>,
}

/// 整个语料的概要
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionSummary {
    pub total_papers: usize,
    pub files_processed: usize,
    pub papers_by_conference: BTreeMap<String, usize>,
    pub papers_by_year: BTreeMap<i32, usize>,
    pub file_details: Vec<FileDetail>,
}

impl PaperLoader {
    /// 创建加载器，输入目录不存在时返回配置错误
    pub fn new(input_dir: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let input_dir = input_dir.into();
        if !input_dir.is_dir() {
            return Err(ConfigError::InputDirNotFound(
                input_dir.display().to_string(),
            ));
        }
        Ok(Self { input_dir })
    }

    pub fn input_dir(&self) -> &Path {
        &self.input_dir
    }

    /// 列出所有 JSON 文件（按文件名排序，保证每次运行顺序一致）
    pub async fn paper_files(&self) -> AppResult<Vec<PathBuf>> {
        let dir = self.input_dir.display().to_string();
        let mut entries = fs::read_dir(&self.input_dir)
            .await
            .map_err(|e| AppError::io(&dir, e))?;

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| AppError::io(&dir, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) == Some("json") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// 从单个文件加载论文
    ///
    /// 无效记录跳过并记录日志；整个文件无法解析时返回空列表。
    pub async fn load_papers_from_file(&self, path: &Path) -> Vec<Paper> {
        let filename = file_name(path);

        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) => {
                warn!("⚠️ 无法读取论文文件 {}: {}", path.display(), e);
                return Vec::new();
            }
        };

        let raw_papers: Vec<serde_json::Value> = match serde_json::from_str(&content) {
            Ok(raw) => raw,
            Err(e) => {
                let err = ValidationError::InvalidPaperFile {
                    file: filename,
                    message: e.to_string(),
                };
                warn!("⚠️ {}", err);
                return Vec::new();
            }
        };

        let mut papers = Vec::with_capacity(raw_papers.len());
        for (index, raw) in raw_papers.into_iter().enumerate() {
            match serde_json::from_value::<Paper>(raw) {
                Ok(paper) => papers.push(paper),
                Err(e) => {
                    let err = ValidationError::InvalidPaper {
                        file: filename.clone(),
                        index,
                        message: e.to_string(),
                    };
                    warn!("⚠️ {}", err);
                }
            }
        }

        info!("✓ 从 {} 加载了 {} 篇论文", filename, papers.len());
        papers
    }

    /// 按文件依次加载论文，惰性读取；没有有效论文的文件不会产出
    pub async fn load_all_papers(
        &self,
    ) -> AppResult<impl Stream<Item = (Vec<Paper>, String)> + '_> {
        let files = self.paper_files().await?;

        if files.is_empty() {
            warn!("⚠️ 在 {} 中没有找到 JSON 文件", self.input_dir.display());
        } else {
            info!("📁 找到 {} 个论文文件", files.len());
            for path in &files {
                debug!("  - {}", file_name(path));
            }
        }

        Ok(stream::iter(files)
            .then(move |path| async move {
                let papers = self.load_papers_from_file(&path).await;
                (papers, file_name(&path))
            })
            .filter(|(papers, _)| futures::future::ready(!papers.is_empty())))
    }

    /// 统计整个语料（用于启动时展示和 dry-run）
    pub async fn collection_summary(&self) -> AppResult<CollectionSummary> {
        let mut summary = CollectionSummary::default();

        let papers_stream = self.load_all_papers().await?;
        futures::pin_mut!(papers_stream);

        while let Some((papers, filename)) = papers_stream.next().await {
            summary.files_processed += 1;
            summary.total_papers += papers.len();

            let mut detail = FileDetail {
                filename,
                paper_count: papers.len(),
                ..Default::default()
            };

            for paper in &papers {
                *summary
                    .papers_by_conference
                    .entry(paper.conference_name.clone())
                    .or_default() += 1;
                *summary
                    .papers_by_year
                    .entry(paper.publication_year)
                    .or_default() += 1;
                detail.conferences.insert(paper.conference_name.clone());
                detail.years.insert(paper.publication_year);
            }

            summary.file_details.push(detail);
        }

        Ok(summary)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write_papers(dir: &Path, name: &str, value: serde_json::Value) {
        std::fs::write(dir.join(name), serde_json::to_string(&value).unwrap()).unwrap();
    }

    fn raw(title: &str, year: i32, conference: &str) -> serde_json::Value {
        json!({
            "title": title,
            "authors": ["Someone"],
            "publication_year": year,
            "conference_name": conference,
            "venue_type": "conference",
            "scraped_at": "2024-01-01T00:00:00"
        })
    }

    #[test]
    fn test_missing_input_dir_is_config_error() {
        let err = PaperLoader::new("/definitely/not/here").unwrap_err();
        assert!(matches!(err, ConfigError::InputDirNotFound(_)));
    }

    #[tokio::test]
    async fn test_files_are_sorted_and_filtered_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        write_papers(dir.path(), "b.json", json!([raw("b", 2024, "ICLR")]));
        write_papers(dir.path(), "a.json", json!([raw("a", 2024, "ICLR")]));
        std::fs::write(dir.path().join("notes.txt"), "ignore me").unwrap();

        let loader = PaperLoader::new(dir.path()).unwrap();
        let files = loader.paper_files().await.unwrap();
        let names: Vec<_> = files.iter().map(|p| file_name(p)).collect();
        assert_eq!(names, vec!["a.json", "b.json"]);
    }

    #[tokio::test]
    async fn test_invalid_records_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write_papers(
            dir.path(),
            "mixed.json",
            json!([raw("good", 2024, "ICML"), {"title": "missing everything"}]),
        );

        let loader = PaperLoader::new(dir.path()).unwrap();
        let papers = loader
            .load_papers_from_file(&dir.path().join("mixed.json"))
            .await;
        assert_eq!(papers.len(), 1);
        assert_eq!(papers[0].title, "good");
    }

    #[tokio::test]
    async fn test_load_all_papers_skips_broken_and_empty_files() {
        let dir = tempfile::tempdir().unwrap();
        write_papers(dir.path(), "a.json", json!([raw("a", 2024, "ICLR")]));
        std::fs::write(dir.path().join("b.json"), "{ not json").unwrap();
        write_papers(dir.path(), "c.json", json!([]));
        write_papers(dir.path(), "d.json", json!([raw("d", 2023, "ICML")]));

        let loader = PaperLoader::new(dir.path()).unwrap();
        let stream = loader.load_all_papers().await.unwrap();
        let loaded: Vec<_> = stream.collect().await;
        let names: Vec<_> = loaded.iter().map(|(_, name)| name.as_str()).collect();
        assert_eq!(names, vec!["a.json", "d.json"]);
    }

    #[tokio::test]
    async fn test_collection_summary() {
        let dir = tempfile::tempdir().unwrap();
        write_papers(
            dir.path(),
            "iclr.json",
            json!([raw("a", 2023, "ICLR"), raw("b", 2024, "ICLR")]),
        );
        write_papers(dir.path(), "icml.json", json!([raw("c", 2024, "ICML")]));

        let loader = PaperLoader::new(dir.path()).unwrap();
        let summary = loader.collection_summary().await.unwrap();
        assert_eq!(summary.total_papers, 3);
        assert_eq!(summary.files_processed, 2);
        assert_eq!(summary.papers_by_conference["ICLR"], 2);
        assert_eq!(summary.papers_by_year[&2024], 2);
        assert_eq!(summary.file_details[0].filename, "iclr.json");
        assert_eq!(summary.file_details[0].years.len(), 2);
    }
}
