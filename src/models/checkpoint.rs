use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::judgment::PaperResult;

/// 处理进度快照
///
/// 每次写入都是整体覆盖。`current_file` 永远不会出现在 `processed_files` 中。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub survey_topic: String,
    #[serde(default)]
    pub processed_files: BTreeSet<String>,
    #[serde(default)]
    pub current_file: Option<String>,
    /// `current_file` 中下一个待处理的批次
    #[serde(default)]
    pub current_batch_index: usize,
    #[serde(default)]
    pub results: Vec<PaperResult>,
    #[serde(default)]
    pub total_processed: usize,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Checkpoint {
    /// 新运行的空检查点
    pub fn fresh(survey_topic: impl Into<String>) -> Self {
        Self {
            survey_topic: survey_topic.into(),
            processed_files: BTreeSet::new(),
            current_file: None,
            current_batch_index: 0,
            results: Vec::new(),
            total_processed: 0,
            timestamp: Utc::now(),
        }
    }
}

/// 检查点概要，用于在恢复前向用户展示
///
/// 反序列化时只统计 `results` / `processed_files` 的条目数，不构造结果对象。
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CheckpointSummary {
    #[serde(default = "unknown_topic")]
    pub survey_topic: String,
    #[serde(default)]
    pub total_processed: usize,
    #[serde(rename = "results", default, deserialize_with = "count_entries")]
    pub result_count: usize,
    #[serde(rename = "processed_files", default, deserialize_with = "count_entries")]
    pub processed_file_count: usize,
    #[serde(default)]
    pub current_file: Option<String>,
    #[serde(default = "unknown_topic")]
    pub timestamp: String,
}

fn unknown_topic() -> String {
    "Unknown".to_string()
}

fn count_entries<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::{IgnoredAny, SeqAccess, Visitor};
    use std::fmt;

    struct CountVisitor;

    impl<'de> Visitor<'de> for CountVisitor {
        type Value = usize;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("an array")
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: SeqAccess<'de>,
        {
            let mut count = 0;
            while seq.next_element::<IgnoredAny>()?.is_some() {
                count += 1;
            }
            Ok(count)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(0)
        }
    }

    deserializer.deserialize_any(CountVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts_without_materializing_results() {
        let raw = r#"{
            "survey_topic": "Graph Neural Networks",
            "processed_files": ["a.json", "b.json"],
            "current_file": null,
            "current_batch_index": 0,
            "results": [{"anything": 1}, {"shape": "is not checked"}, 3],
            "total_processed": 3,
            "timestamp": "2025-01-01T00:00:00Z"
        }"#;

        let summary: CheckpointSummary = serde_json::from_str(raw).unwrap();
        assert_eq!(summary.survey_topic, "Graph Neural Networks");
        assert_eq!(summary.result_count, 3);
        assert_eq!(summary.processed_file_count, 2);
        assert_eq!(summary.total_processed, 3);
        assert!(summary.current_file.is_none());
        assert_eq!(summary.timestamp, "2025-01-01T00:00:00Z");
    }

    #[test]
    fn test_summary_defaults_for_sparse_file() {
        let summary: CheckpointSummary = serde_json::from_str("{}").unwrap();
        assert_eq!(summary.survey_topic, "Unknown");
        assert_eq!(summary.result_count, 0);
        assert_eq!(summary.processed_file_count, 0);
    }

    #[test]
    fn test_fresh_checkpoint_is_empty() {
        let checkpoint = Checkpoint::fresh("LLM agents");
        assert!(checkpoint.processed_files.is_empty());
        assert!(checkpoint.current_file.is_none());
        assert_eq!(checkpoint.current_batch_index, 0);
        assert!(checkpoint.results.is_empty());
    }
}
