use serde::{Deserialize, Serialize};

use crate::models::paper::Paper;

/// 相关性评级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RelevanceRating {
    High,
    Medium,
    Low,
    /// 无法判断（重试耗尽或意外错误），模型本身不允许返回该值
    Unknown,
}

impl RelevanceRating {
    /// 全部评级，按导出顺序排列
    pub const ALL: [RelevanceRating; 4] = [
        RelevanceRating::High,
        RelevanceRating::Medium,
        RelevanceRating::Low,
        RelevanceRating::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RelevanceRating::High => "High",
            RelevanceRating::Medium => "Medium",
            RelevanceRating::Low => "Low",
            RelevanceRating::Unknown => "Unknown",
        }
    }

    /// 模型可以返回的评级（不含 Unknown）
    pub fn from_model_label(label: &str) -> Option<Self> {
        match label {
            "High" => Some(RelevanceRating::High),
            "Medium" => Some(RelevanceRating::Medium),
            "Low" => Some(RelevanceRating::Low),
            _ => None,
        }
    }
}

impl std::fmt::Display for RelevanceRating {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单篇论文的判断结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Judgment {
    pub relevance_rating: RelevanceRating,
    #[serde(default)]
    pub confidence_score: Option<f64>,
    #[serde(default)]
    pub reasoning: Option<String>,
}

impl Judgment {
    /// 无法判断时的兜底结果
    pub fn unknown(reasoning: impl Into<String>) -> Self {
        Self {
            relevance_rating: RelevanceRating::Unknown,
            confidence_score: Some(0.0),
            reasoning: Some(reasoning.into()),
        }
    }
}

/// 论文元数据 + 判断结果 + 来源文件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperResult {
    pub title: String,
    pub authors: Vec<String>,
    pub conference: String,
    pub year: i32,
    #[serde(flatten)]
    pub judgment: Judgment,
    /// 来源文件名，由 BatchCoordinator 统一填写
    #[serde(default)]
    pub file_source: String,
}

impl PaperResult {
    pub fn new(paper: &Paper, judgment: Judgment) -> Self {
        Self {
            title: paper.title.clone(),
            authors: paper.authors.clone(),
            conference: paper.conference_name.clone(),
            year: paper.publication_year,
            judgment,
            file_source: String::new(),
        }
    }

    pub fn rating(&self) -> RelevanceRating {
        self.judgment.relevance_rating
    }

    pub fn with_file_source(mut self, file_source: impl Into<String>) -> Self {
        self.file_source = file_source.into();
        self
    }
}

/// 各评级的计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RatingCounts {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub unknown: usize,
}

impl RatingCounts {
    pub fn tally<'a>(results: impl IntoIterator<Item = &'a PaperResult>) -> Self {
        let mut counts = Self::default();
        for result in results {
            counts.add(result.rating());
        }
        counts
    }

    pub fn add(&mut self, rating: RelevanceRating) {
        match rating {
            RelevanceRating::High => self.high += 1,
            RelevanceRating::Medium => self.medium += 1,
            RelevanceRating::Low => self.low += 1,
            RelevanceRating::Unknown => self.unknown += 1,
        }
    }

    pub fn get(&self, rating: RelevanceRating) -> usize {
        match rating {
            RelevanceRating::High => self.high,
            RelevanceRating::Medium => self.medium,
            RelevanceRating::Low => self.low,
            RelevanceRating::Unknown => self.unknown,
        }
    }

    pub fn total(&self) -> usize {
        self.high + self.medium + self.low + self.unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_label_never_yields_unknown() {
        assert_eq!(RelevanceRating::from_model_label("High"), Some(RelevanceRating::High));
        assert_eq!(RelevanceRating::from_model_label("Unknown"), None);
        assert_eq!(RelevanceRating::from_model_label("high"), None);
    }

    #[test]
    fn test_paper_result_serializes_flat() {
        let result = PaperResult {
            title: "T".to_string(),
            authors: vec!["A".to_string()],
            conference: "ICLR".to_string(),
            year: 2024,
            judgment: Judgment {
                relevance_rating: RelevanceRating::Medium,
                confidence_score: Some(0.6),
                reasoning: None,
            },
            file_source: "iclr_2024.json".to_string(),
        };

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["relevance_rating"], "Medium");
        assert_eq!(value["confidence_score"], 0.6);
        assert!(value["reasoning"].is_null());

        let back: PaperResult = serde_json::from_value(value).unwrap();
        assert_eq!(back, result);
    }

    #[test]
    fn test_rating_counts() {
        let mut counts = RatingCounts::default();
        counts.add(RelevanceRating::High);
        counts.add(RelevanceRating::Unknown);
        counts.add(RelevanceRating::High);
        assert_eq!(counts.get(RelevanceRating::High), 2);
        assert_eq!(counts.unknown, 1);
        assert_eq!(counts.total(), 3);
    }
}
