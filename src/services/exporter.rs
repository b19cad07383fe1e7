//! CSV 导出 - 业务能力层
//!
//! 只负责把最终结果写成 CSV，不关心结果是怎么得到的。

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::models::judgment::{PaperResult, RatingCounts, RelevanceRating};

const RESULT_COLUMNS: [&str; 8] = [
    "title",
    "authors",
    "conference",
    "year",
    "relevance_rating",
    "confidence_score",
    "reasoning",
    "file_source",
];

/// CSV 导出器
pub struct CsvExporter {
    output_file: PathBuf,
}

impl CsvExporter {
    pub fn new(output_file: impl Into<PathBuf>) -> Self {
        Self {
            output_file: output_file.into(),
        }
    }

    pub fn output_file(&self) -> &Path {
        &self.output_file
    }

    /// 概要统计文件：`relevance_index.csv` → `relevance_index.summary.csv`
    pub fn summary_path(&self) -> PathBuf {
        self.output_file.with_extension("summary.csv")
    }

    /// 单一评级文件：`relevance_index.csv` → `relevance_index_high.csv`
    pub fn filtered_path(&self, rating: RelevanceRating) -> PathBuf {
        let stem = self
            .output_file
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        self.output_file
            .with_file_name(format!("{}_{}.csv", stem, rating.as_str().to_lowercase()))
    }

    /// 导出全部结果
    pub async fn export_results(&self, results: &[PaperResult]) -> AppResult<()> {
        write_results(&self.output_file, results).await?;
        info!(
            "📄 已导出 {} 条结果到 {}",
            results.len(),
            self.output_file.display()
        );
        Ok(())
    }

    /// 导出总体、按会议、按年份的评级分布
    pub async fn export_summary_stats(&self, results: &[PaperResult]) -> AppResult<PathBuf> {
        let overall = RatingCounts::tally(results);

        let mut by_conference: BTreeMap<&str, RatingCounts> = BTreeMap::new();
        let mut by_year: BTreeMap<i32, RatingCounts> = BTreeMap::new();
        for result in results {
            by_conference
                .entry(result.conference.as_str())
                .or_default()
                .add(result.rating());
            by_year.entry(result.year).or_default().add(result.rating());
        }

        let mut lines = Vec::new();
        lines.push("Overall Statistics".to_string());
        lines.push("Metric,Count,Percentage".to_string());
        lines.push(format!("Total Papers,{},100.0%", overall.total()));
        for rating in RelevanceRating::ALL {
            let count = overall.get(rating);
            if rating == RelevanceRating::Unknown && count == 0 {
                continue;
            }
            lines.push(format!(
                "{} Relevance,{},{}",
                rating,
                count,
                percentage(count, overall.total())
            ));
        }
        lines.push(String::new());

        lines.push("Conference Breakdown".to_string());
        lines.push("Conference,Total,High,Medium,Low,Unknown,High%".to_string());
        for (conference, counts) in &by_conference {
            lines.push(breakdown_row(&escape_csv_cell(conference), counts));
        }
        lines.push(String::new());

        lines.push("Year Breakdown".to_string());
        lines.push("Year,Total,High,Medium,Low,Unknown,High%".to_string());
        for (year, counts) in &by_year {
            lines.push(breakdown_row(&year.to_string(), counts));
        }

        let summary_path = self.summary_path();
        write_file(&summary_path, lines.join("\n") + "\n").await?;

        info!("📊 已导出概要统计到 {}", summary_path.display());
        let mut distribution = format!(
            "评级分布: High={}, Medium={}, Low={}",
            overall.high, overall.medium, overall.low
        );
        if overall.unknown > 0 {
            distribution.push_str(&format!(", Unknown={}", overall.unknown));
        }
        info!("{}", distribution);

        Ok(summary_path)
    }

    /// 只导出指定评级的论文；没有该评级时跳过并返回 None
    pub async fn create_filtered_csv(
        &self,
        results: &[PaperResult],
        rating: RelevanceRating,
    ) -> AppResult<Option<PathBuf>> {
        let filtered: Vec<PaperResult> = results
            .iter()
            .filter(|r| r.rating() == rating)
            .cloned()
            .collect();

        if filtered.is_empty() {
            warn!("⚠️ 没有评级为 {} 的论文，跳过导出", rating);
            return Ok(None);
        }

        let path = self.filtered_path(rating);
        write_results(&path, &filtered).await?;
        info!(
            "📄 已导出 {} 篇 {} 论文到 {}",
            filtered.len(),
            rating,
            path.display()
        );
        Ok(Some(path))
    }
}

async fn write_results(path: &Path, results: &[PaperResult]) -> AppResult<()> {
    let mut content = RESULT_COLUMNS.join(",");
    content.push('\n');

    for result in results {
        let confidence = result
            .judgment
            .confidence_score
            .map(|c| c.to_string())
            .unwrap_or_default();
        let row = [
            escape_csv_cell(&result.title),
            escape_csv_cell(&result.authors.join("; ")),
            escape_csv_cell(&result.conference),
            result.year.to_string(),
            result.rating().to_string(),
            confidence,
            escape_csv_cell(result.judgment.reasoning.as_deref().unwrap_or_default()),
            escape_csv_cell(&result.file_source),
        ];
        content.push_str(&row.join(","));
        content.push('\n');
    }

    write_file(path, content).await
}

async fn write_file(path: &Path, content: String) -> AppResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| AppError::io(parent.display().to_string(), e))?;
    }
    fs::write(path, content)
        .await
        .map_err(|e| AppError::io(path.display().to_string(), e))
}

fn breakdown_row(label: &str, counts: &RatingCounts) -> String {
    format!(
        "{},{},{},{},{},{},{}",
        label,
        counts.total(),
        counts.high,
        counts.medium,
        counts.low,
        counts.unknown,
        percentage(counts.high, counts.total())
    )
}

pub(crate) fn percentage(count: usize, total: usize) -> String {
    if total == 0 {
        return "0.0%".to_string();
    }
    format!("{:.1}%", count as f64 / total as f64 * 100.0)
}

fn escape_csv_cell(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r')
    {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::judgment::Judgment;

    fn result(title: &str, conference: &str, year: i32, rating: RelevanceRating) -> PaperResult {
        PaperResult {
            title: title.to_string(),
            authors: vec!["Lovelace, Ada".to_string(), "Turing".to_string()],
            conference: conference.to_string(),
            year,
            judgment: Judgment {
                relevance_rating: rating,
                confidence_score: Some(0.8),
                reasoning: Some("Says \"yes\" plainly.".to_string()),
            },
            file_source: format!("{}.json", conference.to_lowercase()),
        }
    }

    #[test]
    fn test_escape_csv_cell() {
        assert_eq!(escape_csv_cell("plain"), "plain");
        assert_eq!(escape_csv_cell("a,b"), "\"a,b\"");
        assert_eq!(escape_csv_cell("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_csv_cell("line\nbreak"), "\"line\nbreak\"");
    }

    #[test]
    fn test_derived_paths() {
        let exporter = CsvExporter::new("out/relevance_index.csv");
        assert_eq!(
            exporter.summary_path(),
            PathBuf::from("out/relevance_index.summary.csv")
        );
        assert_eq!(
            exporter.filtered_path(RelevanceRating::Medium),
            PathBuf::from("out/relevance_index_medium.csv")
        );
    }

    #[tokio::test]
    async fn test_export_results_writes_quoted_rows() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = CsvExporter::new(dir.path().join("results/index.csv"));
        let results = vec![
            result("Graph, Nets", "ICLR", 2024, RelevanceRating::High),
            PaperResult {
                judgment: Judgment {
                    relevance_rating: RelevanceRating::Unknown,
                    confidence_score: None,
                    reasoning: None,
                },
                ..result("Plain", "ICML", 2023, RelevanceRating::Low)
            },
        ];

        exporter.export_results(&results).await.unwrap();
        let content = std::fs::read_to_string(exporter.output_file()).unwrap();
        let lines: Vec<_> = content.lines().collect();

        assert_eq!(
            lines[0],
            "title,authors,conference,year,relevance_rating,confidence_score,reasoning,file_source"
        );
        assert_eq!(
            lines[1],
            r#""Graph, Nets","Lovelace, Ada; Turing",ICLR,2024,High,0.8,"Says ""yes"" plainly.",iclr.json"#
        );
        assert_eq!(lines[2], r#"Plain,"Lovelace, Ada; Turing",ICML,2023,Unknown,,,icml.json"#);
    }

    #[tokio::test]
    async fn test_summary_stats() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = CsvExporter::new(dir.path().join("index.csv"));
        let results = vec![
            result("a", "ICLR", 2024, RelevanceRating::High),
            result("b", "ICLR", 2023, RelevanceRating::Low),
            result("c", "ICML", 2024, RelevanceRating::Medium),
            result("d", "ICML", 2024, RelevanceRating::High),
        ];

        let path = exporter.export_summary_stats(&results).await.unwrap();
        let content = std::fs::read_to_string(path).unwrap();

        assert!(content.contains("Total Papers,4,100.0%"));
        assert!(content.contains("High Relevance,2,50.0%"));
        assert!(!content.contains("Unknown Relevance"));
        assert!(content.contains("ICLR,2,1,0,1,0,50.0%"));
        assert!(content.contains("2024,3,2,1,0,0,66.7%"));
    }

    #[tokio::test]
    async fn test_filtered_csv_skips_missing_rating() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = CsvExporter::new(dir.path().join("index.csv"));
        let results = vec![result("a", "ICLR", 2024, RelevanceRating::High)];

        let high = exporter
            .create_filtered_csv(&results, RelevanceRating::High)
            .await
            .unwrap();
        assert_eq!(high, Some(dir.path().join("index_high.csv")));

        let low = exporter
            .create_filtered_csv(&results, RelevanceRating::Low)
            .await
            .unwrap();
        assert!(low.is_none());
        assert!(!dir.path().join("index_low.csv").exists());
    }

    #[test]
    fn test_percentage() {
        assert_eq!(percentage(1, 3), "33.3%");
        assert_eq!(percentage(0, 0), "0.0%");
    }
}
