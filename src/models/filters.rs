//! 论文过滤条件
//!
//! 在分批之前由调用方应用，过滤后为空的文件直接标记为已处理。

use crate::config::FilterConfig;
use crate::models::paper::Paper;

/// 论文过滤器
#[derive(Debug, Clone, Default)]
pub struct PaperFilter {
    years: Option<(i32, i32)>,
    conferences: Vec<String>,
    keywords: Vec<String>,
}

impl PaperFilter {
    pub fn new(config: &FilterConfig) -> Self {
        Self {
            years: config.years,
            conferences: config.conferences.iter().map(|c| c.to_uppercase()).collect(),
            keywords: config.keywords.iter().map(|k| k.to_lowercase()).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.years.is_none() && self.conferences.is_empty() && self.keywords.is_empty()
    }

    /// 依次应用年份、会议、关键词过滤
    pub fn apply(&self, papers: Vec<Paper>) -> Vec<Paper> {
        papers.into_iter().filter(|p| self.matches(p)).collect()
    }

    pub fn matches(&self, paper: &Paper) -> bool {
        self.matches_year(paper) && self.matches_conference(paper) && self.matches_keywords(paper)
    }

    fn matches_year(&self, paper: &Paper) -> bool {
        match self.years {
            Some((start, end)) => (start..=end).contains(&paper.publication_year),
            None => true,
        }
    }

    // 会议名大小写不敏感
    fn matches_conference(&self, paper: &Paper) -> bool {
        self.conferences.is_empty()
            || self
                .conferences
                .contains(&paper.conference_name.to_uppercase())
    }

    // 任意关键词出现在标题或摘要中即可
    fn matches_keywords(&self, paper: &Paper) -> bool {
        if self.keywords.is_empty() {
            return true;
        }
        let title = paper.title.to_lowercase();
        let abstract_text = paper
            .abstract_text
            .as_deref()
            .unwrap_or_default()
            .to_lowercase();
        self.keywords
            .iter()
            .any(|kw| title.contains(kw) || abstract_text.contains(kw))
    }
}
