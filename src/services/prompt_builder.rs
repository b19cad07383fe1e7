use crate::config::SurveyConfig;
use crate::models::paper::Paper;

/// 模型回复需满足的 JSON 结构（嵌入提示词中）
const RESPONSE_SCHEMA: &str = r#"{
  "type": "object",
  "properties": {
    "relevance_rating": {
      "type": "string",
      "enum": ["High", "Medium", "Low"],
      "description": "Relevance level of the paper to the survey topic"
    },
    "confidence_score": {
      "type": "number",
      "minimum": 0.0,
      "maximum": 1.0,
      "description": "Confidence in the rating (0.0-1.0)"
    },
    "reasoning": {
      "type": "string",
      "minLength": 10,
      "description": "Brief explanation for the rating (2-3 sentences)"
    }
  },
  "required": ["relevance_rating", "confidence_score", "reasoning"]
}"#;

/// 相关性判断提示词构建器
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    topic: String,
    description: Option<String>,
}

impl PromptBuilder {
    pub fn new(survey: &SurveyConfig) -> Self {
        let description = survey.description.trim();
        Self {
            topic: survey.topic.clone(),
            description: (!description.is_empty()).then(|| description.to_string()),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// 为单篇论文构建提示词
    pub fn build(&self, paper: &Paper) -> String {
        let description_line = match &self.description {
            Some(description) => format!("SURVEY DESCRIPTION: {}\n", description),
            None => String::new(),
        };

        format!(
            r#"You are an expert researcher evaluating academic papers for a systematic literature review.

SURVEY TOPIC: {topic}
{description_line}
PAPER TO EVALUATE:
Title: {title}
Abstract: {abstract_text}
Conference: {conference} {year}

TASK: Evaluate this paper's relevance to the survey topic.

RATING GUIDELINES:
- High: Directly addresses the survey topic, core contribution aligns with survey scope
- Medium: Related to topic but not central, partial overlap or tangential relevance
- Low: Minimal connection, outside survey scope, or unrelated

INSTRUCTIONS:
1. Analyze the paper's title and abstract carefully
2. Determine relevance level based on topic alignment
3. Provide confidence score (0.0-1.0) based on how certain you are
4. Give brief reasoning for your decision (2-3 sentences)

You MUST respond with valid JSON matching this exact schema:
{schema}

Response:"#,
            topic = self.topic,
            description_line = description_line,
            title = paper.title,
            abstract_text = paper.abstract_or_placeholder(),
            conference = paper.conference_name,
            year = paper.publication_year,
            schema = RESPONSE_SCHEMA,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn paper(abstract_text: Option<&str>) -> Paper {
        Paper {
            title: "Sparse Attention for Long Documents".to_string(),
            authors: vec!["Ada".to_string()],
            abstract_text: abstract_text.map(str::to_string),
            publication_year: 2024,
            conference_name: "ICLR".to_string(),
            venue_type: "conference".to_string(),
            track: None,
            session: None,
            topic: None,
            pdf_url: None,
            abstract_url: None,
            openreview_url: None,
            scraped_at: NaiveDate::from_ymd_opt(2024, 5, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
        }
    }

    #[test]
    fn test_prompt_contains_paper_and_schema() {
        let builder = PromptBuilder::new(&SurveyConfig {
            topic: "Efficient Transformers".to_string(),
            description: "Methods that reduce attention cost".to_string(),
        });
        let prompt = builder.build(&paper(Some("We propose a sparse pattern.")));

        assert!(prompt.contains("SURVEY TOPIC: Efficient Transformers"));
        assert!(prompt.contains("SURVEY DESCRIPTION: Methods that reduce attention cost"));
        assert!(prompt.contains("Title: Sparse Attention for Long Documents"));
        assert!(prompt.contains("Abstract: We propose a sparse pattern."));
        assert!(prompt.contains("Conference: ICLR 2024"));
        assert!(prompt.contains(r#""enum": ["High", "Medium", "Low"]"#));
        assert!(prompt.trim_end().ends_with("Response:"));
    }

    #[test]
    fn test_prompt_placeholders() {
        let builder = PromptBuilder::new(&SurveyConfig {
            topic: "Efficient Transformers".to_string(),
            description: "  ".to_string(),
        });
        let prompt = builder.build(&paper(None));

        assert!(!prompt.contains("SURVEY DESCRIPTION"));
        assert!(prompt.contains("Abstract: No abstract available"));
    }
}
