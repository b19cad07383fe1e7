//! 模型响应解析 - 业务能力层
//!
//! 模型输出是自由文本，JSON 可能夹在解释文字、代码块或 `<think>` 推理过程中。
//! 解析按"先精确、后宽松"的顺序生成候选子串，逐个做严格校验，第一个通过的即为结果。

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, Span};

use crate::error::ParseError;
use crate::models::judgment::{Judgment, RelevanceRating};

/// 诊断信息保留的最大字符数
const DIAGNOSTIC_CHARS: usize = 300;
/// reasoning 去除首尾空白后的最少字符数
const MIN_REASONING_CHARS: usize = 10;
/// 未给出置信度时的默认值
const DEFAULT_CONFIDENCE: f64 = 0.5;

/// 候选提取规则（按优先级排列）
///
/// 有捕获组的规则取第一个捕获组，否则取整个匹配。
const CANDIDATE_PATTERNS: [&str; 10] = [
    // </think> 之后紧跟的 JSON
    r"(?is)</think>\s*(\{.*?\})",
    r#"(?is)</think>[^{]*(\{.*?"relevance_rating".*?\})"#,
    // 代码块
    r"(?is)```json\s*(\{.*?\})\s*```",
    r"(?is)```\s*(\{.*?\})\s*```",
    // 标签包裹
    r"(?is)<response>\s*(\{.*?\})\s*</response>",
    r"(?is)Response:\s*(\{.*?\})",
    // 含 relevance_rating 的对象（单层 / 一层嵌套）
    r#"(?is)\{[^{}]*"relevance_rating"[^{}]*\}"#,
    r#"(?is)\{(?:[^{}]|\{[^{}]*\})*"relevance_rating"(?:[^{}]|\{[^{}]*\})*\}"#,
    // 兜底：文本末尾的花括号 / 任意花括号
    r"(?is)(\{.*?\})\s*$",
    r"(?is)(\{.*?\})",
];

/// 模型应返回的 JSON 结构
#[derive(Debug, Deserialize)]
struct RawJudgment {
    relevance_rating: String,
    #[serde(default)]
    confidence_score: Option<RawConfidence>,
    reasoning: String,
}

/// 置信度可能是数字，也可能是数字字符串（"0.8"）
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawConfidence {
    Number(f64),
    Text(String),
}

/// 响应解析器
pub struct ResponseParser {
    think_block: Regex,
    think_tag: Regex,
    patterns: Vec<Regex>,
    span: Span,
}

impl ResponseParser {
    /// 创建解析器（编译内置正则）
    pub fn new() -> Result<Self, regex::Error> {
        let patterns = CANDIDATE_PATTERNS
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            think_block: Regex::new(r"(?is)<think>.*?</think>")?,
            think_tag: Regex::new(r"(?i)</?think>")?,
            patterns,
            span: tracing::debug_span!("response_parser"),
        })
    }

    /// 从模型原始输出中解析判断结果
    pub fn parse(&self, raw: &str) -> Result<Judgment, ParseError> {
        let _guard = self.span.enter();

        let raw = raw.trim();
        let lowered = raw.to_lowercase();
        let has_thinking = lowered.contains("<think>") || lowered.contains("</think>");

        let cleaned = if has_thinking {
            debug!("检测到思考模型响应，去除 <think> 内容后提取 JSON");
            Some(self.remove_thinking(raw))
        } else {
            None
        };

        let candidates = self.extract_candidates(raw, cleaned.as_deref());
        debug!("共提取 {} 个候选 JSON", candidates.len());

        for (i, candidate) in candidates.iter().enumerate() {
            match attempt(candidate) {
                Ok(judgment) => {
                    debug!("第 {} 个候选校验通过", i + 1);
                    return Ok(judgment);
                }
                Err(e) => {
                    debug!("第 {} 个候选校验失败: {}", i + 1, e);
                    debug!("候选内容: {}", preview(candidate, 200));
                }
            }
        }

        let source = cleaned.as_deref().unwrap_or(raw);
        Err(ParseError::NoValidCandidate {
            diagnostic: source.chars().take(DIAGNOSTIC_CHARS).collect(),
            had_thinking: has_thinking,
        })
    }

    /// 去除 `<think>...</think>` 及残留的单个标签
    fn remove_thinking(&self, text: &str) -> String {
        let without_blocks = self.think_block.replace_all(text, "");
        self.think_tag
            .replace_all(&without_blocks, "")
            .trim()
            .to_string()
    }

    /// 生成有序、去重的候选列表
    ///
    /// 去除思考内容后的文本优先于原始文本；整段文本作为最低优先级的候选。
    fn extract_candidates(&self, raw: &str, cleaned: Option<&str>) -> Vec<String> {
        let mut candidates: Vec<String> = Vec::new();
        let mut push = |candidate: &str| {
            let candidate = candidate.trim();
            if !candidate.is_empty() && !candidates.iter().any(|c| c == candidate) {
                candidates.push(candidate.to_string());
            }
        };

        let sources: Vec<&str> = match cleaned {
            Some(cleaned) => vec![cleaned, raw],
            None => vec![raw],
        };

        for text in &sources {
            for pattern in &self.patterns {
                for caps in pattern.captures_iter(text) {
                    if let Some(m) = caps.get(1).or_else(|| caps.get(0)) {
                        push(m.as_str());
                    }
                }
            }
        }

        for text in &sources {
            let whole = text.trim();
            if whole.starts_with('{') && whole.ends_with('}') {
                push(whole);
            }
        }

        candidates
    }
}

/// 对单个候选做严格校验
fn attempt(candidate: &str) -> Result<Judgment, ParseError> {
    let raw: RawJudgment = serde_json::from_str(candidate).map_err(|e| {
        if e.is_data() {
            ParseError::schema("<object>", e.to_string())
        } else {
            ParseError::InvalidJson(e.to_string())
        }
    })?;
    validate(raw)
}

fn validate(raw: RawJudgment) -> Result<Judgment, ParseError> {
    let rating = RelevanceRating::from_model_label(&raw.relevance_rating).ok_or_else(|| {
        ParseError::schema(
            "relevance_rating",
            format!(
                "必须是 'High'、'Medium' 或 'Low'，实际为 '{}'",
                raw.relevance_rating
            ),
        )
    })?;

    let confidence = match raw.confidence_score {
        None => DEFAULT_CONFIDENCE,
        Some(RawConfidence::Number(value)) => value,
        Some(RawConfidence::Text(text)) => text.trim().parse::<f64>().map_err(|_| {
            ParseError::schema("confidence_score", format!("不是数字: '{}'", text))
        })?,
    };
    if !confidence.is_finite() {
        return Err(ParseError::schema("confidence_score", "不是有限数值"));
    }

    let reasoning = raw.reasoning.trim();
    if reasoning.chars().count() < MIN_REASONING_CHARS {
        return Err(ParseError::schema(
            "reasoning",
            format!("至少需要 {} 个字符", MIN_REASONING_CHARS),
        ));
    }

    Ok(Judgment {
        relevance_rating: rating,
        confidence_score: Some(repair_confidence(rating, confidence.clamp(0.0, 1.0))),
        reasoning: Some(reasoning.to_string()),
    })
}

/// 评级与置信度的一致性修正：High 至少 0.3，Low 至多 0.8
fn repair_confidence(rating: RelevanceRating, confidence: f64) -> f64 {
    match rating {
        RelevanceRating::High if confidence < 0.3 => 0.3,
        RelevanceRating::Low if confidence > 0.8 => 0.8,
        _ => confidence,
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
