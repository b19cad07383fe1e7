use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// 论文元数据
///
/// 由 `PaperLoader` 从语料 JSON 文件创建，处理流程内只读。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paper {
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(rename = "abstract", default, skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,
    #[serde(deserialize_with = "deserialize_year")]
    pub publication_year: i32,
    /// 会议 / 期刊名称
    pub conference_name: String,
    /// 会议类型（conference、workshop 等）
    pub venue_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abstract_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openreview_url: Option<String>,
    /// 抓取时间
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub scraped_at: NaiveDateTime,
}

impl Paper {
    /// 摘要文本，缺失时返回占位说明
    pub fn abstract_or_placeholder(&self) -> &str {
        match self.abstract_text.as_deref() {
            Some(text) if !text.trim().is_empty() => text,
            _ => "No abstract available",
        }
    }
}

impl std::fmt::Display for Paper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // 截断标题以便显示（最多80个字符）
        let title_preview = if self.title.chars().count() > 80 {
            self.title.chars().take(80).collect::<String>() + "..."
        } else {
            self.title.clone()
        };
        write!(
            f,
            "{} [{} {}]",
            title_preview, self.conference_name, self.publication_year
        )
    }
}

// 年份既可能是整数也可能是字符串（"2024"）
fn deserialize_year<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Visitor;
    use std::fmt;

    struct YearVisitor;

    impl<'de> Visitor<'de> for YearVisitor {
        type Value = i32;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a string or integer representing a year")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            value
                .trim()
                .parse()
                .map_err(|_| E::custom(format!("invalid year: {value}")))
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            i32::try_from(value).map_err(|_| E::custom(format!("year out of range: {value}")))
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            i32::try_from(value).map_err(|_| E::custom(format!("year out of range: {value}")))
        }
    }

    deserializer.deserialize_any(YearVisitor)
}

// 抓取器写出的时间戳可能带时区（RFC 3339），也可能是不带时区的 ISO-8601
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
}

fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}
