//! Source context and derived node metadata
//!
//! Everything here is deterministic given the input text, the caller's
//! source context and a clock reading.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::distiller::AtomicUnit;
use super::node::NodeProperties;

/// Words per minute used for reading time
pub const WORDS_PER_MINUTE: usize = 200;

/// What the caller knows about the text being ingested
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    /// Any ISO-8601 form; normalised to RFC 3339 UTC when stored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scraped_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Overrides the default indexing decision for this call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_to_vector_store: Option<bool>,
    /// Turn count of a complete briefing dialogue
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_length: Option<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SourceContext {
    pub fn new(
        source: impl Into<String>,
        topic: impl Into<String>,
        source_type: impl Into<String>,
    ) -> Self {
        Self {
            source: Some(source.into()),
            topic: Some(topic.into()),
            source_type: Some(source_type.into()),
            ..Default::default()
        }
    }

    pub fn with_original_url(mut self, url: impl Into<String>) -> Self {
        self.original_url = Some(url.into());
        self
    }

    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = Some(hash.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_index_override(mut self, index: bool) -> Self {
        self.index_to_vector_store = Some(index);
        self
    }

    pub fn with_session_length(mut self, turns: u32) -> Self {
        self.session_length = Some(turns);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Trimmed source type, empty when absent
    pub fn source_type(&self) -> &str {
        self.source_type.as_deref().map(str::trim).unwrap_or("")
    }
}

/// Counts derived from a unit's text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentMetrics {
    pub word_count: usize,
    pub reading_time_minutes: usize,
    pub character_count: usize,
}

impl ContentMetrics {
    pub fn of(content: &str) -> Self {
        let word_count = content.split_whitespace().count();
        Self {
            word_count,
            reading_time_minutes: word_count.div_ceil(WORDS_PER_MINUTE),
            character_count: content.chars().count(),
        }
    }
}

/// Normalise a caller timestamp to RFC 3339 in UTC
///
/// Accepts RFC 3339 with any offset, naive date-times (read as UTC) and bare
/// dates. Absent or unparseable input yields `now`.
pub fn normalize_timestamp(raw: Option<&str>, now: DateTime<Utc>) -> String {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(parse_timestamp)
        .unwrap_or(now)
        .to_rfc3339()
}

/// Parse the timestamp forms callers send
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Build the stored property record for one content unit
pub fn build_properties(
    content: &str,
    context: &SourceContext,
    unit: &AtomicUnit,
    now: DateTime<Utc>,
) -> NodeProperties {
    let metrics = ContentMetrics::of(content);

    NodeProperties {
        source: context.source.clone(),
        source_type: context.source_type.clone(),
        topic: context.topic.clone(),
        original_url: context.original_url.clone(),
        hash: context.hash.clone(),
        scraped_time: context.scraped_time.clone(),
        timestamp: Some(normalize_timestamp(context.timestamp.as_deref(), now)),
        status: context.status.clone().map(Value::String),
        title: non_empty(&unit.title),
        ai_summary: non_empty(&unit.ai_summary),
        doc_type: non_empty(&unit.doc_type),
        categories: unit.categories.clone(),
        key_entities: unit.key_entities.clone(),
        word_count: Some(metrics.word_count),
        reading_time_minutes: Some(metrics.reading_time_minutes),
        dialogue_format: unit.dialogue_format.clone(),
        session_length: unit.session_length,
        extra: context.extra.clone(),
    }
}

/// Longest prefix of `s` holding at most `max_chars` characters
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}
