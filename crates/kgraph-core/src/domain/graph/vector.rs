//! Vector index abstraction
//!
//! Ids in the index are the graph node ids, so a match maps straight back
//! to a node without a lookup table.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

use super::distiller::AtomicUnit;
use super::metadata::{SourceContext, parse_timestamp, truncate_chars};
use super::node::NodeType;

/// Metadata stored next to each vector
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VectorMetadata {
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub source_type: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub original_url: String,
    #[serde(default)]
    pub text_snippet: String,
    /// Unix seconds of the source timestamp
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub timestamp_iso: String,
    /// Unix seconds of indexing
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub created_at_iso: String,
    #[serde(default)]
    pub node_type: String,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub key_entities: Vec<String>,
}

impl VectorMetadata {
    /// Metadata for a freshly created content node
    ///
    /// The snippet holds at most `snippet_chars` characters of `content`.
    /// A missing or unparseable source timestamp falls back to `now`.
    pub fn for_content(
        context: &SourceContext,
        content: &str,
        unit: &AtomicUnit,
        snippet_chars: usize,
        now: DateTime<Utc>,
    ) -> Self {
        let source_time = context
            .timestamp
            .as_deref()
            .map(str::trim)
            .and_then(parse_timestamp)
            .unwrap_or(now);

        Self {
            source: context.source.clone().unwrap_or_default(),
            source_type: context.source_type.clone().unwrap_or_default(),
            topic: context.topic.clone().unwrap_or_default(),
            original_url: context.original_url.clone().unwrap_or_default(),
            text_snippet: truncate_chars(content, snippet_chars).to_string(),
            timestamp: source_time.timestamp(),
            timestamp_iso: source_time.to_rfc3339(),
            created_at: now.timestamp(),
            created_at_iso: now.to_rfc3339(),
            node_type: NodeType::Content.as_str().to_string(),
            categories: unit.categories.clone(),
            key_entities: unit.key_entities.clone(),
        }
    }

    /// Value of a scalar field by name, for equality filters
    pub fn field(&self, key: &str) -> Option<Value> {
        let value = match key {
            "source" => Value::from(self.source.as_str()),
            "source_type" => Value::from(self.source_type.as_str()),
            "topic" => Value::from(self.topic.as_str()),
            "original_url" => Value::from(self.original_url.as_str()),
            "node_type" => Value::from(self.node_type.as_str()),
            "timestamp" => Value::from(self.timestamp),
            "created_at" => Value::from(self.created_at),
            _ => return None,
        };
        Some(value)
    }
}

/// One nearest-neighbour hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMatch {
    pub id: String,
    pub score: f32,
    #[serde(default)]
    pub metadata: Option<VectorMetadata>,
}

/// Equality filter over metadata fields
pub type VectorFilter = BTreeMap<String, Value>;

/// Similarity index keyed by node id
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace the vector stored under `id`
    async fn upsert(&self, id: &str, values: Vec<f32>, metadata: VectorMetadata) -> Result<()>;

    /// Up to `top_k` matches by descending similarity
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&VectorFilter>,
    ) -> Result<Vec<VectorMatch>>;

    /// Backend name for logs
    fn name(&self) -> &'static str;
}
