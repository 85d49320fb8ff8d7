//! Graph node model
//!
//! Nodes share one table regardless of type. The core writes `Content` and
//! `Entity` nodes; `Topic`, `Briefing` and `Learning` nodes come from
//! adjacent workflows and are only read here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;
use uuid::Uuid;

/// Label used when a content unit carries no summary
pub const UNTITLED_LABEL: &str = "Untitled document";

/// Closed set of node types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// An atomic unit of distilled text
    Content,
    /// A named entity, unique by label
    Entity,
    Topic,
    Briefing,
    Learning,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::Entity => "entity",
            Self::Topic => "topic",
            Self::Briefing => "briefing",
            Self::Learning => "learning",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "content" => Some(Self::Content),
            "entity" => Some(Self::Entity),
            "topic" => Some(Self::Topic),
            "briefing" => Some(Self::Briefing),
            "learning" => Some(Self::Learning),
            _ => None,
        }
    }

    pub fn all() -> &'static [NodeType] {
        &[
            Self::Content,
            Self::Entity,
            Self::Topic,
            Self::Briefing,
            Self::Learning,
        ]
    }

    /// Types that curation treats as hubs other nodes should hang off
    pub fn is_hub(&self) -> bool {
        matches!(self, Self::Topic | Self::Briefing)
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Properties stored as JSON on a node
///
/// Well-known keys are typed; anything else a collaborator passes along
/// survives in `extra` and is flattened back into the stored object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scraped_time: Option<String>,
    /// RFC 3339, UTC
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Opaque workflow marker owned by collaborators; any JSON shape
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_entities: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reading_time_minutes: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dialogue_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_length: Option<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NodeProperties {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Lenient parse
    ///
    /// A typed key holding an unexpected shape is kept verbatim in `extra`
    /// so the remaining fields still load. Only text that is not a JSON
    /// object yields empty properties.
    pub fn from_json(raw: &str) -> Self {
        let err = match serde_json::from_str(raw) {
            Ok(properties) => return properties,
            Err(e) => e,
        };

        let mut object = match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(object)) => object,
            _ => {
                warn!(error = %err, "Node properties are not a JSON object, ignoring them");
                return Self::default();
            }
        };

        let mut misfits = Map::new();
        for key in TYPED_PROPERTY_KEYS {
            let Some(value) = object.get(*key) else {
                continue;
            };
            let single = Map::from_iter([(key.to_string(), value.clone())]);
            if serde_json::from_value::<Self>(Value::Object(single)).is_err() {
                if let Some(value) = object.remove(*key) {
                    misfits.insert(key.to_string(), value);
                }
            }
        }

        warn!(
            error = %err,
            keys = ?misfits.keys().collect::<Vec<_>>(),
            "Node properties had unexpected shapes, kept them untyped"
        );
        let mut properties: Self = serde_json::from_value(Value::Object(object)).unwrap_or_default();
        properties.extra.extend(misfits);
        properties
    }
}

const TYPED_PROPERTY_KEYS: &[&str] = &[
    "source",
    "source_type",
    "topic",
    "original_url",
    "hash",
    "scraped_time",
    "timestamp",
    "status",
    "title",
    "ai_summary",
    "doc_type",
    "categories",
    "key_entities",
    "word_count",
    "reading_time_minutes",
    "dialogue_format",
    "session_length",
];

/// A graph node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub label: String,
    pub content: String,
    pub properties: NodeProperties,
    pub created_at: DateTime<Utc>,
}

impl Node {
    /// New content node; the label is derived from the summary and the id
    pub fn content(content: impl Into<String>, properties: NodeProperties) -> Self {
        let id = Uuid::new_v4().to_string();
        let label = content_label(properties.ai_summary.as_deref(), &id);
        Self {
            id,
            node_type: NodeType::Content,
            label,
            content: content.into(),
            properties,
            created_at: Utc::now(),
        }
    }

    /// New entity node with an empty body
    pub fn entity(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            node_type: NodeType::Entity,
            label: name.into(),
            content: String::new(),
            properties: NodeProperties::default(),
            created_at: Utc::now(),
        }
    }

    /// Arbitrary node, as written by adjacent workflows
    pub fn new(node_type: NodeType, label: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            node_type,
            label: label.into(),
            content: content.into(),
            properties: NodeProperties::default(),
            created_at: Utc::now(),
        }
    }

    pub fn short_id(&self) -> &str {
        short_id(&self.id)
    }
}

/// First eight characters of an id
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(8) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

/// "{summary or 'Untitled document'} - {first 8 chars of id}"
pub fn content_label(ai_summary: Option<&str>, id: &str) -> String {
    let title = ai_summary
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(UNTITLED_LABEL);
    format!("{} - {}", title, short_id(id))
}
