//! Graph edge model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Type of a directed edge
///
/// The core only writes the named variants. Edges written by other
/// workflows (e.g. "generated-learning") load as `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RelationshipType {
    /// Content node mentions an entity
    Mentions,
    Confirms,
    Contradicts,
    Expands,
    /// Cause and effect between two documents
    Causal,
    References,
    /// Self-loop marking a node as reviewed with nothing found
    ReviewedNoAction,
    Other(String),
}

impl RelationshipType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Mentions => "mentions",
            Self::Confirms => "confirms",
            Self::Contradicts => "contradicts",
            Self::Expands => "expands",
            Self::Causal => "causal",
            Self::References => "references",
            Self::ReviewedNoAction => "reviewed-no-action",
            Self::Other(s) => s,
        }
    }

    /// Parse a stored or model-produced type name
    ///
    /// Case, `_` and spaces are normalised so "Cause_Effect" and
    /// "cause effect" land on `Causal`.
    pub fn parse(s: &str) -> Self {
        let normalized = s.trim().to_lowercase().replace(['_', ' '], "-");
        match normalized.as_str() {
            "mentions" => Self::Mentions,
            "confirms" => Self::Confirms,
            "contradicts" => Self::Contradicts,
            "expands" => Self::Expands,
            "causal" | "cause-effect" | "cause-and-effect" => Self::Causal,
            "references" => Self::References,
            "reviewed-no-action" => Self::ReviewedNoAction,
            _ => Self::Other(s.trim().to_string()),
        }
    }

    /// Types the semantic linker may assign between two content nodes
    pub fn semantic() -> &'static [RelationshipType] {
        &[
            Self::Confirms,
            Self::Contradicts,
            Self::Expands,
            Self::Causal,
            Self::References,
        ]
    }

    pub fn is_semantic(&self) -> bool {
        Self::semantic().contains(self)
    }
}

impl std::fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<String> for RelationshipType {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<RelationshipType> for String {
    fn from(t: RelationshipType) -> Self {
        t.as_str().to_string()
    }
}

/// Justification attached to an edge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeMetadata {
    pub justification: String,
}

impl EdgeMetadata {
    pub fn justified(justification: impl Into<String>) -> Self {
        Self {
            justification: justification.into(),
        }
    }
}

/// A directed, typed edge between two nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    pub relationship_type: RelationshipType,
    pub metadata: Option<EdgeMetadata>,
    pub created_at: DateTime<Utc>,
}

impl Edge {
    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        relationship_type: RelationshipType,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source_id: source_id.into(),
            target_id: target_id.into(),
            relationship_type,
            metadata: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, metadata: Option<EdgeMetadata>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn is_self_loop(&self) -> bool {
        self.source_id == self.target_id
    }
}
