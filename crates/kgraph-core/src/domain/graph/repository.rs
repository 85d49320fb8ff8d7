//! Repository trait for graph persistence
//!
//! The relational side of the graph. Implementations must make entity
//! creation and edge creation idempotent through store-level uniqueness,
//! since concurrent ingest calls do not coordinate in process.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

use super::edge::{Edge, RelationshipType};
use super::node::{Node, NodeType};

/// Result of an edge upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeWrite {
    Inserted,
    /// Same (source, target, type) already present; nothing changed
    AlreadyPresent,
}

/// Aggregate counts over the graph
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphStats {
    pub total_nodes: u64,
    pub total_edges: u64,
    pub nodes_by_type: BTreeMap<String, u64>,
    pub edges_by_type: BTreeMap<String, u64>,
}

impl GraphStats {
    pub fn nodes_of(&self, node_type: NodeType) -> u64 {
        self.nodes_by_type
            .get(node_type.as_str())
            .copied()
            .unwrap_or(0)
    }

    pub fn edges_of(&self, relationship_type: &RelationshipType) -> u64 {
        self.edges_by_type
            .get(relationship_type.as_str())
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
pub trait GraphRepository: Send + Sync {
    /// Fails when the store is unreachable
    async fn health_check(&self) -> Result<()>;

    // ========== Node Operations ==========

    /// Insert a new node; fails if the id or an entity label collides
    async fn insert_node(&self, node: &Node) -> Result<()>;

    /// Insert an entity node unless one with this label exists, then
    /// return the id of the stored entity
    async fn upsert_entity(&self, label: &str) -> Result<Option<String>>;

    async fn get_node(&self, id: &str) -> Result<Option<Node>>;

    async fn get_node_label(&self, id: &str) -> Result<Option<String>>;

    async fn find_entity(&self, label: &str) -> Result<Option<Node>>;

    /// Newest first
    async fn list_nodes_by_type(&self, node_type: NodeType, limit: usize) -> Result<Vec<Node>>;

    async fn count_nodes(&self) -> Result<u64>;

    // ========== Duplicate Lookups ==========

    /// Id of a content node whose `original_url` property equals `url`
    async fn find_content_by_original_url(&self, url: &str) -> Result<Option<String>>;

    /// Id of a content node whose `hash` property equals `hash`
    async fn find_content_by_hash(&self, hash: &str) -> Result<Option<String>>;

    /// Subset of `urls` already stored on some content node
    async fn existing_original_urls(&self, urls: &[String]) -> Result<HashSet<String>>;

    // ========== Edge Operations ==========

    /// Insert unless (source, target, type) already exists
    async fn upsert_edge(&self, edge: &Edge) -> Result<EdgeWrite>;

    /// Edges where the node is source or target
    async fn list_edges_for_node(&self, node_id: &str) -> Result<Vec<Edge>>;

    async fn count_edges(&self) -> Result<u64>;

    // ========== Graph Queries ==========

    /// Nodes with no incident edge (a self-loop counts as incident)
    async fn orphan_nodes(&self, limit: usize) -> Result<Vec<Node>>;

    /// Topic and briefing nodes
    async fn hub_nodes(&self) -> Result<Vec<Node>>;

    async fn stats(&self) -> Result<GraphStats>;
}
