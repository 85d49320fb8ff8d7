//! Node creation against the graph store

use std::sync::Arc;

use tracing::debug;

use crate::error::Result;

use super::node::{Node, NodeProperties};
use super::repository::GraphRepository;

/// Writes content and entity nodes
#[derive(Clone)]
pub struct NodeStore {
    repository: Arc<dyn GraphRepository>,
}

impl NodeStore {
    pub fn new(repository: Arc<dyn GraphRepository>) -> Self {
        Self { repository }
    }

    /// Create a content node and return its new id
    ///
    /// The label is "{ai_summary or 'Untitled document'} - {id prefix}".
    pub async fn create_content_node(
        &self,
        content: &str,
        properties: NodeProperties,
    ) -> Result<String> {
        let node = Node::content(content, properties);
        self.repository.insert_node(&node).await?;
        debug!(node_id = %node.id, label = %node.label, "Created content node");
        Ok(node.id)
    }

    /// Return the id of the entity labelled `name`, creating it if needed
    ///
    /// Blank names yield `None` without touching the store.
    pub async fn create_entity_node(&self, name: &str) -> Result<Option<String>> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(None);
        }
        self.repository.upsert_entity(name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::graph::NodeType;
    use crate::test_support::sqlite_repository;

    #[tokio::test]
    async fn test_create_content_node_persists_properties() {
        let repo = sqlite_repository().await;
        let store = NodeStore::new(repo.clone());

        let props = NodeProperties {
            ai_summary: Some("Lithium demand rises".to_string()),
            source: Some("Reuters".to_string()),
            ..Default::default()
        };
        let id = store.create_content_node("Body text", props).await.unwrap();

        let node = repo.get_node(&id).await.unwrap().unwrap();
        assert_eq!(node.node_type, NodeType::Content);
        assert_eq!(node.content, "Body text");
        assert!(node.label.starts_with("Lithium demand rises - "));
        assert_eq!(node.properties.source.as_deref(), Some("Reuters"));
    }

    #[tokio::test]
    async fn test_entity_creation_is_idempotent() {
        let repo = sqlite_repository().await;
        let store = NodeStore::new(repo.clone());

        let first = store.create_entity_node("Codelco").await.unwrap();
        let second = store.create_entity_node("  Codelco ").await.unwrap();

        assert!(first.is_some());
        assert_eq!(first, second);
        assert_eq!(repo.count_nodes().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_blank_entity_name_is_skipped() {
        let repo = sqlite_repository().await;
        let store = NodeStore::new(repo.clone());

        assert_eq!(store.create_entity_node("   ").await.unwrap(), None);
        assert_eq!(repo.count_nodes().await.unwrap(), 0);
    }
}
