//! Edge creation against the graph store
//!
//! Edge writes are best effort: a failure is logged and reported as
//! `false`, never raised, so one bad edge cannot abort a unit.

use std::sync::Arc;

use tracing::{debug, warn};

use super::edge::{Edge, EdgeMetadata, RelationshipType};
use super::repository::{EdgeWrite, GraphRepository};

#[derive(Clone)]
pub struct EdgeStore {
    repository: Arc<dyn GraphRepository>,
}

impl EdgeStore {
    pub fn new(repository: Arc<dyn GraphRepository>) -> Self {
        Self { repository }
    }

    /// Write one directed edge; `true` when it exists afterwards
    pub async fn create_edge(
        &self,
        source_id: &str,
        target_id: &str,
        relationship_type: RelationshipType,
        metadata: Option<EdgeMetadata>,
    ) -> bool {
        let edge = Edge::new(source_id, target_id, relationship_type).with_metadata(metadata);

        match self.repository.upsert_edge(&edge).await {
            Ok(EdgeWrite::Inserted) => {
                debug!(
                    source = %edge.source_id,
                    target = %edge.target_id,
                    kind = %edge.relationship_type,
                    "Created edge"
                );
                true
            }
            Ok(EdgeWrite::AlreadyPresent) => {
                debug!(
                    source = %edge.source_id,
                    target = %edge.target_id,
                    kind = %edge.relationship_type,
                    "Edge already present"
                );
                true
            }
            Err(e) => {
                warn!(
                    source = %edge.source_id,
                    target = %edge.target_id,
                    kind = %edge.relationship_type,
                    error = %e,
                    "Failed to create edge"
                );
                false
            }
        }
    }

    /// Link a content node to each present entity with `mentions`
    ///
    /// Returns how many edges were written.
    pub async fn create_content_entity_edges(
        &self,
        content_id: &str,
        entity_ids: &[Option<String>],
    ) -> usize {
        let mut created = 0;
        for entity_id in entity_ids.iter().flatten() {
            if self
                .create_edge(content_id, entity_id, RelationshipType::Mentions, None)
                .await
            {
                created += 1;
            }
        }
        created
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::graph::{Node, NodeType};
    use crate::test_support::sqlite_repository;

    #[tokio::test]
    async fn test_duplicate_edge_is_a_noop() {
        let repo = sqlite_repository().await;
        let a = Node::new(NodeType::Content, "a", "A");
        let b = Node::entity("Codelco");
        repo.insert_node(&a).await.unwrap();
        repo.insert_node(&b).await.unwrap();

        let store = EdgeStore::new(repo.clone());
        assert!(store.create_edge(&a.id, &b.id, RelationshipType::Mentions, None).await);
        assert!(store.create_edge(&a.id, &b.id, RelationshipType::Mentions, None).await);

        assert_eq!(repo.count_edges().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_missing_endpoint_returns_false() {
        let repo = sqlite_repository().await;
        let a = Node::new(NodeType::Content, "a", "A");
        repo.insert_node(&a).await.unwrap();

        let store = EdgeStore::new(repo.clone());
        assert!(
            !store
                .create_edge(&a.id, "no-such-node", RelationshipType::Confirms, None)
                .await
        );
        assert_eq!(repo.count_edges().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_mentions_edges_skip_missing_entities() {
        let repo = sqlite_repository().await;
        let content = Node::new(NodeType::Content, "c", "C");
        let e1 = Node::entity("Codelco");
        let e2 = Node::entity("Chile");
        for n in [&content, &e1, &e2] {
            repo.insert_node(n).await.unwrap();
        }

        let store = EdgeStore::new(repo.clone());
        let created = store
            .create_content_entity_edges(
                &content.id,
                &[Some(e1.id.clone()), None, Some(e2.id.clone())],
            )
            .await;

        assert_eq!(created, 2);
        let edges = repo.list_edges_for_node(&content.id).await.unwrap();
        assert!(edges.iter().all(|e| e.relationship_type == RelationshipType::Mentions));
    }
}
