//! Graph maintenance queries

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::error::Result;

use super::node::Node;
use super::repository::GraphRepository;

/// Upper bound on orphans fetched per cycle
pub const ORPHAN_SCAN_LIMIT: usize = 500;

#[derive(Debug, Clone, Default, Serialize)]
pub struct CurationReport {
    pub orphan_count: usize,
    pub hub_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    /// Orphans whose `topic` property matches `topic`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic_orphan_count: Option<usize>,
}

#[derive(Clone)]
pub struct Curator {
    repository: Arc<dyn GraphRepository>,
}

impl Curator {
    pub fn new(repository: Arc<dyn GraphRepository>) -> Self {
        Self { repository }
    }

    /// Nodes with no incident edge; reviewed nodes have a self-loop and are
    /// not orphans
    pub async fn orphan_nodes(&self, limit: usize) -> Result<Vec<Node>> {
        self.repository.orphan_nodes(limit).await
    }

    pub async fn hub_nodes(&self) -> Result<Vec<Node>> {
        self.repository.hub_nodes().await
    }

    pub async fn run_cycle(&self, topic: Option<&str>) -> Result<CurationReport> {
        let orphans = self.orphan_nodes(ORPHAN_SCAN_LIMIT).await?;
        let hubs = self.hub_nodes().await?;

        let topic = topic.map(str::trim).filter(|t| !t.is_empty());
        let topic_orphan_count = topic.map(|t| {
            orphans
                .iter()
                .filter(|n| {
                    n.properties
                        .topic
                        .as_deref()
                        .is_some_and(|nt| nt.eq_ignore_ascii_case(t))
                })
                .count()
        });

        let report = CurationReport {
            orphan_count: orphans.len(),
            hub_count: hubs.len(),
            topic: topic.map(str::to_string),
            topic_orphan_count,
        };
        info!(
            orphans = report.orphan_count,
            hubs = report.hub_count,
            "Curation cycle complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::graph::{EdgeStore, NodeProperties, NodeType, RelationshipType};
    use crate::test_support::sqlite_repository;

    #[tokio::test]
    async fn test_cycle_counts_orphans_and_hubs() {
        let repo = sqlite_repository().await;

        let mut lonely = Node::new(NodeType::Content, "lonely", "a");
        lonely.properties = NodeProperties {
            topic: Some("Copper".to_string()),
            ..Default::default()
        };
        let reviewed = Node::new(NodeType::Content, "reviewed", "b");
        let hub = Node::new(NodeType::Topic, "Copper", "");
        for n in [&lonely, &reviewed, &hub] {
            repo.insert_node(n).await.unwrap();
        }
        EdgeStore::new(repo.clone())
            .create_edge(&reviewed.id, &reviewed.id, RelationshipType::ReviewedNoAction, None)
            .await;

        let report = Curator::new(repo.clone())
            .run_cycle(Some("copper"))
            .await
            .unwrap();

        assert_eq!(report.orphan_count, 2);
        assert_eq!(report.hub_count, 1);
        assert_eq!(report.topic_orphan_count, Some(1));
    }
}
