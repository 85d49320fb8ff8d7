//! Semantic linker for freshly indexed content nodes
//!
//! For one node: embed, find nearest neighbours, fetch their labels, ask the
//! model to classify every pair in a single call, and write the resulting
//! edges. If the batched call fails, each pair is classified on its own.
//! A node that ends up with no semantic edge gets one `reviewed-no-action`
//! self-loop so curation can tell "reviewed" from "never looked at".

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::llm::{Embedder, StructuredOutput};

use super::edge::{EdgeMetadata, RelationshipType};
use super::edge_store::EdgeStore;
use super::metadata::truncate_chars;
use super::node::short_id;
use super::repository::GraphRepository;
use super::vector::VectorIndex;

/// Justification on the self-loop when the index returns no neighbours
pub const NO_NEIGHBOURS_JUSTIFICATION: &str = "no semantically similar nodes found";

/// Justification on the self-loop when no pair was worth an edge
pub const NOTHING_RELEVANT_JUSTIFICATION: &str = "reviewed; no relationships of value found";

const IRRELEVANT: &str = "irrelevant";

#[derive(Debug, Clone)]
pub struct ArchivistConfig {
    /// Neighbours to classify
    pub top_k: usize,
    /// Characters of the new node shown in the batched prompt
    pub new_content_chars: usize,
    /// Characters of each candidate and of the new node in pair prompts
    pub candidate_chars: usize,
}

impl Default for ArchivistConfig {
    fn default() -> Self {
        Self {
            top_k: 6,
            new_content_chars: 4000,
            candidate_chars: 2000,
        }
    }
}

/// Linking progress for one node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    Created,
    Searched,
    Linked(usize),
    ReviewedNoAction,
    Done,
}

/// Which classification route produced the edges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationPath {
    Batch,
    PerCandidate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LinkOutcome {
    Linked {
        connections: usize,
        path: ClassificationPath,
    },
    ReviewedNoAction {
        reason: String,
    },
    Skipped {
        reason: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkReport {
    pub outcome: LinkOutcome,
    pub trace: Vec<LinkState>,
}

impl LinkReport {
    pub fn connections_created(&self) -> usize {
        match self.outcome {
            LinkOutcome::Linked { connections, .. } => connections,
            _ => 0,
        }
    }

    /// `false` only when linking never ran
    pub fn success(&self) -> bool {
        !matches!(self.outcome, LinkOutcome::Skipped { .. })
    }

    pub fn final_state(&self) -> Option<LinkState> {
        self.trace.last().copied()
    }
}

/// A neighbour with its stored label
#[derive(Debug, Clone)]
struct Candidate {
    id: String,
    label: String,
}

/// A classified pair ready to be written
#[derive(Debug, Clone, PartialEq)]
struct Classification {
    candidate: usize,
    relationship_type: RelationshipType,
    justification: String,
}

#[derive(Debug, Deserialize)]
struct BatchReply {
    #[serde(default)]
    connections: Vec<BatchConnection>,
}

#[derive(Debug, Deserialize)]
struct BatchConnection {
    node_index: i64,
    relationship_type: String,
    #[serde(default)]
    justification: String,
}

#[derive(Debug, Deserialize)]
struct PairReply {
    relationship_type: String,
    #[serde(default)]
    justification: String,
}

fn relationship_enum() -> Value {
    let mut names: Vec<Value> = RelationshipType::semantic()
        .iter()
        .map(|t| Value::from(t.as_str()))
        .collect();
    names.push(Value::from(IRRELEVANT));
    Value::Array(names)
}

/// Schema for the batched classification reply
pub fn batch_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "connections": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "node_index": {"type": "integer"},
                        "relationship_type": {"type": "string", "enum": relationship_enum()},
                        "justification": {"type": "string"}
                    },
                    "required": ["node_index", "relationship_type", "justification"]
                }
            }
        },
        "required": ["connections"]
    })
}

/// Schema for a single-pair classification reply
pub fn pair_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "relationship_type": {"type": "string", "enum": relationship_enum()},
            "justification": {"type": "string"}
        },
        "required": ["relationship_type", "justification"]
    })
}

const TAXONOMY: &str = r#"- "confirms": the existing document confirms information in the new one
- "contradicts": the existing document contradicts information in the new one
- "expands": the existing document adds detail or context to the new one
- "causal": one document describes a cause of what the other describes
- "references": the documents refer to the same event or actor without the above
- "irrelevant": no meaningful relationship"#;

pub struct Archivist {
    repository: Arc<dyn GraphRepository>,
    edges: EdgeStore,
    vector_index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    model: Arc<dyn StructuredOutput>,
    config: ArchivistConfig,
}

impl Archivist {
    pub fn new(
        repository: Arc<dyn GraphRepository>,
        vector_index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn StructuredOutput>,
    ) -> Self {
        Self {
            edges: EdgeStore::new(repository.clone()),
            repository,
            vector_index,
            embedder,
            model,
            config: ArchivistConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ArchivistConfig) -> Self {
        self.config = config;
        self
    }

    /// Link `node_id` to its semantic neighbours
    ///
    /// Errors from embedding, the index query or the reviewed-no-action
    /// write propagate; classification errors never do.
    pub async fn link(&self, node_id: &str, content: &str) -> Result<LinkReport> {
        let mut trace = vec![LinkState::Created];

        if content.trim().is_empty() {
            info!(node = short_id(node_id), "Skipping node with empty content");
            return Ok(LinkReport {
                outcome: LinkOutcome::Skipped {
                    reason: "empty content".to_string(),
                },
                trace,
            });
        }

        let neighbour_ids = self.nearest_neighbours(node_id, content).await?;
        trace.push(LinkState::Searched);
        debug!(
            node = short_id(node_id),
            neighbours = neighbour_ids.len(),
            "Neighbour search complete"
        );

        if neighbour_ids.is_empty() {
            return Ok(self
                .review_no_action(node_id, NO_NEIGHBOURS_JUSTIFICATION, trace)
                .await?);
        }

        let candidates = self.load_candidates(&neighbour_ids).await;
        if candidates.is_empty() {
            return Ok(self
                .review_no_action(node_id, NO_NEIGHBOURS_JUSTIFICATION, trace)
                .await?);
        }

        let (classifications, path) = match self.classify_batch(content, &candidates).await {
            Ok(found) => (found, ClassificationPath::Batch),
            Err(e) => {
                warn!(
                    node = short_id(node_id),
                    error = %e,
                    "Batched classification failed, classifying pairs one by one"
                );
                (
                    self.classify_each(content, &candidates).await,
                    ClassificationPath::PerCandidate,
                )
            }
        };

        let mut connections = 0;
        for c in classifications {
            let target = &candidates[c.candidate].id;
            if self
                .edges
                .create_edge(
                    node_id,
                    target,
                    c.relationship_type,
                    Some(EdgeMetadata::justified(c.justification)),
                )
                .await
            {
                connections += 1;
            }
        }

        if connections == 0 {
            return Ok(self
                .review_no_action(node_id, NOTHING_RELEVANT_JUSTIFICATION, trace)
                .await?);
        }

        info!(node = short_id(node_id), connections, ?path, "Linked node");
        trace.push(LinkState::Linked(connections));
        trace.push(LinkState::Done);
        Ok(LinkReport {
            outcome: LinkOutcome::Linked { connections, path },
            trace,
        })
    }

    async fn nearest_neighbours(&self, node_id: &str, content: &str) -> Result<Vec<String>> {
        let embedding = self.embedder.embed_text(content).await?;
        let matches = self
            .vector_index
            .query(&embedding, self.config.top_k + 1, None)
            .await?;

        let mut seen = HashSet::new();
        Ok(matches
            .into_iter()
            .map(|m| m.id)
            .filter(|id| id != node_id && seen.insert(id.clone()))
            .take(self.config.top_k)
            .collect())
    }

    async fn load_candidates(&self, ids: &[String]) -> Vec<Candidate> {
        let mut candidates = Vec::with_capacity(ids.len());
        for id in ids {
            match self.repository.get_node_label(id).await {
                Ok(Some(label)) if !label.trim().is_empty() => candidates.push(Candidate {
                    id: id.clone(),
                    label,
                }),
                Ok(_) => debug!(node = short_id(id), "Neighbour has no stored label"),
                Err(e) => warn!(node = short_id(id), error = %e, "Failed to load neighbour label"),
            }
        }
        candidates
    }

    fn batch_prompt(&self, content: &str, candidates: &[Candidate]) -> String {
        let mut prompt = format!(
            "You are an intelligence analyst. Analyse how one new document relates to several existing documents.\n\n\
             NEW DOCUMENT:\n{}\n\nEXISTING DOCUMENTS:\n",
            truncate_chars(content, self.config.new_content_chars)
        );
        for (i, candidate) in candidates.iter().enumerate() {
            prompt.push_str(&format!(
                "\n{}. ID: {}...\n   Content: {}\n",
                i + 1,
                short_id(&candidate.id),
                truncate_chars(&candidate.label, self.config.candidate_chars)
            ));
        }
        prompt.push_str(&format!(
            "\nFor each existing document, decide its relationship to the new one:\n{}\n\n\
             Return one entry per existing document, using its number as node_index.",
            TAXONOMY
        ));
        prompt
    }

    fn pair_prompt(&self, content: &str, candidate: &Candidate) -> String {
        format!(
            "Analyse the relationship between these two documents.\nNew: {}\nExisting: {}\n\n\
             Relationship types:\n{}\n\nGive the relationship type and a short justification.",
            truncate_chars(content, self.config.candidate_chars),
            truncate_chars(&candidate.label, self.config.candidate_chars),
            TAXONOMY
        )
    }

    async fn classify_batch(
        &self,
        content: &str,
        candidates: &[Candidate],
    ) -> Result<Vec<Classification>> {
        let prompt = self.batch_prompt(content, candidates);
        let reply = self
            .model
            .generate_structured(None, &prompt, &batch_schema())
            .await?;
        let reply: BatchReply = serde_json::from_value(reply)?;
        Ok(select_batch_results(reply.connections, candidates.len()))
    }

    async fn classify_each(&self, content: &str, candidates: &[Candidate]) -> Vec<Classification> {
        let schema = pair_schema();
        let mut found = Vec::new();

        for (index, candidate) in candidates.iter().enumerate() {
            let prompt = self.pair_prompt(content, candidate);
            let reply = match self.model.generate_structured(None, &prompt, &schema).await {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(node = short_id(&candidate.id), error = %e, "Pair classification failed");
                    continue;
                }
            };
            let reply: PairReply = match serde_json::from_value(reply) {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(node = short_id(&candidate.id), error = %e, "Pair reply not decodable");
                    continue;
                }
            };
            if let Some(relationship_type) = semantic_type(&reply.relationship_type) {
                found.push(Classification {
                    candidate: index,
                    relationship_type,
                    justification: reply.justification,
                });
            }
        }

        found
    }

    async fn review_no_action(
        &self,
        node_id: &str,
        justification: &str,
        mut trace: Vec<LinkState>,
    ) -> Result<LinkReport> {
        let written = self
            .edges
            .create_edge(
                node_id,
                node_id,
                RelationshipType::ReviewedNoAction,
                Some(EdgeMetadata::justified(justification)),
            )
            .await;
        if !written {
            return Err(Error::GraphWriteFailed(format!(
                "could not mark node {} as reviewed",
                short_id(node_id)
            )));
        }

        info!(node = short_id(node_id), justification, "Node reviewed, no links");
        trace.push(LinkState::ReviewedNoAction);
        trace.push(LinkState::Done);
        Ok(LinkReport {
            outcome: LinkOutcome::ReviewedNoAction {
                reason: justification.to_string(),
            },
            trace,
        })
    }
}

/// Map a model type name to a writable semantic type; `None` for
/// "irrelevant" and anything outside the taxonomy
fn semantic_type(raw: &str) -> Option<RelationshipType> {
    if raw.trim().eq_ignore_ascii_case(IRRELEVANT) {
        return None;
    }
    let parsed = RelationshipType::parse(raw);
    if parsed.is_semantic() {
        Some(parsed)
    } else {
        warn!(relationship_type = raw, "Ignoring unknown relationship type");
        None
    }
}

/// Keep batch entries whose 1-based index names a candidate, first entry
/// per candidate wins
fn select_batch_results(
    connections: Vec<BatchConnection>,
    candidate_count: usize,
) -> Vec<Classification> {
    let mut seen = HashSet::new();
    let mut selected = Vec::new();

    for connection in connections {
        let index = connection.node_index;
        if index < 1 || index as usize > candidate_count {
            warn!(node_index = index, candidate_count, "Ignoring out-of-range node index");
            continue;
        }
        let candidate = (index - 1) as usize;
        if !seen.insert(candidate) {
            warn!(node_index = index, "Ignoring duplicate node index");
            continue;
        }
        if let Some(relationship_type) = semantic_type(&connection.relationship_type) {
            selected.push(Classification {
                candidate,
                relationship_type,
                justification: connection.justification,
            });
        }
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::graph::{Node, NodeType, VectorMetadata};
    use crate::error::Error;
    use crate::infrastructure::vector::MemoryVectorIndex;
    use crate::test_support::{KeywordEmbedder, ScriptedModel, sqlite_repository};

    fn conn(index: i64, kind: &str) -> BatchConnection {
        BatchConnection {
            node_index: index,
            relationship_type: kind.to_string(),
            justification: format!("{} because", kind),
        }
    }

    #[test]
    fn test_batch_indices_are_one_based_and_validated() {
        let selected = select_batch_results(
            vec![
                conn(1, "confirms"),
                conn(0, "expands"),
                conn(4, "expands"),
                conn(1, "contradicts"),
                conn(2, "irrelevant"),
                conn(3, "causal"),
            ],
            3,
        );

        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0].candidate, 0);
        assert_eq!(selected[0].relationship_type, RelationshipType::Confirms);
        assert_eq!(selected[1].candidate, 2);
        assert_eq!(selected[1].relationship_type, RelationshipType::Causal);
    }

    #[test]
    fn test_unknown_types_are_dropped() {
        assert_eq!(semantic_type("Irrelevant"), None);
        assert_eq!(semantic_type("mentions"), None);
        assert_eq!(semantic_type("supports"), None);
        assert_eq!(semantic_type("Expands"), Some(RelationshipType::Expands));
    }

    #[test]
    fn test_schemas_constrain_relationship_names() {
        let names = relationship_enum();
        let names: Vec<&str> = names
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert!(names.contains(&"causal"));
        assert!(names.contains(&"irrelevant"));
        assert!(!names.contains(&"mentions"));
    }

    struct Fixture {
        repo: Arc<crate::infrastructure::graph::SqliteGraphRepository>,
        index: Arc<MemoryVectorIndex>,
        embedder: Arc<KeywordEmbedder>,
        model: Arc<ScriptedModel>,
    }

    impl Fixture {
        async fn new() -> Self {
            Self {
                repo: sqlite_repository().await,
                index: Arc::new(MemoryVectorIndex::new()),
                embedder: Arc::new(KeywordEmbedder::default()),
                model: Arc::new(ScriptedModel::new()),
            }
        }

        fn archivist(&self) -> Archivist {
            Archivist::new(
                self.repo.clone(),
                self.index.clone(),
                self.embedder.clone(),
                self.model.clone(),
            )
        }

        async fn indexed(&self, label: &str, content: &str) -> Node {
            let node = Node::new(NodeType::Content, label, content);
            self.repo.insert_node(&node).await.unwrap();
            let vector = self.embedder.embed_text(content).await.unwrap();
            self.index
                .upsert(&node.id, vector, VectorMetadata::default())
                .await
                .unwrap();
            node
        }
    }

    #[tokio::test]
    async fn test_empty_content_is_skipped() {
        let fx = Fixture::new().await;
        let report = fx.archivist().link("n1", "  ").await.unwrap();
        assert!(!report.success());
        assert_eq!(report.connections_created(), 0);
        assert_eq!(fx.repo.count_edges().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_lonely_node_gets_self_loop() {
        let fx = Fixture::new().await;
        let node = fx.indexed("Copper - 1", "copper mine strike").await;

        let report = fx.archivist().link(&node.id, &node.content).await.unwrap();

        assert!(report.success());
        assert_eq!(report.final_state(), Some(LinkState::Done));
        assert!(report.trace.contains(&LinkState::ReviewedNoAction));
        let edges = fx.repo.list_edges_for_node(&node.id).await.unwrap();
        assert_eq!(edges.len(), 1);
        assert!(edges[0].is_self_loop());
        assert_eq!(edges[0].relationship_type, RelationshipType::ReviewedNoAction);
        assert!(fx.model.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failed_review_mark_is_an_error() {
        let fx = Fixture::new().await;
        let node = fx.indexed("Zinc - 1", "zinc smelter outage").await;
        sqlx::query("DROP TABLE edges")
            .execute(fx.repo.pool())
            .await
            .unwrap();

        let err = fx
            .archivist()
            .link(&node.id, &node.content)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::GraphWriteFailed(_)));
        assert_eq!(err.code(), "E003");
    }

    #[tokio::test]
    async fn test_batch_links_to_neighbours() {
        let fx = Fixture::new().await;
        let old = fx.indexed("Copper strike - a", "copper mine strike chile").await;
        let new = fx.indexed("Copper strike ends - b", "copper mine strike ends").await;

        fx.model.push_ok(json!({
            "connections": [
                {"node_index": 1, "relationship_type": "expands", "justification": "follow-up"}
            ]
        }));

        let report = fx.archivist().link(&new.id, &new.content).await.unwrap();

        assert_eq!(
            report.outcome,
            LinkOutcome::Linked {
                connections: 1,
                path: ClassificationPath::Batch
            }
        );
        let edges = fx.repo.list_edges_for_node(&new.id).await.unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].source_id, new.id);
        assert_eq!(edges[0].target_id, old.id);
        assert_eq!(
            edges[0].metadata.as_ref().map(|m| m.justification.as_str()),
            Some("follow-up")
        );

        let calls = fx.model.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].user.contains(&format!("1. ID: {}...", &old.id[..8])));
        assert!(!calls[0].user.contains(&new.id[..8]));
    }

    #[tokio::test]
    async fn test_batch_failure_falls_back_to_pairs() {
        let fx = Fixture::new().await;
        fx.indexed("Lithium a", "lithium price rally").await;
        fx.indexed("Lithium b", "lithium price slump").await;
        let new = fx.indexed("Lithium c", "lithium price").await;

        fx.model
            .push_err(Error::SchemaViolation("connections missing".into()));
        fx.model.push_ok(json!({"relationship_type": "contradicts", "justification": "x"}));
        fx.model.push_err(Error::LLMError("timeout".into()));

        let report = fx.archivist().link(&new.id, &new.content).await.unwrap();

        assert_eq!(
            report.outcome,
            LinkOutcome::Linked {
                connections: 1,
                path: ClassificationPath::PerCandidate
            }
        );
        assert_eq!(fx.model.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_all_irrelevant_ends_with_self_loop() {
        let fx = Fixture::new().await;
        fx.indexed("Gold", "gold price").await;
        let new = fx.indexed("Gold again", "gold price steady").await;

        fx.model.push_ok(json!({
            "connections": [
                {"node_index": 1, "relationship_type": "irrelevant", "justification": "-"}
            ]
        }));

        let report = fx.archivist().link(&new.id, &new.content).await.unwrap();

        assert_eq!(
            report.outcome,
            LinkOutcome::ReviewedNoAction {
                reason: NOTHING_RELEVANT_JUSTIFICATION.to_string()
            }
        );
        let edges = fx.repo.list_edges_for_node(&new.id).await.unwrap();
        assert_eq!(edges.len(), 1);
        assert!(edges[0].is_self_loop());
    }

    #[tokio::test]
    async fn test_relinking_does_not_duplicate_edges() {
        let fx = Fixture::new().await;
        fx.indexed("Nickel", "nickel supply").await;
        let new = fx.indexed("Nickel 2", "nickel supply cut").await;

        for _ in 0..2 {
            fx.model.push_ok(json!({
                "connections": [
                    {"node_index": 1, "relationship_type": "confirms", "justification": "same"}
                ]
            }));
            fx.archivist().link(&new.id, &new.content).await.unwrap();
        }

        assert_eq!(fx.repo.count_edges().await.unwrap(), 1);
    }
}
