//! Ingestion engine
//!
//! Runs one document through distillation and then, unit by unit, through
//! node creation, optional indexing, entity extraction and semantic linking.
//! Units are processed strictly in order and each completes before the next
//! starts. Only an unreachable store fails the whole call; everything else
//! is recorded on the unit that hit it.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::llm::{Embedder, StructuredOutput};

use super::archivist::{Archivist, ArchivistConfig};
use super::distiller::{AtomicUnit, Distillation, Distiller};
use super::edge_store::EdgeStore;
use super::metadata::{SourceContext, build_properties};
use super::node::{NodeType, short_id};
use super::node_store::NodeStore;
use super::policy::{IndexDecision, IndexingPolicy, SkipReason};
use super::repository::GraphRepository;
use super::vector::{VectorIndex, VectorMetadata};

/// How far a unit got through the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStage {
    Distilled,
    Persisted,
    Indexed,
    Linked,
    Done,
}

/// Per-unit report
#[derive(Debug, Clone, Serialize)]
pub struct NodeOutcome {
    pub node_id: Option<String>,
    pub node_type: NodeType,
    pub title: String,
    /// Entity names extracted from the unit
    pub entities: Vec<String>,
    pub stage: UnitStage,
    pub indexed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_skip: Option<SkipReason>,
    pub connections_created: usize,
    /// `None` when linking was not attempted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_success: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NodeOutcome {
    fn distilled(unit: &AtomicUnit) -> Self {
        Self {
            node_id: None,
            node_type: NodeType::Content,
            title: unit.title.clone(),
            entities: unit.key_entities.clone(),
            stage: UnitStage::Distilled,
            indexed: false,
            index_skip: None,
            connections_created: 0,
            link_success: None,
            error: None,
        }
    }

    pub fn failed(&self) -> bool {
        self.error.is_some()
    }

    /// Record a soft error, keeping any earlier one
    fn record_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.error = Some(match self.error.take() {
            Some(earlier) => format!("{}; {}", earlier, message),
            None => message,
        });
    }
}

/// Summary of one `ingest` call
#[derive(Debug, Clone, Serialize)]
pub struct IngestResult {
    pub success: bool,
    pub nodes_created: usize,
    pub nodes: Vec<NodeOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl IngestResult {
    fn nothing(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            nodes_created: 0,
            nodes: Vec::new(),
            reason: Some(reason.into()),
        }
    }
}

pub struct IngestionEngine {
    repository: Arc<dyn GraphRepository>,
    nodes: NodeStore,
    edges: EdgeStore,
    distiller: Distiller,
    model: Arc<dyn StructuredOutput>,
    embedder: Arc<dyn Embedder>,
    vector_index: Option<Arc<dyn VectorIndex>>,
    policy: IndexingPolicy,
    archivist_config: ArchivistConfig,
    unit_delay: Duration,
    snippet_chars: usize,
}

impl IngestionEngine {
    pub fn new(
        repository: Arc<dyn GraphRepository>,
        model: Arc<dyn StructuredOutput>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            nodes: NodeStore::new(repository.clone()),
            edges: EdgeStore::new(repository.clone()),
            distiller: Distiller::new(model.clone()),
            repository,
            model,
            embedder,
            vector_index: None,
            policy: IndexingPolicy::default(),
            archivist_config: ArchivistConfig::default(),
            unit_delay: Duration::from_millis(1000),
            snippet_chars: 500,
        }
    }

    pub fn with_vector_index(mut self, index: Arc<dyn VectorIndex>) -> Self {
        self.vector_index = Some(index);
        self
    }

    pub fn with_policy(mut self, policy: IndexingPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_unit_delay(mut self, delay: Duration) -> Self {
        self.unit_delay = delay;
        self
    }

    pub fn with_snippet_chars(mut self, chars: usize) -> Self {
        self.snippet_chars = chars;
        self
    }

    pub fn with_archivist_config(mut self, config: ArchivistConfig) -> Self {
        self.archivist_config = config;
        self
    }

    pub fn with_distiller_template(mut self, template: impl Into<String>) -> Self {
        self.distiller = self.distiller.with_template(template);
        self
    }

    pub fn has_vector_index(&self) -> bool {
        self.vector_index.is_some()
    }

    fn archivist(&self, index: &Arc<dyn VectorIndex>) -> Archivist {
        Archivist::new(
            self.repository.clone(),
            index.clone(),
            self.embedder.clone(),
            self.model.clone(),
        )
        .with_config(self.archivist_config.clone())
    }

    /// Ingest one document
    ///
    /// Returns `Err` only when the graph store is unreachable.
    pub async fn ingest(&self, raw_text: &str, context: &SourceContext) -> Result<IngestResult> {
        self.repository.health_check().await?;

        let units = match self.distiller.distill(raw_text, context).await {
            Distillation::Units(units) => units,
            Distillation::Nothing(reason) => {
                info!(%reason, "Nothing to ingest");
                return Ok(IngestResult::nothing(reason.to_string()));
            }
        };

        let decision = self.policy.decide(context, self.vector_index.is_some());
        if let Some(reason) = decision.skip_reason() {
            info!(
                source_type = context.source_type(),
                reason = reason.as_str(),
                "Vector indexing skipped for this document"
            );
        }

        let total = units.len();
        let mut nodes = Vec::with_capacity(total);

        for (position, unit) in units.iter().enumerate() {
            if position > 0 && !self.unit_delay.is_zero() {
                tokio::time::sleep(self.unit_delay).await;
            }

            if !unit.has_content() {
                warn!(position, title = %unit.title, "Dropping unit with empty content");
                continue;
            }

            info!(unit = position + 1, total, title = %unit.title, "Processing unit");
            nodes.push(self.process_unit(unit, context, decision).await);
        }

        let nodes_created = nodes.iter().filter(|n| n.node_id.is_some()).count();
        let failures = nodes.iter().filter(|n| n.failed()).count();
        info!(nodes_created, failures, "Ingestion finished");

        Ok(IngestResult {
            success: nodes_created > 0,
            nodes_created,
            reason: (nodes_created == 0).then(|| "no nodes created".to_string()),
            nodes,
        })
    }

    async fn process_unit(
        &self,
        unit: &AtomicUnit,
        context: &SourceContext,
        decision: IndexDecision,
    ) -> NodeOutcome {
        let mut outcome = NodeOutcome::distilled(unit);
        let now = Utc::now();

        let properties = build_properties(&unit.content, context, unit, now);
        let node_id = match self.nodes.create_content_node(&unit.content, properties).await {
            Ok(id) => id,
            Err(e) => {
                error!(title = %unit.title, error = %e, "Failed to create content node");
                outcome.error = Some(e.to_string());
                return outcome;
            }
        };
        outcome.node_id = Some(node_id.clone());
        outcome.stage = UnitStage::Persisted;

        let index = match self.vector_index.as_ref() {
            Some(index) if decision.should_index() => Some(index),
            _ => {
                outcome.index_skip =
                    Some(decision.skip_reason().unwrap_or(SkipReason::NoVectorIndex));
                None
            }
        };

        if let Some(index) = index {
            if let Err(e) = self.index_unit(index, &node_id, unit, context).await {
                error!(node = short_id(&node_id), error = %e, "Failed to index node");
                outcome.record_error(e.to_string());
                return outcome;
            }
            outcome.indexed = true;
            outcome.stage = UnitStage::Indexed;
        }

        self.link_entities(&node_id, unit, &mut outcome).await;

        if let Some(index) = index {
            match self.archivist(index).link(&node_id, &unit.content).await {
                Ok(report) => {
                    outcome.connections_created = report.connections_created();
                    outcome.link_success = Some(report.success());
                }
                Err(e) => {
                    warn!(node = short_id(&node_id), error = %e, "Semantic linking failed");
                    outcome.link_success = Some(false);
                    outcome.record_error(format!("semantic linking failed: {}", e));
                }
            }
            outcome.stage = UnitStage::Linked;
        }

        outcome.stage = UnitStage::Done;
        outcome
    }

    /// Create entity nodes and `mentions` edges; shortfalls become a soft error
    async fn link_entities(&self, node_id: &str, unit: &AtomicUnit, outcome: &mut NodeOutcome) {
        let mut entity_ids = Vec::with_capacity(unit.key_entities.len());
        let mut entity_failures = 0;
        for name in &unit.key_entities {
            match self.nodes.create_entity_node(name).await {
                Ok(id) => entity_ids.push(id),
                Err(e) => {
                    warn!(entity = %name, error = %e, "Failed to create entity node");
                    entity_failures += 1;
                    entity_ids.push(None);
                }
            }
        }

        let expected = entity_ids.iter().flatten().count();
        let mentions = self
            .edges
            .create_content_entity_edges(node_id, &entity_ids)
            .await;
        info!(node = short_id(node_id), mentions, "Entities linked");

        if entity_failures > 0 {
            outcome.record_error(format!(
                "{} of {} entity nodes could not be written",
                entity_failures,
                unit.key_entities.len()
            ));
        }
        if mentions < expected {
            outcome.record_error(format!(
                "{} of {} mention edges could not be written",
                expected - mentions,
                expected
            ));
        }
    }

    async fn index_unit(
        &self,
        index: &Arc<dyn VectorIndex>,
        node_id: &str,
        unit: &AtomicUnit,
        context: &SourceContext,
    ) -> Result<()> {
        let vector = self.embedder.embed_text(&unit.content).await?;
        let metadata =
            VectorMetadata::for_content(context, &unit.content, unit, self.snippet_chars, Utc::now());
        index.upsert(node_id, vector, metadata).await?;
        info!(node = short_id(node_id), backend = index.name(), "Indexed node");
        Ok(())
    }
}
