//! Knowledge graph ingestion and semantic linking
//!
//! ## Pipeline
//!
//! ```text
//! raw text ─▶ Distiller ─▶ [AtomicUnit]
//!                              │ per unit, in order
//!                              ▼
//!            metadata ─▶ content node ─▶ IndexingPolicy ─▶ vector upsert
//!                              │                                 │
//!                              ▼                                 ▼
//!                  entity nodes + mentions edges            Archivist
//!                                                   (k-NN, classify, edges)
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use kgraph_core::domain::graph::{IngestionEngine, SourceContext};
//!
//! let engine = IngestionEngine::new(repository, model, embedder)
//!     .with_vector_index(index);
//!
//! let context = SourceContext::new("Reuters", "copper", "news")
//!     .with_original_url("https://example.com/story");
//! let result = engine.ingest(&raw_text, &context).await?;
//! println!("created {} nodes", result.nodes_created);
//! ```

mod archivist;
mod curator;
mod dedup;
mod distiller;
mod edge;
mod edge_store;
mod engine;
mod metadata;
mod node;
mod node_store;
mod policy;
mod repository;
mod vector;

pub use archivist::{
    Archivist, ArchivistConfig, ClassificationPath, LinkOutcome, LinkReport, LinkState,
    NO_NEIGHBOURS_JUSTIFICATION, NOTHING_RELEVANT_JUSTIFICATION, batch_schema, pair_schema,
};
pub use curator::{CurationReport, Curator, ORPHAN_SCAN_LIMIT};
pub use dedup::{DedupGuard, DuplicateStatus, HASH_SNIPPET_CHARS, compute_item_hash};
pub use distiller::{
    AtomicUnit, COMPLETE_BRIEFING_SOURCE_TYPE, DEFAULT_DISTILLATION_TEMPLATE, Distillation,
    Distiller, NoUnitsReason, STRUCTURED_COMPLETE_FORMAT, distillation_schema,
};
pub use edge::{Edge, EdgeMetadata, RelationshipType};
pub use edge_store::EdgeStore;
pub use engine::{IngestResult, IngestionEngine, NodeOutcome, UnitStage};
pub use metadata::{
    ContentMetrics, SourceContext, WORDS_PER_MINUTE, build_properties, normalize_timestamp,
    parse_timestamp, truncate_chars,
};
pub use node::{Node, NodeProperties, NodeType, UNTITLED_LABEL, content_label, short_id};
pub use node_store::NodeStore;
pub use policy::{IndexDecision, IndexingPolicy, NEWS_KILL_SWITCH_ENV, SkipReason, parse_flag};
pub use repository::{EdgeWrite, GraphRepository, GraphStats};
pub use vector::{VectorFilter, VectorIndex, VectorMatch, VectorMetadata};
