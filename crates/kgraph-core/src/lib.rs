//! kgraph core library
//!
//! Turns raw text into a typed knowledge graph:
//! - Distillation of documents into atomic units (schema-constrained LLM calls)
//! - Graph storage of content and entity nodes (SQLite)
//! - Vector indexing with a configurable policy (Pinecone or in-memory)
//! - Semantic linking of new nodes to their nearest neighbours
//! - Curation and dedup queries for collaborating workflows

pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod llm;
pub mod services;
pub mod storage;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::domain::graph::{
        GraphRepository, IngestResult, IngestionEngine, Node, NodeType, RelationshipType,
        SourceContext,
    };
    pub use crate::error::{Error, Result};
    pub use crate::services::Services;
}
