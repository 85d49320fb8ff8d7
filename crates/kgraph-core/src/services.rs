//! Process-wide service handle
//!
//! Everything the pipeline needs is built once from `Config` and handed
//! out from here: the database, the graph repository, the model client and
//! the optional vector index.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow};
use tracing::{info, warn};

use crate::config::{Config, VectorBackend};
use crate::domain::graph::{
    ArchivistConfig, Curator, DedupGuard, GraphRepository, IndexingPolicy, IngestionEngine,
    VectorIndex,
};
use crate::error::{Error, Result};
use crate::infrastructure::graph::SqliteGraphRepository;
use crate::infrastructure::vector::{MemoryVectorIndex, PineconeIndex};
use crate::llm::LlmClient;
use crate::storage::{Database, DatabaseConfig};

pub struct Services {
    config: Config,
    database: Database,
    repository: Arc<SqliteGraphRepository>,
    llm: Option<Arc<LlmClient>>,
    vector_index: Option<Arc<dyn VectorIndex>>,
}

impl Services {
    /// Open the configured database and build every client
    ///
    /// A missing LLM key is not an error here; only operations that call the
    /// model need one.
    pub async fn open(config: Config) -> anyhow::Result<Self> {
        config.validate()?;
        let path = config.database_path()?;
        let database = Database::open(&path)
            .await
            .with_context(|| format!("Failed to open graph store at {}", path.display()))?;
        Self::with_database(config, database)
    }

    /// In-memory store, for tests and dry runs
    pub async fn in_memory(config: Config) -> anyhow::Result<Self> {
        let database = Database::new(DatabaseConfig::in_memory()).await?;
        Self::with_database(config, database)
    }

    fn with_database(config: Config, database: Database) -> anyhow::Result<Self> {
        let repository = Arc::new(SqliteGraphRepository::new(database.pool().clone()));

        let llm = match config.llm.resolved_api_key()? {
            Some(key) => Some(Arc::new(
                LlmClient::builder()
                    .config(config.llm.clone())
                    .embedding(config.embedding.clone())
                    .api_key(key)
                    .build()?,
            )),
            None => {
                warn!("No LLM API key set; ingestion is unavailable");
                None
            }
        };

        let vector_index = build_vector_index(&config)?;
        if let Some(index) = &vector_index {
            info!(backend = index.name(), "Vector index ready");
        }

        Ok(Self {
            config,
            database,
            repository,
            llm,
            vector_index,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn repository(&self) -> Arc<dyn GraphRepository> {
        self.repository.clone()
    }

    pub fn llm(&self) -> Option<Arc<LlmClient>> {
        self.llm.clone()
    }

    pub fn vector_index(&self) -> Option<Arc<dyn VectorIndex>> {
        self.vector_index.clone()
    }

    pub fn curator(&self) -> Curator {
        Curator::new(self.repository())
    }

    pub fn dedup(&self) -> DedupGuard {
        DedupGuard::new(self.repository())
    }

    /// Ingestion engine wired from config
    pub fn engine(&self) -> Result<IngestionEngine> {
        let llm = self.llm.clone().ok_or_else(|| {
            Error::ConfigError(
                "LLM API key not set (KGRAPH_API_KEY or OPENROUTER_API_KEY)".to_string(),
            )
        })?;

        let ingestion = &self.config.ingestion;
        let mut engine = IngestionEngine::new(self.repository(), llm.clone(), llm)
            .with_policy(IndexingPolicy::from_config(ingestion))
            .with_unit_delay(Duration::from_millis(ingestion.unit_delay_ms))
            .with_snippet_chars(ingestion.snippet_chars)
            .with_archivist_config(ArchivistConfig {
                top_k: self.config.vector_index.top_k,
                ..Default::default()
            });

        if let Some(index) = self.vector_index() {
            engine = engine.with_vector_index(index);
        }

        Ok(engine)
    }

    pub async fn close(&self) {
        self.database.close().await;
    }
}

fn build_vector_index(config: &Config) -> anyhow::Result<Option<Arc<dyn VectorIndex>>> {
    let settings = &config.vector_index;
    match settings.backend {
        VectorBackend::Disabled => Ok(None),
        VectorBackend::Memory => Ok(Some(Arc::new(MemoryVectorIndex::new()))),
        VectorBackend::Pinecone => {
            let host = settings
                .host
                .clone()
                .ok_or_else(|| anyhow!("vector_index.host is required for pinecone"))?;
            let key = settings.resolved_api_key()?.ok_or_else(|| {
                anyhow!("Vector index API key not set (KGRAPH_VECTOR_API_KEY or PINECONE_API_KEY)")
            })?;
            let index = PineconeIndex::new(host, key, settings.timeout_secs)?
                .with_namespace(settings.namespace.clone());
            Ok(Some(Arc::new(index)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_backend_is_built() {
        let mut config = Config::default();
        config.vector_index.backend = VectorBackend::Memory;

        let services = Services::in_memory(config).await.unwrap();
        assert_eq!(services.vector_index().map(|i| i.name()), Some("memory"));
        assert_eq!(services.repository().count_nodes().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_disabled_backend_has_no_index() {
        let services = Services::in_memory(Config::default()).await.unwrap();
        assert!(services.vector_index().is_none());
        assert_eq!(services.curator().run_cycle(None).await.unwrap().orphan_count, 0);
    }
}
