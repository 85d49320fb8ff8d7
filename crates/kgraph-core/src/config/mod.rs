//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Source types that are meta-commentary rather than primary evidence
pub const DEFAULT_EXCLUDED_SOURCE_TYPES: [&str; 3] = [
    "strategic-briefing",
    "strategic-briefing-complete",
    "extracted-learnings",
];

/// Source types affected by the news vectorization kill switch
pub const DEFAULT_NEWS_SOURCE_TYPES: [&str; 5] =
    ["news", "article", "web", "rss", "continuous-news"];

/// kgraph configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub vector_index: VectorIndexConfig,
    pub ingestion: IngestionConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    #[serde(skip)]
    pub api_key: Option<String>,
    pub default_model: String,
    pub fallback_models: Vec<String>,
    pub temperature: f32,
    pub max_tokens: usize,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_model: "google/gemini-2.5-flash".to_string(),
            fallback_models: vec!["openai/gpt-4o-mini".to_string()],
            temperature: 0.2,
            max_tokens: 8192,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model: String,
    pub dimensions: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "openai/text-embedding-3-small".to_string(),
            dimensions: 1536,
        }
    }
}

/// Which vector index implementation backs similarity search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    /// Nothing is indexed and the archivist never runs
    #[default]
    Disabled,
    /// Process-local brute-force index
    Memory,
    /// Pinecone-compatible REST index
    Pinecone,
}

impl VectorBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Memory => "memory",
            Self::Pinecone => "pinecone",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "disabled" | "none" => Some(Self::Disabled),
            "memory" => Some(Self::Memory),
            "pinecone" => Some(Self::Pinecone),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorIndexConfig {
    #[serde(skip)]
    pub api_key: Option<String>,
    pub backend: VectorBackend,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub top_k: usize,
    pub timeout_secs: u64,
}

impl Default for VectorIndexConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            backend: VectorBackend::Disabled,
            host: None,
            namespace: None,
            top_k: 6,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    /// Pause between atomic units of one ingest call
    pub unit_delay_ms: u64,
    /// Characters of content stored as the vector payload snippet
    pub snippet_chars: usize,
    pub excluded_source_types: Vec<String>,
    pub news_source_types: Vec<String>,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            unit_delay_ms: 1000,
            snippet_chars: 500,
            excluded_source_types: DEFAULT_EXCLUDED_SOURCE_TYPES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            news_source_types: DEFAULT_NEWS_SOURCE_TYPES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file; defaults to `<config dir>/kgraph.db`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn redact(key: String) -> String {
    if key.len() <= 4 {
        "***".to_string()
    } else {
        let suffix = &key[key.len() - 4..];
        format!("***{}", suffix)
    }
}

impl LlmConfig {
    pub fn resolved_api_key(&self) -> anyhow::Result<Option<String>> {
        self.enforce_env_only()?;

        Ok(env::var("KGRAPH_API_KEY")
            .or_else(|_| env::var("OPENROUTER_API_KEY"))
            .ok())
    }

    pub fn redacted_api_key(&self) -> anyhow::Result<Option<String>> {
        self.resolved_api_key().map(|opt| opt.map(redact))
    }

    pub fn enforce_env_only(&self) -> anyhow::Result<()> {
        if self.api_key.is_some() {
            return Err(anyhow!(
                "LLM API keys must be provided via environment variables, not stored in configuration"
            ));
        }
        Ok(())
    }
}

impl VectorIndexConfig {
    pub fn resolved_api_key(&self) -> anyhow::Result<Option<String>> {
        if self.api_key.is_some() {
            return Err(anyhow!(
                "Vector index API keys must be provided via environment variables, not stored in configuration"
            ));
        }

        Ok(env::var("KGRAPH_VECTOR_API_KEY")
            .or_else(|_| env::var("PINECONE_API_KEY"))
            .ok())
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("KGRAPH_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("kgraph")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from the default location, or defaults if absent
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from a specific file, or defaults if absent
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save configuration to the default location
    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to a specific file
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        self.validate()?;

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).with_context(|| {
                format!("Failed to create config directory: {}", dir.display())
            })?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        self.llm.enforce_env_only()?;
        if self.vector_index.api_key.is_some() {
            return Err(anyhow!(
                "Vector index API keys must be provided via environment variables"
            ));
        }
        if self.vector_index.top_k == 0 {
            return Err(anyhow!("vector_index.top_k must be at least 1"));
        }
        if self.vector_index.backend == VectorBackend::Pinecone
            && self.vector_index.host.is_none()
        {
            return Err(anyhow!(
                "vector_index.host is required when vector_index.backend = \"pinecone\""
            ));
        }
        Ok(())
    }

    /// Database path, falling back to the config directory
    pub fn database_path(&self) -> anyhow::Result<PathBuf> {
        match &self.storage.path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::config_dir()?.join("kgraph.db")),
        }
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            "llm.default_model" => Ok(self.llm.default_model.clone()),
            "llm.fallback_models" => Ok(self.llm.fallback_models.join(", ")),
            "llm.temperature" => Ok(self.llm.temperature.to_string()),
            "llm.max_tokens" => Ok(self.llm.max_tokens.to_string()),
            "llm.timeout_secs" => Ok(self.llm.timeout_secs.to_string()),
            "llm.api_key" => match self.llm.redacted_api_key()? {
                Some(redacted) => Ok(redacted),
                None => Ok("(not set - use KGRAPH_API_KEY or OPENROUTER_API_KEY env var)".to_string()),
            },

            "embedding.model" => Ok(self.embedding.model.clone()),
            "embedding.dimensions" => Ok(self.embedding.dimensions.to_string()),

            "vector_index.backend" => Ok(self.vector_index.backend.as_str().to_string()),
            "vector_index.host" => Ok(self.vector_index.host.clone().unwrap_or_default()),
            "vector_index.namespace" => Ok(self.vector_index.namespace.clone().unwrap_or_default()),
            "vector_index.top_k" => Ok(self.vector_index.top_k.to_string()),
            "vector_index.timeout_secs" => Ok(self.vector_index.timeout_secs.to_string()),
            "vector_index.api_key" => match self.vector_index.resolved_api_key()? {
                Some(key) => Ok(redact(key)),
                None => Ok("(not set - use PINECONE_API_KEY env var)".to_string()),
            },

            "ingestion.unit_delay_ms" => Ok(self.ingestion.unit_delay_ms.to_string()),
            "ingestion.snippet_chars" => Ok(self.ingestion.snippet_chars.to_string()),
            "ingestion.excluded_source_types" => {
                Ok(self.ingestion.excluded_source_types.join(", "))
            }
            "ingestion.news_source_types" => Ok(self.ingestion.news_source_types.join(", ")),

            "storage.path" => Ok(self.database_path()?.display().to_string()),

            _ => Err(anyhow!(
                "Unknown configuration key: {}. Use `kgraph config list` to see available keys.",
                key
            )),
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "llm.default_model" => {
                self.llm.default_model = value.to_string();
            }
            "llm.fallback_models" => {
                self.llm.fallback_models = split_list(value);
            }
            "llm.temperature" => {
                let temp: f32 = value
                    .parse()
                    .with_context(|| format!("Invalid temperature value: {}", value))?;
                if !(0.0..=2.0).contains(&temp) {
                    return Err(anyhow!("Temperature must be between 0.0 and 2.0"));
                }
                self.llm.temperature = temp;
            }
            "llm.max_tokens" => {
                self.llm.max_tokens = value
                    .parse()
                    .with_context(|| format!("Invalid max_tokens value: {}", value))?;
            }
            "llm.timeout_secs" => {
                self.llm.timeout_secs = value
                    .parse()
                    .with_context(|| format!("Invalid timeout_secs value: {}", value))?;
            }

            "embedding.model" => {
                self.embedding.model = value.to_string();
            }
            "embedding.dimensions" => {
                self.embedding.dimensions = value
                    .parse()
                    .with_context(|| format!("Invalid dimensions value: {}", value))?;
            }

            "vector_index.backend" => {
                self.vector_index.backend = VectorBackend::parse(value).ok_or_else(|| {
                    anyhow!(
                        "Invalid vector backend: {}. Valid options: disabled, memory, pinecone",
                        value
                    )
                })?;
            }
            "vector_index.host" => {
                self.vector_index.host = non_empty(value);
            }
            "vector_index.namespace" => {
                self.vector_index.namespace = non_empty(value);
            }
            "vector_index.top_k" => {
                let top_k: usize = value
                    .parse()
                    .with_context(|| format!("Invalid top_k value: {}", value))?;
                if top_k == 0 {
                    return Err(anyhow!("top_k must be at least 1"));
                }
                self.vector_index.top_k = top_k;
            }
            "vector_index.timeout_secs" => {
                self.vector_index.timeout_secs = value
                    .parse()
                    .with_context(|| format!("Invalid timeout_secs value: {}", value))?;
            }

            "ingestion.unit_delay_ms" => {
                self.ingestion.unit_delay_ms = value
                    .parse()
                    .with_context(|| format!("Invalid unit_delay_ms value: {}", value))?;
            }
            "ingestion.snippet_chars" => {
                self.ingestion.snippet_chars = value
                    .parse()
                    .with_context(|| format!("Invalid snippet_chars value: {}", value))?;
            }
            "ingestion.excluded_source_types" => {
                self.ingestion.excluded_source_types = split_list(value);
            }
            "ingestion.news_source_types" => {
                self.ingestion.news_source_types = split_list(value);
            }

            "storage.path" => {
                self.storage.path = non_empty(value).map(PathBuf::from);
            }

            "llm.api_key" | "vector_index.api_key" => {
                return Err(anyhow!(
                    "API keys cannot be stored in configuration. \
                     Set KGRAPH_API_KEY / PINECONE_API_KEY in the environment instead."
                ));
            }

            _ => {
                return Err(anyhow!(
                    "Unknown configuration key: {}. Use `kgraph config list` to see available keys.",
                    key
                ));
            }
        }
        Ok(())
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        let keys = [
            "llm.default_model",
            "llm.fallback_models",
            "llm.temperature",
            "llm.max_tokens",
            "llm.timeout_secs",
            "llm.api_key",
            "embedding.model",
            "embedding.dimensions",
            "vector_index.backend",
            "vector_index.host",
            "vector_index.namespace",
            "vector_index.top_k",
            "vector_index.timeout_secs",
            "vector_index.api_key",
            "ingestion.unit_delay_ms",
            "ingestion.snippet_chars",
            "ingestion.excluded_source_types",
            "ingestion.news_source_types",
            "storage.path",
        ];

        keys.into_iter()
            .map(|key| {
                let value = self.get(key)?;
                Ok((key.to_string(), value))
            })
            .collect()
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.vector_index.top_k, 6);
        assert_eq!(config.vector_index.backend, VectorBackend::Disabled);
        assert_eq!(config.ingestion.unit_delay_ms, 1000);
        assert!(
            config
                .ingestion
                .excluded_source_types
                .contains(&"strategic-briefing".to_string())
        );
        config.validate().unwrap();
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.set("vector_index.backend", "memory").unwrap();
        config.set("vector_index.top_k", "10").unwrap();
        config.set("ingestion.unit_delay_ms", "0").unwrap();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.vector_index.backend, VectorBackend::Memory);
        assert_eq!(loaded.vector_index.top_k, 10);
        assert_eq!(loaded.ingestion.unit_delay_ms, 0);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.embedding.dimensions, 1536);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[vector_index]\ntop_k = 3\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.vector_index.top_k, 3);
        assert_eq!(config.ingestion.snippet_chars, 500);
    }

    #[test]
    fn test_pinecone_requires_host() {
        let mut config = Config::default();
        config.set("vector_index.backend", "pinecone").unwrap();
        assert!(config.validate().is_err());

        config
            .set("vector_index.host", "https://idx.svc.pinecone.io")
            .unwrap();
        config.validate().unwrap();
    }

    #[test]
    fn test_set_rejects_invalid_values() {
        let mut config = Config::default();
        assert!(config.set("llm.temperature", "3.5").is_err());
        assert!(config.set("vector_index.top_k", "0").is_err());
        assert!(config.set("vector_index.backend", "faiss").is_err());
        assert!(config.set("llm.api_key", "sk-123").is_err());
        assert!(config.set("nope", "1").is_err());
    }

    #[test]
    fn test_list_fallback_models() {
        let mut config = Config::default();
        config.set("llm.fallback_models", "a/b, c/d,,").unwrap();
        assert_eq!(config.llm.fallback_models, vec!["a/b", "c/d"]);
        assert_eq!(config.get("llm.fallback_models").unwrap(), "a/b, c/d");
    }
}
