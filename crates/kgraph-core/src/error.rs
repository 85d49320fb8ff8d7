//! Error types for kgraph

use thiserror::Error;

/// Result type alias using kgraph's Error
pub type Result<T> = std::result::Result<T, Error>;

/// kgraph error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Graph errors (E001-E099)
    #[error("Node '{0}' not found. Run `kgraph stats` to inspect the graph.")]
    NodeNotFound(String),

    #[error("Invalid node type '{0}'")]
    InvalidNodeType(String),

    #[error("Graph write failed: {0}")]
    GraphWriteFailed(String),

    // Network errors (E100-E199)
    #[error("Network error: {0}. Check your internet connection.")]
    NetworkError(#[from] reqwest::Error),

    #[error("LLM API error: {0}. Check that KGRAPH_API_KEY or OPENROUTER_API_KEY is set.")]
    LLMError(String),

    #[error("Rate limited. Waiting {0} seconds before retry.")]
    RateLimited(u64),

    #[error("All models failed: {0}")]
    NoSuitableModel(String),

    // Model output errors (E200-E299)
    #[error("Model output did not match the expected schema: {0}")]
    SchemaViolation(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    // Vector index errors (E300-E399)
    #[error("Vector index error: {0}")]
    VectorIndexError(String),

    // Database errors (E400-E499)
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Input errors (E800-E899)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic errors
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::NodeNotFound(_) => "E001",
            Self::InvalidNodeType(_) => "E002",
            Self::GraphWriteFailed(_) => "E003",
            Self::NetworkError(_) => "E100",
            Self::LLMError(_) => "E101",
            Self::RateLimited(_) => "E102",
            Self::NoSuitableModel(_) => "E103",
            Self::SchemaViolation(_) => "E200",
            Self::EmbeddingFailed(_) => "E201",
            Self::VectorIndexError(_) => "E300",
            Self::DatabaseError(_) => "E400",
            Self::ConfigError(_) => "E600",
            Self::InvalidInput(_) => "E800",
            Self::Serialization(_) => "E801",
            Self::Other(_) | Self::Io(_) => "E9999",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::NodeNotFound(_) => Some("kgraph stats".to_string()),
            Self::NetworkError(_) => Some("Check internet connection".to_string()),
            Self::LLMError(_) => Some("kgraph config get llm.api_key".to_string()),
            Self::VectorIndexError(_) => Some("kgraph config get vector_index.host".to_string()),
            Self::ConfigError(_) => Some("kgraph config list".to_string()),
            _ => None,
        }
    }

    /// Whether this error came from a model reply rather than transport or storage
    pub fn is_model_output(&self) -> bool {
        matches!(self, Self::SchemaViolation(_) | Self::Serialization(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(Error::NodeNotFound("x".into()).code(), "E001");
        assert_eq!(Error::GraphWriteFailed("edge".into()).code(), "E003");
        assert_eq!(Error::SchemaViolation("bad".into()).code(), "E200");
        assert_eq!(Error::VectorIndexError("down".into()).code(), "E300");
        assert_eq!(Error::Other("?".into()).code(), "E9999");
    }

    #[test]
    fn test_suggestions() {
        assert_eq!(
            Error::NodeNotFound("x".into()).suggestion().as_deref(),
            Some("kgraph stats")
        );
        assert!(Error::InvalidInput("x".into()).suggestion().is_none());
    }

    #[test]
    fn test_model_output_classification() {
        assert!(Error::SchemaViolation("missing field".into()).is_model_output());
        assert!(!Error::LLMError("401".into()).is_model_output());
    }
}
