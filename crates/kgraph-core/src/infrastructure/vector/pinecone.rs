//! Pinecone-compatible REST vector index

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::domain::graph::{VectorFilter, VectorIndex, VectorMatch, VectorMetadata};
use crate::error::{Error, Result};

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    vectors: Vec<VectorRecord<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct VectorRecord<'a> {
    id: &'a str,
    values: Vec<f32>,
    metadata: VectorMetadata,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Debug, Deserialize)]
struct QueryMatch {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<Value>,
}

/// Client for one Pinecone index host
pub struct PineconeIndex {
    http_client: HttpClient,
    host: String,
    api_key: String,
    namespace: Option<String>,
}

impl std::fmt::Debug for PineconeIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PineconeIndex")
            .field("host", &self.host)
            .field("namespace", &self.namespace)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl PineconeIndex {
    pub fn new(host: impl Into<String>, api_key: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(Error::NetworkError)?;

        let host = host.into();
        let host = if host.starts_with("http://") || host.starts_with("https://") {
            host
        } else {
            format!("https://{}", host)
        };

        Ok(Self {
            http_client,
            host: host.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            namespace: None,
        })
    }

    pub fn with_namespace(mut self, namespace: Option<String>) -> Self {
        self.namespace = namespace.filter(|n| !n.is_empty());
        self
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.host, path);
        let response = self
            .http_client
            .post(&url)
            .header("Api-Key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(Error::NetworkError)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(match status.as_u16() {
            401 | 403 => Error::VectorIndexError(
                "Unauthorized: set KGRAPH_VECTOR_API_KEY or PINECONE_API_KEY".to_string(),
            ),
            429 => Error::RateLimited(1),
            _ => Error::VectorIndexError(format!("HTTP error {}: {}", status, body)),
        })
    }
}

/// `{"k": v}` equality filter in the index's `$eq` form
fn to_filter(filter: &VectorFilter) -> Value {
    let clauses: Map<String, Value> = filter
        .iter()
        .map(|(k, v)| (k.clone(), json!({ "$eq": v })))
        .collect();
    Value::Object(clauses)
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn upsert(&self, id: &str, values: Vec<f32>, metadata: VectorMetadata) -> Result<()> {
        let request = UpsertRequest {
            vectors: vec![VectorRecord {
                id,
                values,
                metadata,
            }],
            namespace: self.namespace.as_deref(),
        };

        self.post("/vectors/upsert", &request).await?;
        debug!(id, "Vector upserted");
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&VectorFilter>,
    ) -> Result<Vec<VectorMatch>> {
        let request = QueryRequest {
            vector,
            top_k,
            include_metadata: true,
            namespace: self.namespace.as_deref(),
            filter: filter.filter(|f| !f.is_empty()).map(to_filter),
        };

        let response: QueryResponse = self
            .post("/query", &request)
            .await?
            .json()
            .await
            .map_err(|e| Error::VectorIndexError(format!("Failed to parse query response: {}", e)))?;

        Ok(response
            .matches
            .into_iter()
            .map(|m| VectorMatch {
                id: m.id,
                score: m.score,
                metadata: m.metadata.and_then(|v| serde_json::from_value(v).ok()),
            })
            .collect())
    }

    fn name(&self) -> &'static str {
        "pinecone"
    }
}
