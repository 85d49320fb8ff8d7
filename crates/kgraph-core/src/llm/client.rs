//! OpenRouter LLM client implementation
//!
//! Async HTTP client for the OpenAI-compatible OpenRouter API with:
//! - Chat completions, optionally schema-constrained
//! - Embeddings
//! - Model fallback with automatic retry
//! - Rate limit handling with exponential backoff

use std::time::Duration;

use rand::Rng;
use reqwest::Client as HttpClient;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::config::{EmbeddingConfig, LlmConfig};
use crate::error::{Error, Result};

use super::types::{
    ChatRequest, ChatResponse, Embedding, EmbeddingRequest, EmbeddingResponse, LlmResponse,
    Message,
};

/// OpenRouter API base URL
const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Maximum number of retry attempts for rate-limited requests
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay for exponential backoff (in milliseconds)
const BACKOFF_BASE_MS: u64 = 1000;

/// OpenRouter LLM client
///
/// Cheap to clone; the underlying connection pool is shared.
#[derive(Clone)]
pub struct LlmClient {
    http_client: HttpClient,
    config: LlmConfig,
    embedding: EmbeddingConfig,
    api_key: String,
    base_url: String,
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient")
            .field("base_url", &self.base_url)
            .field("default_model", &self.config.default_model)
            .field("embedding_model", &self.embedding.model)
            .finish()
    }
}

/// Builder for creating an LlmClient
#[derive(Default)]
pub struct LlmClientBuilder {
    config: Option<LlmConfig>,
    embedding: Option<EmbeddingConfig>,
    api_key: Option<String>,
    base_url: Option<String>,
    timeout_secs: Option<u64>,
}

impl LlmClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: LlmConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn embedding(mut self, embedding: EmbeddingConfig) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the base URL (defaults to OpenRouter)
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn build(self) -> Result<LlmClient> {
        let config = self.config.unwrap_or_default();
        let api_key = self
            .api_key
            .ok_or_else(|| Error::LLMError("API key is required".to_string()))?;

        let timeout_secs = self.timeout_secs.unwrap_or(config.timeout_secs);

        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(Error::NetworkError)?;

        Ok(LlmClient {
            http_client,
            config,
            embedding: self.embedding.unwrap_or_default(),
            api_key,
            base_url: self
                .base_url
                .unwrap_or_else(|| OPENROUTER_BASE_URL.to_string()),
        })
    }
}

impl LlmClient {
    pub fn new(config: LlmConfig, api_key: impl Into<String>) -> Result<Self> {
        LlmClientBuilder::new()
            .config(config)
            .api_key(api_key)
            .build()
    }

    pub fn builder() -> LlmClientBuilder {
        LlmClientBuilder::new()
    }

    pub fn default_model(&self) -> &str {
        &self.config.default_model
    }

    pub fn fallback_models(&self) -> &[String] {
        &self.config.fallback_models
    }

    /// Make a chat completion request against one model
    pub async fn complete(
        &self,
        messages: Vec<Message>,
        model: Option<&str>,
    ) -> Result<LlmResponse> {
        let model = model.unwrap_or(&self.config.default_model);
        let request = self.chat_request(model, messages, None);
        self.execute_request(&request).await
    }

    /// Make a chat completion request with automatic fallback
    ///
    /// Tries the default model first, then each fallback model when the
    /// failure is recoverable (rate limit, model unavailable). When `schema`
    /// is given it is forwarded as a `json_schema` response format.
    pub async fn complete_with_fallback(
        &self,
        messages: Vec<Message>,
        schema: Option<(&str, &Value)>,
    ) -> Result<LlmResponse> {
        let mut models = vec![self.config.default_model.clone()];
        models.extend(self.config.fallback_models.iter().cloned());

        let mut last_error = None;

        for model in &models {
            debug!(model = %model, "Attempting chat completion");

            let request = self.chat_request(model, messages.clone(), schema);
            match self.execute_request(&request).await {
                Ok(response) => {
                    info!(model = %model, tokens = response.tokens_used, "Chat completion successful");
                    return Ok(response);
                }
                Err(Error::RateLimited(secs)) => {
                    warn!(model = %model, wait_secs = secs, "Rate limited, trying next model");
                    last_error = Some(Error::RateLimited(secs));
                }
                Err(Error::LLMError(msg)) if is_model_error(&msg) => {
                    warn!(model = %model, error = %msg, "Model error, trying next model");
                    last_error = Some(Error::LLMError(msg));
                }
                Err(e) => {
                    error!(model = %model, error = %e, "Non-recoverable error");
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::NoSuitableModel("no models configured".to_string())))
    }

    fn chat_request(
        &self,
        model: &str,
        messages: Vec<Message>,
        schema: Option<(&str, &Value)>,
    ) -> ChatRequest {
        let request = ChatRequest::new(model, messages)
            .with_temperature(self.config.temperature)
            .with_max_tokens(self.config.max_tokens);

        match schema {
            Some((name, schema)) => request.with_json_schema(name, schema.clone()),
            None => request,
        }
    }

    /// Execute a chat request with retry logic
    async fn execute_request(&self, request: &ChatRequest) -> Result<LlmResponse> {
        let mut attempts = 0;

        loop {
            attempts += 1;

            match self.send_request(request).await {
                Ok(response) => return Ok(response),
                Err(Error::RateLimited(wait_secs)) if attempts < MAX_RETRY_ATTEMPTS => {
                    let backoff = calculate_backoff(attempts, wait_secs);
                    warn!(
                        attempt = attempts,
                        wait_ms = backoff,
                        "Rate limited, retrying after backoff"
                    );
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_request(&self, request: &ChatRequest) -> Result<LlmResponse> {
        let url = format!("{}/chat/completions", self.base_url);

        debug!(
            model = %request.model,
            messages = request.messages.len(),
            structured = request.response_format.is_some(),
            "Sending chat completion request"
        );

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("X-Title", "kgraph")
            .json(request)
            .send()
            .await
            .map_err(Error::NetworkError)?;

        let status = response.status();

        if !status.is_success() {
            return self.handle_error_response(status, response).await;
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::LLMError(format!("Failed to parse response: {}", e)))?;

        LlmResponse::from_chat_response(chat_response)
            .ok_or_else(|| Error::LLMError("Empty response from API".to_string()))
    }

    async fn handle_error_response<T>(
        &self,
        status: reqwest::StatusCode,
        response: reqwest::Response,
    ) -> Result<T> {
        let body = response.text().await.unwrap_or_default();

        match status.as_u16() {
            401 => Err(Error::LLMError(
                "Unauthorized: Invalid API key. Set KGRAPH_API_KEY or OPENROUTER_API_KEY environment variable.".to_string(),
            )),
            429 => {
                let wait_secs = extract_retry_after(&body).unwrap_or(60);
                Err(Error::RateLimited(wait_secs))
            }
            400 => Err(Error::LLMError(format!("Bad request: {}", body))),
            402 => Err(Error::LLMError(
                "Payment required: Insufficient credits on OpenRouter account".to_string(),
            )),
            404 => Err(Error::LLMError(format!(
                "Model not found or endpoint unavailable: {}",
                body
            ))),
            500..=599 => Err(Error::LLMError(format!("Server error ({}): {}", status, body))),
            _ => Err(Error::LLMError(format!("HTTP error {}: {}", status, body))),
        }
    }

    /// Embed one text with the configured embedding model
    pub async fn embed(&self, text: &str) -> Result<Embedding> {
        let url = format!("{}/embeddings", self.base_url);
        let request = EmbeddingRequest::new(&self.embedding.model, text)
            .with_dimensions(self.embedding.dimensions);

        debug!(model = %request.model, chars = text.len(), "Sending embedding request");

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("X-Title", "kgraph")
            .json(&request)
            .send()
            .await
            .map_err(Error::NetworkError)?;

        let status = response.status();

        if !status.is_success() {
            return self.handle_error_response(status, response).await;
        }

        let embedding_response: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::EmbeddingFailed(format!("Failed to parse response: {}", e)))?;

        let data = embedding_response
            .data
            .into_iter()
            .min_by_key(|d| d.index)
            .ok_or_else(|| Error::EmbeddingFailed("Empty embedding response".to_string()))?;

        Ok(Embedding {
            vector: data.embedding,
            model: embedding_response.model,
            tokens_used: embedding_response
                .usage
                .map(|u| u.prompt_tokens)
                .unwrap_or(0),
        })
    }
}

/// Check if an error message indicates a model-specific error
fn is_model_error(msg: &str) -> bool {
    let model_error_patterns = [
        "model not found",
        "unavailable",
        "not available",
        "no available provider",
        "overloaded",
        "capacity",
    ];

    let msg_lower = msg.to_lowercase();
    model_error_patterns
        .iter()
        .any(|pattern| msg_lower.contains(pattern))
}

/// Calculate backoff delay with up to 10% jitter
fn calculate_backoff(attempt: u32, suggested_wait: u64) -> u64 {
    let base = BACKOFF_BASE_MS * 2u64.pow(attempt - 1);
    let delay = base.max(suggested_wait * 1000);

    let jitter = (delay / 10).max(1);
    delay + rand::thread_rng().gen_range(0..jitter)
}

/// Extract retry-after value from error response
fn extract_retry_after(body: &str) -> Option<u64> {
    let json = serde_json::from_str::<Value>(body).ok()?;
    json.get("retry_after")
        .or_else(|| json.get("error").and_then(|e| e.get("retry_after")))
        .and_then(|v| v.as_u64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config() -> LlmConfig {
        LlmConfig {
            api_key: None,
            default_model: "primary/model".to_string(),
            fallback_models: vec!["fallback/model".to_string()],
            temperature: 0.2,
            max_tokens: 1024,
            timeout_secs: 30,
        }
    }

    fn client_for(server: &MockServer) -> LlmClient {
        LlmClient::builder()
            .config(test_config())
            .api_key("test-key")
            .base_url(server.uri())
            .build()
            .unwrap()
    }

    fn chat_body(model: &str, content: &str) -> Value {
        json!({
            "id": "gen-1",
            "model": model,
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 3, "completion_tokens": 2, "total_tokens": 5}
        })
    }

    #[test]
    fn test_client_builder_requires_api_key() {
        let result = LlmClient::builder().config(test_config()).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_client_debug_hides_key() {
        let client = LlmClient::new(test_config(), "secret-key").unwrap();
        let debug = format!("{:?}", client);
        assert!(debug.contains("primary/model"));
        assert!(!debug.contains("secret-key"));
    }

    #[test]
    fn test_is_model_error() {
        assert!(is_model_error("Model not found"));
        assert!(is_model_error("No available provider for this model"));
        assert!(!is_model_error("Invalid API key"));
    }

    #[test]
    fn test_calculate_backoff() {
        assert!(calculate_backoff(1, 0) >= BACKOFF_BASE_MS);
        assert!(calculate_backoff(2, 0) >= BACKOFF_BASE_MS * 2);
        assert!(calculate_backoff(1, 5) >= 5000);
    }

    #[test]
    fn test_extract_retry_after() {
        assert_eq!(extract_retry_after(r#"{"retry_after": 30}"#), Some(30));
        assert_eq!(extract_retry_after(r#"{"error": {"retry_after": 60}}"#), Some(60));
        assert_eq!(extract_retry_after("not json"), None);
    }

    #[tokio::test]
    async fn test_complete_sends_bearer_and_parses() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_body("primary/model", "hi")))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let response = client.complete(vec![Message::user("hello")], None).await.unwrap();
        assert_eq!(response.content, "hi");
        assert_eq!(response.tokens_used, 5);
    }

    #[tokio::test]
    async fn test_unauthorized_is_llm_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.complete(vec![Message::user("x")], None).await.unwrap_err();
        assert!(matches!(err, Error::LLMError(_)));
    }

    #[tokio::test]
    async fn test_fallback_after_missing_model() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({"model": "primary/model"})))
            .respond_with(ResponseTemplate::new(404).set_body_string("no such model"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({"model": "fallback/model"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_body("fallback/model", "ok")))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let schema = json!({"type": "object"});
        let response = client
            .complete_with_fallback(vec![Message::user("x")], Some(("test", &schema)))
            .await
            .unwrap();
        assert_eq!(response.model, "fallback/model");
    }

    #[tokio::test]
    async fn test_embed_uses_configured_dimensions() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(body_partial_json(json!({"dimensions": 3})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "object": "list",
                "data": [{"index": 0, "embedding": [0.1, 0.2, 0.3], "object": "embedding"}],
                "model": "openai/text-embedding-3-small",
                "usage": {"prompt_tokens": 4, "total_tokens": 4}
            })))
            .mount(&server)
            .await;

        let client = LlmClient::builder()
            .config(test_config())
            .embedding(EmbeddingConfig {
                model: "openai/text-embedding-3-small".to_string(),
                dimensions: 3,
            })
            .api_key("test-key")
            .base_url(server.uri())
            .build()
            .unwrap();

        let embedding = client.embed("some text").await.unwrap();
        assert_eq!(embedding.dimensions(), 3);
        assert_eq!(embedding.tokens_used, 4);
    }
}
