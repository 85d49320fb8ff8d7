//! LLM integration - OpenRouter API
//!
//! This module provides:
//! - OpenRouter HTTP client for chat completions and embeddings
//! - Request/response types matching the OpenAI-compatible API
//! - `StructuredOutput` and `Embedder`, the seams the pipeline calls through
//! - Model fallback with automatic retry

mod client;
mod structured;
mod types;

pub use client::{LlmClient, LlmClientBuilder};
pub use structured::{Embedder, StructuredOutput, parse_structured, validate_against_schema};
pub use types::{
    ChatRequest, ChatResponse, Choice, Embedding, FinishReason, LlmResponse, Message, MessageRole,
    ResponseFormat, Usage,
};
