//! Fakes for the model, the embedder and the store

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use kgraph_core::infrastructure::graph::SqliteGraphRepository;
use kgraph_core::llm::{Embedder, StructuredOutput};
use kgraph_core::storage::Database;
use kgraph_core::{Error, Result};
use serde_json::{Value, json};

pub async fn repository() -> Arc<SqliteGraphRepository> {
    let db = Database::in_memory().await.unwrap();
    Arc::new(SqliteGraphRepository::new(db.pool().clone()))
}

/// Model replying from a queue and recording every prompt
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<Value>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, value: Value) -> &Self {
        self.replies.lock().unwrap().push_back(Ok(value));
        self
    }

    pub fn fail(&self, error: Error) -> &Self {
        self.replies.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn prompt_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl StructuredOutput for ScriptedModel {
    async fn generate_structured(
        &self,
        _system_prompt: Option<&str>,
        user_prompt: &str,
        _schema: &Value,
    ) -> Result<Value> {
        self.prompts.lock().unwrap().push(user_prompt.to_string());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::LLMError("no scripted reply".to_string())))
    }
}

/// Bag-of-letters embedder: similar spellings give similar vectors
pub struct LetterEmbedder;

#[async_trait]
impl Embedder for LetterEmbedder {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; 27];
        for c in text.to_lowercase().chars() {
            if c.is_ascii_lowercase() {
                vector[(c as u8 - b'a') as usize] += 1.0;
            }
        }
        vector[26] = 0.1;
        Ok(vector)
    }
}

/// Letter embedder that misbehaves on request
///
/// Texts containing `empty_marker` embed to an empty vector; the calls
/// numbered in `failing_calls` (1-based) return an embedding error.
#[derive(Default)]
pub struct FaultyEmbedder {
    pub empty_marker: Option<String>,
    pub failing_calls: Vec<usize>,
    calls: Mutex<usize>,
}

impl FaultyEmbedder {
    pub fn empty_for(marker: &str) -> Arc<Self> {
        Arc::new(Self {
            empty_marker: Some(marker.to_string()),
            ..Default::default()
        })
    }

    pub fn failing_on(calls: &[usize]) -> Arc<Self> {
        Arc::new(Self {
            failing_calls: calls.to_vec(),
            ..Default::default()
        })
    }
}

#[async_trait]
impl Embedder for FaultyEmbedder {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            *calls
        };
        if self.failing_calls.contains(&call) {
            return Err(Error::EmbeddingFailed(format!("call {} refused", call)));
        }
        if let Some(marker) = &self.empty_marker {
            if text.contains(marker.as_str()) {
                return Ok(Vec::new());
            }
        }
        LetterEmbedder.embed_text(text).await
    }
}

pub fn unit(title: &str, content: &str, entities: &[&str]) -> Value {
    json!({
        "title": title,
        "content": content,
        "ai_summary": format!("{} summary", title),
        "doc_type": "news",
        "categories": ["commodities"],
        "key_entities": entities
    })
}

pub fn distilled(units: Vec<Value>) -> Value {
    json!({ "classified_nodes": units })
}
