//! Scripted fakes shared by unit tests

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::infrastructure::graph::SqliteGraphRepository;
use crate::llm::{Embedder, StructuredOutput};
use crate::storage::Database;

pub async fn sqlite_repository() -> Arc<SqliteGraphRepository> {
    let db = Database::in_memory().await.unwrap();
    Arc::new(SqliteGraphRepository::new(db.pool().clone()))
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub system: Option<String>,
    pub user: String,
}

/// Replies from a queue; an empty queue answers with an error
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<Value>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_ok(&self, value: Value) {
        self.replies.lock().unwrap().push_back(Ok(value));
    }

    pub fn push_err(&self, error: Error) {
        self.replies.lock().unwrap().push_back(Err(error));
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl StructuredOutput for ScriptedModel {
    async fn generate_structured(
        &self,
        system_prompt: Option<&str>,
        user_prompt: &str,
        _schema: &Value,
    ) -> Result<Value> {
        self.calls.lock().unwrap().push(RecordedCall {
            system: system_prompt.map(str::to_string),
            user: user_prompt.to_string(),
        });
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::LLMError("no scripted reply".to_string())))
    }
}

/// Counts keyword occurrences; texts sharing words land close together
pub struct KeywordEmbedder {
    keywords: Vec<&'static str>,
}

impl Default for KeywordEmbedder {
    fn default() -> Self {
        Self {
            keywords: vec![
                "copper", "lithium", "gold", "nickel", "price", "mine", "strike", "supply",
                "chile", "rally", "slump", "brine",
            ],
        }
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let lower = text.to_lowercase();
        let mut vector: Vec<f32> = self
            .keywords
            .iter()
            .map(|k| lower.matches(k).count() as f32)
            .collect();
        vector.push(0.1);
        Ok(vector)
    }
}
