//! In-process vector index with brute-force cosine search

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::graph::{VectorFilter, VectorIndex, VectorMatch, VectorMetadata};
use crate::error::{Error, Result};

#[derive(Debug, Default)]
pub struct MemoryVectorIndex {
    entries: RwLock<HashMap<String, (Vec<f32>, VectorMetadata)>>,
}

impl MemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.entries.read().await.contains_key(id)
    }
}

fn matches_filter(metadata: &VectorMetadata, filter: Option<&VectorFilter>) -> bool {
    filter.is_none_or(|f| {
        f.iter()
            .all(|(key, expected)| metadata.field(key).as_ref() == Some(expected))
    })
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn upsert(&self, id: &str, values: Vec<f32>, metadata: VectorMetadata) -> Result<()> {
        if values.is_empty() {
            return Err(Error::VectorIndexError("empty vector".to_string()));
        }
        self.entries
            .write()
            .await
            .insert(id.to_string(), (values, metadata));
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&VectorFilter>,
    ) -> Result<Vec<VectorMatch>> {
        let entries = self.entries.read().await;

        let mut results: Vec<VectorMatch> = entries
            .iter()
            .filter(|(_, (_, metadata))| matches_filter(metadata, filter))
            .map(|(id, (values, metadata))| VectorMatch {
                id: id.clone(),
                score: cosine_similarity(vector, values),
                metadata: Some(metadata.clone()),
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        results.truncate(top_k);
        Ok(results)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Compute cosine similarity between two vectors
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    dot_product / (magnitude_a * magnitude_b)
}
