//! Duplicate checks for upstream collectors
//!
//! Collectors call these before `ingest`; the engine itself never
//! deduplicates.

use std::collections::HashSet;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::error::Result;

use super::metadata::truncate_chars;
use super::repository::GraphRepository;

/// Characters of the snippet that feed the item hash
pub const HASH_SNIPPET_CHARS: usize = 200;

/// Stable hash for a collected item
///
/// A non-empty `precomputed` hash from the source wins. Otherwise the hash
/// is SHA-256 over `title|time|snippet`, with the title trimmed and
/// lowercased and the snippet lowercased, whitespace-collapsed and cut to
/// its first 200 characters.
pub fn compute_item_hash(
    title: &str,
    time_text: Option<&str>,
    snippet: Option<&str>,
    precomputed: Option<&str>,
) -> String {
    if let Some(hash) = precomputed.map(str::trim).filter(|h| !h.is_empty()) {
        return hash.to_string();
    }

    let snippet = snippet
        .map(|s| s.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" "))
        .unwrap_or_default();

    let key = format!(
        "{}|{}|{}",
        title.trim().to_lowercase(),
        time_text.map(str::trim).unwrap_or(""),
        truncate_chars(&snippet, HASH_SNIPPET_CHARS)
    );

    hex::encode(Sha256::digest(key.as_bytes()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DuplicateStatus {
    New,
    /// A content node already carries this `original_url`
    DuplicateUrl(String),
    /// A content node already carries this `hash`
    DuplicateHash(String),
}

impl DuplicateStatus {
    pub fn is_duplicate(&self) -> bool {
        !matches!(self, Self::New)
    }
}

#[derive(Clone)]
pub struct DedupGuard {
    repository: Arc<dyn GraphRepository>,
}

impl DedupGuard {
    pub fn new(repository: Arc<dyn GraphRepository>) -> Self {
        Self { repository }
    }

    /// URL match is checked first, then the hash
    pub async fn check(&self, url: Option<&str>, hash: Option<&str>) -> Result<DuplicateStatus> {
        if let Some(url) = url.map(str::trim).filter(|u| !u.is_empty())
            && let Some(id) = self.repository.find_content_by_original_url(url).await?
        {
            return Ok(DuplicateStatus::DuplicateUrl(id));
        }

        if let Some(hash) = hash.map(str::trim).filter(|h| !h.is_empty())
            && let Some(id) = self.repository.find_content_by_hash(hash).await?
        {
            return Ok(DuplicateStatus::DuplicateHash(id));
        }

        Ok(DuplicateStatus::New)
    }

    /// Which of `urls` are already stored
    pub async fn existing_urls(&self, urls: &[String]) -> Result<HashSet<String>> {
        if urls.is_empty() {
            return Ok(HashSet::new());
        }
        self.repository.existing_original_urls(urls).await
    }
}
