//! Decides whether a new content unit goes into the vector index

use std::collections::HashSet;

use serde::Serialize;

use crate::config::{DEFAULT_EXCLUDED_SOURCE_TYPES, DEFAULT_NEWS_SOURCE_TYPES, IngestionConfig};

use super::metadata::SourceContext;

/// Environment flag that stops news-like sources from being indexed
pub const NEWS_KILL_SWITCH_ENV: &str = "KGRAPH_DISABLE_NEWS_VECTORIZATION";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NoVectorIndex,
    NewsKillSwitch,
    CallerOptOut,
    ExcludedSourceType,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoVectorIndex => "no vector index configured",
            Self::NewsKillSwitch => "news vectorization disabled",
            Self::CallerOptOut => "caller opted out",
            Self::ExcludedSourceType => "source type excluded from indexing",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexDecision {
    Index,
    Skip(SkipReason),
}

impl IndexDecision {
    pub fn should_index(&self) -> bool {
        matches!(self, Self::Index)
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            Self::Index => None,
            Self::Skip(reason) => Some(*reason),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IndexingPolicy {
    excluded: HashSet<String>,
    news: HashSet<String>,
    news_kill_switch: bool,
}

impl Default for IndexingPolicy {
    fn default() -> Self {
        Self {
            excluded: lowercase_set(DEFAULT_EXCLUDED_SOURCE_TYPES.iter().copied()),
            news: lowercase_set(DEFAULT_NEWS_SOURCE_TYPES.iter().copied()),
            news_kill_switch: false,
        }
    }
}

impl IndexingPolicy {
    /// Policy from config, with the kill switch read from the environment
    pub fn from_config(config: &IngestionConfig) -> Self {
        let flag = std::env::var(NEWS_KILL_SWITCH_ENV).ok();
        Self {
            excluded: lowercase_set(config.excluded_source_types.iter().map(String::as_str)),
            news: lowercase_set(config.news_source_types.iter().map(String::as_str)),
            news_kill_switch: parse_flag(flag.as_deref()),
        }
    }

    pub fn with_news_kill_switch(mut self, enabled: bool) -> Self {
        self.news_kill_switch = enabled;
        self
    }

    pub fn news_kill_switch(&self) -> bool {
        self.news_kill_switch
    }

    /// Decide for one ingest call
    ///
    /// The kill switch beats an explicit caller override; the override
    /// beats the exclusion list.
    pub fn decide(&self, context: &SourceContext, index_available: bool) -> IndexDecision {
        if !index_available {
            return IndexDecision::Skip(SkipReason::NoVectorIndex);
        }

        let source_type = context.source_type().to_lowercase();

        if self.news_kill_switch && self.news.contains(&source_type) {
            return IndexDecision::Skip(SkipReason::NewsKillSwitch);
        }

        match context.index_to_vector_store {
            Some(true) => IndexDecision::Index,
            Some(false) => IndexDecision::Skip(SkipReason::CallerOptOut),
            None if self.excluded.contains(&source_type) => {
                IndexDecision::Skip(SkipReason::ExcludedSourceType)
            }
            None => IndexDecision::Index,
        }
    }
}

/// "1", "true" and "yes" (any case) turn a flag on
pub fn parse_flag(raw: Option<&str>) -> bool {
    raw.map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

fn lowercase_set<'a>(items: impl Iterator<Item = &'a str>) -> HashSet<String> {
    items.map(|s| s.trim().to_lowercase()).collect()
}
