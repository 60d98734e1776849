//! On-disk caches for compiled rules and retrieval structures.
//!
//! Both files are published by write-to-temp-then-rename, so a reader sees
//! either the previous file or the complete new one.

mod retrieval;
mod rules;


use std::path::PathBuf;

use serde::Serialize;

pub use retrieval::{
    RETRIEVAL_SCHEMA_VERSION, RetrievalCacheContents, load_retrieval_cache,
    write_retrieval_cache,
};
pub use rules::{RULE_CACHE_SCHEMA_VERSION, RuleCacheFile, load_rule_cache, write_rule_cache};

pub const RULES_FILE: &str = "rules.json";
pub const RETRIEVAL_FILE: &str = "retrieval.sqlite";

/// Outcome of reading a cache file that parsed cleanly.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheState<T> {
    Fresh(T),
    Missing,
    /// Written for another document version or schema.
    Stale(String),
}

impl<T> CacheState<T> {
    pub fn fresh(self) -> Option<T> {
        match self {
            Self::Fresh(value) => Some(value),
            Self::Missing | Self::Stale(_) => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Fresh(_) => "fresh",
            Self::Missing => "missing",
            Self::Stale(_) => "stale",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CachePaths {
    pub root: PathBuf,
}

impl CachePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn rules(&self) -> PathBuf {
        self.root.join(RULES_FILE)
    }

    pub fn retrieval(&self) -> PathBuf {
        self.root.join(RETRIEVAL_FILE)
    }
}

/// Per-file cache state for one document hash, as reported by `status`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheReport {
    pub content_hash: String,
    pub rules_path: PathBuf,
    pub rules_state: String,
    pub rule_count: Option<usize>,
    pub retrieval_path: PathBuf,
    pub retrieval_state: String,
    pub chunk_count: Option<usize>,
    pub embedding_model_id: Option<String>,
}

/// Inspects both cache files without rebuilding anything. Corruption and
/// dimension faults are reported in the state text instead of failing.
pub fn inspect(
    paths: &CachePaths,
    content_hash: &str,
    model_id: &str,
    dimensions: usize,
) -> CacheReport {
    let rules_path = paths.rules();
    let (rules_state, rule_count) = match load_rule_cache(&rules_path, content_hash) {
        Ok(CacheState::Fresh(rules)) => ("fresh".to_string(), Some(rules.len())),
        Ok(CacheState::Stale(reason)) => (format!("stale: {reason}"), None),
        Ok(state) => (state.label().to_string(), None),
        Err(err) => (format!("error: {err}"), None),
    };

    let retrieval_path = paths.retrieval();
    let (retrieval_state, chunk_count, embedding_model_id) =
        match load_retrieval_cache(&retrieval_path, content_hash, model_id, dimensions) {
            Ok(CacheState::Fresh(contents)) => {
                let state = if contents.embeddings.is_some() {
                    "fresh"
                } else {
                    "fresh (vectors stale)"
                };
                (
                    state.to_string(),
                    Some(contents.chunks.len()),
                    contents.embeddings.map(|value| value.model_id),
                )
            }
            Ok(CacheState::Stale(reason)) => (format!("stale: {reason}"), None, None),
            Ok(state) => (state.label().to_string(), None, None),
            Err(err) => (format!("error: {err}"), None, None),
        };

    CacheReport {
        content_hash: content_hash.to_string(),
        rules_path,
        rules_state,
        rule_count,
        retrieval_path,
        retrieval_state,
        chunk_count,
        embedding_model_id,
    }
}
