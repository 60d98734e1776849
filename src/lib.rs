//! Deterministic NICE NG12 guideline engine: document segmentation, rule
//! compilation, fact matching and hybrid chunk retrieval.
//!
//! The library never installs a tracing subscriber; the host decides where
//! events go.

pub mod cache;
pub mod compile;
pub mod config;
pub mod engine;
pub mod error;
pub mod matcher;
pub mod model;
pub mod patterns;
pub mod retrieval;
pub mod scope;
pub mod segment;
pub mod semantic;
pub mod terms;
pub mod util;

#[cfg(test)]
mod test_support;

pub use compile::{CompiledGuideline, RuleCompiler};
pub use config::EngineConfig;
pub use engine::{Engine, GuidelineSnapshot, SnapshotCell};
pub use error::{EngineError, Result};
pub use matcher::RuleMatcher;
pub use model::{Chunk, Facts, MatchResult, MatchType, RetrievalResult, Rule};
pub use retrieval::{RetrievalIndex, SearchQuery};
pub use scope::{ScopeCategory, ScopeGate};
pub use segment::Segmenter;
pub use terms::TermsNormalizer;
