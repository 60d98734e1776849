use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::semantic::{DEFAULT_EMBEDDING_DIM, DEFAULT_MODEL_ID};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub retrieval: RetrievalConfig,
    pub matcher: MatcherConfig,
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub bm25_k1: f64,
    pub bm25_b: f64,
    pub lexical_weight: f64,
    pub semantic_weight: f64,
    /// Maximum symptom-overlap multiplier is `1 + symptom_boost`.
    pub symptom_boost: f64,
    pub default_top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            bm25_k1: 1.5,
            bm25_b: 0.75,
            lexical_weight: 0.4,
            semantic_weight: 0.6,
            symptom_boost: 0.2,
            default_top_k: 5,
        }
    }
}

/// What an indexed matcher does when no rule shares a keyword with the facts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyCandidates {
    #[default]
    NoCandidates,
    AllRules,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CandidatePolicy {
    #[default]
    Exhaustive,
    Indexed {
        #[serde(default)]
        on_empty: EmptyCandidates,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    pub children_age_ceiling: u32,
    pub adult_age_floor: u32,
    pub candidates: CandidatePolicy,
    pub near_match_min_confidence: f64,
    pub max_near_matches: usize,
    pub max_citations: usize,
    pub citation_excerpt_chars: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            children_age_ceiling: 24,
            adult_age_floor: 18,
            candidates: CandidatePolicy::Exhaustive,
            near_match_min_confidence: 0.3,
            max_near_matches: 5,
            max_citations: 5,
            citation_excerpt_chars: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model_id: String,
    pub dimensions: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_id: DEFAULT_MODEL_ID.to_string(),
            dimensions: DEFAULT_EMBEDDING_DIM,
        }
    }
}

impl EngineConfig {
    /// Reads a JSON config file; missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| EngineError::io(path, source))?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|err| EngineError::InvalidConfig(format!("{}: {err}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let retrieval = &self.retrieval;
        let numeric = [
            ("retrieval.bm25_k1", retrieval.bm25_k1),
            ("retrieval.bm25_b", retrieval.bm25_b),
            ("retrieval.lexical_weight", retrieval.lexical_weight),
            ("retrieval.semantic_weight", retrieval.semantic_weight),
            ("retrieval.symptom_boost", retrieval.symptom_boost),
            (
                "matcher.near_match_min_confidence",
                self.matcher.near_match_min_confidence,
            ),
        ];
        for (name, value) in numeric {
            if !value.is_finite() || value < 0.0 {
                return Err(EngineError::InvalidConfig(format!(
                    "{name} must be finite and non-negative, got {value}"
                )));
            }
        }

        if retrieval.bm25_b > 1.0 {
            return Err(EngineError::InvalidConfig(format!(
                "retrieval.bm25_b must be within [0, 1], got {}",
                retrieval.bm25_b
            )));
        }

        let weight_sum = retrieval.lexical_weight + retrieval.semantic_weight;
        if weight_sum <= 0.0 || weight_sum > 2.0 {
            return Err(EngineError::InvalidConfig(format!(
                "retrieval weights must sum within (0, 2], got {weight_sum}"
            )));
        }

        if retrieval.default_top_k == 0 {
            return Err(EngineError::InvalidConfig(
                "retrieval.default_top_k must be at least 1".to_string(),
            ));
        }

        if self.embedding.model_id.trim().is_empty() || self.embedding.dimensions == 0 {
            return Err(EngineError::InvalidConfig(
                "embedding.model_id and embedding.dimensions must be set".to_string(),
            ));
        }

        Ok(())
    }
}
