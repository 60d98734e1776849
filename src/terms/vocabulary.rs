use serde::Serialize;
use tracing::debug;

use super::TermsNormalizer;
use crate::error::Result;
use crate::semantic::{EmbeddingProvider, check_dimensions, cosine_similarity, embed_all};

pub const MATCH_THRESHOLD: f64 = 0.65;
pub const HIGH_CONFIDENCE_THRESHOLD: f64 = 0.85;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchConfidence {
    High,
    Accepted,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VocabularyMatch {
    pub canonical: &'static str,
    pub matched_term: &'static str,
    pub similarity: f64,
    pub confidence: MatchConfidence,
}

#[derive(Debug, Clone)]
struct VocabularyEntry {
    term: &'static str,
    canonical: &'static str,
    vector: Vec<f32>,
}

/// Embedded copy of the synonym table for nearest-neighbour lookup of
/// phrasings the exact table does not list.
#[derive(Debug, Clone)]
pub struct SymptomVocabulary {
    model_id: String,
    dimensions: usize,
    entries: Vec<VocabularyEntry>,
}

impl SymptomVocabulary {
    pub fn build(terms: &TermsNormalizer, provider: &dyn EmbeddingProvider) -> Result<Self> {
        let mut pairs = Vec::<(&'static str, &'static str)>::new();
        for (canonical, synonyms) in terms.entries() {
            pairs.push((canonical, canonical));
            pairs.extend(synonyms.iter().map(|synonym| (*synonym, canonical)));
        }

        let vectors = embed_all(provider, pairs.iter().map(|(term, _)| *term))?;
        let entries = pairs
            .into_iter()
            .zip(vectors)
            .map(|((term, canonical), vector)| VocabularyEntry {
                term,
                canonical,
                vector,
            })
            .collect::<Vec<VocabularyEntry>>();

        debug!(
            model_id = provider.model_id(),
            entries = entries.len(),
            "built symptom vocabulary"
        );

        Ok(Self {
            model_id: provider.model_id().to_string(),
            dimensions: provider.dimensions(),
            entries,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Closest vocabulary entry to an already-embedded phrase, if it clears
    /// [`MATCH_THRESHOLD`]. Earlier table entries win exact ties.
    pub fn nearest(&self, query_vector: &[f32]) -> Result<Option<VocabularyMatch>> {
        check_dimensions(&self.model_id, self.dimensions, query_vector.len())?;

        let mut best: Option<(&VocabularyEntry, f64)> = None;
        for entry in &self.entries {
            let similarity = cosine_similarity(query_vector, &entry.vector);
            if best.is_none_or(|(_, score)| similarity > score) {
                best = Some((entry, similarity));
            }
        }

        Ok(best
            .filter(|(_, similarity)| *similarity >= MATCH_THRESHOLD)
            .map(|(entry, similarity)| VocabularyMatch {
                canonical: entry.canonical,
                matched_term: entry.term,
                similarity,
                confidence: if similarity >= HIGH_CONFIDENCE_THRESHOLD {
                    MatchConfidence::High
                } else {
                    MatchConfidence::Accepted
                },
            }))
    }
}
