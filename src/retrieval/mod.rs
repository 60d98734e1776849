//! Hybrid chunk retrieval: BM25 over chunk text fused with cosine similarity
//! against supplied embeddings.

mod lexical;


use std::collections::HashMap;

use tracing::{debug, info};

use crate::config::RetrievalConfig;
use crate::error::{EngineError, Result};
use crate::model::{Chunk, RetrievalResult};
use crate::semantic::{EmbeddingProvider, check_dimensions, cosine_similarity, embed_all};
use crate::terms::TermsNormalizer;

pub use lexical::{LexicalIndex, Posting, indexed_text, tokenize};

/// Dense vectors for every chunk, in chunk order, from one embedding model.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkEmbeddings {
    pub model_id: String,
    pub dimensions: usize,
    pub vectors: Vec<Vec<f32>>,
}

impl ChunkEmbeddings {
    /// Embeds each chunk's indexed text; any wrong-sized vector fails the batch.
    pub fn compute(provider: &dyn EmbeddingProvider, chunks: &[Chunk]) -> Result<Self> {
        let texts = chunks.iter().map(indexed_text).collect::<Vec<String>>();
        let vectors = embed_all(provider, texts.iter().map(String::as_str))?;
        Ok(Self {
            model_id: provider.model_id().to_string(),
            dimensions: provider.dimensions(),
            vectors,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchQuery {
    pub text: String,
    /// Query vector from the same model as the chunk embeddings.
    pub embedding: Option<Vec<f32>>,
    pub top_k: Option<usize>,
    pub site: Option<String>,
    pub age: Option<u32>,
    pub symptoms: Vec<String>,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetrievalIndex {
    chunks: Vec<Chunk>,
    positions: HashMap<String, usize>,
    lexical: LexicalIndex,
    embeddings: Option<ChunkEmbeddings>,
    terms: TermsNormalizer,
    config: RetrievalConfig,
}

impl RetrievalIndex {
    pub fn build(
        chunks: Vec<Chunk>,
        embeddings: Option<ChunkEmbeddings>,
        config: RetrievalConfig,
    ) -> Result<Self> {
        let lexical = LexicalIndex::build(&chunks);
        Self::from_parts(chunks, lexical, embeddings, config)
    }

    /// Assembles an index from already-built parts (e.g. a loaded cache).
    pub fn from_parts(
        chunks: Vec<Chunk>,
        lexical: LexicalIndex,
        embeddings: Option<ChunkEmbeddings>,
        config: RetrievalConfig,
    ) -> Result<Self> {
        if let Some(embeddings) = &embeddings {
            for vector in &embeddings.vectors {
                check_dimensions(&embeddings.model_id, embeddings.dimensions, vector.len())?;
            }
            if embeddings.vectors.len() != chunks.len() {
                return Err(EngineError::InvalidConfig(format!(
                    "{} embeddings supplied for {} chunks",
                    embeddings.vectors.len(),
                    chunks.len()
                )));
            }
        }

        let positions = chunks
            .iter()
            .enumerate()
            .map(|(ord, chunk)| (chunk.chunk_id.clone(), ord))
            .collect::<HashMap<String, usize>>();

        info!(
            chunks = chunks.len(),
            terms = lexical.term_count(),
            embeddings = embeddings.as_ref().map(|value| value.model_id.as_str()).unwrap_or("-"),
            "retrieval index ready"
        );

        Ok(Self {
            chunks,
            positions,
            lexical,
            embeddings,
            terms: TermsNormalizer::new()?,
            config,
        })
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn chunk(&self, chunk_id: &str) -> Option<&Chunk> {
        self.positions
            .get(chunk_id)
            .map(|ord| &self.chunks[*ord])
    }

    pub fn lexical(&self) -> &LexicalIndex {
        &self.lexical
    }

    pub fn embeddings(&self) -> Option<&ChunkEmbeddings> {
        self.embeddings.as_ref()
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Top chunks by fused score. The site filter and the age filter are hard:
    /// excluded chunks never appear. Ties keep chunk order.
    pub fn search(&self, query: &SearchQuery) -> Result<Vec<RetrievalResult>> {
        let config = &self.config;
        let top_k = query.top_k.unwrap_or(config.default_top_k);
        if top_k == 0 || self.chunks.is_empty() {
            return Ok(Vec::new());
        }

        let eligible = self
            .chunks
            .iter()
            .enumerate()
            .filter(|(_, chunk)| site_admits(chunk, query.site.as_deref()))
            .filter(|(_, chunk)| age_admits(chunk, query.age))
            .map(|(ord, _)| ord)
            .collect::<Vec<usize>>();

        let raw_lexical = self.lexical.scores(&query.text, config.bm25_k1, config.bm25_b);
        let lexical = normalize_over(&eligible, &raw_lexical);

        let raw_semantic = self.semantic_scores(query.embedding.as_deref())?;
        let semantic = normalize_over(&eligible, &raw_semantic);

        // Chunk tags are canonical terms, so query synonyms fold first.
        let mut wanted_symptoms = Vec::<String>::new();
        for symptom in self.terms.normalize_symptoms(&query.symptoms) {
            let symptom = symptom.trim().to_lowercase();
            if !symptom.is_empty() && !wanted_symptoms.contains(&symptom) {
                wanted_symptoms.push(symptom);
            }
        }

        let mut scored = eligible
            .iter()
            .map(|ord| {
                let lexical_score = lexical[*ord];
                let semantic_score = semantic[*ord];
                let fused = config.lexical_weight * lexical_score
                    + config.semantic_weight * semantic_score;
                let boost = symptom_boost(
                    &self.chunks[*ord],
                    &wanted_symptoms,
                    config.symptom_boost,
                );
                (*ord, lexical_score, semantic_score, fused * boost)
            })
            .filter(|(_, _, _, fused)| *fused > 0.0)
            .collect::<Vec<(usize, f64, f64, f64)>>();

        scored.sort_by(|left, right| right.3.total_cmp(&left.3).then(left.0.cmp(&right.0)));
        scored.truncate(top_k);

        debug!(
            query = %query.text,
            eligible = eligible.len(),
            returned = scored.len(),
            "retrieval search"
        );

        Ok(scored
            .into_iter()
            .map(
                |(ord, lexical_score, semantic_score, fused_score)| RetrievalResult {
                    chunk_id: self.chunks[ord].chunk_id.clone(),
                    lexical_score,
                    semantic_score,
                    fused_score,
                },
            )
            .collect())
    }

    fn semantic_scores(&self, query: Option<&[f32]>) -> Result<Vec<f64>> {
        let mut scores = vec![0.0_f64; self.chunks.len()];
        let (Some(query), Some(embeddings)) = (query, self.embeddings.as_ref()) else {
            return Ok(scores);
        };
        check_dimensions(&embeddings.model_id, embeddings.dimensions, query.len())?;

        for (score, vector) in scores.iter_mut().zip(&embeddings.vectors) {
            *score = cosine_similarity(query, vector).max(0.0);
        }
        Ok(scores)
    }
}

fn site_admits(chunk: &Chunk, site: Option<&str>) -> bool {
    site.is_none_or(|wanted| {
        chunk
            .site
            .as_deref()
            .is_some_and(|value| value.eq_ignore_ascii_case(wanted.trim()))
    })
}

fn age_admits(chunk: &Chunk, age: Option<u32>) -> bool {
    let Some(age) = age else {
        return true;
    };
    let metadata = &chunk.local_metadata;
    metadata.age_min.is_none_or(|min| age >= min) && metadata.age_max.is_none_or(|max| age <= max)
}

/// Scales scores of the eligible ordinals so the best one is 1.0.
fn normalize_over(eligible: &[usize], raw: &[f64]) -> Vec<f64> {
    let max = eligible
        .iter()
        .map(|ord| raw[*ord])
        .fold(0.0_f64, f64::max);
    if max <= 0.0 {
        return vec![0.0; raw.len()];
    }
    raw.iter().map(|score| score / max).collect()
}

/// Multiplier in `[1, 1 + boost]` proportional to symptom-tag overlap.
fn symptom_boost(chunk: &Chunk, wanted: &[String], boost: f64) -> f64 {
    let tags = &chunk.local_metadata.symptom_tags;
    if wanted.is_empty() || tags.is_empty() {
        return 1.0;
    }
    let overlap = wanted.iter().filter(|symptom| tags.contains(symptom)).count();
    let denominator = wanted.len().max(tags.len()) as f64;
    1.0 + boost * overlap as f64 / denominator
}
