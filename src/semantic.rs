use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::util::normalize_whitespace;

pub const DEFAULT_MODEL_ID: &str = "ng12-local-hash-v1";
pub const DEFAULT_EMBEDDING_DIM: usize = 384;
pub const DEFAULT_BACKEND: &str = "local-hash-v1";

/// Source of dense vectors. Implementations must return vectors of exactly
/// `dimensions()` entries; the index refuses anything else.
pub trait EmbeddingProvider {
    fn model_id(&self) -> &str;
    fn dimensions(&self) -> usize;
    fn embed(&self, text: &str) -> Vec<f32>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingModel {
    pub model_id: String,
    pub dimensions: usize,
    pub backend: String,
}

pub fn resolve_model_config(model_id: &str, dimensions: Option<usize>) -> EmbeddingModel {
    let trimmed = model_id.trim();
    let resolved_id = if trimmed.is_empty() {
        DEFAULT_MODEL_ID
    } else {
        trimmed
    };

    EmbeddingModel {
        model_id: resolved_id.to_string(),
        dimensions: dimensions.unwrap_or(DEFAULT_EMBEDDING_DIM),
        backend: DEFAULT_BACKEND.to_string(),
    }
}

/// Offline embedder hashing word and bigram features into a fixed-width,
/// L2-normalized vector. Deterministic across runs of the same build.
#[derive(Debug, Clone)]
pub struct LocalHashEmbedder {
    model: EmbeddingModel,
}

impl LocalHashEmbedder {
    pub fn new(model: EmbeddingModel) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &EmbeddingModel {
        &self.model
    }
}

impl Default for LocalHashEmbedder {
    fn default() -> Self {
        Self::new(resolve_model_config(DEFAULT_MODEL_ID, None))
    }
}

impl EmbeddingProvider for LocalHashEmbedder {
    fn model_id(&self) -> &str {
        &self.model.model_id
    }

    fn dimensions(&self) -> usize {
        self.model.dimensions
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        embed_text_local(text, self.model.dimensions)
    }
}

pub fn check_dimensions(model_id: &str, expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        return Ok(());
    }

    Err(EngineError::EmbeddingDimensionMismatch {
        model_id: model_id.to_string(),
        expected,
        actual,
    })
}

/// Embeds every text through `provider`, failing closed on the first vector
/// whose width disagrees with the provider's declared dimensionality.
pub fn embed_all<'a>(
    provider: &dyn EmbeddingProvider,
    texts: impl IntoIterator<Item = &'a str>,
) -> Result<Vec<Vec<f32>>> {
    texts
        .into_iter()
        .map(|text| {
            let vector = provider.embed(text);
            check_dimensions(provider.model_id(), provider.dimensions(), vector.len())?;
            Ok(vector)
        })
        .collect()
}

pub fn embed_text_local(payload: &str, dimensions: usize) -> Vec<f32> {
    let dims = dimensions.max(1);
    let mut vector = vec![0_f32; dims];

    for token in tokenize_payload(payload) {
        let hash = stable_hash(&token);
        let index = (hash as usize) % dims;
        let sign = if (hash >> 63) & 1 == 0 { 1.0 } else { -1.0 };
        let weight = 1.0 + (((hash >> 48) & 0xFF) as f32 / 255.0);
        vector[index] += sign * weight;
    }

    normalize_vector(&mut vector);
    vector
}

/// Cosine similarity; zero for empty, mismatched or all-zero inputs.
pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f64 {
    if left.len() != right.len() || left.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0_f64;
    let mut left_norm = 0.0_f64;
    let mut right_norm = 0.0_f64;
    for (left_value, right_value) in left.iter().zip(right.iter()) {
        let (l, r) = (f64::from(*left_value), f64::from(*right_value));
        dot += l * r;
        left_norm += l * l;
        right_norm += r * r;
    }

    if left_norm <= 0.0 || right_norm <= 0.0 {
        return 0.0;
    }

    dot / (left_norm.sqrt() * right_norm.sqrt())
}

pub fn encode_embedding_blob(values: &[f32]) -> Vec<u8> {
    let mut out = Vec::<u8>::with_capacity(values.len() * 4);
    for value in values {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

pub fn decode_embedding_blob(blob: &[u8], expected_dim: usize) -> Option<Vec<f32>> {
    if expected_dim == 0 || blob.len() != expected_dim.saturating_mul(4) {
        return None;
    }

    Some(
        blob.chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect(),
    )
}

fn stable_hash(value: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

fn tokenize_payload(payload: &str) -> Vec<String> {
    let normalized = normalize_whitespace(payload);

    let words = normalized
        .split(' ')
        .map(|value| {
            value
                .chars()
                .filter(|character| character.is_alphanumeric())
                .collect::<String>()
                .to_lowercase()
        })
        .filter(|value| !value.is_empty())
        .collect::<Vec<String>>();

    let mut features = Vec::<String>::with_capacity(words.len() * 2);
    for (index, word) in words.iter().enumerate() {
        features.push(format!("w:{word}"));
        if let Some(next) = words.get(index + 1) {
            features.push(format!("b:{word}_{next}"));
        }
    }
    features
}

fn normalize_vector(values: &mut [f32]) {
    let squared_norm = values
        .iter()
        .map(|value| f64::from(*value) * f64::from(*value))
        .sum::<f64>();

    if squared_norm <= 0.0 {
        return;
    }

    let norm = squared_norm.sqrt() as f32;
    for value in values {
        *value /= norm;
    }
}

#[cfg(test)]
mod tests {
    use super::{
        EmbeddingProvider, LocalHashEmbedder, check_dimensions, cosine_similarity,
        decode_embedding_blob, embed_all, encode_embedding_blob, resolve_model_config,
    };

    #[test]
    fn local_embedder_is_deterministic_and_unit_length() {
        let embedder = LocalHashEmbedder::default();
        let first = embedder.embed("unexplained haemoptysis in people aged 40");
        let second = embedder.embed("unexplained  haemoptysis in people aged 40");
        assert_eq!(first, second);
        assert_eq!(first.len(), embedder.dimensions());

        let norm = first.iter().map(|v| f64::from(*v).powi(2)).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn cosine_handles_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[2.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-12);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-12);
    }

    #[test]
    fn blob_decoding_rejects_wrong_width() {
        let blob = encode_embedding_blob(&[0.25, -1.5, 3.0]);
        assert_eq!(decode_embedding_blob(&blob, 3), Some(vec![0.25, -1.5, 3.0]));
        assert_eq!(decode_embedding_blob(&blob, 4), None);
        assert_eq!(decode_embedding_blob(&blob, 0), None);
    }

    struct ShortProvider;

    impl EmbeddingProvider for ShortProvider {
        fn model_id(&self) -> &str {
            "short"
        }

        fn dimensions(&self) -> usize {
            8
        }

        fn embed(&self, _text: &str) -> Vec<f32> {
            vec![0.5; 4]
        }
    }

    #[test]
    fn embed_all_fails_closed_on_wrong_dimensions() {
        let err = embed_all(&ShortProvider, ["cough"]).expect_err("width disagrees");
        assert!(matches!(
            err,
            crate::error::EngineError::EmbeddingDimensionMismatch {
                expected: 8,
                actual: 4,
                ..
            }
        ));
        assert!(check_dimensions("m", 3, 3).is_ok());
    }

    #[test]
    fn blank_model_id_resolves_to_default() {
        let model = resolve_model_config("  ", Some(16));
        assert_eq!(model.model_id, super::DEFAULT_MODEL_ID);
        assert_eq!(model.dimensions, 16);
    }
}
