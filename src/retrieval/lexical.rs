use std::collections::BTreeMap;

use crate::model::Chunk;

/// One posting: chunk ordinal and term frequency in that chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Posting {
    pub ord: usize,
    pub tf: u32,
}

/// Inverted index over chunk text plus section breadcrumbs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LexicalIndex {
    postings: BTreeMap<String, Vec<Posting>>,
    doc_lengths: Vec<u32>,
    average_length: f64,
}

pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|ch: char| !ch.is_alphanumeric())
        .filter(|token| token.chars().count() > 1)
        .map(str::to_string)
        .collect()
}

/// The text a chunk is indexed under.
pub fn indexed_text(chunk: &Chunk) -> String {
    let mut text = chunk.section_path.join(" ");
    text.push('\n');
    text.push_str(&chunk.text);
    text
}

impl LexicalIndex {
    pub fn build(chunks: &[Chunk]) -> Self {
        let mut postings = BTreeMap::<String, Vec<Posting>>::new();
        let mut doc_lengths = Vec::<u32>::with_capacity(chunks.len());

        for (ord, chunk) in chunks.iter().enumerate() {
            let tokens = tokenize(&indexed_text(chunk));
            doc_lengths.push(tokens.len() as u32);

            let mut counts = BTreeMap::<String, u32>::new();
            for token in tokens {
                *counts.entry(token).or_default() += 1;
            }
            for (term, tf) in counts {
                postings.entry(term).or_default().push(Posting { ord, tf });
            }
        }

        Self::from_parts(postings, doc_lengths)
    }

    /// Rebuilds an index from stored postings; each list is kept in ordinal order.
    pub fn from_parts(mut postings: BTreeMap<String, Vec<Posting>>, doc_lengths: Vec<u32>) -> Self {
        for list in postings.values_mut() {
            list.sort_by_key(|posting| posting.ord);
        }
        let total = doc_lengths.iter().map(|length| f64::from(*length)).sum::<f64>();
        let average_length = if doc_lengths.is_empty() {
            0.0
        } else {
            total / doc_lengths.len() as f64
        };

        Self {
            postings,
            doc_lengths,
            average_length,
        }
    }

    pub fn doc_count(&self) -> usize {
        self.doc_lengths.len()
    }

    pub fn doc_lengths(&self) -> &[u32] {
        &self.doc_lengths
    }

    pub fn term_count(&self) -> usize {
        self.postings.len()
    }

    pub fn postings(&self) -> impl Iterator<Item = (&str, &[Posting])> {
        self.postings
            .iter()
            .map(|(term, list)| (term.as_str(), list.as_slice()))
    }

    /// Raw BM25 score for every chunk ordinal; zero where no query term occurs.
    pub fn scores(&self, query: &str, k1: f64, b: f64) -> Vec<f64> {
        let mut scores = vec![0.0_f64; self.doc_lengths.len()];
        if self.doc_lengths.is_empty() || self.average_length <= 0.0 {
            return scores;
        }

        let mut terms = tokenize(query);
        terms.sort();
        terms.dedup();

        let doc_count = self.doc_lengths.len() as f64;
        for term in terms {
            let Some(list) = self.postings.get(&term) else {
                continue;
            };
            let containing = list.len() as f64;
            let idf = (1.0 + (doc_count - containing + 0.5) / (containing + 0.5)).ln();

            for posting in list {
                let Some(length) = self.doc_lengths.get(posting.ord) else {
                    continue;
                };
                let tf = f64::from(posting.tf);
                let norm = 1.0 - b + b * f64::from(*length) / self.average_length;
                scores[posting.ord] += idf * tf * (k1 + 1.0) / (tf + k1 * norm);
            }
        }

        scores
    }
}
