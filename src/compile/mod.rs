//! Turns segmented chunks into typed [`Rule`] records.
//!
//! Each step is a pure pattern match over the chunk text: rule id, action,
//! age constraint, condition tree, atomic classification.

mod clause;
mod classify;


use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result;
use crate::model::{AgeConstraint, Chunk, MetadataQuality, Rule, SectionContainer};
use crate::patterns::GuidelinePatterns;
use crate::segment::Segmenter;
use crate::terms::TermsNormalizer;
use crate::util::{normalize_whitespace, sha256_hex};

pub use clause::{Clause, ClauseLead, ClauseParser};
pub use classify::{build_atom, classify_kind, clean_leaf};

/// Everything derived from one version of the guideline document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledGuideline {
    pub content_hash: String,
    pub containers: Vec<SectionContainer>,
    pub chunks: Vec<Chunk>,
    pub rules: Vec<Rule>,
}

#[derive(Debug)]
pub struct RuleCompiler {
    patterns: GuidelinePatterns,
    clauses: ClauseParser,
    terms: TermsNormalizer,
}

impl RuleCompiler {
    pub fn new(terms: TermsNormalizer) -> Result<Self> {
        Ok(Self {
            patterns: GuidelinePatterns::new()?,
            clauses: ClauseParser::new()?,
            terms,
        })
    }

    pub fn terms(&self) -> &TermsNormalizer {
        &self.terms
    }

    /// One rule per numbered chunk. Unnumbered prose yields a rule only when
    /// it carries an age or action cue.
    pub fn compile(&self, chunk: &Chunk) -> Option<Rule> {
        let text = chunk.text.as_str();
        let mut audit_notes = Vec::<String>::new();

        let rule_id = self.patterns.rule_id(text).map(|found| found.rule_id);
        let action_pattern = self.patterns.action_pattern(text);
        let action = self.patterns.action(text);

        let body = self.patterns.strip_source_year(text);
        let body = strip_leading_identifier(&body);
        let clause = self.clauses.isolate(body);

        let age_constraint = self
            .patterns
            .age(&non_bullet_text(body))
            .map(|found| AgeConstraint {
                min_age: found.min,
                max_age: found.max,
                source_text: found.text,
            });

        if rule_id.is_none() && !action.is_actionable() && age_constraint.is_none() {
            debug!(chunk_id = %chunk.chunk_id, "skipping prose chunk without cues");
            return None;
        }

        // Unnumbered prose is informational: it keeps its cues but no tree.
        let condition = match (&rule_id, &clause) {
            (Some(_), Some(found)) => self.clauses.build_tree(&self.terms, found.body),
            _ => None,
        };

        if rule_id.is_none() {
            audit_notes.push("rule_id not found".to_string());
        }
        if action_pattern.is_none() {
            audit_notes.push("action not found".to_string());
        }
        match &age_constraint {
            None => audit_notes.push("age not found".to_string()),
            Some(found) if !found.is_bounded() => {
                audit_notes.push(format!("age ambiguous: {}", found.source_text));
            }
            Some(_) => {}
        }
        match (&clause, &condition) {
            (None, _) => audit_notes.push("condition clause not found".to_string()),
            (Some(_), None) if rule_id.is_some() => {
                audit_notes.push("condition clause unparsed".to_string());
            }
            _ => {}
        }

        let action_text = match &clause {
            Some(found) => normalize_whitespace(&body[..found.lead_start]),
            None => first_sentence(body),
        };

        let quality = MetadataQuality::grade(
            rule_id.is_some(),
            action.is_actionable(),
            condition.is_some(),
        );

        debug!(
            chunk_id = %chunk.chunk_id,
            rule_id = rule_id.as_deref().unwrap_or("-"),
            action = action.as_str(),
            action_pattern = action_pattern.map(|pattern| pattern.name).unwrap_or("-"),
            quality = quality.as_str(),
            "compiled rule"
        );

        Some(Rule {
            rule_id,
            chunk_id: chunk.chunk_id.clone(),
            site_path: chunk.section_path.clone(),
            site: chunk.site.clone(),
            action,
            action_text,
            age_constraint,
            condition,
            verbatim_text: chunk.text.clone(),
            char_span: chunk.char_span,
            source_year: self.patterns.source_year(text),
            quality,
            audit_notes,
        })
    }

    pub fn compile_all(&self, chunks: &[Chunk]) -> Vec<Rule> {
        chunks.iter().filter_map(|chunk| self.compile(chunk)).collect()
    }

    /// Segments and compiles a whole document in one pass.
    pub fn compile_document(&self, segmenter: &Segmenter, document: &str) -> CompiledGuideline {
        let segmentation = segmenter.segment(document);
        let rules = self.compile_all(&segmentation.chunks);
        let content_hash = sha256_hex(document.as_bytes());

        let high = rules
            .iter()
            .filter(|rule| rule.quality == MetadataQuality::High)
            .count();
        info!(
            content_hash = %content_hash,
            chunks = segmentation.chunks.len(),
            rules = rules.len(),
            high_quality = high,
            "compiled guideline"
        );

        CompiledGuideline {
            content_hash,
            containers: segmentation.containers,
            chunks: segmentation.chunks,
            rules,
        }
    }
}

/// Drops the rule number (and any heading or emphasis markers around it)
/// from the start of a chunk.
fn strip_leading_identifier(text: &str) -> &str {
    let trimmed = text
        .trim_start()
        .trim_start_matches('#')
        .trim_start()
        .trim_start_matches("**");
    let digits_and_dots = trimmed
        .char_indices()
        .take_while(|(_, ch)| ch.is_ascii_digit() || *ch == '.')
        .last()
        .map(|(index, ch)| index + ch.len_utf8())
        .unwrap_or(0);

    if digits_and_dots == 0 || trimmed[..digits_and_dots].matches('.').count() < 2 {
        return text;
    }

    trimmed[digits_and_dots..]
        .trim_start_matches("**")
        .trim_start()
}

/// Text outside bullet lists. Age wording inside a bullet scopes only that
/// branch and stays in the condition tree.
fn non_bullet_text(text: &str) -> String {
    let mut in_bullet = false;
    let mut kept = Vec::<&str>::new();

    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("* ") || trimmed.starts_with("- ") || trimmed.starts_with('•') {
            in_bullet = true;
            continue;
        }
        if trimmed.is_empty() {
            in_bullet = false;
            continue;
        }
        if !in_bullet {
            kept.push(line);
        }
    }

    kept.join("\n")
}

fn first_sentence(text: &str) -> String {
    let line = text.lines().find(|line| !line.trim().is_empty()).unwrap_or("");
    let end = line.find(". ").map(|index| index + 1).unwrap_or(line.len());
    normalize_whitespace(&line[..end])
}
