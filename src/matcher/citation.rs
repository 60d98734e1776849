use serde::Serialize;

use crate::model::{CharSpan, MatchResult};
use crate::util::{normalize_whitespace, truncate_chars};

use super::RuleMatcher;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Citation {
    pub rule_id: Option<String>,
    pub section: String,
    pub excerpt: String,
    pub relevance: f64,
    pub char_span: CharSpan,
}

impl Citation {
    pub fn render(&self) -> String {
        let reference = self.rule_id.as_deref().unwrap_or("(unnumbered)");
        if self.section.is_empty() {
            return format!("NG12 {reference}");
        }
        format!("NG12 {reference}, {}", self.section)
    }
}

impl RuleMatcher {
    /// Top results rendered as source citations, in result order.
    pub fn citations(&self, results: &[MatchResult<'_>]) -> Vec<Citation> {
        results
            .iter()
            .take(self.config.max_citations)
            .map(|result| {
                let text = normalize_whitespace(&result.rule.verbatim_text);
                let excerpt = truncate_chars(&text, self.config.citation_excerpt_chars);
                let excerpt = if excerpt.len() < text.len() {
                    format!("{}...", excerpt.trim_end())
                } else {
                    excerpt.to_string()
                };

                Citation {
                    rule_id: result.rule.rule_id.clone(),
                    section: result.rule.site_path_text(),
                    excerpt,
                    relevance: result.confidence,
                    char_span: result.rule.char_span,
                }
            })
            .collect()
    }
}
