//! Deterministic evaluation of patient facts against compiled rules.

mod citation;
mod clarify;
mod evaluate;
mod symptom;

#[cfg(test)]
mod tests;

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, info};

use crate::config::{CandidatePolicy, EmptyCandidates, MatcherConfig};
use crate::error::Result;
use crate::model::{ConditionKind, Facts, MatchResult, MatchType, Rule};
use crate::patterns::GuidelinePatterns;
use crate::terms::TermsNormalizer;
use crate::util::contains_term;

use evaluate::{Evaluator, Evidence, FactView, classify, normalize_phrase};
use symptom::meaningful_words;

pub use citation::Citation;
pub use clarify::{Clarification, ClarificationNeed};

const CHILDREN_PHRASES: &[&str] = &["children and young people", "children or young people"];

/// Immutable rule set with lookup indexes. Shared read-only between queries.
#[derive(Debug)]
pub struct RuleMatcher {
    rules: Vec<Rule>,
    terms: TermsNormalizer,
    patterns: GuidelinePatterns,
    config: MatcherConfig,
    keyword_index: HashMap<String, BTreeSet<usize>>,
    id_index: HashMap<String, usize>,
}

impl RuleMatcher {
    pub fn new(rules: Vec<Rule>, terms: TermsNormalizer, config: MatcherConfig) -> Result<Self> {
        let mut keyword_index = HashMap::<String, BTreeSet<usize>>::new();
        let mut id_index = HashMap::<String, usize>::new();

        for (position, rule) in rules.iter().enumerate() {
            if let Some(rule_id) = &rule.rule_id {
                id_index.entry(rule_id.clone()).or_insert(position);
            }
            let Some(condition) = &rule.condition else {
                continue;
            };
            for atom in condition.atoms() {
                if atom.kind == ConditionKind::Age {
                    continue;
                }
                let value =
                    normalize_phrase(&terms.normalize_symptom(&normalize_phrase(&atom.value)));
                for word in meaningful_words(&value) {
                    keyword_index
                        .entry(word.to_string())
                        .or_default()
                        .insert(position);
                }
            }
        }

        info!(
            rules = rules.len(),
            keywords = keyword_index.len(),
            "rule matcher ready"
        );

        Ok(Self {
            rules,
            terms,
            patterns: GuidelinePatterns::new()?,
            config,
            keyword_index,
            id_index,
        })
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    pub fn terms(&self) -> &TermsNormalizer {
        &self.terms
    }

    /// Every candidate rule with confidence above zero, best first. Ties keep
    /// rule order, so the output is a total order.
    pub fn match_facts(&self, facts: &Facts) -> Vec<MatchResult<'_>> {
        let view = FactView::new(&self.terms, facts);
        let candidates = self.candidates(&view);

        let mut results = candidates
            .iter()
            .map(|position| self.evaluate_view(&self.rules[*position], &view))
            .filter(|result| result.confidence > 0.0)
            .collect::<Vec<MatchResult<'_>>>();

        results.sort_by(|left, right| {
            let left_full = left.match_type == MatchType::Full;
            let right_full = right.match_type == MatchType::Full;
            right
                .confidence
                .total_cmp(&left.confidence)
                .then(right_full.cmp(&left_full))
        });

        info!(
            candidates = candidates.len(),
            matches = results.len(),
            full_matches = results
                .iter()
                .filter(|result| result.match_type == MatchType::Full)
                .count(),
            "matching complete"
        );
        results
    }

    /// Single-rule evaluation, including `no_match` outcomes.
    pub fn evaluate<'a>(&self, rule: &'a Rule, facts: &Facts) -> MatchResult<'a> {
        let view = FactView::new(&self.terms, facts);
        self.evaluate_view(rule, &view)
    }

    /// Incomplete matches above the configured confidence floor, i.e. rules
    /// that more information could complete.
    pub fn near_matches(&self, facts: &Facts) -> Vec<MatchResult<'_>> {
        self.match_facts(facts)
            .into_iter()
            .filter(|result| {
                !matches!(result.match_type, MatchType::Full | MatchType::NoMatch)
                    && result.confidence > self.config.near_match_min_confidence
            })
            .take(self.config.max_near_matches)
            .collect()
    }

    /// Rules with a symptom atom naming `term` (after synonym folding).
    pub fn rules_by_symptom(&self, term: &str) -> Vec<&Rule> {
        let wanted = normalize_phrase(&self.terms.normalize_symptom(term));
        if wanted.is_empty() {
            return Vec::new();
        }

        self.rules
            .iter()
            .filter(|rule| {
                rule.condition.as_ref().is_some_and(|condition| {
                    condition.atoms().iter().any(|atom| {
                        atom.kind == ConditionKind::Symptom && {
                            let value = normalize_phrase(
                                &self.terms.normalize_symptom(&normalize_phrase(&atom.value)),
                            );
                            value == wanted || contains_term(&value, &wanted)
                        }
                    })
                })
            })
            .collect()
    }

    pub fn rules_by_site(&self, site: &str) -> Vec<&Rule> {
        let wanted = site.trim().to_lowercase();
        self.rules
            .iter()
            .filter(|rule| rule.site.as_deref() == Some(wanted.as_str()))
            .collect()
    }

    pub fn rule(&self, rule_id: &str) -> Option<&Rule> {
        self.id_index
            .get(rule_id.trim())
            .map(|position| &self.rules[*position])
    }

    fn candidates(&self, view: &FactView) -> Vec<usize> {
        let CandidatePolicy::Indexed { on_empty } = self.config.candidates else {
            return (0..self.rules.len()).collect();
        };

        let mut found = BTreeSet::<usize>::new();
        for entry in view.entries() {
            for word in meaningful_words(entry) {
                if let Some(positions) = self.keyword_index.get(word) {
                    found.extend(positions);
                }
            }
        }

        if found.is_empty() {
            debug!(on_empty = ?on_empty, "no indexed candidates");
            return match on_empty {
                EmptyCandidates::NoCandidates => Vec::new(),
                EmptyCandidates::AllRules => (0..self.rules.len()).collect(),
            };
        }
        found.into_iter().collect()
    }

    fn evaluate_view<'a>(&self, rule: &'a Rule, view: &FactView) -> MatchResult<'a> {
        if let Some(reason) = self.population_mismatch(rule, view.age) {
            debug!(rule = rule.label(), reason = %reason, "population gate rejected rule");
            return MatchResult {
                rule,
                match_type: MatchType::NoMatch,
                matched: Vec::new(),
                unmatched: vec![reason],
                confidence: 0.0,
            };
        }

        let evaluator = Evaluator {
            terms: &self.terms,
            patterns: &self.patterns,
            facts: view,
        };
        let mut evidence = Evidence::default();
        let age_ok = evaluator.check_age(rule.age_constraint.as_ref(), &mut evidence);
        let condition_ok = rule
            .condition
            .as_ref()
            .map(|condition| evaluator.check(condition, &mut evidence));

        let confidence = evidence.confidence();
        let match_type = classify(&evidence, age_ok, condition_ok);
        debug!(
            rule = rule.label(),
            match_type = match_type.as_str(),
            confidence,
            "evaluated rule"
        );

        MatchResult {
            rule,
            match_type,
            matched: evidence.matched,
            unmatched: evidence.unmatched,
            confidence,
        }
    }

    /// Rules scoped to children and young people, or to adults only, never
    /// apply outside that population.
    fn population_mismatch(&self, rule: &Rule, age: Option<u32>) -> Option<String> {
        let age = age?;
        let scope = rule.site_path_text().to_lowercase();
        let for_children = CHILDREN_PHRASES.iter().any(|phrase| scope.contains(phrase));

        if for_children && age > self.config.children_age_ceiling {
            return Some(format!(
                "Rule applies to children/young people (age <= {}), patient is {age}",
                self.config.children_age_ceiling
            ));
        }
        if !for_children
            && contains_term(&scope, "adults")
            && !scope.contains("children")
            && age < self.config.adult_age_floor
        {
            return Some(format!(
                "Rule applies to adults (age >= {}), patient is {age}",
                self.config.adult_age_floor
            ));
        }
        None
    }
}
