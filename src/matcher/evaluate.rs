use crate::model::{
    AgeConstraint, AtomicCondition, Condition, ConditionKind, CountCondition, Facts, LogicOp,
    MatchType,
};
use crate::patterns::GuidelinePatterns;
use crate::terms::TermsNormalizer;

use super::symptom::{phrase_matches, symptom_matches};

/// Matched and unmatched evidence lines collected while walking one rule.
#[derive(Debug, Default)]
pub(super) struct Evidence {
    pub(super) matched: Vec<String>,
    pub(super) unmatched: Vec<String>,
}

impl Evidence {
    pub(super) fn confidence(&self) -> f64 {
        let total = self.matched.len() + self.unmatched.len();
        if total == 0 {
            return 0.0;
        }
        self.matched.len() as f64 / total as f64
    }
}

/// Patient facts lowercased and folded onto canonical terms once per query.
#[derive(Debug)]
pub(super) struct FactView {
    pub(super) age: Option<u32>,
    pub(super) symptoms: Vec<String>,
    pub(super) findings: Vec<String>,
    pub(super) history: Vec<String>,
}

impl FactView {
    pub(super) fn new(terms: &TermsNormalizer, facts: &Facts) -> Self {
        let fold = |entries: &[String]| {
            terms
                .normalize_symptoms(entries)
                .into_iter()
                .map(|entry| normalize_phrase(&entry))
                .filter(|entry| !entry.is_empty())
                .collect::<Vec<String>>()
        };

        Self {
            age: facts.age,
            symptoms: fold(facts.symptoms.as_slice()),
            findings: fold(facts.findings.as_slice()),
            history: fold(facts.history.as_slice()),
        }
    }

    pub(super) fn entries(&self) -> impl Iterator<Item = &str> {
        self.symptoms
            .iter()
            .chain(&self.findings)
            .chain(&self.history)
            .map(String::as_str)
    }
}

pub(super) fn normalize_phrase(text: &str) -> String {
    text.trim().trim_end_matches('.').trim().to_lowercase()
}

pub(super) struct Evaluator<'a> {
    pub(super) terms: &'a TermsNormalizer,
    pub(super) patterns: &'a GuidelinePatterns,
    pub(super) facts: &'a FactView,
}

impl Evaluator<'_> {
    /// Rule-level age constraint. `None` when the constraint says nothing
    /// about this patient (absent, or unbounded wording with a known age).
    pub(super) fn check_age(
        &self,
        constraint: Option<&AgeConstraint>,
        evidence: &mut Evidence,
    ) -> Option<bool> {
        let constraint = constraint?;
        let Some(age) = self.facts.age else {
            evidence
                .unmatched
                .push(format!("Age required: {}", constraint.source_text));
            return Some(false);
        };

        if !constraint.is_bounded() {
            return None;
        }
        if let Some(min) = constraint.min_age.filter(|min| age < *min) {
            evidence.unmatched.push(format!("Age {age} < {min}"));
            return Some(false);
        }
        if let Some(max) = constraint.max_age.filter(|max| age > *max) {
            evidence.unmatched.push(format!("Age {age} > {max}"));
            return Some(false);
        }

        evidence
            .matched
            .push(format!("Age {age} meets '{}'", constraint.source_text));
        Some(true)
    }

    pub(super) fn check(&self, condition: &Condition, evidence: &mut Evidence) -> bool {
        match condition {
            Condition::Atomic(atom) => self.check_atom(atom, evidence),
            Condition::Composite {
                op: LogicOp::And,
                children,
            } => {
                // Every child is walked so each contributes evidence.
                let mut all = true;
                for child in children {
                    all &= self.check(child, evidence);
                }
                all
            }
            Condition::Composite {
                op: LogicOp::Or,
                children,
            } => {
                for child in children {
                    let mut scratch = Evidence::default();
                    if self.check(child, &mut scratch) {
                        evidence.matched.extend(scratch.matched);
                        return true;
                    }
                }
                if let Some(first) = children.first() {
                    evidence.unmatched.push(format!(
                        "None of OR conditions met (e.g., {})",
                        first.describe()
                    ));
                }
                false
            }
            Condition::Count(count) => self.check_count(count, evidence),
        }
    }

    fn check_count(&self, count: &CountCondition, evidence: &mut Evidence) -> bool {
        let satisfied = count
            .options
            .iter()
            .filter(|option| self.check_atom(option, &mut Evidence::default()))
            .map(|option| option.value.as_str())
            .collect::<Vec<&str>>();
        let met = satisfied.len();
        let threshold = count.threshold as usize;

        if met >= threshold {
            evidence.matched.push(format!(
                "Count {met}/{threshold} met: {}",
                satisfied.join(", ")
            ));
            return true;
        }

        let examples = count
            .options
            .iter()
            .take(3)
            .map(|option| option.value.as_str())
            .collect::<Vec<&str>>();
        evidence.unmatched.push(format!(
            "Count {met}/{threshold} not met (need {threshold} of: {}...)",
            examples.join(", ")
        ));
        false
    }

    fn check_atom(&self, atom: &AtomicCondition, evidence: &mut Evidence) -> bool {
        if atom.kind == ConditionKind::Age {
            return self.check_age_atom(atom, evidence);
        }

        let value = normalize_phrase(&self.terms.normalize_symptom(&normalize_phrase(&atom.value)));
        let (facts, label) = match atom.kind {
            ConditionKind::Symptom => (&self.facts.symptoms, "Symptom"),
            ConditionKind::Finding => (&self.facts.findings, "Finding"),
            _ => (&self.facts.history, "History"),
        };

        let hit = facts.iter().find(|fact| match atom.kind {
            ConditionKind::Symptom => symptom_matches(fact, &value),
            _ => phrase_matches(fact, &value),
        });

        match hit {
            Some(fact) if atom.kind == ConditionKind::Symptom => {
                evidence
                    .matched
                    .push(format!("{label}: {fact} (matches '{}')", atom.value));
                true
            }
            Some(_) => {
                evidence.matched.push(format!("{label}: {}", atom.value));
                true
            }
            None => {
                evidence.unmatched.push(format!("{label}: {}", atom.value));
                false
            }
        }
    }

    /// Age wording inside the tree, read through the same phrase table as
    /// rule-level constraints. Both bounds are inclusive.
    fn check_age_atom(&self, atom: &AtomicCondition, evidence: &mut Evidence) -> bool {
        let Some(age) = self.facts.age else {
            evidence
                .unmatched
                .push(format!("Age required: {}", atom.value));
            return false;
        };
        let Some(constraint) = self.atom_constraint(&atom.value) else {
            return true;
        };

        if !constraint.admits(age) {
            let reason = match (constraint.min_age, constraint.max_age) {
                (Some(min), _) if age < min => format!("Age {age} < {min}"),
                (_, Some(max)) => format!("Age {age} > {max}"),
                _ => format!("Age {age} outside '{}'", atom.value),
            };
            evidence.unmatched.push(reason);
            return false;
        }

        evidence.matched.push(match (constraint.min_age, constraint.max_age) {
            (Some(min), Some(max)) => format!("Age {age} within {min}-{max}"),
            (Some(min), None) => format!("Age {age} >= {min}"),
            (None, Some(max)) => format!("Age {age} <= {max}"),
            (None, None) => format!("Age {age} meets '{}'", atom.value),
        });
        true
    }

    /// Bounded reading of an age atom. Bare "aged 40" has no table entry and
    /// reads as a lower bound.
    fn atom_constraint(&self, value: &str) -> Option<AgeConstraint> {
        let (min_age, max_age) = match self.patterns.age(value) {
            Some(found) if found.is_bounded() => (found.min, found.max),
            Some(_) => return None,
            None => (Some(first_number(value)?), None),
        };
        Some(AgeConstraint {
            min_age,
            max_age,
            source_text: value.to_string(),
        })
    }
}

fn first_number(text: &str) -> Option<u32> {
    let digits = text
        .chars()
        .skip_while(|ch| !ch.is_ascii_digit())
        .take_while(char::is_ascii_digit)
        .collect::<String>();
    digits.parse().ok()
}

/// `full` needs evidence and nothing unmatched; otherwise the age and tree
/// outcomes decide between the partial kinds.
pub(super) fn classify(
    evidence: &Evidence,
    age_ok: Option<bool>,
    condition_ok: Option<bool>,
) -> MatchType {
    if evidence.matched.is_empty() {
        return MatchType::NoMatch;
    }
    if evidence.unmatched.is_empty() {
        return MatchType::Full;
    }
    match (age_ok, condition_ok) {
        (Some(true), Some(false)) => MatchType::AgeOnly,
        (Some(false), Some(true)) => MatchType::SymptomOnly,
        _ => MatchType::Partial,
    }
}

#[cfg(test)]
mod tests {
    use super::{Evidence, classify, first_number};
    use crate::model::MatchType;

    #[test]
    fn first_number_reads_leading_digits() {
        assert_eq!(first_number("aged 40 and over"), Some(40));
        assert_eq!(first_number("under 16"), Some(16));
        assert_eq!(first_number("adults"), None);
    }

    #[test]
    fn classification_follows_evidence() {
        let mut evidence = Evidence::default();
        assert_eq!(classify(&evidence, None, None), MatchType::NoMatch);

        evidence.matched.push("Age 45 meets 'aged 40 and over'".to_string());
        assert_eq!(classify(&evidence, Some(true), None), MatchType::Full);

        evidence.unmatched.push("Symptom: cough".to_string());
        assert_eq!(classify(&evidence, Some(true), Some(false)), MatchType::AgeOnly);
        assert_eq!(
            classify(&evidence, Some(false), Some(true)),
            MatchType::SymptomOnly
        );
        assert_eq!(classify(&evidence, None, Some(false)), MatchType::Partial);
        assert_eq!(evidence.confidence(), 0.5);
    }
}
