use serde::Serialize;

use crate::model::{ConditionKind, Facts, MatchResult, Rule};

use super::RuleMatcher;

/// Information the host could ask for before trusting a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "need", rename_all = "snake_case")]
pub enum ClarificationNeed {
    /// No age given while candidate rules depend on one.
    Age { rule_ids: Vec<String> },
    /// Neither symptoms nor findings were supplied.
    Symptoms,
    /// The supplied age wording maps to no fixed band ("elderly").
    AgeTerm { term: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Clarification {
    pub needs: Vec<ClarificationNeed>,
}

impl Clarification {
    pub fn is_needed(&self) -> bool {
        !self.needs.is_empty()
    }
}

fn depends_on_age(rule: &Rule) -> bool {
    rule.age_constraint
        .as_ref()
        .is_some_and(|constraint| constraint.is_bounded())
        || rule.condition.as_ref().is_some_and(|condition| {
            condition
                .atoms()
                .iter()
                .any(|atom| atom.kind == ConditionKind::Age)
        })
}

impl RuleMatcher {
    pub fn clarify(&self, facts: &Facts, results: &[MatchResult<'_>]) -> Clarification {
        let mut needs = Vec::<ClarificationNeed>::new();

        if facts.age.is_none() {
            let rule_ids = results
                .iter()
                .filter(|result| depends_on_age(result.rule))
                .map(|result| result.rule.label().to_string())
                .collect::<Vec<String>>();
            if !rule_ids.is_empty() {
                needs.push(ClarificationNeed::Age { rule_ids });
            }

            if let Some(term) = facts.age_term.as_deref() {
                let reading = self.terms.normalize_age_term(term);
                if reading.needs_clarification {
                    needs.push(ClarificationNeed::AgeTerm {
                        term: term.to_string(),
                    });
                }
            }
        }

        let has_presenting = [&facts.symptoms, &facts.findings]
            .iter()
            .any(|list| list.iter().any(|entry| !entry.trim().is_empty()));
        if !has_presenting {
            needs.push(ClarificationNeed::Symptoms);
        }

        Clarification { needs }
    }
}
