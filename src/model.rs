use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Byte offsets into the source document, `start..end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CharSpan {
    pub start: usize,
    pub end: usize,
}

impl CharSpan {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    #[serde(rename = "refer_2ww")]
    Refer2ww,
    ReferSuspectedCancer,
    OfferUrgent,
    ConsiderUrgent,
    OfferVeryUrgent,
    ReferImmediate,
    ConsiderNonUrgent,
    ConsiderReferral,
    None,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Refer2ww => "refer_2ww",
            Self::ReferSuspectedCancer => "refer_suspected_cancer",
            Self::OfferUrgent => "offer_urgent",
            Self::ConsiderUrgent => "consider_urgent",
            Self::OfferVeryUrgent => "offer_very_urgent",
            Self::ReferImmediate => "refer_immediate",
            Self::ConsiderNonUrgent => "consider_non_urgent",
            Self::ConsiderReferral => "consider_referral",
            Self::None => "none",
        }
    }

    pub fn is_actionable(self) -> bool {
        self != Self::None
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeConstraint {
    pub min_age: Option<u32>,
    pub max_age: Option<u32>,
    pub source_text: String,
}

impl AgeConstraint {
    pub fn is_bounded(&self) -> bool {
        self.min_age.is_some() || self.max_age.is_some()
    }

    pub fn admits(&self, age: u32) -> bool {
        self.min_age.is_none_or(|min| age >= min) && self.max_age.is_none_or(|max| age <= max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKind {
    Symptom,
    Finding,
    History,
    Age,
}

impl ConditionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Symptom => "symptom",
            Self::Finding => "finding",
            Self::History => "history",
            Self::Age => "age",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtomicCondition {
    pub kind: ConditionKind,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qualifier: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicOp {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountCondition {
    pub threshold: u32,
    pub options: Vec<AtomicCondition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    Atomic(AtomicCondition),
    Composite { op: LogicOp, children: Vec<Condition> },
    Count(CountCondition),
}

impl Condition {
    /// Every atomic leaf, in tree order.
    pub fn atoms(&self) -> Vec<&AtomicCondition> {
        let mut out = Vec::new();
        self.collect_atoms(&mut out);
        out
    }

    fn collect_atoms<'a>(&'a self, out: &mut Vec<&'a AtomicCondition>) {
        match self {
            Self::Atomic(atom) => out.push(atom),
            Self::Composite { children, .. } => {
                for child in children {
                    child.collect_atoms(out);
                }
            }
            Self::Count(count) => out.extend(count.options.iter()),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Atomic(atom) => atom.value.clone(),
            Self::Composite { op, children } => {
                let joiner = match op {
                    LogicOp::And => " AND ",
                    LogicOp::Or => " OR ",
                };
                let parts = children
                    .iter()
                    .map(Condition::describe)
                    .collect::<Vec<String>>();
                format!("({})", parts.join(joiner))
            }
            Self::Count(count) => {
                let options = count
                    .options
                    .iter()
                    .map(|atom| atom.value.as_str())
                    .collect::<Vec<&str>>();
                format!("{}+ of [{}]", count.threshold, options.join(", "))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MetadataQuality {
    High,
    Medium,
    Low,
}

impl MetadataQuality {
    /// HIGH needs id + action + condition, MEDIUM needs an action without a
    /// resolvable condition, everything else is LOW.
    pub fn grade(has_rule_id: bool, has_action: bool, has_condition: bool) -> Self {
        match (has_rule_id, has_action, has_condition) {
            (true, true, true) => Self::High,
            (_, true, false) => Self::Medium,
            _ => Self::Low,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub rule_id: Option<String>,
    pub chunk_id: String,
    pub site_path: Vec<String>,
    pub site: Option<String>,
    pub action: Action,
    pub action_text: String,
    pub age_constraint: Option<AgeConstraint>,
    pub condition: Option<Condition>,
    pub verbatim_text: String,
    pub char_span: CharSpan,
    pub source_year: Option<String>,
    pub quality: MetadataQuality,
    #[serde(default)]
    pub audit_notes: Vec<String>,
}

impl Rule {
    pub fn label(&self) -> &str {
        self.rule_id.as_deref().unwrap_or("(unnumbered)")
    }

    pub fn site_path_text(&self) -> String {
        self.site_path.join(" > ")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionContainer {
    pub container_id: String,
    pub title: String,
    pub site: Option<String>,
    pub char_span: CharSpan,
    pub chunk_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalMetadata {
    pub rule_id: Option<String>,
    pub age_min: Option<u32>,
    pub age_max: Option<u32>,
    pub age_text: Option<String>,
    pub symptom_tags: Vec<String>,
    pub action_type: Option<Action>,
    pub quality: Option<MetadataQuality>,
    #[serde(default)]
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub text: String,
    pub section_path: Vec<String>,
    pub parent_container_id: String,
    pub site: Option<String>,
    pub char_span: CharSpan,
    pub local_metadata: LocalMetadata,
}

/// Structured patient facts supplied by an external extractor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Facts {
    pub age: Option<u32>,
    pub age_term: Option<String>,
    pub gender: Option<String>,
    pub symptoms: Vec<String>,
    pub findings: Vec<String>,
    pub history: Vec<String>,
}

impl Facts {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|err| EngineError::InvalidFactsShape(err.to_string()))
    }

    pub fn from_json_value(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|err| EngineError::InvalidFactsShape(err.to_string()))
    }

    pub fn has_clinical_content(&self) -> bool {
        [&self.symptoms, &self.findings, &self.history]
            .iter()
            .any(|list| list.iter().any(|entry| !entry.trim().is_empty()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Full,
    Partial,
    AgeOnly,
    SymptomOnly,
    NoMatch,
}

impl MatchType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Partial => "partial",
            Self::AgeOnly => "age_only",
            Self::SymptomOnly => "symptom_only",
            Self::NoMatch => "no_match",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult<'a> {
    pub rule: &'a Rule,
    pub match_type: MatchType,
    pub matched: Vec<String>,
    pub unmatched: Vec<String>,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub chunk_id: String,
    pub lexical_score: f64,
    pub semantic_score: f64,
    pub fused_score: f64,
}
