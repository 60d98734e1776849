//! Fail-closed scope check run before matching.
//!
//! The engine supports recognition and referral only. Queries asking for a
//! diagnosis, a prognosis or treatment advice are flagged so the host can
//! decline them; the gate never produces prose.

use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeCategory {
    InScope,
    Diagnosis,
    Prognosis,
    Treatment,
}

impl ScopeCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InScope => "in_scope",
            Self::Diagnosis => "diagnosis",
            Self::Prognosis => "prognosis",
            Self::Treatment => "treatment",
        }
    }

    pub fn is_blocked(self) -> bool {
        self != Self::InScope
    }
}

const DIAGNOSIS_PHRASES: &[&str] = &[
    "does patient have cancer",
    "does this patient have cancer",
    "is it cancer",
    "diagnose",
    "confirm cancer",
    "rule out cancer",
    "do they have cancer",
    "cancer diagnosis",
];

const PROGNOSIS_PHRASES: &[&str] = &[
    "going to be okay",
    "will they survive",
    "survival rate",
    "how long",
    "prognosis",
    "life expectancy",
    "will they die",
];

const TREATMENT_PHRASES: &[&str] = &[
    "prescribe",
    "treatment",
    "what medication",
    "chemotherapy",
    "radiotherapy",
    "surgery",
    "how to treat",
];

/// Checked in this order; the first category with a hit wins.
const BLOCKED: &[(ScopeCategory, &[&str])] = &[
    (ScopeCategory::Diagnosis, DIAGNOSIS_PHRASES),
    (ScopeCategory::Prognosis, PROGNOSIS_PHRASES),
    (ScopeCategory::Treatment, TREATMENT_PHRASES),
];

#[derive(Debug, Clone, Copy, Default)]
pub struct ScopeGate;

impl ScopeGate {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, query: &str) -> ScopeCategory {
        let lowered = query.to_lowercase();
        let hit = BLOCKED.iter().find_map(|(category, phrases)| {
            phrases
                .iter()
                .find(|phrase| lowered.contains(*phrase))
                .map(|phrase| (*category, *phrase))
        });

        match hit {
            Some((category, phrase)) => {
                info!(category = category.as_str(), phrase, "query outside referral scope");
                category
            }
            None => ScopeCategory::InScope,
        }
    }
}
