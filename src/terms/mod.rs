//! Age-band vocabulary, symptom synonyms and the fixed NG12 term definitions.

mod vocabulary;


use std::collections::HashMap;

use serde::Serialize;

use crate::error::{EngineError, Result};
use crate::model::Action;
use crate::util::contains_term;

pub use vocabulary::{
    HIGH_CONFIDENCE_THRESHOLD, MATCH_THRESHOLD, MatchConfidence, SymptomVocabulary,
    VocabularyMatch,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgeBand {
    pub term: &'static str,
    pub min: u32,
    pub max: u32,
}

const AGE_BANDS: &[AgeBand] = &[
    AgeBand {
        term: "children and young people",
        min: 0,
        max: 24,
    },
    AgeBand {
        term: "young people",
        min: 16,
        max: 24,
    },
    AgeBand {
        term: "young person",
        min: 16,
        max: 24,
    },
    AgeBand {
        term: "children",
        min: 0,
        max: 15,
    },
];

const AMBIGUOUS_AGE_TERMS: &[&str] = &[
    "elderly",
    "older",
    "middle-aged",
    "young adult",
    "adults",
    "adult",
    "seniors",
    "senior",
    "geriatric",
    "pediatric",
    "paediatric",
];

pub const QUALIFIERS: &[&str] = &[
    "unexplained",
    "persistent",
    "recurrent",
    "treatment-resistant",
    "visible",
];

/// Canonical symptom (or exposure) term followed by every synonym that folds
/// onto it. A synonym may belong to one canonical term only.
pub const SYMPTOM_SYNONYMS: &[(&str, &[&str])] = &[
    (
        "haemoptysis",
        &[
            "coughing up blood",
            "blood in sputum",
            "hemoptysis",
            "coughing blood",
            "bloody sputum",
            "blood when coughing",
        ],
    ),
    (
        "dysphagia",
        &[
            "difficulty swallowing",
            "trouble swallowing",
            "hard to swallow",
            "swallowing problems",
            "food stuck",
        ],
    ),
    (
        "dyspepsia",
        &[
            "indigestion",
            "acid reflux",
            "stomach upset",
            "gastric discomfort",
        ],
    ),
    (
        "haematuria",
        &[
            "blood in urine",
            "bloody urine",
            "hematuria",
            "visible blood in urine",
        ],
    ),
    (
        "haematemesis",
        &["vomiting blood", "blood in vomit", "hematemesis"],
    ),
    (
        "rectal bleeding",
        &[
            "blood in stool",
            "bloody stool",
            "blood when passing stool",
            "bleeding from bottom",
            "pr bleeding",
        ],
    ),
    (
        "post-menopausal bleeding",
        &[
            "pmb",
            "vaginal bleeding after menopause",
            "bleeding after menopause",
            "postmenopausal bleeding",
        ],
    ),
    (
        "lymphadenopathy",
        &[
            "swollen lymph nodes",
            "enlarged lymph nodes",
            "swollen glands",
            "lumps in neck",
        ],
    ),
    (
        "hepatomegaly",
        &["enlarged liver", "big liver", "liver enlargement"],
    ),
    (
        "splenomegaly",
        &["enlarged spleen", "big spleen", "spleen enlargement"],
    ),
    ("hepatosplenomegaly", &["enlarged liver and spleen"]),
    (
        "abdominal pain",
        &[
            "stomach ache",
            "belly pain",
            "tummy pain",
            "stomach pain",
            "abdominal discomfort",
        ],
    ),
    (
        "weight loss",
        &[
            "losing weight",
            "lost weight",
            "unintentional weight loss",
            "unexplained weight loss",
        ],
    ),
    (
        "fatigue",
        &[
            "tiredness",
            "exhaustion",
            "feeling tired",
            "low energy",
            "lethargy",
        ],
    ),
    (
        "shortness of breath",
        &[
            "breathlessness",
            "difficulty breathing",
            "dyspnea",
            "dyspnoea",
            "sob",
            "out of breath",
        ],
    ),
    (
        "hoarseness",
        &["hoarse voice", "voice changes", "croaky voice", "raspy voice"],
    ),
    ("night sweats", &["sweating at night", "nocturnal sweating"]),
    (
        "vulval bleeding",
        &[
            "vulva bleeding",
            "vulvar bleeding",
            "bleeding from vulva",
            "vuval bleeding",
            "vulval bleed",
            "vulva bleed",
        ],
    ),
    ("vaginal bleeding", &["vaginal bleed", "bleeding vaginally"]),
    ("vaginal discharge", &["discharge from vagina"]),
    (
        "ever smoked",
        &[
            "smoker",
            "current smoker",
            "ex-smoker",
            "former smoker",
            "smokes",
            "smoking history",
            "history of smoking",
        ],
    ),
    (
        "asbestos exposure",
        &["exposed to asbestos", "asbestos exposed", "worked with asbestos"],
    ),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgeTermReading {
    pub min: Option<u32>,
    pub max: Option<u32>,
    pub literal: String,
    pub matched_term: Option<&'static str>,
    pub needs_clarification: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Urgency {
    pub term: &'static str,
    pub definition: &'static str,
    pub timeframe_hours: Option<u32>,
}

const IMMEDIATE: Urgency = Urgency {
    term: "immediate",
    definition: "Within 24 hours",
    timeframe_hours: Some(24),
};

const VERY_URGENT: Urgency = Urgency {
    term: "very urgent",
    definition: "Within 48 hours",
    timeframe_hours: Some(48),
};

const URGENT: Urgency = Urgency {
    term: "urgent",
    definition: "Before 2 weeks",
    timeframe_hours: Some(336),
};

const SUSPECTED_CANCER_PATHWAY: Urgency = Urgency {
    term: "suspected cancer pathway referral",
    definition: "Referral for first appointment within 2 weeks",
    timeframe_hours: Some(336),
};

const NON_URGENT: Urgency = Urgency {
    term: "non-urgent",
    definition: "Routine referral, no specific timeframe",
    timeframe_hours: None,
};

pub fn urgency_for(action: Action) -> Option<Urgency> {
    match action {
        Action::ReferImmediate => Some(IMMEDIATE),
        Action::OfferVeryUrgent => Some(VERY_URGENT),
        Action::OfferUrgent | Action::ConsiderUrgent => Some(URGENT),
        Action::ReferSuspectedCancer | Action::Refer2ww => Some(SUSPECTED_CANCER_PATHWAY),
        Action::ConsiderNonUrgent => Some(NON_URGENT),
        Action::ConsiderReferral | Action::None => None,
    }
}

const PLAIN_DEFINITIONS: &[(&str, &str)] = &[
    ("persistent", "Symptoms lasting 3 weeks or more"),
    (
        "unexplained",
        "Not attributable to a non-cancer cause after initial assessment",
    ),
    (
        "direct access",
        "Investigation arranged in primary care without specialist referral",
    ),
    (
        "safety netting",
        "Advice to return if symptoms persist, change or worsen",
    ),
];

pub fn definition(term: &str) -> Option<&'static str> {
    let key = term.trim().to_lowercase();
    PLAIN_DEFINITIONS
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, text)| *text)
        .or_else(|| {
            [IMMEDIATE, VERY_URGENT, URGENT, SUSPECTED_CANCER_PATHWAY, NON_URGENT]
                .iter()
                .find(|urgency| urgency.term == key)
                .map(|urgency| urgency.definition)
        })
        .or_else(|| {
            AGE_BANDS
                .iter()
                .find(|band| band.term == key)
                .map(|band| match band.term {
                    "children" => "From birth to 15 years",
                    "children and young people" => "From birth to 24 years",
                    _ => "Aged 16 to 24 years",
                })
        })
}

/// Qualifier words present in `text`, in table order.
pub fn qualifiers_in(text: &str) -> Vec<&'static str> {
    let lowered = text.to_lowercase();
    QUALIFIERS
        .iter()
        .copied()
        .filter(|qualifier| contains_term(&lowered, qualifier))
        .collect()
}

/// Exact-lookup vocabulary normalizer. Built once and shared read-only.
#[derive(Debug, Clone)]
pub struct TermsNormalizer {
    symptom_lookup: HashMap<String, &'static str>,
    table: &'static [(&'static str, &'static [&'static str])],
}

impl TermsNormalizer {
    pub fn new() -> Result<Self> {
        Self::from_table(SYMPTOM_SYNONYMS)
    }

    pub fn from_table(table: &'static [(&'static str, &'static [&'static str])]) -> Result<Self> {
        let mut symptom_lookup = HashMap::<String, &'static str>::new();

        for &(canonical, synonyms) in table {
            for term in std::iter::once(canonical).chain(synonyms.iter().copied()) {
                let key = term.trim().to_lowercase();
                if let Some(existing) = symptom_lookup.insert(key.clone(), canonical) {
                    if existing != canonical {
                        return Err(EngineError::InvalidConfig(format!(
                            "synonym '{key}' maps to both '{existing}' and '{canonical}'"
                        )));
                    }
                }
            }
        }

        Ok(Self {
            symptom_lookup,
            table,
        })
    }

    /// Canonical term for `term`, or `term` itself when the table has no entry.
    pub fn normalize_symptom(&self, term: &str) -> String {
        match self.symptom_lookup.get(&term.trim().to_lowercase()) {
            Some(canonical) => (*canonical).to_string(),
            None => term.to_string(),
        }
    }

    /// Normalizes, drops blanks and removes duplicates, keeping first-seen order.
    pub fn normalize_symptoms<S: AsRef<str>>(&self, terms: &[S]) -> Vec<String> {
        let mut out = Vec::<String>::with_capacity(terms.len());
        for term in terms {
            let raw = term.as_ref();
            if raw.trim().is_empty() {
                continue;
            }
            let normalized = self.normalize_symptom(raw);
            if !out.contains(&normalized) {
                out.push(normalized);
            }
        }
        out
    }

    pub fn normalize_age_term(&self, text: &str) -> AgeTermReading {
        let lowered = text.trim().to_lowercase();

        let mut bands = AGE_BANDS.to_vec();
        bands.sort_by(|left, right| right.term.len().cmp(&left.term.len()));

        if let Some(band) = bands.iter().find(|band| contains_term(&lowered, band.term)) {
            return AgeTermReading {
                min: Some(band.min),
                max: Some(band.max),
                literal: text.to_string(),
                matched_term: Some(band.term),
                needs_clarification: false,
            };
        }

        let ambiguous = AMBIGUOUS_AGE_TERMS
            .iter()
            .copied()
            .find(|term| contains_term(&lowered, term));

        AgeTermReading {
            min: None,
            max: None,
            literal: text.to_string(),
            matched_term: ambiguous,
            needs_clarification: ambiguous.is_some(),
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = (&'static str, &'static [&'static str])> + '_ {
        self.table.iter().copied()
    }
}
