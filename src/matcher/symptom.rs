//! Site-aware phrase comparison between a patient fact and a rule atom.
//!
//! A fact naming an anatomical site ("vulval bleeding") may only satisfy a
//! rule phrase naming the same site. It never satisfies a differently-sited
//! phrase or a purely generic one ("unexplained bleeding").

use std::collections::BTreeSet;

use crate::util::contains_term;

const ANATOMICAL_SITES: &[&str] = &[
    "vulval",
    "vulva",
    "vaginal",
    "vagina",
    "breast",
    "rectal",
    "rectum",
    "abdominal",
    "abdomen",
    "chest",
    "lung",
    "throat",
    "oral",
    "mouth",
    "skin",
    "bone",
    "liver",
    "hepatic",
    "kidney",
    "bladder",
    "prostate",
    "testicular",
    "thyroid",
    "brain",
    "head",
    "neck",
    "axillary",
    "groin",
    "scrotal",
    "pleural",
    "peritoneal",
    "lymph",
];

/// Organ stems that appear inside longer clinical words
/// ("hepatomegaly", "splenomegaly").
const SITE_STEMS: &[&str] = &["hepat", "spleno"];

/// Words that never make a phrase more specific.
const NON_MEANINGFUL: &[&str] = &[
    "unexplained",
    "persistent",
    "recurrent",
    "new",
    "or",
    "and",
    "with",
];

fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|ch: char| ch.is_whitespace() || matches!(ch, ',' | '.' | ';' | ':' | '(' | ')'))
        .filter(|word| !word.is_empty())
}

pub(super) fn meaningful_words(text: &str) -> BTreeSet<&str> {
    words(text)
        .filter(|word| !NON_MEANINGFUL.contains(word))
        .collect()
}

pub(super) fn anatomical_sites(text: &str) -> BTreeSet<&str> {
    words(text)
        .filter_map(|word| {
            if let Some(site) = ANATOMICAL_SITES.iter().find(|site| **site == word) {
                return Some(*site);
            }
            SITE_STEMS
                .iter()
                .find(|stem| word.starts_with(**stem))
                .copied()
        })
        .collect()
}

/// `fact` and `condition` are both lowercased and normalized.
pub(super) fn symptom_matches(fact: &str, condition: &str) -> bool {
    if fact == condition {
        return true;
    }

    let fact_sites = anatomical_sites(fact);
    let condition_sites = anatomical_sites(condition);

    if contains_term(condition, fact) || contains_term(fact, condition) {
        return match (fact_sites.is_empty(), condition_sites.is_empty()) {
            (false, false) => !fact_sites.is_disjoint(&condition_sites),
            // A bare "bleeding" condition is too generic for a sited fact.
            (false, true) => meaningful_words(condition).len() > 1,
            _ => true,
        };
    }

    let fact_words = meaningful_words(fact);
    let condition_words = meaningful_words(condition);
    if fact_words.intersection(&condition_words).count() < 2 {
        return false;
    }

    match (fact_sites.is_empty(), condition_sites.is_empty()) {
        (false, false) => !fact_sites.is_disjoint(&condition_sites),
        (false, true) => false,
        _ => true,
    }
}

/// Findings and history are compared by whole-phrase containment either way.
pub(super) fn phrase_matches(fact: &str, condition: &str) -> bool {
    fact == condition || contains_term(condition, fact) || contains_term(fact, condition)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::{anatomical_sites, meaningful_words, phrase_matches, symptom_matches};

    #[test]
    fn sited_fact_does_not_satisfy_generic_condition() {
        assert!(!symptom_matches("vulval bleeding", "unexplained bleeding"));
        assert!(!symptom_matches("rectal bleeding", "bleeding"));
    }

    #[test]
    fn sited_fact_satisfies_same_site_list() {
        assert!(symptom_matches(
            "vulval bleeding",
            "unexplained vulval lump, ulceration or bleeding"
        ));
    }

    #[test]
    fn different_sites_never_match() {
        assert!(!symptom_matches(
            "rectal bleeding",
            "unexplained vulval lump, ulceration or bleeding"
        ));
        assert!(!symptom_matches("breast pain", "chest pain"));
    }

    #[test]
    fn unsited_terms_match_by_containment() {
        assert!(symptom_matches("haemoptysis", "unexplained haemoptysis"));
        assert!(symptom_matches("weight loss", "unexplained abdominal pain or weight loss"));
        assert!(symptom_matches("cough", "cough"));
        assert!(!symptom_matches("cough", "coughing"));
    }

    #[test]
    fn site_stems_are_recognized() {
        let sites = anatomical_sites("hepatomegaly or splenomegaly");
        assert!(sites.contains("hepat"));
        assert!(sites.contains("spleno"));
        assert_eq!(
            meaningful_words("unexplained, persistent bleeding"),
            BTreeSet::from(["bleeding"])
        );
    }

    #[test]
    fn findings_compare_by_containment() {
        assert!(phrase_matches(
            "chest x-ray findings that suggest lung cancer",
            "chest x-ray findings that suggest lung cancer"
        ));
        assert!(phrase_matches("asbestos", "asbestos exposure"));
        assert!(!phrase_matches("anaemia", "raised platelet count"));
    }
}
