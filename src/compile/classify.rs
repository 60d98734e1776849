use crate::model::{AtomicCondition, ConditionKind};
use crate::terms::{TermsNormalizer, qualifiers_in};
use crate::util::{contains_term, normalize_whitespace};

const AGE_INDICATORS: &[&str] = &[
    "aged",
    "age",
    "years old",
    "year old",
    "and over",
    "or over",
    "and above",
    "or older",
    "under",
    "below",
];

const HISTORY_INDICATORS: &[&str] = &[
    "ever smoked",
    "smoking",
    "smoker",
    "smoked",
    "asbestos",
    "exposure",
    "exposed",
    "history of",
    "previous",
    "family history",
];

const FINDING_INDICATORS: &[&str] = &[
    "x-ray",
    "xray",
    "scan",
    "ultrasound",
    "ct",
    "mri",
    "findings",
    "test",
    "result",
    "blood",
    "fit result",
    "ca125",
    "serum",
    "haemoglobin",
    "platelet",
    "platelets",
    "thrombocytosis",
];

/// Canonical terms whose kind is fixed regardless of wording.
const HISTORY_CANONICALS: &[&str] = &["ever smoked", "asbestos exposure"];

const LEADING_FILLERS: &[&str] = &[
    "have", "has", "had", "are", "is", "who", "they", "and", "or", "with", "been", "a", "an",
    "the", "also",
];

const TRAILING_FILLERS: &[&str] = &["or", "and", "with", "have", "who", "has"];

/// Lowercases a leaf, collapses whitespace and strips connective words and
/// punctuation left over from clause splitting.
pub fn clean_leaf(text: &str) -> String {
    let punctuation: &[char] = &[',', ';', ':', '.', '*', '•', ' ', '\u{2011}'];
    let mut words = normalize_whitespace(&text.replace('\u{2011}', "-").to_lowercase())
        .trim_matches(punctuation)
        .split(' ')
        .filter(|word| !word.is_empty())
        .map(str::to_string)
        .collect::<Vec<String>>();

    while words
        .first()
        .is_some_and(|word| LEADING_FILLERS.contains(&word.as_str()))
    {
        words.remove(0);
    }
    while words
        .last()
        .is_some_and(|word| TRAILING_FILLERS.contains(&word.as_str()))
    {
        words.pop();
    }

    words.join(" ").trim_matches(punctuation).to_string()
}

/// Age wording first, then history, then findings; anything else is a
/// symptom.
pub fn classify_kind(terms: &TermsNormalizer, value: &str) -> ConditionKind {
    let lowered = value.to_lowercase();

    if AGE_INDICATORS
        .iter()
        .any(|indicator| contains_term(&lowered, indicator))
    {
        return ConditionKind::Age;
    }

    let canonical = terms.normalize_symptom(&lowered);
    if HISTORY_CANONICALS.contains(&canonical.as_str())
        || HISTORY_INDICATORS
            .iter()
            .any(|indicator| contains_term(&lowered, indicator))
    {
        return ConditionKind::History;
    }

    if FINDING_INDICATORS
        .iter()
        .any(|indicator| contains_term(&lowered, indicator))
    {
        return ConditionKind::Finding;
    }

    ConditionKind::Symptom
}

const NEGATIONS: &[&str] = &["without", "no", "not"];

/// Atom for a leaf. Empty leaves and negated wording ("without rectal
/// bleeding") produce nothing; the tree has no negation node.
pub fn build_atom(terms: &TermsNormalizer, raw: &str) -> Option<AtomicCondition> {
    let value = clean_leaf(raw);
    let negated = value
        .split(' ')
        .next()
        .is_some_and(|first| NEGATIONS.contains(&first));
    if value.is_empty() || negated {
        return None;
    }

    Some(AtomicCondition {
        kind: classify_kind(terms, &value),
        qualifier: qualifiers_in(&value).first().map(|word| word.to_string()),
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::{build_atom, classify_kind, clean_leaf};
    use crate::model::ConditionKind;
    use crate::terms::TermsNormalizer;

    fn terms() -> TermsNormalizer {
        TermsNormalizer::new().expect("synonym table builds")
    }

    #[test]
    fn clean_leaf_strips_connectives_and_punctuation() {
        assert_eq!(
            clean_leaf("* have chest X-ray findings that suggest lung cancer or"),
            "chest x-ray findings that suggest lung cancer"
        );
        assert_eq!(clean_leaf("  are aged 40 and over and "), "aged 40 and over");
        assert_eq!(clean_leaf("have been exposed to asbestos ."), "exposed to asbestos");
        assert_eq!(clean_leaf(" or "), "");
    }

    #[test]
    fn classification_checks_age_before_history_and_findings() {
        let terms = terms();
        assert_eq!(classify_kind(&terms, "aged 40 and over"), ConditionKind::Age);
        assert_eq!(classify_kind(&terms, "ever smoked"), ConditionKind::History);
        assert_eq!(classify_kind(&terms, "smoker"), ConditionKind::History);
        assert_eq!(
            classify_kind(&terms, "exposed to asbestos"),
            ConditionKind::History
        );
        assert_eq!(
            classify_kind(&terms, "chest x-ray findings that suggest lung cancer"),
            ConditionKind::Finding
        );
        assert_eq!(classify_kind(&terms, "raised ca125"), ConditionKind::Finding);
        assert_eq!(classify_kind(&terms, "testicular lump"), ConditionKind::Symptom);
        assert_eq!(classify_kind(&terms, "haemoptysis"), ConditionKind::Symptom);
    }

    #[test]
    fn qualifier_is_recorded_without_changing_value() {
        let atom = build_atom(&terms(), "have unexplained haemoptysis.").expect("atom");
        assert_eq!(atom.value, "unexplained haemoptysis");
        assert_eq!(atom.qualifier.as_deref(), Some("unexplained"));
        assert_eq!(atom.kind, ConditionKind::Symptom);

        let atom = build_atom(&terms(), "visible haematuria").expect("atom");
        assert_eq!(atom.qualifier.as_deref(), Some("visible"));
    }

    #[test]
    fn negated_leaves_are_dropped() {
        assert!(build_atom(&terms(), "without rectal bleeding").is_none());
        assert!(build_atom(&terms(), "and").is_none());
        assert!(build_atom(&terms(), "nodule").is_some());
    }
}
