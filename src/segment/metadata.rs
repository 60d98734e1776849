use crate::model::{LocalMetadata, MetadataQuality};
use crate::patterns::GuidelinePatterns;
use crate::util::contains_term;

/// Controlled vocabulary used to tag chunks for the retrieval symptom boost.
pub const SYMPTOM_TAG_VOCABULARY: &[&str] = &[
    "dysphagia",
    "weight loss",
    "rectal bleeding",
    "abdominal pain",
    "haemoptysis",
    "cough",
    "fatigue",
    "thrombocytosis",
    "dyspepsia",
    "heartburn",
    "reflux",
    "change in bowel habit",
    "constipation",
    "diarrhoea",
    "bloating",
    "nausea",
    "vomiting",
    "chest pain",
    "shortness of breath",
    "hoarseness",
    "lump",
    "mass",
    "bleeding",
    "pain",
];

const SITE_KEYWORDS: &[(&str, &str)] = &[
    ("non-site-specific", "non_site_specific"),
    ("lung", "lung"),
    ("pleural", "lung"),
    ("mesothelioma", "lung"),
    ("upper gastrointestinal", "upper_gastrointestinal"),
    ("oesophageal", "upper_gastrointestinal"),
    ("stomach", "upper_gastrointestinal"),
    ("pancreatic", "upper_gastrointestinal"),
    ("gall bladder", "upper_gastrointestinal"),
    ("liver", "upper_gastrointestinal"),
    ("lower gastrointestinal", "lower_gastrointestinal"),
    ("colorectal", "lower_gastrointestinal"),
    ("anal", "lower_gastrointestinal"),
    ("breast", "breast"),
    ("gynaecological", "gynaecological"),
    ("ovarian", "gynaecological"),
    ("endometrial", "gynaecological"),
    ("cervical", "gynaecological"),
    ("vulval", "gynaecological"),
    ("vaginal", "gynaecological"),
    ("urological", "urological"),
    ("prostate", "urological"),
    ("bladder", "urological"),
    ("renal", "urological"),
    ("testicular", "urological"),
    ("penile", "urological"),
    ("skin", "skin"),
    ("melanoma", "skin"),
    ("head and neck", "head_and_neck"),
    ("laryngeal", "head_and_neck"),
    ("oral", "head_and_neck"),
    ("thyroid", "head_and_neck"),
    ("brain", "brain_cns"),
    ("central nervous system", "brain_cns"),
    ("haematological", "haematological"),
    ("leukaemia", "haematological"),
    ("lymphoma", "haematological"),
    ("myeloma", "haematological"),
    ("sarcoma", "sarcoma"),
    ("sarcomas", "sarcoma"),
    ("childhood", "childhood"),
];

/// Site tag for a heading, by first keyword hit.
pub fn classify_site(title: &str) -> Option<&'static str> {
    let lowered = title.to_lowercase();
    SITE_KEYWORDS
        .iter()
        .find(|(keyword, _)| contains_term(&lowered, keyword))
        .map(|(_, site)| *site)
}

pub fn symptom_tags(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    SYMPTOM_TAG_VOCABULARY
        .iter()
        .filter(|term| contains_term(&lowered, term))
        .map(|term| term.to_string())
        .collect()
}

pub fn extract_local_metadata(patterns: &GuidelinePatterns, text: &str) -> LocalMetadata {
    let mut notes = Vec::<String>::new();

    let rule_id = patterns.rule_id(text).map(|found| found.rule_id);
    if rule_id.is_none() {
        notes.push("rule_id not found".to_string());
    }

    let age = patterns.age(text);
    match &age {
        None => notes.push("age not found".to_string()),
        Some(found) if !found.is_bounded() => notes.push("age ambiguous".to_string()),
        Some(_) => {}
    }

    let action = patterns.action(text);
    let action_type = action.is_actionable().then_some(action);
    if action_type.is_none() {
        notes.push("action_type not found".to_string());
    }

    let symptom_tags = symptom_tags(text);
    let has_condition =
        age.as_ref().is_some_and(|found| found.is_bounded()) || !symptom_tags.is_empty();
    let quality = MetadataQuality::grade(rule_id.is_some(), action_type.is_some(), has_condition);

    LocalMetadata {
        rule_id,
        age_min: age.as_ref().and_then(|found| found.min),
        age_max: age.as_ref().and_then(|found| found.max),
        age_text: age.map(|found| found.text),
        symptom_tags,
        action_type,
        quality: Some(quality),
        notes,
    }
}
