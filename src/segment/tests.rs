use super::*;
use crate::model::{Action, MetadataQuality};

const DOCUMENT: &str = "# Suspected cancer: recognition and referral

## 1.1 Lung and pleural cancers

### Lung cancer

1.1.1 Refer people using a suspected cancer pathway referral for lung cancer if they:
* have chest X-ray findings that suggest lung cancer or
* are aged 40 and over and have unexplained haemoptysis. [2015]

1.1.2 Offer an urgent chest X-ray (to be performed within 2 weeks) to assess for lung cancer in people aged 40 and over with 2 or more unexplained symptoms: cough, fatigue, shortness of breath, chest pain, weight loss. [2015]

### Mesothelioma

1.1.5 Consider an urgent chest X-ray in people aged 40 and over with chest pain who have been exposed to asbestos (see recommendation 1.1.2). [2015]

## Terms used in this guideline

Persistent means symptoms lasting 3 weeks or more.
";

fn segmenter() -> Segmenter {
    Segmenter::new().expect("patterns compile")
}

#[test]
fn segment_builds_containers_and_rule_chunks() {
    let segmentation = segmenter().segment(DOCUMENT);

    assert_eq!(segmentation.containers.len(), 2);
    let lung = &segmentation.containers[0];
    assert_eq!(lung.title, "1.1 Lung and pleural cancers");
    assert_eq!(lung.site.as_deref(), Some("lung"));
    assert_eq!(lung.chunk_ids.len(), 3);

    let ids = segmentation
        .chunks
        .iter()
        .map(|chunk| chunk.local_metadata.rule_id.clone())
        .collect::<Vec<Option<String>>>();
    assert_eq!(
        ids,
        vec![
            Some("1.1.1".to_string()),
            Some("1.1.2".to_string()),
            Some("1.1.5".to_string()),
            None,
        ]
    );
}

#[test]
fn chunk_spans_point_back_into_the_document() {
    let segmentation = segmenter().segment(DOCUMENT);
    for chunk in &segmentation.chunks {
        assert_eq!(
            &DOCUMENT[chunk.char_span.start..chunk.char_span.end],
            chunk.text
        );
    }
}

#[test]
fn chunks_stop_at_subsection_headings_and_record_breadcrumbs() {
    let segmentation = segmenter().segment(DOCUMENT);

    let second = &segmentation.chunks[1];
    assert!(second.text.starts_with("1.1.2 Offer an urgent chest X-ray"));
    assert!(second.text.ends_with("[2015]"));
    assert!(!second.text.contains("Mesothelioma"));
    assert_eq!(
        second.section_path,
        vec!["1.1 Lung and pleural cancers", "Lung cancer"]
    );

    let third = &segmentation.chunks[2];
    assert_eq!(
        third.section_path,
        vec!["1.1 Lung and pleural cancers", "Mesothelioma"]
    );
    assert!(third.text.contains("see recommendation 1.1.2"));
}

#[test]
fn container_without_identifiers_is_one_chunk() {
    let segmentation = segmenter().segment(DOCUMENT);
    let terms = &segmentation.containers[1];
    assert_eq!(terms.chunk_ids.len(), 1);

    let chunk = segmentation
        .chunks
        .iter()
        .find(|chunk| chunk.chunk_id == terms.chunk_ids[0])
        .expect("container chunk exists");
    assert_eq!(chunk.text, "Persistent means symptoms lasting 3 weeks or more.");
    assert_eq!(chunk.parent_container_id, terms.container_id);
    assert!(chunk.chunk_id.starts_with("chunk:prose:"));
}

#[test]
fn segmentation_is_deterministic() {
    let segmenter = segmenter();
    let first = segmenter.segment(DOCUMENT);
    let second = segmenter.segment(DOCUMENT);
    assert_eq!(first, second);
    assert!(first.chunks[0].chunk_id.starts_with("chunk:1_1_1:"));
}

#[test]
fn empty_or_headingless_documents_yield_nothing() {
    let segmenter = segmenter();
    assert_eq!(segmenter.segment(""), Segmentation::default());
    assert_eq!(
        segmenter.segment("# Title only\nSome preface text.\n"),
        Segmentation::default()
    );
}

#[test]
fn local_metadata_grades_quality() {
    let segmentation = segmenter().segment(DOCUMENT);

    let second = &segmentation.chunks[1].local_metadata;
    assert_eq!(second.action_type, Some(Action::OfferUrgent));
    assert_eq!(second.age_min, Some(40));
    assert_eq!(second.age_max, None);
    assert_eq!(second.quality, Some(MetadataQuality::High));
    assert!(second.symptom_tags.contains(&"cough".to_string()));
    assert!(second.symptom_tags.contains(&"weight loss".to_string()));

    let prose = &segmentation.chunks[3].local_metadata;
    assert_eq!(prose.quality, Some(MetadataQuality::Low));
    assert!(prose.notes.contains(&"rule_id not found".to_string()));
    assert!(prose.notes.contains(&"action_type not found".to_string()));
}

#[test]
fn site_keywords_classify_headings() {
    assert_eq!(classify_site("1.3 Lower gastrointestinal tract cancers"), Some("lower_gastrointestinal"));
    assert_eq!(classify_site("Non-site-specific symptoms"), Some("non_site_specific"));
    assert_eq!(classify_site("Terms used in this guideline"), None);
}
