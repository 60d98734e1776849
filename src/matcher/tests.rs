use super::*;
use crate::compile::RuleCompiler;
use crate::model::{
    AtomicCondition, CharSpan, Condition, CountCondition, LogicOp, MetadataQuality,
};
use crate::segment::Segmenter;
use crate::test_support::NG12_EXCERPT;

fn terms() -> TermsNormalizer {
    TermsNormalizer::new().expect("terms")
}

fn excerpt_matcher(config: MatcherConfig) -> RuleMatcher {
    let segmenter = Segmenter::new().expect("patterns compile");
    let compiler = RuleCompiler::new(terms()).expect("compiler");
    let compiled = compiler.compile_document(&segmenter, NG12_EXCERPT);
    RuleMatcher::new(compiled.rules, terms(), config).expect("matcher")
}

fn matcher() -> RuleMatcher {
    excerpt_matcher(MatcherConfig::default())
}

fn facts(age: Option<u32>, symptoms: &[&str]) -> Facts {
    Facts {
        age,
        symptoms: symptoms.iter().map(|value| value.to_string()).collect(),
        ..Facts::default()
    }
}

fn result_for<'a>(results: &'a [MatchResult<'a>], rule_id: &str) -> Option<&'a MatchResult<'a>> {
    results
        .iter()
        .find(|result| result.rule.rule_id.as_deref() == Some(rule_id))
}

fn bare_rule(rule_id: &str, condition: Condition) -> Rule {
    Rule {
        rule_id: Some(rule_id.to_string()),
        chunk_id: format!("chunk:{rule_id}"),
        site_path: vec!["Test section".to_string()],
        site: None,
        action: crate::model::Action::ConsiderUrgent,
        action_text: String::new(),
        age_constraint: None,
        condition: Some(condition),
        verbatim_text: String::new(),
        char_span: CharSpan::new(0, 0),
        source_year: None,
        quality: MetadataQuality::High,
        audit_notes: Vec::new(),
    }
}

fn symptom(value: &str) -> AtomicCondition {
    AtomicCondition {
        kind: ConditionKind::Symptom,
        value: value.to_string(),
        qualifier: None,
    }
}

fn age_atom(value: &str) -> AtomicCondition {
    AtomicCondition {
        kind: ConditionKind::Age,
        value: value.to_string(),
        qualifier: None,
    }
}

#[test]
fn scenario_adult_over_forty_with_two_symptoms_is_full() {
    let matcher = matcher();
    let results = matcher.match_facts(&facts(Some(45), &["cough", "weight loss"]));

    let result = result_for(&results, "1.1.2").expect("1.1.2 matched");
    assert_eq!(result.match_type, MatchType::Full);
    assert_eq!(result.confidence, 1.0);
    assert!(result.unmatched.is_empty());
    assert!(
        result
            .matched
            .contains(&"Count 2/2 met: cough, weight loss".to_string())
    );
}

#[test]
fn scenario_under_forty_is_incomplete() {
    let matcher = matcher();
    let results = matcher.match_facts(&facts(Some(35), &["cough", "weight loss"]));

    let result = result_for(&results, "1.1.2").expect("1.1.2 still listed");
    assert!(matches!(
        result.match_type,
        MatchType::SymptomOnly | MatchType::Partial
    ));
    assert!(result.confidence < 1.0);
    assert!(result.unmatched.contains(&"Age 35 < 40".to_string()));
}

#[test]
fn age_boundary_is_inclusive() {
    let matcher = matcher();
    let results = matcher.match_facts(&facts(Some(40), &["cough", "fatigue"]));
    let result = result_for(&results, "1.1.2").expect("1.1.2 matched");
    assert_eq!(result.match_type, MatchType::Full);
}

#[test]
fn count_threshold_needs_enough_options() {
    let rule = bare_rule(
        "9.9.1",
        Condition::Count(CountCondition {
            threshold: 2,
            options: vec![symptom("cough"), symptom("fatigue"), symptom("weight loss")],
        }),
    );
    let matcher =
        RuleMatcher::new(vec![rule], terms(), MatcherConfig::default()).expect("matcher");
    let rule = &matcher.rules()[0];

    let two = matcher.evaluate(rule, &facts(None, &["fatigue", "weight loss"]));
    assert_eq!(two.match_type, MatchType::Full);

    let one = matcher.evaluate(rule, &facts(None, &["fatigue"]));
    assert_eq!(one.match_type, MatchType::NoMatch);
    assert_eq!(one.confidence, 0.0);
    assert!(one.unmatched[0].starts_with("Count 1/2 not met"));
}

#[test]
fn sited_symptom_matches_only_its_own_site() {
    let matcher = matcher();
    let results = matcher.match_facts(&facts(Some(60), &["vulval bleeding"]));

    let vulval = result_for(&results, "1.5.14").expect("vulval rule matched");
    assert_eq!(vulval.match_type, MatchType::Full);
    assert!(result_for(&results, "1.13.1").is_none());

    let generic = matcher.rule("1.13.1").expect("generic bleeding rule");
    let outcome = matcher.evaluate(generic, &facts(Some(60), &["vulval bleeding"]));
    assert_eq!(outcome.match_type, MatchType::NoMatch);
    assert_eq!(outcome.unmatched, vec!["Symptom: unexplained bleeding"]);
}

#[test]
fn population_gate_rejects_adults_for_childrens_rules() {
    let matcher = matcher();
    let rule = matcher.rule("1.10.1").expect("children's rule");

    let adult = matcher.evaluate(rule, &facts(Some(30), &["pallor", "persistent fatigue"]));
    assert_eq!(adult.match_type, MatchType::NoMatch);
    assert_eq!(adult.confidence, 0.0);
    assert!(adult.unmatched[0].contains("children/young people"));

    let child = matcher.evaluate(rule, &facts(Some(9), &["pallor"]));
    assert_eq!(child.match_type, MatchType::Full);

    let results = matcher.match_facts(&facts(Some(30), &["pallor", "persistent fatigue"]));
    assert!(result_for(&results, "1.10.1").is_none());
}

#[test]
fn missing_age_is_never_assumed() {
    let matcher = matcher();
    let rule = matcher.rule("1.1.5").expect("mesothelioma rule");
    let result = matcher.evaluate(
        rule,
        &Facts {
            symptoms: vec!["chest pain".to_string()],
            history: vec!["worked with asbestos".to_string()],
            ..Facts::default()
        },
    );

    // The embedded age atom fails too, so neither side is complete.
    assert_eq!(result.match_type, MatchType::Partial);
    assert!(result.unmatched.contains(&"Age required: aged 40 and over".to_string()));
    assert!(result.matched.contains(&"History: exposed to asbestos".to_string()));
}

#[test]
fn or_branches_report_first_success_only() {
    let matcher = matcher();
    let rule = matcher.rule("1.1.1").expect("lung rule");

    let result = matcher.evaluate(rule, &facts(Some(52), &["coughing up blood"]));
    assert_eq!(result.match_type, MatchType::Full);
    assert_eq!(
        result.matched,
        vec![
            "Age 52 >= 40".to_string(),
            "Symptom: haemoptysis (matches 'unexplained haemoptysis')".to_string(),
        ]
    );

    let miss = matcher.evaluate(rule, &facts(Some(52), &["hoarseness"]));
    assert_eq!(miss.match_type, MatchType::NoMatch);
    assert_eq!(
        miss.unmatched,
        vec!["None of OR conditions met (e.g., chest x-ray findings that suggest lung cancer)"]
    );
}

#[test]
fn results_are_sorted_and_deterministic() {
    let matcher = matcher();
    let query = facts(Some(45), &["cough", "weight loss", "chest pain"]);
    let first = matcher.match_facts(&query);
    let second = matcher.match_facts(&query);

    assert_eq!(first, second);
    assert!(
        first
            .windows(2)
            .all(|pair| pair[0].confidence >= pair[1].confidence)
    );
    assert_eq!(
        serde_json::to_string(&first).expect("serialize"),
        serde_json::to_string(&second).expect("serialize")
    );
}

#[test]
fn indexed_candidates_follow_the_empty_policy() {
    let indexed = excerpt_matcher(MatcherConfig {
        candidates: CandidatePolicy::Indexed {
            on_empty: EmptyCandidates::NoCandidates,
        },
        ..MatcherConfig::default()
    });
    assert!(indexed.match_facts(&facts(Some(60), &[])).is_empty());

    let narrowed = indexed.match_facts(&facts(Some(45), &["cough", "weight loss"]));
    assert!(result_for(&narrowed, "1.1.2").is_some());

    let fallback = excerpt_matcher(MatcherConfig {
        candidates: CandidatePolicy::Indexed {
            on_empty: EmptyCandidates::AllRules,
        },
        ..MatcherConfig::default()
    });
    let age_only = fallback.match_facts(&facts(Some(60), &[]));
    assert!(result_for(&age_only, "1.5.6").is_some());
}

#[test]
fn near_matches_exclude_full_results() {
    let matcher = matcher();
    let near = matcher.near_matches(&facts(Some(45), &["cough"]));

    assert!(!near.is_empty());
    assert!(near.len() <= matcher.config().max_near_matches);
    assert!(near.iter().all(|result| result.match_type != MatchType::Full));
    assert!(near.iter().all(|result| result.confidence > 0.3));
}

#[test]
fn lookups_by_symptom_site_and_id() {
    let matcher = matcher();

    let haemoptysis = matcher.rules_by_symptom("coughing up blood");
    assert_eq!(haemoptysis.len(), 1);
    assert_eq!(haemoptysis[0].label(), "1.1.1");

    let gynae = matcher
        .rules_by_site("gynaecological")
        .iter()
        .map(|rule| rule.label().to_string())
        .collect::<Vec<String>>();
    assert_eq!(gynae, vec!["1.5.6", "1.5.14"]);

    assert!(matcher.rule("1.1.5").is_some());
    assert!(matcher.rule("9.9.9").is_none());
}

#[test]
fn clarification_lists_missing_information() {
    let matcher = matcher();
    let query = Facts {
        age_term: Some("elderly".to_string()),
        symptoms: vec!["cough".to_string(), "weight loss".to_string()],
        ..Facts::default()
    };
    let results = matcher.match_facts(&query);
    let clarification = matcher.clarify(&query, &results);

    assert!(clarification.is_needed());
    assert!(clarification.needs.iter().any(|need| matches!(
        need,
        ClarificationNeed::Age { rule_ids } if rule_ids.contains(&"1.1.2".to_string())
    )));
    assert!(clarification.needs.contains(&ClarificationNeed::AgeTerm {
        term: "elderly".to_string()
    }));

    let empty = matcher.clarify(&Facts::default(), &[]);
    assert_eq!(empty.needs, vec![ClarificationNeed::Symptoms]);
}

#[test]
fn citations_truncate_excerpts_on_char_boundaries() {
    let matcher = excerpt_matcher(MatcherConfig {
        citation_excerpt_chars: 40,
        max_citations: 1,
        ..MatcherConfig::default()
    });
    let results = matcher.match_facts(&facts(Some(45), &["cough", "weight loss"]));
    let citations = matcher.citations(&results);

    assert_eq!(citations.len(), 1);
    let citation = &citations[0];
    assert_eq!(citation.rule_id.as_deref(), Some("1.1.2"));
    assert!(citation.excerpt.ends_with("..."));
    assert!(citation.excerpt.chars().count() <= 43);
    assert_eq!(
        citation.render(),
        "NG12 1.1.2, 1.1 Lung and pleural cancers > Lung cancer"
    );
}

#[test]
fn bullet_age_range_checks_both_bounds() {
    let young_lump = Condition::Composite {
        op: LogicOp::And,
        children: vec![
            Condition::Atomic(age_atom("aged 16 to 24")),
            Condition::Atomic(symptom("lump")),
        ],
    };
    let rule = bare_rule(
        "9.9.2",
        Condition::Composite {
            op: LogicOp::Or,
            children: vec![young_lump.clone(), Condition::Atomic(symptom("bone pain"))],
        },
    );
    let branch = bare_rule("9.9.3", young_lump);
    let matcher =
        RuleMatcher::new(vec![rule, branch], terms(), MatcherConfig::default()).expect("matcher");
    let (rule, branch) = (&matcher.rules()[0], &matcher.rules()[1]);

    let lower = matcher.evaluate(rule, &facts(Some(16), &["lump"]));
    assert_eq!(lower.match_type, MatchType::Full);
    assert!(lower.matched.contains(&"Age 16 within 16-24".to_string()));

    let upper = matcher.evaluate(rule, &facts(Some(24), &["lump"]));
    assert_eq!(upper.match_type, MatchType::Full);

    let above = matcher.evaluate(rule, &facts(Some(25), &["lump"]));
    assert_eq!(above.match_type, MatchType::NoMatch);
    assert_eq!(above.confidence, 0.0);

    let older = matcher.evaluate(branch, &facts(Some(25), &["lump"]));
    assert_ne!(older.match_type, MatchType::Full);
    assert!(older.unmatched.contains(&"Age 25 > 24".to_string()));

    let bone = matcher.evaluate(rule, &facts(Some(60), &["bone pain"]));
    assert_eq!(bone.match_type, MatchType::Full);
}

#[test]
fn compiled_bullet_age_range_rejects_older_patients() {
    let document = "## 1.11 Sarcomas\n\n\
1.11.9 Consider a very urgent referral for people if they:\n\
* are aged 16 to 24 and have a lump or\n\
* have bone pain. [2015]\n";
    let segmenter = Segmenter::new().expect("patterns compile");
    let compiler = RuleCompiler::new(terms()).expect("compiler");
    let compiled = compiler.compile_document(&segmenter, document);
    let matcher =
        RuleMatcher::new(compiled.rules, terms(), MatcherConfig::default()).expect("matcher");
    let rule = matcher.rule("1.11.9").expect("sarcoma rule");
    assert!(rule.age_constraint.is_none());

    let older = matcher.evaluate(rule, &facts(Some(60), &["lump"]));
    assert_ne!(older.match_type, MatchType::Full);

    let young = matcher.evaluate(rule, &facts(Some(20), &["lump"]));
    assert_eq!(young.match_type, MatchType::Full);
}
