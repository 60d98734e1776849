use std::fs;
use std::io::{self, Write};

use anyhow::{Context, Result};
use ng12::matcher::{Citation, Clarification};
use ng12::terms::{Urgency, urgency_for};
use ng12::{Facts, MatchResult, ScopeCategory, ScopeGate};
use serde::Serialize;
use tracing::{info, warn};

use crate::cli::MatchArgs;
use crate::commands::{open_engine, write_json};

#[derive(Debug, Serialize)]
struct MatchResponse<'a> {
    scope: ScopeCategory,
    facts: &'a Facts,
    results: Vec<ScoredMatch<'a>>,
    near_matches: Vec<ScoredMatch<'a>>,
    citations: Vec<Citation>,
    clarification: Clarification,
}

#[derive(Debug, Serialize)]
struct ScoredMatch<'a> {
    #[serde(flatten)]
    result: MatchResult<'a>,
    urgency: Option<Urgency>,
}

impl<'a> From<MatchResult<'a>> for ScoredMatch<'a> {
    fn from(result: MatchResult<'a>) -> Self {
        let urgency = urgency_for(result.rule.action);
        Self { result, urgency }
    }
}

#[derive(Debug, Serialize)]
struct BlockedResponse {
    scope: ScopeCategory,
}

pub fn run(args: MatchArgs) -> Result<()> {
    let scope = args
        .query
        .as_deref()
        .map(|query| ScopeGate::new().classify(query))
        .unwrap_or(ScopeCategory::InScope);
    if scope.is_blocked() {
        warn!(scope = scope.as_str(), "query declined before matching");
        if args.engine.json {
            return write_json(&BlockedResponse { scope });
        }
        println!("Out of scope: {}", scope.as_str());
        return Ok(());
    }

    let facts = read_facts(&args)?;
    let engine = open_engine(&args.engine, false)?;
    let snapshot = engine.current();
    let matcher = &snapshot.matcher;

    let results = matcher.match_facts(&facts);
    let citations = matcher.citations(&results);
    let clarification = matcher.clarify(&facts, &results);
    let near_matches = if args.near {
        matcher.near_matches(&facts)
    } else {
        Vec::new()
    };

    info!(
        results = results.len(),
        near_matches = near_matches.len(),
        clarification_needed = clarification.is_needed(),
        "match command complete"
    );

    let response = MatchResponse {
        scope,
        facts: &facts,
        results: results.into_iter().map(ScoredMatch::from).collect(),
        near_matches: near_matches.into_iter().map(ScoredMatch::from).collect(),
        citations,
        clarification,
    };

    if args.engine.json {
        return write_json(&response);
    }
    write_text(&response)
}

fn read_facts(args: &MatchArgs) -> Result<Facts> {
    if let Some(path) = &args.facts {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read facts {}", path.display()))?;
        return Facts::from_json(&raw)
            .with_context(|| format!("failed to parse facts {}", path.display()));
    }

    Ok(Facts {
        age: args.age,
        age_term: args.age_term.clone(),
        gender: args.gender.clone(),
        symptoms: args.symptoms.clone(),
        findings: args.findings.clone(),
        history: args.history.clone(),
    })
}

fn write_text(response: &MatchResponse<'_>) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());

    writeln!(output, "Matches: {}", response.results.len())?;
    for scored in &response.results {
        write_match(&mut output, scored)?;
    }

    if !response.near_matches.is_empty() {
        writeln!(output, "Near matches: {}", response.near_matches.len())?;
        for scored in &response.near_matches {
            write_match(&mut output, scored)?;
        }
    }

    if !response.citations.is_empty() {
        writeln!(output, "Citations:")?;
        for citation in &response.citations {
            writeln!(output, "  [{}] {}", citation.render(), citation.excerpt)?;
        }
    }

    for need in &response.clarification.needs {
        writeln!(output, "Clarify: {}", serde_json::to_string(need)?)?;
    }

    output.flush()?;
    Ok(())
}

fn write_match(output: &mut impl Write, scored: &ScoredMatch<'_>) -> Result<()> {
    let result = &scored.result;
    writeln!(
        output,
        "  {} {} confidence={:.2} action={} urgency={}",
        result.rule.label(),
        result.match_type.as_str(),
        result.confidence,
        result.rule.action.as_str(),
        scored.urgency.map(|value| value.definition).unwrap_or("-")
    )?;
    for item in &result.matched {
        writeln!(output, "    + {item}")?;
    }
    for item in &result.unmatched {
        writeln!(output, "    - {item}")?;
    }
    Ok(())
}
