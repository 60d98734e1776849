use std::io::{self, Write};

use anyhow::Result;
use ng12::util::{normalize_whitespace, truncate_chars};
use ng12::{RetrievalResult, SearchQuery};
use serde::Serialize;
use tracing::info;

use crate::cli::SearchArgs;
use crate::commands::{open_engine, write_json};

const EXCERPT_CHARS: usize = 160;

#[derive(Debug, Serialize)]
struct SearchResponse {
    query: String,
    top_k: usize,
    returned: usize,
    results: Vec<SearchHit>,
}

#[derive(Debug, Serialize)]
struct SearchHit {
    #[serde(flatten)]
    scores: RetrievalResult,
    rule_id: Option<String>,
    section: String,
    excerpt: String,
}

pub fn run(args: SearchArgs) -> Result<()> {
    let engine = open_engine(&args.engine, false)?;
    let snapshot = engine.current();
    let top_k = args
        .top_k
        .unwrap_or(engine.config().retrieval.default_top_k);

    let mut query = SearchQuery {
        top_k: Some(top_k),
        site: args.site.clone(),
        age: args.age,
        symptoms: args.symptoms.clone(),
        ..SearchQuery::new(args.query.clone())
    };
    if !args.lexical_only {
        query.embedding = Some(engine.provider().embed(&query.text));
    }
    let results = snapshot.index.search(&query)?;

    let hits = results
        .into_iter()
        .map(|scores| {
            let chunk = snapshot.index.chunk(&scores.chunk_id);
            let text = chunk
                .map(|chunk| normalize_whitespace(&chunk.text))
                .unwrap_or_default();
            SearchHit {
                rule_id: chunk.and_then(|chunk| chunk.local_metadata.rule_id.clone()),
                section: chunk
                    .map(|chunk| chunk.section_path.join(" > "))
                    .unwrap_or_default(),
                excerpt: truncate_chars(&text, EXCERPT_CHARS).to_string(),
                scores,
            }
        })
        .collect::<Vec<SearchHit>>();

    info!(query = %args.query, returned = hits.len(), "search complete");

    let response = SearchResponse {
        query: args.query,
        top_k,
        returned: hits.len(),
        results: hits,
    };
    if args.engine.json {
        return write_json(&response);
    }

    let mut output = io::BufWriter::new(io::stdout().lock());
    writeln!(output, "Query: {}", response.query)?;
    writeln!(output, "Results: {}", response.returned)?;
    for (index, hit) in response.results.iter().enumerate() {
        writeln!(
            output,
            "{}. {} [{}] fused={:.4} lexical={:.4} semantic={:.4}",
            index + 1,
            hit.rule_id.as_deref().unwrap_or("(unnumbered)"),
            hit.section,
            hit.scores.fused_score,
            hit.scores.lexical_score,
            hit.scores.semantic_score
        )?;
        writeln!(output, "   {}", hit.excerpt)?;
    }
    output.flush()?;
    Ok(())
}
