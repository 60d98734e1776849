use anyhow::{Context, Result};
use ng12::cache::{CachePaths, inspect};
use ng12::util::sha256_file;
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::commands::{load_config, write_json};

pub fn run(args: StatusArgs) -> Result<()> {
    let engine_args = &args.engine;
    let config = load_config(engine_args)?;
    let content_hash = sha256_file(&engine_args.document)
        .with_context(|| format!("failed to hash {}", engine_args.document.display()))?;

    info!(cache_root = %engine_args.cache_root.display(), "status requested");

    let report = inspect(
        &CachePaths::new(&engine_args.cache_root),
        &content_hash,
        &config.embedding.model_id,
        config.embedding.dimensions,
    );

    if engine_args.json {
        return write_json(&report);
    }

    if report.rules_state == "fresh" {
        info!(
            path = %report.rules_path.display(),
            rules = report.rule_count.unwrap_or(0),
            "rule cache fresh"
        );
    } else {
        warn!(path = %report.rules_path.display(), state = %report.rules_state, "rule cache not usable");
    }

    if report.retrieval_state.starts_with("fresh") {
        info!(
            path = %report.retrieval_path.display(),
            chunks = report.chunk_count.unwrap_or(0),
            model_id = %report.embedding_model_id.as_deref().unwrap_or("-"),
            state = %report.retrieval_state,
            "retrieval cache fresh"
        );
    } else {
        warn!(
            path = %report.retrieval_path.display(),
            state = %report.retrieval_state,
            "retrieval cache not usable"
        );
    }

    println!("Document hash: {}", report.content_hash);
    println!("Rules cache: {}", report.rules_state);
    println!("Retrieval cache: {}", report.retrieval_state);
    Ok(())
}
