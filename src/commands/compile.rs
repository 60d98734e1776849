use std::io::{self, Write};

use anyhow::Result;
use ng12::Rule;
use ng12::model::MetadataQuality;
use serde::Serialize;

use crate::cli::CompileArgs;
use crate::commands::{open_engine, write_json};

#[derive(Debug, Serialize)]
struct QualityCounts {
    high: usize,
    medium: usize,
    low: usize,
}

#[derive(Debug, Serialize)]
struct CompileResponse<'a> {
    content_hash: &'a str,
    rule_count: usize,
    quality: QualityCounts,
    rules: &'a [Rule],
}

pub fn run(args: CompileArgs) -> Result<()> {
    let engine = open_engine(&args.engine, args.rebuild)?;
    let snapshot = engine.current();
    let rules = snapshot.rules();

    let count = |quality: MetadataQuality| rules.iter().filter(|rule| rule.quality == quality).count();
    let quality = QualityCounts {
        high: count(MetadataQuality::High),
        medium: count(MetadataQuality::Medium),
        low: count(MetadataQuality::Low),
    };

    if args.engine.json {
        return write_json(&CompileResponse {
            content_hash: &snapshot.content_hash,
            rule_count: rules.len(),
            quality,
            rules,
        });
    }

    let mut output = io::BufWriter::new(io::stdout().lock());
    writeln!(output, "Document hash: {}", snapshot.content_hash)?;
    writeln!(
        output,
        "Rules: {} (HIGH={} MEDIUM={} LOW={})",
        rules.len(),
        quality.high,
        quality.medium,
        quality.low
    )?;
    for rule in rules {
        writeln!(
            output,
            "  {} action={} quality={} condition={}",
            rule.label(),
            rule.action.as_str(),
            rule.quality.as_str(),
            rule.condition
                .as_ref()
                .map(|condition| condition.describe())
                .unwrap_or_else(|| "-".to_string())
        )?;
        for note in &rule.audit_notes {
            writeln!(output, "    note: {note}")?;
        }
    }
    output.flush()?;
    Ok(())
}
