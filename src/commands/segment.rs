use std::fs;
use std::io::{self, Write};

use anyhow::{Context, Result};
use ng12::Segmenter;
use tracing::info;

use crate::cli::SegmentArgs;
use crate::commands::write_json;

pub fn run(args: SegmentArgs) -> Result<()> {
    let document = fs::read_to_string(&args.document)
        .with_context(|| format!("failed to read {}", args.document.display()))?;
    let segmenter = Segmenter::new().context("failed to build segmenter")?;
    let segmentation = segmenter.segment(&document);

    info!(
        containers = segmentation.containers.len(),
        chunks = segmentation.chunks.len(),
        "segmentation complete"
    );

    if args.json {
        return write_json(&segmentation);
    }

    let mut output = io::BufWriter::new(io::stdout().lock());
    writeln!(output, "Containers: {}", segmentation.containers.len())?;
    for container in &segmentation.containers {
        writeln!(
            output,
            "  {} site={} chunks={}",
            container.title,
            container.site.as_deref().unwrap_or("-"),
            container.chunk_ids.len()
        )?;
    }

    writeln!(output, "Chunks: {}", segmentation.chunks.len())?;
    for chunk in &segmentation.chunks {
        let metadata = &chunk.local_metadata;
        writeln!(
            output,
            "  {} rule={} quality={} tags=[{}]",
            chunk.chunk_id,
            metadata.rule_id.as_deref().unwrap_or("-"),
            metadata.quality.map(|value| value.as_str()).unwrap_or("-"),
            metadata.symptom_tags.join(", ")
        )?;
    }
    output.flush()?;
    Ok(())
}
