pub mod compile;
pub mod matching;
pub mod search;
pub mod segment;
pub mod status;

use std::io::{self, Write};

use anyhow::{Context, Result};
use ng12::{Engine, EngineConfig};
use serde::Serialize;
use tracing::info;

use crate::cli::EngineArgs;

pub fn load_config(args: &EngineArgs) -> Result<EngineConfig> {
    let config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    config.validate().context("invalid engine configuration")?;
    Ok(config)
}

pub fn open_engine(args: &EngineArgs, rebuild: bool) -> Result<Engine> {
    let config = load_config(args)?;
    info!(
        document = %args.document.display(),
        cache_root = %args.cache_root.display(),
        rebuild,
        "opening engine"
    );

    let engine = if rebuild {
        Engine::open_rebuilt(&args.document, &args.cache_root, config)
    } else {
        Engine::open(&args.document, &args.cache_root, config)
    };
    engine.with_context(|| format!("failed to open engine for {}", args.document.display()))
}

pub fn write_json<T: Serialize>(value: &T) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());
    serde_json::to_writer_pretty(&mut output, value).context("failed to serialize json output")?;
    writeln!(output)?;
    output.flush()?;
    Ok(())
}
