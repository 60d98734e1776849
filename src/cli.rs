use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "ng12",
    version,
    about = "NICE NG12 rule compiler, matcher and retrieval tooling"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Split the guideline into section containers and chunks.
    Segment(SegmentArgs),
    /// Load or compile the rule set and report metadata quality.
    Compile(CompileArgs),
    /// Match patient facts against the compiled rules.
    Match(MatchArgs),
    /// Hybrid lexical and semantic search over chunks.
    Search(SearchArgs),
    /// Report whether the rule and retrieval caches are fresh for a document.
    Status(StatusArgs),
}

/// Options shared by every command that opens an engine.
#[derive(Args, Debug, Clone)]
pub struct EngineArgs {
    #[arg(long)]
    pub document: PathBuf,

    #[arg(long, default_value = ".cache/ng12")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct SegmentArgs {
    #[arg(long)]
    pub document: PathBuf,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CompileArgs {
    #[command(flatten)]
    pub engine: EngineArgs,

    /// Ignore existing caches and recompile.
    #[arg(long, default_value_t = false)]
    pub rebuild: bool,
}

#[derive(Args, Debug, Clone)]
pub struct MatchArgs {
    #[command(flatten)]
    pub engine: EngineArgs,

    /// JSON facts file; individual flags are ignored when given.
    #[arg(long)]
    pub facts: Option<PathBuf>,

    #[arg(long)]
    pub age: Option<u32>,

    #[arg(long)]
    pub age_term: Option<String>,

    #[arg(long)]
    pub gender: Option<String>,

    #[arg(long = "symptom")]
    pub symptoms: Vec<String>,

    #[arg(long = "finding")]
    pub findings: Vec<String>,

    #[arg(long = "history")]
    pub history: Vec<String>,

    /// Free-text question checked against the scope gate before matching.
    #[arg(long)]
    pub query: Option<String>,

    #[arg(long, default_value_t = false)]
    pub near: bool,
}

#[derive(Args, Debug, Clone)]
pub struct SearchArgs {
    #[command(flatten)]
    pub engine: EngineArgs,

    #[arg(long)]
    pub query: String,

    #[arg(long)]
    pub top_k: Option<usize>,

    #[arg(long)]
    pub site: Option<String>,

    #[arg(long)]
    pub age: Option<u32>,

    #[arg(long = "symptom")]
    pub symptoms: Vec<String>,

    /// Lexical scores only; no query vector is computed.
    #[arg(long, default_value_t = false)]
    pub lexical_only: bool,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[command(flatten)]
    pub engine: EngineArgs,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::Cli;

    #[test]
    fn every_subcommand_has_help_text() {
        let command = Cli::command();
        command.clone().debug_assert();
        for subcommand in command.get_subcommands() {
            assert!(
                subcommand.get_about().is_some(),
                "{} has no help text",
                subcommand.get_name()
            );
        }
    }
}
