use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::admin::{run_config, run_history};
use commands::gate::{run_apply, run_replace};
use commands::score::run_score;

/// Exit status of a run the gate rejected (applier or quality).
const EXIT_REJECTED: u8 = 2;

#[derive(Parser)]
#[command(name = "evolve")]
#[command(about = "Apply patches only when they do not make the code more toxic", long_about = None)]
struct Cli {
    #[arg(long, global = true)]
    json: bool,

    /// Working tree patches apply to. Defaults to the current directory.
    #[arg(long, global = true)]
    workspace: Option<PathBuf>,

    /// Enable verbose logging to stderr.
    #[arg(short = 'v', long = "verbose", global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Gate a unified diff through `git apply`.
    Apply(ApplyArgs),
    /// Gate a single SEARCH/REPLACE block against one file.
    Replace(ReplaceArgs),
    /// Print the toxicity of files without changing anything.
    Score(ScoreArgs),
    /// Print recorded gate outcomes.
    History(HistoryArgs),
    /// Print the effective configuration.
    Config,
}

#[derive(Args)]
struct ApplyArgs {
    /// Patch file; `-` or omitted reads stdin.
    patch: Option<PathBuf>,
}

#[derive(Args)]
struct ReplaceArgs {
    /// Target file, relative to the workspace.
    #[arg(long)]
    file: String,
    /// File holding the block; `-` or omitted reads stdin.
    block: Option<PathBuf>,
}

#[derive(Args)]
struct ScoreArgs {
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

#[derive(Args)]
struct HistoryArgs {
    /// Only show the most recent N outcomes.
    #[arg(long)]
    limit: Option<usize>,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .try_init();
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let workspace = match cli.workspace {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    debug!(workspace = %workspace.display(), "resolved workspace");

    let accepted = match cli.command {
        Commands::Apply(args) => run_apply(&workspace, args.patch.as_deref(), cli.json)?,
        Commands::Replace(args) => {
            run_replace(&workspace, &args.file, args.block.as_deref(), cli.json)?
        }
        Commands::Score(args) => {
            run_score(&workspace, &args.files, cli.json)?;
            true
        }
        Commands::History(args) => {
            run_history(&workspace, args.limit, cli.json)?;
            true
        }
        Commands::Config => {
            run_config(&workspace, cli.json)?;
            true
        }
    };

    Ok(if accepted {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_REJECTED)
    })
}
