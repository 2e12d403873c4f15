use clap::{Parser, Subcommand};
use sprayer::cli::run::{print_action_required, run, RunMode, RunOptions};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "sprayer")]
#[command(about = "Synthetic observability data generator and Elasticsearch loader", long_about = None)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Generate historical data to a file, then bulk-ingest it
    #[arg(long, conflicts_with_all = ["live", "generate_only"])]
    backfill: bool,

    /// Stream records in real time (default)
    #[arg(long, conflicts_with = "generate_only")]
    live: bool,

    /// Generate the historical file without connecting to Elasticsearch
    #[arg(long)]
    generate_only: bool,

    /// Days of history to generate (overrides generation.days)
    #[arg(long)]
    days: Option<u32>,

    /// Generate with a single checkpointed writer instead of parallel workers
    #[arg(long)]
    sequential: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Init {
        #[arg(long)]
        stdout: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sprayer=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    if let Some(Commands::Config { action }) = cli.command {
        match action {
            ConfigAction::Init { stdout } => sprayer::cli::config::init(stdout)?,
        }
        return Ok(());
    }

    // clap rejects conflicting mode flags; no flag at all means live.
    let mode = match (cli.backfill, cli.generate_only, cli.live) {
        (true, _, _) => RunMode::Backfill,
        (_, true, _) => RunMode::GenerateOnly,
        _ => RunMode::Live,
    };

    let options = RunOptions {
        mode,
        days: cli.days,
        sequential: cli.sequential,
        config_path: cli.config,
    };

    if let Err(e) = run(options).await {
        match e.fatal_abort() {
            Some(abort) => print_action_required(abort),
            None => tracing::error!(error = %e, "sprayer failed"),
        }
        std::process::exit(1);
    }

    Ok(())
}
