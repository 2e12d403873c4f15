use crate::config::{load_or_default, resolve_config_path, Config, ConfigError, GenerationMode};
use crate::fatal::FatalAbort;
use crate::generate::{
    generate_parallel, generate_sequential, GenerateError, GenerationPlan, GenerationSummary,
};
use crate::ingest::{IngestError, IngestSummary, Ingestor};
use crate::live::{run_live, LiveError};
use crate::progress::{LogProgress, ProgressSink};
use crate::sink::{BulkSink, ElasticSink, SinkError};
use crate::storage::{CheckpointError, CheckpointStore, GenerationCheckpoint, IngestionCheckpoint};
use crate::synth::{ScenarioError, ScenarioSet};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::signal;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("scenario error: {0}")]
    Scenario(#[from] ScenarioError),

    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("generation error: {0}")]
    Generate(#[from] GenerateError),

    #[error("ingestion error: {0}")]
    Ingest(#[from] IngestError),

    #[error("live mode error: {0}")]
    Live(#[from] LiveError),

    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl RunError {
    /// The abort behind this error, if it is one of the conditions that need an operator.
    pub fn fatal_abort(&self) -> Option<&FatalAbort> {
        match self {
            RunError::Generate(GenerateError::Fatal(abort)) => Some(abort),
            RunError::Ingest(IngestError::Fatal(abort)) => Some(abort),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Backfill,
    Live,
    GenerateOnly,
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub mode: RunMode,
    pub days: Option<u32>,
    pub sequential: bool,
    pub config_path: Option<PathBuf>,
}

pub async fn run(options: RunOptions) -> Result<(), RunError> {
    let config_path = resolve_config_path(options.config_path.as_deref());
    if let Some(path) = &config_path {
        info!(config_path = %path.display(), "Loading configuration");
    }
    let config = load_or_default(config_path.as_deref())?;

    let days = options.days.unwrap_or(config.generation.days);
    if days == 0 {
        return Err(ConfigError::Validation("--days must be at least 1".to_string()).into());
    }
    let sequential = options.sequential || config.generation.mode == GenerationMode::Sequential;

    let scenarios = Arc::new(ScenarioSet::load(&config.paths.scenarios, &config.services)?);
    let progress: Arc<dyn ProgressSink> = Arc::new(LogProgress);

    info!(version = env!("CARGO_PKG_VERSION"), mode = ?options.mode, "sprayer starting");

    match options.mode {
        RunMode::GenerateOnly => {
            info!(days, "Generate-only mode, no store connection required");
            let plan = GenerationPlan::for_days(&config, scenarios, days, Utc::now());
            let summary = generate(&config, plan, sequential, progress).await?;
            info!(
                output = %summary.output.display(),
                records = summary.records,
                size_gb = %format!("{:.2}", summary.bytes as f64 / (1024.0 * 1024.0 * 1024.0)),
                "Generation complete"
            );
        }
        RunMode::Backfill => {
            let sink = connect(&config).await?;
            backfill(&config, scenarios, days, sequential, sink, progress).await?;
        }
        RunMode::Live => {
            let sink = connect(&config).await?;
            run_live(
                Arc::new(config.services.clone()),
                scenarios,
                config.live.clone(),
                sink,
                progress,
                None,
                async {
                    if let Err(e) = signal::ctrl_c().await {
                        warn!(error = %e, "Failed to listen for Ctrl-C");
                        std::future::pending::<()>().await;
                    }
                    info!("Shutdown signal received");
                },
            )
            .await?;
        }
    }

    Ok(())
}

/// Build the store client and make sure it answers. Failing here is fatal.
async fn connect(config: &Config) -> Result<Arc<dyn BulkSink>, RunError> {
    let sink = ElasticSink::new(&config.sink)?;
    let info = sink.info().await?;
    info!(
        cluster = %info.cluster_name,
        version = %info.version.number,
        index = %sink.index(),
        "Connected to Elasticsearch"
    );
    Ok(Arc::new(sink))
}

/// Generate unless a finished artifact is already on disk, then ingest it.
pub async fn backfill(
    config: &Config,
    scenarios: Arc<ScenarioSet>,
    days: u32,
    sequential: bool,
    sink: Arc<dyn BulkSink>,
    progress: Arc<dyn ProgressSink>,
) -> Result<IngestSummary, RunError> {
    let output = &config.paths.output;
    info!(days, output = %output.display(), "Backfill: generate to file, then bulk ingest");

    let generation = CheckpointStore::<GenerationCheckpoint>::new(&config.paths.generation_checkpoint);
    let complete = generation
        .load()?
        .map(|checkpoint| checkpoint.is_complete_for(output))
        .unwrap_or(false);

    if complete && artifact_len(output) > 0 {
        info!(output = %output.display(), "Generation file already complete, skipping generation");
    } else {
        let plan = GenerationPlan::for_days(config, scenarios, days, Utc::now());
        generate(config, plan, sequential, progress.clone()).await?;
    }

    let ingestor = Ingestor::new(
        sink,
        config.sink.index.clone(),
        config.ingest.clone(),
        CheckpointStore::new(&config.paths.ingest_checkpoint),
        progress,
    );
    let summary = ingestor.ingest(output).await?;

    info!(
        indexed = summary.indexed,
        failed = summary.failed,
        output = %output.display(),
        size_gb = %format!("{:.2}", artifact_len(output) as f64 / (1024.0 * 1024.0 * 1024.0)),
        "Backfill complete"
    );
    Ok(summary)
}

async fn generate(
    config: &Config,
    plan: GenerationPlan,
    sequential: bool,
    progress: Arc<dyn ProgressSink>,
) -> Result<GenerationSummary, RunError> {
    let store = CheckpointStore::<GenerationCheckpoint>::new(&config.paths.generation_checkpoint);

    let summary = if sequential {
        let settings = config.generation.clone();
        tokio::task::spawn_blocking(move || {
            generate_sequential(&plan, &settings, &store, progress.as_ref())
        })
        .await??
    } else {
        generate_parallel(
            &plan,
            config.generation.worker_count(),
            &config.generation,
            &store,
            progress,
        )
        .await?
    };

    // A new artifact invalidates any ingestion progress recorded against the old one.
    CheckpointStore::<IngestionCheckpoint>::new(&config.paths.ingest_checkpoint).clear()?;
    Ok(summary)
}

fn artifact_len(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Operator-facing banner for conditions the program cannot recover from.
pub fn print_action_required(abort: &FatalAbort) {
    let rule = "=".repeat(70);
    eprintln!();
    eprintln!("{rule}");
    eprintln!("FATAL ERROR: {abort}");
    eprintln!("{rule}");
    eprintln!("ACTION REQUIRED: {}", abort.remedy());
    eprintln!("{rule}");
    eprintln!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_fatal_abort_is_found_through_wrappers() {
        let err = RunError::from(IngestError::Fatal(FatalAbort::Stalled {
            elapsed: Duration::from_secs(300),
        }));
        assert!(matches!(err.fatal_abort(), Some(FatalAbort::Stalled { .. })));

        let err = RunError::from(GenerateError::Fatal(FatalAbort::WorkerFailed {
            partition: Some(1),
            reason: "disk full".to_string(),
        }));
        assert!(err.fatal_abort().is_some());

        let err = RunError::from(ConfigError::Validation("bad".to_string()));
        assert!(err.fatal_abort().is_none());
    }
}
