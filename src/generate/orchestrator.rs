use crate::config::GenerationConfig;
use crate::fatal::FatalAbort;
use crate::generate::{
    generate_chunk, merge_chunks, partition, ChunkArtifact, GenerateError, GenerationPlan,
    GenerationSummary,
};
use crate::progress::{ProgressEvent, ProgressSink};
use crate::storage::{CheckpointStore, GenerationCheckpoint};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info, warn};

/// Generate the plan in parallel: partition, run one blocking worker per partition, then merge.
/// The output is overwritten; any earlier generation checkpoint is discarded first.
pub async fn generate_parallel(
    plan: &GenerationPlan,
    worker_count: usize,
    config: &GenerationConfig,
    store: &CheckpointStore<GenerationCheckpoint>,
    progress: Arc<dyn ProgressSink>,
) -> Result<GenerationSummary, GenerateError> {
    store.clear()?;

    info!(
        output = %plan.output.display(),
        start = %plan.start_time.to_rfc3339(),
        end = %plan.timestamp(plan.total_seconds).to_rfc3339(),
        seconds = plan.total_seconds,
        services = plan.services.len(),
        records = plan.total_records(),
        workers = worker_count,
        "Generating backfill (parallel)"
    );

    let chunks = run_workers(plan, worker_count, config.heartbeat_interval, progress.clone()).await?;

    let merge_plan = plan.clone();
    let merge_store = store.clone();
    let buffer = config.copy_buffer_bytes;
    tokio::task::spawn_blocking(move || {
        merge_chunks(&merge_plan, chunks, buffer, &merge_store, progress.as_ref())
    })
    .await
    .map_err(|e| FatalAbort::WorkerFailed {
        partition: None,
        reason: format!("merge task: {e}"),
    })?
}

/// Run one chunk generator per partition and collect their artifacts in completion order.
/// The first failing worker cancels the rest, and every chunk file is removed before the
/// failure is returned.
pub async fn run_workers(
    plan: &GenerationPlan,
    worker_count: usize,
    heartbeat_interval: Duration,
    progress: Arc<dyn ProgressSink>,
) -> Result<Vec<ChunkArtifact>, GenerateError> {
    let partitions = partition(plan.total_seconds, worker_count);
    let cancel = Arc::new(AtomicBool::new(false));
    let mut workers = JoinSet::new();

    for part in &partitions {
        let part = *part;
        let plan = plan.clone();
        let progress = progress.clone();
        let cancel = cancel.clone();
        workers.spawn_blocking(move || {
            let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
                generate_chunk(&plan, part, progress.as_ref(), &cancel)
            }));
            (part.index, result)
        });
    }

    let started = Instant::now();
    let mut heartbeat = tokio::time::interval_at(started + heartbeat_interval, heartbeat_interval);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let services = plan.services.len() as u64;
    let mut completed = Vec::with_capacity(partitions.len());
    let mut completed_seconds = 0u64;

    loop {
        tokio::select! {
            joined = workers.join_next() => {
                let Some(joined) = joined else { break };

                let failure = match joined {
                    Ok((_, Ok(Ok(artifact)))) => {
                        completed_seconds += artifact.offsets;
                        let elapsed = started.elapsed().as_secs_f64();
                        let records = completed_seconds * services;
                        let rate = if elapsed > 0.0 { records as f64 / elapsed } else { 0.0 };
                        progress.report(ProgressEvent::GenerationProgress {
                            completed_seconds,
                            total_seconds: plan.total_seconds,
                            records,
                            rate,
                        });
                        completed.push(artifact);
                        continue;
                    }
                    Ok((index, Ok(Err(e)))) => FatalAbort::WorkerFailed {
                        partition: Some(index),
                        reason: format!("partition {index}: {e}"),
                    },
                    Ok((index, Err(panic))) => FatalAbort::WorkerFailed {
                        partition: Some(index),
                        reason: format!("partition {index} panicked: {}", panic_message(&*panic)),
                    },
                    Err(e) => FatalAbort::WorkerFailed {
                        partition: None,
                        reason: e.to_string(),
                    },
                };

                error!(error = %failure, "Generation worker failed, aborting generation");
                cancel.store(true, Ordering::Relaxed);
                workers.abort_all();
                // Running blocking workers cannot be aborted; wait for them to see the flag.
                while workers.join_next().await.is_some() {}
                for part in &partitions {
                    remove_chunk(plan, part.index);
                }
                return Err(failure.into());
            }
            _ = heartbeat.tick() => {
                progress.report(ProgressEvent::GenerationHeartbeat { elapsed: started.elapsed() });
            }
        }
    }

    info!(
        chunks = completed.len(),
        elapsed_secs = started.elapsed().as_secs(),
        "All generation workers complete"
    );
    Ok(completed)
}

fn remove_chunk(plan: &GenerationPlan, index: usize) {
    let path = plan.chunk_path(index);
    match std::fs::remove_file(&path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Could not remove chunk file"),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
