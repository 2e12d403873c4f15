use crate::config::IngestConfig;
use crate::fatal::FatalAbort;
use crate::ingest::batch::{count_lines, read_batches, Batch, ReadStats};
use crate::ingest::monitor::{spawn_monitor, IngestProgress, StallPolicy};
use crate::progress::{eta, ProgressEvent, ProgressSink};
use crate::sink::{BulkOutcome, BulkSink, HealthStatus, SinkError};
use crate::storage::{CheckpointError, CheckpointStore, IngestionCheckpoint};
use crate::synth::Record;
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

const PROBE_TIMEOUT: Duration = Duration::from_secs(30);
const SLOW_PROBE: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("artifact io error at '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error("ingestion task failed: {0}")]
    Task(String),

    #[error(transparent)]
    Fatal(#[from] FatalAbort),
}

pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Debug, Clone, PartialEq)]
pub struct IngestSummary {
    pub indexed: u64,
    pub failed: u64,
    pub total_lines: u64,
    pub resumed_from: u64,
    pub batches: u64,
    pub malformed: u64,
    pub elapsed: Duration,
}

struct BatchReport {
    number: u64,
    size: u64,
    end_line: u64,
    result: std::result::Result<BulkOutcome, SinkError>,
    elapsed: Duration,
}

/// Streams a generated artifact into a bulk sink.
pub struct Ingestor {
    sink: Arc<dyn BulkSink>,
    index: String,
    config: IngestConfig,
    checkpoint: CheckpointStore<IngestionCheckpoint>,
    progress: Arc<dyn ProgressSink>,
}

impl Ingestor {
    pub fn new(
        sink: Arc<dyn BulkSink>,
        index: impl Into<String>,
        config: IngestConfig,
        checkpoint: CheckpointStore<IngestionCheckpoint>,
        progress: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            sink,
            index: index.into(),
            config,
            checkpoint,
            progress,
        }
    }

    /// Probe the sink, then load every line of `artifact` after the checkpointed resume point.
    ///
    /// Per-document and per-batch failures are counted and ingestion carries on. A stall or a
    /// slow first batch ends the run with [`IngestError::Fatal`], dropping in-flight batches.
    pub async fn ingest(&self, artifact: &Path) -> Result<IngestSummary> {
        if !artifact.exists() {
            return Err(FatalAbort::MissingArtifact {
                path: artifact.to_path_buf(),
            }
            .into());
        }
        if let Ok(meta) = std::fs::metadata(artifact) {
            info!(
                path = %artifact.display(),
                size_mb = %format!("{:.2}", meta.len() as f64 / (1024.0 * 1024.0)),
                "Ingesting artifact"
            );
        }

        self.probe().await;

        let resumed_from = match self.checkpoint.load()? {
            Some(checkpoint) => checkpoint.last_line,
            None => 0,
        };
        if resumed_from > 0 {
            info!(line = resumed_from, "Resuming ingestion");
        }

        let path = artifact.to_path_buf();
        let total_lines = tokio::task::spawn_blocking(move || count_lines(&path))
            .await
            .map_err(|e| IngestError::Task(e.to_string()))?
            .map_err(|e| io_error(artifact, e))?;

        let batch_size = self.config.batch_size.max(1);
        let remaining = total_lines.saturating_sub(resumed_from);
        let total_batches = remaining.div_ceil(batch_size as u64);
        info!(
            total_lines,
            remaining,
            batch_size,
            total_batches,
            concurrency = self.config.max_concurrent_batches,
            "Starting bulk ingestion"
        );

        let concurrency = self.config.max_concurrent_batches.max(1);
        let (batch_tx, mut batch_rx) = mpsc::channel::<Batch>(concurrency);
        let path = artifact.to_path_buf();
        let reader = tokio::task::spawn_blocking(move || {
            read_batches(&path, resumed_from, batch_size, batch_tx)
        });

        let started = Instant::now();
        let shared = Arc::new(IngestProgress::new(total_lines, total_batches));
        let (mut abort_rx, monitor) = spawn_monitor(
            shared.clone(),
            StallPolicy::from(&self.config),
            started,
            self.progress.clone(),
        );

        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut in_flight: JoinSet<BatchReport> = JoinSet::new();
        let mut reading = true;
        let mut monitoring = true;

        let mut completed_batches = 0u64;
        let mut indexed_total = 0u64;
        let mut failed_total = 0u64;

        let outcome: Result<()> = loop {
            if !reading && in_flight.is_empty() {
                break Ok(());
            }

            tokio::select! {
                biased;

                aborted = abort_rx.wait_for(Option::is_some), if monitoring => {
                    match aborted.map(|reason| reason.clone()) {
                        Ok(Some(reason)) => break Err(reason.into()),
                        Ok(None) => {}
                        Err(_) => monitoring = false,
                    }
                }

                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    let report = match joined {
                        Ok(report) => report,
                        Err(e) => break Err(IngestError::Task(e.to_string())),
                    };

                    let (succeeded, failed) = match &report.result {
                        Ok(outcome) => {
                            if let Some(first) = outcome.failures.first() {
                                warn!(
                                    batch = report.number,
                                    failed = outcome.failed(),
                                    status = first.status,
                                    sample = %first.reason,
                                    "Documents failed to index"
                                );
                            }
                            (outcome.succeeded as u64, outcome.failed() as u64)
                        }
                        Err(e) => {
                            warn!(batch = report.number, error = %e, "Batch failed, counting it as fully failed");
                            (0, report.size)
                        }
                    };
                    debug!(
                        batch = report.number,
                        succeeded,
                        failed,
                        elapsed_secs = report.elapsed.as_secs_f64(),
                        "Batch finished"
                    );

                    completed_batches += 1;
                    indexed_total += succeeded;
                    failed_total += failed;
                    shared.record_batch(succeeded);

                    let elapsed = started.elapsed().as_secs_f64();
                    let rate = if elapsed > 0.0 { indexed_total as f64 / elapsed } else { 0.0 };

                    if completed_batches == 1 && elapsed > 0.0 && rate < self.config.min_first_batch_rate {
                        break Err(FatalAbort::SlowRate {
                            rate,
                            floor: self.config.min_first_batch_rate,
                        }
                        .into());
                    }

                    if failed > 0 {
                        let checkpoint =
                            IngestionCheckpoint::new(report.end_line, total_lines, indexed_total);
                        let persisted = match self.checkpoint.save_monotonic(checkpoint) {
                            Ok(persisted) => persisted,
                            Err(e) => break Err(e.into()),
                        };
                        warn!(
                            batch = completed_batches,
                            batches = total_batches,
                            failed,
                            checkpoint_line = persisted.last_line,
                            "Batch had failures, checkpoint updated"
                        );
                    }

                    self.progress.report(ProgressEvent::BatchComplete {
                        completed_batches,
                        total_batches,
                        indexed: indexed_total,
                        total_lines,
                        rate,
                        eta: eta(total_lines.saturating_sub(indexed_total), rate),
                    });
                }

                next = next_batch(&semaphore, &mut batch_rx), if reading => {
                    match next {
                        Some((permit, batch)) => {
                            debug!(
                                batch = batch.number,
                                batches = total_batches,
                                lines = %format!("{}-{}", batch.start_line, batch.end_line),
                                "Submitting batch"
                            );
                            let sink = self.sink.clone();
                            in_flight.spawn(submit(sink, batch, permit));
                        }
                        None => reading = false,
                    }
                }
            }
        };

        monitor.abort();
        if let Err(e) = outcome {
            in_flight.abort_all();
            drop(batch_rx);
            if let IngestError::Fatal(reason) = &e {
                error!(error = %reason, "Ingestion aborted");
            }
            return Err(e);
        }

        let stats: ReadStats = reader
            .await
            .map_err(|e| IngestError::Task(e.to_string()))?
            .map_err(|e| io_error(artifact, e))?;

        if self.config.record_completion && failed_total == 0 {
            let mut marker = IngestionCheckpoint::new(total_lines, total_lines, indexed_total);
            marker.completed = true;
            self.checkpoint.save(&marker)?;
        }

        let elapsed = started.elapsed();
        let secs = elapsed.as_secs_f64();
        info!(
            indexed = indexed_total,
            failed = failed_total,
            malformed = stats.malformed,
            avg_rate = %format!("{:.0}", if secs > 0.0 { indexed_total as f64 / secs } else { 0.0 }),
            elapsed = %format!("{}m {}s", elapsed.as_secs() / 60, elapsed.as_secs() % 60),
            "Ingestion complete"
        );

        Ok(IngestSummary {
            indexed: indexed_total,
            failed: failed_total,
            total_lines,
            resumed_from,
            batches: completed_batches,
            malformed: stats.malformed,
            elapsed,
        })
    }

    /// Advisory health checks. Failures are logged and never stop ingestion.
    async fn probe(&self) {
        match tokio::time::timeout(PROBE_TIMEOUT, self.sink.health()).await {
            Ok(Ok(health)) => {
                info!(
                    status = ?health.status,
                    nodes = health.number_of_nodes,
                    data_nodes = health.number_of_data_nodes,
                    active_shards = health.active_shards,
                    relocating = health.relocating_shards,
                    initializing = health.initializing_shards,
                    unassigned = health.unassigned_shards,
                    pending_tasks = health.number_of_pending_tasks,
                    "Cluster health"
                );
                match health.status {
                    HealthStatus::Red => {
                        warn!("Cluster is RED, bulk ingestion may fail or be very slow")
                    }
                    HealthStatus::Yellow => warn!("Cluster is YELLOW, some replicas are not assigned"),
                    HealthStatus::Green => {}
                }
            }
            Ok(Err(e)) => warn!(error = %e, "Failed to get cluster health"),
            Err(_) => warn!("Cluster health probe timed out"),
        }

        match tokio::time::timeout(PROBE_TIMEOUT, self.sink.index_exists(&self.index)).await {
            Ok(Ok(true)) => match tokio::time::timeout(PROBE_TIMEOUT, self.sink.stats(&self.index)).await {
                Ok(Ok(stats)) => info!(
                    index = %self.index,
                    docs = stats.doc_count,
                    size_mb = %format!("{:.1}", stats.size_bytes as f64 / (1024.0 * 1024.0)),
                    "Index stats"
                ),
                Ok(Err(e)) => warn!(index = %self.index, error = %e, "Failed to get index stats"),
                Err(_) => warn!(index = %self.index, "Index stats probe timed out"),
            },
            Ok(Ok(false)) => info!(index = %self.index, "Index does not exist yet"),
            Ok(Err(e)) => warn!(index = %self.index, error = %e, "Failed to check index"),
            Err(_) => warn!(index = %self.index, "Index probe timed out"),
        }

        let count = self.config.probe_batch_size;
        if count == 0 {
            return;
        }
        let records = probe_records(count);
        let start = Instant::now();
        match tokio::time::timeout(PROBE_TIMEOUT, self.sink.submit(&records)).await {
            Ok(Ok(outcome)) => {
                let elapsed = start.elapsed();
                info!(
                    succeeded = outcome.succeeded,
                    failed = outcome.failed(),
                    elapsed_secs = %format!("{:.2}", elapsed.as_secs_f64()),
                    "Test bulk completed"
                );
                if elapsed > SLOW_PROBE {
                    warn!(elapsed_secs = elapsed.as_secs(), "Test bulk was slow, the store may be overloaded");
                }
            }
            Ok(Err(e)) => warn!(error = %e, "Test bulk failed, the store may not be accepting writes"),
            Err(_) => warn!("Test bulk timed out, the store may not be accepting writes"),
        }
    }
}

/// Wait for a free slot, then for the next batch. Cancel-safe: dropping it releases the permit
/// and loses no batch.
async fn next_batch(
    semaphore: &Arc<Semaphore>,
    rx: &mut mpsc::Receiver<Batch>,
) -> Option<(OwnedSemaphorePermit, Batch)> {
    let permit = semaphore.clone().acquire_owned().await.ok()?;
    let batch = rx.recv().await?;
    Some((permit, batch))
}

async fn submit(sink: Arc<dyn BulkSink>, batch: Batch, permit: OwnedSemaphorePermit) -> BatchReport {
    let _permit = permit;
    let started = Instant::now();
    let result = sink.submit(&batch.records).await;
    BatchReport {
        number: batch.number,
        size: batch.records.len() as u64,
        end_line: batch.end_line,
        result,
        elapsed: started.elapsed(),
    }
}

/// Small throwaway documents for the write probe.
pub fn probe_records(count: usize) -> Vec<Record> {
    let now = Utc::now();
    (0..count)
        .map(|i| Record {
            timestamp: now,
            service: "sprayer-probe".to_string(),
            status_code: 200,
            latency_ms: 0.0,
            message: "bulk write probe".to_string(),
            trace_id: format!("trace-probe-{i}"),
            span_id: format!("span-probe-{i}"),
            transaction: None,
            anomaly: false,
        })
        .collect()
}

fn io_error(path: &Path, source: std::io::Error) -> IngestError {
    IngestError::Io {
        path: path.display().to_string(),
        source,
    }
}
