use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{info, warn};

/// Progress notifications emitted by the generation, ingestion and live paths.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    ChunkStarted {
        partition: usize,
        start: u64,
        end: u64,
    },
    ChunkProgress {
        partition: usize,
        processed: u64,
        total: u64,
    },
    ChunkComplete {
        partition: usize,
        records: u64,
        path: PathBuf,
    },
    GenerationProgress {
        completed_seconds: u64,
        total_seconds: u64,
        records: u64,
        rate: f64,
    },
    GenerationHeartbeat {
        elapsed: Duration,
    },
    MergeProgress {
        partition: usize,
        partitions: usize,
        bytes: u64,
    },
    SequentialProgress {
        current_offset: u64,
        total_offsets: u64,
        rate: f64,
        eta: Option<Duration>,
    },
    BatchComplete {
        completed_batches: u64,
        total_batches: u64,
        indexed: u64,
        total_lines: u64,
        rate: f64,
        eta: Option<Duration>,
    },
    IngestHeartbeat {
        elapsed: Duration,
        completed_batches: u64,
        total_batches: u64,
        percent: f64,
        eta: Option<Duration>,
    },
    StallWarning {
        elapsed: Duration,
        escalated: bool,
    },
    LiveTick {
        status: LiveStatus,
        records: usize,
    },
    AnomalyStarted {
        scenario: String,
        service: String,
    },
    AnomalyEnded,
    IncidentStarted,
    IncidentEnded {
        timed_out: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveStatus {
    Healthy,
    Anomaly,
    BusinessIncident,
}

pub trait ProgressSink: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Forwards progress to the tracing subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::ChunkStarted { partition, start, end } => {
                info!(partition, start, end, seconds = end - start, "Worker started");
            }
            ProgressEvent::ChunkProgress { partition, processed, total } => {
                info!(
                    partition,
                    processed,
                    total,
                    percent = %format!("{:.0}", percent(processed, total)),
                    "Worker progress"
                );
            }
            ProgressEvent::ChunkComplete { partition, records, path } => {
                info!(partition, records, path = %path.display(), "Worker complete");
            }
            ProgressEvent::GenerationProgress { completed_seconds, total_seconds, records, rate } => {
                info!(
                    completed_seconds,
                    total_seconds,
                    records,
                    percent = %format!("{:.1}", percent(completed_seconds, total_seconds)),
                    rate = %format!("{rate:.0}"),
                    "Generation progress"
                );
            }
            ProgressEvent::GenerationHeartbeat { elapsed } => {
                info!(elapsed_secs = elapsed.as_secs(), "Still generating");
            }
            ProgressEvent::MergeProgress { partition, partitions, bytes } => {
                info!(chunk = partition + 1, chunks = partitions, bytes, "Merged chunk");
            }
            ProgressEvent::SequentialProgress { current_offset, total_offsets, rate, eta } => {
                info!(
                    current_offset,
                    total_offsets,
                    percent = %format!("{:.2}", percent(current_offset, total_offsets)),
                    rate = %format!("{rate:.0}"),
                    eta = %format_eta(eta),
                    "Generation progress"
                );
            }
            ProgressEvent::BatchComplete {
                completed_batches,
                total_batches,
                indexed,
                total_lines,
                rate,
                eta,
            } => {
                info!(
                    batch = completed_batches,
                    batches = total_batches,
                    indexed,
                    total_lines,
                    percent = %format!("{:.2}", percent(indexed, total_lines)),
                    rate = %format!("{rate:.0}"),
                    eta = %format_eta(eta),
                    "Batch complete"
                );
            }
            ProgressEvent::IngestHeartbeat {
                elapsed,
                completed_batches,
                total_batches,
                percent,
                eta,
            } => {
                info!(
                    elapsed_secs = elapsed.as_secs(),
                    completed_batches,
                    total_batches,
                    percent = %format!("{percent:.1}"),
                    eta = %format_eta(eta),
                    "Ingesting"
                );
            }
            ProgressEvent::StallWarning { elapsed, escalated: false } => {
                warn!(
                    elapsed_secs = elapsed.as_secs(),
                    "No batches completed yet, the store may be slow; still waiting"
                );
            }
            ProgressEvent::StallWarning { elapsed, escalated: true } => {
                warn!(
                    elapsed_secs = elapsed.as_secs(),
                    "No batches completed yet, the store may be severely slow"
                );
            }
            ProgressEvent::LiveTick { status, records } => {
                tracing::debug!(?status, records, "Indexed tick");
            }
            ProgressEvent::AnomalyStarted { scenario, service } => {
                info!(%scenario, %service, "Injecting anomaly");
            }
            ProgressEvent::AnomalyEnded => info!("Anomaly ended, returning to normal"),
            ProgressEvent::IncidentStarted => info!("Business incident active"),
            ProgressEvent::IncidentEnded { timed_out } => {
                info!(timed_out, "Business incident ended");
            }
        }
    }
}

/// Collects events in memory; handy for callers that assert on what was reported.
#[derive(Debug, Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingProgress {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl ProgressSink for RecordingProgress {
    fn report(&self, event: ProgressEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

pub fn percent(done: u64, total: u64) -> f64 {
    if total == 0 {
        100.0
    } else {
        done as f64 * 100.0 / total as f64
    }
}

/// Remaining time at `rate` units/sec, or `None` while the rate is unknown.
pub fn eta(remaining: u64, rate: f64) -> Option<Duration> {
    (rate > 0.0 && remaining > 0).then(|| Duration::from_secs_f64(remaining as f64 / rate))
}

pub fn format_eta(eta: Option<Duration>) -> String {
    match eta {
        Some(eta) => {
            let secs = eta.as_secs();
            format!("{}m {}s", secs / 60, secs % 60)
        }
        None => "calculating...".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eta_formatting() {
        assert_eq!(format_eta(eta(1_000, 10.0)), "1m 40s");
        assert_eq!(format_eta(eta(1_000, 0.0)), "calculating...");
        assert_eq!(format_eta(eta(0, 10.0)), "calculating...");
    }

    #[test]
    fn test_percent_of_empty_total() {
        assert_eq!(percent(0, 0), 100.0);
        assert_eq!(percent(1, 4), 25.0);
    }
}
