use crate::config::IngestConfig;
use crate::fatal::FatalAbort;
use crate::progress::{eta, percent, ProgressEvent, ProgressSink};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Counters written by the submission loop and read by the monitor.
#[derive(Debug, Default)]
pub struct IngestProgress {
    indexed: AtomicU64,
    completed_batches: AtomicU64,
    total_batches: AtomicU64,
    total_lines: AtomicU64,
}

impl IngestProgress {
    pub fn new(total_lines: u64, total_batches: u64) -> Self {
        Self {
            total_lines: AtomicU64::new(total_lines),
            total_batches: AtomicU64::new(total_batches),
            ..Self::default()
        }
    }

    pub fn record_batch(&self, indexed: u64) {
        self.indexed.fetch_add(indexed, Ordering::Relaxed);
        self.completed_batches.fetch_add(1, Ordering::Release);
    }

    pub fn indexed(&self) -> u64 {
        self.indexed.load(Ordering::Relaxed)
    }

    pub fn completed_batches(&self) -> u64 {
        self.completed_batches.load(Ordering::Acquire)
    }

    pub fn total_batches(&self) -> u64 {
        self.total_batches.load(Ordering::Relaxed)
    }

    pub fn total_lines(&self) -> u64 {
        self.total_lines.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StallPolicy {
    pub heartbeat_interval: Duration,
    pub warn_after: Duration,
    pub escalate_after: Duration,
    pub abort_after: Duration,
}

impl From<&IngestConfig> for StallPolicy {
    fn from(config: &IngestConfig) -> Self {
        Self {
            heartbeat_interval: config.heartbeat_interval,
            warn_after: config.stall_warn_after,
            escalate_after: config.stall_escalate_after,
            abort_after: config.stall_abort_after,
        }
    }
}

/// What the monitor decided on one heartbeat.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Progressing,
    Waiting,
    Warn,
    Escalate,
    Abort(FatalAbort),
}

impl StallPolicy {
    pub fn judge(&self, elapsed: Duration, completed_batches: u64) -> Verdict {
        if completed_batches > 0 {
            Verdict::Progressing
        } else if elapsed >= self.abort_after {
            Verdict::Abort(FatalAbort::Stalled { elapsed })
        } else if elapsed >= self.escalate_after {
            Verdict::Escalate
        } else if elapsed >= self.warn_after {
            Verdict::Warn
        } else {
            Verdict::Waiting
        }
    }
}

/// Heartbeat and stall watchdog. The returned receiver flips to `Some` when ingestion must stop.
pub fn spawn_monitor(
    progress: Arc<IngestProgress>,
    policy: StallPolicy,
    started: Instant,
    sink: Arc<dyn ProgressSink>,
) -> (watch::Receiver<Option<FatalAbort>>, JoinHandle<()>) {
    let (abort_tx, abort_rx) = watch::channel(None);

    let handle = tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval_at(started + policy.heartbeat_interval, policy.heartbeat_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let elapsed = started.elapsed();
            let completed_batches = progress.completed_batches();

            match policy.judge(elapsed, completed_batches) {
                Verdict::Progressing | Verdict::Waiting => {
                    let indexed = progress.indexed();
                    let total_lines = progress.total_lines();
                    let secs = elapsed.as_secs_f64();
                    let rate = if secs > 0.0 { indexed as f64 / secs } else { 0.0 };
                    sink.report(ProgressEvent::IngestHeartbeat {
                        elapsed,
                        completed_batches,
                        total_batches: progress.total_batches(),
                        percent: percent(indexed, total_lines),
                        eta: eta(total_lines.saturating_sub(indexed), rate),
                    });
                }
                Verdict::Warn => sink.report(ProgressEvent::StallWarning {
                    elapsed,
                    escalated: false,
                }),
                Verdict::Escalate => sink.report(ProgressEvent::StallWarning {
                    elapsed,
                    escalated: true,
                }),
                Verdict::Abort(reason) => {
                    tracing::error!(elapsed_secs = elapsed.as_secs(), "Ingestion stalled, aborting");
                    let _ = abort_tx.send(Some(reason));
                    return;
                }
            }
        }
    });

    (abort_rx, handle)
}
