use std::path::PathBuf;
use std::time::Duration;

/// Conditions that stop a backfill outright. They travel up to the runner as values so
/// checkpoints already written stay the resume point.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FatalAbort {
    #[error("no batch completed within {}s; the store is not accepting writes", .elapsed.as_secs())]
    Stalled { elapsed: Duration },

    #[error("first batch indexed at {rate:.0} docs/sec, below the {floor:.0} docs/sec floor")]
    SlowRate { rate: f64, floor: f64 },

    #[error("generation worker failed: {reason}")]
    WorkerFailed {
        partition: Option<usize>,
        reason: String,
    },

    #[error("input artifact '{}' does not exist", .path.display())]
    MissingArtifact { path: PathBuf },
}

impl FatalAbort {
    /// Operator guidance printed under the ACTION REQUIRED banner.
    pub fn remedy(&self) -> &'static str {
        match self {
            FatalAbort::Stalled { .. } => {
                "Check cluster health and capacity, then rerun; ingestion resumes from its checkpoint."
            }
            FatalAbort::SlowRate { .. } => {
                "The store is too slow for a multi-day backfill. Scale it up or reduce --days, then rerun."
            }
            FatalAbort::WorkerFailed { .. } => {
                "Check free disk space and permissions on the output directory, then rerun generation."
            }
            FatalAbort::MissingArtifact { .. } => {
                "Run with --backfill or --generate-only first to create the artifact."
            }
        }
    }
}
