use crate::synth::Record;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A document store that accepts batched writes.
#[async_trait]
pub trait BulkSink: Send + Sync {
    /// Submit one batch. Per-document rejections come back in the outcome; only transport-level
    /// problems are errors.
    async fn submit(&self, records: &[Record]) -> Result<BulkOutcome, SinkError>;

    async fn health(&self) -> Result<ClusterHealth, SinkError>;

    async fn index_exists(&self, name: &str) -> Result<bool, SinkError>;

    async fn stats(&self, name: &str) -> Result<IndexStats, SinkError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization/deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("store returned error status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("invalid sink configuration: {0}")]
    Config(String),

    #[error("max retries exceeded after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded { attempts: usize, last_error: String },

    #[error("sink error: {0}")]
    Generic(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkOutcome {
    pub succeeded: usize,
    pub failures: Vec<BulkFailure>,
}

impl BulkOutcome {
    pub fn all_succeeded(count: usize) -> Self {
        Self {
            succeeded: count,
            failures: Vec::new(),
        }
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// One rejected document, in submission order.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkFailure {
    /// Position of the document within the submitted batch.
    pub position: usize,
    pub status: u16,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Green,
    Yellow,
    Red,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterHealth {
    pub status: HealthStatus,
    #[serde(default)]
    pub number_of_nodes: u64,
    #[serde(default)]
    pub number_of_data_nodes: u64,
    #[serde(default)]
    pub active_shards: u64,
    #[serde(default)]
    pub relocating_shards: u64,
    #[serde(default)]
    pub initializing_shards: u64,
    #[serde(default)]
    pub unassigned_shards: u64,
    #[serde(default)]
    pub number_of_pending_tasks: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub doc_count: u64,
    pub size_bytes: u64,
}
