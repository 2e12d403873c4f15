use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub services: ServicesConfig,
    pub generation: GenerationConfig,
    pub ingest: IngestConfig,
    pub live: LiveConfig,
    pub sink: SinkConfig,
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    /// Services in emission order. Every generated second carries one record per entry.
    pub profiles: Vec<ServiceProfile>,
    /// The one service whose records carry a transaction sub-record.
    pub transaction_service: String,
    pub healthy_messages: Vec<String>,
}

impl ServicesConfig {
    pub fn profile(&self, name: &str) -> Option<&ServiceProfile> {
        self.profiles.iter().find(|p| p.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.profiles.iter().map(|p| p.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            profiles: vec![
                ServiceProfile::new("market-data-feed", 45.0, 85.0),
                ServiceProfile::new("trade-service", 80.0, 150.0),
                ServiceProfile::new("payment-service", 120.0, 300.0),
                ServiceProfile::new("order-processor", 30.0, 70.0),
            ],
            transaction_service: "payment-service".to_string(),
            healthy_messages: [
                "Request processed successfully",
                "Trade executed successfully",
                "Order validated and accepted",
                "Payment processed",
                "Market data quote updated",
                "Connection established",
                "Cache hit - serving from memory",
                "Response sent to client",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceProfile {
    pub name: String,
    pub latency_min_ms: f64,
    pub latency_max_ms: f64,
}

impl ServiceProfile {
    pub fn new(name: &str, latency_min_ms: f64, latency_max_ms: f64) -> Self {
        Self {
            name: name.to_string(),
            latency_min_ms,
            latency_max_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationMode {
    Parallel,
    Sequential,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub days: u32,
    /// Probability that any single record is drawn from a scenario instead of the healthy baseline.
    pub anomaly_ratio: f64,
    pub mode: GenerationMode,
    /// Cores left to the rest of the machine when sizing the worker pool.
    pub reserved_cores: usize,
    /// Sequential mode persists its checkpoint after this many offsets...
    pub checkpoint_every: u64,
    /// ...or after this much wall-clock time, whichever comes first.
    #[serde(with = "humantime_serde")]
    pub checkpoint_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub heartbeat_interval: Duration,
    pub copy_buffer_bytes: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            days: 7,
            anomaly_ratio: 0.02,
            mode: GenerationMode::Parallel,
            reserved_cores: 2,
            checkpoint_every: 1000,
            checkpoint_interval: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(15),
            copy_buffer_bytes: 10 * 1024 * 1024,
        }
    }
}

impl GenerationConfig {
    /// Worker count for parallel generation: available cores minus the reserve, never below one.
    pub fn worker_count(&self) -> usize {
        num_cpus::get().saturating_sub(self.reserved_cores).max(1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub batch_size: usize,
    pub max_concurrent_batches: usize,
    #[serde(with = "humantime_serde")]
    pub heartbeat_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub stall_warn_after: Duration,
    #[serde(with = "humantime_serde")]
    pub stall_escalate_after: Duration,
    #[serde(with = "humantime_serde")]
    pub stall_abort_after: Duration,
    /// Docs/sec floor checked once, against the first completed batch.
    pub min_first_batch_rate: f64,
    pub probe_batch_size: usize,
    /// Write a `completed` ingestion checkpoint after a run with no fatal abort.
    pub record_completion: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: 100_000,
            max_concurrent_batches: 2,
            heartbeat_interval: Duration::from_secs(10),
            stall_warn_after: Duration::from_secs(120),
            stall_escalate_after: Duration::from_secs(180),
            stall_abort_after: Duration::from_secs(300),
            min_first_batch_rate: 500.0,
            probe_batch_size: 10,
            record_completion: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    #[serde(with = "humantime_serde")]
    pub tick: Duration,
    #[serde(with = "humantime_serde")]
    pub anomaly_duration: Duration,
    #[serde(with = "humantime_serde")]
    pub anomaly_gap_min: Duration,
    #[serde(with = "humantime_serde")]
    pub anomaly_gap_max: Duration,
    #[serde(with = "humantime_serde")]
    pub incident_duration: Duration,
    pub incident_flag: PathBuf,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            anomaly_duration: Duration::from_secs(15),
            anomaly_gap_min: Duration::from_secs(60),
            anomaly_gap_max: Duration::from_secs(90),
            incident_duration: Duration::from_secs(300),
            incident_flag: PathBuf::from("/tmp/business_incident_active"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub index: String,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Retries after the first attempt on timeouts and refused connections.
    pub max_retries: usize,
    #[serde(with = "humantime_serde")]
    pub retry_interval: Duration,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            index: "o11y-heartbeat".to_string(),
            request_timeout: Duration::from_secs(300),
            max_retries: 3,
            retry_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub output: PathBuf,
    pub generation_checkpoint: PathBuf,
    pub ingest_checkpoint: PathBuf,
    pub scenarios: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            output: PathBuf::from("backfill_data.jsonl"),
            generation_checkpoint: PathBuf::from("backfill_progress.json"),
            ingest_checkpoint: PathBuf::from("backfill_ingest_progress.json"),
            scenarios: PathBuf::from("scenarios.json"),
        }
    }
}
