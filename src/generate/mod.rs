pub mod chunk;
pub mod merge;
pub mod orchestrator;
pub mod partition;
pub mod sequential;

pub use chunk::{generate_chunk, ChunkArtifact};
pub use merge::merge_chunks;
pub use orchestrator::{generate_parallel, run_workers};
pub use partition::{partition, Partition};
pub use sequential::generate_sequential;

use crate::config::{Config, ServicesConfig};
use crate::fatal::FatalAbort;
use crate::storage::CheckpointError;
use crate::synth::{Mode, ObservabilitySynthesizer, ScenarioSet, SynthError, Synthesizer};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("artifact io error at '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("record serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Synth(#[from] SynthError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Fatal(#[from] FatalAbort),

    #[error("partition {0} cancelled")]
    Cancelled(usize),
}

impl GenerateError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        GenerateError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Everything a generator needs, handed to each worker by value.
#[derive(Debug, Clone)]
pub struct GenerationPlan {
    pub start_time: DateTime<Utc>,
    pub total_seconds: u64,
    pub output: PathBuf,
    pub services: Arc<ServicesConfig>,
    pub scenarios: Arc<ScenarioSet>,
    /// Chance that a record slot is filled from a scenario instead of the healthy baseline.
    pub anomaly_ratio: f64,
    /// Base seed; each worker derives its own from it. `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl GenerationPlan {
    /// The window of `days` ending at `now`.
    pub fn for_days(
        config: &Config,
        scenarios: Arc<ScenarioSet>,
        days: u32,
        now: DateTime<Utc>,
    ) -> Self {
        let total_seconds = u64::from(days) * 86_400;
        Self {
            start_time: now - chrono::Duration::seconds(total_seconds as i64),
            total_seconds,
            output: config.paths.output.clone(),
            services: Arc::new(config.services.clone()),
            scenarios,
            anomaly_ratio: config.generation.anomaly_ratio,
            seed: None,
        }
    }

    pub fn timestamp(&self, offset: u64) -> DateTime<Utc> {
        self.start_time + chrono::Duration::seconds(offset as i64)
    }

    pub fn total_records(&self) -> u64 {
        self.total_seconds * self.services.len() as u64
    }

    /// Path of the intermediate artifact for `partition`, next to the output.
    pub fn chunk_path(&self, partition: usize) -> PathBuf {
        let mut name = self.output.as_os_str().to_os_string();
        name.push(format!(".chunk_{partition}"));
        PathBuf::from(name)
    }

    pub(crate) fn worker_seed(&self, worker: u64) -> Option<u64> {
        self.seed
            .map(|seed| seed.wrapping_add(worker.wrapping_mul(0x9E37_79B9_7F4A_7C15)))
    }
}

/// Result of a finished generation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationSummary {
    pub output: PathBuf,
    pub records: u64,
    pub bytes: u64,
}

/// Writes the records of one generated second: one per service, in catalog order.
pub(crate) struct SecondWriter {
    synth: ObservabilitySynthesizer,
    coin: StdRng,
    services: Arc<ServicesConfig>,
    scenarios: Arc<ScenarioSet>,
    anomaly_ratio: f64,
}

impl SecondWriter {
    pub(crate) fn new(plan: &GenerationPlan, seed: Option<u64>) -> Result<Self, SynthError> {
        let synth =
            ObservabilitySynthesizer::from_seed(plan.services.clone(), &plan.scenarios, seed)?;
        let coin = match seed {
            Some(seed) => StdRng::seed_from_u64(seed ^ 0xA5A5_A5A5_A5A5_A5A5),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            synth,
            coin,
            services: plan.services.clone(),
            scenarios: plan.scenarios.clone(),
            anomaly_ratio: plan.anomaly_ratio.clamp(0.0, 1.0),
        })
    }

    /// Returns the number of bytes written.
    pub(crate) fn write_second<W: Write>(
        &mut self,
        out: &mut W,
        timestamp: DateTime<Utc>,
    ) -> Result<u64, WriteError> {
        let mut bytes = 0;
        for service in &self.services.profiles {
            let scenario = if self.coin.gen_bool(self.anomaly_ratio) {
                self.scenarios.all().choose(&mut self.coin)
            } else {
                None
            };
            let mode = match scenario {
                Some(scenario) => Mode::Anomalous(scenario),
                None => Mode::Healthy {
                    business_incident: false,
                },
            };

            let line = self.synth.synthesize(timestamp, service, mode).to_json_line()?;
            out.write_all(line.as_bytes())?;
            out.write_all(b"\n")?;
            bytes += line.len() as u64 + 1;
        }
        Ok(bytes)
    }
}

#[derive(Debug, Error)]
pub(crate) enum WriteError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Serialize(#[from] serde_json::Error),
}

impl WriteError {
    pub(crate) fn at(self, path: &Path) -> GenerateError {
        match self {
            WriteError::Io(source) => GenerateError::io(path, source),
            WriteError::Serialize(e) => GenerateError::Serialize(e),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::config::ServiceProfile;
    use crate::synth::Scenario;

    pub fn two_services() -> ServicesConfig {
        ServicesConfig {
            profiles: vec![
                ServiceProfile::new("A", 10.0, 20.0),
                ServiceProfile::new("B", 30.0, 40.0),
            ],
            transaction_service: "B".to_string(),
            healthy_messages: vec!["ok".to_string()],
        }
    }

    pub fn plan(dir: &Path, total_seconds: u64, anomaly_ratio: f64) -> GenerationPlan {
        let services = two_services();
        let scenario = Scenario {
            name: "A slow".to_string(),
            service: "A".to_string(),
            status_code: 503,
            latency_ms: 900.0,
            message: "ERROR: upstream timeout".to_string(),
            duration_seconds: 15,
            business_impact: false,
            transaction_impact: None,
        };
        let scenarios = ScenarioSet::new(vec![scenario], &services).unwrap();
        GenerationPlan {
            start_time: "2025-12-15T00:00:00Z".parse().unwrap(),
            total_seconds,
            output: dir.join("out.jsonl"),
            services: Arc::new(services),
            scenarios: Arc::new(scenarios),
            anomaly_ratio,
            seed: Some(17),
        }
    }
}
