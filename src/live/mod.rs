pub mod controller;
pub mod incident;

pub use controller::{tick_records, LiveController, TickPlan};
pub use incident::IncidentFlag;

use crate::config::{LiveConfig, ServicesConfig};
use crate::progress::{ProgressEvent, ProgressSink};
use crate::sink::BulkSink;
use crate::synth::{ObservabilitySynthesizer, ScenarioSet, SynthError};
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum LiveError {
    #[error(transparent)]
    Synth(#[from] SynthError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LiveSummary {
    pub ticks: u64,
    pub records: u64,
    pub failed: u64,
}

/// Emit one record per service every tick until `shutdown` resolves. Each tick's submission is
/// awaited before the next tick; a failed submission is logged and the loop carries on.
pub async fn run_live<F>(
    services: Arc<ServicesConfig>,
    scenarios: Arc<ScenarioSet>,
    config: LiveConfig,
    sink: Arc<dyn BulkSink>,
    progress: Arc<dyn ProgressSink>,
    seed: Option<u64>,
    shutdown: F,
) -> Result<LiveSummary, LiveError>
where
    F: Future<Output = ()>,
{
    let flag = IncidentFlag::new(config.incident_flag.clone());
    let tick = config.tick;

    info!(
        services = %services.names().collect::<Vec<_>>().join(", "),
        gap_min_secs = config.anomaly_gap_min.as_secs(),
        gap_max_secs = config.anomaly_gap_max.as_secs(),
        window_secs = config.anomaly_duration.as_secs(),
        flag = %flag.path().display(),
        "Starting live mode"
    );

    let mut synth = ObservabilitySynthesizer::from_seed(services.clone(), &scenarios, seed)?;
    let mut controller =
        LiveController::from_seed(config, scenarios, Instant::now(), seed.map(|s| s ^ 0x5EED));
    let mut summary = LiveSummary::default();

    tokio::pin!(shutdown);

    loop {
        let plan = controller.tick(Instant::now(), flag.is_present());
        if plan.clear_flag {
            if let Err(e) = flag.clear() {
                warn!(path = %flag.path().display(), error = %e, "Failed to remove incident flag");
            }
        }
        for transition in &plan.transitions {
            progress.report(transition.clone());
        }

        let records = tick_records(&mut synth, &services, &plan, Utc::now());
        match sink.submit(&records).await {
            Ok(outcome) => {
                summary.records += outcome.succeeded as u64;
                summary.failed += outcome.failed() as u64;
                if let Some(first) = outcome.failures.first() {
                    warn!(failed = outcome.failed(), sample = %first.reason, "Live documents failed to index");
                }
            }
            Err(e) => {
                summary.failed += records.len() as u64;
                warn!(error = %e, "Live submission failed");
            }
        }
        summary.ticks += 1;
        progress.report(ProgressEvent::LiveTick {
            status: plan.status(),
            records: records.len(),
        });

        tokio::select! {
            _ = tokio::time::sleep(tick) => {}
            _ = &mut shutdown => {
                info!(ticks = summary.ticks, records = summary.records, "Live mode stopped");
                return Ok(summary);
            }
        }
    }
}
