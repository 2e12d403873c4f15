use async_trait::async_trait;
use sprayer::config::{LiveConfig, ServicesConfig};
use sprayer::live::run_live;
use sprayer::progress::{LiveStatus, ProgressEvent, RecordingProgress};
use sprayer::sink::{BulkOutcome, BulkSink, ClusterHealth, IndexStats, SinkError};
use sprayer::synth::{Record, ScenarioSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

#[derive(Default)]
struct TickSink {
    batches: Mutex<Vec<Vec<Record>>>,
    fail: bool,
}

#[async_trait]
impl BulkSink for TickSink {
    async fn submit(&self, records: &[Record]) -> Result<BulkOutcome, SinkError> {
        self.batches.lock().unwrap().push(records.to_vec());
        if self.fail {
            return Err(SinkError::Generic("connection reset".to_string()));
        }
        Ok(BulkOutcome::all_succeeded(records.len()))
    }

    async fn health(&self) -> Result<ClusterHealth, SinkError> {
        Err(SinkError::Generic("unused".to_string()))
    }

    async fn index_exists(&self, _name: &str) -> Result<bool, SinkError> {
        Ok(true)
    }

    async fn stats(&self, _name: &str) -> Result<IndexStats, SinkError> {
        Ok(IndexStats::default())
    }
}

fn scenarios(services: &ServicesConfig) -> Arc<ScenarioSet> {
    Arc::new(ScenarioSet::new(vec![ScenarioSet::default_scenario()], services).unwrap())
}

fn live_config(dir: &TempDir) -> LiveConfig {
    LiveConfig {
        incident_flag: dir.path().join("business_incident_active"),
        ..LiveConfig::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_one_record_per_service_each_tick_until_shutdown() {
    let dir = TempDir::new().unwrap();
    let services = Arc::new(ServicesConfig::default());
    let sink = Arc::new(TickSink::default());
    let progress = Arc::new(RecordingProgress::default());

    let summary = run_live(
        services.clone(),
        scenarios(&services),
        live_config(&dir),
        sink.clone(),
        progress.clone(),
        Some(11),
        tokio::time::sleep(Duration::from_millis(4_500)),
    )
    .await
    .unwrap();

    assert_eq!(summary.ticks, 5);
    assert_eq!(summary.records, 20);
    assert_eq!(summary.failed, 0);

    let batches = sink.batches.lock().unwrap();
    assert_eq!(batches.len(), 5);
    for batch in batches.iter() {
        let names: Vec<&str> = batch.iter().map(|r| r.service.as_str()).collect();
        assert_eq!(names, services.names().collect::<Vec<_>>());
        assert!(batch.iter().filter(|r| r.anomaly).count() <= 1);
    }

    let ticks: Vec<LiveStatus> = progress
        .events()
        .into_iter()
        .filter_map(|e| match e {
            ProgressEvent::LiveTick { status, .. } => Some(status),
            _ => None,
        })
        .collect();
    assert_eq!(ticks.len(), 5);
    assert!(!ticks.contains(&LiveStatus::BusinessIncident));
}

#[tokio::test(start_paused = true)]
async fn test_incident_times_out_and_removes_flag() {
    let dir = TempDir::new().unwrap();
    let config = LiveConfig {
        incident_duration: Duration::from_secs(2),
        ..live_config(&dir)
    };
    std::fs::write(&config.incident_flag, "").unwrap();
    let flag = config.incident_flag.clone();

    let services = Arc::new(ServicesConfig::default());
    let progress = Arc::new(RecordingProgress::default());
    run_live(
        services.clone(),
        scenarios(&services),
        config,
        Arc::new(TickSink::default()),
        progress.clone(),
        Some(2),
        tokio::time::sleep(Duration::from_millis(3_500)),
    )
    .await
    .unwrap();

    assert!(!flag.exists());
    let events = progress.events();
    assert!(events.contains(&ProgressEvent::IncidentStarted));
    assert!(events.contains(&ProgressEvent::IncidentEnded { timed_out: true }));

    let statuses: Vec<LiveStatus> = events
        .into_iter()
        .filter_map(|e| match e {
            ProgressEvent::LiveTick { status, .. } => Some(status),
            _ => None,
        })
        .collect();
    assert_eq!(statuses.len(), 4);
    assert_eq!(statuses[..2], [LiveStatus::BusinessIncident; 2]);
    assert!(!statuses[2..].contains(&LiveStatus::BusinessIncident));
}

#[tokio::test(start_paused = true)]
async fn test_failed_submissions_do_not_stop_the_loop() {
    let dir = TempDir::new().unwrap();
    let services = Arc::new(ServicesConfig::default());
    let sink = Arc::new(TickSink {
        fail: true,
        ..TickSink::default()
    });

    let summary = run_live(
        services.clone(),
        scenarios(&services),
        live_config(&dir),
        sink.clone(),
        Arc::new(RecordingProgress::default()),
        Some(5),
        tokio::time::sleep(Duration::from_millis(2_500)),
    )
    .await
    .unwrap();

    assert_eq!(summary.ticks, 3);
    assert_eq!(summary.records, 0);
    assert_eq!(summary.failed, 12);
    assert_eq!(sink.batches.lock().unwrap().len(), 3);
}
