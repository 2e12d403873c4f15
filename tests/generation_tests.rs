use chrono::{DateTime, TimeZone, Utc};
use sprayer::config::{GenerationConfig, ServicesConfig};
use sprayer::generate::{generate_parallel, generate_sequential, GenerationPlan};
use sprayer::progress::{ProgressEvent, RecordingProgress};
use sprayer::storage::{CheckpointStore, GenerationCheckpoint};
use sprayer::synth::{Record, ScenarioSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

fn sample_scenarios(services: &ServicesConfig) -> Arc<ScenarioSet> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("samples/scenarios.json");
    Arc::new(ScenarioSet::load(&path, services).unwrap())
}

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 12, 15, 0, 0, 0).unwrap()
}

fn plan(output: PathBuf, total_seconds: u64) -> GenerationPlan {
    let services = ServicesConfig::default();
    GenerationPlan {
        start_time: start(),
        total_seconds,
        output,
        scenarios: sample_scenarios(&services),
        services: Arc::new(services),
        anomaly_ratio: 0.25,
        seed: Some(42),
    }
}

fn read_records(path: &Path) -> Vec<Record> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| Record::from_json_line(line).unwrap())
        .collect()
}

/// Each second carries exactly one record per service slot, in order.
fn assert_time_ordered(records: &[Record], total_seconds: u64) {
    assert_eq!(records.len() as u64, total_seconds * 4);
    for (i, record) in records.iter().enumerate() {
        let second = (i / 4) as i64;
        assert_eq!(record.timestamp, start() + chrono::Duration::seconds(second));
    }
}

#[tokio::test]
async fn test_parallel_generation_is_time_ordered() {
    let dir = TempDir::new().unwrap();
    let plan = plan(dir.path().join("backfill_data.jsonl"), 50);
    let store = CheckpointStore::<GenerationCheckpoint>::new(dir.path().join("progress.json"));
    let progress = Arc::new(RecordingProgress::default());

    let summary = generate_parallel(&plan, 3, &GenerationConfig::default(), &store, progress.clone())
        .await
        .unwrap();

    assert_eq!(summary.records, 200);
    assert_eq!(summary.bytes, std::fs::metadata(&plan.output).unwrap().len());
    let records = read_records(&plan.output);
    assert_time_ordered(&records, 50);

    let healthy_payment = records
        .iter()
        .filter(|r| !r.anomaly && r.service == "payment-service")
        .count();
    let with_transaction = records
        .iter()
        .filter(|r| !r.anomaly && r.transaction.is_some())
        .count();
    assert_eq!(healthy_payment, with_transaction);
    assert!(records.iter().any(|r| r.anomaly));

    for partition in 0..3 {
        assert!(!plan.chunk_path(partition).exists());
    }
    assert!(store.load().unwrap().unwrap().is_complete_for(&plan.output));

    let events = progress.events();
    let chunk_done = events
        .iter()
        .filter(|e| matches!(e, ProgressEvent::ChunkComplete { .. }))
        .count();
    assert_eq!(chunk_done, 3);
}

#[tokio::test]
async fn test_sequential_generation_matches_shape() {
    let dir = TempDir::new().unwrap();
    let plan = plan(dir.path().join("backfill_data.jsonl"), 25);
    let store = CheckpointStore::<GenerationCheckpoint>::new(dir.path().join("progress.json"));
    let config = GenerationConfig {
        checkpoint_every: 10,
        ..GenerationConfig::default()
    };

    let progress = RecordingProgress::default();
    let summary = generate_sequential(&plan, &config, &store, &progress).unwrap();

    assert_eq!(summary.records, 100);
    assert_time_ordered(&read_records(&plan.output), 25);

    let checkpoint = store.load().unwrap().unwrap();
    assert!(checkpoint.is_complete_for(&plan.output));
    assert_eq!(checkpoint.artifact_bytes, summary.bytes);
}

#[tokio::test]
async fn test_parallel_run_discards_stale_checkpoint() {
    let dir = TempDir::new().unwrap();
    let plan = plan(dir.path().join("backfill_data.jsonl"), 8);
    let store = CheckpointStore::<GenerationCheckpoint>::new(dir.path().join("progress.json"));
    store
        .save(&GenerationCheckpoint::new(3, 999, &plan.output, start(), 10))
        .unwrap();

    generate_parallel(&plan, 2, &GenerationConfig::default(), &store, Arc::new(RecordingProgress::default()))
        .await
        .unwrap();

    let checkpoint = store.load().unwrap().unwrap();
    assert!(checkpoint.completed);
    assert_eq!(checkpoint.total_offsets, 8);
}
