use sprayer::cli::config::sample_config;
use sprayer::config::{load_config, load_or_default, ConfigError, GenerationMode};
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_sample_config_is_valid() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yml");
    fs::write(&config_path, sample_config()).unwrap();

    let config = load_config(&config_path).expect("Sample config should be valid");

    assert_eq!(config.services.len(), 4);
    assert_eq!(config.generation.days, 7);
    assert_eq!(config.ingest.batch_size, 100_000);
    assert_eq!(config.ingest.max_concurrent_batches, 2);
    assert_eq!(config.live.anomaly_gap_min, Duration::from_secs(60));
    assert_eq!(config.live.anomaly_gap_max, Duration::from_secs(90));
    assert_eq!(config.sink.index, "o11y-heartbeat");
}

#[test]
fn test_custom_services_and_durations() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yml");
    let config_yaml = r#"
services:
  profiles:
    - name: checkout
      latency_min_ms: 20
      latency_max_ms: 40
    - name: ledger
      latency_min_ms: 5
      latency_max_ms: 15
  transaction_service: ledger
  healthy_messages:
    - "ok"

generation:
  mode: sequential
  checkpoint_interval: 2s

ingest:
  stall_warn_after: 30s
  stall_escalate_after: 1m
  stall_abort_after: 2m
"#;
    fs::write(&config_path, config_yaml).unwrap();

    let config = load_config(&config_path).unwrap();
    assert_eq!(config.services.names().collect::<Vec<_>>(), vec!["checkout", "ledger"]);
    assert_eq!(config.generation.mode, GenerationMode::Sequential);
    assert_eq!(config.generation.checkpoint_interval, Duration::from_secs(2));
    assert_eq!(config.ingest.stall_escalate_after, Duration::from_secs(60));
    assert_eq!(config.ingest.stall_abort_after, Duration::from_secs(120));
}

#[test]
fn test_unknown_transaction_service() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yml");
    let config_yaml = r#"
services:
  profiles:
    - name: checkout
      latency_min_ms: 20
      latency_max_ms: 40
  transaction_service: payments
"#;
    fs::write(&config_path, config_yaml).unwrap();

    let err = load_config(&config_path).unwrap_err();
    assert!(err.to_string().contains("transaction_service 'payments'"));
}

#[test]
fn test_env_var_in_sink_url() {
    std::env::set_var("SPRAYER_CONFIG_TEST_URL", "https://es.example.com:9243");
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yml");
    fs::write(
        &config_path,
        "sink:\n  url: $env{SPRAYER_CONFIG_TEST_URL}\n  api_key: abc\n",
    )
    .unwrap();

    let config = load_or_default(Some(&config_path)).unwrap();
    assert_eq!(config.sink.url.as_deref(), Some("https://es.example.com:9243"));
    assert_eq!(config.sink.api_key.as_deref(), Some("abc"));
    std::env::remove_var("SPRAYER_CONFIG_TEST_URL");
}

#[test]
fn test_unset_env_var_is_reported() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yml");
    fs::write(&config_path, "sink:\n  api_key: $env{SPRAYER_DEFINITELY_UNSET_KEY}\n").unwrap();

    match load_config(&config_path) {
        Err(ConfigError::Validation(msg)) => {
            assert!(msg.contains("SPRAYER_DEFINITELY_UNSET_KEY"));
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn test_missing_file_is_io_error() {
    let temp_dir = TempDir::new().unwrap();
    let err = load_config(&temp_dir.path().join("absent.yml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
}
