use super::types::*;
use crate::config::{env_var_regex, expand_env_vars, expand_tilde};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation failed:\n{}", .0.join("\n"))]
    ValidationList(Vec<String>),

    #[error("validation failed: {0}")]
    Validation(String),
}

const URL_ENV_VARS: [&str; 2] = ["ELASTIC_CLOUD_ID", "ELASTICSEARCH_URL"];
const API_KEY_ENV_VARS: [&str; 2] = ["ELASTIC_API_KEY", "ELASTICSEARCH_APIKEY"];

/// Load the config at `path`, or the built-in defaults when no path was resolved.
pub fn load_or_default(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(path) => load_config(path)?,
        None => {
            tracing::info!("No config file found, using built-in defaults");
            let config = Config::default();
            validate_config(&config)?;
            config
        }
    };
    resolve_credentials(&mut config);
    Ok(config)
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let yaml_string = std::fs::read_to_string(path).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read config file '{}': {}", path.display(), e),
        ))
    })?;

    let mut config = parse_config(&yaml_string).map_err(|e| match e {
        ConfigError::YamlParse(e) => ConfigError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("in file '{}': {}", path.display(), e),
        )),
        other => other,
    })?;

    expand_paths(&mut config);
    Ok(config)
}

/// Parse and validate config from a YAML string, expanding `$env{VAR}` references first.
pub fn parse_config(yaml: &str) -> Result<Config, ConfigError> {
    let yaml = expand_env_vars(yaml);
    check_unexpanded_vars(&yaml)?;

    // An empty document deserializes to unit, not to an all-defaults struct.
    let config: Config = if yaml.trim().is_empty() {
        Config::default()
    } else {
        serde_yaml::from_str(&yaml)?
    };

    validate_config(&config)?;
    Ok(config)
}

/// Checks for unexpanded environment variables and returns a helpful error
fn check_unexpanded_vars(yaml_string: &str) -> Result<(), ConfigError> {
    let mut unexpanded_vars: Vec<String> = env_var_regex()
        .captures_iter(yaml_string)
        .map(|cap| cap[1].to_string())
        .collect();

    if unexpanded_vars.is_empty() {
        return Ok(());
    }

    unexpanded_vars.sort();
    unexpanded_vars.dedup();

    let error_msg = if unexpanded_vars.len() == 1 {
        format!(
            "Environment variable $env{{{0}}} is not set.\n\
             \n\
             To fix this, either:\n\
             1. Set the environment variable: export {0}=...\n\
             2. Replace $env{{{0}}} in the config file with an actual value",
            unexpanded_vars[0]
        )
    } else {
        format!(
            "Environment variables are not set: {}\n\
             \n\
             To fix this, either:\n\
             1. Set the environment variables\n\
             2. Replace the variables in the config file with actual values",
            unexpanded_vars.join(", ")
        )
    };

    Err(ConfigError::Validation(error_msg))
}

fn expand_paths(config: &mut Config) {
    config.paths.output = expand_tilde(&config.paths.output);
    config.paths.generation_checkpoint = expand_tilde(&config.paths.generation_checkpoint);
    config.paths.ingest_checkpoint = expand_tilde(&config.paths.ingest_checkpoint);
    config.paths.scenarios = expand_tilde(&config.paths.scenarios);
    config.live.incident_flag = expand_tilde(&config.live.incident_flag);
}

/// Fill sink credentials from the environment when the file leaves them unset.
fn resolve_credentials(config: &mut Config) {
    if config.sink.url.is_none() {
        config.sink.url = first_env(&URL_ENV_VARS);
    }
    if config.sink.api_key.is_none() {
        config.sink.api_key = first_env(&API_KEY_ENV_VARS);
    }
}

fn first_env(names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|name| std::env::var(name).ok().filter(|v| !v.is_empty()))
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    let services = &config.services;
    if services.profiles.is_empty() {
        errors.push("services.profiles must list at least one service".to_string());
    }

    let mut seen = HashSet::new();
    for profile in &services.profiles {
        if !seen.insert(profile.name.as_str()) {
            errors.push(format!("service '{}' is listed more than once", profile.name));
        }
        if profile.latency_min_ms < 0.0 || profile.latency_min_ms > profile.latency_max_ms {
            errors.push(format!(
                "service '{}': latency range {}..{} is invalid",
                profile.name, profile.latency_min_ms, profile.latency_max_ms
            ));
        }
    }

    if !services.profiles.is_empty() && services.profile(&services.transaction_service).is_none() {
        errors.push(format!(
            "services.transaction_service '{}' is not a configured service",
            services.transaction_service
        ));
    }

    if services.healthy_messages.is_empty() {
        errors.push("services.healthy_messages must not be empty".to_string());
    }

    let generation = &config.generation;
    if !(0.0..=1.0).contains(&generation.anomaly_ratio) {
        errors.push(format!(
            "generation.anomaly_ratio {} must be within [0, 1]",
            generation.anomaly_ratio
        ));
    }
    if generation.checkpoint_every == 0 {
        errors.push("generation.checkpoint_every must be positive".to_string());
    }
    if generation.copy_buffer_bytes == 0 {
        errors.push("generation.copy_buffer_bytes must be positive".to_string());
    }
    if generation.heartbeat_interval.is_zero() {
        errors.push("generation.heartbeat_interval must be positive".to_string());
    }

    let ingest = &config.ingest;
    if ingest.batch_size == 0 {
        errors.push("ingest.batch_size must be positive".to_string());
    }
    if ingest.max_concurrent_batches == 0 {
        errors.push("ingest.max_concurrent_batches must be positive".to_string());
    }
    if ingest.heartbeat_interval.is_zero() {
        errors.push("ingest.heartbeat_interval must be positive".to_string());
    }
    if !(ingest.stall_warn_after <= ingest.stall_escalate_after
        && ingest.stall_escalate_after <= ingest.stall_abort_after)
    {
        errors.push(
            "ingest stall thresholds must satisfy warn <= escalate <= abort".to_string(),
        );
    }

    let live = &config.live;
    if live.tick.is_zero() {
        errors.push("live.tick must be positive".to_string());
    }
    if live.anomaly_gap_min >= live.anomaly_gap_max {
        errors.push(format!(
            "live.anomaly_gap_min ({:?}) must be below live.anomaly_gap_max ({:?})",
            live.anomaly_gap_min, live.anomaly_gap_max
        ));
    }

    if config.sink.index.is_empty() {
        errors.push("sink.index must not be empty".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationList(errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_empty_document_yields_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.services.len(), 4);
        assert_eq!(config.ingest.batch_size, 100_000);
        assert_eq!(config.live.anomaly_duration, Duration::from_secs(15));
    }

    #[test]
    fn test_partial_sections_keep_defaults() {
        let yaml = r#"
ingest:
  batch_size: 500
  stall_abort_after: 10m
generation:
  mode: sequential
"#;
        let config = parse_config(yaml).unwrap();
        assert_eq!(config.ingest.batch_size, 500);
        assert_eq!(config.ingest.stall_abort_after, Duration::from_secs(600));
        assert_eq!(config.ingest.max_concurrent_batches, 2);
        assert_eq!(config.generation.mode, GenerationMode::Sequential);
    }

    #[test]
    fn test_unexpanded_var_is_rejected() {
        let yaml = "sink:\n  api_key: $env{SPRAYER_DEFINITELY_UNSET}\n";
        let err = parse_config(yaml).unwrap_err();
        assert!(err.to_string().contains("SPRAYER_DEFINITELY_UNSET"));
    }

    #[test]
    fn test_validation_collects_all_problems() {
        let yaml = r#"
services:
  transaction_service: billing
  profiles:
    - name: a
      latency_min_ms: 20
      latency_max_ms: 10
    - name: a
      latency_min_ms: 1
      latency_max_ms: 2
ingest:
  batch_size: 0
live:
  anomaly_gap_min: 90s
  anomaly_gap_max: 60s
"#;
        match parse_config(yaml).unwrap_err() {
            ConfigError::ValidationList(errors) => {
                assert_eq!(errors.len(), 5, "{errors:?}");
            }
            other => panic!("expected validation list, got {other}"),
        }
    }

    #[test]
    fn test_zero_heartbeats_are_rejected() {
        let yaml = "generation:\n  heartbeat_interval: 0s\ningest:\n  heartbeat_interval: 0s\n";
        match parse_config(yaml).unwrap_err() {
            ConfigError::ValidationList(errors) => {
                assert_eq!(errors.len(), 2, "{errors:?}");
                assert!(errors[0].starts_with("generation.heartbeat_interval"));
                assert!(errors[1].starts_with("ingest.heartbeat_interval"));
            }
            other => panic!("expected validation list, got {other}"),
        }
    }

    #[test]
    fn test_load_config_expands_tilde() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        std::fs::write(&path, "paths:\n  output: ~/sprayer/out.jsonl\n").unwrap();

        let config = load_config(&path).unwrap();
        if let Some(home) = dirs::home_dir() {
            assert_eq!(config.paths.output, home.join("sprayer/out.jsonl"));
        }
    }
}
