use crate::config::ServicesConfig;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("failed to read scenarios file '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse scenarios file '{path}': {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },

    #[error("invalid scenarios:\n{}", .0.join("\n"))]
    Invalid(Vec<String>),
}

/// A named anomaly template. Field names match the scenarios file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,

    #[serde(rename = "service.name")]
    pub service: String,

    #[serde(rename = "http.status_code")]
    pub status_code: u16,

    pub latency_ms: f64,

    #[serde(rename = "log.message")]
    pub message: String,

    #[serde(default = "default_duration_seconds")]
    pub duration_seconds: u64,

    #[serde(default)]
    pub business_impact: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_impact: Option<TransactionImpact>,
}

fn default_duration_seconds() -> u64 {
    15
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransactionImpact {
    pub success_rate_drop: f64,
    pub amount_reduction: f64,
}

/// Transaction outcome weights and amount scaling for the transaction-bearing service.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransactionProfile {
    pub success: f64,
    pub failed: f64,
    pub cancelled: f64,
    pub amount_multiplier: f64,
}

impl TransactionProfile {
    pub const BASELINE_SUCCESS_RATE: f64 = 0.95;

    /// Weights outside any incident.
    pub fn normal() -> Self {
        Self {
            success: 95.0,
            failed: 4.0,
            cancelled: 1.0,
            amount_multiplier: 1.0,
        }
    }

    /// Weights used during a business incident when no scenario describes its impact.
    pub fn fallback_incident() -> Self {
        Self {
            success: 40.0,
            failed: 45.0,
            cancelled: 15.0,
            amount_multiplier: 0.5,
        }
    }

    /// Failures split 75/25 between failed and cancelled.
    pub fn from_impact(impact: &TransactionImpact) -> Self {
        let success = Self::BASELINE_SUCCESS_RATE * (1.0 - impact.success_rate_drop);
        let failures = 1.0 - success;
        Self {
            success: success * 100.0,
            failed: failures * 0.75 * 100.0,
            cancelled: failures * 0.25 * 100.0,
            amount_multiplier: 1.0 - impact.amount_reduction,
        }
    }

    pub fn weights(&self) -> [f64; 3] {
        [self.success, self.failed, self.cancelled]
    }
}

/// The validated scenario catalog, resolved once at startup and read-only afterwards.
#[derive(Debug, Clone)]
pub struct ScenarioSet {
    scenarios: Vec<Scenario>,
    incident_profile: TransactionProfile,
}

impl ScenarioSet {
    /// Load scenarios from a JSON array file. A missing file falls back to the built-in scenario;
    /// anything else that is wrong with the file is an error.
    pub fn load(path: &Path, services: &ServicesConfig) -> Result<Self, ScenarioError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!(
                    path = %path.display(),
                    "Scenarios file not found, using the built-in default scenario"
                );
                return Self::new(vec![Self::default_scenario()], services);
            }
            Err(source) => {
                return Err(ScenarioError::Io {
                    path: path.display().to_string(),
                    source,
                })
            }
        };

        let scenarios: Vec<Scenario> =
            serde_json::from_str(&text).map_err(|source| ScenarioError::Parse {
                path: path.display().to_string(),
                source,
            })?;

        let set = Self::new(scenarios, services)?;
        tracing::info!(
            path = %path.display(),
            count = set.len(),
            business_impact = set.scenarios.iter().filter(|s| s.business_impact).count(),
            "Loaded scenarios"
        );
        Ok(set)
    }

    pub fn new(scenarios: Vec<Scenario>, services: &ServicesConfig) -> Result<Self, ScenarioError> {
        let mut errors = Vec::new();

        if scenarios.is_empty() {
            errors.push("at least one scenario is required".to_string());
        }

        for scenario in &scenarios {
            if services.profile(&scenario.service).is_none() {
                errors.push(format!(
                    "scenario '{}' targets unknown service '{}'",
                    scenario.name, scenario.service
                ));
            }
            if !(scenario.latency_ms >= 0.0) {
                errors.push(format!(
                    "scenario '{}' has negative latency {}",
                    scenario.name, scenario.latency_ms
                ));
            }
            match (scenario.business_impact, scenario.transaction_impact.as_ref()) {
                (true, None) => errors.push(format!(
                    "scenario '{}' is marked business_impact but has no transaction_impact",
                    scenario.name
                )),
                (_, Some(impact)) => {
                    for (field, value) in [
                        ("success_rate_drop", impact.success_rate_drop),
                        ("amount_reduction", impact.amount_reduction),
                    ] {
                        if !(0.0..=1.0).contains(&value) {
                            errors.push(format!(
                                "scenario '{}': {} {} must be within [0, 1]",
                                scenario.name, field, value
                            ));
                        }
                    }
                }
                (false, None) => {}
            }
        }

        if !errors.is_empty() {
            return Err(ScenarioError::Invalid(errors));
        }

        let incident_profile = scenarios
            .iter()
            .find(|s| s.business_impact)
            .and_then(|s| s.transaction_impact.as_ref())
            .map(TransactionProfile::from_impact)
            .unwrap_or_else(TransactionProfile::fallback_incident);

        Ok(Self {
            scenarios,
            incident_profile,
        })
    }

    pub fn default_scenario() -> Scenario {
        Scenario {
            name: "Market Data Latency Spike".to_string(),
            service: "market-data-feed".to_string(),
            status_code: 200,
            latency_ms: 3500.0,
            message: "WARN: P99 latency > 3000ms".to_string(),
            duration_seconds: 15,
            business_impact: false,
            transaction_impact: None,
        }
    }

    pub fn all(&self) -> &[Scenario] {
        &self.scenarios
    }

    /// Scenarios that may be injected while a business incident is running.
    pub fn without_business_impact(&self) -> Vec<&Scenario> {
        self.scenarios.iter().filter(|s| !s.business_impact).collect()
    }

    pub fn incident_profile(&self) -> TransactionProfile {
        self.incident_profile
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }
}
