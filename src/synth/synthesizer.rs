use crate::config::{ServiceProfile, ServicesConfig};
use crate::synth::record::{round2, Record, Transaction, TransactionKind, TransactionStatus};
use crate::synth::scenario::{Scenario, ScenarioSet, TransactionProfile};
use chrono::{DateTime, Utc};
use rand::distributions::{Distribution, WeightedError, WeightedIndex};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SynthError {
    #[error("invalid weight table: {0}")]
    Weights(#[from] WeightedError),
}

const STATUS_CODES: [u16; 3] = [200, 201, 204];
const STATUS_WEIGHTS: [u32; 3] = [85, 10, 5];
const TRANSACTION_STATUSES: [TransactionStatus; 3] = [
    TransactionStatus::Success,
    TransactionStatus::Failed,
    TransactionStatus::Cancelled,
];

/// What kind of record to produce for one (timestamp, service) slot.
#[derive(Debug, Clone, Copy)]
pub enum Mode<'a> {
    Healthy { business_incident: bool },
    Anomalous(&'a Scenario),
}

/// Produces one record per call. Implementations own their random source, so each
/// worker gets its own instance and nothing is shared between them.
pub trait Synthesizer {
    fn healthy(
        &mut self,
        timestamp: DateTime<Utc>,
        service: &ServiceProfile,
        business_incident: bool,
    ) -> Record;

    fn anomalous(&mut self, timestamp: DateTime<Utc>, scenario: &Scenario) -> Record;

    fn synthesize(
        &mut self,
        timestamp: DateTime<Utc>,
        service: &ServiceProfile,
        mode: Mode<'_>,
    ) -> Record {
        match mode {
            Mode::Healthy { business_incident } => {
                self.healthy(timestamp, service, business_incident)
            }
            Mode::Anomalous(scenario) => self.anomalous(timestamp, scenario),
        }
    }
}

pub struct ObservabilitySynthesizer<R = StdRng> {
    services: Arc<ServicesConfig>,
    rng: R,
    status_codes: WeightedIndex<u32>,
    normal_transactions: WeightedIndex<f64>,
    incident_transactions: WeightedIndex<f64>,
    incident_multiplier: f64,
}

impl ObservabilitySynthesizer<StdRng> {
    pub fn from_seed(
        services: Arc<ServicesConfig>,
        scenarios: &ScenarioSet,
        seed: Option<u64>,
    ) -> Result<Self, SynthError> {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::new(services, scenarios, rng)
    }
}

impl<R: Rng> ObservabilitySynthesizer<R> {
    pub fn new(
        services: Arc<ServicesConfig>,
        scenarios: &ScenarioSet,
        rng: R,
    ) -> Result<Self, SynthError> {
        let incident = scenarios.incident_profile();
        Ok(Self {
            services,
            rng,
            status_codes: WeightedIndex::new(STATUS_WEIGHTS)?,
            normal_transactions: WeightedIndex::new(TransactionProfile::normal().weights())?,
            incident_transactions: WeightedIndex::new(incident.weights())?,
            incident_multiplier: incident.amount_multiplier,
        })
    }

    fn trace_ids(&mut self) -> (String, String) {
        (
            format!("trace-{}", self.rng.gen_range(100_000..=999_999)),
            format!("span-{}", self.rng.gen_range(100_000..=999_999)),
        )
    }

    fn transaction(&mut self, business_incident: bool) -> Transaction {
        let (weights, multiplier) = if business_incident {
            (&self.incident_transactions, self.incident_multiplier)
        } else {
            (&self.normal_transactions, 1.0)
        };
        let status = TRANSACTION_STATUSES[weights.sample(&mut self.rng)];

        let kind = TransactionKind::ALL[self.rng.gen_range(0..TransactionKind::ALL.len())];
        let (low, high) = kind.amount_range();
        let amount = self.rng.gen_range(low..high) * multiplier;

        Transaction {
            kind,
            amount: round2(amount),
            status,
        }
    }
}

impl<R: Rng> Synthesizer for ObservabilitySynthesizer<R> {
    fn healthy(
        &mut self,
        timestamp: DateTime<Utc>,
        service: &ServiceProfile,
        business_incident: bool,
    ) -> Record {
        let (min, max) = (service.latency_min_ms, service.latency_max_ms);
        let z: f64 = self.rng.sample(StandardNormal);
        let latency = ((min + max) / 2.0 + z * (max - min) / 4.0).clamp(min * 0.8, max * 1.1);

        let status_code = STATUS_CODES[self.status_codes.sample(&mut self.rng)];
        let message = self
            .services
            .healthy_messages
            .choose(&mut self.rng)
            .cloned()
            .unwrap_or_default();
        let (trace_id, span_id) = self.trace_ids();

        let transaction = (service.name == self.services.transaction_service)
            .then(|| self.transaction(business_incident));

        Record {
            timestamp,
            service: service.name.clone(),
            status_code,
            latency_ms: round2(latency),
            message,
            trace_id,
            span_id,
            transaction,
            anomaly: false,
        }
    }

    fn anomalous(&mut self, timestamp: DateTime<Utc>, scenario: &Scenario) -> Record {
        let z: f64 = self.rng.sample(StandardNormal);
        let latency = (scenario.latency_ms + z * scenario.latency_ms * 0.1).max(0.0);
        let (trace_id, span_id) = self.trace_ids();

        Record {
            timestamp,
            service: scenario.service.clone(),
            status_code: scenario.status_code,
            latency_ms: round2(latency),
            message: scenario.message.clone(),
            trace_id,
            span_id,
            transaction: None,
            anomaly: true,
        }
    }
}
