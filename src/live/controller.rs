use crate::config::{LiveConfig, ServicesConfig};
use crate::progress::{LiveStatus, ProgressEvent};
use crate::synth::{Record, Scenario, ScenarioSet, Synthesizer};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::IteratorRandom;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// What one live tick should emit.
#[derive(Debug, Clone, Default)]
pub struct TickPlan {
    /// Scenario injected into its target service this tick.
    pub scenario: Option<Scenario>,
    pub business_incident: bool,
    /// The incident timed out and the marker file should be removed.
    pub clear_flag: bool,
    pub transitions: Vec<ProgressEvent>,
}

impl TickPlan {
    pub fn status(&self) -> LiveStatus {
        if self.business_incident {
            LiveStatus::BusinessIncident
        } else if self.scenario.is_some() {
            LiveStatus::Anomaly
        } else {
            LiveStatus::Healthy
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ActiveAnomaly {
    scenario: usize,
    ends_at: Instant,
}

/// Decides anomaly and business-incident windows, one tick at a time.
///
/// Pure apart from its random source: the caller supplies the clock and whether the incident
/// marker is present, so a seeded controller replays identically.
pub struct LiveController<R = StdRng> {
    config: LiveConfig,
    scenarios: Arc<ScenarioSet>,
    rng: R,
    anomaly: Option<ActiveAnomaly>,
    last_anomaly_end: Instant,
    gap: Duration,
    incident_ends: Option<Instant>,
}

impl LiveController<StdRng> {
    pub fn from_seed(
        config: LiveConfig,
        scenarios: Arc<ScenarioSet>,
        start: Instant,
        seed: Option<u64>,
    ) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::new(config, scenarios, start, rng)
    }
}

impl<R: Rng> LiveController<R> {
    /// The first window can open as soon as `anomaly_gap_min` after an imaginary window that
    /// ended that long before `start`.
    pub fn new(config: LiveConfig, scenarios: Arc<ScenarioSet>, start: Instant, mut rng: R) -> Self {
        let last_anomaly_end = start
            .checked_sub(config.anomaly_gap_min)
            .unwrap_or(start);
        let gap = draw_gap(&mut rng, &config);
        Self {
            config,
            scenarios,
            rng,
            anomaly: None,
            last_anomaly_end,
            gap,
            incident_ends: None,
        }
    }

    /// The gap that must pass after the last window before the next one opens.
    pub fn current_gap(&self) -> Duration {
        self.gap
    }

    pub fn tick(&mut self, now: Instant, flag_present: bool) -> TickPlan {
        let mut plan = TickPlan::default();

        match (flag_present, self.incident_ends) {
            (true, None) => {
                self.incident_ends = Some(now + self.config.incident_duration);
                plan.transitions.push(ProgressEvent::IncidentStarted);
            }
            (false, Some(_)) => {
                self.incident_ends = None;
                plan.transitions.push(ProgressEvent::IncidentEnded { timed_out: false });
            }
            (true, Some(ends_at)) if now >= ends_at => {
                self.incident_ends = None;
                plan.clear_flag = true;
                plan.transitions.push(ProgressEvent::IncidentEnded { timed_out: true });
            }
            _ => {}
        }
        plan.business_incident = self.incident_ends.is_some();

        if self.anomaly.is_none() && now.saturating_duration_since(self.last_anomaly_end) >= self.gap {
            let incident = plan.business_incident;
            let candidate = self
                .scenarios
                .all()
                .iter()
                .enumerate()
                .filter(|(_, s)| !(incident && s.business_impact))
                .map(|(i, _)| i)
                .choose(&mut self.rng);

            if let Some(index) = candidate {
                let scenario = &self.scenarios.all()[index];
                self.anomaly = Some(ActiveAnomaly {
                    scenario: index,
                    ends_at: now + self.config.anomaly_duration,
                });
                plan.transitions.push(ProgressEvent::AnomalyStarted {
                    scenario: scenario.name.clone(),
                    service: scenario.service.clone(),
                });
            }
        }

        if let Some(active) = self.anomaly {
            if now >= active.ends_at {
                self.anomaly = None;
                self.last_anomaly_end = now;
                self.gap = draw_gap(&mut self.rng, &self.config);
                plan.transitions.push(ProgressEvent::AnomalyEnded);
            }
        }

        plan.scenario = self
            .anomaly
            .map(|active| self.scenarios.all()[active.scenario].clone());
        plan
    }
}

fn draw_gap<R: Rng>(rng: &mut R, config: &LiveConfig) -> Duration {
    let (min, max) = (config.anomaly_gap_min, config.anomaly_gap_max);
    if max <= min {
        return min;
    }
    rng.gen_range(min..max)
}

/// One record per service for this tick. The scenario's target service gets the anomalous
/// record; everyone else stays healthy.
pub fn tick_records<S: Synthesizer>(
    synth: &mut S,
    services: &ServicesConfig,
    plan: &TickPlan,
    timestamp: DateTime<Utc>,
) -> Vec<Record> {
    services
        .profiles
        .iter()
        .map(|service| match &plan.scenario {
            Some(scenario) if scenario.service == service.name => {
                synth.anomalous(timestamp, scenario)
            }
            _ => synth.healthy(
                timestamp,
                service,
                plan.business_incident && service.name == services.transaction_service,
            ),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::{ObservabilitySynthesizer, TransactionImpact};

    fn scenarios(with_impact: bool) -> Arc<ScenarioSet> {
        let mut list = vec![ScenarioSet::default_scenario()];
        if with_impact {
            let mut impact = ScenarioSet::default_scenario();
            impact.name = "Payment Degradation".to_string();
            impact.service = "payment-service".to_string();
            impact.business_impact = true;
            impact.transaction_impact = Some(TransactionImpact {
                success_rate_drop: 0.6,
                amount_reduction: 0.5,
            });
            list.push(impact);
        }
        Arc::new(ScenarioSet::new(list, &ServicesConfig::default()).unwrap())
    }

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    /// Runs whole-second ticks and returns the offsets at which a window was active.
    fn active_ticks(controller: &mut LiveController, start: Instant, ticks: u64) -> Vec<u64> {
        (0..ticks)
            .filter(|&t| controller.tick(start + secs(t), false).scenario.is_some())
            .collect()
    }

    #[test]
    fn test_anomaly_window_lasts_fifteen_ticks_then_waits_for_gap() {
        let start = Instant::now();
        let mut controller =
            LiveController::from_seed(LiveConfig::default(), scenarios(false), start, Some(7));
        let first_gap = controller.current_gap();
        assert!(first_gap >= secs(60) && first_gap < secs(90));

        // The first window opens once `first_gap` has passed since an end placed 60s back.
        let first_start = (first_gap - secs(60)).as_secs_f64().ceil() as u64;
        let mut active = Vec::new();
        let mut second_gap = None;
        for t in 0..400 {
            let plan = controller.tick(start + secs(t), false);
            if plan.transitions.contains(&ProgressEvent::AnomalyEnded) && second_gap.is_none() {
                second_gap = Some(controller.current_gap());
            }
            if plan.scenario.is_some() {
                active.push(t);
            }
        }

        let window: Vec<u64> = active.iter().copied().take_while(|&t| t < first_start + 15).collect();
        assert_eq!(window, (first_start..first_start + 15).collect::<Vec<_>>());

        let second_gap = second_gap.unwrap();
        assert!(second_gap >= secs(60) && second_gap < secs(90));
        let first_end = first_start + 15;
        let second_start = active[15];
        let waited = secs(second_start - first_end);
        assert!(waited >= second_gap, "waited {waited:?}, gap {second_gap:?}");
        assert!(waited < second_gap + secs(1));
    }

    #[test]
    fn test_same_seed_same_schedule() {
        let start = Instant::now();
        let mut a = LiveController::from_seed(LiveConfig::default(), scenarios(false), start, Some(3));
        let mut b = LiveController::from_seed(LiveConfig::default(), scenarios(false), start, Some(3));
        assert_eq!(active_ticks(&mut a, start, 600), active_ticks(&mut b, start, 600));
    }

    #[test]
    fn test_incident_times_out_and_requests_flag_clear() {
        let start = Instant::now();
        let mut controller =
            LiveController::from_seed(LiveConfig::default(), scenarios(true), start, Some(1));

        let plan = controller.tick(start, true);
        assert!(plan.business_incident);
        assert!(plan.transitions.contains(&ProgressEvent::IncidentStarted));
        assert_eq!(plan.status(), LiveStatus::BusinessIncident);

        assert!(controller.tick(start + secs(299), true).business_incident);

        let plan = controller.tick(start + secs(300), true);
        assert!(!plan.business_incident);
        assert!(plan.clear_flag);
        assert!(plan
            .transitions
            .contains(&ProgressEvent::IncidentEnded { timed_out: true }));
    }

    #[test]
    fn test_incident_ends_early_when_flag_disappears() {
        let start = Instant::now();
        let mut controller =
            LiveController::from_seed(LiveConfig::default(), scenarios(true), start, Some(1));
        controller.tick(start, true);
        let plan = controller.tick(start + secs(10), false);
        assert!(!plan.business_incident);
        assert!(!plan.clear_flag);
        assert!(plan
            .transitions
            .contains(&ProgressEvent::IncidentEnded { timed_out: false }));
    }

    #[test]
    fn test_incident_excludes_business_impact_scenarios() {
        let start = Instant::now();
        let mut controller =
            LiveController::from_seed(LiveConfig::default(), scenarios(true), start, Some(9));
        for t in 0..290 {
            let plan = controller.tick(start + secs(t), true);
            if let Some(scenario) = plan.scenario {
                assert!(!scenario.business_impact);
            }
        }
    }

    #[test]
    fn test_tick_records_route_anomaly_to_target_service() {
        let services = ServicesConfig::default();
        let set = scenarios(false);
        let mut synth =
            ObservabilitySynthesizer::from_seed(Arc::new(services.clone()), &set, Some(5)).unwrap();
        let plan = TickPlan {
            scenario: Some(set.all()[0].clone()),
            ..TickPlan::default()
        };

        let records = tick_records(&mut synth, &services, &plan, Utc::now());
        assert_eq!(records.len(), 4);
        assert!(records[0].anomaly && records[0].service == "market-data-feed");
        assert!(records[1..].iter().all(|r| !r.anomaly));
        assert!(records[2].transaction.is_some());
    }
}
