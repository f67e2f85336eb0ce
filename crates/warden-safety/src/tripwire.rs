//! Tripwires: planted frames with a known verdict.
//!
//! Every so often the gatekeeper runs a frame from one of two fixed pools through the
//! agent's validator before the real one. Valid tripwires must be accepted, invalid ones
//! rejected; a validator that gets a tripwire wrong is itself drifting.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, warn};
use warden_config::SharedConfig;
use warden_core::{Clock, EventBus, WardenEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripwireKind {
    Valid,
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripwireOutcome {
    Accepted,
    Rejected,
}

impl TripwireOutcome {
    fn from_valid(valid: bool) -> Self {
        if valid { Self::Accepted } else { Self::Rejected }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tripwire {
    pub id: &'static str,
    pub kind: TripwireKind,
    pub frame: &'static str,
    pub description: &'static str,
}

impl Tripwire {
    pub fn expected_outcome(&self) -> TripwireOutcome {
        match self.kind {
            TripwireKind::Valid => TripwireOutcome::Accepted,
            TripwireKind::Invalid => TripwireOutcome::Rejected,
        }
    }
}

const VALID: &[Tripwire] = &[
    Tripwire {
        id: "tw-valid-strict-finance",
        kind: TripwireKind::Valid,
        frame: "●◆→α",
        description: "strict finance execute by operator",
    },
    Tripwire {
        id: "tw-valid-balanced-review",
        kind: TripwireKind::Valid,
        frame: "◐▲↺β",
        description: "balanced engineering review by agent",
    },
    Tripwire {
        id: "tw-valid-permissive-query",
        kind: TripwireKind::Valid,
        frame: "○◇?Ω",
        description: "permissive operations query by system",
    },
    Tripwire {
        id: "tw-valid-legal-forbid",
        kind: TripwireKind::Valid,
        frame: "●■⊘α",
        description: "strict legal forbid by operator",
    },
    Tripwire {
        id: "tw-valid-read-only",
        kind: TripwireKind::Valid,
        frame: "◐◆?β⊥",
        description: "balanced finance query, read-only",
    },
];

const INVALID: &[Tripwire] = &[
    Tripwire {
        id: "tw-invalid-duplicate-mode",
        kind: TripwireKind::Invalid,
        frame: "●●◆→",
        description: "mode repeated",
    },
    Tripwire {
        id: "tw-invalid-duplicate-domain",
        kind: TripwireKind::Invalid,
        frame: "●◆◆→",
        description: "domain repeated",
    },
    Tripwire {
        id: "tw-invalid-too-short",
        kind: TripwireKind::Invalid,
        frame: "●",
        description: "below minimum length",
    },
    Tripwire {
        id: "tw-invalid-conflicting-mode",
        kind: TripwireKind::Invalid,
        frame: "●○◆→",
        description: "strict and permissive together",
    },
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripwireResult {
    pub tripwire_id: String,
    pub kind: TripwireKind,
    pub frame: String,
    pub expected_outcome: TripwireOutcome,
    pub actual_outcome: TripwireOutcome,
    pub passed: bool,
    pub agent_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripwireSuiteReport {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub results: Vec<TripwireResult>,
}

impl TripwireSuiteReport {
    pub fn pass_rate(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.passed as f64 / self.total as f64
    }
}

/// Uniform draw in `[0, 1)`. Injected so tests can make tripwire placement deterministic.
pub type Sampler = Arc<dyn Fn() -> f64 + Send + Sync>;

pub struct TripwireInjector {
    results: Mutex<VecDeque<TripwireResult>>,
    config: SharedConfig,
    clock: Arc<dyn Clock>,
    sampler: Sampler,
    events: Option<EventBus>,
}

impl TripwireInjector {
    pub fn new(config: SharedConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            results: Mutex::new(VecDeque::new()),
            config,
            clock,
            sampler: Arc::new(rand::random::<f64>),
            events: None,
        }
    }

    pub fn with_sampler(mut self, sampler: Sampler) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Every tripwire, valid pool first.
    pub fn tripwires() -> impl Iterator<Item = &'static Tripwire> {
        VALID.iter().chain(INVALID.iter())
    }

    pub fn find(tripwire_id: &str) -> Option<&'static Tripwire> {
        Self::tripwires().find(|t| t.id == tripwire_id)
    }

    /// Bernoulli draw at `tripwire.rate`.
    pub fn should_inject(&self) -> bool {
        let (enabled, rate) = {
            let cfg = self.config.read();
            (cfg.tripwire.enabled, cfg.tripwire.rate)
        };
        enabled && rate > 0.0 && (self.sampler)() < rate
    }

    /// Pick a tripwire to plant.
    pub fn plant(&self) -> &'static Tripwire {
        let pool: Vec<&'static Tripwire> = Self::tripwires().collect();
        let idx = ((self.sampler)() * pool.len() as f64) as usize;
        pool[idx.min(pool.len() - 1)]
    }

    /// Score a planted tripwire against the verdict the validator returned, and record it.
    pub fn evaluate(&self, tripwire: &Tripwire, agent_id: &str, accepted: bool) -> TripwireResult {
        let actual = TripwireOutcome::from_valid(accepted);
        let result = TripwireResult {
            tripwire_id: tripwire.id.to_string(),
            kind: tripwire.kind,
            frame: tripwire.frame.to_string(),
            expected_outcome: tripwire.expected_outcome(),
            actual_outcome: actual,
            passed: actual == tripwire.expected_outcome(),
            agent_id: agent_id.to_string(),
            timestamp: self.clock.now(),
        };

        if result.passed {
            debug!(agent = %agent_id, tripwire = tripwire.id, "tripwire passed");
        } else {
            warn!(
                agent = %agent_id,
                tripwire = tripwire.id,
                frame = tripwire.frame,
                expected = ?result.expected_outcome,
                actual = ?result.actual_outcome,
                "tripwire failed"
            );
            if let Some(ref bus) = self.events {
                bus.publish(WardenEvent::TripwireFailed {
                    agent_id: agent_id.to_string(),
                    tripwire_id: tripwire.id.to_string(),
                });
            }
        }

        let cap = self.config.read().tripwire.max_results.max(1);
        let mut results = self.results.lock();
        results.push_back(result.clone());
        while results.len() > cap {
            results.pop_front();
        }
        result
    }

    /// Plant a random tripwire and run it through `validate`.
    pub fn inject<F>(&self, agent_id: &str, validate: F) -> TripwireResult
    where
        F: Fn(&str) -> bool,
    {
        let tripwire = self.plant();
        let accepted = validate(tripwire.frame);
        self.evaluate(tripwire, agent_id, accepted)
    }

    /// Run one named tripwire. `None` if the id is unknown.
    pub fn inject_specific<F>(
        &self,
        agent_id: &str,
        tripwire_id: &str,
        validate: F,
    ) -> Option<TripwireResult>
    where
        F: Fn(&str) -> bool,
    {
        let tripwire = Self::find(tripwire_id)?;
        let accepted = validate(tripwire.frame);
        Some(self.evaluate(tripwire, agent_id, accepted))
    }

    /// Run every tripwire through `validate`.
    pub fn run_all_tests<F>(&self, agent_id: &str, validate: F) -> TripwireSuiteReport
    where
        F: Fn(&str) -> bool,
    {
        let results: Vec<TripwireResult> = Self::tripwires()
            .map(|t| {
                let accepted = validate(t.frame);
                self.evaluate(t, agent_id, accepted)
            })
            .collect();
        Self::report(results)
    }

    pub fn report(results: Vec<TripwireResult>) -> TripwireSuiteReport {
        let passed = results.iter().filter(|r| r.passed).count();
        TripwireSuiteReport {
            total: results.len(),
            passed,
            failed: results.len() - passed,
            results,
        }
    }

    /// Share of this agent's recorded tripwires that failed; 0 with no record.
    pub fn failure_rate(&self, agent_id: &str) -> f64 {
        let results = self.results.lock();
        let (total, failed) = results
            .iter()
            .filter(|r| r.agent_id == agent_id)
            .fold((0usize, 0usize), |(t, f), r| (t + 1, f + usize::from(!r.passed)));
        if total == 0 {
            0.0
        } else {
            failed as f64 / total as f64
        }
    }

    pub fn results(&self, agent_id: Option<&str>) -> Vec<TripwireResult> {
        self.results
            .lock()
            .iter()
            .filter(|r| agent_id.is_none_or(|a| r.agent_id == a))
            .cloned()
            .collect()
    }

    pub fn evict_agent(&self, agent_id: &str) {
        self.results.lock().retain(|r| r.agent_id != agent_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_config::{WardenConfig, shared};
    use warden_core::{ManualClock, SymbolicValidator};

    fn injector(rate: f64, draw: f64) -> TripwireInjector {
        let mut config = WardenConfig::default();
        config.tripwire.rate = rate;
        TripwireInjector::new(shared(config), Arc::new(ManualClock::default()))
            .with_sampler(Arc::new(move || draw))
    }

    #[test]
    fn test_pools_agree_with_reference_validator() {
        for t in TripwireInjector::tripwires() {
            let valid = SymbolicValidator.accepts(t.frame);
            assert_eq!(valid, t.kind == TripwireKind::Valid, "{}", t.id);
        }
    }

    #[test]
    fn test_should_inject_follows_sampler() {
        assert!(injector(0.05, 0.01).should_inject());
        assert!(!injector(0.05, 0.5).should_inject());
        assert!(!injector(0.0, 0.0).should_inject());
    }

    #[test]
    fn test_plant_maps_draw_onto_pool() {
        assert_eq!(injector(1.0, 0.0).plant().id, "tw-valid-strict-finance");
        assert_eq!(injector(1.0, 0.999).plant().id, "tw-invalid-conflicting-mode");
    }

    #[test]
    fn test_results_ring_is_capped() {
        let mut config = WardenConfig::default();
        config.tripwire.max_results = 3;
        let injector = TripwireInjector::new(shared(config), Arc::new(ManualClock::default()));
        for _ in 0..5 {
            injector.inject_specific("a1", "tw-invalid-too-short", |_| true);
        }
        assert_eq!(injector.results(None).len(), 3);
    }
}
