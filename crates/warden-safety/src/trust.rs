//! Per-agent trust calibration.
//!
//! Each execution the gatekeeper completes is a calibration sample: a clean run is a hit,
//! a run that raised drift alerts is a miss. A sustained streak of hits promotes the agent,
//! a critical miss demotes it. The circuit breaker also demotes through [`TrustLedger::demote`],
//! a zero-weight critical miss that moves the level without touching the statistics.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use warden_config::SharedConfig;
use warden_core::{Clock, EventBus, Severity, WardenEvent};

use crate::level::AutonomyLevel;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustState {
    pub agent_id: String,
    pub level: AutonomyLevel,
    pub hits: u64,
    pub misses: u64,
    /// Consecutive hits since the last miss or promotion.
    pub streak: u32,
    pub changed_at: DateTime<Utc>,
}

pub struct TrustLedger {
    states: DashMap<String, TrustState>,
    config: SharedConfig,
    clock: Arc<dyn Clock>,
    events: Option<EventBus>,
}

impl TrustLedger {
    pub fn new(config: SharedConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            states: DashMap::new(),
            config,
            clock,
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    fn initial_level(&self) -> AutonomyLevel {
        AutonomyLevel::from_u8(self.config.read().trust.initial_level)
    }

    fn fresh(&self, agent_id: &str) -> TrustState {
        TrustState {
            agent_id: agent_id.to_string(),
            level: self.initial_level(),
            hits: 0,
            misses: 0,
            streak: 0,
            changed_at: self.clock.now(),
        }
    }

    /// Current level; untracked agents report the configured initial level.
    pub fn level(&self, agent_id: &str) -> AutonomyLevel {
        self.states
            .get(agent_id)
            .map(|s| s.level)
            .unwrap_or_else(|| self.initial_level())
    }

    pub fn state(&self, agent_id: &str) -> Option<TrustState> {
        self.states.get(agent_id).map(|s| s.clone())
    }

    /// Record a clean execution. Returns the level after any promotion.
    pub fn record_hit(&self, agent_id: &str) -> AutonomyLevel {
        let (streak_needed, ceiling) = {
            let cfg = self.config.read();
            (
                cfg.trust.promotion_streak,
                AutonomyLevel::from_u8(cfg.trust.max_level),
            )
        };
        let mut entry = self
            .states
            .entry(agent_id.to_string())
            .or_insert_with(|| self.fresh(agent_id));
        entry.hits += 1;
        entry.streak += 1;
        if streak_needed > 0 && entry.streak >= streak_needed && entry.level < ceiling {
            entry.level = entry.level.promoted(ceiling);
            entry.streak = 0;
            entry.changed_at = self.clock.now();
            info!(agent = %agent_id, level = %entry.level, "autonomy level promoted");
        }
        entry.level
    }

    /// Record an execution that raised an alert. A critical miss demotes one level.
    pub fn record_miss(&self, agent_id: &str, severity: Severity) -> AutonomyLevel {
        let demoted = {
            let mut entry = self
                .states
                .entry(agent_id.to_string())
                .or_insert_with(|| self.fresh(agent_id));
            entry.misses += 1;
            entry.streak = 0;
            if severity == Severity::Critical {
                Self::step_down(&mut entry, self.clock.now())
            } else {
                None
            }
        };
        if let Some(level) = demoted {
            self.announce_demotion(agent_id, level, "critical miss");
        }
        self.level(agent_id)
    }

    /// Demote one level without recording a calibration sample.
    pub fn demote(&self, agent_id: &str, reason: &str) -> AutonomyLevel {
        let demoted = {
            let mut entry = self
                .states
                .entry(agent_id.to_string())
                .or_insert_with(|| self.fresh(agent_id));
            Self::step_down(&mut entry, self.clock.now())
        };
        if let Some(level) = demoted {
            self.announce_demotion(agent_id, level, reason);
        }
        self.level(agent_id)
    }

    fn step_down(state: &mut TrustState, now: DateTime<Utc>) -> Option<AutonomyLevel> {
        let next = state.level.demoted();
        if next == state.level {
            return None;
        }
        state.level = next;
        state.changed_at = now;
        Some(next)
    }

    fn announce_demotion(&self, agent_id: &str, level: AutonomyLevel, reason: &str) {
        warn!(agent = %agent_id, %level, reason, "autonomy level demoted");
        if let Some(ref bus) = self.events {
            bus.publish(WardenEvent::TrustDemoted {
                agent_id: agent_id.to_string(),
                level: level.as_u8(),
            });
        }
    }

    pub fn evict(&self, agent_id: &str) -> bool {
        self.states.remove(agent_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
