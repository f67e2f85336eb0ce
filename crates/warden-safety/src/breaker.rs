//! Per-agent circuit breaker.
//!
//! ```text
//!            failures ≥ threshold / drift ≥ threshold / halt
//!   closed ─────────────────────────────────────────────────▶ open
//!     ▲                                                        │
//!     │ successes ≥ threshold          open_timeout elapsed    │
//!     │                                (checked on query)      ▼
//!     └─────────────────────────────── half_open ◀─────────────┘
//!                                        │  any failure
//!                                        └──────────────▶ open
//! ```
//!
//! Circuits opened by an operator halt carry `manual = true` and never time out into
//! half-open; only [`CircuitBreaker::close_circuit`] or
//! [`CircuitBreaker::half_open_circuit`] releases them.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use warden_config::SharedConfig;
use warden_core::{Clock, EventBus, WardenEvent};

use crate::trust::TrustLedger;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerState {
    pub agent_id: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    /// Set while open or half-open.
    pub opened_at: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
    pub reason: Option<String>,
    pub last_drift_score: Option<f64>,
    /// Opened by an operator halt rather than by failures or drift.
    pub manual: bool,
}

impl CircuitBreakerState {
    fn new(agent_id: &str) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            opened_at: None,
            last_failure: None,
            reason: None,
            last_drift_score: None,
            manual: false,
        }
    }
}

/// Answer to "may this agent act right now?".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitCheck {
    pub allowed: bool,
    pub state: CircuitState,
    pub reason: Option<String>,
}

/// Transition produced while an entry was locked, announced after the lock is released.
enum Transition {
    Opened { reason: String },
    HalfOpened,
    Closed,
}

pub struct CircuitBreaker {
    states: DashMap<String, CircuitBreakerState>,
    config: SharedConfig,
    clock: Arc<dyn Clock>,
    trust: Option<Arc<TrustLedger>>,
    events: Option<EventBus>,
}

impl CircuitBreaker {
    pub fn new(config: SharedConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            states: DashMap::new(),
            config,
            clock,
            trust: None,
            events: None,
        }
    }

    /// Demote the agent's autonomy level in this ledger every time a circuit opens.
    pub fn with_trust(mut self, trust: Arc<TrustLedger>) -> Self {
        self.trust = Some(trust);
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Whether the agent may act. Performs the lazy open → half-open transition.
    pub fn is_allowed(&self, agent_id: &str) -> bool {
        self.check(agent_id).allowed
    }

    /// Like [`is_allowed`](Self::is_allowed), with the state and the reason for a block.
    pub fn check(&self, agent_id: &str) -> CircuitCheck {
        let timeout = Duration::seconds(self.config.read().breaker.open_timeout_secs as i64);
        let now = self.clock.now();

        let (check, transition) = match self.states.get_mut(agent_id) {
            None => (
                CircuitCheck {
                    allowed: true,
                    state: CircuitState::Closed,
                    reason: None,
                },
                None,
            ),
            Some(mut entry) => {
                let mut transition = None;
                if entry.state == CircuitState::Open
                    && !entry.manual
                    && entry.opened_at.is_some_and(|at| now - at > timeout)
                {
                    entry.state = CircuitState::HalfOpen;
                    entry.success_count = 0;
                    transition = Some(Transition::HalfOpened);
                }
                let check = CircuitCheck {
                    allowed: entry.state != CircuitState::Open,
                    state: entry.state,
                    reason: match entry.state {
                        CircuitState::Open => Some(format!(
                            "circuit open: {}",
                            entry.reason.as_deref().unwrap_or("no reason recorded")
                        )),
                        _ => None,
                    },
                };
                (check, transition)
            }
        };

        if let Some(t) = transition {
            self.announce(agent_id, t);
        }
        check
    }

    pub fn record_success(&self, agent_id: &str) {
        let needed = self.config.read().breaker.success_threshold;
        let transition = {
            let mut entry = self.entry(agent_id);
            match entry.state {
                CircuitState::Closed => {
                    entry.failure_count = 0;
                    None
                }
                CircuitState::HalfOpen => {
                    entry.success_count += 1;
                    if entry.success_count >= needed {
                        Self::close(&mut entry);
                        Some(Transition::Closed)
                    } else {
                        None
                    }
                }
                CircuitState::Open => {
                    debug!(agent = %agent_id, "success recorded while open, ignoring");
                    None
                }
            }
        };
        if let Some(t) = transition {
            self.announce(agent_id, t);
        }
    }

    pub fn record_failure(&self, agent_id: &str, reason: &str) {
        let threshold = self.config.read().breaker.failure_threshold;
        let now = self.clock.now();
        let transition = {
            let mut entry = self.entry(agent_id);
            entry.last_failure = Some(now);
            entry.failure_count += 1;
            match entry.state {
                CircuitState::Closed if entry.failure_count >= threshold => {
                    let reason = format!("{} consecutive failures, last: {}", entry.failure_count, reason);
                    Self::open(&mut entry, now, reason.clone(), false);
                    Some(Transition::Opened { reason })
                }
                CircuitState::HalfOpen => {
                    let reason = format!("failure while half-open: {}", reason);
                    Self::open(&mut entry, now, reason.clone(), false);
                    Some(Transition::Opened { reason })
                }
                _ => None,
            }
        };
        if let Some(t) = transition {
            self.announce(agent_id, t);
        }
    }

    /// Feed a post-execution drift score. A score at or above the threshold opens the circuit.
    pub fn record_drift(&self, agent_id: &str, score: f64) {
        let threshold = self.config.read().breaker.drift_score_threshold;
        let now = self.clock.now();
        let transition = {
            let mut entry = self.entry(agent_id);
            entry.last_drift_score = Some(score);
            if score >= threshold && entry.state != CircuitState::Open {
                let reason = format!("drift score {:.3} ≥ {:.3}", score, threshold);
                Self::open(&mut entry, now, reason.clone(), false);
                Some(Transition::Opened { reason })
            } else {
                None
            }
        };
        if let Some(t) = transition {
            self.announce(agent_id, t);
        }
    }

    /// Operator halt: open the circuit and keep it open until explicitly released.
    pub fn open_circuit(&self, agent_id: &str, reason: &str) {
        let now = self.clock.now();
        let transition = {
            let mut entry = self.entry(agent_id);
            let was_open = entry.state == CircuitState::Open;
            Self::open(&mut entry, now, reason.to_string(), true);
            (!was_open).then(|| Transition::Opened {
                reason: reason.to_string(),
            })
        };
        if let Some(t) = transition {
            self.announce(agent_id, t);
        }
    }

    pub fn close_circuit(&self, agent_id: &str) {
        let transition = {
            let mut entry = self.entry(agent_id);
            let was_closed = entry.state == CircuitState::Closed;
            Self::close(&mut entry);
            (!was_closed).then_some(Transition::Closed)
        };
        if let Some(t) = transition {
            self.announce(agent_id, t);
        }
    }

    pub fn half_open_circuit(&self, agent_id: &str) {
        let now = self.clock.now();
        let transition = {
            let mut entry = self.entry(agent_id);
            let was_half_open = entry.state == CircuitState::HalfOpen;
            entry.state = CircuitState::HalfOpen;
            entry.success_count = 0;
            entry.manual = false;
            if entry.opened_at.is_none() {
                entry.opened_at = Some(now);
            }
            (!was_half_open).then_some(Transition::HalfOpened)
        };
        if let Some(t) = transition {
            self.announce(agent_id, t);
        }
    }

    pub fn state(&self, agent_id: &str) -> Option<CircuitBreakerState> {
        self.states.get(agent_id).map(|s| s.clone())
    }

    pub fn all_states(&self) -> Vec<CircuitBreakerState> {
        self.states.iter().map(|s| s.value().clone()).collect()
    }

    pub fn evict(&self, agent_id: &str) -> bool {
        self.states.remove(agent_id).is_some()
    }

    fn entry(
        &self,
        agent_id: &str,
    ) -> dashmap::mapref::one::RefMut<'_, String, CircuitBreakerState> {
        self.states
            .entry(agent_id.to_string())
            .or_insert_with(|| CircuitBreakerState::new(agent_id))
    }

    fn open(state: &mut CircuitBreakerState, now: DateTime<Utc>, reason: String, manual: bool) {
        state.state = CircuitState::Open;
        state.opened_at = Some(now);
        state.success_count = 0;
        state.reason = Some(reason);
        state.manual = manual;
    }

    fn close(state: &mut CircuitBreakerState) {
        state.state = CircuitState::Closed;
        state.failure_count = 0;
        state.success_count = 0;
        state.opened_at = None;
        state.reason = None;
        state.manual = false;
    }

    fn announce(&self, agent_id: &str, transition: Transition) {
        let event = match transition {
            Transition::Opened { reason } => {
                warn!(agent = %agent_id, %reason, "circuit opened");
                if let Some(ref trust) = self.trust {
                    trust.demote(agent_id, "circuit opened");
                }
                WardenEvent::CircuitOpened {
                    agent_id: agent_id.to_string(),
                    reason,
                }
            }
            Transition::HalfOpened => {
                info!(agent = %agent_id, "circuit half-open, probing");
                WardenEvent::CircuitHalfOpen {
                    agent_id: agent_id.to_string(),
                }
            }
            Transition::Closed => {
                info!(agent = %agent_id, "circuit closed");
                WardenEvent::CircuitClosed {
                    agent_id: agent_id.to_string(),
                }
            }
        };
        if let Some(ref bus) = self.events {
            bus.publish(event);
        }
    }
}
