//! Human-in-the-loop holds.
//!
//! A hold parks an action until an operator approves or rejects it. Holds live in a single
//! book behind one lock, so the expiry sweep and hold creation never interleave: a hold the
//! sweep expires has left the pending set before anyone else can observe it.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use warden_config::SharedConfig;
use warden_core::{Clock, EventBus, Severity, WardenError, WardenEvent, matches_tool_pattern};

use crate::level::AutonomyLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldReason {
    DriftThresholdExceeded,
    BaselineDeviation,
    McpValidationPending,
    LowConfidence,
    ForbiddenOverride,
    CircuitBreakerTripped,
    ManualAutonomy,
}

impl fmt::Display for HoldReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::DriftThresholdExceeded => "drift_threshold_exceeded",
            Self::BaselineDeviation => "baseline_deviation",
            Self::McpValidationPending => "mcp_validation_pending",
            Self::LowConfidence => "low_confidence",
            Self::ForbiddenOverride => "forbidden_override",
            Self::CircuitBreakerTripped => "circuit_breaker_tripped",
            Self::ManualAutonomy => "manual_autonomy",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldState {
    Pending,
    Approved,
    Rejected,
    Expired,
}

/// The action a hold parks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeldAction {
    pub frame: String,
    pub tool: String,
    pub arguments: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldDecision {
    pub decided_by: String,
    pub decided_at: DateTime<Utc>,
    pub reason: Option<String>,
    pub approved: bool,
    /// Frame to execute instead of the held one.
    pub modified_frame: Option<String>,
    /// Arguments to execute instead of the held ones.
    pub modified_args: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldRequest {
    pub hold_id: Uuid,
    pub agent_id: String,
    pub action: HeldAction,
    pub reason: HoldReason,
    pub severity: Severity,
    pub evidence: Value,
    pub state: HoldState,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub decision: Option<HoldDecision>,
}

impl HoldRequest {
    pub fn is_pending(&self) -> bool {
        self.state == HoldState::Pending
    }

    pub fn is_approved(&self) -> bool {
        self.state == HoldState::Approved
    }
}

/// Everything the hold gate looks at besides the tool name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldSignals {
    pub breaker_blocked: bool,
    pub predicted_drift: Option<f64>,
    pub baseline_deviation: Option<f64>,
    pub confidence: Option<f64>,
    /// The resolved frame's bindings forbid the tool.
    pub forbidden_override: bool,
    pub autonomy: AutonomyLevel,
}

impl Default for HoldSignals {
    fn default() -> Self {
        Self {
            breaker_blocked: false,
            predicted_drift: None,
            baseline_deviation: None,
            confidence: None,
            forbidden_override: false,
            autonomy: AutonomyLevel::Supervised,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldVerdict {
    pub reason: HoldReason,
    pub severity: Severity,
    pub evidence: Value,
}

#[derive(Default)]
struct HoldBook {
    holds: HashMap<Uuid, HoldRequest>,
    pending: HashSet<Uuid>,
    /// Terminal holds in the order they were decided, oldest first.
    decided: VecDeque<Uuid>,
}

impl HoldBook {
    fn retire(&mut self, hold_id: Uuid, keep: usize) {
        self.pending.remove(&hold_id);
        self.decided.push_back(hold_id);
        while self.decided.len() > keep {
            if let Some(old) = self.decided.pop_front() {
                self.holds.remove(&old);
            }
        }
    }
}

pub struct HoldManager {
    book: Mutex<HoldBook>,
    config: SharedConfig,
    clock: Arc<dyn Clock>,
    events: Option<EventBus>,
}

impl HoldManager {
    pub fn new(config: SharedConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            book: Mutex::new(HoldBook::default()),
            config,
            clock,
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    fn publish(&self, event: WardenEvent) {
        if let Some(ref bus) = self.events {
            bus.publish(event);
        }
    }

    /// Decide whether an action must wait for a human. Pure over config and `signals`.
    pub fn should_hold(&self, tool: &str, signals: &HoldSignals) -> Option<HoldVerdict> {
        let cfg = self.config.read();

        if signals.breaker_blocked {
            return Some(HoldVerdict {
                reason: HoldReason::CircuitBreakerTripped,
                severity: Severity::Critical,
                evidence: json!({ "tool": tool }),
            });
        }
        if !signals.autonomy.allows_autonomous_action() {
            return Some(HoldVerdict {
                reason: HoldReason::ManualAutonomy,
                severity: Severity::Medium,
                evidence: json!({ "autonomy": signals.autonomy.to_string() }),
            });
        }
        if signals.forbidden_override {
            return Some(HoldVerdict {
                reason: HoldReason::ForbiddenOverride,
                severity: Severity::High,
                evidence: json!({ "tool": tool, "detail": "frame bindings forbid this tool" }),
            });
        }
        if let Some(drift) = signals.predicted_drift
            && drift >= cfg.drift.prediction_threshold
        {
            return Some(HoldVerdict {
                reason: HoldReason::DriftThresholdExceeded,
                severity: Severity::from_score(drift).max(Severity::Medium),
                evidence: json!({
                    "predicted_drift": drift,
                    "threshold": cfg.drift.prediction_threshold,
                }),
            });
        }
        if let Some(deviation) = signals.baseline_deviation
            && deviation >= cfg.drift.baseline_deviation_threshold
        {
            return Some(HoldVerdict {
                reason: HoldReason::BaselineDeviation,
                severity: Severity::Medium,
                evidence: json!({
                    "baseline_deviation": deviation,
                    "threshold": cfg.drift.baseline_deviation_threshold,
                }),
            });
        }
        if let Some(pattern) = cfg
            .hold
            .mcp_validation_tools
            .iter()
            .find(|p| matches_tool_pattern(p, tool))
        {
            return Some(HoldVerdict {
                reason: HoldReason::McpValidationPending,
                severity: Severity::Medium,
                evidence: json!({ "tool": tool, "pattern": pattern }),
            });
        }
        if let Some(confidence) = signals.confidence
            && confidence < cfg.drift.low_confidence_threshold
        {
            return Some(HoldVerdict {
                reason: HoldReason::LowConfidence,
                severity: Severity::Low,
                evidence: json!({
                    "confidence": confidence,
                    "threshold": cfg.drift.low_confidence_threshold,
                }),
            });
        }
        None
    }

    pub fn create_hold(&self, agent_id: &str, action: HeldAction, verdict: HoldVerdict) -> HoldRequest {
        let now = self.clock.now();
        let timeout = Duration::milliseconds(self.config.read().hold.timeout_ms as i64);
        let hold = HoldRequest {
            hold_id: Uuid::new_v4(),
            agent_id: agent_id.to_string(),
            action,
            reason: verdict.reason,
            severity: verdict.severity,
            evidence: verdict.evidence,
            state: HoldState::Pending,
            created_at: now,
            expires_at: now + timeout,
            decision: None,
        };
        {
            let mut book = self.book.lock();
            book.pending.insert(hold.hold_id);
            book.holds.insert(hold.hold_id, hold.clone());
        }
        info!(
            hold_id = %hold.hold_id,
            agent = %agent_id,
            tool = %hold.action.tool,
            reason = %hold.reason,
            severity = %hold.severity,
            "hold created"
        );
        self.publish(WardenEvent::HoldCreated {
            hold_id: hold.hold_id,
            agent_id: agent_id.to_string(),
            tool: hold.action.tool.clone(),
            reason: hold.reason.to_string(),
        });
        hold
    }

    pub fn approve_hold(
        &self,
        hold_id: Uuid,
        decided_by: &str,
        reason: Option<&str>,
    ) -> warden_core::Result<HoldRequest> {
        self.approve_hold_with(hold_id, decided_by, reason, None, None)
    }

    /// Approve with an amended frame and/or arguments for the eventual execution.
    pub fn approve_hold_with(
        &self,
        hold_id: Uuid,
        decided_by: &str,
        reason: Option<&str>,
        modified_frame: Option<String>,
        modified_args: Option<Value>,
    ) -> warden_core::Result<HoldRequest> {
        self.decide(hold_id, decided_by, reason, true, modified_frame, modified_args)
    }

    pub fn reject_hold(
        &self,
        hold_id: Uuid,
        decided_by: &str,
        reason: Option<&str>,
    ) -> warden_core::Result<HoldRequest> {
        self.decide(hold_id, decided_by, reason, false, None, None)
    }

    fn decide(
        &self,
        hold_id: Uuid,
        decided_by: &str,
        reason: Option<&str>,
        approved: bool,
        modified_frame: Option<String>,
        modified_args: Option<Value>,
    ) -> warden_core::Result<HoldRequest> {
        let now = self.clock.now();
        let keep = self.config.read().hold.max_decided;

        let (hold, event) = {
            let mut book = self.book.lock();
            let hold = book
                .holds
                .get_mut(&hold_id)
                .ok_or(WardenError::HoldNotFound(hold_id))?;

            if hold.state != HoldState::Pending {
                return Ok(hold.clone());
            }

            let event = if now > hold.expires_at {
                hold.state = HoldState::Expired;
                WardenEvent::HoldExpired { hold_id }
            } else {
                hold.state = if approved {
                    HoldState::Approved
                } else {
                    HoldState::Rejected
                };
                hold.decision = Some(HoldDecision {
                    decided_by: decided_by.to_string(),
                    decided_at: now,
                    reason: reason.map(str::to_string),
                    approved,
                    modified_frame,
                    modified_args,
                });
                if approved {
                    WardenEvent::HoldApproved {
                        hold_id,
                        decided_by: decided_by.to_string(),
                    }
                } else {
                    WardenEvent::HoldRejected {
                        hold_id,
                        decided_by: decided_by.to_string(),
                    }
                }
            };
            let hold = hold.clone();
            book.retire(hold_id, keep);
            (hold, event)
        };

        info!(hold_id = %hold_id, state = ?hold.state, decided_by, "hold decided");
        self.publish(event);
        Ok(hold)
    }

    /// Move every pending hold past its deadline to `expired` and return them.
    pub fn process_expired_holds(&self) -> Vec<HoldRequest> {
        let now = self.clock.now();
        let keep = self.config.read().hold.max_decided;

        let expired = {
            let mut book = self.book.lock();
            let due: Vec<Uuid> = book
                .pending
                .iter()
                .filter(|id| book.holds.get(*id).is_some_and(|h| now > h.expires_at))
                .copied()
                .collect();
            let mut expired = Vec::with_capacity(due.len());
            for id in due {
                if let Some(hold) = book.holds.get_mut(&id) {
                    hold.state = HoldState::Expired;
                    expired.push(hold.clone());
                }
                book.retire(id, keep);
            }
            expired
        };

        for hold in &expired {
            info!(hold_id = %hold.hold_id, agent = %hold.agent_id, "hold expired");
            self.publish(WardenEvent::HoldExpired {
                hold_id: hold.hold_id,
            });
        }
        expired
    }

    pub fn get_hold(&self, hold_id: Uuid) -> Option<HoldRequest> {
        self.book.lock().holds.get(&hold_id).cloned()
    }

    /// Pending holds, oldest first, optionally for one agent.
    pub fn pending_holds(&self, agent_id: Option<&str>) -> Vec<HoldRequest> {
        let book = self.book.lock();
        let mut holds: Vec<HoldRequest> = book
            .pending
            .iter()
            .filter_map(|id| book.holds.get(id))
            .filter(|h| agent_id.is_none_or(|a| h.agent_id == a))
            .cloned()
            .collect();
        holds.sort_by_key(|h| h.created_at);
        holds
    }

    pub fn pending_count(&self, agent_id: Option<&str>) -> usize {
        let book = self.book.lock();
        book.pending
            .iter()
            .filter_map(|id| book.holds.get(id))
            .filter(|h| agent_id.is_none_or(|a| h.agent_id == a))
            .count()
    }

    /// Drop every hold, pending or decided, belonging to the agent.
    pub fn evict_agent(&self, agent_id: &str) -> usize {
        let mut book = self.book.lock();
        let ids: Vec<Uuid> = book
            .holds
            .values()
            .filter(|h| h.agent_id == agent_id)
            .map(|h| h.hold_id)
            .collect();
        for id in &ids {
            book.holds.remove(id);
            book.pending.remove(id);
        }
        book.decided.retain(|id| !ids.contains(id));
        ids.len()
    }
}
