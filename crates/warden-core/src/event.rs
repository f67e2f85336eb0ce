use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::sync::Arc;
use tokio::sync::broadcast;

use crate::types::Severity;

/// Events emitted by the enforcement layer for observability and approval channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WardenEvent {
    // ── Circuit lifecycle ──────────────────────────────────────
    CircuitOpened {
        agent_id: String,
        reason: String,
    },
    CircuitHalfOpen {
        agent_id: String,
    },
    CircuitClosed {
        agent_id: String,
    },

    // ── Agent lifecycle ────────────────────────────────────────
    AgentHalted {
        agent_id: String,
        reason: String,
    },
    AgentResumed {
        agent_id: String,
    },
    AgentEvicted {
        agent_id: String,
    },
    TrustDemoted {
        agent_id: String,
        level: u8,
    },

    // ── Hold lifecycle ─────────────────────────────────────────
    HoldCreated {
        hold_id: Uuid,
        agent_id: String,
        tool: String,
        reason: String,
    },
    HoldApproved {
        hold_id: Uuid,
        decided_by: String,
    },
    HoldRejected {
        hold_id: Uuid,
        decided_by: String,
    },
    HoldExpired {
        hold_id: Uuid,
    },

    // ── Drift ──────────────────────────────────────────────────
    DriftDetected {
        alert_id: Uuid,
        agent_id: String,
        alert_type: String,
        severity: Severity,
    },
    TripwireFailed {
        agent_id: String,
        tripwire_id: String,
    },

    // ── System ─────────────────────────────────────────────────
    Heartbeat {
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for system-wide pub/sub.
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<WardenEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn publish(&self, event: WardenEvent) {
        // Ignore send errors (no subscribers).
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WardenEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(4096)
    }
}
