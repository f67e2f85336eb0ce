use serde::{Deserialize, Serialize};
use warden_core::{Health, Severity};
use warden_safety::{AutonomyLevel, CircuitState};

use crate::request::DriftAlert;

/// Alerts considered when grading an agent.
pub(crate) const RECENT_ALERTS: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentHealth {
    pub agent_id: String,
    pub health: Health,
    pub breaker_state: CircuitState,
    pub breaker_reason: Option<String>,
    pub failure_count: u32,
    pub pending_holds: usize,
    pub recent_alerts: Vec<DriftAlert>,
    pub autonomy: AutonomyLevel,
    pub tripwire_failure_rate: f64,
    pub active_frame: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemHealth {
    pub health: Health,
    pub agents: usize,
    pub halted: usize,
    pub critical: usize,
    pub warning: usize,
    pub healthy: usize,
    pub pending_holds: usize,
    pub open_circuits: usize,
}

/// Grade one agent: a manual halt wins, then an automatically opened circuit or a
/// critical alert, then anything that deserves a look.
pub(crate) fn grade_agent(
    state: CircuitState,
    manual: bool,
    recent_alerts: &[DriftAlert],
    pending_holds: usize,
    tripwire_failure_rate: f64,
) -> Health {
    let worst = recent_alerts.iter().map(|a| a.severity).max();
    match state {
        CircuitState::Open if manual => Health::Halted,
        CircuitState::Open => Health::Critical,
        _ if worst == Some(Severity::Critical) => Health::Critical,
        CircuitState::HalfOpen => Health::Warning,
        _ if worst == Some(Severity::High) => Health::Warning,
        _ if pending_holds > 0 || tripwire_failure_rate > 0.0 => Health::Warning,
        _ => Health::Healthy,
    }
}

pub(crate) fn summarize(agents: &[AgentHealth], pending_holds: usize) -> SystemHealth {
    let count = |h: Health| agents.iter().filter(|a| a.health == h).count();
    let halted = count(Health::Halted);
    let critical = count(Health::Critical);
    let warning = count(Health::Warning);
    let healthy = count(Health::Healthy);

    let health = if !agents.is_empty() && halted == agents.len() {
        Health::Halted
    } else if critical > 0 {
        Health::Critical
    } else if halted > 0 || warning > 0 {
        Health::Warning
    } else {
        Health::Healthy
    };

    SystemHealth {
        health,
        agents: agents.len(),
        halted,
        critical,
        warning,
        healthy,
        pending_holds,
        open_circuits: agents
            .iter()
            .filter(|a| a.breaker_state == CircuitState::Open)
            .count(),
    }
}
