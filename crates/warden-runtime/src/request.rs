use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;
use warden_core::{InterceptorDecision, Severity, ToolResult};
use warden_safety::{BaselineComparison, HoldDecision};

/// One tool call an agent wants to make.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub agent_id: String,
    pub frame: String,
    pub tool: String,
    #[serde(default)]
    pub arguments: Value,
    /// The agent's own reading of the frame.
    #[serde(default)]
    pub interpretation: Option<String>,
    /// Skip the hold gate. Only honoured when `hold_id` names an approved hold for the
    /// same agent and tool.
    #[serde(default)]
    pub bypass_hold: bool,
    #[serde(default)]
    pub hold_id: Option<Uuid>,
    /// The decision being resumed under. The gatekeeper applies the stored copy.
    #[serde(default)]
    pub hold_decision: Option<HoldDecision>,
}

impl ExecuteRequest {
    pub fn new(agent_id: impl Into<String>, frame: impl Into<String>, tool: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            frame: frame.into(),
            tool: tool.into(),
            arguments: Value::Object(Default::default()),
            interpretation: None,
            bypass_hold: false,
            hold_id: None,
            hold_decision: None,
        }
    }

    pub fn with_arguments(mut self, arguments: Value) -> Self {
        self.arguments = arguments;
        self
    }

    pub fn with_interpretation(mut self, interpretation: impl Into<String>) -> Self {
        self.interpretation = Some(interpretation.into());
        self
    }

    /// Frame and arguments to run, after any amendment in an approved decision.
    pub(crate) fn effective_call<'a>(&'a self, decision: Option<&'a HoldDecision>) -> (&'a str, &'a Value) {
        let frame = decision
            .and_then(|d| d.modified_frame.as_deref())
            .unwrap_or(&self.frame);
        let arguments = decision
            .and_then(|d| d.modified_args.as_ref())
            .unwrap_or(&self.arguments);
        (frame, arguments)
    }
}

// ── Pre-flight trail ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gate {
    CircuitBreaker,
    Tripwire,
    Validation,
    DriftPrediction,
    Baseline,
    Confidence,
    Hold,
    Interceptor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateStatus {
    Passed,
    Failed,
    Blocked,
    Held,
    Skipped,
    Bypassed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateCheck {
    pub gate: Gate,
    pub status: GateStatus,
    pub detail: String,
}

/// Every gate a request went through, in order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreFlightCheck {
    pub checks: Vec<GateCheck>,
    pub blocked: bool,
    pub held: bool,
    pub passed: bool,
    pub predicted_drift: Option<f64>,
    pub baseline_deviation: Option<f64>,
    pub confidence: Option<f64>,
}

impl PreFlightCheck {
    pub(crate) fn record(&mut self, gate: Gate, status: GateStatus, detail: impl Into<String>) {
        match status {
            GateStatus::Blocked => self.blocked = true,
            GateStatus::Held => self.held = true,
            _ => {}
        }
        self.checks.push(GateCheck {
            gate,
            status,
            detail: detail.into(),
        });
    }

    pub fn gate(&self, gate: Gate) -> Option<&GateCheck> {
        self.checks.iter().find(|c| c.gate == gate)
    }
}

// ── Post-audit ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    BaselineDrift,
    InterpretationMismatch,
    BehaviorPatternChange,
    TripwireFailure,
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::BaselineDrift => "baseline_drift",
            Self::InterpretationMismatch => "interpretation_mismatch",
            Self::BehaviorPatternChange => "behavior_pattern_change",
            Self::TripwireFailure => "tripwire_failure",
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftAlert {
    pub alert_id: Uuid,
    pub agent_id: String,
    pub alert_type: AlertType,
    pub severity: Severity,
    pub message: String,
    pub detected_at: DateTime<Utc>,
    pub evidence: Value,
}

impl DriftAlert {
    pub fn new(
        agent_id: &str,
        alert_type: AlertType,
        severity: Severity,
        message: impl Into<String>,
        evidence: Value,
        detected_at: DateTime<Utc>,
    ) -> Self {
        Self {
            alert_id: Uuid::new_v4(),
            agent_id: agent_id.to_string(),
            alert_type,
            severity,
            message: message.into(),
            detected_at,
            evidence,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostAudit {
    pub comparison: BaselineComparison,
    pub behavior: Vec<String>,
    pub behavior_hash: String,
    pub alerts: Vec<DriftAlert>,
    /// The agent was halted as a result of this audit.
    pub halted: bool,
}

// ── Result ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteResult {
    pub success: bool,
    /// The request made it past every gate and the tool ran.
    pub allowed: bool,
    pub held: bool,
    pub hold_id: Option<Uuid>,
    pub result: Option<ToolResult>,
    pub error: Option<String>,
    /// Why the request was blocked or held.
    pub reason: Option<String>,
    pub pre_flight: PreFlightCheck,
    pub interceptor_decision: Option<InterceptorDecision>,
    pub post_audit: Option<PostAudit>,
}

impl ExecuteResult {
    pub(crate) fn blocked(reason: impl Into<String>, pre_flight: PreFlightCheck) -> Self {
        Self {
            success: false,
            allowed: false,
            held: false,
            hold_id: None,
            result: None,
            error: None,
            reason: Some(reason.into()),
            pre_flight,
            interceptor_decision: None,
            post_audit: None,
        }
    }

    pub(crate) fn held(hold_id: Uuid, reason: impl Into<String>, pre_flight: PreFlightCheck) -> Self {
        Self {
            held: true,
            hold_id: Some(hold_id),
            ..Self::blocked(reason, pre_flight)
        }
    }

    pub fn is_blocked(&self) -> bool {
        !self.allowed && !self.held
    }
}

/// One entry of an agent's execution history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub execution_id: Uuid,
    pub frame: String,
    pub tool: String,
    pub success: bool,
    pub behavior_hash: String,
    pub drift_score: f64,
    pub alerts: usize,
    pub timestamp: DateTime<Utc>,
}
