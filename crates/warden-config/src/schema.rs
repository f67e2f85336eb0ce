use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration, read from `warden.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    pub breaker: BreakerConfig,
    pub drift: DriftConfig,
    pub hold: HoldConfig,
    pub tripwire: TripwireConfig,
    pub agents: AgentsConfig,
    pub trust: TrustConfig,
    pub logging: LoggingConfig,
}

// ── Circuit breaker ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures (while closed) that open the circuit.
    pub failure_threshold: u32,
    /// Successes while half-open needed to close the circuit again.
    pub success_threshold: u32,
    /// Seconds an automatically opened circuit stays open before probing (half-open).
    pub open_timeout_secs: u64,
    /// A recorded drift score at or above this opens the circuit.
    pub drift_score_threshold: f64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            open_timeout_secs: 60,
            drift_score_threshold: 0.25,
        }
    }
}

// ── Drift ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftConfig {
    /// Predicted drift at or above this holds the action for review.
    pub prediction_threshold: f64,
    /// Predicted drift at or above this blocks the action outright.
    pub block_threshold: f64,
    /// Share of planned behaviors missing from the baseline that triggers a hold.
    pub baseline_deviation_threshold: f64,
    /// Frame confidence below this triggers a hold.
    pub low_confidence_threshold: f64,
    /// Behavior-pattern drift is evaluated only once an identical frame has more than this
    /// many prior executions.
    pub pattern_min_history: usize,
    /// Number of most recent same-frame executions compared against.
    pub pattern_window: usize,
    /// Share of the window that must match the current behavior hash.
    pub pattern_similarity_threshold: f64,
    /// Halt the agent when post-audit raises a critical alert.
    pub halt_on_critical: bool,
    /// Halt the agent when post-audit raises a high alert.
    pub halt_on_high: bool,
    /// Length of the structural embedding vector.
    pub embedding_dims: usize,
    /// Interceptor denials kept per agent in the drift store.
    pub max_violations_per_agent: usize,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            prediction_threshold: 0.3,
            block_threshold: 0.9,
            baseline_deviation_threshold: 0.5,
            low_confidence_threshold: 0.6,
            pattern_min_history: 10,
            pattern_window: 10,
            pattern_similarity_threshold: 0.5,
            halt_on_critical: true,
            halt_on_high: false,
            embedding_dims: 128,
            max_violations_per_agent: 100,
        }
    }
}

// ── Holds ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HoldConfig {
    /// Milliseconds a pending hold waits for a decision before it can be swept as expired.
    pub timeout_ms: u64,
    /// Tool-name patterns that always require review (`dangerous_*`, `*_sensitive`, exact).
    pub mcp_validation_tools: Vec<String>,
    /// Decided (terminal) holds retained for lookup.
    pub max_decided: usize,
}

impl Default for HoldConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 300_000,
            mcp_validation_tools: vec![],
            max_decided: 1_000,
        }
    }
}

// ── Tripwires ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TripwireConfig {
    pub enabled: bool,
    /// Probability (0.0–1.0) that a validation is preceded by a planted frame.
    pub rate: f64,
    /// Results kept in the global ring.
    pub max_results: usize,
}

impl Default for TripwireConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rate: 0.05,
            max_results: 10_000,
        }
    }
}

// ── Agents / eviction ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentsConfig {
    /// Agents tracked at once; the least recently used is evicted beyond this.
    pub max_agents: usize,
    /// Seconds of inactivity after which an agent is evicted by the sweep.
    pub inactivity_timeout_secs: u64,
    /// Executions retained per agent.
    pub max_history: usize,
    /// Drift alerts retained across all agents.
    pub max_alerts: usize,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            max_agents: 1_000,
            inactivity_timeout_secs: 3_600,
            max_history: 100,
            max_alerts: 10_000,
        }
    }
}

// ── Trust ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustConfig {
    /// Starting autonomy level: 0 = manual … 4 = full auto.
    pub initial_level: u8,
    /// Consecutive clean executions that promote an agent one level.
    pub promotion_streak: u32,
    /// Highest level promotion can reach.
    pub max_level: u8,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            initial_level: 2,
            promotion_streak: 25,
            max_level: 3,
        }
    }
}

// ── Logging ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Output format: "pretty", "json", "compact".
    pub format: String,
    /// Log file path (None = stdout only).
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
            file: None,
        }
    }
}

// ── Validation ─────────────────────────────────────────────────

/// A single config validation issue.
#[derive(Debug)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
    pub severity: WarningSeverity,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningSeverity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self.severity {
            WarningSeverity::Error => "error",
            WarningSeverity::Warning => "warning",
            WarningSeverity::Info => "info",
        };
        write!(f, "[{}] {}: {}", tag, self.field, self.message)?;
        if let Some(ref h) = self.hint {
            write!(f, "\n   ↳ {}", h)?;
        }
        Ok(())
    }
}

fn unit_interval(value: f64) -> bool {
    (0.0..=1.0).contains(&value)
}

impl WardenConfig {
    /// Validate the config and return a list of warnings/errors.
    /// Returns `Err` with all messages joined if any severity is Error.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, String> {
        let mut warnings = Vec::new();

        // ── Breaker ───
        if self.breaker.failure_threshold == 0 {
            warnings.push(ConfigWarning {
                field: "breaker.failure_threshold".into(),
                message: "threshold is 0: every agent would start tripped".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 5".into()),
            });
        }
        if self.breaker.success_threshold == 0 {
            warnings.push(ConfigWarning {
                field: "breaker.success_threshold".into(),
                message: "threshold is 0: half-open circuits close without evidence".into(),
                severity: WarningSeverity::Warning,
                hint: Some("Set to e.g. 3".into()),
            });
        }
        if self.breaker.open_timeout_secs == 0 {
            warnings.push(ConfigWarning {
                field: "breaker.open_timeout_secs".into(),
                message: "open circuits probe immediately".into(),
                severity: WarningSeverity::Warning,
                hint: Some("A timeout of 30–120 seconds is typical".into()),
            });
        }
        if !unit_interval(self.breaker.drift_score_threshold) {
            warnings.push(ConfigWarning {
                field: "breaker.drift_score_threshold".into(),
                message: format!(
                    "threshold {} is outside [0, 1]",
                    self.breaker.drift_score_threshold
                ),
                severity: WarningSeverity::Error,
                hint: Some("Drift scores range 0.0-1.0".into()),
            });
        }

        // ── Drift ───
        for (field, value) in [
            ("drift.prediction_threshold", self.drift.prediction_threshold),
            ("drift.block_threshold", self.drift.block_threshold),
            (
                "drift.baseline_deviation_threshold",
                self.drift.baseline_deviation_threshold,
            ),
            ("drift.low_confidence_threshold", self.drift.low_confidence_threshold),
            (
                "drift.pattern_similarity_threshold",
                self.drift.pattern_similarity_threshold,
            ),
        ] {
            if !unit_interval(value) {
                warnings.push(ConfigWarning {
                    field: field.into(),
                    message: format!("{} is outside [0, 1]", value),
                    severity: WarningSeverity::Error,
                    hint: None,
                });
            }
        }
        if self.drift.block_threshold < self.drift.prediction_threshold {
            warnings.push(ConfigWarning {
                field: "drift.block_threshold".into(),
                message: "block threshold is below the hold threshold: drift never reaches review".into(),
                severity: WarningSeverity::Warning,
                hint: Some("Keep block_threshold above prediction_threshold".into()),
            });
        }
        if self.drift.pattern_window == 0 {
            warnings.push(ConfigWarning {
                field: "drift.pattern_window".into(),
                message: "window is 0: behavior-pattern drift is disabled".into(),
                severity: WarningSeverity::Info,
                hint: None,
            });
        }
        if self.drift.embedding_dims < 8 {
            warnings.push(ConfigWarning {
                field: "drift.embedding_dims".into(),
                message: format!("{} dimensions cannot hold frame structure", self.drift.embedding_dims),
                severity: WarningSeverity::Error,
                hint: Some("Use at least 8; 128 is the default".into()),
            });
        }
        if !self.drift.halt_on_critical {
            warnings.push(ConfigWarning {
                field: "drift.halt_on_critical".into(),
                message: "critical drift will not halt the agent".into(),
                severity: WarningSeverity::Warning,
                hint: None,
            });
        }

        // ── Holds ───
        if self.hold.timeout_ms == 0 {
            warnings.push(ConfigWarning {
                field: "hold.timeout_ms".into(),
                message: "holds expire immediately".into(),
                severity: WarningSeverity::Warning,
                hint: Some("Set to e.g. 300000 (5 minutes)".into()),
            });
        }
        for pattern in &self.hold.mcp_validation_tools {
            let inner = pattern.trim_start_matches('*').trim_end_matches('*');
            if pattern != "*" && inner.contains('*') {
                warnings.push(ConfigWarning {
                    field: "hold.mcp_validation_tools".into(),
                    message: format!("pattern '{}' has an inner wildcard and matches literally", pattern),
                    severity: WarningSeverity::Warning,
                    hint: Some("Only one leading or trailing '*' is supported".into()),
                });
            }
        }

        // ── Tripwires ───
        if !unit_interval(self.tripwire.rate) {
            warnings.push(ConfigWarning {
                field: "tripwire.rate".into(),
                message: format!("rate {} is outside [0, 1]", self.tripwire.rate),
                severity: WarningSeverity::Error,
                hint: Some("0.05 plants a tripwire in roughly one validation out of twenty".into()),
            });
        }

        // ── Agents ───
        if self.agents.max_agents == 0 {
            warnings.push(ConfigWarning {
                field: "agents.max_agents".into(),
                message: "max_agents is 0: no agent could be tracked".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 1000".into()),
            });
        }
        if self.agents.max_history < self.drift.pattern_min_history + 1 {
            warnings.push(ConfigWarning {
                field: "agents.max_history".into(),
                message: "history cap is smaller than the behavior-pattern minimum".into(),
                severity: WarningSeverity::Warning,
                hint: Some("Behavior-pattern drift will never fire".into()),
            });
        }

        // ── Trust ───
        if self.trust.initial_level > 4 || self.trust.max_level > 4 {
            warnings.push(ConfigWarning {
                field: "trust.initial_level".into(),
                message: "autonomy levels range 0-4".into(),
                severity: WarningSeverity::Error,
                hint: Some("Valid levels: 0 (manual), 1 (assisted), 2 (supervised), 3 (autonomous), 4 (full auto)".into()),
            });
        } else if self.trust.initial_level > self.trust.max_level {
            warnings.push(ConfigWarning {
                field: "trust.initial_level".into(),
                message: "initial level is above the promotion ceiling".into(),
                severity: WarningSeverity::Warning,
                hint: None,
            });
        }

        // ── Logging format ───
        let valid_formats = ["pretty", "json", "compact"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.format".into(),
                message: format!("unknown log format '{}'", self.logging.format),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_formats.join(", "))),
            });
        }

        // ── Logging level ───
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.level".into(),
                message: format!("unknown log level '{}'", self.logging.level),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_levels.join(", "))),
            });
        }

        // Check for hard errors
        let errors: Vec<String> = warnings
            .iter()
            .filter(|w| w.severity == WarningSeverity::Error)
            .map(|w| format!("{}: {}", w.field, w.message))
            .collect();

        if !errors.is_empty() {
            return Err(format!("Configuration errors:\n  • {}", errors.join("\n  • ")));
        }

        Ok(warnings)
    }
}
