//! Post-execution audit: turn a baseline comparison and the agent's own history into alerts.

use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::VecDeque;
use warden_config::DriftConfig;
use warden_core::Severity;
use warden_safety::BaselineComparison;

use crate::request::{AlertType, DriftAlert, ExecutionRecord};

pub(crate) struct AuditInput<'a> {
    pub agent_id: &'a str,
    pub frame: &'a str,
    pub stated_interpretation: Option<&'a str>,
    pub comparison: &'a BaselineComparison,
    pub behavior_hash: &'a str,
    pub history: &'a VecDeque<ExecutionRecord>,
    pub now: DateTime<Utc>,
}

pub(crate) fn audit(input: &AuditInput<'_>, cfg: &DriftConfig) -> Vec<DriftAlert> {
    let mut alerts = Vec::new();
    let cmp = input.comparison;

    if cmp.has_baseline && cmp.drift_score > 0.0 {
        alerts.push(DriftAlert::new(
            input.agent_id,
            AlertType::BaselineDrift,
            Severity::from_score(cmp.drift_score),
            format!(
                "drift {:.3} from {} baseline: {}",
                cmp.drift_score,
                if cmp.used_global { "global" } else { "agent" },
                cmp.diff.summary()
            ),
            json!({
                "frame": input.frame,
                "drift_score": cmp.drift_score,
                "used_global": cmp.used_global,
                "missing_behavior": cmp.diff.missing_behavior,
                "unexpected_behavior": cmp.diff.unexpected_behavior,
            }),
            input.now,
        ));
    }

    if cmp.has_baseline && input.stated_interpretation.is_some() && !cmp.interpretation_match {
        alerts.push(DriftAlert::new(
            input.agent_id,
            AlertType::InterpretationMismatch,
            Severity::Medium,
            "stated interpretation differs from the baseline",
            json!({
                "frame": input.frame,
                "stated": input.stated_interpretation,
            }),
            input.now,
        ));
    }

    if let Some(alert) = pattern_change(input, cfg) {
        alerts.push(alert);
    }

    alerts
}

/// Compare the current behavior against the agent's recent executions of the same frame.
fn pattern_change(input: &AuditInput<'_>, cfg: &DriftConfig) -> Option<DriftAlert> {
    if cfg.pattern_window == 0 {
        return None;
    }
    let same_frame: Vec<&ExecutionRecord> = input
        .history
        .iter()
        .filter(|r| r.success && r.frame == input.frame)
        .collect();
    if same_frame.len() <= cfg.pattern_min_history {
        return None;
    }

    let window = &same_frame[same_frame.len().saturating_sub(cfg.pattern_window)..];
    let matching = window
        .iter()
        .filter(|r| r.behavior_hash == input.behavior_hash)
        .count();
    let similarity = matching as f64 / window.len() as f64;
    if similarity >= cfg.pattern_similarity_threshold {
        return None;
    }

    Some(DriftAlert::new(
        input.agent_id,
        AlertType::BehaviorPatternChange,
        Severity::from_score(1.0 - similarity).max(Severity::Medium),
        format!(
            "behavior matches {} of the last {} executions of this frame",
            matching,
            window.len()
        ),
        json!({
            "frame": input.frame,
            "similarity": similarity,
            "window": window.len(),
            "threshold": cfg.pattern_similarity_threshold,
        }),
        input.now,
    ))
}
