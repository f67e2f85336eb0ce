//! Baselines and drift scoring.
//!
//! A baseline pins down what an agent is expected to do under a frame: the normalized
//! interpretation, the normalized behavior list (and its hash), and a structural embedding.
//! Drift is `1 − cosine` between the baseline embedding and the embedding of what was
//! actually seen, clamped to `[0, 1]`.
//!
//! Embeddings are fixed-length bag-of-features vectors. The first quarter of the slots holds
//! the frame's glyphs; the rest holds interpretation words and behaviors, each bucketed by
//! a blake3 hash. Behaviors weigh more than words, glyphs weigh least, so a changed action
//! moves the score more than a reworded interpretation.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info};
use warden_config::SharedConfig;
use warden_core::{Clock, GLOBAL_AGENT, frame};

const GLYPH_WEIGHT: f32 = 0.5;
const WORD_WEIGHT: f32 = 1.0;
const BEHAVIOR_WEIGHT: f32 = 2.0;
const MIN_DIMS: usize = 8;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineRecord {
    pub agent_id: String,
    pub frame: String,
    pub expected_interpretation: String,
    pub expected_behavior: Vec<String>,
    pub expected_behavior_hash: String,
    pub embedding: Vec<f32>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BaselineDiff {
    pub interpretation_changed: bool,
    /// Expected behaviors that did not happen.
    pub missing_behavior: Vec<String>,
    /// Behaviors that happened but were not expected.
    pub unexpected_behavior: Vec<String>,
}

impl BaselineDiff {
    pub fn is_empty(&self) -> bool {
        !self.interpretation_changed
            && self.missing_behavior.is_empty()
            && self.unexpected_behavior.is_empty()
    }

    pub fn summary(&self) -> String {
        if self.is_empty() {
            return "matches baseline".into();
        }
        let mut parts = Vec::new();
        if self.interpretation_changed {
            parts.push("interpretation changed".to_string());
        }
        if !self.missing_behavior.is_empty() {
            parts.push(format!("missing: {}", self.missing_behavior.join(", ")));
        }
        if !self.unexpected_behavior.is_empty() {
            parts.push(format!("unexpected: {}", self.unexpected_behavior.join(", ")));
        }
        parts.join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineComparison {
    pub has_baseline: bool,
    /// The match came from the `"global"` fallback rather than the agent's own baseline.
    pub used_global: bool,
    pub interpretation_match: bool,
    pub behavior_match: bool,
    pub drift_score: f64,
    pub diff: BaselineDiff,
}

impl BaselineComparison {
    fn absent() -> Self {
        Self {
            has_baseline: false,
            used_global: false,
            interpretation_match: true,
            behavior_match: true,
            drift_score: 0.0,
            diff: BaselineDiff::default(),
        }
    }
}

/// Pre-flight estimate of how far a planned action strays from the baseline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftPrediction {
    pub predicted_drift: f64,
    /// Share of planned behaviors absent from the baseline.
    pub baseline_deviation: f64,
    pub used_global: bool,
    pub missing_from_baseline: Vec<String>,
}

/// An interceptor denial remembered against the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    pub frame: String,
    pub reason: String,
    pub recorded_at: DateTime<Utc>,
}

pub struct BaselineStore {
    baselines: DashMap<(String, String), BaselineRecord>,
    violations: DashMap<String, VecDeque<Violation>>,
    config: SharedConfig,
    clock: Arc<dyn Clock>,
}

impl BaselineStore {
    pub fn new(config: SharedConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            baselines: DashMap::new(),
            violations: DashMap::new(),
            config,
            clock,
        }
    }

    fn dims(&self) -> usize {
        self.config.read().drift.embedding_dims.max(MIN_DIMS)
    }

    /// Record (or overwrite) the baseline for `(agent, frame)`.
    pub fn record_baseline(
        &self,
        frame: &str,
        expected_interpretation: &str,
        expected_behavior: &[String],
        agent_id: &str,
    ) -> BaselineRecord {
        let interpretation = normalize(expected_interpretation);
        let behavior = normalize_behavior(expected_behavior);
        let record = BaselineRecord {
            agent_id: agent_id.to_string(),
            frame: frame.to_string(),
            expected_behavior_hash: behavior_hash(&behavior),
            embedding: embed(frame, &interpretation, &behavior, self.dims()),
            expected_interpretation: interpretation,
            expected_behavior: behavior,
            recorded_at: self.clock.now(),
        };
        info!(agent = %agent_id, frame, "baseline recorded");
        self.baselines
            .insert((agent_id.to_string(), frame.to_string()), record.clone());
        record
    }

    /// The agent's own baseline for the frame, else the global one.
    fn lookup(&self, frame: &str, agent_id: &str) -> Option<(BaselineRecord, bool)> {
        if let Some(r) = self
            .baselines
            .get(&(agent_id.to_string(), frame.to_string()))
        {
            return Some((r.clone(), false));
        }
        self.baselines
            .get(&(GLOBAL_AGENT.to_string(), frame.to_string()))
            .map(|r| (r.clone(), agent_id != GLOBAL_AGENT))
    }

    /// Compare what actually happened against the baseline. `None` for the interpretation
    /// means the agent did not state one, so only behavior is compared.
    pub fn compare_to_baseline(
        &self,
        frame: &str,
        current_interpretation: Option<&str>,
        current_behavior: &[String],
        agent_id: &str,
    ) -> BaselineComparison {
        let Some((baseline, used_global)) = self.lookup(frame, agent_id) else {
            return BaselineComparison::absent();
        };

        let interpretation = current_interpretation
            .map(normalize)
            .unwrap_or_else(|| baseline.expected_interpretation.clone());
        let behavior = normalize_behavior(current_behavior);

        let interpretation_match = interpretation == baseline.expected_interpretation;
        let behavior_match = behavior_hash(&behavior) == baseline.expected_behavior_hash;
        let current = embed(frame, &interpretation, &behavior, baseline.embedding.len());
        let drift_score = drift(&baseline.embedding, &current);

        let expected: BTreeSet<&String> = baseline.expected_behavior.iter().collect();
        let seen: BTreeSet<&String> = behavior.iter().collect();
        let diff = BaselineDiff {
            interpretation_changed: !interpretation_match,
            missing_behavior: expected.difference(&seen).map(|s| s.to_string()).collect(),
            unexpected_behavior: seen.difference(&expected).map(|s| s.to_string()).collect(),
        };

        debug!(agent = %agent_id, frame, drift_score, used_global, "compared to baseline");
        BaselineComparison {
            has_baseline: true,
            used_global,
            interpretation_match,
            behavior_match,
            drift_score,
            diff,
        }
    }

    /// Estimate drift before executing. `None` when no baseline applies.
    pub fn predict(
        &self,
        frame: &str,
        interpretation: Option<&str>,
        planned_behavior: &[String],
        agent_id: &str,
    ) -> Option<DriftPrediction> {
        let (baseline, used_global) = self.lookup(frame, agent_id)?;
        let interpretation = interpretation
            .map(normalize)
            .unwrap_or_else(|| baseline.expected_interpretation.clone());
        let planned = normalize_behavior(planned_behavior);

        let missing: Vec<String> = planned
            .iter()
            .filter(|b| !baseline.expected_behavior.contains(b))
            .cloned()
            .collect();
        let baseline_deviation = if planned.is_empty() {
            0.0
        } else {
            missing.len() as f64 / planned.len() as f64
        };
        let current = embed(frame, &interpretation, &planned, baseline.embedding.len());

        Some(DriftPrediction {
            predicted_drift: drift(&baseline.embedding, &current),
            baseline_deviation,
            used_global,
            missing_from_baseline: missing,
        })
    }

    pub fn record_violation(&self, agent_id: &str, frame: &str, reason: &str) {
        let cap = self.config.read().drift.max_violations_per_agent.max(1);
        let mut list = self.violations.entry(agent_id.to_string()).or_default();
        list.push_back(Violation {
            frame: frame.to_string(),
            reason: reason.to_string(),
            recorded_at: self.clock.now(),
        });
        while list.len() > cap {
            list.pop_front();
        }
    }

    pub fn violations(&self, agent_id: &str) -> Vec<Violation> {
        self.violations
            .get(agent_id)
            .map(|v| v.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn get_baseline(&self, frame: &str, agent_id: &str) -> Option<BaselineRecord> {
        self.baselines
            .get(&(agent_id.to_string(), frame.to_string()))
            .map(|r| r.clone())
    }

    pub fn baselines_for(&self, agent_id: &str) -> Vec<BaselineRecord> {
        let mut records: Vec<BaselineRecord> = self
            .baselines
            .iter()
            .filter(|r| r.key().0 == agent_id)
            .map(|r| r.value().clone())
            .collect();
        records.sort_by(|a, b| a.frame.cmp(&b.frame));
        records
    }

    /// Drop every baseline and violation held for the agent.
    pub fn evict_agent(&self, agent_id: &str) -> usize {
        let before = self.baselines.len();
        self.baselines.retain(|(agent, _), _| agent != agent_id);
        self.violations.remove(agent_id);
        before.saturating_sub(self.baselines.len())
    }
}

// ── Scoring ────────────────────────────────────────────────────

/// Lowercase and collapse whitespace.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalize each entry, drop empties, sort and dedup. Order of behaviors is not drift.
fn normalize_behavior(behavior: &[String]) -> Vec<String> {
    let set: BTreeSet<String> = behavior
        .iter()
        .map(|b| normalize(b))
        .filter(|b| !b.is_empty())
        .collect();
    set.into_iter().collect()
}

pub fn behavior_hash(normalized: &[String]) -> String {
    blake3::hash(normalized.join("\n").as_bytes())
        .to_hex()
        .to_string()
}

/// Hash of a raw behavior list after normalization, comparable across executions.
pub fn behavior_fingerprint(behavior: &[String]) -> String {
    behavior_hash(&normalize_behavior(behavior))
}

fn bucket(feature: &str, width: usize) -> usize {
    let hash = blake3::hash(feature.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&hash.as_bytes()[..8]);
    (u64::from_le_bytes(head) % width as u64) as usize
}

/// Build an L2-normalized embedding of `dims` slots.
pub fn embed(frame_text: &str, interpretation: &str, behavior: &[String], dims: usize) -> Vec<f32> {
    let dims = dims.max(MIN_DIMS);
    let split = dims / 4;
    let mut v = vec![0.0f32; dims];

    for glyph in frame::symbols(frame_text) {
        let class = frame::classify(glyph)
            .map(|c| format!("{c:?}"))
            .unwrap_or_else(|| "unknown".into());
        v[bucket(&format!("{class}:{glyph}"), split)] += GLYPH_WEIGHT;
    }
    for word in interpretation.split_whitespace() {
        v[split + bucket(&format!("w:{word}"), dims - split)] += WORD_WEIGHT;
    }
    for b in behavior {
        v[split + bucket(&format!("b:{b}"), dims - split)] += BEHAVIOR_WEIGHT;
    }

    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

/// `1 − cosine`, clamped to `[0, 1]`. Two empty vectors are identical; one empty vector is
/// maximally far from anything.
pub fn drift(a: &[f32], b: &[f32]) -> f64 {
    if a == b {
        return 0.0;
    }
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 && norm_b == 0.0 {
        return 0.0;
    }
    if norm_a == 0.0 || norm_b == 0.0 || a.len() != b.len() {
        return 1.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let cosine = (dot / (norm_a * norm_b)) as f64;
    (1.0 - cosine).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn beh(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_normalize_collapses_case_and_space() {
        assert_eq!(normalize("  Transfer   FUNDS\tnow "), "transfer funds now");
    }

    #[test]
    fn test_behavior_hash_ignores_order_and_case() {
        let a = normalize_behavior(&beh(&["Query_DB", "send_report"]));
        let b = normalize_behavior(&beh(&["send_report", "query_db"]));
        assert_eq!(behavior_hash(&a), behavior_hash(&b));
    }

    #[test]
    fn test_identical_embeddings_have_zero_drift() {
        let v = embed("●◆→α", "pay invoice", &beh(&["pay"]), 128);
        assert_eq!(drift(&v, &v.clone()), 0.0);
    }

    #[test]
    fn test_drift_is_bounded() {
        let a = embed("●◆→α", "pay invoice", &beh(&["pay"]), 128);
        let b = embed("○▲?Ω", "delete every table", &beh(&["drop_table", "exfiltrate"]), 128);
        let d = drift(&a, &b);
        assert!((0.0..=1.0).contains(&d));
        assert!(d > 0.5);
    }

    #[test]
    fn test_empty_vectors() {
        assert_eq!(drift(&[0.0; 8], &[0.0; 8]), 0.0);
        assert_eq!(drift(&[0.0; 8], &[1.0; 8]), 1.0);
    }

    #[test]
    fn test_behavior_change_outweighs_rewording() {
        let base = embed("●◆→α", "pay the invoice", &beh(&["pay"]), 128);
        let reworded = embed("●◆→α", "settle the invoice", &beh(&["pay"]), 128);
        let new_action = embed("●◆→α", "pay the invoice", &beh(&["refund"]), 128);
        assert!(drift(&base, &new_action) > drift(&base, &reworded));
    }
}
