//! Frames and the validation contract.
//!
//! A frame is a compact symbolic directive: one glyph each for mode (strictness), domain,
//! action and issuing entity, plus optional constraint glyphs. The full grammar belongs to
//! the frame subsystem; the gatekeeper only needs a [`FrameValidator`] that returns a
//! [`ValidationReport`]. [`SymbolicValidator`] is a small reference implementation used by
//! the tripwire suite, the CLI and tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::tool::matches_tool_pattern;

/// Frames shorter than this many symbols are rejected.
pub const MIN_FRAME_LEN: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolClass {
    Mode,
    Domain,
    Action,
    Entity,
    Constraint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Strict,
    Balanced,
    Permissive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Finance,
    Engineering,
    Legal,
    Operations,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Execute,
    Review,
    Query,
    Forbid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Entity {
    Operator,
    Agent,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Constraint {
    ReadOnly,
    ReversibleOnly,
}

/// Classify a single glyph. Returns `None` for glyphs outside the vocabulary.
pub fn classify(symbol: char) -> Option<SymbolClass> {
    match symbol {
        '●' | '◐' | '○' => Some(SymbolClass::Mode),
        '◆' | '▲' | '■' | '◇' => Some(SymbolClass::Domain),
        '→' | '↺' | '?' | '⊘' => Some(SymbolClass::Action),
        'α' | 'β' | 'Ω' => Some(SymbolClass::Entity),
        '⊥' | '⊤' => Some(SymbolClass::Constraint),
        _ => None,
    }
}

/// The non-whitespace glyphs of a frame.
pub fn symbols(frame: &str) -> Vec<char> {
    frame.chars().filter(|c| !c.is_whitespace()).collect()
}

fn mode_of(symbol: char) -> Option<Mode> {
    match symbol {
        '●' => Some(Mode::Strict),
        '◐' => Some(Mode::Balanced),
        '○' => Some(Mode::Permissive),
        _ => None,
    }
}

fn domain_of(symbol: char) -> Option<Domain> {
    match symbol {
        '◆' => Some(Domain::Finance),
        '▲' => Some(Domain::Engineering),
        '■' => Some(Domain::Legal),
        '◇' => Some(Domain::Operations),
        _ => None,
    }
}

fn action_of(symbol: char) -> Option<Action> {
    match symbol {
        '→' => Some(Action::Execute),
        '↺' => Some(Action::Review),
        '?' => Some(Action::Query),
        '⊘' => Some(Action::Forbid),
        _ => None,
    }
}

fn entity_of(symbol: char) -> Option<Entity> {
    match symbol {
        'α' => Some(Entity::Operator),
        'β' => Some(Entity::Agent),
        'Ω' => Some(Entity::System),
        _ => None,
    }
}

fn constraint_of(symbol: char) -> Option<Constraint> {
    match symbol {
        '⊥' => Some(Constraint::ReadOnly),
        '⊤' => Some(Constraint::ReversibleOnly),
        _ => None,
    }
}

/// Tools a resolved frame permits or forbids (patterns, see [`matches_tool_pattern`]).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolBindings {
    #[serde(default)]
    pub permitted: Vec<String>,
    #[serde(default)]
    pub forbidden: Vec<String>,
}

impl ToolBindings {
    /// A tool is forbidden when a forbidden pattern matches and no permitted entry names it exactly.
    pub fn forbids(&self, tool: &str) -> bool {
        self.forbidden.iter().any(|p| matches_tool_pattern(p, tool))
            && !self.permitted.iter().any(|p| p == tool)
    }
}

/// A frame after resolution by the frame subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedFrame {
    pub frame: String,
    pub mode: Option<Mode>,
    pub domain: Option<Domain>,
    pub action: Option<Action>,
    pub entity: Option<Entity>,
    #[serde(default)]
    pub constraints: Vec<Constraint>,
    /// Parse confidence in [0, 1].
    pub confidence: f64,
    #[serde(default)]
    pub bindings: ToolBindings,
}

/// Outcome of validating a frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    #[serde(default)]
    pub structural: Vec<String>,
    #[serde(default)]
    pub semantic: Vec<String>,
    #[serde(default)]
    pub chain: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<ResolvedFrame>,
}

impl ValidationReport {
    /// All findings, one line each, in structural → semantic → chain order.
    pub fn findings(&self) -> Vec<String> {
        self.structural
            .iter()
            .chain(&self.semantic)
            .chain(&self.chain)
            .cloned()
            .collect()
    }

    pub fn summary(&self) -> String {
        let findings = self.findings();
        if findings.is_empty() {
            "frame is valid".into()
        } else {
            findings.join("; ")
        }
    }
}

/// The frame subsystem as seen by the gatekeeper.
#[async_trait]
pub trait FrameValidator: Send + Sync {
    async fn validate(&self, frame: &str) -> ValidationReport;
}

/// Reference validator for the glyph vocabulary in this module.
#[derive(Debug, Clone, Copy, Default)]
pub struct SymbolicValidator;

impl SymbolicValidator {
    /// Synchronous validation; the async trait method delegates here.
    pub fn check(&self, frame: &str) -> ValidationReport {
        let glyphs = symbols(frame);
        let mut report = ValidationReport::default();

        if glyphs.len() < MIN_FRAME_LEN {
            report.structural.push(format!(
                "frame has {} symbol(s), minimum is {}",
                glyphs.len(),
                MIN_FRAME_LEN
            ));
        }
        for g in &glyphs {
            if classify(*g).is_none() {
                report.structural.push(format!("unknown symbol '{g}'"));
            }
        }

        let modes: Vec<Mode> = glyphs.iter().filter_map(|g| mode_of(*g)).collect();
        let domains: Vec<Domain> = glyphs.iter().filter_map(|g| domain_of(*g)).collect();
        let actions: Vec<Action> = glyphs.iter().filter_map(|g| action_of(*g)).collect();
        let entities: Vec<Entity> = glyphs.iter().filter_map(|g| entity_of(*g)).collect();
        let mut constraints: Vec<Constraint> =
            glyphs.iter().filter_map(|g| constraint_of(*g)).collect();
        constraints.dedup();

        match modes.as_slice() {
            [] => report.semantic.push("frame has no mode".into()),
            [_] => {}
            [first, rest @ ..] => {
                if rest.iter().all(|m| m == first) {
                    report.semantic.push(format!("duplicate mode {first:?}"));
                } else {
                    report
                        .semantic
                        .push(format!("conflicting modes {:?}", modes));
                }
            }
        }
        if domains.len() > 1 {
            if domains.iter().all(|d| *d == domains[0]) {
                report
                    .semantic
                    .push(format!("duplicate domain {:?}", domains[0]));
            } else {
                report
                    .semantic
                    .push(format!("multiple domains {:?}", domains));
            }
        }
        if actions.len() > 1 {
            report
                .semantic
                .push(format!("multiple actions {:?}", actions));
        }
        if entities.len() > 1 {
            report
                .semantic
                .push(format!("multiple entities {:?}", entities));
        }
        if !actions.is_empty() && domains.is_empty() {
            report
                .chain
                .push("action requires a domain to act within".into());
        }

        report.valid =
            report.structural.is_empty() && report.semantic.is_empty() && report.chain.is_empty();

        if report.valid {
            let domain = domains.first().copied();
            let action = actions.first().copied();
            let entity = entities.first().copied();
            let missing = [domain.is_none(), action.is_none(), entity.is_none()]
                .iter()
                .filter(|m| **m)
                .count();
            let confidence = (1.0 - 0.15 * missing as f64).clamp(0.0, 1.0);

            let mut forbidden: Vec<String> = Vec::new();
            if action == Some(Action::Forbid) {
                forbidden.push("*".into());
            }
            if constraints.contains(&Constraint::ReadOnly) {
                forbidden.push("write_*".into());
                forbidden.push("delete_*".into());
            }
            if constraints.contains(&Constraint::ReversibleOnly) {
                forbidden.push("delete_*".into());
            }
            forbidden.dedup();

            report.resolved = Some(ResolvedFrame {
                frame: glyphs.iter().collect(),
                mode: modes.first().copied(),
                domain,
                action,
                entity,
                constraints,
                confidence,
                bindings: ToolBindings {
                    permitted: Vec::new(),
                    forbidden,
                },
            });
        }

        report
    }

    pub fn accepts(&self, frame: &str) -> bool {
        self.check(frame).valid
    }
}

#[async_trait]
impl FrameValidator for SymbolicValidator {
    async fn validate(&self, frame: &str) -> ValidationReport {
        self.check(frame)
    }
}
