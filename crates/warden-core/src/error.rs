use thiserror::Error;
use uuid::Uuid;

/// Unified error type for the Warden crates.
///
/// Policy outcomes (blocked, held, halted, tool failure) are never errors; they travel
/// inside the structured execution result. This type covers API misuse and I/O.
#[derive(Error, Debug)]
pub enum WardenError {
    // ── Hold errors ────────────────────────────────────────────
    #[error("hold not found: {0}")]
    HoldNotFound(Uuid),

    #[error("hold {hold_id} is not approved (state: {state})")]
    HoldNotApproved { hold_id: Uuid, state: String },

    // ── Agent errors ───────────────────────────────────────────
    #[error("unknown agent: {0}")]
    UnknownAgent(String),

    // ── Collaborator errors ────────────────────────────────────
    #[error("frame validation failed: {0}")]
    Validation(String),

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("tool execution failed: {tool}: {reason}")]
    ToolExecution { tool: String, reason: String },

    // ── Config errors ──────────────────────────────────────────
    #[error("config error: {0}")]
    Config(String),

    #[error("config validation failed: {field}: {reason}")]
    ConfigValidation { field: String, reason: String },

    // ── Generic wrappers ───────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, WardenError>;
