//! # warden-runtime
//!
//! The gatekeeper that sits between an agent and its tools.
//!
//! ## Pipeline
//!
//! ```text
//!              ┌──────────────────┐
//!              │  ExecuteRequest  │
//!              └────────┬─────────┘
//!                       ▼
//!              ┌──────────────────┐
//!              │  1. Breaker      │  ← open circuit blocks
//!              │  2. Tripwire     │  ← sampled validator probe
//!              │  3. Validation   │  ← invalid frame blocks
//!              │  4. Prediction   │  ← drift over block threshold blocks
//!              │  5. Hold         │  ← parks for an operator
//!              │  6. Interceptor  │  ← guardrail veto
//!              │  7. Execute      │
//!              │  8. Audit        │  ← baseline + pattern alerts
//!              │  9. Act          │  ← halt on severe drift
//!              └──────────────────┘
//! ```

pub(crate) mod audit;
pub mod gatekeeper;
pub mod health;
pub(crate) mod registry;
pub mod request;

pub use gatekeeper::{Gatekeeper, GatekeeperBuilder};
pub use health::{AgentHealth, SystemHealth};
pub use request::{
    AlertType, DriftAlert, ExecuteRequest, ExecuteResult, ExecutionRecord, Gate, GateCheck,
    GateStatus, PostAudit, PreFlightCheck,
};
