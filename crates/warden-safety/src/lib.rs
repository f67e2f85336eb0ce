//! # warden-safety
//!
//! The per-agent safety machinery the gatekeeper composes: a circuit breaker per agent,
//! the baseline/drift store, the tripwire injector, the human-in-the-loop hold manager,
//! autonomy levels with a trust ledger, and a default guardrail interceptor.
//!
//! Every service is constructed with a [`warden_config::SharedConfig`] and an injected
//! [`warden_core::Clock`]; there are no globals.

pub mod baseline;
pub mod breaker;
pub mod guardrail;
pub mod hold;
pub mod level;
pub mod tripwire;
pub mod trust;

pub use baseline::{BaselineComparison, BaselineDiff, BaselineRecord, BaselineStore, DriftPrediction, Violation};
pub use breaker::{CircuitBreaker, CircuitBreakerState, CircuitCheck, CircuitState};
pub use guardrail::{GuardrailInterceptor, GuardrailRule, GuardrailVerdict};
pub use hold::{
    HeldAction, HoldDecision, HoldManager, HoldReason, HoldRequest, HoldSignals, HoldState,
    HoldVerdict,
};
pub use level::AutonomyLevel;
pub use tripwire::{
    Sampler, Tripwire, TripwireInjector, TripwireKind, TripwireOutcome, TripwireResult,
    TripwireSuiteReport,
};
pub use trust::{TrustLedger, TrustState};
