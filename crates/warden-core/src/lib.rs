//! # warden-core
//!
//! Core types, traits, and primitives for the Warden admission-control layer.
//! This crate defines the shared vocabulary used by every other crate in the workspace:
//! the error type, the clock abstraction, the event bus, and the narrow traits through
//! which the frame subsystem, the security interceptor, and tool execution plug in.

pub mod clock;
pub mod error;
pub mod event;
pub mod frame;
pub mod interceptor;
pub mod tool;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Result, WardenError};
pub use event::{EventBus, WardenEvent};
pub use frame::{FrameValidator, ResolvedFrame, SymbolicValidator, ToolBindings, ValidationReport};
pub use interceptor::{AllowAll, Interceptor, InterceptorDecision};
pub use tool::{ToolCall, ToolExecutor, ToolResult, matches_tool_pattern};
pub use types::*;
