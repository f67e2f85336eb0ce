//! # warden-config
//!
//! Configuration system for Warden. Reads from `warden.toml`, then environment
//! variables, in that precedence order.
//!
//! Every service holds a [`SharedConfig`] and reads its thresholds on each call, so a
//! hot-reload through the filesystem watcher takes effect on the next decision.

pub mod loader;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::WardenConfig;
pub use schema::{
    AgentsConfig, BreakerConfig, ConfigWarning, DriftConfig, HoldConfig, LoggingConfig,
    TripwireConfig, TrustConfig, WarningSeverity,
};

use parking_lot::RwLock;
use std::sync::Arc;

/// Hot-reloadable configuration handle shared by every service.
pub type SharedConfig = Arc<RwLock<WardenConfig>>;

/// Wrap a config in a fresh shared handle (tests and embedders that skip the loader).
pub fn shared(config: WardenConfig) -> SharedConfig {
    Arc::new(RwLock::new(config))
}
