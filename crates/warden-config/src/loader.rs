use notify::{Event as NotifyEvent, EventKind, RecursiveMode, Watcher};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use warden_core::WardenError;

use crate::schema::WardenConfig;

/// Loads and optionally hot-reloads the Warden configuration.
#[derive(Debug)]
pub struct ConfigLoader {
    config: Arc<RwLock<WardenConfig>>,
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Resolve the config path: explicit path > WARDEN_CONFIG env > ~/.warden/warden.toml
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("WARDEN_CONFIG") {
            return PathBuf::from(p);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".warden")
            .join("warden.toml")
    }

    /// Load the config from disk, falling back to defaults.
    pub fn load(path: Option<&Path>) -> warden_core::Result<Self> {
        let config_path = Self::resolve_path(path);
        let config = if config_path.exists() {
            info!(?config_path, "loading configuration");
            Self::parse_file(&config_path)?
        } else {
            warn!(?config_path, "config file not found, using defaults");
            WardenConfig::default()
        };

        let config = Self::apply_env_overrides(config);

        match config.validate() {
            Ok(warnings) => {
                for w in &warnings {
                    warn!("{}", w);
                }
            }
            Err(e) => {
                return Err(WardenError::Config(e));
            }
        }

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path,
        })
    }

    /// Get a read snapshot of the current config.
    pub fn get(&self) -> WardenConfig {
        self.config.read().clone()
    }

    /// Shared handle handed to every service.
    pub fn shared(&self) -> crate::SharedConfig {
        Arc::clone(&self.config)
    }

    /// Path being watched.
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    fn parse_file(path: &Path) -> warden_core::Result<WardenConfig> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str::<WardenConfig>(&raw).map_err(|e| {
            WardenError::Config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// Apply env var overrides (WARDEN_LOG_LEVEL, WARDEN_TRIPWIRE_RATE, etc.)
    fn apply_env_overrides(mut config: WardenConfig) -> WardenConfig {
        if let Ok(v) = std::env::var("WARDEN_LOG_LEVEL") {
            config.logging.level = v;
        }
        if let Ok(v) = std::env::var("WARDEN_LOG_FORMAT") {
            config.logging.format = v;
        }
        if let Ok(v) = std::env::var("WARDEN_TRIPWIRE_RATE")
            && let Ok(rate) = v.parse::<f64>()
        {
            config.tripwire.rate = rate;
        }
        if let Ok(v) = std::env::var("WARDEN_HOLD_TIMEOUT_MS")
            && let Ok(ms) = v.parse::<u64>()
        {
            config.hold.timeout_ms = ms;
        }
        if let Ok(v) = std::env::var("WARDEN_FAILURE_THRESHOLD")
            && let Ok(n) = v.parse::<u32>()
        {
            config.breaker.failure_threshold = n;
        }
        if let Ok(v) = std::env::var("WARDEN_MAX_AGENTS")
            && let Ok(n) = v.parse::<usize>()
        {
            config.agents.max_agents = n;
        }
        config
    }

    /// Reload the config from disk. A file that fails validation leaves the current config in place.
    pub fn reload(&self) -> warden_core::Result<()> {
        if !self.config_path.exists() {
            return Err(WardenError::Config(format!(
                "config file not found: {}",
                self.config_path.display()
            )));
        }
        let new_config = Self::apply_env_overrides(Self::parse_file(&self.config_path)?);
        new_config.validate().map_err(WardenError::Config)?;
        *self.config.write() = new_config;
        info!("configuration reloaded");
        Ok(())
    }

    /// Start a background file watcher that swaps in the new config when the file changes.
    /// The returned watcher must be kept alive for watching to continue.
    pub fn watch(&self) -> warden_core::Result<notify::RecommendedWatcher> {
        let config = Arc::clone(&self.config);
        let config_path = self.config_path.clone();

        info!(?config_path, "starting config file watcher");

        let path_for_event = config_path.clone();
        let mut watcher =
            notify::recommended_watcher(move |res: Result<NotifyEvent, notify::Error>| match res {
                Ok(event) => {
                    if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                        return;
                    }
                    let is_our_file = event
                        .paths
                        .iter()
                        .any(|p| p.file_name() == path_for_event.file_name());
                    if !is_our_file {
                        return;
                    }

                    info!("config file changed, reloading");
                    let parsed = ConfigLoader::parse_file(&path_for_event)
                        .map(ConfigLoader::apply_env_overrides);
                    match parsed {
                        Ok(new_config) => match new_config.validate() {
                            Ok(_) => {
                                *config.write() = new_config;
                                info!("configuration hot-reloaded successfully");
                            }
                            Err(e) => {
                                warn!(error = %e, "config file fails validation, keeping current config");
                            }
                        },
                        Err(e) => {
                            warn!(error = %e, "config file has errors, keeping current config");
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "file watcher error");
                }
            })
            .map_err(|e| WardenError::Config(format!("failed to create file watcher: {}", e)))?;

        // Watch the parent directory (some editors create temp files + rename)
        let watch_path = self.config_path.parent().unwrap_or(Path::new("."));
        watcher
            .watch(watch_path, RecursiveMode::NonRecursive)
            .map_err(|e| {
                WardenError::Config(format!("failed to watch config directory: {}", e))
            })?;

        Ok(watcher)
    }
}
