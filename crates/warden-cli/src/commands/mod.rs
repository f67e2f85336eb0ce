use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use warden_config::{ConfigLoader, LoggingConfig, WardenConfig, WarningSeverity};
use warden_core::{GLOBAL_AGENT, SymbolicValidator, WardenError};
use warden_safety::TripwireInjector;

pub mod simulate;

/// Warden: admission control and safety enforcement for autonomous agents
#[derive(Parser)]
#[command(name = "warden", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to warden.toml config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level override (e.g. debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all log output (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration and list warnings
    CheckConfig,
    /// Show the effective configuration
    ShowConfig {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run every tripwire against the reference validator
    Tripwire {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Push a scripted request through an in-process gatekeeper
    Simulate(simulate::Simulation),
    /// Show version and build info
    Version,
}

impl Cli {
    pub async fn run(self) -> warden_core::Result<()> {
        // Load config first so we can use it for log format
        let config_loader = ConfigLoader::load(self.config.as_deref())?;
        let config = config_loader.get();

        // Resolve log level: --verbose > --quiet > --log-level > config
        let log_level = if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            self.log_level.as_deref().unwrap_or(&config.logging.level)
        };
        init_tracing(&config.logging, log_level)?;

        match self.command {
            Commands::CheckConfig => Self::cmd_check_config(&config_loader),
            Commands::ShowConfig { json } => Self::cmd_show_config(config, json),
            Commands::Tripwire { json } => Self::cmd_tripwire(config, json),
            Commands::Simulate(sim) => simulate::cmd_simulate(config, sim).await,
            Commands::Version => Self::cmd_version(),
        }
    }

    fn cmd_check_config(loader: &ConfigLoader) -> warden_core::Result<()> {
        println!("Checking {}", loader.path().display());
        println!();

        let warnings = loader.get().validate().map_err(WardenError::Config)?;
        for w in &warnings {
            println!("  {w}");
        }
        let count = |s: WarningSeverity| warnings.iter().filter(|w| w.severity == s).count();

        println!();
        println!(
            "  ✅ configuration is valid, ⚠️  {} warnings, 💡 {} suggestions",
            count(WarningSeverity::Warning),
            count(WarningSeverity::Info)
        );
        Ok(())
    }

    fn cmd_show_config(config: WardenConfig, json: bool) -> warden_core::Result<()> {
        if json {
            println!("{}", serde_json::to_string_pretty(&config)?);
        } else {
            println!(
                "{}",
                toml::to_string_pretty(&config).map_err(|e| WardenError::Config(e.to_string()))?
            );
        }
        Ok(())
    }

    fn cmd_tripwire(config: WardenConfig, json: bool) -> warden_core::Result<()> {
        let injector = TripwireInjector::new(
            warden_config::shared(config),
            std::sync::Arc::new(warden_core::SystemClock),
        );
        let validator = SymbolicValidator;
        let report = injector.run_all_tests(GLOBAL_AGENT, |frame| validator.accepts(frame));

        if json {
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(());
        }

        println!("\x1b[1mTripwire suite\x1b[0m ({} tripwires)", report.total);
        println!("{}", "-".repeat(60));
        for r in &report.results {
            let mark = if r.passed { "\x1b[32m✓\x1b[0m" } else { "\x1b[31m✗\x1b[0m" };
            println!(
                "{mark} {:<32} {:<8} expected {:?}, got {:?}",
                r.tripwire_id, r.frame, r.expected_outcome, r.actual_outcome
            );
        }
        println!();
        println!(
            "{} passed, {} failed ({:.0}%)",
            report.passed,
            report.failed,
            report.pass_rate() * 100.0
        );
        Ok(())
    }

    fn cmd_version() -> warden_core::Result<()> {
        println!("Warden v{}", env!("CARGO_PKG_VERSION"));
        println!("   Rust edition: 2024");
        println!("   Target: {}", std::env::consts::ARCH);
        println!("   OS: {}", std::env::consts::OS);
        #[cfg(debug_assertions)]
        println!("   Profile: debug");
        #[cfg(not(debug_assertions))]
        println!("   Profile: release");
        Ok(())
    }
}

/// Install the global subscriber from `[logging]`. Logs go to stderr unless a file is set,
/// leaving stdout to command output.
fn init_tracing(logging: &LoggingConfig, level: &str) -> warden_core::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let writer = match &logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            BoxMakeWriter::new(std::sync::Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(logging.file.is_none());
    let installed = match logging.format.as_str() {
        "json" => builder.json().with_target(true).try_init(),
        "compact" => builder.compact().with_target(false).try_init(),
        _ => builder.pretty().with_target(false).try_init(),
    };
    installed.map_err(|e| WardenError::Config(format!("cannot initialise logging: {e}")))
}
