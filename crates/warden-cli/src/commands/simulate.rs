//! `warden simulate`: one scripted request through a gatekeeper with an echo executor.

use async_trait::async_trait;
use clap::Args;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::info;

use warden_config::WardenConfig;
use warden_core::{ToolCall, ToolExecutor, ToolResult};
use warden_runtime::{ExecuteRequest, ExecuteResult, Gatekeeper};

#[derive(Args, Debug, Clone)]
pub struct Simulation {
    /// Agent id to act as
    #[arg(long, default_value = "sim-agent")]
    pub agent: String,
    /// Symbolic frame the request runs under
    #[arg(long)]
    pub frame: String,
    /// Tool name
    #[arg(long)]
    pub tool: String,
    /// Tool arguments as a JSON object
    #[arg(long, default_value = "{}")]
    pub args: String,
    /// The agent's stated reading of the frame
    #[arg(long)]
    pub interpretation: Option<String>,
    /// Behavior the echo executor reports (repeatable, defaults to the tool name)
    #[arg(long = "behavior")]
    pub behavior: Vec<String>,
    /// Record a baseline for the frame with this interpretation before the request
    #[arg(long)]
    pub baseline: Option<String>,
    /// Expected behavior for the baseline (repeatable, defaults to the tool name)
    #[arg(long = "expect")]
    pub expect: Vec<String>,
    /// Send the request this many times
    #[arg(short = 'n', long, default_value = "1")]
    pub repeat: usize,
    /// Approve and resume any hold the request lands in
    #[arg(long)]
    pub approve: bool,
}

/// Executor that runs nothing and echoes the call back.
pub struct EchoExecutor {
    behavior: Vec<String>,
}

impl EchoExecutor {
    pub fn new(behavior: Vec<String>) -> Self {
        Self { behavior }
    }
}

#[async_trait]
impl ToolExecutor for EchoExecutor {
    async fn execute(&self, call: &ToolCall) -> warden_core::Result<ToolResult> {
        Ok(ToolResult::ok(json!({
            "echo": call.tool_name,
            "agent": call.agent_id,
            "frame": call.frame,
            "arguments": call.arguments,
        }))
        .with_behavior(self.behavior.clone()))
    }
}

pub async fn run_simulation(
    config: WardenConfig,
    sim: &Simulation,
) -> warden_core::Result<Vec<ExecuteResult>> {
    let arguments: Value = serde_json::from_str(&sim.args)?;
    let gatekeeper = Gatekeeper::builder(warden_config::shared(config))
        .executor(Arc::new(EchoExecutor::new(sim.behavior.clone())))
        .build()?;

    if let Some(ref interpretation) = sim.baseline {
        let expected = if sim.expect.is_empty() {
            vec![sim.tool.clone()]
        } else {
            sim.expect.clone()
        };
        gatekeeper.record_baseline(&sim.frame, interpretation, &expected, &sim.agent);
    }

    let mut results = Vec::with_capacity(sim.repeat.max(1));
    for _ in 0..sim.repeat.max(1) {
        let mut request = ExecuteRequest::new(&sim.agent, &sim.frame, &sim.tool)
            .with_arguments(arguments.clone());
        if let Some(ref interpretation) = sim.interpretation {
            request = request.with_interpretation(interpretation.clone());
        }

        let mut result = gatekeeper.execute(request).await;
        if sim.approve
            && let Some(hold_id) = result.hold_id
        {
            info!(%hold_id, "approving hold from the command line");
            gatekeeper.approve_hold(hold_id, "warden-cli", Some("approved from the command line"))?;
            result = gatekeeper.resume_hold(hold_id).await?;
        }
        results.push(result);
    }
    Ok(results)
}

pub(crate) async fn cmd_simulate(config: WardenConfig, sim: Simulation) -> warden_core::Result<()> {
    let results = run_simulation(config, &sim).await?;
    let out = match results.as_slice() {
        [single] => serde_json::to_string_pretty(single)?,
        all => serde_json::to_string_pretty(all)?,
    };
    println!("{out}");
    Ok(())
}
