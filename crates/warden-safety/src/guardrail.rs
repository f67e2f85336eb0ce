use async_trait::async_trait;
use serde_json::Value;
use tracing::info;
use warden_core::{Interceptor, InterceptorDecision, ResolvedFrame, matches_tool_pattern};

/// Outcome of a single guardrail rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardrailVerdict {
    /// Action may proceed.
    Approve,
    /// Action is denied with a reason.
    Deny(String),
}

/// A single guardrail rule.
pub trait GuardrailRule: Send + Sync {
    fn name(&self) -> &str;
    fn evaluate(&self, tool: &str, arguments: &Value, frame: Option<&ResolvedFrame>) -> GuardrailVerdict;
}

/// The default [`Interceptor`]: deny/allow lists, then every registered rule in order.
pub struct GuardrailInterceptor {
    rules: Vec<Box<dyn GuardrailRule>>,
    allowlist: Vec<String>,
    denylist: Vec<String>,
}

impl Default for GuardrailInterceptor {
    fn default() -> Self {
        Self::new()
    }
}

impl GuardrailInterceptor {
    pub fn new() -> Self {
        let mut engine = Self {
            rules: Vec::new(),
            allowlist: Vec::new(),
            denylist: Vec::new(),
        };
        engine.add_rule(Box::new(DestructiveActionGuardrail { max_deletes: 5 }));
        engine.add_rule(Box::new(NetworkExfiltrationGuardrail));
        engine
    }

    pub fn add_rule(&mut self, rule: Box<dyn GuardrailRule>) {
        self.rules.push(rule);
    }

    /// Tool patterns that skip the rules entirely.
    pub fn set_allowlist(&mut self, list: Vec<String>) {
        self.allowlist = list;
    }

    /// Tool patterns that are always denied.
    pub fn set_denylist(&mut self, list: Vec<String>) {
        self.denylist = list;
    }

    pub fn evaluate(&self, tool: &str, arguments: &Value, frame: Option<&ResolvedFrame>) -> GuardrailVerdict {
        if self.denylist.iter().any(|p| matches_tool_pattern(p, tool)) {
            info!(tool, "tool is on denylist");
            return GuardrailVerdict::Deny(format!("tool '{}' is on the denylist", tool));
        }

        if self.allowlist.iter().any(|p| matches_tool_pattern(p, tool)) {
            return GuardrailVerdict::Approve;
        }

        for rule in &self.rules {
            if let verdict @ GuardrailVerdict::Deny(_) = rule.evaluate(tool, arguments, frame) {
                info!(rule = rule.name(), tool, "guardrail denied action");
                return verdict;
            }
        }

        GuardrailVerdict::Approve
    }
}

#[async_trait]
impl Interceptor for GuardrailInterceptor {
    async fn check(
        &self,
        _agent_id: &str,
        frame: Option<&ResolvedFrame>,
        tool: &str,
        arguments: &Value,
    ) -> InterceptorDecision {
        match self.evaluate(tool, arguments, frame) {
            GuardrailVerdict::Approve => InterceptorDecision::allow(),
            GuardrailVerdict::Deny(reason) => InterceptorDecision::deny(reason),
        }
    }
}

// ── Built-in guardrails ────────────────────────────────────────

/// Prevents mass deletion.
struct DestructiveActionGuardrail {
    max_deletes: usize,
}

impl GuardrailRule for DestructiveActionGuardrail {
    fn name(&self) -> &str {
        "destructive_action"
    }

    fn evaluate(&self, tool: &str, arguments: &Value, _frame: Option<&ResolvedFrame>) -> GuardrailVerdict {
        if !(tool.contains("delete") || tool.contains("remove") || tool.contains("drop")) {
            return GuardrailVerdict::Approve;
        }
        let targets = ["paths", "targets", "ids"]
            .iter()
            .filter_map(|k| arguments.get(*k).and_then(Value::as_array))
            .map(Vec::len)
            .max()
            .unwrap_or(0);
        if targets > self.max_deletes {
            return GuardrailVerdict::Deny(format!(
                "attempting to delete {} targets, max allowed is {}",
                targets, self.max_deletes
            ));
        }
        GuardrailVerdict::Approve
    }
}

/// Detects data exfiltration through shell commands.
struct NetworkExfiltrationGuardrail;

impl GuardrailRule for NetworkExfiltrationGuardrail {
    fn name(&self) -> &str {
        "network_exfiltration"
    }

    fn evaluate(&self, tool: &str, arguments: &Value, _frame: Option<&ResolvedFrame>) -> GuardrailVerdict {
        if tool != "shell_exec" && tool != "system_run" {
            return GuardrailVerdict::Approve;
        }
        if let Some(cmd) = arguments.get("command").and_then(|v| v.as_str()) {
            let suspicious = cmd.contains("curl") && (cmd.contains("cat ") || cmd.contains("< /"))
                || cmd.contains("wget") && cmd.contains("--post-file");
            if suspicious {
                return GuardrailVerdict::Deny("command may be exfiltrating data via network".into());
            }
        }
        GuardrailVerdict::Approve
    }
}
