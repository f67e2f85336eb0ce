use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool invocation that survived admission control.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub agent_id: String,
    /// The frame the call runs under (possibly amended by a hold decision).
    pub frame: String,
    pub tool_name: String,
    pub arguments: Value,
}

/// The result of executing a tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub content: Value,
    pub is_error: bool,
    /// Observable actions the tool performed, used by post-audit.
    /// Empty means "the tool name alone".
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub behavior: Vec<String>,
}

impl ToolResult {
    pub fn ok(content: Value) -> Self {
        Self {
            content,
            is_error: false,
            behavior: Vec::new(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: Value::String(message.into()),
            is_error: true,
            behavior: Vec::new(),
        }
    }

    pub fn with_behavior(mut self, behavior: Vec<String>) -> Self {
        self.behavior = behavior;
        self
    }
}

/// Trait implemented by anything that can execute tool calls on behalf of an agent.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Execute a single tool call and return the result.
    async fn execute(&self, call: &ToolCall) -> crate::Result<ToolResult>;
}

/// Match a tool name against a pattern: exact name, one leading wildcard (`*_sensitive`),
/// or one trailing wildcard (`dangerous_*`). A lone `*` matches every tool.
pub fn matches_tool_pattern(pattern: &str, tool: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(suffix) = pattern.strip_prefix('*') {
        return tool.ends_with(suffix);
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        return tool.starts_with(prefix);
    }
    pattern == tool
}
