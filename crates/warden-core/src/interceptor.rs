use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::frame::ResolvedFrame;

/// Permission/security decision returned by an interceptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterceptorDecision {
    pub allowed: bool,
    pub reason: String,
}

impl InterceptorDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: "allowed".into(),
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
        }
    }
}

/// Fine-grained permission check consulted after the hold gate.
#[async_trait]
pub trait Interceptor: Send + Sync {
    async fn check(
        &self,
        agent_id: &str,
        frame: Option<&ResolvedFrame>,
        tool: &str,
        arguments: &Value,
    ) -> InterceptorDecision;
}

/// Interceptor that permits everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl Interceptor for AllowAll {
    async fn check(
        &self,
        _agent_id: &str,
        _frame: Option<&ResolvedFrame>,
        _tool: &str,
        _arguments: &Value,
    ) -> InterceptorDecision {
        InterceptorDecision::allow()
    }
}
