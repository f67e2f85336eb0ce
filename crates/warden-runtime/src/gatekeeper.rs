//! The gatekeeper: one ordered admission decision per tool call.
//!
//! Every request walks the same gates in the same order: circuit breaker, tripwire, frame
//! validation, drift prediction, hold, interceptor. Only then does the tool run, and its
//! observed behavior is audited against the agent's baselines and recent history.
//!
//! Per-agent state lives in the services the gatekeeper owns. Evicting an agent purges all
//! of them under the write side of `eviction_gate`; every per-agent mutation takes the read
//! side, so an eviction can never interleave with a half-applied update.

use chrono::Duration;
use parking_lot::{Mutex, RwLock};
use serde_json::{Value, json};
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;
use warden_config::SharedConfig;
use warden_core::{
    Clock, EventBus, FrameValidator, GLOBAL_AGENT, Interceptor, InterceptorDecision, Severity,
    SymbolicValidator, SystemClock, ToolCall, ToolExecutor, ToolResult, WardenError, WardenEvent,
};
use warden_safety::baseline::behavior_fingerprint;
use warden_safety::{
    BaselineRecord, BaselineStore, CircuitBreaker, CircuitState, GuardrailInterceptor, HeldAction,
    HoldDecision, HoldManager, HoldRequest, HoldSignals, Sampler, TripwireInjector, TripwireSuiteReport,
    TrustLedger,
};

use crate::audit::{AuditInput, audit};
use crate::health::{AgentHealth, RECENT_ALERTS, SystemHealth, grade_agent, summarize};
use crate::registry::AgentRegistry;
use crate::request::{
    AlertType, DriftAlert, ExecuteRequest, ExecuteResult, ExecutionRecord, Gate, GateStatus,
    PostAudit, PreFlightCheck,
};

const EVENT_CAPACITY: usize = 1024;

pub struct Gatekeeper {
    config: SharedConfig,
    clock: Arc<dyn Clock>,
    validator: Arc<dyn FrameValidator>,
    interceptor: Arc<dyn Interceptor>,
    executor: Arc<dyn ToolExecutor>,
    breaker: Arc<CircuitBreaker>,
    baselines: Arc<BaselineStore>,
    tripwires: Arc<TripwireInjector>,
    holds: Arc<HoldManager>,
    trust: Arc<TrustLedger>,
    events: EventBus,
    registry: Mutex<AgentRegistry>,
    alerts: Mutex<VecDeque<DriftAlert>>,
    eviction_gate: RwLock<()>,
}

/// Assembles a [`Gatekeeper`]. Only the tool executor is mandatory.
pub struct GatekeeperBuilder {
    config: SharedConfig,
    clock: Option<Arc<dyn Clock>>,
    validator: Option<Arc<dyn FrameValidator>>,
    interceptor: Option<Arc<dyn Interceptor>>,
    executor: Option<Arc<dyn ToolExecutor>>,
    sampler: Option<Sampler>,
    events: Option<EventBus>,
}

impl GatekeeperBuilder {
    pub fn new(config: SharedConfig) -> Self {
        Self {
            config,
            clock: None,
            validator: None,
            interceptor: None,
            executor: None,
            sampler: None,
            events: None,
        }
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn validator(mut self, validator: Arc<dyn FrameValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptor = Some(interceptor);
        self
    }

    pub fn executor(mut self, executor: Arc<dyn ToolExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Source of uniform samples in [0, 1) for tripwire injection.
    pub fn tripwire_sampler(mut self, sampler: Sampler) -> Self {
        self.sampler = Some(sampler);
        self
    }

    pub fn events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn build(self) -> warden_core::Result<Gatekeeper> {
        let executor = self
            .executor
            .ok_or_else(|| WardenError::Config("gatekeeper needs a tool executor".into()))?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let events = self.events.unwrap_or_else(|| EventBus::new(EVENT_CAPACITY));
        let config = self.config;

        let trust = Arc::new(TrustLedger::new(config.clone(), clock.clone()).with_events(events.clone()));
        let breaker = CircuitBreaker::new(config.clone(), clock.clone())
            .with_trust(trust.clone())
            .with_events(events.clone());
        let mut tripwires =
            TripwireInjector::new(config.clone(), clock.clone()).with_events(events.clone());
        if let Some(sampler) = self.sampler {
            tripwires = tripwires.with_sampler(sampler);
        }
        let holds = HoldManager::new(config.clone(), clock.clone()).with_events(events.clone());
        let baselines = BaselineStore::new(config.clone(), clock.clone());
        let max_agents = config.read().agents.max_agents;

        Ok(Gatekeeper {
            validator: self.validator.unwrap_or_else(|| Arc::new(SymbolicValidator)),
            interceptor: self
                .interceptor
                .unwrap_or_else(|| Arc::new(GuardrailInterceptor::new())),
            executor,
            breaker: Arc::new(breaker),
            baselines: Arc::new(baselines),
            tripwires: Arc::new(tripwires),
            holds: Arc::new(holds),
            trust,
            events,
            registry: Mutex::new(AgentRegistry::new(max_agents)),
            alerts: Mutex::new(VecDeque::new()),
            eviction_gate: RwLock::new(()),
            config,
            clock,
        })
    }
}

impl Gatekeeper {
    pub fn builder(config: SharedConfig) -> GatekeeperBuilder {
        GatekeeperBuilder::new(config)
    }

    /// Run one request through every gate and, if admitted, execute and audit it.
    pub async fn execute(&self, request: ExecuteRequest) -> ExecuteResult {
        let agent = request.agent_id.clone();
        self.touch(&agent);
        let mut pre = PreFlightCheck::default();

        // 1. Circuit breaker
        let circuit = self.breaker.check(&agent);
        if !circuit.allowed {
            let reason = circuit
                .reason
                .unwrap_or_else(|| format!("circuit {}", circuit.state));
            pre.record(Gate::CircuitBreaker, GateStatus::Blocked, reason.clone());
            info!(agent = %agent, tool = %request.tool, reason = %reason, "request blocked by circuit breaker");
            return ExecuteResult::blocked(reason, pre);
        }
        pre.record(Gate::CircuitBreaker, GateStatus::Passed, circuit.state.to_string());

        // 2. Tripwire
        self.maybe_tripwire(&agent, &mut pre).await;

        // 3. Frame validation
        let report = self.validator.validate(&request.frame).await;
        if !report.valid {
            let reason = format!("frame validation failed: {}", report.summary());
            pre.record(Gate::Validation, GateStatus::Blocked, report.summary());
            self.if_tracked(&agent, || self.breaker.record_failure(&agent, &reason));
            info!(agent = %agent, frame = %request.frame, "request blocked by frame validation");
            return ExecuteResult::blocked(reason, pre);
        }
        pre.record(Gate::Validation, GateStatus::Passed, "frame is valid");
        let resolved = report.resolved;
        pre.confidence = resolved.as_ref().map(|r| r.confidence);
        match pre.confidence {
            Some(confidence) => pre.record(Gate::Confidence, GateStatus::Passed, format!("{confidence:.2}")),
            None => pre.record(Gate::Confidence, GateStatus::Skipped, "validator did not resolve the frame"),
        }

        // 4. Drift prediction against the baseline
        let planned = [request.tool.clone()];
        let prediction = self.baselines.predict(
            &request.frame,
            request.interpretation.as_deref(),
            &planned,
            &agent,
        );
        match &prediction {
            None => {
                pre.record(Gate::Baseline, GateStatus::Skipped, "no baseline for this frame");
                pre.record(Gate::DriftPrediction, GateStatus::Skipped, "no baseline for this frame");
            }
            Some(p) => {
                pre.predicted_drift = Some(p.predicted_drift);
                pre.baseline_deviation = Some(p.baseline_deviation);
                pre.record(
                    Gate::Baseline,
                    GateStatus::Passed,
                    format!(
                        "deviation {:.3} from {} baseline",
                        p.baseline_deviation,
                        if p.used_global { "global" } else { "agent" }
                    ),
                );
                let block_threshold = self.config.read().drift.block_threshold;
                if p.predicted_drift >= block_threshold {
                    let reason = format!(
                        "predicted drift {:.3} at or above block threshold {:.3}",
                        p.predicted_drift, block_threshold
                    );
                    pre.record(Gate::DriftPrediction, GateStatus::Blocked, reason.clone());
                    warn!(agent = %agent, tool = %request.tool, predicted_drift = p.predicted_drift, "request blocked by drift prediction");
                    return ExecuteResult::blocked(reason, pre);
                }
                pre.record(Gate::DriftPrediction, GateStatus::Passed, format!("{:.3}", p.predicted_drift));
            }
        }

        // 5. Hold
        let bypass = self.approved_bypass(&request);
        if let Some(decision) = &bypass {
            pre.record(Gate::Hold, GateStatus::Bypassed, format!("approved by {}", decision.decided_by));
        } else {
            let signals = HoldSignals {
                // a half-open circuit admits trial requests only under review
                breaker_blocked: circuit.state == CircuitState::HalfOpen,
                predicted_drift: pre.predicted_drift,
                baseline_deviation: pre.baseline_deviation,
                confidence: pre.confidence,
                forbidden_override: resolved
                    .as_ref()
                    .is_some_and(|r| r.bindings.forbids(&request.tool)),
                autonomy: self.trust.level(&agent),
            };
            if let Some(verdict) = self.holds.should_hold(&request.tool, &signals) {
                let reason = verdict.reason;
                let action = HeldAction {
                    frame: request.frame.clone(),
                    tool: request.tool.clone(),
                    arguments: request.arguments.clone(),
                };
                let hold = self.guarded(|| self.holds.create_hold(&agent, action, verdict));
                pre.record(Gate::Hold, GateStatus::Held, format!("{reason}: hold {}", hold.hold_id));
                info!(agent = %agent, tool = %request.tool, hold_id = %hold.hold_id, reason = %reason, "request held for review");
                return ExecuteResult::held(hold.hold_id, reason.to_string(), pre);
            }
            pre.record(Gate::Hold, GateStatus::Passed, "no hold required");
        }

        // 6. Interceptor
        let (frame, arguments) = request.effective_call(bypass.as_ref());
        let (frame, arguments) = (frame.to_string(), arguments.clone());
        let decision = self
            .interceptor
            .check(&agent, resolved.as_ref(), &request.tool, &arguments)
            .await;
        if !decision.allowed {
            let reason = format!("denied by interceptor: {}", decision.reason);
            pre.record(Gate::Interceptor, GateStatus::Blocked, decision.reason.clone());
            self.if_tracked(&agent, || {
                self.breaker.record_failure(&agent, &reason);
                self.baselines.record_violation(&agent, &frame, &decision.reason);
            });
            warn!(agent = %agent, tool = %request.tool, reason = %decision.reason, "request denied by interceptor");
            let mut result = ExecuteResult::blocked(reason, pre);
            result.interceptor_decision = Some(decision);
            return result;
        }
        pre.record(Gate::Interceptor, GateStatus::Passed, decision.reason.clone());
        pre.passed = true;

        // 7. Execute
        let call = ToolCall {
            id: Uuid::new_v4().to_string(),
            agent_id: agent.clone(),
            frame: frame.clone(),
            tool_name: request.tool.clone(),
            arguments,
        };
        debug!(agent = %agent, tool = %call.tool_name, call_id = %call.id, "executing tool");
        let tool_result = match self.executor.execute(&call).await {
            Ok(result) if !result.is_error => result,
            Ok(result) => {
                let error = match &result.content {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                return self.tool_failed(&agent, &frame, &request.tool, error, Some(result), pre, decision);
            }
            Err(e) => {
                return self.tool_failed(&agent, &frame, &request.tool, e.to_string(), None, pre, decision);
            }
        };

        // 8. Post-audit
        let behavior = if tool_result.behavior.is_empty() {
            vec![request.tool.clone()]
        } else {
            tool_result.behavior.clone()
        };
        let behavior_hash = behavior_fingerprint(&behavior);
        let comparison = self.baselines.compare_to_baseline(
            &frame,
            request.interpretation.as_deref(),
            &behavior,
            &agent,
        );
        let drift_cfg = self.config.read().drift.clone();
        let history = self.history_window(&agent);
        let alerts = audit(
            &AuditInput {
                agent_id: &agent,
                frame: &frame,
                stated_interpretation: request.interpretation.as_deref(),
                comparison: &comparison,
                behavior_hash: &behavior_hash,
                history: &history,
                now: self.clock.now(),
            },
            &drift_cfg,
        );

        // The agent may have been evicted while its tool ran; its state stays gone.
        let tracked = self.if_tracked(&agent, || {
            self.breaker.record_success(&agent);
            if comparison.has_baseline {
                self.breaker.record_drift(&agent, comparison.drift_score);
            }
        });
        if tracked {
            for alert in &alerts {
                self.raise(alert.clone());
            }
        }

        // 9. Immediate action on severe drift
        let halting = alerts.iter().find(|a| {
            (a.severity == Severity::Critical && drift_cfg.halt_on_critical)
                || (a.severity == Severity::High && drift_cfg.halt_on_high)
        });
        let halted = match halting {
            Some(alert) if tracked => {
                self.halt_agent(&agent, &format!("{} {} alert: {}", alert.severity, alert.alert_type, alert.message));
                true
            }
            _ => false,
        };

        self.record_execution(
            &agent,
            ExecutionRecord {
                execution_id: Uuid::new_v4(),
                frame: frame.clone(),
                tool: request.tool.clone(),
                success: true,
                behavior_hash: behavior_hash.clone(),
                drift_score: comparison.drift_score,
                alerts: alerts.len(),
                timestamp: self.clock.now(),
            },
        );
        // Opening the circuit already cost the agent a trust level.
        let tripped = self
            .breaker
            .state(&agent)
            .is_some_and(|s| s.state == CircuitState::Open);
        self.if_tracked(&agent, || match alerts.iter().map(|a| a.severity).max() {
            None => self.trust.record_hit(&agent),
            Some(worst) if tripped => self.trust.record_miss(&agent, worst.min(Severity::High)),
            Some(worst) => self.trust.record_miss(&agent, worst),
        });

        ExecuteResult {
            success: true,
            allowed: true,
            held: false,
            hold_id: None,
            result: Some(tool_result),
            error: None,
            reason: None,
            pre_flight: pre,
            interceptor_decision: Some(decision),
            post_audit: Some(PostAudit {
                comparison,
                behavior,
                behavior_hash,
                alerts,
                halted,
            }),
        }
    }

    /// Execute a held action after an operator approved it.
    pub async fn resume_hold(&self, hold_id: Uuid) -> warden_core::Result<ExecuteResult> {
        let hold = self
            .holds
            .get_hold(hold_id)
            .ok_or(WardenError::HoldNotFound(hold_id))?;
        if !hold.is_approved() {
            return Err(WardenError::HoldNotApproved {
                hold_id,
                state: format!("{:?}", hold.state).to_lowercase(),
            });
        }
        let request = ExecuteRequest {
            agent_id: hold.agent_id.clone(),
            frame: hold.action.frame.clone(),
            tool: hold.action.tool.clone(),
            arguments: hold.action.arguments.clone(),
            interpretation: None,
            bypass_hold: true,
            hold_id: Some(hold_id),
            hold_decision: hold.decision.clone(),
        };
        info!(hold_id = %hold_id, agent = %hold.agent_id, tool = %hold.action.tool, "resuming approved hold");
        Ok(self.execute(request).await)
    }

    // ── Operator controls ──────────────────────────────────────

    /// Stop an agent until an operator resumes it.
    pub fn halt_agent(&self, agent_id: &str, reason: &str) {
        self.touch(agent_id);
        self.guarded(|| self.breaker.open_circuit(agent_id, reason));
        warn!(agent = %agent_id, reason = %reason, "agent halted");
        self.events.publish(WardenEvent::AgentHalted {
            agent_id: agent_id.to_string(),
            reason: reason.to_string(),
        });
    }

    pub fn resume_agent(&self, agent_id: &str) {
        self.guarded(|| self.breaker.close_circuit(agent_id));
        info!(agent = %agent_id, "agent resumed");
        self.events.publish(WardenEvent::AgentResumed {
            agent_id: agent_id.to_string(),
        });
    }

    pub fn approve_hold(
        &self,
        hold_id: Uuid,
        decided_by: &str,
        reason: Option<&str>,
    ) -> warden_core::Result<HoldRequest> {
        self.guarded(|| self.holds.approve_hold(hold_id, decided_by, reason))
    }

    pub fn approve_hold_with(
        &self,
        hold_id: Uuid,
        decided_by: &str,
        reason: Option<&str>,
        modified_frame: Option<String>,
        modified_args: Option<Value>,
    ) -> warden_core::Result<HoldRequest> {
        self.guarded(|| {
            self.holds
                .approve_hold_with(hold_id, decided_by, reason, modified_frame, modified_args)
        })
    }

    pub fn reject_hold(
        &self,
        hold_id: Uuid,
        decided_by: &str,
        reason: Option<&str>,
    ) -> warden_core::Result<HoldRequest> {
        self.guarded(|| self.holds.reject_hold(hold_id, decided_by, reason))
    }

    pub fn process_expired_holds(&self) -> Vec<HoldRequest> {
        self.guarded(|| self.holds.process_expired_holds())
    }

    pub fn pending_holds(&self, agent_id: Option<&str>) -> Vec<HoldRequest> {
        self.holds.pending_holds(agent_id)
    }

    /// Record the expected reading and behavior of a frame for an agent, or for
    /// [`GLOBAL_AGENT`] to cover every agent without its own baseline.
    pub fn record_baseline(
        &self,
        frame: &str,
        interpretation: &str,
        behavior: &[String],
        agent_id: &str,
    ) -> BaselineRecord {
        if agent_id != GLOBAL_AGENT {
            self.touch(agent_id);
        }
        self.guarded(|| {
            self.baselines
                .record_baseline(frame, interpretation, behavior, agent_id)
        })
    }

    /// Run every tripwire through the configured validator.
    pub async fn run_tripwire_suite(&self) -> TripwireSuiteReport {
        let mut results = Vec::new();
        for tripwire in TripwireInjector::tripwires() {
            let report = self.validator.validate(tripwire.frame).await;
            results.push(self.tripwires.evaluate(tripwire, GLOBAL_AGENT, report.valid));
        }
        let report = TripwireInjector::report(results);
        info!(
            total = report.total,
            passed = report.passed,
            failed = report.failed,
            "tripwire suite finished"
        );
        report
    }

    // ── Eviction ───────────────────────────────────────────────

    /// Drop every piece of state held for an agent. Returns whether it was tracked.
    pub fn evict_agent(&self, agent_id: &str) -> bool {
        self.purge(agent_id)
    }

    /// Evict agents idle for longer than `agents.inactivity_timeout_secs`.
    pub fn evict_inactive(&self) -> Vec<String> {
        let timeout = Duration::seconds(self.config.read().agents.inactivity_timeout_secs as i64);
        let stale = self.registry.lock().inactive(self.clock.now(), timeout);
        for agent_id in &stale {
            self.purge(agent_id);
        }
        if !stale.is_empty() {
            info!(count = stale.len(), "evicted inactive agents");
        }
        stale
    }

    /// Periodically sweep expired holds and idle agents.
    pub fn spawn_maintenance(
        self: Arc<Self>,
        every: std::time::Duration,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let expired = self.process_expired_holds();
                let evicted = self.evict_inactive();
                debug!(expired = expired.len(), evicted = evicted.len(), "maintenance sweep");
            }
        })
    }

    // ── Queries ────────────────────────────────────────────────

    pub fn agent_health(&self, agent_id: &str) -> AgentHealth {
        // check() applies a due open -> half-open transition before we read the state
        self.breaker.check(agent_id);
        let breaker = self.breaker.state(agent_id);
        let (state, manual, reason, failures) = match breaker {
            Some(s) => (s.state, s.manual, s.reason, s.failure_count),
            None => (CircuitState::Closed, false, None, 0),
        };
        let recent_alerts = self.recent_alerts(agent_id);
        let pending = self.holds.pending_count(Some(agent_id));
        let tripwire_rate = self.tripwires.failure_rate(agent_id);

        AgentHealth {
            agent_id: agent_id.to_string(),
            health: grade_agent(state, manual, &recent_alerts, pending, tripwire_rate),
            breaker_state: state,
            breaker_reason: reason,
            failure_count: failures,
            pending_holds: pending,
            recent_alerts,
            autonomy: self.trust.level(agent_id),
            tripwire_failure_rate: tripwire_rate,
            active_frame: self.active_frame(agent_id),
        }
    }

    pub fn system_health(&self) -> SystemHealth {
        let mut ids: BTreeSet<String> = self.registry.lock().ids().into_iter().collect();
        ids.extend(self.breaker.all_states().into_iter().map(|s| s.agent_id));
        let agents: Vec<AgentHealth> = ids.iter().map(|id| self.agent_health(id)).collect();
        summarize(&agents, self.holds.pending_count(None))
    }

    /// Stored alerts, oldest first.
    pub fn alerts(&self, agent_id: Option<&str>) -> Vec<DriftAlert> {
        self.alerts
            .lock()
            .iter()
            .filter(|a| agent_id.is_none_or(|id| a.agent_id == id))
            .cloned()
            .collect()
    }

    pub fn history(&self, agent_id: &str) -> Vec<ExecutionRecord> {
        self.registry
            .lock()
            .slot(agent_id)
            .map(|s| s.history.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Frame of the agent's most recent successful execution.
    pub fn active_frame(&self, agent_id: &str) -> Option<String> {
        self.registry
            .lock()
            .slot(agent_id)
            .and_then(|s| s.active_frame.clone())
    }

    pub fn tracked_agents(&self) -> Vec<String> {
        self.registry.lock().ids()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WardenEvent> {
        self.events.subscribe()
    }

    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn baselines(&self) -> &BaselineStore {
        &self.baselines
    }

    pub fn holds(&self) -> &HoldManager {
        &self.holds
    }

    pub fn tripwires(&self) -> &TripwireInjector {
        &self.tripwires
    }

    pub fn trust(&self) -> &TrustLedger {
        &self.trust
    }

    // ── Internals ──────────────────────────────────────────────

    /// Run a per-agent mutation with eviction held off.
    fn guarded<T>(&self, f: impl FnOnce() -> T) -> T {
        let _gate = self.eviction_gate.read();
        f()
    }

    /// Like [`Self::guarded`], but skipped once the agent has left the registry.
    fn if_tracked<T>(&self, agent_id: &str, f: impl FnOnce() -> T) -> bool {
        let _gate = self.eviction_gate.read();
        let tracked = self.registry.lock().slot(agent_id).is_some();
        if tracked {
            f();
        }
        tracked
    }

    /// The stored decision of the approved hold a request resumes. A bypass that names no
    /// hold, or a hold for another agent or tool, gets nothing.
    fn approved_bypass(&self, request: &ExecuteRequest) -> Option<HoldDecision> {
        if !request.bypass_hold {
            return None;
        }
        let hold = request.hold_id.and_then(|id| self.holds.get_hold(id));
        match hold {
            Some(hold)
                if hold.is_approved()
                    && hold.agent_id == request.agent_id
                    && hold.action.tool == request.tool =>
            {
                hold.decision
            }
            _ => {
                warn!(
                    agent = %request.agent_id,
                    tool = %request.tool,
                    hold_id = ?request.hold_id,
                    "hold bypass ignored: no matching approved hold"
                );
                None
            }
        }
    }

    fn touch(&self, agent_id: &str) {
        let max_agents = self.config.read().agents.max_agents;
        let now = self.clock.now();
        let pushed_out = self.guarded(|| self.registry.lock().touch(agent_id, now, max_agents));
        for id in pushed_out {
            debug!(agent = %id, "agent pushed out of the registry");
            self.purge(&id);
        }
    }

    fn purge(&self, agent_id: &str) -> bool {
        let _gate = self.eviction_gate.write();
        let tracked = self.registry.lock().remove(agent_id);
        let breaker = self.breaker.evict(agent_id);
        let baselines = self.baselines.evict_agent(agent_id);
        let holds = self.holds.evict_agent(agent_id);
        self.tripwires.evict_agent(agent_id);
        self.trust.evict(agent_id);
        self.alerts.lock().retain(|a| a.agent_id != agent_id);

        let had_state = tracked || breaker || baselines > 0 || holds > 0;
        if had_state {
            debug!(agent = %agent_id, baselines, holds, "agent evicted");
            self.events.publish(WardenEvent::AgentEvicted {
                agent_id: agent_id.to_string(),
            });
        }
        had_state
    }

    async fn maybe_tripwire(&self, agent_id: &str, pre: &mut PreFlightCheck) {
        if !self.tripwires.should_inject() {
            return;
        }
        let tripwire = self.tripwires.plant();
        let report = self.validator.validate(tripwire.frame).await;
        let result = self.guarded(|| self.tripwires.evaluate(tripwire, agent_id, report.valid));
        if result.passed {
            pre.record(Gate::Tripwire, GateStatus::Passed, tripwire.id);
            return;
        }

        pre.record(
            Gate::Tripwire,
            GateStatus::Failed,
            format!(
                "{}: expected {:?}, validator gave {:?}",
                tripwire.id, result.expected_outcome, result.actual_outcome
            ),
        );
        self.raise(DriftAlert::new(
            agent_id,
            AlertType::TripwireFailure,
            Severity::High,
            format!("validator mis-judged tripwire {}", tripwire.id),
            json!({
                "tripwire_id": tripwire.id,
                "frame": tripwire.frame,
                "expected": result.expected_outcome,
                "actual": result.actual_outcome,
            }),
            self.clock.now(),
        ));
        self.if_tracked(agent_id, || {
            self.breaker
                .record_failure(agent_id, &format!("tripwire {} failed", tripwire.id))
        });
    }

    #[allow(clippy::too_many_arguments)]
    fn tool_failed(
        &self,
        agent_id: &str,
        frame: &str,
        tool: &str,
        error: String,
        result: Option<ToolResult>,
        pre: PreFlightCheck,
        decision: InterceptorDecision,
    ) -> ExecuteResult {
        warn!(agent = %agent_id, tool = %tool, error = %error, "tool execution failed");
        self.if_tracked(agent_id, || {
            self.breaker
                .record_failure(agent_id, &format!("tool {tool} failed: {error}"))
        });
        self.record_execution(
            agent_id,
            ExecutionRecord {
                execution_id: Uuid::new_v4(),
                frame: frame.to_string(),
                tool: tool.to_string(),
                success: false,
                behavior_hash: String::new(),
                drift_score: 0.0,
                alerts: 0,
                timestamp: self.clock.now(),
            },
        );
        ExecuteResult {
            success: false,
            allowed: true,
            held: false,
            hold_id: None,
            result,
            error: Some(error),
            reason: None,
            pre_flight: pre,
            interceptor_decision: Some(decision),
            post_audit: None,
        }
    }

    fn raise(&self, alert: DriftAlert) {
        warn!(
            agent = %alert.agent_id,
            alert_type = %alert.alert_type,
            severity = %alert.severity,
            message = %alert.message,
            "drift alert"
        );
        self.events.publish(WardenEvent::DriftDetected {
            alert_id: alert.alert_id,
            agent_id: alert.agent_id.clone(),
            alert_type: alert.alert_type.to_string(),
            severity: alert.severity,
        });
        let max_alerts = self.config.read().agents.max_alerts;
        self.guarded(|| {
            let mut alerts = self.alerts.lock();
            alerts.push_back(alert);
            while alerts.len() > max_alerts {
                alerts.pop_front();
            }
        });
    }

    fn recent_alerts(&self, agent_id: &str) -> Vec<DriftAlert> {
        let alerts = self.alerts.lock();
        let mut recent: Vec<DriftAlert> = alerts
            .iter()
            .rev()
            .filter(|a| a.agent_id == agent_id)
            .take(RECENT_ALERTS)
            .cloned()
            .collect();
        recent.reverse();
        recent
    }

    fn history_window(&self, agent_id: &str) -> VecDeque<ExecutionRecord> {
        self.registry
            .lock()
            .slot(agent_id)
            .map(|s| s.history.clone())
            .unwrap_or_default()
    }

    fn record_execution(&self, agent_id: &str, record: ExecutionRecord) {
        let max_history = self.config.read().agents.max_history;
        self.guarded(|| {
            let mut registry = self.registry.lock();
            // An agent evicted mid-request stays evicted.
            let Some(slot) = registry.slot_mut(agent_id) else {
                return;
            };
            if record.success {
                slot.active_frame = Some(record.frame.clone());
            }
            slot.history.push_back(record);
            while slot.history.len() > max_history {
                slot.history.pop_front();
            }
        });
    }
}
