#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::{Value, json};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use warden_config::{WardenConfig, shared};
    use warden_core::{
        FrameValidator, ManualClock, SymbolicValidator, ToolCall, ToolExecutor, ToolResult,
        ValidationReport, WardenError, WardenEvent,
    };
    use warden_runtime::{ExecuteRequest, Gatekeeper};

    const FRAME: &str = "●◆→α";

    /// Executes anything. `{"fail": true}` reports a tool error, `{"crash": true}` returns
    /// an executor error, and `{"behavior": [...]}` sets the observed behavior.
    #[derive(Default)]
    struct ScriptedExecutor {
        calls: Mutex<Vec<ToolCall>>,
    }

    impl ScriptedExecutor {
        fn calls(&self) -> Vec<ToolCall> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl ToolExecutor for ScriptedExecutor {
        async fn execute(&self, call: &ToolCall) -> warden_core::Result<ToolResult> {
            self.calls.lock().push(call.clone());
            if call.arguments.get("crash").and_then(Value::as_bool) == Some(true) {
                return Err(WardenError::ToolExecution {
                    tool: call.tool_name.clone(),
                    reason: "connection reset".into(),
                });
            }
            if call.arguments.get("fail").and_then(Value::as_bool) == Some(true) {
                return Ok(ToolResult::error("tool exploded"));
            }
            let behavior = call
                .arguments
                .get("behavior")
                .and_then(Value::as_array)
                .map(|a| a.iter().filter_map(Value::as_str).map(String::from).collect())
                .unwrap_or_default();
            Ok(ToolResult::ok(json!({ "tool": call.tool_name })).with_behavior(behavior))
        }
    }

    /// Counts calls; optionally accepts every frame.
    #[derive(Default)]
    struct CountingValidator {
        calls: AtomicUsize,
        accept_all: bool,
    }

    #[async_trait]
    impl FrameValidator for CountingValidator {
        async fn validate(&self, frame: &str) -> ValidationReport {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.accept_all {
                return ValidationReport {
                    valid: true,
                    ..Default::default()
                };
            }
            SymbolicValidator.check(frame)
        }
    }

    struct Harness {
        gk: Gatekeeper,
        executor: Arc<ScriptedExecutor>,
        validator: Arc<CountingValidator>,
        clock: ManualClock,
    }

    fn harness_with(tweak: impl FnOnce(&mut WardenConfig), accept_all: bool) -> Harness {
        let mut config = WardenConfig::default();
        config.tripwire.enabled = false;
        tweak(&mut config);
        let clock = ManualClock::default();
        let executor = Arc::new(ScriptedExecutor::default());
        let validator = Arc::new(CountingValidator {
            calls: AtomicUsize::new(0),
            accept_all,
        });
        let gk = Gatekeeper::builder(shared(config))
            .clock(Arc::new(clock.clone()))
            .executor(executor.clone())
            .validator(validator.clone())
            .build()
            .unwrap();
        Harness {
            gk,
            executor,
            validator,
            clock,
        }
    }

    fn harness(tweak: impl FnOnce(&mut WardenConfig)) -> Harness {
        harness_with(tweak, false)
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn pay_baseline(h: &Harness, agent: &str) {
        h.gk
            .record_baseline(FRAME, "pay the invoice", &strings(&["pay_invoice"]), agent);
    }

    fn drain(rx: &mut tokio::sync::broadcast::Receiver<WardenEvent>) -> Vec<WardenEvent> {
        let mut events = Vec::new();
        while let Ok(e) = rx.try_recv() {
            events.push(e);
        }
        events
    }

    // ── Builder ────────────────────────────────────────────────

    mod builder {
        use super::*;

        #[test]
        fn test_executor_is_required() {
            let result = Gatekeeper::builder(shared(WardenConfig::default())).build();
            assert!(matches!(result, Err(WardenError::Config(_))));
        }
    }

    // ── Happy path ─────────────────────────────────────────────

    mod pipeline {
        use super::*;
        use warden_runtime::{Gate, GateStatus};

        #[tokio::test]
        async fn test_clean_request_runs_every_gate() {
            let h = harness(|_| {});
            let result = h.gk.execute(ExecuteRequest::new("a1", FRAME, "pay_invoice")).await;

            assert!(result.success);
            assert!(result.allowed);
            assert!(!result.held);
            assert!(result.pre_flight.passed);
            assert!(!result.pre_flight.blocked);
            assert_eq!(result.pre_flight.confidence, Some(1.0));
            assert_eq!(
                result.pre_flight.gate(Gate::Validation).unwrap().status,
                GateStatus::Passed
            );
            assert_eq!(
                result.pre_flight.gate(Gate::DriftPrediction).unwrap().status,
                GateStatus::Skipped
            );
            assert!(result.pre_flight.gate(Gate::Tripwire).is_none());
            assert!(result.interceptor_decision.unwrap().allowed);

            let audit = result.post_audit.unwrap();
            assert!(!audit.comparison.has_baseline);
            assert_eq!(audit.behavior, strings(&["pay_invoice"]));
            assert!(audit.alerts.is_empty());
            assert!(!audit.halted);

            assert_eq!(h.executor.calls().len(), 1);
            assert_eq!(h.gk.history("a1").len(), 1);
            assert_eq!(h.gk.active_frame("a1").as_deref(), Some(FRAME));
            assert_eq!(h.gk.trust().state("a1").unwrap().hits, 1);
        }

        #[tokio::test]
        async fn test_invalid_frame_blocks_and_counts_as_failure() {
            let h = harness(|_| {});
            let result = h.gk.execute(ExecuteRequest::new("a1", "●●◆→", "pay_invoice")).await;

            assert!(result.is_blocked());
            assert!(result.reason.unwrap().starts_with("frame validation failed"));
            assert_eq!(
                result.pre_flight.gate(Gate::Validation).unwrap().status,
                GateStatus::Blocked
            );
            assert!(h.executor.calls().is_empty());
            assert_eq!(h.gk.breaker().state("a1").unwrap().failure_count, 1);
        }

        #[tokio::test]
        async fn test_history_is_capped() {
            let h = harness(|c| {
                c.agents.max_history = 3;
                c.drift.pattern_min_history = 2;
            });
            for _ in 0..5 {
                h.gk.execute(ExecuteRequest::new("a1", FRAME, "pay_invoice")).await;
            }
            assert_eq!(h.gk.history("a1").len(), 3);
        }
    }

    // ── Circuit breaker ────────────────────────────────────────

    mod breaker {
        use super::*;
        use chrono::Duration;
        use warden_core::Health;
        use warden_safety::CircuitState;

        #[tokio::test]
        async fn test_halted_agent_reaches_no_collaborator() {
            let h = harness(|_| {});
            h.gk.halt_agent("a1", "operator says stop");
            let before = h.validator.calls.load(Ordering::SeqCst);

            let result = h.gk.execute(ExecuteRequest::new("a1", FRAME, "pay_invoice")).await;
            assert!(result.is_blocked());
            assert!(result.reason.unwrap().contains("operator says stop"));
            assert_eq!(h.validator.calls.load(Ordering::SeqCst), before);
            assert!(h.executor.calls().is_empty());
            assert_eq!(h.gk.agent_health("a1").health, Health::Halted);
        }

        #[tokio::test]
        async fn test_halt_survives_the_open_timeout() {
            let h = harness(|_| {});
            h.gk.halt_agent("a1", "stop");
            h.clock.advance(Duration::hours(2));
            let result = h.gk.execute(ExecuteRequest::new("a1", FRAME, "pay_invoice")).await;
            assert!(result.is_blocked());
        }

        #[tokio::test]
        async fn test_resume_closes_circuit() {
            let h = harness(|_| {});
            let mut rx = h.gk.subscribe();
            h.gk.halt_agent("a1", "stop");
            h.gk.resume_agent("a1");

            let result = h.gk.execute(ExecuteRequest::new("a1", FRAME, "pay_invoice")).await;
            assert!(result.success);

            let events = drain(&mut rx);
            assert!(events.iter().any(|e| matches!(e, WardenEvent::AgentHalted { .. })));
            assert!(events.iter().any(|e| matches!(e, WardenEvent::AgentResumed { .. })));
        }

        #[tokio::test]
        async fn test_tool_errors_open_the_circuit() {
            let h = harness(|c| c.breaker.failure_threshold = 2);
            let failing = || {
                ExecuteRequest::new("a1", FRAME, "pay_invoice").with_arguments(json!({ "fail": true }))
            };

            let first = h.gk.execute(failing()).await;
            assert!(first.allowed);
            assert!(!first.success);
            assert_eq!(first.error.as_deref(), Some("tool exploded"));
            assert!(first.post_audit.is_none());

            h.gk.execute(failing()).await;
            let state = h.gk.breaker().state("a1").unwrap();
            assert_eq!(state.state, CircuitState::Open);

            let third = h.gk.execute(ExecuteRequest::new("a1", FRAME, "pay_invoice")).await;
            assert!(third.is_blocked());
            assert_eq!(h.executor.calls().len(), 2);
            // Failed executions are kept but never become the active frame
            assert_eq!(h.gk.history("a1").len(), 2);
            assert!(h.gk.active_frame("a1").is_none());
        }

        #[tokio::test]
        async fn test_half_open_request_is_held_for_review() {
            let h = harness(|c| c.breaker.failure_threshold = 1);
            h.gk.execute(
                ExecuteRequest::new("a1", FRAME, "pay_invoice").with_arguments(json!({ "fail": true })),
            )
            .await;
            assert_eq!(h.gk.breaker().state("a1").unwrap().state, CircuitState::Open);

            h.clock.advance(Duration::seconds(61));
            let trial = h.gk.execute(ExecuteRequest::new("a1", FRAME, "pay_invoice")).await;
            assert!(trial.held);
            assert_eq!(trial.reason.as_deref(), Some("circuit_breaker_tripped"));
            assert_eq!(h.gk.breaker().state("a1").unwrap().state, CircuitState::HalfOpen);
            assert_eq!(h.executor.calls().len(), 1);

            let hold_id = trial.hold_id.unwrap();
            h.gk.approve_hold(hold_id, "ops", Some("try once")).unwrap();
            let resumed = h.gk.resume_hold(hold_id).await.unwrap();
            assert!(resumed.success);
            assert_eq!(h.executor.calls().len(), 2);
            assert_eq!(h.gk.breaker().state("a1").unwrap().success_count, 1);
        }

        #[tokio::test]
        async fn test_executor_error_is_a_failure_not_a_panic() {
            let h = harness(|_| {});
            let result = h
                .gk
                .execute(
                    ExecuteRequest::new("a1", FRAME, "pay_invoice")
                        .with_arguments(json!({ "crash": true })),
                )
                .await;
            assert!(!result.success);
            assert!(result.error.unwrap().contains("connection reset"));
            assert_eq!(h.gk.breaker().state("a1").unwrap().failure_count, 1);
        }
    }

    // ── Holds ──────────────────────────────────────────────────

    mod holds {
        use super::*;
        use chrono::Duration;
        use warden_runtime::{Gate, GateStatus};
        use warden_safety::{HoldDecision, HoldReason, HoldState};

        fn gated() -> Harness {
            harness(|c| c.hold.mcp_validation_tools = vec!["dangerous_*".into()])
        }

        #[tokio::test]
        async fn test_matching_tool_is_held() {
            let h = gated();
            let result = h.gk.execute(ExecuteRequest::new("a1", FRAME, "dangerous_op")).await;

            assert!(result.held);
            assert!(!result.allowed);
            assert!(!result.is_blocked());
            assert_eq!(result.reason.as_deref(), Some("mcp_validation_pending"));
            assert!(result.pre_flight.held);
            assert!(h.executor.calls().is_empty());

            let hold = h.gk.holds().get_hold(result.hold_id.unwrap()).unwrap();
            assert_eq!(hold.reason, HoldReason::McpValidationPending);
            assert_eq!(hold.state, HoldState::Pending);
            assert_eq!(h.gk.pending_holds(Some("a1")).len(), 1);
        }

        #[tokio::test]
        async fn test_rejected_hold_cannot_resume() {
            let h = gated();
            let result = h.gk.execute(ExecuteRequest::new("a1", FRAME, "dangerous_op")).await;
            let hold_id = result.hold_id.unwrap();

            h.gk.reject_hold(hold_id, "ops", Some("no")).unwrap();
            assert!(h.gk.pending_holds(Some("a1")).is_empty());
            let err = h.gk.resume_hold(hold_id).await.unwrap_err();
            assert!(matches!(err, WardenError::HoldNotApproved { ref state, .. } if state == "rejected"));
            assert!(h.executor.calls().is_empty());
        }

        #[tokio::test]
        async fn test_unknown_hold() {
            let h = gated();
            let err = h.gk.resume_hold(uuid::Uuid::new_v4()).await.unwrap_err();
            assert!(matches!(err, WardenError::HoldNotFound(_)));
        }

        #[tokio::test]
        async fn test_approved_hold_resumes_with_amended_arguments() {
            let h = gated();
            let result = h
                .gk
                .execute(
                    ExecuteRequest::new("a1", FRAME, "dangerous_op")
                        .with_arguments(json!({ "amount": 5000 })),
                )
                .await;
            let hold_id = result.hold_id.unwrap();

            h.gk.approve_hold_with(hold_id, "ops", Some("smaller"), None, Some(json!({ "amount": 50 })))
                .unwrap();
            let resumed = h.gk.resume_hold(hold_id).await.unwrap();

            assert!(resumed.success);
            assert_eq!(
                resumed.pre_flight.gate(Gate::Hold).unwrap().status,
                GateStatus::Bypassed
            );
            let calls = h.executor.calls();
            assert_eq!(calls.len(), 1);
            assert_eq!(calls[0].arguments, json!({ "amount": 50 }));
            assert_eq!(calls[0].tool_name, "dangerous_op");
        }

        #[tokio::test]
        async fn test_bypass_without_approval_is_ignored() {
            let h = gated();
            let mut request = ExecuteRequest::new("a1", FRAME, "dangerous_op");
            request.bypass_hold = true;
            let result = h.gk.execute(request).await;
            assert!(result.held);
        }

        #[tokio::test]
        async fn test_decision_without_a_hold_is_still_held() {
            let h = gated();
            let mut request = ExecuteRequest::new("a1", FRAME, "dangerous_op");
            request.bypass_hold = true;
            request.hold_id = Some(uuid::Uuid::new_v4());
            request.hold_decision = Some(HoldDecision {
                decided_by: "a1".into(),
                decided_at: chrono::Utc::now(),
                reason: None,
                approved: true,
                modified_frame: Some("●◆→β".into()),
                modified_args: None,
            });

            let result = h.gk.execute(request).await;
            assert!(result.held);
            assert!(h.executor.calls().is_empty());
        }

        #[tokio::test]
        async fn test_approval_covers_only_its_agent_and_tool() {
            let h = gated();
            let held = h.gk.execute(ExecuteRequest::new("a1", FRAME, "dangerous_op")).await;
            let hold_id = held.hold_id.unwrap();
            h.gk.approve_hold(hold_id, "ops", None).unwrap();

            let mut other_tool = ExecuteRequest::new("a1", FRAME, "dangerous_wipe");
            other_tool.bypass_hold = true;
            other_tool.hold_id = Some(hold_id);
            assert!(h.gk.execute(other_tool).await.held);

            let mut other_agent = ExecuteRequest::new("a2", FRAME, "dangerous_op");
            other_agent.bypass_hold = true;
            other_agent.hold_id = Some(hold_id);
            assert!(h.gk.execute(other_agent).await.held);

            assert!(h.executor.calls().is_empty());
        }

        #[tokio::test]
        async fn test_holds_expire() {
            let h = gated();
            let result = h.gk.execute(ExecuteRequest::new("a1", FRAME, "dangerous_op")).await;
            let hold_id = result.hold_id.unwrap();

            h.clock.advance(Duration::seconds(301));
            let expired = h.gk.process_expired_holds();
            assert_eq!(expired.len(), 1);
            assert_eq!(h.gk.holds().get_hold(hold_id).unwrap().state, HoldState::Expired);
            assert!(h.gk.resume_hold(hold_id).await.is_err());
        }

        #[tokio::test]
        async fn test_low_confidence_is_held() {
            let h = harness(|_| {});
            let result = h.gk.execute(ExecuteRequest::new("a1", "●⊥", "read_notes")).await;
            assert!(result.held);
            let hold = h.gk.holds().get_hold(result.hold_id.unwrap()).unwrap();
            assert_eq!(hold.reason, HoldReason::LowConfidence);
        }

        #[tokio::test]
        async fn test_forbidden_tool_is_held() {
            let h = harness(|_| {});
            let result = h.gk.execute(ExecuteRequest::new("a1", "●◆?α⊥", "write_ledger")).await;
            let hold = h.gk.holds().get_hold(result.hold_id.unwrap()).unwrap();
            assert_eq!(hold.reason, HoldReason::ForbiddenOverride);

            let read = h.gk.execute(ExecuteRequest::new("a1", "●◆?α⊥", "read_ledger")).await;
            assert!(read.success);
        }

        #[tokio::test]
        async fn test_manual_autonomy_holds_everything() {
            let h = harness(|c| c.trust.initial_level = 0);
            let result = h.gk.execute(ExecuteRequest::new("a1", FRAME, "pay_invoice")).await;
            let hold = h.gk.holds().get_hold(result.hold_id.unwrap()).unwrap();
            assert_eq!(hold.reason, HoldReason::ManualAutonomy);
        }

        #[tokio::test]
        async fn test_predicted_drift_is_held() {
            let h = harness(|_| {});
            pay_baseline(&h, "a1");
            let result = h.gk.execute(ExecuteRequest::new("a1", FRAME, "refund")).await;

            assert!(result.held);
            assert!(result.pre_flight.predicted_drift.unwrap() >= 0.3);
            let hold = h.gk.holds().get_hold(result.hold_id.unwrap()).unwrap();
            assert_eq!(hold.reason, HoldReason::DriftThresholdExceeded);
        }

        #[tokio::test]
        async fn test_predicted_drift_over_block_threshold_blocks() {
            let h = harness(|c| c.drift.block_threshold = 0.45);
            pay_baseline(&h, "a1");
            let result = h.gk.execute(ExecuteRequest::new("a1", FRAME, "refund")).await;

            assert!(result.is_blocked());
            assert_eq!(
                result.pre_flight.gate(Gate::DriftPrediction).unwrap().status,
                GateStatus::Blocked
            );
            assert_eq!(h.gk.pending_holds(None).len(), 0);
        }
    }

    // ── Interceptor ────────────────────────────────────────────

    mod interceptor {
        use super::*;

        #[tokio::test]
        async fn test_denial_records_violation_and_failure() {
            let h = harness(|_| {});
            let paths: Vec<String> = (0..6).map(|i| format!("/data/{i}")).collect();
            let result = h
                .gk
                .execute(
                    ExecuteRequest::new("a1", FRAME, "delete_files")
                        .with_arguments(json!({ "paths": paths })),
                )
                .await;

            assert!(result.is_blocked());
            assert!(!result.interceptor_decision.unwrap().allowed);
            assert!(h.executor.calls().is_empty());
            assert_eq!(h.gk.baselines().violations("a1").len(), 1);
            assert_eq!(h.gk.breaker().state("a1").unwrap().failure_count, 1);
        }
    }

    // ── Post-audit ─────────────────────────────────────────────

    mod audit {
        use super::*;
        use warden_core::{Health, Severity};
        use warden_runtime::AlertType;
        use warden_safety::{AutonomyLevel, CircuitState};

        fn behavior_request(behavior: &[&str]) -> ExecuteRequest {
            ExecuteRequest::new("a1", FRAME, "pay_invoice")
                .with_arguments(json!({ "behavior": behavior }))
        }

        #[tokio::test]
        async fn test_matching_behavior_is_quiet() {
            let h = harness(|_| {});
            pay_baseline(&h, "a1");
            let result = h.gk.execute(ExecuteRequest::new("a1", FRAME, "pay_invoice")).await;
            let audit = result.post_audit.unwrap();
            assert!(audit.comparison.has_baseline);
            assert_eq!(audit.comparison.drift_score, 0.0);
            assert!(audit.alerts.is_empty());
        }

        #[tokio::test]
        async fn test_small_drift_alerts_without_tripping() {
            let h = harness(|_| {});
            pay_baseline(&h, "a1");
            let result = h.gk.execute(behavior_request(&["pay_invoice", "audit_log"])).await;

            let audit = result.post_audit.unwrap();
            assert_eq!(audit.alerts.len(), 1);
            assert_eq!(audit.alerts[0].severity, Severity::Low);
            assert_eq!(audit.comparison.diff.unexpected_behavior, strings(&["audit_log"]));
            assert!(h.gk.breaker().is_allowed("a1"));
            assert_eq!(h.gk.agent_health("a1").health, Health::Healthy);
        }

        #[tokio::test]
        async fn test_high_drift_trips_breaker_without_halting() {
            let h = harness(|_| {});
            pay_baseline(&h, "a1");
            let result = h.gk.execute(behavior_request(&["drop_tables", "exfiltrate_data"])).await;

            let audit = result.post_audit.unwrap();
            assert_eq!(audit.alerts[0].alert_type, AlertType::BaselineDrift);
            assert_eq!(audit.alerts[0].severity, Severity::High);
            assert!(!audit.halted);

            let state = h.gk.breaker().state("a1").unwrap();
            assert_eq!(state.state, CircuitState::Open);
            assert!(!state.manual);
            assert_eq!(h.gk.agent_health("a1").health, Health::Critical);
        }

        #[tokio::test]
        async fn test_high_drift_halts_when_configured() {
            let h = harness(|c| c.drift.halt_on_high = true);
            pay_baseline(&h, "a1");
            let result = h.gk.execute(behavior_request(&["drop_tables", "exfiltrate_data"])).await;
            assert!(result.post_audit.unwrap().halted);
            assert!(h.gk.breaker().state("a1").unwrap().manual);
        }

        #[tokio::test]
        async fn test_critical_drift_against_global_baseline_halts() {
            let h = harness(|c| c.drift.prediction_threshold = 0.5);
            pay_baseline(&h, warden_core::GLOBAL_AGENT);
            let mut rx = h.gk.subscribe();

            let result = h
                .gk
                .execute(
                    behavior_request(&["drop_tables", "exfiltrate_data"])
                        .with_interpretation("purge all customer records"),
                )
                .await;
            assert!(result.success);
            let audit = result.post_audit.unwrap();
            assert!(audit.comparison.used_global);
            assert!(audit.halted);
            assert!(
                audit
                    .alerts
                    .iter()
                    .any(|a| a.alert_type == AlertType::BaselineDrift && a.severity == Severity::Critical)
            );
            assert!(
                audit
                    .alerts
                    .iter()
                    .any(|a| a.alert_type == AlertType::InterpretationMismatch)
            );

            let state = h.gk.breaker().state("a1").unwrap();
            assert_eq!(state.state, CircuitState::Open);
            assert!(state.manual);
            // One step down for the trip, not two
            assert_eq!(h.gk.trust().level("a1"), AutonomyLevel::Assisted);
            assert_eq!(h.gk.agent_health("a1").health, Health::Halted);
            assert_eq!(h.gk.alerts(Some("a1")).len(), audit.alerts.len());

            let next = h.gk.execute(ExecuteRequest::new("a1", FRAME, "pay_invoice")).await;
            assert!(next.is_blocked());

            let events = drain(&mut rx);
            assert!(events.iter().any(|e| matches!(e, WardenEvent::DriftDetected { .. })));
            assert!(events.iter().any(|e| matches!(e, WardenEvent::AgentHalted { .. })));
        }

        #[tokio::test]
        async fn test_pattern_needs_more_than_min_history() {
            let h = harness(|_| {});
            for _ in 0..10 {
                h.gk.execute(ExecuteRequest::new("a1", FRAME, "pay_invoice")).await;
            }

            let result = h.gk.execute(behavior_request(&["refund"])).await;
            assert!(result.post_audit.unwrap().alerts.is_empty());
            assert!(h.gk.breaker().is_allowed("a1"));
        }

        #[tokio::test]
        async fn test_behavior_pattern_change() {
            let h = harness(|_| {});
            for _ in 0..11 {
                let r = h.gk.execute(ExecuteRequest::new("a1", FRAME, "pay_invoice")).await;
                assert!(r.post_audit.unwrap().alerts.is_empty());
            }

            let result = h.gk.execute(behavior_request(&["refund"])).await;
            let audit = result.post_audit.unwrap();
            assert_eq!(audit.alerts.len(), 1);
            assert_eq!(audit.alerts[0].alert_type, AlertType::BehaviorPatternChange);
            assert_eq!(audit.alerts[0].severity, Severity::Critical);
            assert!(audit.halted);
            assert_eq!(h.gk.trust().level("a1"), AutonomyLevel::Assisted);
        }
    }

    // ── Tripwires ──────────────────────────────────────────────

    mod tripwires {
        use super::*;
        use warden_core::Health;
        use warden_runtime::{AlertType, Gate, GateStatus};

        fn with_sampler(sample: f64, accept_all: bool) -> Harness {
            let mut config = WardenConfig::default();
            config.tripwire.rate = 1.0;
            let clock = ManualClock::default();
            let executor = Arc::new(ScriptedExecutor::default());
            let validator = Arc::new(CountingValidator {
                calls: AtomicUsize::new(0),
                accept_all,
            });
            let gk = Gatekeeper::builder(shared(config))
                .clock(Arc::new(clock.clone()))
                .executor(executor.clone())
                .validator(validator.clone())
                .tripwire_sampler(Arc::new(move || sample))
                .build()
                .unwrap();
            Harness {
                gk,
                executor,
                validator,
                clock,
            }
        }

        #[tokio::test]
        async fn test_sound_validator_passes_planted_tripwire() {
            let h = with_sampler(0.0, false);
            let result = h.gk.execute(ExecuteRequest::new("a1", FRAME, "pay_invoice")).await;
            assert!(result.success);
            assert_eq!(
                result.pre_flight.gate(Gate::Tripwire).unwrap().status,
                GateStatus::Passed
            );
            // one call for the tripwire, one for the request frame
            assert_eq!(h.validator.calls.load(Ordering::SeqCst), 2);
        }

        #[tokio::test]
        async fn test_failed_tripwire_alerts_but_does_not_block() {
            let h = with_sampler(0.99, true);
            let result = h.gk.execute(ExecuteRequest::new("a1", FRAME, "pay_invoice")).await;

            assert!(result.success);
            assert_eq!(
                result.pre_flight.gate(Gate::Tripwire).unwrap().status,
                GateStatus::Failed
            );
            let alerts = h.gk.alerts(Some("a1"));
            assert_eq!(alerts.len(), 1);
            assert_eq!(alerts[0].alert_type, AlertType::TripwireFailure);

            let health = h.gk.agent_health("a1");
            assert_eq!(health.tripwire_failure_rate, 1.0);
            assert_eq!(health.health, Health::Warning);
        }

        #[tokio::test]
        async fn test_suite_with_sound_validator() {
            let h = harness(|_| {});
            let report = h.gk.run_tripwire_suite().await;
            assert_eq!(report.total, 9);
            assert_eq!(report.failed, 0);
            assert_eq!(report.pass_rate(), 1.0);
        }

        #[tokio::test]
        async fn test_suite_catches_permissive_validator() {
            let h = harness_with(|_| {}, true);
            let report = h.gk.run_tripwire_suite().await;
            assert_eq!(report.total, 9);
            assert_eq!(report.failed, 4);
            assert!(report.results.iter().filter(|r| !r.passed).all(|r| r.tripwire_id.starts_with("tw-invalid")));
        }
    }

    // ── Eviction ───────────────────────────────────────────────

    mod eviction {
        use super::*;
        use chrono::Duration;
        use tokio::sync::Notify;

        #[tokio::test]
        async fn test_evict_agent_purges_everything_for_that_agent_only() {
            let h = harness(|c| c.hold.mcp_validation_tools = vec!["dangerous_*".into()]);
            for agent in ["a1", "a2"] {
                pay_baseline(&h, agent);
                h.gk.execute(ExecuteRequest::new(agent, FRAME, "pay_invoice")).await;
                h.gk.execute(ExecuteRequest::new(agent, FRAME, "dangerous_op")).await;
            }
            let mut rx = h.gk.subscribe();

            assert!(h.gk.evict_agent("a1"));

            assert!(h.gk.breaker().state("a1").is_none());
            assert!(h.gk.baselines().get_baseline(FRAME, "a1").is_none());
            assert!(h.gk.pending_holds(Some("a1")).is_empty());
            assert!(h.gk.trust().state("a1").is_none());
            assert!(h.gk.history("a1").is_empty());

            assert!(h.gk.breaker().state("a2").is_some());
            assert!(h.gk.baselines().get_baseline(FRAME, "a2").is_some());
            assert_eq!(h.gk.pending_holds(Some("a2")).len(), 1);
            assert_eq!(h.gk.history("a2").len(), 1);

            let events = drain(&mut rx);
            assert!(
                events
                    .iter()
                    .any(|e| matches!(e, WardenEvent::AgentEvicted { agent_id } if agent_id == "a1"))
            );
            assert!(!h.gk.evict_agent("a1"));
        }

        /// Signals when a call arrives, then waits to be released.
        #[derive(Default)]
        struct ParkedExecutor {
            entered: Notify,
            release: Notify,
        }

        #[async_trait]
        impl ToolExecutor for ParkedExecutor {
            async fn execute(&self, _call: &ToolCall) -> warden_core::Result<ToolResult> {
                self.entered.notify_one();
                self.release.notified().await;
                Ok(ToolResult::ok(json!("done")))
            }
        }

        #[tokio::test]
        async fn test_agent_evicted_mid_execution_stays_evicted() {
            let mut config = WardenConfig::default();
            config.tripwire.enabled = false;
            let clock = ManualClock::default();
            let executor = Arc::new(ParkedExecutor::default());
            let gk = Gatekeeper::builder(shared(config))
                .clock(Arc::new(clock.clone()))
                .executor(executor.clone())
                .build()
                .unwrap();

            let (result, _) = tokio::join!(
                gk.execute(ExecuteRequest::new("a1", FRAME, "pay_invoice")),
                async {
                    executor.entered.notified().await;
                    assert!(gk.evict_agent("a1"));
                    executor.release.notify_one();
                }
            );

            assert!(result.success);
            assert!(gk.tracked_agents().is_empty());
            assert!(gk.breaker().state("a1").is_none());
            assert!(gk.trust().state("a1").is_none());
            assert!(gk.history("a1").is_empty());

            clock.advance(Duration::hours(5));
            assert!(gk.evict_inactive().is_empty());
            assert!(gk.breaker().all_states().is_empty());
        }

        #[tokio::test]
        async fn test_least_recently_used_agent_is_pushed_out() {
            let h = harness(|c| c.agents.max_agents = 2);
            h.gk.execute(ExecuteRequest::new("a1", FRAME, "pay_invoice")).await;
            h.gk.execute(ExecuteRequest::new("a2", FRAME, "pay_invoice")).await;
            h.gk.execute(ExecuteRequest::new("a3", FRAME, "pay_invoice")).await;

            let mut tracked = h.gk.tracked_agents();
            tracked.sort();
            assert_eq!(tracked, strings(&["a2", "a3"]));
            assert!(h.gk.breaker().state("a1").is_none());
            assert!(h.gk.trust().state("a1").is_none());
            assert!(h.gk.breaker().state("a2").is_some());
        }

        #[tokio::test]
        async fn test_inactive_agents_are_evicted() {
            let h = harness(|c| c.agents.inactivity_timeout_secs = 60);
            h.gk.execute(ExecuteRequest::new("a1", FRAME, "pay_invoice")).await;
            h.clock.advance(Duration::seconds(30));
            h.gk.execute(ExecuteRequest::new("a2", FRAME, "pay_invoice")).await;
            h.clock.advance(Duration::seconds(31));

            assert_eq!(h.gk.evict_inactive(), strings(&["a1"]));
            assert_eq!(h.gk.tracked_agents(), strings(&["a2"]));
        }
    }

    // ── Health ─────────────────────────────────────────────────

    mod health {
        use super::*;
        use warden_core::Health;

        #[tokio::test]
        async fn test_system_health_rollup() {
            let h = harness(|_| {});
            assert_eq!(h.gk.system_health().health, Health::Healthy);

            h.gk.execute(ExecuteRequest::new("a1", FRAME, "pay_invoice")).await;
            h.gk.execute(ExecuteRequest::new("a2", FRAME, "pay_invoice")).await;
            assert_eq!(h.gk.system_health().health, Health::Healthy);

            h.gk.halt_agent("a1", "stop");
            let health = h.gk.system_health();
            assert_eq!(health.health, Health::Warning);
            assert_eq!(health.halted, 1);
            assert_eq!(health.open_circuits, 1);

            h.gk.halt_agent("a2", "stop");
            assert_eq!(h.gk.system_health().health, Health::Halted);
        }

        #[tokio::test]
        async fn test_pending_hold_is_a_warning() {
            let h = harness(|c| c.hold.mcp_validation_tools = vec!["dangerous_*".into()]);
            h.gk.execute(ExecuteRequest::new("a1", FRAME, "dangerous_op")).await;
            let health = h.gk.agent_health("a1");
            assert_eq!(health.pending_holds, 1);
            assert_eq!(health.health, Health::Warning);
            assert_eq!(h.gk.system_health().pending_holds, 1);
        }
    }
}
