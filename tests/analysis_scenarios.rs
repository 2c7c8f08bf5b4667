use std::error::Error;

use tradesight::AnalysisRequest;
use tradesight::audit::AttemptOutcome;
use tradesight::context::{DecisionBasis, EvidenceCoverage};
use tradesight::dag::{AbortReason, RunState, TaskRunState};
use tradesight::errors::EngineError;
use tradesight::tasks::TaskKind;
use tradesight::types::{ConfidenceLevel, ContextDepth, Recommendation};
use tradesight_test_utils::builders::{AlertScenarioBuilder, ConfigFileBuilder, trade};
use tradesight_test_utils::fake_backends::{Endpoint, Fault, ScriptedBackends};
use tradesight_test_utils::{engine_with, init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn strong_score_and_violation_matches_escalate_with_high_confidence() -> TestResult {
    init_tracing();

    let backends = ScriptedBackends::new()
        .with_alert(
            "ALERT-001",
            AlertScenarioBuilder::new()
                .score(0.85)
                .similar_case("CASE-17", 0.92, "SPOOFING")
                .similar_case("CASE-42", 0.88, "SPOOFING")
                .build(),
        )
        .into_shared();
    let engine = engine_with(ConfigFileBuilder::new().settings(), &backends);

    let outcome = with_timeout(engine.analyze(AnalysisRequest::new("ALERT-001"))).await;

    assert_eq!(outcome.state(), RunState::Completed);
    let response = outcome.response().ok_or("completed run must have a response")?;
    assert_eq!(response.alert_id, "ALERT-001");
    assert_eq!(response.recommendation, Recommendation::Escalate);
    assert_eq!(response.confidence_level, ConfidenceLevel::High);
    assert_eq!(response.audit_trace_id, outcome.trace_id());

    let evidence = &response.reasoning.evidence;
    assert!(evidence["anomaly_score"].starts_with("0.85"));
    assert!(evidence["historical_matches"].starts_with("2 of 2"));
    assert!(evidence.contains_key("decision_rule"));
    assert!(!evidence.contains_key("degraded_inputs"));

    // No scripted reasoning answer, so the policy decided.
    let decision = outcome.context().decision().ok_or("decision missing")?;
    assert_eq!(decision.basis, DecisionBasis::FallbackPolicy);
    assert_eq!(
        outcome.task_state(TaskKind::DecisionSynthesis),
        Some(TaskRunState::Degraded)
    );
    assert!(
        response
            .data_sources_consulted
            .contains(&"decision_policy".to_string())
    );

    Ok(())
}

#[tokio::test]
async fn mid_band_score_without_cases_is_monitored() -> TestResult {
    init_tracing();

    let backends = ScriptedBackends::new()
        .with_alert("ALERT-002", AlertScenarioBuilder::new().score(0.6).build())
        .into_shared();
    let engine = engine_with(ConfigFileBuilder::new().settings(), &backends);

    let response = with_timeout(engine.analyze(AnalysisRequest::new("ALERT-002")))
        .await
        .into_result()?;

    assert_eq!(response.recommendation, Recommendation::Monitor);
    assert_eq!(response.confidence_level, ConfidenceLevel::Medium);
    assert!(response.reasoning.summary.starts_with("MONITOR by rule"));
    Ok(())
}

#[tokio::test]
async fn low_score_with_case_library_down_is_dismissed_with_low_confidence() -> TestResult {
    init_tracing();

    let backends = ScriptedBackends::new()
        .with_alert("ALERT-003", AlertScenarioBuilder::new().score(0.3).build())
        .fail_always(Endpoint::CaseSearch, Fault::Unavailable)
        .into_shared();
    let engine = engine_with(ConfigFileBuilder::new().settings(), &backends);

    let outcome = with_timeout(engine.analyze(AnalysisRequest::new("ALERT-003"))).await;

    assert!(outcome.is_completed());
    assert_eq!(
        outcome.task_state(TaskKind::PatternAnalysis),
        Some(TaskRunState::Degraded)
    );
    assert!(matches!(
        outcome.audit().final_outcome(TaskKind::PatternAnalysis),
        Some(AttemptOutcome::Degraded { .. })
    ));

    let ctx = outcome.context();
    assert_eq!(ctx.anomaly_score(), Some(0.3));
    assert_eq!(ctx.similar_cases().map(<[_]>::len), Some(0));
    let details = ctx.pattern_details().ok_or("pattern details missing")?;
    assert!(!details.historical_matching);
    // Interval widened by the configured 0.1 on each side.
    let ci = ctx.confidence_interval().ok_or("interval missing")?;
    assert!((ci.lower - 0.15).abs() < 1e-9);
    assert!((ci.upper - 0.45).abs() < 1e-9);

    let response = outcome.response().ok_or("missing response")?;
    assert_eq!(response.recommendation, Recommendation::Dismiss);
    assert_eq!(response.confidence_level, ConfidenceLevel::Low);
    assert!(
        response.reasoning.evidence["degraded_inputs"].contains("pattern_analysis"),
        "evidence: {:?}",
        response.reasoning.evidence
    );
    Ok(())
}

#[tokio::test]
async fn unknown_alert_aborts_before_any_analysis() -> TestResult {
    init_tracing();

    let backends = ScriptedBackends::new()
        .with_alert("ALERT-001", AlertScenarioBuilder::new().score(0.9).build())
        .into_shared();
    let engine = engine_with(ConfigFileBuilder::new().settings(), &backends);

    let outcome = with_timeout(engine.analyze(AnalysisRequest::new("ALERT-999"))).await;

    assert_eq!(outcome.state(), RunState::Aborted);
    assert!(matches!(
        outcome.abort_reason(),
        Some(AbortReason::Fatal {
            task: TaskKind::DataRetrieval,
            ..
        })
    ));
    assert_eq!(outcome.recommendation(), None);
    assert!(outcome.response().is_none());

    let trail = outcome.audit();
    assert_eq!(trail.entries().len(), 1);
    assert!(matches!(
        trail.final_outcome(TaskKind::DataRetrieval),
        Some(AttemptOutcome::Fatal { .. })
    ));
    for task in [
        TaskKind::PatternAnalysis,
        TaskKind::ContextEnrichment,
        TaskKind::DecisionSynthesis,
    ] {
        assert_eq!(trail.attempts(task), 0);
        assert_eq!(outcome.task_state(task), Some(TaskRunState::Skipped));
    }
    assert_eq!(backends.total_calls(), 1);

    match outcome.into_result() {
        Err(EngineError::Aborted { reason, .. }) => {
            assert!(matches!(reason, AbortReason::Fatal { .. }));
        }
        other => panic!("expected Aborted error, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn alert_without_trades_is_fatal() -> TestResult {
    init_tracing();

    let backends = ScriptedBackends::new()
        .with_alert(
            "ALERT-EMPTY",
            AlertScenarioBuilder::new().trades(Vec::new()).build(),
        )
        .into_shared();
    let engine = engine_with(ConfigFileBuilder::new().settings(), &backends);

    let outcome = with_timeout(engine.analyze(AnalysisRequest::new("ALERT-EMPTY"))).await;

    assert_eq!(outcome.state(), RunState::Aborted);
    assert_eq!(
        outcome.task_state(TaskKind::DataRetrieval),
        Some(TaskRunState::Failed)
    );
    assert_eq!(backends.calls(Endpoint::AnomalyModel), 0);
    Ok(())
}

#[tokio::test]
async fn missing_anomaly_score_is_never_dismissed() -> TestResult {
    init_tracing();

    // No assessment scripted: the model answers NotFound.
    let backends = ScriptedBackends::new()
        .with_alert("ALERT-004", AlertScenarioBuilder::new().build())
        .into_shared();
    let engine = engine_with(ConfigFileBuilder::new().settings(), &backends);

    let outcome = with_timeout(engine.analyze(AnalysisRequest::new("ALERT-004"))).await;

    assert!(outcome.is_completed());
    assert_eq!(outcome.context().anomaly_score(), None);
    assert_eq!(
        outcome.task_state(TaskKind::PatternAnalysis),
        Some(TaskRunState::Degraded)
    );
    assert_eq!(outcome.recommendation(), Some(Recommendation::Monitor));
    assert_eq!(
        outcome.context().confidence_level(),
        Some(ConfidenceLevel::Low)
    );
    Ok(())
}

#[tokio::test]
async fn suspicious_communications_lift_a_quiet_alert_to_monitor() -> TestResult {
    init_tracing();

    let backends = ScriptedBackends::new()
        .with_alert(
            "ALERT-005",
            AlertScenarioBuilder::new()
                .score(0.2)
                .communication(120, true)
                // Outside the 30 minute window.
                .communication(4 * 3600, true)
                .build(),
        )
        .into_shared();
    let engine = engine_with(ConfigFileBuilder::new().settings(), &backends);

    let outcome = with_timeout(engine.analyze(AnalysisRequest::new("ALERT-005"))).await;

    let ctx = outcome.context();
    assert_eq!(ctx.communication_signals().map(<[_]>::len), Some(1));
    assert_eq!(ctx.evidence_coverage(), Some(EvidenceCoverage::Full));
    assert_eq!(outcome.recommendation(), Some(Recommendation::Monitor));
    Ok(())
}

#[tokio::test]
async fn market_context_flags_heavy_participation() -> TestResult {
    init_tracing();

    let backends = ScriptedBackends::new()
        .with_alert(
            "ALERT-006",
            AlertScenarioBuilder::new()
                .trades(vec![trade("T1", 0, 40_000), trade("T2", 30, 40_000)])
                .market(100.0, 101.0, 1_000_000)
                .score(0.4)
                .build(),
        )
        .into_shared();
    let engine = engine_with(ConfigFileBuilder::new().settings(), &backends);

    let outcome = with_timeout(engine.analyze(AnalysisRequest::new("ALERT-006"))).await;

    let mc = outcome
        .context()
        .market_context()
        .ok_or("market context missing")?;
    assert!((mc.participation_rate - 0.08).abs() < 1e-9);
    assert!(mc.volume_anomaly);
    // (101 - 100) / 100.5 * 10_000 ≈ 99.5 bps
    assert!(mc.spread_bps > 99.0 && mc.spread_bps < 100.0);
    assert!(mc.volatility_spike);
    Ok(())
}

#[tokio::test]
async fn full_context_depth_widens_case_search() -> TestResult {
    init_tracing();

    let mut scenario = AlertScenarioBuilder::new().score(0.3);
    for i in 0..8 {
        scenario = scenario.similar_case(&format!("CASE-{i}"), 0.5 + i as f64 * 0.01, "CLEARED");
    }
    let backends = ScriptedBackends::new()
        .with_alert("ALERT-007", scenario.build())
        .into_shared();
    let engine = engine_with(ConfigFileBuilder::new().settings(), &backends);

    let summary = with_timeout(engine.analyze(AnalysisRequest::new("ALERT-007"))).await;
    let full = with_timeout(
        engine.analyze(AnalysisRequest::new("ALERT-007").with_context_depth(ContextDepth::Full)),
    )
    .await;

    assert_eq!(summary.context().similar_cases().map(<[_]>::len), Some(5));
    assert_eq!(full.context().similar_cases().map(<[_]>::len), Some(8));
    Ok(())
}

#[tokio::test]
async fn audit_trail_records_one_entry_per_attempt_in_stage_order() -> TestResult {
    init_tracing();

    let backends = ScriptedBackends::new()
        .with_alert(
            "ALERT-008",
            AlertScenarioBuilder::new()
                .score(0.9)
                .reasoning(Recommendation::Escalate, 0.9)
                .build(),
        )
        .into_shared();
    let engine = engine_with(ConfigFileBuilder::new().settings(), &backends);

    let outcome = with_timeout(engine.analyze(AnalysisRequest::new("ALERT-008"))).await;
    let trail = outcome.audit();

    let order: Vec<TaskKind> = trail.entries().iter().map(|e| e.task).collect();
    assert_eq!(
        order,
        vec![
            TaskKind::DataRetrieval,
            TaskKind::PatternAnalysis,
            TaskKind::ContextEnrichment,
            TaskKind::DecisionSynthesis,
        ]
    );
    for entry in trail.entries() {
        assert_eq!(entry.attempt, 1);
        assert_eq!(entry.outcome, AttemptOutcome::Success);
        assert_eq!(entry.fields_written, entry.task.writes());
        assert!(entry.finished_at >= entry.started_at);
    }

    assert_eq!(
        trail.data_sources_consulted(),
        vec![
            "trade_db",
            "client_profile",
            "market_feed",
            "anomaly_model",
            "case_library",
            "communications_index",
            "reasoning_service",
        ]
    );

    let stored = engine
        .audit_store()
        .get(&outcome.trace_id())
        .ok_or("trail not stored")?;
    assert_eq!(&stored, trail);

    let store = engine.audit_store();
    let stored_before = store.len();
    let removed = store
        .remove(&outcome.trace_id())
        .ok_or("trail not removable")?;
    assert_eq!(&removed, trail);
    assert_eq!(store.len(), stored_before - 1);
    assert!(store.get(&outcome.trace_id()).is_none());
    assert!(store.remove(&outcome.trace_id()).is_none());
    Ok(())
}

#[tokio::test]
async fn malformed_alert_id_is_rejected_without_calling_backends() -> TestResult {
    init_tracing();

    let backends = ScriptedBackends::new().into_shared();
    let engine = engine_with(
        ConfigFileBuilder::new()
            .alert_id_pattern("^ALERT-[0-9]+$")
            .settings(),
        &backends,
    );

    let outcome = with_timeout(engine.analyze(AnalysisRequest::new("alert; DROP TABLE"))).await;

    assert_eq!(outcome.state(), RunState::Aborted);
    match outcome.abort_reason() {
        Some(AbortReason::Validation { message }) => {
            assert!(message.contains("does not match pattern"));
        }
        other => panic!("expected validation abort, got {other:?}"),
    }
    assert!(outcome.audit().entries().is_empty());
    assert!(
        outcome
            .task_states()
            .values()
            .all(|s| *s == TaskRunState::Skipped)
    );
    assert_eq!(backends.total_calls(), 0);
    assert!(engine.audit_store().get(&outcome.trace_id()).is_some());

    let empty = with_timeout(engine.analyze(AnalysisRequest::new("  "))).await;
    assert!(matches!(
        empty.abort_reason(),
        Some(AbortReason::Validation { message }) if message.contains("must not be empty")
    ));
    Ok(())
}

#[tokio::test]
async fn response_serializes_with_wire_names() -> TestResult {
    init_tracing();

    let backends = ScriptedBackends::new()
        .with_alert("ALERT-009", AlertScenarioBuilder::new().score(0.8).build())
        .into_shared();
    let engine = engine_with(ConfigFileBuilder::new().settings(), &backends);

    let response = with_timeout(engine.analyze(AnalysisRequest::new("ALERT-009")))
        .await
        .into_result()?;
    let json = serde_json::to_value(&response)?;

    assert_eq!(json["recommendation"], "ESCALATE");
    assert_eq!(json["confidence_level"], "high");
    assert_eq!(json["audit_trace_id"], response.audit_trace_id.to_string());
    assert!(json["reasoning"]["summary"].is_string());
    assert!(json["data_sources_consulted"].is_array());
    Ok(())
}
