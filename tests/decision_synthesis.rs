use std::error::Error;

use tradesight::AnalysisRequest;
use tradesight::audit::AttemptOutcome;
use tradesight::context::DecisionBasis;
use tradesight::dag::TaskRunState;
use tradesight::tasks::TaskKind;
use tradesight::types::{ConfidenceLevel, Recommendation};
use tradesight_test_utils::builders::{AlertScenarioBuilder, ConfigFileBuilder};
use tradesight_test_utils::fake_backends::{Endpoint, Fault, ScriptedBackends};
use tradesight_test_utils::{engine_with, init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn confident_reasoning_answer_is_accepted() -> TestResult {
    init_tracing();

    let backends = ScriptedBackends::new()
        .with_alert(
            "ALERT-601",
            AlertScenarioBuilder::new()
                .score(0.8)
                .reasoning(Recommendation::Escalate, 0.92)
                .build(),
        )
        .into_shared();
    let engine = engine_with(ConfigFileBuilder::new().settings(), &backends);

    let outcome = with_timeout(engine.analyze(AnalysisRequest::new("ALERT-601"))).await;

    assert_eq!(
        outcome.task_state(TaskKind::DecisionSynthesis),
        Some(TaskRunState::Succeeded)
    );
    let decision = outcome.context().decision().ok_or("decision missing")?;
    assert_eq!(decision.basis, DecisionBasis::ReasoningService);
    assert_eq!(decision.recommendation, Recommendation::Escalate);
    assert_eq!(decision.confidence_level, ConfidenceLevel::High);
    assert_eq!(decision.summary, "Reasoning service recommends ESCALATE");
    assert_eq!(
        decision.suggested_actions,
        vec!["Follow scripted reasoning advice".to_string()]
    );

    // Policy figures are kept next to the service's own claims.
    assert!(decision.evidence.contains_key("anomaly_score"));
    assert!(decision.evidence.contains_key("reasoning"));
    assert!(decision.evidence["reasoning_confidence"].starts_with("0.92"));
    assert!(!decision.evidence.contains_key("fallback_reason"));

    let sources = outcome.audit().data_sources_consulted();
    assert!(sources.contains(&"reasoning_service".to_string()));
    assert!(!sources.contains(&"decision_policy".to_string()));
    Ok(())
}

#[tokio::test]
async fn reasoning_may_be_more_severe_than_the_policy() -> TestResult {
    init_tracing();

    let backends = ScriptedBackends::new()
        .with_alert(
            "ALERT-602",
            AlertScenarioBuilder::new()
                .score(0.3)
                .reasoning(Recommendation::Escalate, 0.7)
                .reasoning_evidence("anomaly_score", "0.99 per the service")
                .reasoning_evidence("decision_rule", "service says so")
                .build(),
        )
        .into_shared();
    let engine = engine_with(ConfigFileBuilder::new().settings(), &backends);

    let response = with_timeout(engine.analyze(AnalysisRequest::new("ALERT-602")))
        .await
        .into_result()?;

    assert_eq!(response.recommendation, Recommendation::Escalate);
    assert_eq!(response.confidence_level, ConfidenceLevel::Medium);

    // The policy's DISMISS rule is reported as the baseline, not as the
    // rule behind the ESCALATE decision.
    let evidence = &response.reasoning.evidence;
    assert!(!evidence.contains_key("decision_rule"));
    assert!(
        evidence["policy_baseline"].starts_with("DISMISS by rule: anomaly score 0.3 <= 0.5"),
        "evidence: {evidence:?}"
    );
    // Policy figures are not overwritten by the service's claims.
    assert!(evidence["anomaly_score"].starts_with("0.3 against escalate threshold"));
    assert_eq!(evidence["reasoning"], "scripted answer with confidence 0.70");
    Ok(())
}

#[tokio::test]
async fn low_confidence_reasoning_falls_back_to_policy() -> TestResult {
    init_tracing();

    let backends = ScriptedBackends::new()
        .with_alert(
            "ALERT-603",
            AlertScenarioBuilder::new()
                .score(0.8)
                .reasoning(Recommendation::Dismiss, 0.4)
                .build(),
        )
        .into_shared();
    let engine = engine_with(ConfigFileBuilder::new().settings(), &backends);

    let outcome = with_timeout(engine.analyze(AnalysisRequest::new("ALERT-603"))).await;

    assert_eq!(
        outcome.task_state(TaskKind::DecisionSynthesis),
        Some(TaskRunState::Degraded)
    );
    let decision = outcome.context().decision().ok_or("decision missing")?;
    assert_eq!(decision.basis, DecisionBasis::FallbackPolicy);
    assert_eq!(decision.recommendation, Recommendation::Escalate);
    assert_eq!(decision.confidence_level, ConfidenceLevel::High);
    assert!(
        decision.evidence["fallback_reason"]
            .contains("reasoning confidence 0.4 below acceptance bar 0.7")
    );

    match outcome.audit().final_outcome(TaskKind::DecisionSynthesis) {
        Some(AttemptOutcome::Degraded { reason }) => {
            assert!(reason.ends_with("fallback policy applied"));
        }
        other => panic!("expected degraded decision, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn reasoning_cannot_go_below_the_policy_floor() -> TestResult {
    init_tracing();

    let backends = ScriptedBackends::new()
        .with_alert(
            "ALERT-604",
            AlertScenarioBuilder::new()
                .score(0.85)
                .similar_case("CASE-9", 0.9, "SPOOFING")
                .reasoning(Recommendation::Dismiss, 0.95)
                .build(),
        )
        .into_shared();
    let engine = engine_with(ConfigFileBuilder::new().settings(), &backends);

    let outcome = with_timeout(engine.analyze(AnalysisRequest::new("ALERT-604"))).await;

    let decision = outcome.context().decision().ok_or("decision missing")?;
    assert_eq!(decision.recommendation, Recommendation::Escalate);
    assert_eq!(decision.basis, DecisionBasis::FallbackPolicy);
    assert!(
        decision.evidence["fallback_reason"]
            .contains("reasoning proposed DISMISS but policy requires at least ESCALATE")
    );
    Ok(())
}

#[tokio::test]
async fn hanging_reasoning_service_falls_back_within_one_attempt() -> TestResult {
    init_tracing();

    let backends = ScriptedBackends::new()
        .with_alert(
            "ALERT-605",
            AlertScenarioBuilder::new()
                .score(0.6)
                .reasoning(Recommendation::Escalate, 0.99)
                .build(),
        )
        .fail_always(Endpoint::Reasoning, Fault::Hang)
        .into_shared();
    let settings = ConfigFileBuilder::new()
        .task_timeout("500ms")
        .reasoning_timeout("100ms")
        .settings();
    let engine = engine_with(settings, &backends);

    let outcome = with_timeout(engine.analyze(AnalysisRequest::new("ALERT-605"))).await;

    assert!(outcome.is_completed());
    assert_eq!(outcome.audit().attempts(TaskKind::DecisionSynthesis), 1);
    assert_eq!(backends.calls(Endpoint::Reasoning), 1);

    let decision = outcome.context().decision().ok_or("decision missing")?;
    assert_eq!(decision.recommendation, Recommendation::Monitor);
    assert!(decision.evidence["fallback_reason"].contains("did not answer within"));
    Ok(())
}

#[tokio::test]
async fn unavailable_reasoning_service_is_not_retried() -> TestResult {
    init_tracing();

    let backends = ScriptedBackends::new()
        .with_alert(
            "ALERT-606",
            AlertScenarioBuilder::new()
                .score(0.6)
                .reasoning(Recommendation::Monitor, 0.9)
                .build(),
        )
        .fail_next(Endpoint::Reasoning, Fault::Unavailable, 1)
        .into_shared();
    let engine = engine_with(ConfigFileBuilder::new().max_retries(3).settings(), &backends);

    let outcome = with_timeout(engine.analyze(AnalysisRequest::new("ALERT-606"))).await;

    assert_eq!(backends.calls(Endpoint::Reasoning), 1);
    let decision = outcome.context().decision().ok_or("decision missing")?;
    assert_eq!(decision.basis, DecisionBasis::FallbackPolicy);
    assert_eq!(decision.recommendation, Recommendation::Monitor);
    assert!(
        outcome
            .audit()
            .data_sources_consulted()
            .contains(&"decision_policy".to_string())
    );
    Ok(())
}

#[tokio::test]
async fn degraded_upstream_lowers_accepted_confidence() -> TestResult {
    init_tracing();

    let backends = ScriptedBackends::new()
        .with_alert(
            "ALERT-607",
            AlertScenarioBuilder::new()
                .score(0.9)
                .reasoning(Recommendation::Escalate, 0.95)
                .build(),
        )
        .fail_always(Endpoint::CaseSearch, Fault::Unavailable)
        .into_shared();
    let engine = engine_with(ConfigFileBuilder::new().settings(), &backends);

    let outcome = with_timeout(engine.analyze(AnalysisRequest::new("ALERT-607"))).await;

    let decision = outcome.context().decision().ok_or("decision missing")?;
    assert_eq!(decision.basis, DecisionBasis::ReasoningService);
    assert_eq!(decision.recommendation, Recommendation::Escalate);
    assert_eq!(decision.confidence_level, ConfidenceLevel::Medium);
    assert!(decision.evidence.contains_key("degraded_inputs"));
    Ok(())
}

#[tokio::test]
async fn stricter_acceptance_bar_rejects_borderline_answers() -> TestResult {
    init_tracing();

    let backends = ScriptedBackends::new()
        .with_alert(
            "ALERT-608",
            AlertScenarioBuilder::new()
                .score(0.6)
                .reasoning(Recommendation::Monitor, 0.8)
                .build(),
        )
        .into_shared();
    let engine = engine_with(
        ConfigFileBuilder::new().reasoning_acceptance(0.9).settings(),
        &backends,
    );

    let outcome = with_timeout(engine.analyze(AnalysisRequest::new("ALERT-608"))).await;

    let decision = outcome.context().decision().ok_or("decision missing")?;
    assert_eq!(decision.basis, DecisionBasis::FallbackPolicy);
    assert_eq!(decision.recommendation, Recommendation::Monitor);
    Ok(())
}
