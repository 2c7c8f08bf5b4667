use std::error::Error;
use std::time::Duration;

use tradesight::AnalysisRequest;
use tradesight::dag::{AbortReason, RunState};
use tradesight::exec::{CancelHandle, RunSignal, WorkerPool};
use tradesight::tasks::TaskKind;
use tradesight_test_utils::builders::{AlertScenarioBuilder, ConfigFileBuilder, trade};
use tradesight_test_utils::fake_backends::{Endpoint, ScriptedBackends};
use tradesight_test_utils::{engine_with, init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn independent_tasks_of_a_stage_run_in_parallel() -> TestResult {
    init_tracing();

    let backends = ScriptedBackends::new()
        .with_alert("ALERT-201", AlertScenarioBuilder::new().score(0.6).build())
        .with_latency(Endpoint::AnomalyModel, Duration::from_millis(150))
        .with_latency(Endpoint::CommunicationSearch, Duration::from_millis(150))
        .into_shared();
    let engine = engine_with(ConfigFileBuilder::new().worker_pool_size(4).settings(), &backends);

    let outcome = with_timeout(engine.analyze(AnalysisRequest::new("ALERT-201"))).await;

    assert!(outcome.is_completed());
    assert!(
        backends.max_concurrent_calls() >= 2,
        "pattern analysis and context enrichment should overlap"
    );
    Ok(())
}

#[tokio::test]
async fn worker_pool_of_one_serializes_every_attempt() -> TestResult {
    init_tracing();

    let backends = ScriptedBackends::new()
        .with_alert("ALERT-202", AlertScenarioBuilder::new().score(0.6).build())
        .with_latency(Endpoint::AnomalyModel, Duration::from_millis(50))
        .with_latency(Endpoint::CommunicationSearch, Duration::from_millis(50))
        .into_shared();
    let engine = engine_with(ConfigFileBuilder::new().worker_pool_size(1).settings(), &backends);

    let outcome = with_timeout(engine.analyze(AnalysisRequest::new("ALERT-202"))).await;

    assert!(outcome.is_completed());
    assert_eq!(backends.max_concurrent_calls(), 1);
    assert_eq!(engine.pool().size(), 1);
    assert_eq!(engine.pool().available(), 1);
    Ok(())
}

#[tokio::test]
async fn queued_time_does_not_count_against_the_attempt_timeout() -> TestResult {
    init_tracing();

    // Each branch takes 150ms; with one worker the second waits ~150ms for
    // its permit, which would blow a 200ms timeout if queueing counted.
    let backends = ScriptedBackends::new()
        .with_alert("ALERT-203", AlertScenarioBuilder::new().score(0.6).build())
        .with_latency(Endpoint::AnomalyModel, Duration::from_millis(150))
        .with_latency(Endpoint::CommunicationSearch, Duration::from_millis(150))
        .into_shared();
    let settings = ConfigFileBuilder::new()
        .worker_pool_size(1)
        .task_timeout("200ms")
        .reasoning_timeout("100ms")
        .settings();
    let engine = engine_with(settings, &backends);

    let outcome = with_timeout(engine.analyze(AnalysisRequest::new("ALERT-203"))).await;

    assert!(outcome.is_completed());
    assert_eq!(outcome.audit().attempts(TaskKind::PatternAnalysis), 1);
    assert_eq!(outcome.audit().attempts(TaskKind::ContextEnrichment), 1);
    Ok(())
}

#[tokio::test]
async fn analyze_many_returns_outcomes_in_request_order_under_one_pool() -> TestResult {
    init_tracing();

    let ids = ["ALERT-301", "ALERT-302", "ALERT-303"];
    let scores = [0.2, 0.5, 0.8];
    let mut scripted = ScriptedBackends::new();
    for (i, (id, score)) in ids.iter().zip(scores).enumerate() {
        // Distinct trades so each alert gets its own fingerprint.
        let trades = vec![trade(&format!("T{i}"), i as i64, 1_000 + i as u64)];
        scripted = scripted.with_alert(
            id,
            AlertScenarioBuilder::new()
                .trades(trades)
                .score(score)
                .build(),
        );
    }
    let backends = scripted
        .with_latency(Endpoint::TradeData, Duration::from_millis(100))
        .into_shared();
    let engine = engine_with(ConfigFileBuilder::new().worker_pool_size(2).settings(), &backends);

    let requests = ids.iter().map(|id| AnalysisRequest::new(*id)).collect();
    let outcomes = with_timeout(engine.analyze_many(requests, RunSignal::none())).await?;

    let got: Vec<&str> = outcomes.iter().map(|o| o.context().alert_id()).collect();
    assert_eq!(got, ids);
    assert!(outcomes.iter().all(|o| o.is_completed()));
    assert_eq!(backends.max_concurrent_calls(), 2);
    assert_eq!(engine.audit_store().len(), 3);

    let got_scores: Vec<Option<f64>> =
        outcomes.iter().map(|o| o.context().anomaly_score()).collect();
    assert_eq!(got_scores, scores.map(Some));
    Ok(())
}

#[tokio::test]
async fn cancelling_a_batch_aborts_every_run() -> TestResult {
    init_tracing();

    let backends = ScriptedBackends::new()
        .with_alert("ALERT-401", AlertScenarioBuilder::new().score(0.6).build())
        .with_latency(Endpoint::TradeData, Duration::from_secs(10))
        .into_shared();
    let engine = engine_with(
        ConfigFileBuilder::new()
            .task_timeout("20s")
            .reasoning_timeout("1s")
            .run_deadline(None)
            .settings(),
        &backends,
    );

    let (cancel, signal) = CancelHandle::channel();
    let batch = {
        let engine = engine.clone();
        let requests = vec![
            AnalysisRequest::new("ALERT-401"),
            AnalysisRequest::new("ALERT-401"),
        ];
        tokio::spawn(async move { engine.analyze_many(requests, signal).await })
    };

    with_timeout(async {
        while backends.calls(Endpoint::TradeData) < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    cancel.cancel();

    let outcomes = with_timeout(batch).await??;
    assert_eq!(outcomes.len(), 2);
    for outcome in &outcomes {
        assert_eq!(outcome.state(), RunState::Aborted);
        assert_eq!(outcome.abort_reason(), Some(&AbortReason::Cancelled));
    }
    // Two runs of the same alert still get distinct trace ids.
    assert_ne!(outcomes[0].trace_id(), outcomes[1].trace_id());
    Ok(())
}

#[tokio::test]
async fn merged_context_does_not_depend_on_branch_completion_order() -> TestResult {
    init_tracing();

    let scenario = || {
        AlertScenarioBuilder::new()
            .score(0.7)
            .similar_case("CASE-1", 0.7, "LAYERING")
            .communication(60, true)
            .build()
    };

    let pattern_slow = ScriptedBackends::new()
        .with_alert("ALERT-501", scenario())
        .with_latency(Endpoint::AnomalyModel, Duration::from_millis(120))
        .into_shared();
    let enrichment_slow = ScriptedBackends::new()
        .with_alert("ALERT-501", scenario())
        .with_latency(Endpoint::CommunicationSearch, Duration::from_millis(120))
        .into_shared();

    let settings = ConfigFileBuilder::new().settings();
    let a = with_timeout(
        engine_with(settings.clone(), &pattern_slow).analyze(AnalysisRequest::new("ALERT-501")),
    )
    .await;
    let b = with_timeout(
        engine_with(settings, &enrichment_slow).analyze(AnalysisRequest::new("ALERT-501")),
    )
    .await;

    assert_eq!(a.context().decision(), b.context().decision());
    assert_eq!(a.context().similar_cases(), b.context().similar_cases());
    assert_eq!(
        a.context().communication_signals(),
        b.context().communication_signals()
    );

    let order = |o: &tradesight::RunOutcome| -> Vec<TaskKind> {
        o.audit().entries().iter().map(|e| e.task).collect()
    };
    assert_eq!(order(&a), order(&b));
    Ok(())
}

#[tokio::test]
async fn worker_pool_limits_concurrent_work() -> TestResult {
    let pool = WorkerPool::new(2);
    let running = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let peak = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..6 {
        let pool = pool.clone();
        let running = running.clone();
        let peak = peak.clone();
        handles.push(tokio::spawn(async move {
            pool.run(|| async {
                let now = running.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
                peak.fetch_max(now, std::sync::atomic::Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                running.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
            })
            .await
        }));
    }
    for handle in handles {
        with_timeout(handle).await?.map_err(|_| "pool closed")?;
    }

    assert_eq!(peak.load(std::sync::atomic::Ordering::SeqCst), 2);
    assert_eq!(pool.available(), 2);

    pool.close();
    assert!(pool.run(|| async {}).await.is_err());
    Ok(())
}

#[tokio::test]
async fn zero_sized_pool_still_makes_progress() {
    let pool = WorkerPool::new(0);
    assert_eq!(pool.size(), 1);
    assert_eq!(pool.run(|| async { 7 }).await.ok(), Some(7));
}
