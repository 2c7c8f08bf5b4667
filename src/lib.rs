// src/lib.rs

pub mod audit;
pub mod backends;
pub mod cli;
pub mod config;
pub mod context;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod policy;
pub mod tasks;
pub mod types;

use std::sync::Arc;

use anyhow::{Result, bail};
use tracing::{info, warn};

pub use crate::engine::{AnalysisRequest, AnalysisResponse, Engine, RunOutcome};

use crate::backends::fixture::FixtureFile;
use crate::backends::{Backends, FixtureBackends};
use crate::cli::CliArgs;
use crate::config::{ConfigFile, load_or_default};
use crate::dag::TaskGraph;
use crate::exec::CancelHandle;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - fixture-backed collaborators
/// - the engine, one run per requested alert
/// - Ctrl-C cancellation
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_or_default(&args.config)?;

    let fixtures = match args.fixtures.as_deref() {
        Some(path) => FixtureBackends::load(path)?,
        None => FixtureBackends::new(FixtureFile::default())?,
    };

    if args.dry_run {
        print_dry_run(&cfg, &fixtures)?;
        return Ok(());
    }

    let alert_ids: Vec<String> = if args.alert_ids.is_empty() {
        fixtures.alert_ids().map(str::to_string).collect()
    } else {
        args.alert_ids.clone()
    };

    if alert_ids.is_empty() {
        bail!("no alerts to analyze: pass --alert-id or a --fixtures file that defines alerts");
    }

    let engine = Engine::new(cfg.into_settings(), Backends::from_shared(Arc::new(fixtures)))?;

    // Ctrl-C → cancel every in-flight run.
    let (cancel, signal) = CancelHandle::channel();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            eprintln!("failed to listen for Ctrl+C: {e}");
            return;
        }
        warn!("Ctrl-C received; cancelling in-flight analyses");
        cancel.cancel();
    });

    let requests: Vec<AnalysisRequest> = alert_ids
        .into_iter()
        .map(|id| {
            AnalysisRequest::new(id)
                .with_priority(args.priority)
                .with_context_depth(args.context_depth)
        })
        .collect();

    info!(alerts = requests.len(), "starting analyses");
    let outcomes = engine.analyze_many(requests, signal).await?;

    let mut aborted = 0usize;
    for outcome in &outcomes {
        match outcome.response() {
            Some(response) => println!("{}", serde_json::to_string_pretty(&response)?),
            None => {
                aborted += 1;
                let reason = outcome
                    .abort_reason()
                    .map(|r| r.to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                eprintln!(
                    "alert '{}' aborted (trace {}): {reason}",
                    outcome.context().alert_id(),
                    outcome.trace_id()
                );
            }
        }

        if args.show_audit {
            println!("{}", serde_json::to_string_pretty(outcome.audit())?);
        }
    }

    if aborted > 0 {
        bail!("{aborted} of {} analyses aborted", outcomes.len());
    }
    Ok(())
}

/// Print the resolved settings, the task graph and the fixture summary.
fn print_dry_run(cfg: &ConfigFile, fixtures: &FixtureBackends) -> Result<()> {
    let settings = cfg.settings();
    let graph = TaskGraph::alert_analysis()?;

    println!("tradesight dry-run");
    println!("  engine.worker_pool_size = {}", settings.engine.worker_pool_size);
    println!("  engine.task_timeout = {:?}", settings.engine.task_timeout);
    println!("  engine.max_retries = {}", settings.engine.max_retries);
    println!("  engine.retry_backoff = {:?}", settings.engine.retry_backoff);
    println!("  engine.run_deadline = {:?}", settings.engine.run_deadline);
    println!("  engine.reasoning_timeout = {:?}", settings.engine.reasoning_timeout);
    println!(
        "  policy.escalate_threshold = {}",
        settings.policy.escalate_threshold
    );
    println!("  policy.monitor_threshold = {}", settings.policy.monitor_threshold);
    println!(
        "  policy.violation_categories = {:?}",
        settings.policy.violation_categories
    );
    println!("  validation.alert_id_pattern = {}", settings.alert_id_pattern);
    println!();

    println!("stages ({}):", graph.stages().len());
    for (i, stage) in graph.stages().iter().enumerate() {
        let names: Vec<&str> = stage.iter().map(|t| t.name()).collect();
        println!("  {i}: {}", names.join(", "));
        for task in stage {
            let deps = graph.dependencies_of(*task);
            if !deps.is_empty() {
                println!("      {task} after: {deps:?}");
            }
        }
    }
    println!();

    let alerts: Vec<&str> = fixtures.alert_ids().collect();
    println!("fixture alerts ({}): {:?}", alerts.len(), alerts);
    let a = fixtures.availability();
    println!(
        "  availability: trade_data={} anomaly_model={} similarity={} reasoning={}",
        a.trade_data, a.anomaly_model, a.similarity, a.reasoning
    );

    Ok(())
}
