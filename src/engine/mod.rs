// src/engine/mod.rs

//! Orchestration engine for alert analysis.
//!
//! This module ties together:
//! - request validation ([`request`])
//! - the stage-by-stage graph scheduler ([`scheduler`])
//! - the terminal run result ([`outcome`])
//!
//! [`Engine`] is cheap to clone; clones share the worker pool and the
//! audit store, so many alerts can be analyzed concurrently under one
//! global concurrency limit.

use std::sync::Arc;

use tokio::time::Instant;
use tracing::{Instrument, info_span};
use ulid::Ulid;

use crate::audit::{AuditStore, AuditTrail};
use crate::backends::Backends;
use crate::config::Settings;
use crate::context::AlertContext;
use crate::dag::TaskGraph;
use crate::errors::{EngineError, Result};
use crate::exec::{AttemptPolicy, RunSignal, WorkerPool};
use crate::tasks::TaskSet;

pub mod outcome;
pub mod request;
pub mod scheduler;

pub use crate::dag::AbortReason;
pub use outcome::RunOutcome;
pub use request::{AnalysisRequest, AnalysisResponse, Reasoning, RequestValidator};
pub use scheduler::Scheduler;

#[derive(Debug, Clone)]
pub struct Engine {
    settings: Arc<Settings>,
    scheduler: Scheduler,
    validator: RequestValidator,
    store: AuditStore,
}

impl Engine {
    pub fn new(settings: Settings, backends: Backends) -> Result<Self> {
        Self::with_store(settings, backends, AuditStore::new())
    }

    /// Like [`Engine::new`], recording trails into an existing store.
    pub fn with_store(settings: Settings, backends: Backends, store: AuditStore) -> Result<Self> {
        let graph = Arc::new(TaskGraph::alert_analysis()?);
        let tasks = Arc::new(TaskSet::new(&backends, &settings));
        let pool = WorkerPool::new(settings.engine.worker_pool_size);
        let policy = AttemptPolicy::from(&settings.engine);

        Ok(Self {
            validator: RequestValidator::new(settings.alert_id_pattern.clone()),
            scheduler: Scheduler::new(graph, tasks, pool, policy),
            settings: Arc::new(settings),
            store,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn graph(&self) -> &TaskGraph {
        self.scheduler.graph()
    }

    pub fn pool(&self) -> &WorkerPool {
        self.scheduler.pool()
    }

    pub fn audit_store(&self) -> &AuditStore {
        &self.store
    }

    /// Analyze one alert with no external cancellation.
    pub async fn analyze(&self, request: AnalysisRequest) -> RunOutcome {
        self.analyze_with_signal(request, RunSignal::none()).await
    }

    /// Analyze one alert; `signal` can cancel the run. The configured run
    /// deadline is applied on top of any deadline the signal already has.
    pub async fn analyze_with_signal(
        &self,
        request: AnalysisRequest,
        signal: RunSignal,
    ) -> RunOutcome {
        let trace_id = Ulid::new();
        let span = info_span!("analysis", alert_id = %request.alert_id, %trace_id);

        async move {
            let deadline = self
                .settings
                .engine
                .run_deadline
                .and_then(|d| Instant::now().checked_add(d));
            let signal = signal.with_deadline(deadline);

            let context =
                AlertContext::new(request.alert_id.clone(), request.priority, request.context_depth);
            let trail = AuditTrail::new(trace_id, request.alert_id.clone());

            let outcome = match self.validator.validate(&request) {
                Ok(()) => self.scheduler.run(context, trail, signal).await,
                Err(message) => self.scheduler.reject(context, trail, message),
            };

            self.store.insert(outcome.audit().clone());
            outcome
        }
        .instrument(span)
        .await
    }

    /// Analyze several alerts concurrently. Outcomes come back in request
    /// order; all runs share the worker pool and observe `signal`.
    pub async fn analyze_many(
        &self,
        requests: Vec<AnalysisRequest>,
        signal: RunSignal,
    ) -> Result<Vec<RunOutcome>> {
        let handles: Vec<_> = requests
            .into_iter()
            .map(|request| {
                let engine = self.clone();
                let signal = signal.clone();
                tokio::spawn(async move { engine.analyze_with_signal(request, signal).await })
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            let outcome = handle.await.map_err(|e| {
                EngineError::Other(anyhow::anyhow!("analysis task did not complete: {e}"))
            })?;
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }
}
