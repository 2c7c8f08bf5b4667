// src/engine/scheduler.rs

//! Executes the task graph for one alert.
//!
//! Stages run in order with a barrier between them. Every task of a stage
//! sees the same immutable snapshot of the context; their updates are
//! merged only after the whole stage has resolved, in task order, so the
//! merged context does not depend on completion order.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::audit::{AttemptOutcome, AuditEntry, AuditTrail};
use crate::backends::sources;
use crate::context::{AlertContext, Merger, PartialUpdate};
use crate::dag::{AbortReason, RunState, RunStatus, TaskGraph, TaskRunState};
use crate::engine::outcome::RunOutcome;
use crate::exec::{AttemptPolicy, Resolution, RunSignal, TaskRun, WorkerPool, run_task};
use crate::tasks::{FailurePolicy, TaskInput, TaskKind, TaskOutcome, TaskSet};

#[derive(Debug, Clone)]
pub struct Scheduler {
    graph: Arc<TaskGraph>,
    tasks: Arc<TaskSet>,
    pool: WorkerPool,
    policy: AttemptPolicy,
}

/// Mutable state of a run in progress.
struct ActiveRun {
    context: AlertContext,
    trail: AuditTrail,
    status: RunStatus,
    abort: Option<AbortReason>,
}

impl ActiveRun {
    fn new(context: AlertContext, trail: AuditTrail, graph: &TaskGraph) -> Self {
        Self {
            context,
            trail,
            status: RunStatus::new(graph.tasks()),
            abort: None,
        }
    }
}

/// Aborts still-running branches if the run future is dropped.
struct BranchHandles(Vec<(TaskKind, JoinHandle<TaskRun>)>);

impl Drop for BranchHandles {
    fn drop(&mut self) {
        for (_, handle) in &self.0 {
            handle.abort();
        }
    }
}

impl Scheduler {
    pub fn new(
        graph: Arc<TaskGraph>,
        tasks: Arc<TaskSet>,
        pool: WorkerPool,
        policy: AttemptPolicy,
    ) -> Self {
        Self {
            graph,
            tasks,
            pool,
            policy,
        }
    }

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// A run rejected before scheduling: aborted, no task started.
    pub fn reject(&self, context: AlertContext, trail: AuditTrail, message: String) -> RunOutcome {
        let mut run = ActiveRun::new(context, trail, &self.graph);
        warn!(alert_id = run.context.alert_id(), %message, "request rejected");
        finish(&mut run, Some(AbortReason::Validation { message }));
        into_outcome(run)
    }

    pub async fn run(
        &self,
        context: AlertContext,
        trail: AuditTrail,
        mut signal: RunSignal,
    ) -> RunOutcome {
        let mut run = ActiveRun::new(context, trail, &self.graph);
        run.status.transition(RunState::Running);
        info!(alert_id = run.context.alert_id(), "analysis started");

        for stage in self.graph.stages() {
            if let Some(reason) = signal.check() {
                finish(&mut run, Some(reason));
                return into_outcome(run);
            }

            let input = TaskInput::new(
                Arc::new(run.context.clone()),
                run.trail.degraded_tasks(),
            );
            for kind in stage {
                run.status.set_task(*kind, TaskRunState::Running);
            }
            debug!(stage = ?stage, degraded = ?input.degraded, "running stage");

            let runs = match stage.as_slice() {
                [kind] => {
                    let task = self.tasks.get(*kind);
                    vec![run_task(&task, &input, &self.pool, self.policy, &mut signal).await]
                }
                _ => self.run_concurrently(stage, &input, &signal).await,
            };

            let mut abort = None;
            for task_run in runs {
                if let Some(reason) = self.resolve(&mut run, &input, task_run) {
                    abort.get_or_insert(reason);
                }
            }

            if abort.is_some() {
                finish(&mut run, abort);
                return into_outcome(run);
            }
        }

        let abort = if run.context.decision().is_some() {
            None
        } else {
            Some(AbortReason::Fatal {
                task: self.graph.sink().unwrap_or(TaskKind::DecisionSynthesis),
                reason: "run finished without a decision".to_string(),
            })
        };
        finish(&mut run, abort);
        into_outcome(run)
    }

    async fn run_concurrently(
        &self,
        stage: &[TaskKind],
        input: &TaskInput,
        signal: &RunSignal,
    ) -> Vec<TaskRun> {
        let mut handles = BranchHandles(Vec::with_capacity(stage.len()));

        for kind in stage {
            let task = self.tasks.get(*kind);
            let input = input.clone();
            let pool = self.pool.clone();
            let policy = self.policy;
            let mut signal = signal.clone();

            let handle = tokio::spawn(async move {
                run_task(&task, &input, &pool, policy, &mut signal).await
            });
            handles.0.push((*kind, handle));
        }

        let mut runs = Vec::with_capacity(stage.len());
        for (kind, handle) in handles.0.iter_mut() {
            match handle.await {
                Ok(task_run) => runs.push(task_run),
                Err(err) => {
                    let reason = format!("task did not complete: {err}");
                    let started_at = time::OffsetDateTime::now_utc();
                    runs.push(TaskRun {
                        task: *kind,
                        resolution: Resolution::Failed(reason.clone()),
                        entries: vec![AuditEntry::new(
                            *kind,
                            1,
                            started_at,
                            AttemptOutcome::Fatal { reason },
                        )],
                    });
                }
            }
        }
        runs
    }

    /// Record a task's attempts and apply its result. Returns an abort
    /// reason if the run cannot continue.
    fn resolve(
        &self,
        run: &mut ActiveRun,
        input: &TaskInput,
        task_run: TaskRun,
    ) -> Option<AbortReason> {
        let kind = task_run.task;
        run.trail.extend(task_run.entries);

        let failure = match task_run.resolution {
            Resolution::Interrupted(reason) => {
                run.status.set_task(kind, TaskRunState::Cancelled);
                return Some(reason);
            }
            Resolution::Completed(TaskOutcome::Success(update)) => {
                merge(run, kind, update, TaskRunState::Succeeded).err()
            }
            Resolution::Completed(TaskOutcome::Degraded(update, _)) => {
                merge(run, kind, update, TaskRunState::Degraded).err()
            }
            Resolution::Completed(TaskOutcome::Fatal(reason)) | Resolution::Failed(reason) => {
                Some(reason)
            }
        };

        let reason = failure?;

        match kind.failure_policy() {
            FailurePolicy::AbortRun => {
                run.status.set_task(kind, TaskRunState::Failed);
                run.trail.amend_last(kind, |e| {
                    e.outcome = AttemptOutcome::Fatal {
                        reason: reason.clone(),
                    }
                });
                Some(AbortReason::Fatal { task: kind, reason })
            }
            FailurePolicy::Degrade => {
                let fields = match self.tasks.degraded_update(kind, &run.context) {
                    Some(update) => match Merger::apply(&mut run.context, update) {
                        Ok(fields) => fields,
                        Err(err) => {
                            warn!(task = %kind, error = %err, "degraded update rejected");
                            Vec::new()
                        }
                    },
                    None => Vec::new(),
                };
                warn!(task = %kind, %reason, ?fields, "continuing with degraded task output");
                run.status.set_task(kind, TaskRunState::Degraded);
                run.trail.amend_last(kind, |e| {
                    e.outcome = AttemptOutcome::Degraded {
                        reason: reason.clone(),
                    };
                    e.fields_written = fields;
                });
                None
            }
            FailurePolicy::PolicyFallback => {
                let decision = self.tasks.decision_synthesis().fallback(
                    &run.context,
                    &input.degraded,
                    &reason,
                );
                info!(
                    task = %kind,
                    recommendation = %decision.recommendation,
                    %reason,
                    "applied fallback decision policy"
                );

                let outcome_reason = format!("{reason}; fallback policy applied");
                match Merger::apply(&mut run.context, PartialUpdate::Decision(decision)) {
                    Ok(fields) => {
                        run.status.set_task(kind, TaskRunState::Degraded);
                        run.trail.amend_last(kind, |e| {
                            e.outcome = AttemptOutcome::Degraded {
                                reason: outcome_reason,
                            };
                            e.fields_written = fields;
                            if !e.data_sources.iter().any(|s| s == sources::DECISION_POLICY) {
                                e.data_sources.push(sources::DECISION_POLICY.to_string());
                            }
                        });
                        None
                    }
                    Err(err) => {
                        run.status.set_task(kind, TaskRunState::Failed);
                        Some(AbortReason::Fatal {
                            task: kind,
                            reason: format!("{outcome_reason}, but the decision was rejected: {err}"),
                        })
                    }
                }
            }
        }
    }
}

fn merge(
    run: &mut ActiveRun,
    kind: TaskKind,
    update: PartialUpdate,
    state: TaskRunState,
) -> Result<(), String> {
    if update.writer() != kind {
        return Err(format!(
            "update rejected: {kind} produced output reserved for {}",
            update.writer()
        ));
    }

    match Merger::apply(&mut run.context, update) {
        Ok(fields) => {
            run.status.set_task(kind, state);
            run.trail
                .amend_last(kind, |e| e.fields_written = fields);
            Ok(())
        }
        Err(err) => Err(format!("update rejected: {err}")),
    }
}

fn finish(run: &mut ActiveRun, abort: Option<AbortReason>) {
    match abort {
        Some(reason) => {
            run.status.transition(RunState::Aborted);
            run.status.skip_pending();
            warn!(alert_id = run.context.alert_id(), %reason, "analysis aborted");
            run.abort = Some(reason);
        }
        None => {
            run.status.transition(RunState::Completed);
            info!(
                alert_id = run.context.alert_id(),
                recommendation = ?run.context.recommendation(),
                confidence = ?run.context.confidence_level(),
                "analysis completed"
            );
        }
    }
}

fn into_outcome(run: ActiveRun) -> RunOutcome {
    RunOutcome {
        state: run.status.state(),
        abort_reason: run.abort,
        tasks: run.status.tasks().clone(),
        context: run.context,
        audit: run.trail,
    }
}
