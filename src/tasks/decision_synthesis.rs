// src/tasks/decision_synthesis.rs

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::backends::{ReasoningRequest, ReasoningResponse, ReasoningService};
use crate::context::{AlertContext, Decision, DecisionBasis, PartialUpdate};
use crate::policy::DecisionPolicy;
use crate::tasks::{TaskError, TaskInput, TaskKind, TaskOutcome};
use crate::types::ConfidenceLevel;

/// Produces the final recommendation.
///
/// The reasoning service is asked first; its answer is accepted only when
/// it reports enough confidence and is at least as severe as the policy
/// baseline. Otherwise the [`DecisionPolicy`] result is used and the task
/// reports itself degraded. This task never fails: a decision always comes
/// out.
#[derive(Debug, Clone)]
pub struct DecisionSynthesis {
    reasoning: Arc<dyn ReasoningService>,
    policy: DecisionPolicy,
    reasoning_timeout: Duration,
}

impl DecisionSynthesis {
    pub fn new(
        reasoning: Arc<dyn ReasoningService>,
        policy: DecisionPolicy,
        reasoning_timeout: Duration,
    ) -> Self {
        Self {
            reasoning,
            policy,
            reasoning_timeout,
        }
    }

    pub fn policy(&self) -> &DecisionPolicy {
        &self.policy
    }

    pub async fn execute(&self, input: &TaskInput) -> Result<TaskOutcome, TaskError> {
        let ctx = input.context.as_ref();
        let degraded = input.degraded.as_slice();
        let baseline = self.policy.decide(ctx, degraded);

        let request = ReasoningRequest {
            context: ctx,
            degraded,
        };

        let response = match timeout(self.reasoning_timeout, self.reasoning.synthesize(request)).await
        {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => {
                let reason = format!("reasoning service failed ({err})");
                return Ok(self.fallback_outcome(ctx, degraded, reason));
            }
            Err(_) => {
                let reason = format!(
                    "reasoning service did not answer within {:?}",
                    self.reasoning_timeout
                );
                return Ok(self.fallback_outcome(ctx, degraded, reason));
            }
        };

        let acceptance = self.policy.thresholds().reasoning_acceptance;
        if !(response.confidence >= acceptance && response.confidence <= 1.0) {
            let reason = format!(
                "reasoning confidence {} below acceptance bar {acceptance}",
                response.confidence
            );
            return Ok(self.fallback_outcome(ctx, degraded, reason));
        }

        if response.recommendation < baseline.recommendation {
            let reason = format!(
                "reasoning proposed {} but policy requires at least {}",
                response.recommendation, baseline.recommendation
            );
            return Ok(self.fallback_outcome(ctx, degraded, reason));
        }

        let decision = accept(response, baseline, degraded, acceptance);
        debug!(
            alert_id = ctx.alert_id(),
            recommendation = %decision.recommendation,
            confidence = %decision.confidence_level,
            "accepted reasoning-service decision"
        );
        Ok(TaskOutcome::Success(PartialUpdate::Decision(decision)))
    }

    /// Policy decision annotated with why it replaced the reasoning result.
    pub fn fallback(&self, ctx: &AlertContext, degraded: &[TaskKind], reason: &str) -> Decision {
        let mut decision = self.policy.decide(ctx, degraded);
        decision
            .evidence
            .insert("fallback_reason".to_string(), reason.to_string());
        decision
    }

    fn fallback_outcome(
        &self,
        ctx: &AlertContext,
        degraded: &[TaskKind],
        reason: String,
    ) -> TaskOutcome {
        warn!(alert_id = ctx.alert_id(), %reason, "applying fallback decision policy");
        let decision = self.fallback(ctx, degraded, &reason);
        info!(
            alert_id = ctx.alert_id(),
            recommendation = %decision.recommendation,
            "fallback decision produced"
        );
        TaskOutcome::Degraded(
            PartialUpdate::Decision(decision),
            format!("{reason}; fallback policy applied"),
        )
    }
}

fn accept(
    response: ReasoningResponse,
    baseline: Decision,
    degraded: &[TaskKind],
    acceptance: f64,
) -> Decision {
    let mut confidence_level = ConfidenceLevel::from_probability(response.confidence);
    if !degraded.is_empty() {
        confidence_level = confidence_level.downgrade();
    }

    // Policy figures win over service claims on shared keys. The policy's
    // own rule is kept under `policy_baseline` so it cannot be read as the
    // rule behind this decision.
    let mut baseline_evidence = baseline.evidence;
    let rule = baseline_evidence
        .remove("decision_rule")
        .unwrap_or_else(|| "not recorded".to_string());

    let mut evidence = response.evidence;
    evidence.remove("decision_rule");
    evidence.extend(baseline_evidence);
    evidence.insert(
        "policy_baseline".to_string(),
        format!("{} by rule: {rule}", baseline.recommendation),
    );
    evidence.insert(
        "reasoning_confidence".to_string(),
        format!("{} (acceptance bar {acceptance})", response.confidence),
    );

    let suggested_actions = if response.suggested_actions.is_empty() {
        baseline.suggested_actions
    } else {
        response.suggested_actions
    };

    Decision {
        recommendation: response.recommendation,
        confidence_level,
        summary: response.summary,
        evidence,
        suggested_actions,
        basis: DecisionBasis::ReasoningService,
    }
}
