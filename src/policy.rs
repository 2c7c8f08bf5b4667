// src/policy.rs

//! Deterministic, rule-based recommendation.
//!
//! Used as the floor under the reasoning service and as its replacement
//! when that service is unavailable or unsure. Given the same context and
//! the same degraded set, [`DecisionPolicy::decide`] always returns the same
//! decision: it reads no clock and iterates nothing unordered.

use std::collections::{BTreeMap, BTreeSet};

use crate::context::{AlertContext, Decision, DecisionBasis, EvidenceCoverage, SimilarCase};
use crate::tasks::TaskKind;
use crate::types::{ConfidenceLevel, Recommendation};

/// Numeric thresholds and labels driving [`DecisionPolicy`].
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyThresholds {
    /// Scores strictly above this escalate.
    pub escalate_threshold: f64,
    /// Scores strictly above this (and not escalated) are monitored.
    pub monitor_threshold: f64,
    pub strong_match_similarity: f64,
    pub weak_match_similarity: f64,
    pub reasoning_acceptance: f64,
    pub degraded_interval_widening: f64,
    /// Upper-cased outcome labels that denote a confirmed violation.
    pub violation_categories: BTreeSet<String>,
}

impl Default for PolicyThresholds {
    fn default() -> Self {
        Self {
            escalate_threshold: 0.75,
            monitor_threshold: 0.5,
            strong_match_similarity: 0.85,
            weak_match_similarity: 0.6,
            reasoning_acceptance: 0.7,
            degraded_interval_widening: 0.1,
            violation_categories: [
                "SPOOFING",
                "LAYERING",
                "WASH_TRADING",
                "INSIDER_TRADING",
                "FRONT_RUNNING",
                "MARKING_THE_CLOSE",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecisionPolicy {
    thresholds: PolicyThresholds,
}

/// Which rule produced the recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rule {
    ScoreAboveEscalate,
    QualifyingMatches,
    ScoreInMonitorBand,
    MissingScore,
    WeakMatches,
    SuspiciousCommunications,
    NoCorroboration,
}

impl DecisionPolicy {
    pub fn new(thresholds: PolicyThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &PolicyThresholds {
        &self.thresholds
    }

    pub fn is_violation(&self, outcome: &str) -> bool {
        self.thresholds
            .violation_categories
            .contains(&outcome.trim().to_uppercase())
    }

    /// Violation cases at or above the strong similarity threshold.
    pub fn qualifying_matches<'a>(&self, cases: &'a [SimilarCase]) -> Vec<&'a SimilarCase> {
        cases
            .iter()
            .filter(|c| {
                c.similarity >= self.thresholds.strong_match_similarity && self.is_violation(&c.outcome)
            })
            .collect()
    }

    /// Violation cases in `[weak, strong)` similarity.
    pub fn weak_matches<'a>(&self, cases: &'a [SimilarCase]) -> Vec<&'a SimilarCase> {
        cases
            .iter()
            .filter(|c| {
                c.similarity >= self.thresholds.weak_match_similarity
                    && c.similarity < self.thresholds.strong_match_similarity
                    && self.is_violation(&c.outcome)
            })
            .collect()
    }

    /// Recommendation, confidence and numeric evidence for `ctx`.
    ///
    /// Figures are reported at full precision so the evidence always agrees
    /// with the comparison that produced the decision.
    ///
    /// A missing anomaly score is never read as "nothing to see": it floors
    /// the result at MONITOR. Any degraded upstream task lowers confidence
    /// by one level without touching the recommendation.
    pub fn decide(&self, ctx: &AlertContext, degraded: &[TaskKind]) -> Decision {
        let t = &self.thresholds;
        let cases = ctx.similar_cases().unwrap_or_default();
        let communications = ctx.communication_signals().unwrap_or_default();

        let strong = self.qualifying_matches(cases);
        let weak = self.weak_matches(cases);
        let suspicious = communications.iter().filter(|c| c.suspicious).count();
        let score = ctx.anomaly_score();

        let rule = match score {
            Some(s) if s > t.escalate_threshold => Rule::ScoreAboveEscalate,
            _ if !strong.is_empty() => Rule::QualifyingMatches,
            Some(s) if s > t.monitor_threshold => Rule::ScoreInMonitorBand,
            None => Rule::MissingScore,
            _ if !weak.is_empty() => Rule::WeakMatches,
            _ if suspicious > 0 => Rule::SuspiciousCommunications,
            _ => Rule::NoCorroboration,
        };

        let (recommendation, base_confidence) = match rule {
            Rule::ScoreAboveEscalate | Rule::QualifyingMatches => {
                (Recommendation::Escalate, ConfidenceLevel::High)
            }
            Rule::ScoreInMonitorBand
            | Rule::MissingScore
            | Rule::WeakMatches
            | Rule::SuspiciousCommunications => (Recommendation::Monitor, ConfidenceLevel::Medium),
            Rule::NoCorroboration => (Recommendation::Dismiss, ConfidenceLevel::Low),
        };

        let confidence_level = if degraded.is_empty() {
            base_confidence
        } else {
            base_confidence.downgrade()
        };

        let mut evidence = BTreeMap::new();

        evidence.insert(
            "anomaly_score".to_string(),
            match score {
                Some(s) => format!(
                    "{s} against escalate threshold {} and monitor threshold {}",
                    t.escalate_threshold, t.monitor_threshold
                ),
                None => "unavailable; treated as unresolved".to_string(),
            },
        );

        if let Some(ci) = ctx.confidence_interval() {
            evidence.insert(
                "confidence_interval".to_string(),
                format!("[{}, {}]", ci.lower, ci.upper),
            );
        }

        evidence.insert(
            "historical_matches".to_string(),
            format!(
                "{} of {} similar cases are violations at similarity >= {}{}; {} at >= {}",
                strong.len(),
                cases.len(),
                t.strong_match_similarity,
                describe_cases(&strong),
                weak.len(),
                t.weak_match_similarity
            ),
        );

        let coverage = match ctx.evidence_coverage() {
            Some(EvidenceCoverage::Full) => "full coverage",
            Some(EvidenceCoverage::Reduced) => "reduced coverage",
            None => "not gathered",
        };
        evidence.insert(
            "communications".to_string(),
            format!(
                "{suspicious} suspicious of {} reviewed ({coverage})",
                communications.len()
            ),
        );

        if let Some(mc) = ctx.market_context() {
            evidence.insert(
                "market_context".to_string(),
                format!(
                    "participation {:.4}, spread {:.1} bps, volume anomaly {}, volatility spike {}",
                    mc.participation_rate, mc.spread_bps, mc.volume_anomaly, mc.volatility_spike
                ),
            );
        }

        if !degraded.is_empty() {
            evidence.insert(
                "degraded_inputs".to_string(),
                format!(
                    "{}; confidence lowered from {base_confidence} to {confidence_level}",
                    join_tasks(degraded)
                ),
            );
        }

        let because = self.rule_text(rule, score, &strong, &weak, suspicious);
        evidence.insert("decision_rule".to_string(), because.clone());

        let pattern = ctx
            .pattern_details()
            .map(|p| format!(" Pattern: {}.", p.pattern_type))
            .unwrap_or_default();

        Decision {
            recommendation,
            confidence_level,
            summary: format!("{recommendation} by rule: {because}.{pattern}"),
            evidence,
            suggested_actions: self.actions(ctx, recommendation, &strong, degraded),
            basis: DecisionBasis::FallbackPolicy,
        }
    }

    fn rule_text(
        &self,
        rule: Rule,
        score: Option<f64>,
        strong: &[&SimilarCase],
        weak: &[&SimilarCase],
        suspicious: usize,
    ) -> String {
        let t = &self.thresholds;
        let s = score.unwrap_or_default();
        match rule {
            Rule::ScoreAboveEscalate => {
                format!("anomaly score {s} > {}", t.escalate_threshold)
            }
            Rule::QualifyingMatches => format!(
                "{} historical violation match(es) with similarity >= {}",
                strong.len(),
                t.strong_match_similarity
            ),
            Rule::ScoreInMonitorBand => format!(
                "anomaly score {s} in ({}, {}]",
                t.monitor_threshold, t.escalate_threshold
            ),
            Rule::MissingScore => "anomaly score unavailable; alert cannot be dismissed".to_string(),
            Rule::WeakMatches => format!(
                "{} weaker historical violation match(es) with similarity >= {}",
                weak.len(),
                t.weak_match_similarity
            ),
            Rule::SuspiciousCommunications => {
                format!("{suspicious} suspicious communication(s) near the trades")
            }
            Rule::NoCorroboration => format!(
                "anomaly score {s} <= {} with no corroborating signal",
                t.monitor_threshold
            ),
        }
    }

    fn actions(
        &self,
        ctx: &AlertContext,
        recommendation: Recommendation,
        strong: &[&SimilarCase],
        degraded: &[TaskKind],
    ) -> Vec<String> {
        let client = ctx
            .client_profile()
            .map(|c| c.client_id.as_str())
            .unwrap_or("the client");

        let mut actions = match recommendation {
            Recommendation::Escalate => {
                let category = strong
                    .first()
                    .map(|c| c.outcome.trim().to_uppercase())
                    .unwrap_or_else(|| "market abuse".to_string());
                vec![
                    format!("Review the complete order log for {client}"),
                    "Interview the trader about order placement strategy".to_string(),
                    format!("Refer to compliance legal review for potential {category}"),
                ]
            }
            Recommendation::Monitor => vec![
                format!("Add {client} to the enhanced monitoring watchlist"),
                "Re-review the alert after the next trading session".to_string(),
            ],
            Recommendation::Dismiss => {
                vec!["Close the alert with the documented rationale".to_string()]
            }
        };

        if !degraded.is_empty() {
            actions.push(format!(
                "Re-run the analysis once {} inputs are available",
                join_tasks(degraded)
            ));
        }

        actions
    }
}

fn describe_cases(cases: &[&SimilarCase]) -> String {
    if cases.is_empty() {
        return String::new();
    }
    let listed: Vec<String> = cases
        .iter()
        .map(|c| format!("{} {} {}", c.case_id, c.similarity, c.outcome))
        .collect();
    format!(" ({})", listed.join(", "))
}

fn join_tasks(tasks: &[TaskKind]) -> String {
    let names: Vec<&str> = tasks.iter().map(|t| t.name()).collect();
    names.join(", ")
}
