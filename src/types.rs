// src/types.rs

//! Small enums shared by the request surface, the context and the policy.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Caller-assigned priority of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(format!(
                "invalid priority: {other} (expected \"low\", \"medium\" or \"high\")"
            )),
        }
    }
}

/// How much surrounding evidence the analysis should pull in.
///
/// `Full` widens the similarity and communication searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextDepth {
    Summary,
    Full,
}

impl Default for ContextDepth {
    fn default() -> Self {
        ContextDepth::Summary
    }
}

impl ContextDepth {
    /// Multiplier applied to search limits.
    pub fn search_multiplier(self) -> usize {
        match self {
            ContextDepth::Summary => 1,
            ContextDepth::Full => 2,
        }
    }
}

impl FromStr for ContextDepth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "summary" => Ok(ContextDepth::Summary),
            "full" => Ok(ContextDepth::Full),
            other => Err(format!(
                "invalid context depth: {other} (expected \"summary\" or \"full\")"
            )),
        }
    }
}

/// Final disposition of an alert.
///
/// Variants are ordered by severity so that `max` picks the more
/// conservative of two recommendations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Recommendation {
    Dismiss,
    Monitor,
    Escalate,
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Recommendation::Escalate => "ESCALATE",
            Recommendation::Monitor => "MONITOR",
            Recommendation::Dismiss => "DISMISS",
        };
        f.write_str(s)
    }
}

impl FromStr for Recommendation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "ESCALATE" => Ok(Recommendation::Escalate),
            "MONITOR" => Ok(Recommendation::Monitor),
            "DISMISS" => Ok(Recommendation::Dismiss),
            other => Err(format!(
                "invalid recommendation: {other} (expected ESCALATE, MONITOR or DISMISS)"
            )),
        }
    }
}

/// Confidence attached to a recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

impl ConfidenceLevel {
    /// One level lower, saturating at `Low`.
    pub fn downgrade(self) -> Self {
        match self {
            ConfidenceLevel::High => ConfidenceLevel::Medium,
            ConfidenceLevel::Medium | ConfidenceLevel::Low => ConfidenceLevel::Low,
        }
    }

    /// Map a self-reported probability onto a level.
    pub fn from_probability(p: f64) -> Self {
        if p >= 0.85 {
            ConfidenceLevel::High
        } else if p >= 0.6 {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConfidenceLevel::High => "high",
            ConfidenceLevel::Medium => "medium",
            ConfidenceLevel::Low => "low",
        };
        f.write_str(s)
    }
}
