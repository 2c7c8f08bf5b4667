// src/context/mod.rs

//! Shared alert state threaded through the task graph.
//!
//! - [`records`] holds the domain records retrieved or derived by tasks.
//! - [`alert`] defines [`AlertContext`], the append-only-by-field record.
//! - [`update`] defines the per-task partial updates.
//! - [`merge`] applies partial updates to a context, rejecting collisions.

pub mod alert;
pub mod merge;
pub mod records;
pub mod update;

pub use alert::{AlertContext, ContextField};
pub use merge::{MergeError, Merger};
pub use records::{
    ClientProfile, CommunicationSignal, ConfidenceInterval, Decision, DecisionBasis,
    EvidenceCoverage, MarketContext, MarketData, PatternDetails, SimilarCase, TradeRecord,
};
pub use update::{EnrichmentUpdate, PartialUpdate, PatternUpdate, RetrievalUpdate};
