// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;
use ulid::Ulid;

use crate::engine::AbortReason;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Fixture error: {0}")]
    FixtureError(String),

    #[error("Invalid task graph: {0}")]
    InvalidGraph(String),

    #[error("Analysis {trace_id} aborted: {reason}")]
    Aborted { trace_id: Ulid, reason: AbortReason },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
