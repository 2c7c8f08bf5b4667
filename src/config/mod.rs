// src/config/mod.rs

//! Configuration loading and validation for tradesight.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate thresholds, durations and patterns into typed [`Settings`]
//!   (`validate.rs`).

pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use duration::parse_duration;
pub use loader::{DEFAULT_CONFIG_FILE, load_and_validate, load_from_path, load_or_default};
pub use model::{
    ConfigFile, EngineSection, EngineSettings, EnrichmentSection, EnrichmentSettings,
    PolicySection, RawConfigFile, Settings, ValidationSection,
};
