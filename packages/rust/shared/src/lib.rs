//! Shared types, error model, and configuration for coursegrade.
//!
//! This crate is the foundation depended on by all other coursegrade crates.
//! It provides:
//! - [`GradeError`]: the unified error type
//! - Domain types ([`Submission`], [`Scores`], [`SubmissionStatus`], [`RunId`])
//! - Configuration ([`AppConfig`] and its sections, config loading)
//! - [`fs::write_atomic`] for output files

pub mod config;
pub mod error;
pub mod fs;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, PathsConfig, RunnerConfig, ScoringConfig, SiteConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from, resolve_config_path,
    validate_config,
};
pub use error::{GradeError, Result};
pub use types::{DEFAULT_NOTEBOOK_PATH, RunId, Scores, Submission, SubmissionStatus};
