//! Batch grading orchestration for coursegrade.
//!
//! This crate ties the submissions registry, the per-team process runner
//! (git, python env, notebook), scoring, and the leaderboard into the
//! end-to-end [`pipeline::run_batch`] workflow.

pub mod pipeline;
pub mod runner;
pub mod submissions;
