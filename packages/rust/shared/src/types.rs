//! Core domain types shared by the grading crates.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Notebook used when a submission row leaves `nb_path` blank.
pub const DEFAULT_NOTEBOOK_PATH: &str = "Project-1/readmit30/notebooks/submission.ipynb";

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one batch grading run (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

/// One row of the submissions registry: which team, which repo, which ref.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    /// Team name as it appears on the leaderboard.
    pub team: String,
    /// Anything `git clone` accepts.
    pub repo_url: String,
    /// Tag, branch, or commit SHA to grade.
    #[serde(rename = "ref")]
    pub git_ref: String,
    /// Notebook path relative to the repository root.
    pub nb_path: String,
}

// ---------------------------------------------------------------------------
// Scores
// ---------------------------------------------------------------------------

/// Metrics for one predictions file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scores {
    /// Area under the ROC curve.
    pub auroc: f64,
    /// Area under the precision-recall curve (average precision).
    pub auprc: f64,
    /// Mean squared error of the probabilities. Lower is better.
    pub brier: f64,
    /// Number of labeled rows scored.
    pub n: usize,
}

// ---------------------------------------------------------------------------
// SubmissionStatus
// ---------------------------------------------------------------------------

/// Outcome of grading one submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SubmissionStatus {
    Ok,
    Error,
    /// Any other value found in an existing leaderboard file.
    Other(String),
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Ok => "OK",
            Self::Error => "ERROR",
            Self::Other(s) => s,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl std::fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for SubmissionStatus {
    fn from(s: &str) -> Self {
        match s {
            "OK" => Self::Ok,
            "ERROR" => Self::Error,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for SubmissionStatus {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<SubmissionStatus> for String {
    fn from(status: SubmissionStatus) -> Self {
        status.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_ids_are_unique() {
        let a = RunId::new();
        let b = RunId::new();
        assert_ne!(a, b);
        assert_eq!(a.to_string().len(), 36);
    }

    #[test]
    fn status_from_str() {
        assert_eq!(SubmissionStatus::from("OK"), SubmissionStatus::Ok);
        assert_eq!(SubmissionStatus::from("ERROR"), SubmissionStatus::Error);
        assert_eq!(
            SubmissionStatus::from("TIMEOUT"),
            SubmissionStatus::Other("TIMEOUT".into())
        );
        assert!(SubmissionStatus::Ok.is_ok());
        assert_eq!(SubmissionStatus::Other("X".into()).to_string(), "X");
    }
}
