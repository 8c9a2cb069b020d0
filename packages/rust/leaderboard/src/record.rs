//! A single leaderboard row.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use coursegrade_shared::{Scores, SubmissionStatus};

/// Longest error note kept on the leaderboard, in characters.
pub const MAX_NOTES_CHARS: usize = 300;

/// Column order of the leaderboard CSV.
pub const COLUMNS: [&str; 9] = [
    "team",
    "submission",
    "auroc",
    "auprc",
    "brier",
    "n",
    "timestamp",
    "status",
    "notes",
];

/// One row of `leaderboard.csv`. Field order matches [`COLUMNS`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardRecord {
    pub team: String,
    /// Git ref that was graded.
    #[serde(default)]
    pub submission: String,
    #[serde(default, deserialize_with = "lenient_metric")]
    pub auroc: Option<f64>,
    #[serde(default, deserialize_with = "lenient_metric")]
    pub auprc: Option<f64>,
    #[serde(default, deserialize_with = "lenient_metric")]
    pub brier: Option<f64>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub n: Option<usize>,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default = "error_status")]
    pub status: SubmissionStatus,
    #[serde(default)]
    pub notes: String,
}

fn error_status() -> SubmissionStatus {
    SubmissionStatus::Error
}

impl LeaderboardRecord {
    /// The record a submission starts with before grading succeeds.
    pub fn pending(team: &str, git_ref: &str, started_at: DateTime<Utc>) -> Self {
        Self {
            team: team.to_string(),
            submission: git_ref.to_string(),
            auroc: None,
            auprc: None,
            brier: None,
            n: None,
            timestamp: format_timestamp(started_at),
            status: SubmissionStatus::Error,
            notes: String::new(),
        }
    }

    /// Mark the record as graded successfully.
    pub fn with_scores(mut self, scores: &Scores) -> Self {
        self.auroc = Some(scores.auroc);
        self.auprc = Some(scores.auprc);
        self.brier = Some(scores.brier);
        self.n = Some(scores.n);
        self.status = SubmissionStatus::Ok;
        self.notes.clear();
        self
    }

    /// Mark the record as failed, keeping a truncated error message.
    pub fn with_error(mut self, message: &str) -> Self {
        self.status = SubmissionStatus::Error;
        self.notes = truncate_notes(message);
        self
    }
}

/// UTC timestamp with second precision and an explicit offset,
/// e.g. `2026-10-17T08:30:00+00:00`.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// Keep at most [`MAX_NOTES_CHARS`] characters (not bytes).
pub fn truncate_notes(message: &str) -> String {
    message.chars().take(MAX_NOTES_CHARS).collect()
}

/// Empty, unparseable, or non-finite values read as missing.
fn lenient_metric<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite()))
}

/// Accepts `120` as well as `120.0`, which float-typed writers produce.
fn lenient_count<'de, D>(deserializer: D) -> Result<Option<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|s| {
        let s = s.trim();
        s.parse::<usize>().ok().or_else(|| {
            s.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite() && *v >= 0.0 && v.fract() == 0.0)
                .map(|v| v as usize)
        })
    }))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn started() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 17, 8, 30, 0).unwrap()
    }

    #[test]
    fn pending_record_is_an_error_without_metrics() {
        let record = LeaderboardRecord::pending("Team A", "final_week6", started());
        assert_eq!(record.status, SubmissionStatus::Error);
        assert_eq!(record.timestamp, "2026-10-17T08:30:00+00:00");
        assert_eq!(record.submission, "final_week6");
        assert!(record.auroc.is_none());
        assert!(record.n.is_none());
    }

    #[test]
    fn with_scores_marks_ok() {
        let scores = Scores {
            auroc: 0.8,
            auprc: 0.5,
            brier: 0.1,
            n: 42,
        };
        let record = LeaderboardRecord::pending("t", "v1", started()).with_scores(&scores);
        assert_eq!(record.status, SubmissionStatus::Ok);
        assert_eq!(record.auroc, Some(0.8));
        assert_eq!(record.n, Some(42));
        assert!(record.notes.is_empty());
    }

    #[test]
    fn notes_truncate_by_characters() {
        let long = "é".repeat(MAX_NOTES_CHARS + 50);
        let record = LeaderboardRecord::pending("t", "v1", started()).with_error(&long);
        assert_eq!(record.notes.chars().count(), MAX_NOTES_CHARS);
        assert_eq!(record.status, SubmissionStatus::Error);

        assert_eq!(truncate_notes("short"), "short");
    }
}
