//! The leaderboard CSV: one row per team, latest submission wins.
//!
//! Rows are kept sorted by AUROC (desc), then AUPRC (desc), then Brier
//! (asc). Missing metrics sort after present ones for every key.

pub mod record;

use std::cmp::Ordering;
use std::path::Path;

use tracing::{debug, info, instrument};

use coursegrade_shared::fs::write_atomic;
use coursegrade_shared::{GradeError, Result};

pub use record::{
    COLUMNS, LeaderboardRecord, MAX_NOTES_CHARS, format_timestamp, truncate_notes,
};

/// Read every row of the leaderboard. A missing file is an empty leaderboard.
pub fn read_leaderboard(path: &Path) -> Result<Vec<LeaderboardRecord>> {
    if !path.exists() {
        debug!(path = %path.display(), "leaderboard not found, starting empty");
        return Ok(Vec::new());
    }

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| GradeError::csv(path, e))?;

    reader
        .deserialize()
        .collect::<std::result::Result<Vec<LeaderboardRecord>, _>>()
        .map_err(|e| GradeError::csv(path, e))
}

/// Write the leaderboard as given (header first, then rows).
pub fn write_leaderboard(path: &Path, records: &[LeaderboardRecord]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer
        .write_record(COLUMNS)
        .map_err(|e| GradeError::csv(path, e))?;
    for record in records {
        writer
            .serialize(record)
            .map_err(|e| GradeError::csv(path, e))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| GradeError::csv(path, e.error()))?;

    write_atomic(path, &bytes)
}

/// Replace the team's row with `record`, re-sort, and rewrite the file.
#[instrument(skip_all, fields(path = %path.display(), team = %record.team, status = %record.status))]
pub fn upsert(path: &Path, record: LeaderboardRecord) -> Result<Vec<LeaderboardRecord>> {
    let mut records = read_leaderboard(path)?;
    let before = records.len();
    records.retain(|r| r.team != record.team);
    let replaced = before != records.len();

    records.push(record);
    sort_records(&mut records);
    write_leaderboard(path, &records)?;

    info!(rows = records.len(), replaced, "leaderboard updated");
    Ok(records)
}

/// Sort for display: AUROC desc, AUPRC desc, Brier asc, missing values last.
pub fn sort_records(records: &mut [LeaderboardRecord]) {
    records.sort_by(|a, b| {
        descending(a.auroc, b.auroc)
            .then_with(|| descending(a.auprc, b.auprc))
            .then_with(|| ascending(a.brier, b.brier))
    });
}

fn descending(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn ascending(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
