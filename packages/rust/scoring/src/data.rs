//! Loading hidden labels and team predictions from CSV.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use csv::StringRecord;
use tracing::debug;

use coursegrade_shared::{GradeError, Result, ScoringConfig};

/// Hidden labels keyed by row id, in file order.
#[derive(Debug, Clone, Default)]
pub struct LabelSet {
    pub ids: Vec<String>,
    pub labels: Vec<bool>,
}

impl LabelSet {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Predicted probabilities keyed by row id.
#[derive(Debug, Clone, Default)]
pub struct PredictionSet {
    /// Column the probabilities were read from.
    pub column: String,
    pub probs: HashMap<String, f64>,
}

/// Read the hidden labels file.
pub fn load_labels(path: &Path, opts: &ScoringConfig) -> Result<LabelSet> {
    let (headers, rows) = read_rows(path)?;
    let id_idx = column_index(&headers, &opts.id_column, path)?;
    let label_idx = column_index(&headers, &opts.label_column, path)?;

    let mut set = LabelSet::default();
    let mut seen = HashSet::new();
    for (i, row) in rows.iter().enumerate() {
        let id = field(row, id_idx);
        if id.is_empty() {
            return Err(row_error(path, i, format!("empty {}", opts.id_column)));
        }
        let raw = field(row, label_idx);
        let label = parse_label(raw).ok_or_else(|| {
            row_error(path, i, format!("label {raw:?} is not 0 or 1"))
        })?;
        if !seen.insert(id.to_string()) {
            return Err(row_error(path, i, format!("duplicate {} {id:?}", opts.id_column)));
        }
        set.ids.push(id.to_string());
        set.labels.push(label);
    }

    debug!(path = %path.display(), rows = set.len(), "loaded labels");
    Ok(set)
}

/// Read a predictions file written by a team notebook.
///
/// Uses the configured probability column, or the only non-id column when
/// the configured one is absent.
pub fn load_predictions(path: &Path, opts: &ScoringConfig) -> Result<PredictionSet> {
    if !path.exists() {
        return Err(GradeError::scoring(format!(
            "predictions file not found: {}",
            path.display()
        )));
    }
    let (headers, rows) = read_rows(path)?;
    let id_idx = column_index(&headers, &opts.id_column, path)?;
    let prob_idx = match headers.iter().position(|h| h.trim() == opts.prediction_column) {
        Some(idx) => idx,
        None => sole_other_column(&headers, id_idx).ok_or_else(|| {
            GradeError::scoring(format!(
                "{} has no {:?} column",
                path.display(),
                opts.prediction_column
            ))
        })?,
    };

    let mut probs = HashMap::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        let id = field(row, id_idx);
        let raw = field(row, prob_idx);
        let prob: f64 = raw.parse().map_err(|_| {
            row_error(path, i, format!("probability {raw:?} is not a number"))
        })?;
        if !prob.is_finite() || !(0.0..=1.0).contains(&prob) {
            return Err(row_error(path, i, format!("probability {raw} is outside [0, 1]")));
        }
        if probs.insert(id.to_string(), prob).is_some() {
            return Err(row_error(path, i, format!("duplicate {} {id:?}", opts.id_column)));
        }
    }

    let column = headers.get(prob_idx).unwrap_or_default().trim().to_string();
    debug!(path = %path.display(), rows = probs.len(), %column, "loaded predictions");
    Ok(PredictionSet { column, probs })
}

fn read_rows(path: &Path) -> Result<(StringRecord, Vec<StringRecord>)> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| GradeError::csv(path, e))?;
    let headers = reader.headers().map_err(|e| GradeError::csv(path, e))?.clone();
    let rows = reader
        .records()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| GradeError::csv(path, e))?;
    Ok((headers, rows))
}

fn column_index(headers: &StringRecord, name: &str, path: &Path) -> Result<usize> {
    headers
        .iter()
        .position(|h| h == name)
        .ok_or_else(|| GradeError::scoring(format!("{} has no {name:?} column", path.display())))
}

fn sole_other_column(headers: &StringRecord, id_idx: usize) -> Option<usize> {
    let mut others = (0..headers.len()).filter(|&i| i != id_idx);
    match (others.next(), others.next()) {
        (Some(idx), None) => Some(idx),
        _ => None,
    }
}

fn field(row: &StringRecord, idx: usize) -> &str {
    row.get(idx).unwrap_or_default()
}

fn parse_label(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "1.0" | "true" => Some(true),
        "0" | "0.0" | "false" => Some(false),
        _ => None,
    }
}

/// `row` is the 0-based data row; the header is line 1.
fn row_error(path: &Path, row: usize, message: String) -> GradeError {
    GradeError::scoring(format!("{} line {}: {message}", path.display(), row + 2))
}
