//! Scoring of team predictions against hidden labels.
//!
//! This crate provides:
//! - [`data`]: label and prediction CSV loading
//! - [`metrics`]: AUROC, average precision (AUPRC), Brier score
//! - [`score_predictions`]: the join + score entry point used by the batch runner

pub mod data;
pub mod metrics;

use std::path::Path;

use tracing::{info, instrument, warn};

use coursegrade_shared::{GradeError, Result, Scores, ScoringConfig};

pub use data::{LabelSet, PredictionSet, load_labels, load_predictions};
pub use metrics::{auroc, average_precision, brier};

/// How many missing ids to name in an error message.
const MISSING_ID_PREVIEW: usize = 5;

/// Score a predictions file against the hidden labels file.
#[instrument(skip_all, fields(labels = %labels_path.display(), predictions = %predictions_path.display()))]
pub fn score_predictions(
    labels_path: &Path,
    predictions_path: &Path,
    opts: &ScoringConfig,
) -> Result<Scores> {
    let labels = load_labels(labels_path, opts)?;
    let predictions = load_predictions(predictions_path, opts)?;
    score_sets(&labels, &predictions)
}

/// Join predictions onto labels by id and compute every metric.
///
/// Every labeled id needs a prediction; predictions for unknown ids are
/// ignored.
pub fn score_sets(labels: &LabelSet, predictions: &PredictionSet) -> Result<Scores> {
    if labels.is_empty() {
        return Err(GradeError::scoring("labels file has no rows"));
    }

    let mut probs = Vec::with_capacity(labels.len());
    let mut missing = Vec::new();
    for id in &labels.ids {
        match predictions.probs.get(id) {
            Some(&p) => probs.push(p),
            None => missing.push(id.as_str()),
        }
    }

    if !missing.is_empty() {
        let preview: Vec<_> = missing.iter().take(MISSING_ID_PREVIEW).collect();
        return Err(GradeError::scoring(format!(
            "{} of {} labeled rows have no prediction (e.g. {:?})",
            missing.len(),
            labels.len(),
            preview
        )));
    }

    let extra = predictions.probs.len().saturating_sub(labels.len());
    if extra > 0 {
        warn!(extra, "ignoring predictions for ids without labels");
    }

    let scores = Scores {
        auroc: auroc(&labels.labels, &probs)?,
        auprc: average_precision(&labels.labels, &probs)?,
        brier: brier(&labels.labels, &probs)?,
        n: labels.len(),
    };
    info!(
        auroc = scores.auroc,
        auprc = scores.auprc,
        brier = scores.brier,
        n = scores.n,
        "scored predictions"
    );
    Ok(scores)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn label_set(rows: &[(&str, bool)]) -> LabelSet {
        LabelSet {
            ids: rows.iter().map(|(id, _)| id.to_string()).collect(),
            labels: rows.iter().map(|(_, y)| *y).collect(),
        }
    }

    fn prediction_set(rows: &[(&str, f64)]) -> PredictionSet {
        PredictionSet {
            column: "prob".into(),
            probs: rows
                .iter()
                .map(|(id, p)| (id.to_string(), *p))
                .collect::<HashMap<_, _>>(),
        }
    }

    #[test]
    fn joins_by_id_regardless_of_order() {
        let labels = label_set(&[("a", false), ("b", false), ("c", true), ("d", true)]);
        let preds = prediction_set(&[("d", 0.8), ("c", 0.35), ("b", 0.4), ("a", 0.1)]);

        let scores = score_sets(&labels, &preds).unwrap();
        assert!((scores.auroc - 0.75).abs() < 1e-10);
        assert!((scores.auprc - 5.0 / 6.0).abs() < 1e-10);
        assert!((scores.brier - 0.158125).abs() < 1e-10);
        assert_eq!(scores.n, 4);
    }

    #[test]
    fn extra_predictions_are_ignored() {
        let labels = label_set(&[("a", false), ("b", true)]);
        let preds = prediction_set(&[("a", 0.0), ("b", 1.0), ("zzz", 0.5)]);

        let scores = score_sets(&labels, &preds).unwrap();
        assert_eq!(scores.n, 2);
        assert!(scores.brier.abs() < 1e-10);
    }

    #[test]
    fn missing_predictions_error() {
        let labels = label_set(&[("a", false), ("b", true), ("c", true)]);
        let preds = prediction_set(&[("a", 0.2)]);

        let err = score_sets(&labels, &preds).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("2 of 3"));
        assert!(msg.contains("\"b\""));
    }

    #[test]
    fn empty_labels_error() {
        let err = score_sets(&LabelSet::default(), &prediction_set(&[])).unwrap_err();
        assert!(err.to_string().contains("no rows"));
    }

    #[test]
    fn score_predictions_from_files() {
        let dir = std::env::temp_dir().join(format!("cg-scoring-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        let labels = dir.join("hidden_labels.csv");
        let preds = dir.join("predictions.csv");
        std::fs::write(&labels, "row_id,readmit30\n1,0\n2,1\n3,0\n4,1\n").unwrap();
        std::fs::write(&preds, "row_id,prob\n4,0.9\n3,0.2\n2,0.7\n1,0.1\n").unwrap();

        let scores = score_predictions(&labels, &preds, &ScoringConfig::default()).unwrap();
        assert!((scores.auroc - 1.0).abs() < 1e-10);
        assert!((scores.auprc - 1.0).abs() < 1e-10);
        assert_eq!(scores.n, 4);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
