//! Binary classification metrics over probability scores.
//!
//! All functions take parallel slices of labels and probabilities and
//! assume the caller already checked that the lengths match.

use coursegrade_shared::{GradeError, Result};

/// Area under the ROC curve.
///
/// Computed as the Mann-Whitney U statistic with average ranks for tied
/// scores, so a scorer that ties every row gets exactly 0.5.
pub fn auroc(labels: &[bool], probs: &[f64]) -> Result<f64> {
    let n_pos = labels.iter().filter(|&&y| y).count();
    let n_neg = labels.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return Err(GradeError::scoring(
            "AUROC is undefined when the labels contain a single class",
        ));
    }

    let mut order: Vec<usize> = (0..probs.len()).collect();
    order.sort_by(|&a, &b| probs[a].total_cmp(&probs[b]));

    let mut pos_rank_sum = 0.0;
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && probs[order[end]] == probs[order[start]] {
            end += 1;
        }
        // Ranks are 1-based; tied block start..end shares the mean rank.
        let avg_rank = (start + 1 + end) as f64 / 2.0;
        let positives = order[start..end].iter().filter(|&&i| labels[i]).count();
        pos_rank_sum += avg_rank * positives as f64;
        start = end;
    }

    let n_pos = n_pos as f64;
    let n_neg = n_neg as f64;
    Ok((pos_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg))
}

/// Area under the precision-recall curve, as average precision.
///
/// `AP = sum over distinct thresholds of (R_k - R_{k-1}) * P_k`, walking
/// scores from highest to lowest with tied scores treated as one threshold.
pub fn average_precision(labels: &[bool], probs: &[f64]) -> Result<f64> {
    let n_pos = labels.iter().filter(|&&y| y).count();
    if n_pos == 0 {
        return Err(GradeError::scoring(
            "AUPRC is undefined when the labels contain no positives",
        ));
    }

    let mut order: Vec<usize> = (0..probs.len()).collect();
    order.sort_by(|&a, &b| probs[b].total_cmp(&probs[a]));

    let mut tp = 0usize;
    let mut fp = 0usize;
    let mut prev_recall = 0.0;
    let mut ap = 0.0;
    let mut start = 0;
    while start < order.len() {
        let mut end = start;
        while end < order.len() && probs[order[end]] == probs[order[start]] {
            if labels[order[end]] {
                tp += 1;
            } else {
                fp += 1;
            }
            end += 1;
        }
        let recall = tp as f64 / n_pos as f64;
        let precision = tp as f64 / (tp + fp) as f64;
        ap += (recall - prev_recall) * precision;
        prev_recall = recall;
        start = end;
    }

    Ok(ap)
}

/// Brier score: mean squared difference between probability and outcome.
pub fn brier(labels: &[bool], probs: &[f64]) -> Result<f64> {
    if labels.is_empty() {
        return Err(GradeError::scoring("Brier score needs at least one row"));
    }
    let sum: f64 = labels
        .iter()
        .zip(probs)
        .map(|(&y, &p)| {
            let target = if y { 1.0 } else { 0.0 };
            (p - target).powi(2)
        })
        .sum();
    Ok(sum / labels.len() as f64)
}
