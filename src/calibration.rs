use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub samples: usize,
    pub positives: usize,
    pub brier: f64,
    pub log_loss: f64,
    /// `None` when only one class is present.
    pub roc_auc: Option<f64>,
}

#[derive(Debug, Clone, Copy)]
pub struct CalibrationBin {
    pub bucket_start: f64,
    pub bucket_end: f64,
    pub count: usize,
    pub avg_pred: f64,
    pub actual_rate: f64,
}

pub fn evaluate_binary(predictions: &[f64], outcomes: &[bool]) -> Metrics {
    if predictions.is_empty() || predictions.len() != outcomes.len() {
        return Metrics {
            samples: 0,
            positives: 0,
            brier: 0.0,
            log_loss: 0.0,
            roc_auc: None,
        };
    }

    Metrics {
        samples: predictions.len(),
        positives: outcomes.iter().filter(|y| **y).count(),
        brier: brier_score(predictions, outcomes),
        log_loss: log_loss(predictions, outcomes),
        roc_auc: roc_auc(predictions, outcomes),
    }
}

pub fn brier_score(predictions: &[f64], outcomes: &[bool]) -> f64 {
    if predictions.is_empty() {
        return 0.0;
    }
    let sum: f64 = predictions
        .iter()
        .zip(outcomes)
        .map(|(p, y)| (p - if *y { 1.0 } else { 0.0 }).powi(2))
        .sum();
    sum / predictions.len() as f64
}

pub fn log_loss(predictions: &[f64], outcomes: &[bool]) -> f64 {
    if predictions.is_empty() {
        return 0.0;
    }
    let sum: f64 = predictions
        .iter()
        .zip(outcomes)
        .map(|(p, y)| {
            let p = p.clamp(1e-12, 1.0 - 1e-12);
            if *y { -p.ln() } else { -(1.0 - p).ln() }
        })
        .sum();
    sum / predictions.len() as f64
}

/// Rank-based AUC (Mann-Whitney U) with tied scores sharing their average rank.
pub fn roc_auc(predictions: &[f64], outcomes: &[bool]) -> Option<f64> {
    let positives = outcomes.iter().filter(|y| **y).count();
    let negatives = outcomes.len() - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..predictions.len()).collect();
    order.sort_by(|&a, &b| predictions[a].total_cmp(&predictions[b]));

    let mut rank_sum_pos = 0.0_f64;
    let mut i = 0usize;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && predictions[order[j + 1]] == predictions[order[i]] {
            j += 1;
        }
        // ranks are 1-based; the tie block i..=j shares its mean rank
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            if outcomes[idx] {
                rank_sum_pos += avg_rank;
            }
        }
        i = j + 1;
    }

    let p = positives as f64;
    let n = negatives as f64;
    Some((rank_sum_pos - p * (p + 1.0) / 2.0) / (p * n))
}

/// Reliability table over equal-width probability buckets. Empty buckets are
/// kept so the table always has `bins` rows.
pub fn calibration_bins(predictions: &[f64], outcomes: &[bool], bins: usize) -> Vec<CalibrationBin> {
    let width = 1.0 / bins.max(2) as f64;
    let mut table: Vec<CalibrationBin> = (0..bins.max(2))
        .map(|b| CalibrationBin {
            bucket_start: b as f64 * width,
            bucket_end: (b + 1) as f64 * width,
            count: 0,
            avg_pred: 0.0,
            actual_rate: 0.0,
        })
        .collect();
    let last = table.len() - 1;

    for (p, hit) in predictions.iter().zip(outcomes) {
        let p = p.clamp(0.0, 1.0);
        let bin = &mut table[((p / width) as usize).min(last)];
        bin.count += 1;
        bin.avg_pred += p;
        bin.actual_rate += f64::from(u8::from(*hit));
    }
    for bin in table.iter_mut().filter(|b| b.count > 0) {
        bin.avg_pred /= bin.count as f64;
        bin.actual_rate /= bin.count as f64;
    }
    table
}
