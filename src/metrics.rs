//! Held-out evaluation for binary classifiers.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::errors::MetricsError;

pub const POSITIVE_CLASS: usize = 1;

/// Area under the ROC curve via the rank-sum statistic; tied scores share their average rank.
pub fn roc_auc(labels: &[usize], scores: &[f64]) -> Result<f64, MetricsError> {
    if labels.len() != scores.len() {
        return Err(MetricsError::LengthMismatch {
            labels: labels.len(),
            scores: scores.len(),
        });
    }

    let n_pos = labels.iter().filter(|&&label| label == POSITIVE_CLASS).count();
    let n_neg = labels.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return Err(MetricsError::SingleClass);
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut positive_rank_sum = 0.0;
    let mut start = 0;
    while start < order.len() {
        let mut end = start;
        while end + 1 < order.len() && scores[order[end + 1]] == scores[order[start]] {
            end += 1;
        }

        // ranks are 1-based; the tie group start..=end shares the mean rank
        let average_rank = (start + end) as f64 / 2.0 + 1.0;
        let positives = order[start..=end]
            .iter()
            .filter(|&&row| labels[row] == POSITIVE_CLASS)
            .count();
        positive_rank_sum += average_rank * positives as f64;

        start = end + 1;
    }

    let n_pos = n_pos as f64;
    let n_neg = n_neg as f64;
    Ok((positive_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

fn support_weighted(classes: &BTreeMap<usize, ClassMetrics>, value: impl Fn(&ClassMetrics) -> f64) -> f64 {
    let total_support: usize = classes.values().map(|m| m.support).sum();
    if total_support == 0 {
        return 0.0;
    }
    classes.values().map(|m| value(m) * m.support as f64).sum::<f64>() / total_support as f64
}

/// Per-class precision, recall, F1 and support, plus the usual averages.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationReport {
    pub classes: BTreeMap<usize, ClassMetrics>,
    pub accuracy: f64,
    pub macro_avg: ClassMetrics,
    pub weighted_avg: ClassMetrics,
}

impl ClassificationReport {
    pub fn new(y_true: &[usize], y_pred: &[usize]) -> Self {
        let labels: BTreeSet<usize> = y_true.iter().chain(y_pred).copied().collect();
        let pairs: Vec<(usize, usize)> = y_true.iter().copied().zip(y_pred.iter().copied()).collect();

        let classes: BTreeMap<usize, ClassMetrics> = labels
            .into_iter()
            .map(|label| {
                let true_positive = pairs.iter().filter(|&&(t, p)| t == label && p == label).count();
                let predicted = pairs.iter().filter(|&&(_, p)| p == label).count();
                let support = pairs.iter().filter(|&&(t, _)| t == label).count();

                let precision = ratio(true_positive, predicted);
                let recall = ratio(true_positive, support);
                let f1 = if precision + recall > 0.0 {
                    2.0 * precision * recall / (precision + recall)
                } else {
                    0.0
                };

                (label, ClassMetrics { precision, recall, f1, support })
            })
            .collect();

        let correct = pairs.iter().filter(|&&(t, p)| t == p).count();
        let total_support: usize = classes.values().map(|metrics| metrics.support).sum();
        let n_classes = classes.len().max(1) as f64;

        let macro_avg = ClassMetrics {
            precision: classes.values().map(|m| m.precision).sum::<f64>() / n_classes,
            recall: classes.values().map(|m| m.recall).sum::<f64>() / n_classes,
            f1: classes.values().map(|m| m.f1).sum::<f64>() / n_classes,
            support: total_support,
        };

        let weighted_avg = ClassMetrics {
            precision: support_weighted(&classes, |m| m.precision),
            recall: support_weighted(&classes, |m| m.recall),
            f1: support_weighted(&classes, |m| m.f1),
            support: total_support,
        };

        Self {
            accuracy: ratio(correct, pairs.len()),
            classes,
            macro_avg,
            weighted_avg,
        }
    }

    pub fn class(&self, label: usize) -> Option<&ClassMetrics> {
        self.classes.get(&label)
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:>14} {:>10} {:>10} {:>10} {:>10}", "", "precision", "recall", "f1-score", "support")?;
        writeln!(f)?;
        for (label, m) in &self.classes {
            writeln!(f, "{:>14} {:>10.2} {:>10.2} {:>10.2} {:>10}", label, m.precision, m.recall, m.f1, m.support)?;
        }
        writeln!(f)?;
        writeln!(f, "{:>14} {:>10} {:>10} {:>10.2} {:>10}", "accuracy", "", "", self.accuracy, self.macro_avg.support)?;
        for (name, m) in [("macro avg", &self.macro_avg), ("weighted avg", &self.weighted_avg)] {
            writeln!(f, "{:>14} {:>10.2} {:>10.2} {:>10.2} {:>10}", name, m.precision, m.recall, m.f1, m.support)?;
        }
        Ok(())
    }
}

/// Everything the training driver measures on the held-out partition.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationMetrics {
    pub roc_auc: f64,
    pub report: ClassificationReport,
}

impl EvaluationMetrics {
    pub fn evaluate(y_true: &[usize], y_pred: &[usize], y_score: &[f64]) -> Result<Self, MetricsError> {
        Ok(Self {
            roc_auc: roc_auc(y_true, y_score)?,
            report: ClassificationReport::new(y_true, y_pred),
        })
    }

    /// Metrics of the positive (fraud) class; zeros when it never occurs.
    pub fn positive_class(&self) -> ClassMetrics {
        self.report.class(POSITIVE_CLASS).copied().unwrap_or(ClassMetrics {
            precision: 0.0,
            recall: 0.0,
            f1: 0.0,
            support: 0,
        })
    }
}
