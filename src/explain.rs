//! Per-feature attribution of a single prediction.
//!
//! [`SamplingExplainer`] estimates Shapley values by walking random feature
//! permutations from each background row towards the explained row, one
//! feature at a time, and crediting each feature with the change in the
//! model's fraud probability at the step where it switches over.
//! Every walk starts at `f(background row)` and ends at `f(row)`, so the
//! attributions always sum to `f(row) - base_value`.

use std::fmt::Write as _;

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::errors::ExplainError;
use crate::model::Classifier;

pub const N_PERMUTATIONS: usize = 32;

#[derive(Debug, Clone, PartialEq)]
pub struct Explanation {
    /// Mean fraud probability over the background.
    pub base_value: f64,
    /// Fraud probability of the explained row.
    pub output_value: f64,
    pub feature_names: Vec<String>,
    pub feature_values: Vec<f64>,
    pub attributions: Vec<f64>,
}

impl Explanation {
    /// `(name, value, attribution)` ordered by decreasing |attribution|.
    pub fn ranked(&self) -> Vec<(&str, f64, f64)> {
        let mut ranked: Vec<(&str, f64, f64)> = self
            .feature_names
            .iter()
            .zip(&self.feature_values)
            .zip(&self.attributions)
            .map(|((name, &value), &attribution)| (name.as_str(), value, attribution))
            .collect();
        ranked.sort_by(|a, b| b.2.abs().total_cmp(&a.2.abs()));
        ranked
    }
}

pub trait Explainer {
    fn explain(
        &self,
        model: &dyn Classifier,
        background: ArrayView2<f64>,
        row: ArrayView1<f64>,
    ) -> Result<Explanation, ExplainError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingExplainer {
    pub n_permutations: usize,
    pub seed: u64,
}

impl Default for SamplingExplainer {
    fn default() -> Self {
        Self {
            n_permutations: N_PERMUTATIONS,
            seed: 42,
        }
    }
}

impl Explainer for SamplingExplainer {
    fn explain(
        &self,
        model: &dyn Classifier,
        background: ArrayView2<f64>,
        row: ArrayView1<f64>,
    ) -> Result<Explanation, ExplainError> {
        let (n_background, n_features) = background.dim();
        if n_background == 0 {
            return Err(ExplainError::EmptyBackground);
        }
        if n_features != row.len() {
            return Err(ExplainError::WidthMismatch {
                background: n_features,
                row: row.len(),
            });
        }

        let output_value = model.predict_probability(row.insert_axis(Axis(0)))?[0];
        let base_value = model.predict_probability(background)?.mean().unwrap_or(0.0);

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut order: Vec<usize> = (0..n_features).collect();
        let mut totals = vec![0.0; n_features];
        let n_permutations = self.n_permutations.max(1);
        let steps = n_features + 1;

        for _ in 0..n_permutations {
            order.shuffle(&mut rng);

            // one block of `steps` rows per background row: the start point, then
            // one more feature switched to the explained row per step
            let mut paths = Array2::<f64>::zeros((n_background * steps, n_features));
            for (b, start) in background.outer_iter().enumerate() {
                let mut current = start.to_owned();
                paths.row_mut(b * steps).assign(&current);
                for (step, &feature) in order.iter().enumerate() {
                    current[feature] = row[feature];
                    paths.row_mut(b * steps + step + 1).assign(&current);
                }
            }

            let probabilities = model.predict_probability(paths.view())?;
            for b in 0..n_background {
                for (step, &feature) in order.iter().enumerate() {
                    let before = probabilities[b * steps + step];
                    let after = probabilities[b * steps + step + 1];
                    totals[feature] += after - before;
                }
            }
        }

        let walks = (n_permutations * n_background) as f64;
        Ok(Explanation {
            base_value,
            output_value,
            feature_names: model.feature_names().to_vec(),
            feature_values: row.to_vec(),
            attributions: totals.into_iter().map(|total| total / walks).collect(),
        })
    }
}

/// Text counterpart of a force plot: base value, output, and each feature's push.
pub fn render_force_summary(explanation: &Explanation) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Base value: {:.4} -> Fraud probability: {:.4}",
        explanation.base_value, explanation.output_value
    );
    for (name, value, attribution) in explanation.ranked() {
        let direction = if attribution >= 0.0 { "raises" } else { "lowers" };
        let _ = writeln!(out, "  {name:<28} = {value:>10.2}  {direction} by {:.4}", attribution.abs());
    }
    out
}

/// Text counterpart of a decision plot: cumulative output from the base value,
/// least influential feature first, ending at the model output.
pub fn render_decision_path(explanation: &Explanation) -> String {
    let mut ranked = explanation.ranked();
    ranked.reverse();

    let mut out = String::new();
    let mut running = explanation.base_value;
    let _ = writeln!(out, "  {:<28} {:>10} {:>10}", "feature", "shift", "cumulative");
    let _ = writeln!(out, "  {:<28} {:>10} {:>10.4}", "(base value)", "", running);
    for (name, _, attribution) in ranked {
        running += attribution;
        let _ = writeln!(out, "  {name:<28} {attribution:>+10.4} {running:>10.4}");
    }
    out
}
