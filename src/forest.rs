//! Bagged decision-tree ensemble with explicit class weighting.

use std::collections::BTreeMap;

use linfa::prelude::*;
use linfa_trees::{DecisionTree, SplitQuality};
use ndarray::{Array1, ArrayView2, Axis};
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::ModelError;

pub const N_ESTIMATORS: usize = 100;
pub const MIN_WEIGHT_SPLIT: f32 = 2.0;

/// How much each training row counts towards a split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ClassWeight {
    /// `n / (k * n_c)`: every class carries the same total weight.
    Balanced,
    /// Every row weighs 1.
    None,
}

impl ClassWeight {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassWeight::Balanced => "balanced",
            ClassWeight::None => "none",
        }
    }

    pub fn class_weights(&self, labels: &[usize]) -> BTreeMap<usize, f64> {
        let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
        for &label in labels {
            *counts.entry(label).or_default() += 1;
        }

        let n_samples = labels.len() as f64;
        let n_classes = counts.len() as f64;

        counts
            .into_iter()
            .map(|(label, count)| {
                let weight = match self {
                    ClassWeight::Balanced => n_samples / (n_classes * count as f64),
                    ClassWeight::None => 1.0,
                };
                (label, weight)
            })
            .collect()
    }

    pub fn sample_weights(&self, labels: &[usize]) -> Vec<f32> {
        let weights = self.class_weights(labels);
        labels.iter().map(|label| weights[label] as f32).collect()
    }
}

/// Columns each tree is allowed to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaxFeatures {
    All,
    /// A random subset of `ceil(sqrt(n_features))` columns per tree.
    Sqrt,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_weight_split: f32,
    pub max_features: MaxFeatures,
    pub class_weight: ClassWeight,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: N_ESTIMATORS,
            max_depth: None,
            min_weight_split: MIN_WEIGHT_SPLIT,
            max_features: MaxFeatures::Sqrt,
            class_weight: ClassWeight::Balanced,
            seed: 42,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ForestMember {
    features: Vec<usize>,
    tree: DecisionTree<f64, usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RandomForest {
    params: ForestParams,
    n_features: usize,
    members: Vec<ForestMember>,
}

impl RandomForest {
    /// Fits `n_estimators` trees, each on a bootstrap sample of the rows.
    pub fn fit(params: &ForestParams, records: ArrayView2<f64>, labels: &[usize]) -> Result<Self, ModelError> {
        let (n_samples, n_features) = records.dim();
        if n_samples == 0 || n_features == 0 {
            return Err(ModelError::EmptyTrainingSet);
        }
        if params.n_estimators == 0 {
            return Err(ModelError::NoEstimators);
        }

        let weights = params.class_weight.sample_weights(labels);
        let subspace = match params.max_features {
            MaxFeatures::All => n_features,
            MaxFeatures::Sqrt => ((n_features as f64).sqrt().ceil() as usize).clamp(1, n_features),
        };

        let mut members = Vec::with_capacity(params.n_estimators);
        for index in 0..params.n_estimators {
            let mut rng = ChaCha8Rng::seed_from_u64(params.seed.wrapping_add(index as u64));

            let rows: Vec<usize> = (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect();
            let mut features = sample(&mut rng, n_features, subspace).into_vec();
            features.sort_unstable();

            let bootstrap = records.select(Axis(0), &rows).select(Axis(1), &features);
            let targets: Array1<usize> = rows.iter().map(|&row| labels[row]).collect();
            let row_weights: Array1<f32> = rows.iter().map(|&row| weights[row]).collect();
            let dataset = Dataset::new(bootstrap, targets).with_weights(row_weights);

            let tree = DecisionTree::<f64, usize>::params()
                .split_quality(SplitQuality::Gini)
                .max_depth(params.max_depth)
                .min_weight_split(params.min_weight_split)
                .fit(&dataset)
                .map_err(|error| ModelError::Fit {
                    index,
                    reason: error.to_string(),
                })?;

            debug!("Fitted tree {index} on features {features:?}");
            members.push(ForestMember { features, tree });
        }

        Ok(Self {
            params: params.clone(),
            n_features,
            members,
        })
    }

    pub fn n_trees(&self) -> usize {
        self.members.len()
    }

    /// Share of trees voting for class 1, per row.
    pub fn predict_probability(&self, records: ArrayView2<f64>) -> Result<Array1<f64>, ModelError> {
        if records.ncols() != self.n_features {
            return Err(ModelError::ShapeMismatch {
                expected: self.n_features,
                found: records.ncols(),
            });
        }

        let mut votes = Array1::<f64>::zeros(records.nrows());
        for member in &self.members {
            let view = records.select(Axis(1), &member.features);
            let predicted: Array1<usize> = member.tree.predict(&view);
            for (vote, &label) in votes.iter_mut().zip(predicted.iter()) {
                if label == 1 {
                    *vote += 1.0;
                }
            }
        }

        Ok(votes / self.members.len() as f64)
    }

    /// Majority vote; an exact tie goes to class 0.
    pub fn predict(&self, records: ArrayView2<f64>) -> Result<Array1<usize>, ModelError> {
        Ok(self
            .predict_probability(records)?
            .mapv(|probability| usize::from(probability > 0.5)))
    }
}
