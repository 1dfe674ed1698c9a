use std::collections::BTreeSet;

use ndarray::Array2;
use tracing::debug;

use crate::errors::PredictionError;
use crate::model::{Classifier, Preprocessor};
use crate::numeric_table::NumericTable;

/// One record as ordered `(column, value)` pairs, the way a front end builds it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureRow {
    entries: Vec<(String, f64)>,
}

impl FeatureRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: f64) -> Self {
        self.push(name, value);
        self
    }

    pub fn push(&mut self, name: &str, value: f64) {
        self.entries.push((name.to_string(), value));
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn to_table(&self) -> NumericTable {
        let mut table = NumericTable::new(self.names());
        table.push_row(self.entries.iter().map(|&(_, value)| value).collect());
        table
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub label: usize,
    /// Probability of class 1.
    pub probability: f64,
}

impl Prediction {
    pub fn is_positive(&self) -> bool {
        self.label == 1
    }
}

/// Loaded artifacts behind a front end.
///
/// Strict services refuse any row whose columns differ from the model's
/// feature set before the model is touched; non-strict services leave the
/// column check to the preprocessor or the column selection.
pub struct PredictionService<M: Classifier> {
    model: M,
    preprocessor: Option<Preprocessor>,
    strict: bool,
}

impl<M: Classifier> PredictionService<M> {
    pub fn new(model: M) -> Self {
        Self {
            model,
            preprocessor: None,
            strict: true,
        }
    }

    pub fn with_preprocessor(model: M, preprocessor: Preprocessor) -> Self {
        Self {
            model,
            preprocessor: Some(preprocessor),
            strict: false,
        }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn check_features(&self, row: &FeatureRow) -> Result<(), PredictionError> {
        let expected: BTreeSet<String> = self.model.feature_names().iter().cloned().collect();
        let given: BTreeSet<String> = row.names().into_iter().collect();

        let missing: Vec<String> = expected.difference(&given).cloned().collect();
        let extra: Vec<String> = given.difference(&expected).cloned().collect();
        if missing.is_empty() && extra.is_empty() {
            Ok(())
        } else {
            Err(PredictionError::FeatureMismatch { missing, extra })
        }
    }

    /// The row as a single-row matrix in the model's column order, preprocessed if configured.
    pub fn assemble(&self, row: &FeatureRow) -> Result<Array2<f64>, PredictionError> {
        if self.strict {
            self.check_features(row)?;
        }

        let table = row.to_table();
        let records = match &self.preprocessor {
            Some(preprocessor) => preprocessor.transform(&table)?,
            None => table.select(self.model.feature_names())?,
        };
        debug!("Assembled input row {:?}", records.row(0).to_vec());
        Ok(records)
    }

    pub fn predict(&self, row: &FeatureRow) -> Result<Prediction, PredictionError> {
        let records = self.assemble(row)?;
        let label = self.model.predict(records.view())?[0];
        let probability = self.model.predict_probability(records.view())?[0];
        Ok(Prediction { label, probability })
    }
}
