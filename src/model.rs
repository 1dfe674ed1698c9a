use std::fs;
use std::path::Path;

use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::errors::ModelError;
use crate::forest::RandomForest;
use crate::numeric_table::NumericTable;

pub const MODEL_TYPE: &str = "RandomForest";

/// What a front end needs from a fitted model.
pub trait Classifier {
    /// Input columns, in the order `predict` expects them.
    fn feature_names(&self) -> &[String];
    fn predict(&self, records: ArrayView2<f64>) -> Result<Array1<usize>, ModelError>;
    /// Probability of class 1, per row.
    fn predict_probability(&self, records: ArrayView2<f64>) -> Result<Array1<f64>, ModelError>;
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ModelError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| ModelError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let json = serde_json::to_string(value).map_err(|source| ModelError::Serde {
        path: path.to_path_buf(),
        source,
    })?;

    fs::write(path, json).map_err(|source| ModelError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ModelError> {
    let json = fs::read_to_string(path).map_err(|source| ModelError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_str(&json).map_err(|source| ModelError::Serde {
        path: path.to_path_buf(),
        source,
    })
}

/// Fitted classifier together with the feature contract it was trained on.
#[derive(Debug, Serialize, Deserialize)]
pub struct TrainedModel {
    model_type: String,
    feature_names: Vec<String>,
    forest: RandomForest,
}

impl TrainedModel {
    pub fn new(feature_names: Vec<String>, forest: RandomForest) -> Self {
        Self {
            model_type: MODEL_TYPE.to_string(),
            feature_names,
            forest,
        }
    }

    pub fn model_type(&self) -> &str {
        &self.model_type
    }

    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        write_json(path, self)
    }

    pub fn load(path: &Path) -> Result<Self, ModelError> {
        read_json(path)
    }
}

impl Classifier for TrainedModel {
    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn predict(&self, records: ArrayView2<f64>) -> Result<Array1<usize>, ModelError> {
        self.forest.predict(records)
    }

    fn predict_probability(&self, records: ArrayView2<f64>) -> Result<Array1<f64>, ModelError> {
        self.forest.predict_probability(records)
    }
}

/// Per-column standardisation fitted on training data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preprocessor {
    columns: Vec<String>,
    means: Vec<f64>,
    scales: Vec<f64>,
}

impl Preprocessor {
    /// Constant columns get a scale of 1 so they pass through centred rather than blowing up.
    pub fn fit(columns: &[String], records: ArrayView2<f64>) -> Self {
        let means: Vec<f64> = records
            .mean_axis(Axis(0))
            .map(|means| means.to_vec())
            .unwrap_or_else(|| vec![0.0; columns.len()]);

        let scales = records
            .axis_iter(Axis(1))
            .zip(&means)
            .map(|(column, &mean)| {
                let variance = column.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / column.len().max(1) as f64;
                let scale = variance.sqrt();
                if scale > 0.0 { scale } else { 1.0 }
            })
            .collect();

        Self {
            columns: columns.to_vec(),
            means,
            scales,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn transform_array(&self, records: ArrayView2<f64>) -> Result<Array2<f64>, ModelError> {
        if records.ncols() != self.columns.len() {
            return Err(ModelError::ShapeMismatch {
                expected: self.columns.len(),
                found: records.ncols(),
            });
        }

        let mut transformed = records.to_owned();
        for (mut column, (mean, scale)) in transformed.axis_iter_mut(Axis(1)).zip(self.means.iter().zip(&self.scales)) {
            column.mapv_inplace(|x| (x - mean) / scale);
        }
        Ok(transformed)
    }

    /// Picks the fitted columns out of `table` by name and standardises them.
    pub fn transform(&self, table: &NumericTable) -> Result<Array2<f64>, ModelError> {
        if let Some(missing) = self.columns.iter().find(|column| table.column_index(column).is_none()) {
            return Err(ModelError::MissingColumn(missing.clone()));
        }

        let records = table
            .select(&self.columns)
            .map_err(|error| ModelError::MissingColumn(error.to_string()))?;
        self.transform_array(records.view())
    }

    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        write_json(path, self)
    }

    pub fn load(path: &Path) -> Result<Self, ModelError> {
        read_json(path)
    }
}
