use linfa::prelude::*;
use linfa::DatasetBase;
use linfa_clustering::KMeans;
use ndarray::{Array2, ArrayView2};
use tracing::{debug, info, warn};

use crate::errors::ExplainError;
use crate::numeric_table::NumericTable;
use crate::split::stratified_split;
use crate::table::ColumnSource;

/// Held-out share when carving the background out of the engineered table.
pub const BACKGROUND_TEST_FRACTION: f64 = 0.3;
pub const BACKGROUND_CLUSTERS: usize = 10;

/// Training rows of the engineered table, restricted to `features` in that order.
pub fn training_background(
    table: &NumericTable,
    target: &str,
    features: &[String],
    seed: u64,
) -> Result<Array2<f64>, ExplainError> {
    let labels: Vec<usize> = table
        .numeric_column(target)
        .ok_or_else(|| ExplainError::MissingTarget(target.to_string()))?
        .into_iter()
        .map(|value| usize::from(value != 0.0))
        .collect();

    let split = stratified_split(&labels, BACKGROUND_TEST_FRACTION, seed)?;
    let records = table.take_rows(&split.train).select(features)?;

    info!("Background holds {} of {} engineered rows", records.nrows(), table.len());
    Ok(records)
}

// Condense the background to at most `n_clusters` representative rows
// Inputs: background records, cluster count
// Outputs: k-means centroids, or the records themselves when there are few enough
// Key steps:
// 1. Short-circuit small backgrounds so every row stays a real observation
// 2. Run k-means (200 iterations, tolerance 1e-5) and keep the centroids
pub fn summarize_background(records: ArrayView2<f64>, n_clusters: usize) -> Result<Array2<f64>, ExplainError> {
    if records.nrows() == 0 || records.ncols() == 0 {
        return Err(ExplainError::EmptyBackground);
    }
    if n_clusters == 0 || records.nrows() <= n_clusters {
        warn!("Background has only {} rows, using them without clustering", records.nrows());
        return Ok(records.to_owned());
    }

    let dataset = DatasetBase::from(records.to_owned());
    let model = KMeans::params(n_clusters)
        .max_n_iterations(200)
        .tolerance(1e-5)
        .fit(&dataset)
        .map_err(|error| ExplainError::Summarise(error.to_string()))?;

    debug!("Summarised {} background rows into {} centroids", records.nrows(), n_clusters);
    Ok(model.centroids().to_owned())
}
