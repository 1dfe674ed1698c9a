use ndarray::{Array2, Axis};
use tracing::{info, warn};

use crate::errors::{TrackingError, TrainingError};
use crate::features::{AMOUNT_DEVIATION, CUSTOMER_AVG_AMOUNT, IS_HIGH_AMOUNT, TERMINAL_FRAUD_COUNT, TX_HOUR, TX_WEEKDAY};
use crate::forest::{ForestParams, RandomForest};
use crate::metrics::EvaluationMetrics;
use crate::model::{Classifier, Preprocessor, TrainedModel};
use crate::split::{stratified_split, RANDOM_STATE, TEST_FRACTION};
use crate::table::ColumnSource;
use crate::tracking::{ActiveRun, InputExample, RunStatus, RunTracker};

pub const TARGET_COLUMN: &str = "TX_FRAUD";
pub const FRAUD_FEATURES: [&str; 7] = [
    "TX_AMOUNT",
    IS_HIGH_AMOUNT,
    TERMINAL_FRAUD_COUNT,
    CUSTOMER_AVG_AMOUNT,
    AMOUNT_DEVIATION,
    TX_HOUR,
    TX_WEEKDAY,
];
pub const MODEL_ARTIFACT_PATH: &str = "random_forest_model";
pub const REGISTERED_MODEL_NAME: &str = "random_forest_model";
const INPUT_EXAMPLE_ROWS: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingConfig {
    pub test_fraction: f64,
    pub seed: u64,
    pub forest: ForestParams,
    /// Fit a standardising preprocessor on the training partition first.
    pub standardize: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            test_fraction: TEST_FRACTION,
            seed: RANDOM_STATE,
            forest: ForestParams::default(),
            standardize: false,
        }
    }
}

pub struct TrainingOutcome {
    pub model: TrainedModel,
    pub preprocessor: Option<Preprocessor>,
    pub metrics: EvaluationMetrics,
    pub run_id: String,
}

fn binary_labels(values: &[f64], column: &str) -> Result<Vec<usize>, TrainingError> {
    values
        .iter()
        .enumerate()
        .map(|(row, &value)| match value {
            v if v == 0.0 => Ok(0),
            v if v == 1.0 => Ok(1),
            _ => Err(TrainingError::NonBinaryTarget {
                column: column.to_string(),
                row,
                value,
            }),
        })
        .collect()
}

/// Pulls the named columns out of `source` into an `n_rows x n_features` matrix.
pub fn feature_matrix<S: ColumnSource + ?Sized>(source: &S, feature_cols: &[String]) -> Result<Array2<f64>, TrainingError> {
    let columns = feature_cols
        .iter()
        .map(|name| {
            source
                .numeric_column(name)
                .ok_or_else(|| TrainingError::MissingFeature(name.clone()))
        })
        .collect::<Result<Vec<Vec<f64>>, TrainingError>>()?;

    Ok(Array2::from_shape_fn((source.n_rows(), columns.len()), |(row, column)| {
        columns[column][row]
    }))
}

/// Logs params, metrics and artifacts of a fitted model into an open run.
fn record_run(
    run: &mut ActiveRun,
    config: &TrainingConfig,
    model: &TrainedModel,
    metrics: &EvaluationMetrics,
    input_example: &InputExample,
    preprocessor: Option<&Preprocessor>,
) -> Result<(), TrackingError> {
    run.log_param("model_type", model.model_type())?;
    run.log_param("n_estimators", config.forest.n_estimators)?;
    run.log_param("class_weight", config.forest.class_weight.as_str())?;
    run.log_param(
        "max_depth",
        config.forest.max_depth.map_or_else(|| "None".to_string(), |depth| depth.to_string()),
    )?;
    run.log_param("test_size", config.test_fraction)?;
    run.log_param("random_state", config.seed)?;

    let fraud = metrics.positive_class();
    run.log_metric("roc_auc", metrics.roc_auc)?;
    run.log_metric("precision_fraud", fraud.precision)?;
    run.log_metric("recall_fraud", fraud.recall)?;
    run.log_metric("f1_fraud", fraud.f1)?;

    run.log_model(MODEL_ARTIFACT_PATH, model, input_example, Some(REGISTERED_MODEL_NAME))?;
    if let Some(preprocessor) = preprocessor {
        run.log_preprocessor(MODEL_ARTIFACT_PATH, preprocessor)?;
    }
    Ok(())
}

// Trains, evaluates and records one classifier
// Inputs: engineered table, ordered feature names, binary target name, run tracker
// Outputs: fitted model, optional preprocessor, held-out metrics and the run id
// Key steps:
// 1. Validate columns and labels before anything touches the tracking store
// 2. Stratified split, optional standardisation, class-weighted forest
// 3. Evaluate on the held-out rows, log params/metrics/model (a failed log marks the run FAILED), print the report
pub fn train_model<S: ColumnSource + ?Sized>(
    source: &S,
    feature_cols: &[String],
    target_col: &str,
    config: &TrainingConfig,
    tracker: &RunTracker,
) -> Result<TrainingOutcome, TrainingError> {
    if feature_cols.is_empty() {
        return Err(TrainingError::NoFeatures);
    }

    let target = source
        .numeric_column(target_col)
        .ok_or_else(|| TrainingError::MissingTarget(target_col.to_string()))?;
    let labels = binary_labels(&target, target_col)?;
    let records = feature_matrix(source, feature_cols)?;

    let split = stratified_split(&labels, config.test_fraction, config.seed)?;
    info!("Split {} rows into {} train / {} test", labels.len(), split.train.len(), split.test.len());

    let x_train_raw = records.select(Axis(0), &split.train);
    let x_test_raw = records.select(Axis(0), &split.test);
    let y_train: Vec<usize> = split.train.iter().map(|&row| labels[row]).collect();
    let y_test: Vec<usize> = split.test.iter().map(|&row| labels[row]).collect();

    let preprocessor = config
        .standardize
        .then(|| Preprocessor::fit(feature_cols, x_train_raw.view()));
    let (x_train, x_test) = match &preprocessor {
        Some(preprocessor) => (
            preprocessor.transform_array(x_train_raw.view())?,
            preprocessor.transform_array(x_test_raw.view())?,
        ),
        None => (x_train_raw.clone(), x_test_raw),
    };

    info!("Fitting {} trees on {} features", config.forest.n_estimators, feature_cols.len());
    let forest = RandomForest::fit(&config.forest, x_train.view(), &y_train)?;
    info!("Fitted {} trees", forest.n_trees());
    let model = TrainedModel::new(feature_cols.to_vec(), forest);

    let y_pred = model.predict(x_test.view())?.to_vec();
    let y_proba = model.predict_probability(x_test.view())?.to_vec();
    let metrics = EvaluationMetrics::evaluate(&y_test, &y_pred, &y_proba)?;

    let input_example = InputExample {
        columns: feature_cols.to_vec(),
        data: x_train_raw
            .rows()
            .into_iter()
            .take(INPUT_EXAMPLE_ROWS)
            .map(|row| row.to_vec())
            .collect(),
    };

    let mut run = tracker.start_run()?;
    let run_id = run.run_id().to_string();
    match record_run(&mut run, config, &model, &metrics, &input_example, preprocessor.as_ref()) {
        Ok(()) => {
            run.end(RunStatus::Finished)?;
        }
        Err(error) => {
            if let Err(end_error) = run.end(RunStatus::Failed) {
                warn!("Run [{run_id}] could not be marked failed: {end_error}");
            }
            return Err(error.into());
        }
    }

    println!("{}", metrics.report);
    println!("ROC AUC: {}", metrics.roc_auc);

    Ok(TrainingOutcome {
        model,
        preprocessor,
        metrics,
        run_id,
    })
}
