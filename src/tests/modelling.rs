use std::fs;

use anyhow::{anyhow, Result};
use ndarray::{array, Array2};
use tempfile::tempdir;

use crate::errors::{MetricsError, ModelError, SplitError, TrainingError};
use crate::forest::{ClassWeight, ForestParams, MaxFeatures, RandomForest};
use crate::metrics::{roc_auc, ClassificationReport};
use crate::model::{Classifier, Preprocessor, TrainedModel};
use crate::numeric_table::NumericTable;
use crate::split::stratified_split;
use crate::tracking::{InputExample, ModelVersion, RunMeta, RunStatus, RunTracker};
use crate::training::{train_model, TrainingConfig, REGISTERED_MODEL_NAME};

fn small_forest() -> ForestParams {
    ForestParams {
        n_estimators: 10,
        max_features: MaxFeatures::All,
        ..ForestParams::default()
    }
}

// One informative column (`signal`) and one that is pure noise; every fifth row is positive
fn create_training_table() -> NumericTable {
    let mut table = NumericTable::new(vec!["signal".to_string(), "noise".to_string(), "label".to_string()]);
    for row in 0..100 {
        let positive = row % 5 == 0;
        let signal = if positive { 50.0 + (row % 7) as f64 } else { (row % 11) as f64 };
        table.push_row(vec![signal, ((row * 37) % 13) as f64, if positive { 1.0 } else { 0.0 }]);
    }
    table
}

fn separable_records() -> (Array2<f64>, Vec<usize>) {
    let records = Array2::from_shape_fn((40, 1), |(row, _)| row as f64 / 4.0);
    let labels = (0..40).map(|row| usize::from(row >= 20)).collect();
    (records, labels)
}

fn names(values: &[&str]) -> Vec<String> {
    values.iter().map(|name| name.to_string()).collect()
}

#[test]
fn test_stratified_split_preserves_class_shares() -> Result<()> {
    let labels: Vec<usize> = (0..100).map(|row| usize::from(row % 5 == 0)).collect();

    let split = stratified_split(&labels, 0.2, 42)?;

    assert_eq!(split.test.len(), 20);
    assert_eq!(split.train.len(), 80);
    assert_eq!(split.test.iter().filter(|&&row| labels[row] == 1).count(), 4);
    assert_eq!(split.train.iter().filter(|&&row| labels[row] == 1).count(), 16);

    let mut all: Vec<usize> = split.train.iter().chain(&split.test).copied().collect();
    all.sort_unstable();
    assert_eq!(all, (0..100).collect::<Vec<_>>());

    Ok(())
}

#[test]
fn test_stratified_split_is_reproducible() -> Result<()> {
    let labels: Vec<usize> = (0..60).map(|row| usize::from(row % 3 == 0)).collect();

    assert_eq!(stratified_split(&labels, 0.2, 42)?, stratified_split(&labels, 0.2, 42)?);
    assert_ne!(stratified_split(&labels, 0.2, 42)?.test, stratified_split(&labels, 0.2, 7)?.test);

    Ok(())
}

#[test]
fn test_stratified_split_rejects_impossible_inputs() {
    assert!(matches!(stratified_split(&[0, 0, 0], 0.2, 42), Err(SplitError::TooFewClasses(1))));
    assert!(matches!(
        stratified_split(&[0, 0, 0, 1], 0.2, 42),
        Err(SplitError::ClassTooSmall { label: 1, count: 1 })
    ));
    assert!(matches!(stratified_split(&[0, 0, 1, 1], 1.0, 42), Err(SplitError::InvalidFraction(_))));
}

#[test]
fn test_balanced_class_weights_use_inverse_frequency() {
    let weights = ClassWeight::Balanced.class_weights(&[0, 0, 0, 1]);

    assert!((weights[&0] - 4.0 / 6.0).abs() < 1e-12);
    assert!((weights[&1] - 2.0).abs() < 1e-12);
    assert_eq!(ClassWeight::None.sample_weights(&[0, 1, 1]), vec![1.0, 1.0, 1.0]);
}

#[test]
fn test_roc_auc_known_example() -> Result<()> {
    assert!((roc_auc(&[0, 0, 1, 1], &[0.1, 0.4, 0.35, 0.8])? - 0.75).abs() < 1e-12);
    assert!((roc_auc(&[0, 1, 0, 1], &[0.5, 0.5, 0.5, 0.5])? - 0.5).abs() < 1e-12);
    assert!(matches!(roc_auc(&[1, 1], &[0.2, 0.9]), Err(MetricsError::SingleClass)));
    assert!(matches!(roc_auc(&[0, 1], &[0.2]), Err(MetricsError::LengthMismatch { .. })));

    Ok(())
}

#[test]
fn test_classification_report_per_class_metrics() -> Result<()> {
    let report = ClassificationReport::new(&[0, 0, 1, 1], &[0, 1, 1, 1]);

    let fraud = report.class(1).ok_or_else(|| anyhow!("class 1 missing"))?;
    assert!((fraud.precision - 2.0 / 3.0).abs() < 1e-12);
    assert_eq!(fraud.recall, 1.0);
    assert_eq!(fraud.support, 2);

    let legit = report.class(0).ok_or_else(|| anyhow!("class 0 missing"))?;
    assert_eq!(legit.precision, 1.0);
    assert_eq!(legit.recall, 0.5);
    assert_eq!(report.accuracy, 0.75);
    assert!(report.to_string().contains("weighted avg"));

    Ok(())
}

#[test]
fn test_forest_separates_a_threshold() -> Result<()> {
    let (records, labels) = separable_records();

    let forest = RandomForest::fit(&small_forest(), records.view(), &labels)?;

    assert_eq!(forest.n_trees(), 10);
    assert_eq!(forest.predict(array![[0.5], [9.5]].view())?.to_vec(), vec![0, 1]);
    let probabilities = forest.predict_probability(array![[0.5], [9.5]].view())?;
    assert!(probabilities.iter().all(|p| (0.0..=1.0).contains(p)));

    Ok(())
}

#[test]
fn test_forest_rejects_wrong_width_and_empty_input() -> Result<()> {
    let (records, labels) = separable_records();
    let forest = RandomForest::fit(&small_forest(), records.view(), &labels)?;

    let result = forest.predict(array![[1.0, 2.0]].view());
    assert!(matches!(result, Err(ModelError::ShapeMismatch { expected: 1, found: 2 })));

    let empty = Array2::<f64>::zeros((0, 1));
    assert!(matches!(
        RandomForest::fit(&small_forest(), empty.view(), &[]),
        Err(ModelError::EmptyTrainingSet)
    ));

    Ok(())
}

#[test]
fn test_trained_model_survives_save_and_load() -> Result<()> {
    let dir = tempdir()?;
    let (records, labels) = separable_records();
    let forest = RandomForest::fit(&small_forest(), records.view(), &labels)?;
    let model = TrainedModel::new(names(&["x"]), forest);

    let path = dir.path().join("models").join("model.json");
    model.save(&path)?;
    let loaded = TrainedModel::load(&path)?;

    assert_eq!(loaded.feature_names(), model.feature_names());
    assert_eq!(
        loaded.predict_probability(records.view())?,
        model.predict_probability(records.view())?
    );

    Ok(())
}

#[test]
fn test_preprocessor_standardises_and_checks_columns() -> Result<()> {
    let records = array![[1.0, 5.0], [3.0, 5.0]];
    let preprocessor = Preprocessor::fit(&names(&["a", "b"]), records.view());

    let transformed = preprocessor.transform_array(records.view())?;
    assert_eq!(transformed, array![[-1.0, 0.0], [1.0, 0.0]]);

    let mut table = NumericTable::new(names(&["a"]));
    table.push_row(vec![2.0]);
    assert!(matches!(preprocessor.transform(&table), Err(ModelError::MissingColumn(ref name)) if name == "b"));

    Ok(())
}

#[test]
fn test_run_tracker_writes_documented_layout() -> Result<()> {
    let dir = tempdir()?;
    let tracker = RunTracker::new(dir.path(), "fraud");
    let (records, labels) = separable_records();
    let model = TrainedModel::new(names(&["x"]), RandomForest::fit(&small_forest(), records.view(), &labels)?);
    let example = InputExample {
        columns: names(&["x"]),
        data: vec![vec![1.0]],
    };

    let mut run = tracker.start_run()?;
    run.log_param("n_estimators", 10)?;
    run.log_metric("roc_auc", 0.9)?;
    let model_path = run.log_model("random_forest_model", &model, &example, Some("rf"))?;
    let run_dir = dir.path().join("fraud").join(run.run_id());
    let meta = run.end(RunStatus::Finished)?;

    assert_eq!(meta.status, RunStatus::Finished);
    assert!(meta.end_time.is_some());
    assert!(model_path.ends_with("artifacts/random_forest_model/model.json"));
    assert!(run_dir.join("artifacts/random_forest_model/input_example.json").exists());

    let params: serde_json::Value = serde_json::from_str(&fs::read_to_string(run_dir.join("params.json"))?)?;
    assert_eq!(params["n_estimators"], "10");
    let meta_json = fs::read_to_string(run_dir.join("meta.json"))?;
    assert!(meta_json.contains("FINISHED"));

    let mut second = tracker.start_run()?;
    second.log_model("random_forest_model", &model, &example, Some("rf"))?;
    second.end(RunStatus::Finished)?;

    let second_version: ModelVersion =
        serde_json::from_str(&fs::read_to_string(dir.path().join("registry/rf/version-2.json"))?)?;
    assert_eq!(second_version.version, 2);
    assert!(dir.path().join("registry/rf/version-1.json").exists());

    Ok(())
}

#[test]
fn test_train_model_records_a_finished_run() -> Result<()> {
    let dir = tempdir()?;
    let tracker = RunTracker::new(dir.path(), "Default");
    let config = TrainingConfig {
        forest: small_forest(),
        ..TrainingConfig::default()
    };

    let outcome = train_model(&create_training_table(), &names(&["signal", "noise"]), "label", &config, &tracker)?;

    assert_eq!(outcome.metrics.report.weighted_avg.support, 20);
    assert!(outcome.metrics.roc_auc > 0.9);
    assert!(outcome.preprocessor.is_none());

    let run_dir = dir.path().join("Default").join(&outcome.run_id);
    let params: serde_json::Value = serde_json::from_str(&fs::read_to_string(run_dir.join("params.json"))?)?;
    assert_eq!(params["class_weight"], "balanced");
    assert_eq!(params["model_type"], "RandomForest");
    let metrics: serde_json::Value = serde_json::from_str(&fs::read_to_string(run_dir.join("metrics.json"))?)?;
    for key in ["roc_auc", "precision_fraud", "recall_fraud", "f1_fraud"] {
        assert!(metrics[key].is_number(), "metric {key} missing");
    }

    let example: InputExample = serde_json::from_str(&fs::read_to_string(
        run_dir.join("artifacts/random_forest_model/input_example.json"),
    )?)?;
    assert_eq!(example.data.len(), 5);
    let registry = dir.path().join("registry").join(REGISTERED_MODEL_NAME);
    assert_eq!(fs::read_dir(&registry)?.count(), 1);
    assert!(registry.join("version-1.json").exists());

    Ok(())
}

#[test]
fn test_train_model_marks_run_failed_when_logging_fails() -> Result<()> {
    let dir = tempdir()?;
    // a plain file where the model registry directory should go
    fs::write(dir.path().join("registry"), "not a directory")?;
    let tracker = RunTracker::new(dir.path(), "Default");
    let config = TrainingConfig {
        forest: small_forest(),
        ..TrainingConfig::default()
    };

    let result = train_model(&create_training_table(), &names(&["signal", "noise"]), "label", &config, &tracker);
    assert!(matches!(result, Err(TrainingError::Tracking(_))));

    let runs: Vec<_> = fs::read_dir(dir.path().join("Default"))?.collect::<Result<_, _>>()?;
    assert_eq!(runs.len(), 1);
    let meta: RunMeta = serde_json::from_str(&fs::read_to_string(runs[0].path().join("meta.json"))?)?;
    assert_eq!(meta.status, RunStatus::Failed);
    assert!(meta.end_time.is_some());

    Ok(())
}

#[test]
fn test_train_model_with_standardisation_logs_preprocessor() -> Result<()> {
    let dir = tempdir()?;
    let tracker = RunTracker::new(dir.path(), "heart");
    let config = TrainingConfig {
        forest: small_forest(),
        standardize: true,
        ..TrainingConfig::default()
    };

    let outcome = train_model(&create_training_table(), &names(&["signal", "noise"]), "label", &config, &tracker)?;

    let preprocessor = outcome.preprocessor.ok_or_else(|| anyhow!("preprocessor was not fitted"))?;
    assert_eq!(preprocessor.columns(), names(&["signal", "noise"]).as_slice());
    assert!(dir
        .path()
        .join("heart")
        .join(&outcome.run_id)
        .join("artifacts/random_forest_model/preprocessor.json")
        .exists());

    Ok(())
}

#[test]
fn test_train_model_fails_fast_on_bad_columns() -> Result<()> {
    let dir = tempdir()?;
    let store = dir.path().join("mlruns");
    let tracker = RunTracker::new(&store, "Default");
    let table = create_training_table();
    let config = TrainingConfig::default();

    assert!(matches!(
        train_model(&table, &names(&["signal"]), "TX_FRAUD", &config, &tracker),
        Err(TrainingError::MissingTarget(_))
    ));
    assert!(matches!(
        train_model(&table, &names(&["signal", "velocity"]), "label", &config, &tracker),
        Err(TrainingError::MissingFeature(ref name)) if name == "velocity"
    ));
    assert!(matches!(
        train_model(&table, &[], "label", &config, &tracker),
        Err(TrainingError::NoFeatures)
    ));
    assert!(matches!(
        train_model(&table, &names(&["label"]), "signal", &config, &tracker),
        Err(TrainingError::NonBinaryTarget { .. })
    ));
    assert!(!store.exists());

    Ok(())
}

#[test]
fn test_train_model_rejects_single_class_labels() -> Result<()> {
    let dir = tempdir()?;
    let tracker = RunTracker::new(dir.path(), "Default");
    let mut table = NumericTable::new(names(&["x", "y"]));
    for row in 0..10 {
        table.push_row(vec![row as f64, 0.0]);
    }

    let result = train_model(&table, &names(&["x"]), "y", &TrainingConfig::default(), &tracker);
    assert!(matches!(result, Err(TrainingError::Split(SplitError::TooFewClasses(1)))));

    Ok(())
}
