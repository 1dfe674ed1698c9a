use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Data directory [{path}] could not be read: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error
    },
    #[error("No transaction batch files (*.csv) found in [{0}]")]
    NoBatchFiles(PathBuf),
    #[error("Batch file [{path}] is missing required column [{column}]")]
    MissingColumn {
        path: PathBuf,
        column: String
    },
    #[error("Batch file [{path}] could not be parsed: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: csv::Error
    },
    #[error("Batch file [{path}] has fraud label [{value}] for transaction [{transaction_id}], expected 0 or 1")]
    InvalidLabel {
        path: PathBuf,
        transaction_id: u64,
        value: u8
    },
    #[error("Batch file [{path}] has a non-finite amount for transaction [{transaction_id}]")]
    InvalidAmount {
        path: PathBuf,
        transaction_id: u64
    },
    #[error("Engineered table [{path}] could not be written: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: csv::Error
    }
}

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("Column [{0}] must be computed before this transform")]
    MissingColumn(String),
    #[error("Rolling window must be at least one day and representable as a duration, got [{0}] days")]
    InvalidWindow(i64)
}

#[derive(Debug, Error)]
pub enum TableError {
    #[error("Table [{path}] could not be read: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error
    },
    #[error("Table is missing numeric column [{0}]")]
    MissingColumn(String)
}

#[derive(Debug, Error)]
pub enum SplitError {
    #[error("Test fraction must lie strictly between 0 and 1, got [{0}]")]
    InvalidFraction(f64),
    #[error("Stratified split needs at least two classes, found [{0}]")]
    TooFewClasses(usize),
    #[error("Class [{label}] has only [{count}] member(s), stratified split needs at least 2")]
    ClassTooSmall {
        label: usize,
        count: usize
    }
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Artifact [{path}] could not be accessed: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error
    },
    #[error("Artifact [{path}] is not valid JSON: {source}")]
    Serde {
        path: PathBuf,
        #[source]
        source: serde_json::Error
    },
    #[error("Cannot fit a model on an empty training set")]
    EmptyTrainingSet,
    #[error("Forest needs at least one estimator")]
    NoEstimators,
    #[error("Decision tree [{index}] could not be fitted: {reason}")]
    Fit {
        index: usize,
        reason: String
    },
    #[error("Input has [{found}] feature columns, model expects [{expected}]")]
    ShapeMismatch {
        expected: usize,
        found: usize
    },
    #[error("Preprocessor input is missing column [{0}]")]
    MissingColumn(String)
}

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("ROC-AUC is undefined when only one class is present in the labels")]
    SingleClass,
    #[error("Labels [{labels}] and scores [{scores}] differ in length")]
    LengthMismatch {
        labels: usize,
        scores: usize
    }
}

#[derive(Debug, Error)]
pub enum TrackingError {
    #[error("Tracking store path [{path}] could not be written: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error
    },
    #[error("Tracking record [{path}] could not be serialized: {source}")]
    Serde {
        path: PathBuf,
        #[source]
        source: serde_json::Error
    },
    #[error(transparent)]
    Artifact(#[from] ModelError)
}

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("No feature columns were given")]
    NoFeatures,
    #[error("Target column [{0}] is absent from the table")]
    MissingTarget(String),
    #[error("Feature column [{0}] is absent from the table")]
    MissingFeature(String),
    #[error("Target column [{column}] must be binary 0/1, found [{value}] at row [{row}]")]
    NonBinaryTarget {
        column: String,
        row: usize,
        value: f64
    },
    #[error(transparent)]
    Split(#[from] SplitError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Metrics(#[from] MetricsError),
    #[error(transparent)]
    Tracking(#[from] TrackingError)
}

#[derive(Debug, Error)]
pub enum ExplainError {
    #[error("Background dataset is empty")]
    EmptyBackground,
    #[error("Background has [{background}] columns but the input row has [{row}]")]
    WidthMismatch {
        background: usize,
        row: usize
    },
    #[error("Background could not be summarised: {0}")]
    Summarise(String),
    #[error("Background table is missing target column [{0}]")]
    MissingTarget(String),
    #[error(transparent)]
    Split(#[from] SplitError),
    #[error(transparent)]
    Table(#[from] TableError),
    #[error(transparent)]
    Model(#[from] ModelError)
}

#[derive(Debug, Error)]
pub enum PredictionError {
    #[error("Feature mismatch! Missing: {missing:?}, Extra: {extra:?}")]
    FeatureMismatch {
        missing: Vec<String>,
        extra: Vec<String>
    },
    #[error(transparent)]
    Table(#[from] TableError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Explain(#[from] ExplainError)
}
