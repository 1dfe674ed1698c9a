// Entry point for the fraud / heart-disease risk pipeline. Wires the CLI to feature engineering, training and the two prediction front ends.
use std::io::stderr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, Layer};

use crate::csv_reader::{load_all_data, write_engineered};
use crate::explain::{Explainer, SamplingExplainer};
use crate::features::{engineer_features, FeatureConfig, CUSTOMER_WINDOW_DAYS, DEVIATION_EPSILON, HIGH_AMOUNT_THRESHOLD, TERMINAL_WINDOW_DAYS};
use crate::forest::{ClassWeight, ForestParams, MaxFeatures, MIN_WEIGHT_SPLIT, N_ESTIMATORS};
use crate::frontend::fraud::{self, FraudApp, FraudAppConfig, FraudControls, FRAUD_HIGH_AMOUNT_THRESHOLD};
use crate::frontend::heart::{self, HeartControls};
use crate::model::{Classifier, Preprocessor, TrainedModel};
use crate::numeric_table::NumericTable;
use crate::split::{RANDOM_STATE, TEST_FRACTION};
use crate::tracking::{RunTracker, DEFAULT_EXPERIMENT};
use crate::training::{train_model, TrainingConfig, FRAUD_FEATURES, TARGET_COLUMN};

mod background;
mod csv_reader;
mod errors;
mod explain;
mod features;
mod forest;
mod frontend;
mod metrics;
mod model;
mod numeric_table;
mod rolling;
mod split;
mod table;
mod tracking;
mod training;
//test module
#[cfg(test)]
mod tests;

const RAW_DATA_DIR: &str = "data/raw";
const ENGINEERED_PATH: &str = "data/processed/df_with_terminal_fraud.csv";
const TRACKING_DIR: &str = "mlruns";
const FRAUD_MODEL_PATH: &str = "models/fraud_model.json";
const HEART_MODEL_PATH: &str = "outputs/model_rf.json";
const HEART_PREPROCESSOR_PATH: &str = "outputs/preprocessor.json";

#[derive(Debug, Parser)]
#[command(name = "risk_predictor", version, about = "Fraud and heart-disease risk prediction pipeline")]
struct Cli {
    /// error, warn, info, debug or trace
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load transaction batches, derive the fraud features and write the engineered table
    Engineer(EngineerArgs),
    /// Train a random forest on a numeric CSV table and record the run
    Train(TrainArgs),
    /// Score one simulated transaction
    PredictFraud(PredictFraudArgs),
    /// Score one patient record
    PredictHeart(PredictHeartArgs),
}

#[derive(Debug, Args)]
struct EngineerArgs {
    #[arg(long, default_value = RAW_DATA_DIR)]
    data_dir: PathBuf,
    #[arg(long, default_value = ENGINEERED_PATH)]
    output: PathBuf,
    #[arg(long, default_value_t = HIGH_AMOUNT_THRESHOLD)]
    high_amount_threshold: f64,
    #[arg(long, default_value_t = TERMINAL_WINDOW_DAYS)]
    terminal_window_days: i64,
    #[arg(long, default_value_t = CUSTOMER_WINDOW_DAYS)]
    customer_window_days: i64,
}

#[derive(Debug, Args)]
struct TrainArgs {
    #[arg(long, default_value = ENGINEERED_PATH)]
    data: PathBuf,
    /// Comma-separated feature columns; the fraud feature set when omitted
    #[arg(long, value_delimiter = ',')]
    features: Vec<String>,
    #[arg(long, default_value = TARGET_COLUMN)]
    target: String,
    #[arg(long, default_value = TRACKING_DIR)]
    tracking_dir: PathBuf,
    #[arg(long, default_value = DEFAULT_EXPERIMENT)]
    experiment: String,
    #[arg(long, default_value = FRAUD_MODEL_PATH)]
    model_out: PathBuf,
    /// Standardise features before fitting and save the fitted preprocessor
    #[arg(long)]
    standardize: bool,
    #[arg(long, default_value = HEART_PREPROCESSOR_PATH)]
    preprocessor_out: PathBuf,
    #[arg(long, default_value_t = N_ESTIMATORS)]
    n_estimators: usize,
    #[arg(long)]
    max_depth: Option<usize>,
    /// Use every column in every tree instead of a random sqrt-sized subset
    #[arg(long)]
    all_features: bool,
    #[arg(long, value_enum, default_value_t = ClassWeight::Balanced)]
    class_weight: ClassWeight,
    #[arg(long, default_value_t = TEST_FRACTION)]
    test_size: f64,
    #[arg(long, default_value_t = RANDOM_STATE)]
    seed: u64,
}

#[derive(Debug, Args)]
struct PredictFraudArgs {
    #[arg(long, default_value = FRAUD_MODEL_PATH)]
    model: PathBuf,
    /// Attribute the prediction to its features against a training background
    #[arg(long)]
    explain: bool,
    #[arg(long, default_value = ENGINEERED_PATH)]
    engineered: PathBuf,
    #[arg(long, default_value_t = FRAUD_HIGH_AMOUNT_THRESHOLD)]
    high_amount_threshold: f64,
    #[command(flatten)]
    controls: FraudControls,
}

#[derive(Debug, Args)]
struct PredictHeartArgs {
    #[arg(long, default_value = HEART_MODEL_PATH)]
    model: PathBuf,
    #[arg(long, default_value = HEART_PREPROCESSOR_PATH)]
    preprocessor: PathBuf,
    #[command(flatten)]
    controls: HeartControls,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(parse_log_level(&cli.log_level));

    match cli.command {
        Command::Engineer(args) => engineer(args),
        Command::Train(args) => train(args),
        Command::PredictFraud(args) => predict_fraud(args),
        Command::PredictHeart(args) => predict_heart(args),
    }
}

fn parse_log_level(level: &str) -> LevelFilter {
    match level.to_lowercase().as_str() {
        "trace" => LevelFilter::TRACE,
        "debug" => LevelFilter::DEBUG,
        "info" => LevelFilter::INFO,
        "warn" => LevelFilter::WARN,
        "error" => LevelFilter::ERROR,
        _ => {
            eprintln!("Invalid log level '{}', defaulting to 'info'", level);
            LevelFilter::INFO
        }
    }
}

fn setup_logging(level: LevelFilter) {
    // stdout carries reports and predictions, so logs go to stderr
    let terminal_log = fmt::layer()
        .with_target(false)
        .with_writer(stderr)
        .with_filter(level);

    tracing_subscriber::registry()
        .with(terminal_log)
        .init();
}

fn engineer(args: EngineerArgs) -> Result<()> {
    let config = FeatureConfig {
        high_amount_threshold: args.high_amount_threshold,
        terminal_window_days: args.terminal_window_days,
        customer_window_days: args.customer_window_days,
        deviation_epsilon: DEVIATION_EPSILON,
    };

    let mut table = load_all_data(&args.data_dir)?;
    engineer_features(&mut table, &config)?;
    write_engineered(&table, &args.output)?;
    Ok(())
}

// Trains and persists a model
// Inputs: CLI training arguments
// Outputs: model (and preprocessor) files, a tracked run, the printed report
// Key steps:
// 1. Read the numeric table and resolve the feature list
// 2. Train and record the run
// 3. Save the artifacts where the front ends look for them
fn train(args: TrainArgs) -> Result<()> {
    let table = NumericTable::read_csv(&args.data)?;
    let features: Vec<String> = if args.features.is_empty() {
        FRAUD_FEATURES.iter().map(|name| name.to_string()).collect()
    } else {
        args.features
    };

    let config = TrainingConfig {
        test_fraction: args.test_size,
        seed: args.seed,
        forest: ForestParams {
            n_estimators: args.n_estimators,
            max_depth: args.max_depth,
            min_weight_split: MIN_WEIGHT_SPLIT,
            max_features: if args.all_features { MaxFeatures::All } else { MaxFeatures::Sqrt },
            class_weight: args.class_weight,
            seed: args.seed,
        },
        standardize: args.standardize,
    };
    let tracker = RunTracker::new(&args.tracking_dir, &args.experiment);

    let outcome = train_model(&table, &features, &args.target, &config, &tracker)?;
    let positive = outcome.metrics.positive_class();
    info!(
        "Run [{}] scored ROC AUC {:.4}, precision {:.4}, recall {:.4} on the positive class",
        outcome.run_id, outcome.metrics.roc_auc, positive.precision, positive.recall
    );

    outcome.model.save(&args.model_out)?;
    info!("Saved model from run [{}] to {}", outcome.run_id, args.model_out.display());

    if let Some(preprocessor) = &outcome.preprocessor {
        preprocessor.save(&args.preprocessor_out)?;
        info!("Saved preprocessor to {}", args.preprocessor_out.display());
    }
    Ok(())
}

fn predict_fraud(args: PredictFraudArgs) -> Result<()> {
    let model = TrainedModel::load(&args.model)
        .with_context(|| format!("Fraud model could not be loaded from {}", args.model.display()))?;
    let config = FraudAppConfig {
        high_amount_threshold: args.high_amount_threshold,
        ..FraudAppConfig::default()
    };
    let app = FraudApp::new(model, config);

    let outcome = if args.explain {
        let features = app.service().model().feature_names().to_vec();
        let background = fraud::load_background(&args.engineered, &features, app.config())?;
        let explainer: &dyn Explainer = &SamplingExplainer::default();
        app.run(&args.controls, Some((explainer, background.view())))?
    } else {
        app.run(&args.controls, None)?
    };

    print!("{}", fraud::render(&outcome));
    Ok(())
}

fn predict_heart(args: PredictHeartArgs) -> Result<()> {
    let model = TrainedModel::load(&args.model)
        .with_context(|| format!("Heart model could not be loaded from {}", args.model.display()))?;
    let preprocessor = Preprocessor::load(&args.preprocessor)
        .with_context(|| format!("Preprocessor could not be loaded from {}", args.preprocessor.display()))?;
    let service = heart::service(model, preprocessor);

    let prediction = heart::run(&service, &args.controls)?;
    println!("{}", heart::render(&prediction));
    Ok(())
}
