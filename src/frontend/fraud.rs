use std::path::Path;

use clap::Args;
use ndarray::{Array2, ArrayView2};
use tracing::info;

use crate::background::{summarize_background, training_background, BACKGROUND_CLUSTERS};
use crate::errors::{ExplainError, PredictionError};
use crate::explain::{render_decision_path, render_force_summary, Explainer, Explanation};
use crate::features::{is_high_amount, AMOUNT_DEVIATION, CUSTOMER_AVG_AMOUNT, IS_HIGH_AMOUNT, TERMINAL_FRAUD_COUNT, TX_HOUR, TX_WEEKDAY};
use crate::frontend::service::{FeatureRow, Prediction, PredictionService};
use crate::model::Classifier;
use crate::numeric_table::NumericTable;
use crate::split::RANDOM_STATE;
use crate::training::TARGET_COLUMN;

/// Amount above which the simulated transaction counts as high.
pub const FRAUD_HIGH_AMOUNT_THRESHOLD: f64 = 5000.0;

fn unit_interval(value: &str) -> Result<f64, String> {
    let parsed: f64 = value.parse().map_err(|_| format!("[{value}] is not a number"))?;
    if (0.0..=1.0).contains(&parsed) {
        Ok(parsed)
    } else {
        Err(format!("[{value}] is not in 0.0..=1.0"))
    }
}

/// Controls of the simulated transaction.
#[derive(Debug, Clone, PartialEq, Args)]
pub struct FraudControls {
    /// Transaction amount
    #[arg(long, default_value_t = 500, value_parser = clap::value_parser!(u32).range(0..=10000))]
    pub amount: u32,
    /// Amount deviation from the customer's 14-day average
    #[arg(long, default_value_t = 0.2, value_parser = unit_interval)]
    pub amount_deviation: f64,
    /// Fraudulent transactions seen on the terminal over 28 days
    #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u32).range(0..=50))]
    pub terminal_fraud_count: u32,
    /// Customer's 14-day average amount
    #[arg(long, default_value_t = 300, value_parser = clap::value_parser!(u32).range(0..=10000))]
    pub customer_avg_amount: u32,
    /// Hour of the day
    #[arg(long, default_value_t = 14, value_parser = clap::value_parser!(u32).range(0..=23))]
    pub hour: u32,
    /// Day of the week, 0 = Monday
    #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u32).range(0..=6))]
    pub day: u32,
}

impl Default for FraudControls {
    fn default() -> Self {
        Self {
            amount: 500,
            amount_deviation: 0.2,
            terminal_fraud_count: 2,
            customer_avg_amount: 300,
            hour: 14,
            day: 2,
        }
    }
}

impl FraudControls {
    pub fn to_feature_row(&self, high_amount_threshold: f64) -> FeatureRow {
        let amount = f64::from(self.amount);
        let high = is_high_amount(amount, high_amount_threshold);

        FeatureRow::new()
            .with("TX_AMOUNT", amount)
            .with(IS_HIGH_AMOUNT, if high { 1.0 } else { 0.0 })
            .with(TERMINAL_FRAUD_COUNT, f64::from(self.terminal_fraud_count))
            .with(CUSTOMER_AVG_AMOUNT, f64::from(self.customer_avg_amount))
            .with(AMOUNT_DEVIATION, self.amount_deviation)
            .with(TX_HOUR, f64::from(self.hour))
            .with(TX_WEEKDAY, f64::from(self.day % 7))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FraudAppConfig {
    pub high_amount_threshold: f64,
    pub background_clusters: usize,
    pub seed: u64,
}

impl Default for FraudAppConfig {
    fn default() -> Self {
        Self {
            high_amount_threshold: FRAUD_HIGH_AMOUNT_THRESHOLD,
            background_clusters: BACKGROUND_CLUSTERS,
            seed: RANDOM_STATE,
        }
    }
}

/// Background for the explainer, in `features` order, summarised to centroids.
pub fn load_background(path: &Path, features: &[String], config: &FraudAppConfig) -> Result<Array2<f64>, ExplainError> {
    let table = NumericTable::read_csv(path)?;
    let records = training_background(&table, TARGET_COLUMN, features, config.seed)?;
    summarize_background(records.view(), config.background_clusters)
}

#[derive(Debug, Clone, PartialEq)]
pub struct FraudOutcome {
    pub prediction: Prediction,
    pub explanation: Option<Explanation>,
}

pub struct FraudApp<M: Classifier> {
    service: PredictionService<M>,
    config: FraudAppConfig,
}

impl<M: Classifier> FraudApp<M> {
    pub fn new(model: M, config: FraudAppConfig) -> Self {
        Self {
            service: PredictionService::new(model),
            config,
        }
    }

    pub fn service(&self) -> &PredictionService<M> {
        &self.service
    }

    pub fn config(&self) -> &FraudAppConfig {
        &self.config
    }

    // Score one simulated transaction
    // Inputs: control values, optional explainer with its background
    // Outputs: prediction, plus an attribution explanation when asked for
    // Key steps:
    // 1. Build the feature row and reject it on any column mismatch
    // 2. Predict on the row reordered to the model's columns
    // 3. Explain the same assembled row against the background
    pub fn run(
        &self,
        controls: &FraudControls,
        explain: Option<(&dyn Explainer, ArrayView2<f64>)>,
    ) -> Result<FraudOutcome, PredictionError> {
        let row = controls.to_feature_row(self.config.high_amount_threshold);
        let prediction = self.service.predict(&row)?;
        info!("Fraud probability {:.4}", prediction.probability);

        let explanation = match explain {
            Some((explainer, background)) => {
                let records = self.service.assemble(&row)?;
                Some(explainer.explain(self.service.model(), background, records.row(0))?)
            }
            None => None,
        };

        Ok(FraudOutcome {
            prediction,
            explanation,
        })
    }
}

pub fn render(outcome: &FraudOutcome) -> String {
    let mut out = format!("Fraud Probability: {:.2}%\n", outcome.prediction.probability * 100.0);
    out.push_str(if outcome.prediction.is_positive() {
        "Fraud Detected\n"
    } else {
        "Legitimate Transaction\n"
    });

    if let Some(explanation) = &outcome.explanation {
        out.push_str("\nForce summary\n");
        out.push_str(&render_force_summary(explanation));
        out.push_str("\nDecision path\n");
        out.push_str(&render_decision_path(explanation));
    }
    out
}
