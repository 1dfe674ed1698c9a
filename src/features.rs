//! Derived feature columns for the fraud model.
//!
//! Every transform appends one column to the table and looks only at rows
//! stamped at or before the row being computed, so no future transaction can
//! leak into a feature.

use chrono::{Datelike, Duration, Timelike};
use tracing::{debug, info};

use crate::errors::FeatureError;
use crate::rolling::RollingIndex;
use crate::table::{ColumnValues, TransactionTable};

pub const HIGH_AMOUNT_THRESHOLD: f64 = 220.0;
pub const TERMINAL_WINDOW_DAYS: i64 = 28;
pub const CUSTOMER_WINDOW_DAYS: i64 = 14;
pub const DEVIATION_EPSILON: f64 = 1e-6;

pub const IS_HIGH_AMOUNT: &str = "is_high_amount";
pub const TERMINAL_FRAUD_COUNT: &str = "terminal_fraud_count_28d";
pub const CUSTOMER_AVG_AMOUNT: &str = "customer_avg_amount_14d";
pub const AMOUNT_DEVIATION: &str = "amount_deviation";
pub const TX_HOUR: &str = "TX_HOUR";
pub const TX_WEEKDAY: &str = "TX_WEEKDAY";

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureConfig {
    pub high_amount_threshold: f64,
    pub terminal_window_days: i64,
    pub customer_window_days: i64,
    pub deviation_epsilon: f64,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            high_amount_threshold: HIGH_AMOUNT_THRESHOLD,
            terminal_window_days: TERMINAL_WINDOW_DAYS,
            customer_window_days: CUSTOMER_WINDOW_DAYS,
            deviation_epsilon: DEVIATION_EPSILON,
        }
    }
}

pub fn is_high_amount(amount: f64, threshold: f64) -> bool {
    amount > threshold
}

fn window_duration(days: i64) -> Result<Duration, FeatureError> {
    if days < 1 {
        return Err(FeatureError::InvalidWindow(days));
    }
    Duration::try_days(days).ok_or(FeatureError::InvalidWindow(days))
}

pub fn add_high_amount_flag(table: &mut TransactionTable, threshold: f64) {
    let flags: Vec<bool> = table
        .transactions()
        .iter()
        .map(|tx| is_high_amount(tx.tx_amount, threshold))
        .collect();

    debug!("{} of {} transactions exceed {threshold}", flags.iter().filter(|&&f| f).count(), flags.len());
    table.append_column(IS_HIGH_AMOUNT, ColumnValues::Flag(flags));
}

/// Fraud-labelled transactions seen at the same terminal in the trailing window.
pub fn add_terminal_fraud_count(table: &mut TransactionTable, window_days: i64) -> Result<(), FeatureError> {
    let window = window_duration(window_days)?;
    let transactions = table.transactions();

    let labels: Vec<f64> = transactions.iter().map(|tx| if tx.is_fraud() { 1.0 } else { 0.0 }).collect();
    let index = RollingIndex::build(transactions.iter().map(|tx| (tx.terminal_id, tx.tx_datetime)));
    let counts: Vec<u32> = transactions
        .iter()
        .map(|tx| index.sum(tx.terminal_id, tx.tx_datetime, window, &labels) as u32)
        .collect();

    table.append_column(TERMINAL_FRAUD_COUNT, ColumnValues::Count(counts));
    Ok(())
}

/// Mean amount spent by the same customer in the trailing window, 0 when the window is empty.
pub fn add_customer_avg_amount(table: &mut TransactionTable, window_days: i64) -> Result<(), FeatureError> {
    let window = window_duration(window_days)?;
    let transactions = table.transactions();

    let amounts: Vec<f64> = transactions.iter().map(|tx| tx.tx_amount).collect();
    let index = RollingIndex::build(transactions.iter().map(|tx| (tx.customer_id, tx.tx_datetime)));
    let averages: Vec<f64> = transactions
        .iter()
        .map(|tx| {
            index
                .mean(tx.customer_id, tx.tx_datetime, window, &amounts)
                .unwrap_or(0.0)
        })
        .collect();

    table.append_column(CUSTOMER_AVG_AMOUNT, ColumnValues::Float(averages));
    Ok(())
}

pub fn add_amount_deviation(table: &mut TransactionTable, epsilon: f64) -> Result<(), FeatureError> {
    let averages = table
        .derived(CUSTOMER_AVG_AMOUNT)
        .ok_or_else(|| FeatureError::MissingColumn(CUSTOMER_AVG_AMOUNT.to_string()))?
        .to_f64();

    let deviation: Vec<f64> = table
        .transactions()
        .iter()
        .zip(averages)
        .map(|(tx, average)| tx.tx_amount / (average + epsilon))
        .collect();

    table.append_column(AMOUNT_DEVIATION, ColumnValues::Float(deviation));
    Ok(())
}

/// Hour of day and weekday (Monday = 0) of each transaction.
pub fn add_time_features(table: &mut TransactionTable) {
    let (hours, weekdays): (Vec<u32>, Vec<u32>) = table
        .transactions()
        .iter()
        .map(|tx| (tx.tx_datetime.hour(), tx.tx_datetime.weekday().num_days_from_monday()))
        .unzip();

    table.append_column(TX_HOUR, ColumnValues::Count(hours));
    table.append_column(TX_WEEKDAY, ColumnValues::Count(weekdays));
}

// Runs the whole feature pipeline over a loaded table
// Inputs: table straight from the loader, feature configuration
// Outputs: same rows with every derived column appended
pub fn engineer_features(table: &mut TransactionTable, config: &FeatureConfig) -> Result<(), FeatureError> {
    add_high_amount_flag(table, config.high_amount_threshold);
    add_terminal_fraud_count(table, config.terminal_window_days)?;
    add_customer_avg_amount(table, config.customer_window_days)?;
    add_amount_deviation(table, config.deviation_epsilon)?;
    add_time_features(table);

    info!("Engineered {} feature columns over {} transactions", table.derived_columns().len(), table.len());
    Ok(())
}
