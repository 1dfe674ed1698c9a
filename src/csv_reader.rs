use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::{de, Deserialize, Deserializer};
use tracing::{debug, info};

use crate::errors::LoadError;
use crate::table::{TransactionTable, BASE_COLUMNS};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const ACCEPTED_TIMESTAMP_FORMATS: [&str; 4] = [
    TIMESTAMP_FORMAT,
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
];
const BATCH_EXTENSION: &str = "csv";

/// One payment event as stored in a daily batch file. Extra columns in the file are ignored.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Transaction {
    #[serde(rename = "TRANSACTION_ID")]
    pub transaction_id: u64,
    #[serde(rename = "TX_DATETIME", deserialize_with = "deserialize_timestamp")]
    pub tx_datetime: NaiveDateTime,
    #[serde(rename = "CUSTOMER_ID")]
    pub customer_id: u64,
    #[serde(rename = "TERMINAL_ID")]
    pub terminal_id: u64,
    #[serde(rename = "TX_AMOUNT")]
    pub tx_amount: f64,
    #[serde(rename = "TX_FRAUD")]
    pub tx_fraud: u8,
}

impl Transaction {
    pub fn is_fraud(&self) -> bool {
        self.tx_fraud == 1
    }
}

pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    ACCEPTED_TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    parse_timestamp(&value)
        .ok_or_else(|| de::Error::custom(format!("invalid TX_DATETIME [{value}]")))
}

/// Reads a single batch file, checking its header before deserializing any row.
pub fn read_transactions(path: &Path) -> Result<Vec<Transaction>, LoadError> {
    let parse_error = |source| LoadError::Parse {
        path: path.to_path_buf(),
        source,
    };

    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(parse_error)?;

    let headers = rdr.headers().map_err(parse_error)?.clone();
    if let Some(column) = BASE_COLUMNS.iter().find(|column| !headers.iter().any(|h| h == **column)) {
        return Err(LoadError::MissingColumn {
            path: path.to_path_buf(),
            column: column.to_string(),
        });
    }

    let transactions: Vec<Transaction> = rdr
        .deserialize()
        .collect::<Result<Vec<Transaction>, csv::Error>>()
        .map_err(parse_error)?;

    if let Some(tx) = transactions.iter().find(|tx| tx.tx_fraud > 1) {
        return Err(LoadError::InvalidLabel {
            path: path.to_path_buf(),
            transaction_id: tx.transaction_id,
            value: tx.tx_fraud,
        });
    }
    if let Some(tx) = transactions.iter().find(|tx| !tx.tx_amount.is_finite()) {
        return Err(LoadError::InvalidAmount {
            path: path.to_path_buf(),
            transaction_id: tx.transaction_id,
        });
    }

    Ok(transactions)
}

/// Lists the batch files of a directory in filename order.
pub fn batch_files(data_dir: &Path) -> Result<Vec<PathBuf>, LoadError> {
    let directory_error = |source| LoadError::Directory {
        path: data_dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in fs::read_dir(data_dir).map_err(directory_error)? {
        let path = entry.map_err(directory_error)?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == BATCH_EXTENSION) {
            files.push(path);
        }
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

// Loads every daily batch in a directory into one table
// Inputs: directory holding files named by date, e.g. 2018-04-01.csv
// Outputs: table with all rows, file order then in-file order, duplicates kept
pub fn load_all_data(data_dir: &Path) -> Result<TransactionTable, LoadError> {
    let files = batch_files(data_dir)?;
    if files.is_empty() {
        return Err(LoadError::NoBatchFiles(data_dir.to_path_buf()));
    }

    let mut all_data = Vec::new();
    for file in &files {
        let transactions = read_transactions(file)?;
        debug!("Loaded {} transactions from {}", transactions.len(), file.display());
        all_data.extend(transactions);
    }

    info!("Loaded {} transactions from {} batch files", all_data.len(), files.len());
    Ok(TransactionTable::new(all_data))
}

/// Writes base columns followed by every derived column, in append order.
pub fn write_engineered(table: &TransactionTable, path: &Path) -> Result<(), LoadError> {
    let write_error = |source| LoadError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|error| write_error(csv::Error::from(error)))?;
    }

    let mut wtr = csv::Writer::from_path(path).map_err(write_error)?;

    let header: Vec<&str> = BASE_COLUMNS
        .iter()
        .copied()
        .chain(table.derived_columns().iter().map(|column| column.name.as_str()))
        .collect();
    wtr.write_record(&header).map_err(write_error)?;

    for (row, tx) in table.transactions().iter().enumerate() {
        let mut record = vec![
            tx.transaction_id.to_string(),
            tx.tx_datetime.format(TIMESTAMP_FORMAT).to_string(),
            tx.customer_id.to_string(),
            tx.terminal_id.to_string(),
            tx.tx_amount.to_string(),
            tx.tx_fraud.to_string(),
        ];
        record.extend(table.derived_columns().iter().map(|column| column.values.render(row)));
        wtr.write_record(&record).map_err(write_error)?;
    }

    wtr.flush().map_err(|error| write_error(csv::Error::from(error)))?;
    info!("Wrote {} engineered rows to {}", table.len(), path.display());
    Ok(())
}
