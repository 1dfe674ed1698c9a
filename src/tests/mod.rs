use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};

use crate::csv_reader::{parse_timestamp, Transaction};

mod loader;
mod modelling;

const BATCH_HEADER: &str = "TRANSACTION_ID,TX_DATETIME,CUSTOMER_ID,TERMINAL_ID,TX_AMOUNT,TX_FRAUD";

fn create_transaction(id: u64, datetime: &str, customer_id: u64, terminal_id: u64, amount: f64, fraud: u8) -> Result<Transaction> {
    Ok(Transaction {
        transaction_id: id,
        tx_datetime: parse_timestamp(datetime).ok_or_else(|| anyhow!("bad fixture timestamp {datetime}"))?,
        customer_id,
        terminal_id,
        tx_amount: amount,
        tx_fraud: fraud,
    })
}

fn write_file(dir: &Path, name: &str, lines: &[&str]) -> Result<PathBuf> {
    let path = dir.join(name);
    fs::write(&path, lines.join("\n") + "\n")?;
    Ok(path)
}
