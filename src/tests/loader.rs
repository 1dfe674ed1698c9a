use anyhow::Result;
use tempfile::tempdir;

use super::{write_file, BATCH_HEADER};
use crate::csv_reader::{load_all_data, parse_timestamp, write_engineered};
use crate::errors::{LoadError, TableError};
use crate::features::{engineer_features, FeatureConfig};
use crate::numeric_table::NumericTable;
use crate::table::ColumnSource;

#[test]
fn test_load_all_data_concatenates_batches_in_file_name_order() -> Result<()> {
    let dir = tempdir()?;
    write_file(dir.path(), "2018-04-02.csv", &[BATCH_HEADER, "3,2018-04-02 08:00:00,1,1,10.0,0"])?;
    write_file(
        dir.path(),
        "2018-04-01.csv",
        &[BATCH_HEADER, "1,2018-04-01 09:00:00,1,1,25.5,0", "2,2018-04-01 07:00:00,2,1,99.0,1"],
    )?;
    write_file(dir.path(), "notes.txt", &["not a batch"])?;

    let table = load_all_data(dir.path())?;

    assert_eq!(table.len(), 3);
    let ids: Vec<u64> = table.transactions().iter().map(|tx| tx.transaction_id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert!(table.transactions()[1].is_fraud());

    Ok(())
}

#[test]
fn test_load_all_data_keeps_duplicate_rows() -> Result<()> {
    let dir = tempdir()?;
    let row = "7,2018-04-01 09:00:00,1,1,25.5,0";
    write_file(dir.path(), "a.csv", &[BATCH_HEADER, row, row])?;
    write_file(dir.path(), "b.csv", &[BATCH_HEADER, row])?;

    assert_eq!(load_all_data(dir.path())?.len(), 3);

    Ok(())
}

#[test]
fn test_load_all_data_ignores_extra_columns() -> Result<()> {
    let dir = tempdir()?;
    write_file(
        dir.path(),
        "day.csv",
        &[
            "TRANSACTION_ID,TX_DATETIME,CUSTOMER_ID,TERMINAL_ID,TX_AMOUNT,TX_TIME_SECONDS,TX_FRAUD",
            "1,2018-04-01T09:00:00,4,5,12.0,32400,0",
        ],
    )?;

    let table = load_all_data(dir.path())?;
    assert_eq!(table.transactions()[0].terminal_id, 5);

    Ok(())
}

#[test]
fn test_load_all_data_fails_without_batch_files() -> Result<()> {
    let dir = tempdir()?;
    write_file(dir.path(), "readme.md", &["nothing here"])?;

    let result = load_all_data(dir.path());
    assert!(matches!(result, Err(LoadError::NoBatchFiles(_))));

    Ok(())
}

#[test]
fn test_load_all_data_fails_for_missing_directory() -> Result<()> {
    let dir = tempdir()?;

    let result = load_all_data(&dir.path().join("absent"));
    assert!(matches!(result, Err(LoadError::Directory { .. })));

    Ok(())
}

#[test]
fn test_missing_column_error_names_file_and_column() -> Result<()> {
    let dir = tempdir()?;
    write_file(
        dir.path(),
        "broken.csv",
        &["TRANSACTION_ID,TX_DATETIME,CUSTOMER_ID,TERMINAL_ID,TX_AMOUNT", "1,2018-04-01 09:00:00,1,1,5.0"],
    )?;

    match load_all_data(dir.path()) {
        Err(LoadError::MissingColumn { path, column }) => {
            assert_eq!(column, "TX_FRAUD");
            assert!(path.ends_with("broken.csv"));
        }
        other => panic!("expected a missing column error, got {other:?}"),
    }

    Ok(())
}

#[test]
fn test_malformed_row_is_a_parse_error() -> Result<()> {
    let dir = tempdir()?;
    write_file(dir.path(), "bad.csv", &[BATCH_HEADER, "1,2018-04-01 09:00:00,1,1,lots,0"])?;

    let result = load_all_data(dir.path());
    assert!(matches!(result, Err(LoadError::Parse { .. })));
    if let Err(error) = result {
        assert!(error.to_string().contains("bad.csv"));
    }

    Ok(())
}

#[test]
fn test_non_binary_label_is_rejected() -> Result<()> {
    let dir = tempdir()?;
    write_file(dir.path(), "labels.csv", &[BATCH_HEADER, "9,2018-04-01 09:00:00,1,1,5.0,2"])?;

    let result = load_all_data(dir.path());
    assert!(matches!(
        result,
        Err(LoadError::InvalidLabel {
            transaction_id: 9,
            value: 2,
            ..
        })
    ));

    Ok(())
}

#[test]
fn test_non_finite_amount_is_rejected() -> Result<()> {
    for amount in ["NaN", "inf", "-inf"] {
        let dir = tempdir()?;
        let row = format!("4,2018-04-01 09:00:00,1,1,{amount},0");
        write_file(dir.path(), "amounts.csv", &[BATCH_HEADER, "3,2018-04-01 08:00:00,1,1,12.5,0", &row])?;

        let result = load_all_data(dir.path());
        assert!(
            matches!(result, Err(LoadError::InvalidAmount { transaction_id: 4, .. })),
            "amount {amount} was accepted"
        );
    }

    Ok(())
}

#[test]
fn test_parse_timestamp_accepts_both_separators() {
    assert_eq!(
        parse_timestamp("2018-04-01 00:07:56"),
        parse_timestamp("2018-04-01T00:07:56")
    );
    assert!(parse_timestamp("2018-04-01T00:07:56.250").is_some());
    assert!(parse_timestamp("01/04/2018").is_none());
}

#[test]
fn test_engineered_table_reads_back_as_numeric_columns() -> Result<()> {
    let dir = tempdir()?;
    write_file(
        dir.path(),
        "day.csv",
        &[BATCH_HEADER, "1,2018-04-01 09:00:00,1,1,500.0,1", "2,2018-04-01 10:00:00,1,1,20.0,0"],
    )?;

    let mut table = load_all_data(dir.path())?;
    engineer_features(&mut table, &FeatureConfig::default())?;
    let output = dir.path().join("processed").join("engineered.csv");
    write_engineered(&table, &output)?;

    let numeric = NumericTable::read_csv(&output)?;
    assert_eq!(numeric.len(), 2);
    assert!(numeric.column_index("TX_DATETIME").is_none());
    assert_eq!(numeric.numeric_column("is_high_amount"), Some(vec![1.0, 0.0]));
    assert_eq!(numeric.numeric_column("terminal_fraud_count_28d"), Some(vec![1.0, 1.0]));
    assert_eq!(numeric.numeric_column("TX_HOUR"), Some(vec![9.0, 10.0]));

    Ok(())
}

#[test]
fn test_column_with_a_blank_cell_is_dropped_whole() -> Result<()> {
    let dir = tempdir()?;
    let path = write_file(dir.path(), "scores.csv", &["id,score,flag", "1,0.5,true", "2,,false", "3,0.9,true"])?;

    let numeric = NumericTable::read_csv(&path)?;

    assert_eq!(numeric.len(), 3);
    assert!(numeric.column_index("score").is_none());
    assert_eq!(numeric.numeric_column("flag"), Some(vec![1.0, 0.0, 1.0]));
    assert!(matches!(
        numeric.select(&["score".to_string()]),
        Err(TableError::MissingColumn(ref name)) if name == "score"
    ));

    Ok(())
}
