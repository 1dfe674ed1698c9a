use std::path::Path;

use ndarray::Array2;
use tracing::warn;

use crate::errors::TableError;
use crate::table::ColumnSource;

/// Row-major table of numeric columns, read from any CSV file.
///
/// Columns holding a value that is neither a number nor a boolean are dropped
/// on read, so a timestamp or free-text column never reaches a model.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericTable {
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
}

fn parse_cell(value: &str) -> Option<f64> {
    match value.trim() {
        "true" | "True" | "TRUE" => Some(1.0),
        "false" | "False" | "FALSE" => Some(0.0),
        other => other.parse().ok(),
    }
}

impl NumericTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<f64>) {
        assert_eq!(row.len(), self.columns.len(), "row width does not match column count");
        self.rows.push(row);
    }

    pub fn read_csv(path: &Path) -> Result<Self, TableError> {
        let read_error = |source| TableError::Read {
            path: path.to_path_buf(),
            source,
        };

        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(read_error)?;
        let headers: Vec<String> = rdr.headers().map_err(read_error)?.iter().map(String::from).collect();

        // first unparseable (data row, cell) per column
        let mut first_bad: Vec<Option<(usize, String)>> = vec![None; headers.len()];
        let mut raw: Vec<Vec<Option<f64>>> = Vec::new();
        for (row, record) in rdr.records().enumerate() {
            let record = record.map_err(read_error)?;
            let cells: Vec<Option<f64>> = record.iter().map(parse_cell).collect();
            for (column, cell) in cells.iter().enumerate() {
                if cell.is_none() && first_bad[column].is_none() {
                    first_bad[column] = Some((row + 1, record[column].to_string()));
                }
            }
            raw.push(cells);
        }

        let numeric: Vec<usize> = (0..headers.len()).filter(|&column| first_bad[column].is_none()).collect();
        for (name, bad) in headers.iter().zip(&first_bad) {
            if let Some((row, value)) = bad {
                warn!(
                    "Dropping column [{name}] from {}: data row {row} holds non-numeric value [{value}]",
                    path.display()
                );
            }
        }

        let mut table = NumericTable::new(numeric.iter().map(|&column| headers[column].clone()).collect());
        for row in raw {
            table.push_row(numeric.iter().map(|&column| row[column].unwrap_or_default()).collect());
        }

        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    /// Copies the named columns, in the given order, into a matrix.
    pub fn select(&self, names: &[String]) -> Result<Array2<f64>, TableError> {
        let indices = names
            .iter()
            .map(|name| self.column_index(name).ok_or_else(|| TableError::MissingColumn(name.clone())))
            .collect::<Result<Vec<usize>, TableError>>()?;

        Ok(Array2::from_shape_fn((self.rows.len(), indices.len()), |(row, column)| {
            self.rows[row][indices[column]]
        }))
    }

    pub fn take_rows(&self, indices: &[usize]) -> NumericTable {
        NumericTable {
            columns: self.columns.clone(),
            rows: indices.iter().map(|&index| self.rows[index].clone()).collect(),
        }
    }
}

impl ColumnSource for NumericTable {
    fn n_rows(&self) -> usize {
        self.len()
    }

    fn numeric_column(&self, name: &str) -> Option<Vec<f64>> {
        let index = self.column_index(name)?;
        Some(self.rows.iter().map(|row| row[index]).collect())
    }
}
