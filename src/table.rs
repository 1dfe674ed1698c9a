use crate::csv_reader::Transaction;

/// Names of the columns every transaction batch carries, in output order.
pub const BASE_COLUMNS: [&str; 6] = [
    "TRANSACTION_ID",
    "TX_DATETIME",
    "CUSTOMER_ID",
    "TERMINAL_ID",
    "TX_AMOUNT",
    "TX_FRAUD",
];

/// Anything the training driver can pull named numeric columns out of.
pub trait ColumnSource {
    fn n_rows(&self) -> usize;
    fn numeric_column(&self, name: &str) -> Option<Vec<f64>>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValues {
    Flag(Vec<bool>),
    Count(Vec<u32>),
    Float(Vec<f64>),
}

impl ColumnValues {
    pub fn len(&self) -> usize {
        match self {
            ColumnValues::Flag(values) => values.len(),
            ColumnValues::Count(values) => values.len(),
            ColumnValues::Float(values) => values.len(),
        }
    }

    pub fn to_f64(&self) -> Vec<f64> {
        match self {
            ColumnValues::Flag(values) => values.iter().map(|&v| if v { 1.0 } else { 0.0 }).collect(),
            ColumnValues::Count(values) => values.iter().map(|&v| v as f64).collect(),
            ColumnValues::Float(values) => values.clone(),
        }
    }

    pub fn render(&self, row: usize) -> String {
        match self {
            ColumnValues::Flag(values) => values[row].to_string(),
            ColumnValues::Count(values) => values[row].to_string(),
            ColumnValues::Float(values) => values[row].to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DerivedColumn {
    pub name: String,
    pub values: ColumnValues,
}

/// Loaded transactions plus the feature columns appended to them.
///
/// Rows keep the order they were loaded in for the whole pipeline; transforms
/// only ever append (or replace) a derived column of the same length.
#[derive(Debug, Clone, Default)]
pub struct TransactionTable {
    transactions: Vec<Transaction>,
    derived: Vec<DerivedColumn>,
}

impl TransactionTable {
    pub fn new(transactions: Vec<Transaction>) -> Self {
        Self {
            transactions,
            derived: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn derived_columns(&self) -> &[DerivedColumn] {
        &self.derived
    }

    pub fn derived(&self, name: &str) -> Option<&ColumnValues> {
        self.derived
            .iter()
            .find(|column| column.name == name)
            .map(|column| &column.values)
    }

    /// Appends a derived column, replacing any earlier column with the same name in place.
    pub fn append_column(&mut self, name: &str, values: ColumnValues) {
        assert_eq!(values.len(), self.transactions.len(), "derived column [{name}] has the wrong length");

        match self.derived.iter_mut().find(|column| column.name == name) {
            Some(existing) => existing.values = values,
            None => self.derived.push(DerivedColumn {
                name: name.to_string(),
                values,
            }),
        }
    }
}

impl ColumnSource for TransactionTable {
    fn n_rows(&self) -> usize {
        self.len()
    }

    fn numeric_column(&self, name: &str) -> Option<Vec<f64>> {
        let rows = self.transactions.iter();
        match name {
            "TRANSACTION_ID" => Some(rows.map(|tx| tx.transaction_id as f64).collect()),
            "CUSTOMER_ID" => Some(rows.map(|tx| tx.customer_id as f64).collect()),
            "TERMINAL_ID" => Some(rows.map(|tx| tx.terminal_id as f64).collect()),
            "TX_AMOUNT" => Some(rows.map(|tx| tx.tx_amount).collect()),
            "TX_FRAUD" => Some(rows.map(|tx| tx.tx_fraud as f64).collect()),
            // timestamps are not a model input
            "TX_DATETIME" => None,
            _ => self.derived(name).map(ColumnValues::to_f64),
        }
    }
}
