use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("Invalid input for {0}: {1}")]
    InvalidInput(String, String),

    #[error("Column '{column}' not found in table '{table}'")]
    ColumnNotFound { table: String, column: String },

    #[error("Row {row} of table '{table}' has {actual} values but the table has {expected} columns")]
    RowWidthMismatch {
        table: String,
        row: usize,
        expected: usize,
        actual: usize,
    },
}
