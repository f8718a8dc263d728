use crate::data_type::DataType;

pub type Result<T> = std::result::Result<T, Error>;

/// Every failure the pipeline can report.
///
/// Clause-level variants (`ColumnNotFound`, `TypeMismatch`, `InvalidOperand`) are
/// usually recovered by skipping the clause and recording a
/// [Diagnostic](crate::diagnostic::Diagnostic); the others abort a whole stage.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("malformed table {table}: {reason}")]
    Schema { table: String, reason: String },

    #[error("duplicate table: {0}")]
    DuplicateTable(String),

    #[error("unknown table: {0}")]
    TableNotFound(String),

    #[error("unknown column {table}[{column}]")]
    ColumnNotFound { table: String, column: String },

    #[error("type mismatch on column {column}: expected {expected}, got {found}")]
    TypeMismatch {
        column: String,
        expected: DataType,
        found: String,
    },

    #[error("invalid operand for {operator} on column {column}: {reason}")]
    InvalidOperand {
        column: String,
        operator: String,
        reason: String,
    },

    #[error("cannot join {left} with {right}: {reason}")]
    Join {
        left: String,
        right: String,
        reason: String,
    },

    #[error("cannot apply {reducer} to column {column} of type {data_type}")]
    AggregationType {
        column: String,
        reducer: String,
        data_type: DataType,
    },

    #[error("parse error: {0}")]
    Parse(String),
}
