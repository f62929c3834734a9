use thiserror::Error;

/// Result type alias for CSV codec operations
pub type Result<T> = std::result::Result<T, CsvError>;

/// Errors that can occur while tokenizing, binding or writing CSV documents
#[derive(Error, Debug)]
pub enum CsvError {
    /// A quoted field was opened but the input ended before it was closed
    #[error("Unterminated quoted field in record {record}")]
    UnterminatedQuotedField { record: usize },

    /// Field text does not match the grammar of its declared kind
    #[error("Cannot parse '{text}' as {kind}")]
    FormatError { kind: String, text: String },

    /// A declared kind has no codec registered for it
    #[error("Unsupported type: {0}")]
    UnsupportedType(String),

    /// A row is narrower than a position the header requires
    #[error("Field index out of bounds: {index} (len: {len})")]
    IndexError { index: usize, len: usize },

    /// Type mismatch between a declared kind and the value an instance supplied
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch {
        expected: String,
        got: &'static str,
    },

    /// The record type does not expose a declared field
    #[error("Field not found: {0}")]
    FieldNotFound(String),

    /// Two columns of one schema share a name or an alias
    #[error("Duplicate column: {0}")]
    DuplicateColumn(String),

    /// A single escaped value did not tokenize into exactly one field
    #[error("Expected {expected} field(s), got {got}")]
    FieldCount { expected: usize, got: usize },

    /// The writer was already closed
    #[error("Writer is closed")]
    WriterClosed,

    /// String encoding error
    #[error("String encoding error: {0}")]
    EncodingError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl CsvError {
    pub(crate) fn format(kind: impl Into<String>, text: &str) -> Self {
        CsvError::FormatError {
            kind: kind.into(),
            text: text.to_string(),
        }
    }
}
