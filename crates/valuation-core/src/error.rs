use thiserror::Error;

#[derive(Error, Debug)]
pub enum ValuationError {
    #[error("API error: {0}")]
    Api(String),

    #[error("Symbol not found: {0}")]
    NotFound(String),

    #[error("Fetch failed for {symbol}: {reason}")]
    EntityFetchFailed { symbol: String, reason: String },

    #[error("Duplicate metric: {0}")]
    DuplicateMetric(String),

    #[error("Duplicate entity: {0}")]
    DuplicateEntity(String),

    #[error("Row width mismatch for {symbol}: expected {expected}, got {actual}")]
    RowWidth {
        symbol: String,
        expected: usize,
        actual: usize,
    },

    #[error("Export error: {0}")]
    Export(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Why a single cell ended up Missing.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FieldError {
    #[error("field missing")]
    Missing,

    #[error("field malformed: {0}")]
    Malformed(String),
}
