use polars::error::PolarsError;
use thiserror::Error;

/// Everything that can stop a MAPS run.
///
/// None of these are retried: the computation is deterministic, so each one
/// points at a problem in the input tables or at an arithmetic bug upstream.
#[derive(Debug, Error)]
pub enum MapsError {
    #[error("no mutation rate for {context}>{alt_context} (row {row})")]
    InputJoin {
        context: String,
        alt_context: String,
        row: usize,
    },

    #[error("insufficient data for '{category}': {detail}")]
    InsufficientData { category: String, detail: String },

    #[error("invariant violated for '{category}': {detail}")]
    InvariantViolation { category: String, detail: String },

    #[error("numerically degenerate fit: {0}")]
    NumericalDegeneracy(String),

    #[error("column '{0}' missing from input table")]
    MissingColumn(String),

    #[error("invalid record at row {row}: {detail}")]
    InvalidRecord { row: usize, detail: String },

    #[error(transparent)]
    Polars(#[from] PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type MapsResult<T> = Result<T, MapsError>;

impl MapsError {
    pub fn insufficient(category: impl Into<String>, detail: impl Into<String>) -> Self {
        MapsError::InsufficientData {
            category: category.into(),
            detail: detail.into(),
        }
    }

    pub fn invariant(category: impl Into<String>, detail: impl Into<String>) -> Self {
        MapsError::InvariantViolation {
            category: category.into(),
            detail: detail.into(),
        }
    }
}
