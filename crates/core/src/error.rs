//! Error types for Sparva

use thiserror::Error;

/// Main error type for Sparva operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Raster size mismatch: expected ({er}, {ec}), got ({ar}, {ac})")]
    SizeMismatch { er: usize, ec: usize, ar: usize, ac: usize },

    #[error("Item '{item}': expected {expected} values, got {actual}")]
    RowCountMismatch {
        item: String,
        expected: usize,
        actual: usize,
    },

    #[error("Feature width mismatch: {left} columns vs {right} columns")]
    WidthMismatch { left: usize, right: usize },

    #[error("Raster item '{item}' has no sampling scheme assigned")]
    MissingSamplingScheme { item: String },

    #[error("Item '{item}', row {row}: category '{label}' was not seen during training")]
    UnresolvedCategory {
        item: String,
        row: usize,
        label: String,
    },

    #[error("Item '{item}', row {row}: no-data values inside the sampled rows")]
    NoDataInWindow { item: String, row: usize },

    #[error("Algorithm error: {0}")]
    Algorithm(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for Sparva operations
pub type Result<T> = std::result::Result<T, Error>;
