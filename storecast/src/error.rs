//! Error types for the storecast crate

use polars::prelude::PolarsError;
use std::path::PathBuf;
use thiserror::Error;

/// Custom error types for the storecast crate
#[derive(Debug, Error)]
pub enum ForecastError {
    /// Error related to data validation or processing
    #[error("Data error: {0}")]
    DataError(String),

    /// A table or artifact does not have the expected shape
    #[error("Schema error: {0}")]
    SchemaError(String),

    /// A required input artifact is absent
    #[error("Missing artifact: {} not found", .0.display())]
    MissingArtifact(PathBuf),

    /// Error raised by a regressor while fitting or predicting
    #[error("Model error: {0}")]
    ModelError(String),

    /// Error related to parameter validation
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Error from invalid parameters
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Error from IO operations
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error from Polars operations
    #[error("Polars error: {0}")]
    PolarsError(String),

    /// Error from JSON (de)serialization of artifacts
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Error from reading or writing CSV output
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    /// Error from the numeric helpers
    #[error("Math error: {0}")]
    MathError(#[from] storecast_math::MathError),
}

/// Result type with our custom error
pub type Result<T> = std::result::Result<T, ForecastError>;

impl From<PolarsError> for ForecastError {
    fn from(err: PolarsError) -> Self {
        ForecastError::PolarsError(err.to_string())
    }
}
