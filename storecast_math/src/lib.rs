//! # Storecast Math
//!
//! Numeric building blocks for the demand forecasting pipeline.
//! This crate provides per-series rolling-window calculations,
//! the recursive window update used during multi-step forecasting, and
//! the regression error metrics reported after training.

use thiserror::Error;

pub mod metrics;
pub mod rolling;

/// Errors that can occur in forecasting math
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MathError {
    #[error("Insufficient data for calculation: {0}")]
    InsufficientData(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Calculation error: {0}")]
    CalculationError(String),
}

/// Result type for forecasting math operations
pub type Result<T> = std::result::Result<T, MathError>;
