//! Regression models mapping a feature vector to a demand estimate

use crate::error::{ForecastError, Result};
use std::fmt::Debug;

pub mod binning;
pub mod gbm;
pub mod tree;

pub use gbm::{GbmParams, GbmRegressor};

/// Trained regressor
///
/// The forecaster only needs one operation: score a feature vector whose
/// positions follow the feature manifest.
pub trait Regressor: Debug {
    /// Predict the target for one ordered feature vector
    fn predict(&self, features: &[f64]) -> Result<f64>;

    /// Predict every row of a batch
    fn predict_batch(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        rows.iter().map(|row| self.predict(row)).collect()
    }
}

/// Check that a feature vector has the width a model was trained on
pub(crate) fn check_width(expected: usize, features: &[f64]) -> Result<()> {
    if features.len() != expected {
        return Err(ForecastError::ModelError(format!(
            "Feature vector length ({}) doesn't match model features ({})",
            features.len(),
            expected
        )));
    }
    Ok(())
}
