//! Metrics for evaluating forecast performance

use crate::data::write_atomically;
use crate::error::{ForecastError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::Path;
use storecast_math::metrics::{mean_absolute_percentage_error, root_mean_squared_error};

/// Accuracy of a trained model on its validation rows
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidationMetrics {
    #[serde(rename = "Validation_RMSE")]
    pub rmse: f64,
    /// Percent
    #[serde(rename = "Validation_MAPE")]
    pub mape: f64,
}

impl ValidationMetrics {
    /// Evaluate predictions against actual values
    pub fn evaluate(actual: &[f64], predicted: &[f64]) -> Result<Self> {
        if actual.is_empty() {
            return Err(ForecastError::DataError(
                "validation set is empty".to_string(),
            ));
        }
        if actual.len() != predicted.len() {
            return Err(ForecastError::ValidationError(format!(
                "{} actual values but {} predictions",
                actual.len(),
                predicted.len()
            )));
        }

        Ok(Self {
            rmse: root_mean_squared_error(actual, predicted)?,
            mape: mean_absolute_percentage_error(actual, predicted)?,
        })
    }

    /// Write as pretty JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        write_atomically(path.as_ref(), |file| {
            file.write_all(json.as_bytes())?;
            Ok(())
        })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ForecastError::MissingArtifact(path.to_path_buf()));
        }
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }
}

impl fmt::Display for ValidationMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RMSE: {:.4}, MAPE: {:.2}%", self.rmse, self.mape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tempfile::tempdir;

    #[test]
    fn test_evaluate() {
        let metrics = ValidationMetrics::evaluate(&[100.0, 200.0], &[110.0, 190.0]).unwrap();
        assert_relative_eq!(metrics.rmse, 10.0);
        // (10/100 + 10/200) / 2 * 100
        assert_relative_eq!(metrics.mape, 7.5, epsilon = 1e-6);
    }

    #[test]
    fn test_evaluate_errors() {
        assert!(matches!(
            ValidationMetrics::evaluate(&[], &[]),
            Err(ForecastError::DataError(_))
        ));
        assert!(matches!(
            ValidationMetrics::evaluate(&[1.0], &[1.0, 2.0]),
            Err(ForecastError::ValidationError(_))
        ));
    }

    #[test]
    fn test_json_keys() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        let metrics = ValidationMetrics {
            rmse: 1.5,
            mape: 12.0,
        };

        metrics.save(&path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"Validation_RMSE\": 1.5"));
        assert!(text.contains("\"Validation_MAPE\": 12.0"));
        assert_eq!(ValidationMetrics::load(&path).unwrap(), metrics);
        assert_eq!(metrics.to_string(), "RMSE: 1.5000, MAPE: 12.00%");
    }
}
