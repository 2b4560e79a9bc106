//! Pipeline configuration
//!
//! Every stage derives its input and output paths from three directories.
//! A JSON file can override any field; absent fields keep their defaults.
//!
//! ```json
//! {
//!   "raw_dir": "data/raw",
//!   "model_dir": "artifacts",
//!   "training": { "validation_days": 60, "boosting": { "n_estimators": 100 } }
//! }
//! ```

use crate::error::{ForecastError, Result};
use crate::models::gbm::GbmParams;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default number of days ahead to forecast
pub const DEFAULT_HORIZON: usize = 7;

/// Directories and training parameters shared by all stages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Raw `train.csv` / `store.csv` location
    pub raw_dir: PathBuf,
    /// Cleaned and feature tables
    pub processed_dir: PathBuf,
    /// Model, manifest, metrics and forecast outputs
    pub model_dir: PathBuf,
    /// Training settings
    pub training: TrainingConfig,
}

/// Training settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Days before the last observed date that form the validation set
    pub validation_days: i64,
    /// Gradient boosting parameters
    pub boosting: GbmParams,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            raw_dir: PathBuf::from("data/raw"),
            processed_dir: PathBuf::from("data/processed"),
            model_dir: PathBuf::from("models"),
            training: TrainingConfig::default(),
        }
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            validation_days: 90,
            boosting: GbmParams::default(),
        }
    }
}

impl PipelineConfig {
    /// Load a configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ForecastError::MissingArtifact(path.to_path_buf()));
        }
        let config: Self = serde_json::from_str(&fs::read_to_string(path)?)?;
        config.validate()?;
        Ok(config)
    }

    /// Configuration rooted at `root` (`root/data/raw`, `root/models`, ...)
    pub fn rooted_at<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref();
        let defaults = Self::default();
        Self {
            raw_dir: root.join(defaults.raw_dir),
            processed_dir: root.join(defaults.processed_dir),
            model_dir: root.join(defaults.model_dir),
            training: defaults.training,
        }
    }

    /// Check parameter ranges
    pub fn validate(&self) -> Result<()> {
        if self.training.validation_days < 0 {
            return Err(ForecastError::InvalidParameter(
                "validation_days must not be negative".to_string(),
            ));
        }
        self.training.boosting.validate()
    }

    pub fn train_csv(&self) -> PathBuf {
        self.raw_dir.join("train.csv")
    }

    pub fn store_csv(&self) -> PathBuf {
        self.raw_dir.join("store.csv")
    }

    pub fn daily_sales_path(&self) -> PathBuf {
        self.processed_dir.join("daily_sales.parquet")
    }

    pub fn features_path(&self) -> PathBuf {
        self.processed_dir.join("features.parquet")
    }

    pub fn model_path(&self) -> PathBuf {
        self.model_dir.join("gbm_model.json")
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.model_dir.join("features_used.txt")
    }

    pub fn metrics_path(&self) -> PathBuf {
        self.model_dir.join("metrics.json")
    }

    pub fn category_codes_path(&self) -> PathBuf {
        self.model_dir.join("category_codes.json")
    }

    /// Forecast output for a horizon, `next_{N}day_preds.csv`
    pub fn forecast_path(&self, horizon: usize) -> PathBuf {
        self.model_dir
            .join(crate::assembly::ForecastTable::file_name(horizon))
    }
}
