//! # Storecast
//!
//! A Rust library for per-store daily demand forecasting.
//!
//! ## Features
//!
//! - Raw sales cleaning and store metadata merge (CSV in, parquet out)
//! - Calendar, lag and rolling-mean features per store
//! - Histogram-based gradient-boosted regression trees
//! - Iterative multi-day forecasts that feed each prediction back into the
//!   lag and rolling features
//! - Data for a forecast dashboard: history, forecast series and export
//!
//! ## Pipeline
//!
//! | Stage | Reads | Writes |
//! |-------|-------|--------|
//! | [`pipeline::run_etl`] | `train.csv`, `store.csv` | `daily_sales.parquet` |
//! | [`pipeline::run_features`] | `daily_sales.parquet` | `features.parquet` |
//! | [`pipeline::run_training`] | `features.parquet` | model, manifest, codes, metrics |
//! | [`pipeline::run_prediction`] | `features.parquet`, model artifacts | `next_{N}day_preds.csv` |
//!
//! ## Quick Start
//!
//! ```no_run
//! use storecast::config::PipelineConfig;
//! use storecast::pipeline;
//!
//! let config = PipelineConfig::default();
//! pipeline::run_etl(&config)?;
//! pipeline::run_features(&config)?;
//! let outcome = pipeline::run_training(&config)?;
//! println!("validation {}", outcome.metrics);
//!
//! let forecast = pipeline::run_prediction(&config, 7, false)?;
//! println!("forecast written to {}", forecast.display());
//! # Ok::<(), storecast::ForecastError>(())
//! ```
//!
//! The forecaster itself works with any [`Regressor`]:
//!
//! ```
//! use storecast::forecaster::IterativeForecaster;
//! use storecast::manifest::FeatureManifest;
//! use storecast::models::Regressor;
//! use storecast::reconcile::ReconciledRow;
//! use storecast::{EntityId, Result};
//!
//! #[derive(Debug)]
//! struct Flat;
//!
//! impl Regressor for Flat {
//!     fn predict(&self, _features: &[f64]) -> Result<f64> {
//!         Ok(60.0)
//!     }
//! }
//!
//! let manifest = FeatureManifest::new(["sales_lag_1", "rolling_mean_7"])?;
//! let start = ReconciledRow { entity: EntityId::new("1"), values: vec![50.0, 48.0] };
//! let result = IterativeForecaster::new(&Flat, &manifest).forecast_entity(&start, 2)?;
//! assert_eq!(result.predictions(), &[60.0, 60.0]);
//! # Ok::<(), storecast::ForecastError>(())
//! ```

pub mod assembly;
pub mod config;
pub mod dashboard;
pub mod data;
pub mod encoding;
pub mod error;
pub mod etl;
pub mod features;
pub mod forecaster;
pub mod manifest;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod reconcile;
pub mod training;

// Re-export commonly used types
pub use crate::assembly::{ForecastResult, ForecastTable};
pub use crate::config::PipelineConfig;
pub use crate::data::EntityId;
pub use crate::error::{ForecastError, Result};
pub use crate::forecaster::IterativeForecaster;
pub use crate::manifest::FeatureManifest;
pub use crate::models::{GbmRegressor, Regressor};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
