//! # Storecast workspace
//!
//! Umbrella crate re-exporting the workspace members:
//!
//! - [`storecast`]: the forecasting pipeline (ETL, features, boosting,
//!   iterative forecasts, dashboard data)
//! - [`storecast_math`]: lags, rolling means and error metrics
//!
//! ```
//! use storecast_workspace::storecast_math::rolling::recursive_window_update;
//!
//! let mean = recursive_window_update(100.0, 107.0, 7).unwrap();
//! assert_eq!(mean, 101.0);
//! ```

pub use storecast;
pub use storecast_math;
