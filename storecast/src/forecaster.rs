//! Iterative multi-day forecasting
//!
//! The regressor only predicts one day ahead. To reach day `N` each
//! prediction is fed back into the features that depend on recent sales and
//! the model is asked again:
//!
//! ```text
//! for d in 1..=N:
//!     prediction[d] = regressor.predict(working_row)
//!     working_row   = advance(working_row, prediction[d])
//! ```
//!
//! `sales_lag_1` becomes the prediction and `rolling_mean_<k>` folds it into
//! its mean with [`recursive_window_update`]. Every other feature, calendar
//! fields included, stays at its starting value for all `N` steps.

use crate::assembly::ForecastResult;
use crate::error::{ForecastError, Result};
use crate::manifest::FeatureManifest;
use crate::models::Regressor;
use crate::reconcile::ReconciledRow;
use storecast_math::rolling::recursive_window_update;
use tracing::debug;

/// One-day lag of the target
pub const LAG_ONE_FEATURE: &str = "sales_lag_1";
/// Prefix of rolling mean features, followed by the window length
pub const ROLLING_MEAN_PREFIX: &str = "rolling_mean_";

/// How a feature moves from one forecast step to the next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecurrenceRule {
    /// Kept as is
    Static,
    /// Replaced by the latest prediction
    LastValue,
    /// Mean over `window` days, updated recursively
    RollingMean { window: usize },
}

impl RecurrenceRule {
    /// Rule for a feature, derived from its name
    pub fn for_feature(name: &str) -> Self {
        if name == LAG_ONE_FEATURE {
            return RecurrenceRule::LastValue;
        }
        match name
            .strip_prefix(ROLLING_MEAN_PREFIX)
            .and_then(|k| k.parse::<usize>().ok())
        {
            Some(window) if window >= 1 => RecurrenceRule::RollingMean { window },
            _ => RecurrenceRule::Static,
        }
    }

    /// Next value of a feature given its current value and the new prediction
    pub fn apply(&self, current: f64, prediction: f64) -> Result<f64> {
        match *self {
            RecurrenceRule::Static => Ok(current),
            RecurrenceRule::LastValue => Ok(prediction),
            RecurrenceRule::RollingMean { window } => {
                Ok(recursive_window_update(current, prediction, window)?)
            }
        }
    }
}

/// Positions of the recurrence-dependent features in a manifest
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecurrencePlan {
    rules: Vec<(usize, RecurrenceRule)>,
}

impl RecurrencePlan {
    pub fn from_manifest(manifest: &FeatureManifest) -> Self {
        let rules = manifest
            .names()
            .iter()
            .enumerate()
            .map(|(position, name)| (position, RecurrenceRule::for_feature(name)))
            .filter(|(_, rule)| *rule != RecurrenceRule::Static)
            .collect();
        Self { rules }
    }

    /// `(position, rule)` of every feature that changes between steps
    pub fn rules(&self) -> &[(usize, RecurrenceRule)] {
        &self.rules
    }

    /// Apply every rule to a working row
    pub fn advance(&self, mut row: Vec<f64>, prediction: f64) -> Result<Vec<f64>> {
        for &(position, rule) in &self.rules {
            let current = row.get(position).copied().ok_or_else(|| {
                ForecastError::ModelError(format!(
                    "working row has {} values, feature position {} is out of range",
                    row.len(),
                    position
                ))
            })?;
            row[position] = rule.apply(current, prediction)?;
        }
        Ok(row)
    }
}

/// Predict one day and derive the next working row
pub fn step<R: Regressor + ?Sized>(
    regressor: &R,
    plan: &RecurrencePlan,
    row: Vec<f64>,
) -> Result<(f64, Vec<f64>)> {
    let prediction = regressor.predict(&row)?;
    let next = plan.advance(row, prediction)?;
    Ok((prediction, next))
}

/// Produces `N` day-ahead predictions for every entity
#[derive(Debug)]
pub struct IterativeForecaster<'a, R: Regressor + ?Sized> {
    regressor: &'a R,
    plan: RecurrencePlan,
}

impl<'a, R: Regressor + ?Sized> IterativeForecaster<'a, R> {
    pub fn new(regressor: &'a R, manifest: &FeatureManifest) -> Self {
        Self {
            regressor,
            plan: RecurrencePlan::from_manifest(manifest),
        }
    }

    pub fn plan(&self) -> &RecurrencePlan {
        &self.plan
    }

    /// Forecast one entity from its most recent reconciled row
    pub fn forecast_entity(&self, start: &ReconciledRow, horizon: usize) -> Result<ForecastResult> {
        check_horizon(horizon)?;

        let mut predictions = Vec::with_capacity(horizon);
        let mut row = start.values.clone();
        for day in 1..=horizon {
            let (prediction, next) = step(self.regressor, &self.plan, row).map_err(|e| {
                ForecastError::ModelError(format!(
                    "prediction failed for store {} at day {}: {}",
                    start.entity, day, e
                ))
            })?;
            predictions.push(prediction);
            row = next;
        }

        debug!(entity = %start.entity, horizon, "forecast entity");
        ForecastResult::new(start.entity.clone(), predictions)
    }

    /// Forecast every entity in order. Any failure fails the whole batch.
    pub fn forecast_all(&self, rows: &[ReconciledRow], horizon: usize) -> Result<Vec<ForecastResult>> {
        check_horizon(horizon)?;
        rows.iter()
            .map(|row| self.forecast_entity(row, horizon))
            .collect()
    }
}

fn check_horizon(horizon: usize) -> Result<()> {
    if horizon == 0 {
        return Err(ForecastError::InvalidParameter(
            "forecast horizon must be at least one day".to_string(),
        ));
    }
    Ok(())
}
