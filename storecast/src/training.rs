//! Model training on the feature table
//!
//! The last `validation_days` days before the most recent date are held out
//! for validation; everything earlier trains the booster.

use crate::config::TrainingConfig;
use crate::data::{
    date_values, numeric_values, require_column, sort_by_date, DATE_COLUMN, SALES_COLUMN,
    STORE_COLUMN,
};
use crate::encoding::CategoryEncoding;
use crate::error::{ForecastError, Result};
use crate::manifest::FeatureManifest;
use crate::metrics::ValidationMetrics;
use crate::models::{GbmRegressor, Regressor};
use chrono::Duration;
use polars::prelude::DataFrame;
use tracing::{info, warn};

/// Everything a training run produces
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub model: GbmRegressor,
    pub manifest: FeatureManifest,
    pub encoding: CategoryEncoding,
    pub metrics: ValidationMetrics,
    pub train_rows: usize,
    pub validation_rows: usize,
}

/// Model inputs of a feature table: every column but date, target and store
pub fn feature_columns(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .into_iter()
        .filter(|name| ![DATE_COLUMN, SALES_COLUMN, STORE_COLUMN].contains(name))
        .map(str::to_string)
        .collect()
}

/// Row-major model inputs for the given rows, ordered like the manifest.
///
/// Categorical columns are coded with `encoding`; missing numbers become NaN.
pub fn feature_matrix(
    df: &DataFrame,
    rows: &[usize],
    manifest: &FeatureManifest,
    encoding: &CategoryEncoding,
) -> Result<Vec<Vec<f64>>> {
    let columns = manifest
        .names()
        .iter()
        .map(|name| encoding.encode_series(require_column(df, name)?))
        .collect::<Result<Vec<_>>>()?;

    Ok(rows
        .iter()
        .map(|&row| {
            columns
                .iter()
                .map(|values| values[row].unwrap_or(f64::NAN))
                .collect()
        })
        .collect())
}

/// Split rows into training and validation by date.
///
/// Validation starts `validation_days` before the last date. Rows without a
/// date, or without a target, belong to neither side.
fn split_rows(df: &DataFrame, validation_days: i64) -> Result<(Vec<usize>, Vec<usize>)> {
    let dates = date_values(df, DATE_COLUMN)?;
    let target = numeric_values(df, SALES_COLUMN)?;

    let last_date = dates.iter().flatten().max().copied().ok_or_else(|| {
        ForecastError::DataError("feature table has no dated rows".to_string())
    })?;
    let valid_start = last_date - Duration::days(validation_days);

    let mut train = Vec::new();
    let mut valid = Vec::new();
    let mut skipped = 0;
    for (row, (date, y)) in dates.iter().zip(&target).enumerate() {
        match (date, y) {
            (Some(date), Some(_)) if *date < valid_start => train.push(row),
            (Some(_), Some(_)) => valid.push(row),
            _ => skipped += 1,
        }
    }
    if skipped > 0 {
        warn!(rows = skipped, "rows without a date or target left out of training");
    }
    Ok((train, valid))
}

/// Fit a model on a feature table and score it on the validation window
pub fn train_model(df: &DataFrame, config: &TrainingConfig) -> Result<TrainingOutcome> {
    let df = sort_by_date(df.clone())?;
    let manifest = FeatureManifest::new(feature_columns(&df))?;
    let encoding = CategoryEncoding::fit_frame(&df, manifest.names())?;

    let (train_rows, valid_rows) = split_rows(&df, config.validation_days)?;
    if train_rows.is_empty() {
        return Err(ForecastError::DataError(format!(
            "no rows fall before the {}-day validation window",
            config.validation_days
        )));
    }
    if valid_rows.is_empty() {
        return Err(ForecastError::DataError(
            "validation window holds no rows".to_string(),
        ));
    }
    info!(
        train_rows = train_rows.len(),
        validation_rows = valid_rows.len(),
        features = manifest.len(),
        "training"
    );

    let target = numeric_values(&df, SALES_COLUMN)?;
    let targets = |rows: &[usize]| -> Vec<f64> {
        rows.iter().map(|&r| target[r].unwrap_or(0.0)).collect()
    };

    let x_train = feature_matrix(&df, &train_rows, &manifest, &encoding)?;
    let model = GbmRegressor::fit(
        &x_train,
        &targets(&train_rows),
        manifest.names().to_vec(),
        &config.boosting,
    )?;

    let x_valid = feature_matrix(&df, &valid_rows, &manifest, &encoding)?;
    let predictions = model.predict_batch(&x_valid)?;
    let metrics = ValidationMetrics::evaluate(&targets(&valid_rows), &predictions)?;
    info!(rmse = metrics.rmse, mape = metrics.mape, "validation metrics");

    Ok(TrainingOutcome {
        model,
        manifest,
        encoding,
        metrics,
        train_rows: train_rows.len(),
        validation_rows: valid_rows.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::date_series;
    use crate::models::GbmParams;
    use chrono::NaiveDate;
    use polars::prelude::{NamedFrom, Series};
    use pretty_assertions::assert_eq;

    fn feature_table(days: i64) -> DataFrame {
        let start = NaiveDate::from_ymd_opt(2015, 1, 1).unwrap();
        let dates: Vec<_> = (0..days).map(|d| Some(start + Duration::days(d))).collect();
        let promo: Vec<f64> = (0..days).map(|d| (d % 2) as f64).collect();
        let sales: Vec<f64> = promo.iter().map(|p| 100.0 + 50.0 * p).collect();
        let kind: Vec<&str> = (0..days).map(|d| if d % 3 == 0 { "a" } else { "b" }).collect();

        DataFrame::new(vec![
            Series::new("store", vec![1i64; days as usize]),
            date_series("date", &dates),
            Series::new("sales", sales),
            Series::new("promo", promo),
            Series::new("storetype", kind),
        ])
        .unwrap()
    }

    fn config(validation_days: i64) -> TrainingConfig {
        TrainingConfig {
            validation_days,
            boosting: GbmParams {
                n_estimators: 50,
                learning_rate: 0.3,
                min_data_in_leaf: 2,
                ..GbmParams::default()
            },
        }
    }

    #[test]
    fn test_feature_columns_exclude_identifier_and_target() {
        assert_eq!(feature_columns(&feature_table(3)), vec!["promo", "storetype"]);
    }

    #[test]
    fn test_split_by_validation_window() {
        let table = feature_table(10);
        let (train, valid) = split_rows(&table, 3).unwrap();
        // last date is day 9, validation covers days 6..=9
        assert_eq!(train, (0..6).collect::<Vec<_>>());
        assert_eq!(valid, (6..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_train_model_learns_promo_effect() {
        let outcome = train_model(&feature_table(60), &config(10)).unwrap();

        assert_eq!(outcome.manifest.names(), &["promo".to_string(), "storetype".to_string()]);
        assert!(outcome.encoding.encodes("storetype"));
        assert_eq!(outcome.validation_rows, 11);
        assert_eq!(outcome.train_rows, 49);
        assert!(outcome.metrics.rmse < 5.0, "rmse {}", outcome.metrics.rmse);

        let with_promo = outcome.model.predict(&[1.0, 0.0]).unwrap();
        let without = outcome.model.predict(&[0.0, 0.0]).unwrap();
        assert!(with_promo - without > 40.0);
    }

    #[test]
    fn test_empty_training_window() {
        assert!(matches!(
            train_model(&feature_table(5), &config(90)),
            Err(ForecastError::DataError(_))
        ));
    }
}
