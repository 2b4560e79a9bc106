//! Calendar, lag and rolling features
//!
//! Lags and rolling means are window expressions over `store` on a frame
//! ordered by `(store, date)`. A rolling mean at day `t` averages the `k`
//! sales values before `t`, never `t` itself, so every feature is known the
//! morning of the day it describes.

use crate::data::{
    is_numeric, require_column, sort_by_entity_and_date, DATE_COLUMN, SALES_COLUMN, STORE_COLUMN,
};
use crate::error::{ForecastError, Result};
use polars::prelude::*;
use storecast_math::rolling::rolling_mean;
use tracing::{debug, warn};

/// Lag lengths, in days, of the `sales_lag_<k>` features
pub const SALES_LAGS: [usize; 3] = [1, 7, 30];
/// Window lengths, in days, of the `rolling_mean_<k>` features
pub const ROLLING_WINDOWS: [usize; 2] = [7, 30];

/// Name of a lag feature
pub fn lag_feature(periods: usize) -> String {
    format!("sales_lag_{}", periods)
}

/// Name of a rolling mean feature
pub fn rolling_feature(window: usize) -> String {
    format!("rolling_mean_{}", window)
}

/// Add calendar, lag and rolling features.
///
/// The result is sorted by `(store, date)` and holds no missing numeric
/// values: every gap is filled with `0`.
pub fn add_features(df: &DataFrame) -> Result<DataFrame> {
    let sales = require_column(df, SALES_COLUMN)?;
    if !is_numeric(sales) {
        return Err(ForecastError::SchemaError(format!(
            "column '{}' must be numeric, found {}",
            SALES_COLUMN,
            sales.dtype()
        )));
    }
    let missing_dates = require_column(df, DATE_COLUMN)?.null_count();
    if missing_dates > 0 {
        warn!(rows = missing_dates, "rows without a date get zero calendar features");
    }

    let sorted = sort_by_entity_and_date(df.clone())?;

    let mut exprs = calendar_features();
    let store = col(STORE_COLUMN);
    let sales = col(SALES_COLUMN).cast(DataType::Float64);
    for periods in SALES_LAGS {
        exprs.push(
            sales
                .clone()
                .shift(periods as i64)
                .over([store.clone()])
                .alias(&lag_feature(periods)),
        );
    }
    for window in ROLLING_WINDOWS {
        exprs.push(
            sales
                .clone()
                .shift(1)
                .apply(
                    move |series| trailing_mean(series, window),
                    GetOutput::from_type(DataType::Float64),
                )
                .over([store.clone()])
                .alias(&rolling_feature(window)),
        );
    }

    let out = sorted.lazy().with_columns(exprs).collect()?;
    let out = fill_missing_numbers(out)?;
    debug!(rows = out.height(), columns = out.width(), "built features");
    Ok(out)
}

/// Mean of the `window` values ending at each position, missing until the
/// window is full of known values
fn trailing_mean(series: Series, window: usize) -> PolarsResult<Option<Series>> {
    let values: Vec<Option<f64>> = series.f64()?.into_iter().collect();
    let means = rolling_mean(&values, window)
        .map_err(|err| PolarsError::ComputeError(err.to_string().into()))?;
    Ok(Some(Series::new(series.name(), means)))
}

fn calendar_features() -> Vec<Expr> {
    let date = col(DATE_COLUMN);
    // polars numbers weekdays from 1 (Monday)
    let dow =
        (date.clone().dt().weekday().cast(DataType::Int32) - lit(1)).cast(DataType::Float64);
    vec![
        dow.clone().alias("dow"),
        date.clone().dt().month().cast(DataType::Float64).alias("month"),
        date.dt().year().cast(DataType::Float64).alias("year"),
        when(dow.gt_eq(lit(5.0)))
            .then(lit(1.0))
            .otherwise(lit(0.0))
            .alias("is_weekend"),
    ]
}

fn fill_missing_numbers(df: DataFrame) -> Result<DataFrame> {
    let fills: Vec<Expr> = df
        .get_columns()
        .iter()
        .filter(|series| is_numeric(series) && series.null_count() > 0)
        .map(|series| col(series.name()).fill_null(lit(0)))
        .collect();
    if fills.is_empty() {
        return Ok(df);
    }
    Ok(df.lazy().with_columns(fills).collect()?)
}
