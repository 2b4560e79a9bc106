//! Raw sales cleaning
//!
//! Turns the raw daily sales export and the store metadata into one frame
//! sorted by `(store, date)`.

use crate::data::{
    date_series, has_column, is_numeric, lowercase_names, parse_date, require_column,
    sort_by_entity_and_date, DATE_COLUMN, STORE_COLUMN,
};
use crate::error::{ForecastError, Result};
use polars::prelude::*;
use tracing::{debug, info, warn};

/// Flag marking whether a store opened that day
pub const OPEN_COLUMN: &str = "open";
/// Holiday marker mixing digits and letters in the raw export
pub const STATE_HOLIDAY_COLUMN: &str = "stateholiday";
/// Prefix of index columns left behind by spreadsheet exports
const UNNAMED_PREFIX: &str = "unnamed";

/// Clean the raw sales frame and merge in store metadata.
///
/// - column names are lowercased
/// - rows with an `open` flag other than `1` are dropped, missing flags kept
/// - store metadata is left-joined on `store`; shared columns from the store
///   side get a `_right` suffix
/// - `date` is parsed, unparseable values become missing
/// - `unnamed*` columns are dropped
///
/// The sales frame must carry `store` and `date` columns.
pub fn prepare_daily_sales(mut sales: DataFrame, mut stores: DataFrame) -> Result<DataFrame> {
    lowercase_names(&mut sales)?;
    lowercase_names(&mut stores)?;

    for required in [STORE_COLUMN, DATE_COLUMN] {
        if !has_column(&sales, required) {
            return Err(ForecastError::SchemaError(format!(
                "raw sales table has no '{}' column (found: {})",
                required,
                sales.get_column_names().join(", ")
            )));
        }
    }

    let dates = parse_dates(require_column(&sales, DATE_COLUMN)?)?;
    sales.replace(DATE_COLUMN, dates)?;

    let mut df = keep_open_days(sales)?;

    if has_column(&stores, STORE_COLUMN) {
        let key_type = require_column(&df, STORE_COLUMN)?.dtype().clone();
        let stores = stores
            .lazy()
            .with_column(col(STORE_COLUMN).cast(key_type));
        df = df
            .lazy()
            .join(
                stores,
                [col(STORE_COLUMN)],
                [col(STORE_COLUMN)],
                JoinArgs::new(JoinType::Left),
            )
            .collect()?;
    } else {
        warn!("store table has no 'store' column, skipping the merge");
    }

    if has_column(&df, STATE_HOLIDAY_COLUMN) {
        df = df
            .lazy()
            .with_column(col(STATE_HOLIDAY_COLUMN).cast(DataType::Utf8))
            .collect()?;
    }

    let unnamed: Vec<String> = df
        .get_column_names()
        .iter()
        .filter(|name| name.starts_with(UNNAMED_PREFIX))
        .map(|name| name.to_string())
        .collect();
    if !unnamed.is_empty() {
        debug!(columns = ?unnamed, "dropping unnamed columns");
        for name in &unnamed {
            df.drop_in_place(name)?;
        }
    }

    let df = sort_by_entity_and_date(df)?;
    info!(rows = df.height(), columns = df.width(), "prepared daily sales");
    Ok(df)
}

fn keep_open_days(df: DataFrame) -> Result<DataFrame> {
    if !has_column(&df, OPEN_COLUMN) {
        return Ok(df);
    }

    let before = df.height();
    let open = col(OPEN_COLUMN);
    let kept = df
        .lazy()
        .filter(
            open.clone()
                .is_null()
                .or(open.cast(DataType::Float64).eq(lit(1.0))),
        )
        .collect()?;
    debug!(dropped = before - kept.height(), "dropped closed-store days");
    Ok(kept)
}

fn parse_dates(series: &Series) -> Result<Series> {
    match series.dtype() {
        DataType::Date => return Ok(series.clone()),
        DataType::Datetime(_, _) => return Ok(series.cast(&DataType::Date)?),
        _ if is_numeric(series) => {
            return Err(ForecastError::SchemaError(
                "column 'date' holds numbers, expected dates".to_string(),
            ))
        }
        _ => {}
    }

    let text = series.cast(&DataType::Utf8)?;
    let raw: Vec<Option<&str>> = text.utf8()?.into_iter().collect();
    let parsed: Vec<_> = raw.iter().map(|v| v.and_then(parse_date)).collect();

    let unparsed = raw
        .iter()
        .zip(&parsed)
        .filter(|(raw, date)| raw.is_some() && date.is_none())
        .count();
    if unparsed > 0 {
        warn!(rows = unparsed, "unparseable dates set to missing");
    }
    Ok(date_series(DATE_COLUMN, &parsed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{date_values, numeric_values, text_keys};
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn raw_sales() -> DataFrame {
        DataFrame::new(vec![
            Series::new("Store", &[2i64, 1, 1, 1]),
            Series::new("Date", &["2015-07-01", "2015-07-02", "2015-07-01", "2015-07-03"]),
            Series::new("Sales", &[20i64, 11, 10, 0]),
            Series::new("Open", &[Some(1i64), None, Some(1), Some(0)]),
            Series::new("StateHoliday", &[0i64, 0, 0, 0]),
            Series::new("Unnamed: 0", &[0i64, 1, 2, 3]),
        ])
        .unwrap()
    }

    fn raw_stores() -> DataFrame {
        DataFrame::new(vec![
            Series::new("Store", &[1i64, 2, 3]),
            Series::new("StoreType", &["a", "c", "b"]),
        ])
        .unwrap()
    }

    fn keys(df: &DataFrame, name: &str) -> Vec<Option<String>> {
        text_keys(df.column(name).unwrap()).unwrap()
    }

    fn text(values: &[&str]) -> Vec<Option<String>> {
        values.iter().map(|v| Some(v.to_string())).collect()
    }

    #[test]
    fn test_prepare_daily_sales() {
        let df = prepare_daily_sales(raw_sales(), raw_stores()).unwrap();

        assert_eq!(
            df.get_column_names(),
            vec!["store", "date", "sales", "open", "stateholiday", "storetype"]
        );
        // closed day dropped, sorted by (store, date)
        assert_eq!(
            numeric_values(&df, "sales").unwrap(),
            vec![Some(10.0), Some(11.0), Some(20.0)]
        );
        assert_eq!(
            date_values(&df, "date").unwrap()[0],
            NaiveDate::from_ymd_opt(2015, 7, 1)
        );
        assert_eq!(keys(&df, "storetype"), text(&["a", "a", "c"]));
        assert_eq!(df.column("stateholiday").unwrap().dtype(), &DataType::Utf8);
        assert_eq!(keys(&df, "stateholiday"), text(&["0", "0", "0"]));
    }

    #[test]
    fn test_unmatched_stores_keep_nulls() {
        let sales = DataFrame::new(vec![
            Series::new("store", &[1i64, 4]),
            Series::new("date", &["2015-07-01", "2015-07-01"]),
            Series::new("promo", &[1i64, 0]),
        ])
        .unwrap();
        let stores = DataFrame::new(vec![
            Series::new("store", &[1i64, 2]),
            Series::new("storetype", &["a", "b"]),
            Series::new("promo", &[0i64, 0]),
        ])
        .unwrap();

        let df = prepare_daily_sales(sales, stores).unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(keys(&df, "storetype"), vec![Some("a".to_string()), None]);
        assert_eq!(
            numeric_values(&df, "promo").unwrap(),
            vec![Some(1.0), Some(0.0)]
        );
        assert_eq!(
            numeric_values(&df, "promo_right").unwrap(),
            vec![Some(0.0), None]
        );
    }

    #[test]
    fn test_unparseable_dates_become_missing() {
        let sales = DataFrame::new(vec![
            Series::new("store", &[1i64, 1]),
            Series::new("date", &["2015-07-01", "yesterday"]),
        ])
        .unwrap();
        let stores = DataFrame::new(vec![Series::new("store", &[1i64])]).unwrap();

        let df = prepare_daily_sales(sales, stores).unwrap();
        assert_eq!(
            date_values(&df, "date").unwrap(),
            vec![NaiveDate::from_ymd_opt(2015, 7, 1), None]
        );
    }

    #[test]
    fn test_numeric_dates_rejected() {
        let sales = DataFrame::new(vec![
            Series::new("store", &[1i64]),
            Series::new("date", &[20150701i64]),
        ])
        .unwrap();
        assert!(matches!(
            prepare_daily_sales(sales, raw_stores()),
            Err(ForecastError::SchemaError(_))
        ));
    }

    #[test]
    fn test_missing_required_column() {
        let sales = DataFrame::new(vec![Series::new("store", &[1i64])]).unwrap();
        let err = prepare_daily_sales(sales, raw_stores()).unwrap_err();
        match err {
            ForecastError::SchemaError(message) => assert!(message.contains("'date'")),
            other => panic!("expected a schema error, got {:?}", other),
        }
    }
}
