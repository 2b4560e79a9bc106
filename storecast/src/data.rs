//! Data frames and their CSV / parquet storage
//!
//! Every pipeline stage reads one whole polars [`DataFrame`], transforms it
//! and writes another. The helpers here read typed values out of a frame
//! and sort it the way every stage expects.

use crate::error::{ForecastError, Result};
use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::*;
use std::cmp::Ordering;
use std::fmt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Entity identifier column
pub const STORE_COLUMN: &str = "store";
/// Calendar date column
pub const DATE_COLUMN: &str = "date";
/// Daily target column
pub const SALES_COLUMN: &str = "sales";

/// Identifier of an independent time series (a store)
///
/// Identifiers are kept as text. Numeric identifiers are rendered without a
/// fractional part so that `1.0` read from parquet and `"1"` read from a
/// forecast CSV name the same store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityId(String);

impl EntityId {
    /// Create an identifier from text
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Create an identifier from a numeric cell
    pub fn from_number(value: f64) -> Self {
        Self(format_number(value))
    }

    /// Identifier as text
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn numeric(&self) -> Option<f64> {
        self.0.parse::<f64>().ok().filter(|v| v.is_finite())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Ord for EntityId {
    /// Numeric identifiers order by value, everything else lexically.
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.numeric(), other.numeric()) {
            (Some(a), Some(b)) => a.total_cmp(&b).then_with(|| self.0.cmp(&other.0)),
            _ => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for EntityId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Render a number the way identifiers and category keys expect it
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// Parse a calendar date, accepting an optional time-of-day suffix
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(date);
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(|datetime| datetime.date())
}

/// Look up a column that the caller cannot work without
pub fn require_column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Series> {
    df.column(name).map_err(|_| {
        ForecastError::SchemaError(format!("required column '{}' is missing", name))
    })
}

/// Whether a frame has a column of that name
pub fn has_column(df: &DataFrame, name: &str) -> bool {
    df.get_column_names().contains(&name)
}

/// Whether a column holds numbers (booleans count as numbers)
pub fn is_numeric(series: &Series) -> bool {
    let dtype = series.dtype();
    dtype.is_numeric() || *dtype == DataType::Boolean
}

/// Values of a required numeric column, widened to `f64`
pub fn numeric_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let series = require_column(df, name)?;
    if !is_numeric(series) {
        return Err(ForecastError::SchemaError(format!(
            "column '{}' must be numeric, found {}",
            name,
            series.dtype()
        )));
    }
    let values = series.cast(&DataType::Float64)?;
    let values = values.f64()?;
    Ok(values.into_iter().collect())
}

/// Values of a required date column
pub fn date_values(df: &DataFrame, name: &str) -> Result<Vec<Option<NaiveDate>>> {
    let series = require_column(df, name)?;
    let dates = match series.dtype() {
        DataType::Date => series.clone(),
        DataType::Datetime(_, _) => series.cast(&DataType::Date)?,
        other => {
            return Err(ForecastError::SchemaError(format!(
                "column '{}' must hold dates, found {}",
                name, other
            )))
        }
    };
    Ok(dates.date()?.as_date_iter().collect())
}

/// Textual key of every cell, `None` for nulls.
///
/// Numbers render through [`format_number`] and dates as `YYYY-MM-DD`, so
/// the same value always yields the same key whatever the column type.
pub fn text_keys(series: &Series) -> Result<Vec<Option<String>>> {
    let keys = match series.dtype() {
        DataType::Date | DataType::Datetime(_, _) => {
            let dates = series.cast(&DataType::Date)?;
            let keys: Vec<Option<String>> = dates
                .date()?
                .as_date_iter()
                .map(|d| d.map(|d| d.format("%Y-%m-%d").to_string()))
                .collect();
            keys
        }
        _ if is_numeric(series) => {
            let numbers = series.cast(&DataType::Float64)?;
            let keys: Vec<Option<String>> = numbers.f64()?.into_iter().map(|v| v.map(format_number)).collect();
            keys
        }
        _ => {
            let text = series.cast(&DataType::Utf8)?;
            let keys: Vec<Option<String>> = text.utf8()?.into_iter().map(|v| v.map(str::to_string)).collect();
            keys
        }
    };
    Ok(keys)
}

/// Entity identifier of every row
pub fn entity_ids(df: &DataFrame) -> Result<Vec<Option<EntityId>>> {
    let keys = text_keys(require_column(df, STORE_COLUMN)?)?;
    Ok(keys.into_iter().map(|k| k.map(EntityId::from)).collect())
}

/// A date column built from calendar dates
pub fn date_series(name: &str, values: &[Option<NaiveDate>]) -> Series {
    DateChunked::from_naive_date_options(name, values.iter().copied()).into_series()
}

/// Stable sort by `(store, date)`, nulls last
pub fn sort_by_entity_and_date(df: DataFrame) -> Result<DataFrame> {
    require_column(&df, STORE_COLUMN)?;
    require_column(&df, DATE_COLUMN)?;
    let sorted = df
        .lazy()
        .sort_by_exprs(
            [col(STORE_COLUMN), col(DATE_COLUMN)],
            [false, false],
            true,
            true,
        )
        .collect()?;
    Ok(sorted)
}

/// Stable sort by date, nulls last
pub fn sort_by_date(df: DataFrame) -> Result<DataFrame> {
    require_column(&df, DATE_COLUMN)?;
    let sorted = df
        .lazy()
        .sort_by_exprs([col(DATE_COLUMN)], [false], true, true)
        .collect()?;
    Ok(sorted)
}

/// Lowercase every column name
pub fn lowercase_names(df: &mut DataFrame) -> Result<()> {
    let names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|name| name.to_lowercase())
        .collect();
    df.set_column_names(&names)?;
    Ok(())
}

/// On-disk table encodings, chosen by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Csv,
    Parquet,
}

impl TableFormat {
    /// Pick the format from a path's extension
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);
        match extension.as_deref() {
            Some("csv") => Ok(TableFormat::Csv),
            Some("parquet") => Ok(TableFormat::Parquet),
            _ => Err(ForecastError::DataError(format!(
                "unsupported table format for {}",
                path.display()
            ))),
        }
    }
}

/// Read a whole CSV or parquet table
pub fn read_table<P: AsRef<Path>>(path: P) -> Result<DataFrame> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ForecastError::MissingArtifact(path.to_path_buf()));
    }

    let format = TableFormat::from_path(path)?;
    let file = File::open(path)?;
    let df = match format {
        TableFormat::Csv => CsvReader::new(file)
            .infer_schema(None)
            .has_header(true)
            .finish()?,
        TableFormat::Parquet => ParquetReader::new(file).finish()?,
    };

    debug!(
        path = %path.display(),
        rows = df.height(),
        columns = df.width(),
        "read table"
    );
    Ok(df)
}

/// Write a whole table as CSV or parquet, replacing any previous file
pub fn write_table<P: AsRef<Path>>(path: P, df: &DataFrame) -> Result<()> {
    let path = path.as_ref();
    let format = TableFormat::from_path(path)?;
    let mut df = df.clone();

    write_atomically(path, |file| {
        match format {
            TableFormat::Csv => CsvWriter::new(file).has_header(true).finish(&mut df)?,
            TableFormat::Parquet => {
                ParquetWriter::new(file).finish(&mut df)?;
            }
        }
        Ok(())
    })?;

    debug!(
        path = %path.display(),
        rows = df.height(),
        columns = df.width(),
        "wrote table"
    );
    Ok(())
}

/// Write `path` through a sibling temporary file renamed into place, so a
/// failed write never leaves a partial artifact behind.
pub(crate) fn write_atomically<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut File) -> Result<()>,
{
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let tmp = temporary_path(path);
    let outcome = File::create(&tmp)
        .map_err(ForecastError::from)
        .and_then(|mut file| {
            write(&mut file)?;
            file.sync_all()?;
            Ok(())
        });

    match outcome {
        Ok(()) => {
            fs::rename(&tmp, path)?;
            Ok(())
        }
        Err(err) => {
            let _ = fs::remove_file(&tmp);
            Err(err)
        }
    }
}

fn temporary_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
