//! Integer codes for categorical columns
//!
//! A column's observed values are sorted and numbered from zero. Missing
//! values and values never observed while fitting get [`MISSING_CODE`].
//! Codes only line up between training and prediction when both sides use
//! the same table, which is why training persists it.

use crate::data::{is_numeric, text_keys, write_atomically};
use crate::error::{ForecastError, Result};
use polars::prelude::{DataFrame, DataType, Series};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Code of a missing or unseen category
pub const MISSING_CODE: f64 = -1.0;

/// Per-column category → code tables
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryEncoding {
    columns: BTreeMap<String, BTreeMap<String, i64>>,
}

impl CategoryEncoding {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number the distinct non-missing values of a column in sorted order
    pub fn fit_column<'a, I>(&mut self, column: &str, values: I)
    where
        I: IntoIterator<Item = Option<&'a str>>,
    {
        let distinct: BTreeSet<&str> = values.into_iter().flatten().collect();
        let codes = distinct
            .into_iter()
            .enumerate()
            .map(|(code, value)| (value.to_string(), code as i64))
            .collect();
        self.columns.insert(column.to_string(), codes);
    }

    /// Fit every non-numeric column of `df` among `columns`
    pub fn fit_frame(df: &DataFrame, columns: &[String]) -> Result<Self> {
        let mut encoding = Self::new();
        for name in columns {
            let Ok(series) = df.column(name) else {
                continue;
            };
            if is_numeric(series) {
                continue;
            }
            let keys = text_keys(series)?;
            encoding.fit_column(name, keys.iter().map(Option::as_deref));
        }
        Ok(encoding)
    }

    /// Whether a column is encoded
    pub fn encodes(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    /// Encoded column names
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Code of a value; `None` when the column itself is not encoded
    pub fn code(&self, column: &str, value: Option<&str>) -> Option<f64> {
        let codes = self.columns.get(column)?;
        Some(
            value
                .and_then(|v| codes.get(v))
                .map(|&code| code as f64)
                .unwrap_or(MISSING_CODE),
        )
    }

    /// Code every cell of a column; numeric columns pass through unchanged
    pub fn encode_series(&self, series: &Series) -> Result<Vec<Option<f64>>> {
        if is_numeric(series) {
            let numbers = series.cast(&DataType::Float64)?;
            let values: Vec<Option<f64>> = numbers.f64()?.into_iter().collect();
            return Ok(values);
        }
        let name = series.name();
        Ok(text_keys(series)?
            .iter()
            .map(|key| Some(self.code(name, key.as_deref()).unwrap_or(MISSING_CODE)))
            .collect())
    }

    /// Write the tables as JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        write_atomically(path.as_ref(), |file| {
            file.write_all(json.as_bytes())?;
            Ok(())
        })
    }

    /// Read tables written by [`CategoryEncoding::save`]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ForecastError::MissingArtifact(path.to_path_buf()));
        }
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }
}

/// Where prediction takes its category codes from
#[derive(Debug, Clone, PartialEq)]
pub enum EncodingSource {
    /// The table persisted at training time
    Persisted(CategoryEncoding),
    /// Recompute codes from the rows being predicted
    Rederive,
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::NamedFrom;
    use tempfile::tempdir;

    #[test]
    fn test_codes_follow_sorted_order() {
        let mut encoding = CategoryEncoding::new();
        encoding.fit_column("storetype", [Some("c"), Some("a"), None, Some("b"), Some("a")]);

        assert_eq!(encoding.code("storetype", Some("a")), Some(0.0));
        assert_eq!(encoding.code("storetype", Some("b")), Some(1.0));
        assert_eq!(encoding.code("storetype", Some("c")), Some(2.0));
        assert_eq!(encoding.code("storetype", Some("d")), Some(MISSING_CODE));
        assert_eq!(encoding.code("storetype", None), Some(MISSING_CODE));
        assert_eq!(encoding.code("assortment", Some("a")), None);
    }

    #[test]
    fn test_same_values_same_codes() {
        let mut first = CategoryEncoding::new();
        first.fit_column("x", [Some("q"), Some("p")]);
        let mut second = CategoryEncoding::new();
        second.fit_column("x", [Some("p"), Some("q"), Some("p")]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_fit_frame_skips_numeric_columns() {
        let df = DataFrame::new(vec![
            Series::new("promo", &[1.0, 0.0]),
            Series::new("stateholiday", &["0", "a"]),
        ])
        .unwrap();

        let encoding = CategoryEncoding::fit_frame(
            &df,
            &["promo".to_string(), "stateholiday".to_string(), "absent".to_string()],
        )
        .unwrap();
        assert!(!encoding.encodes("promo"));
        assert!(encoding.encodes("stateholiday"));
        assert_eq!(encoding.columns().collect::<Vec<_>>(), vec!["stateholiday"]);

        assert_eq!(
            encoding.encode_series(df.column("stateholiday").unwrap()).unwrap(),
            vec![Some(0.0), Some(1.0)]
        );
        assert_eq!(
            encoding.encode_series(df.column("promo").unwrap()).unwrap(),
            vec![Some(1.0), Some(0.0)]
        );
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("category_codes.json");
        let mut encoding = CategoryEncoding::new();
        encoding.fit_column("assortment", [Some("a"), Some("c")]);

        encoding.save(&path).unwrap();
        assert_eq!(CategoryEncoding::load(&path).unwrap(), encoding);
    }
}
