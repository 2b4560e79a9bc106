//! Align feature rows with the schema a regressor was trained on
//!
//! Rows come out of the feature table with whatever columns it happens to
//! carry. [`Reconciler`] turns each into a plain vector ordered like the
//! [`FeatureManifest`]: manifest features the row lacks become `0`, columns
//! outside the manifest are dropped and categorical values become codes.

use crate::data::{
    entity_ids, format_number, has_column, is_numeric, require_column, sort_by_entity_and_date,
    text_keys, EntityId, DATE_COLUMN, STORE_COLUMN,
};
use crate::encoding::{CategoryEncoding, EncodingSource, MISSING_CODE};
use crate::error::Result;
use crate::manifest::FeatureManifest;
use polars::prelude::*;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// One cell of a feature row
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureValue {
    Number(f64),
    Category(String),
    Missing,
}

impl FeatureValue {
    /// Textual form used for category lookups
    fn category_key(&self) -> Option<String> {
        match self {
            FeatureValue::Number(v) => Some(format_number(*v)),
            FeatureValue::Category(text) => Some(text.clone()),
            FeatureValue::Missing => None,
        }
    }
}

impl From<f64> for FeatureValue {
    fn from(value: f64) -> Self {
        FeatureValue::Number(value)
    }
}

impl From<&str> for FeatureValue {
    fn from(value: &str) -> Self {
        FeatureValue::Category(value.to_string())
    }
}

/// Feature values of one entity at one point in time
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    entity: EntityId,
    values: BTreeMap<String, FeatureValue>,
}

impl FeatureRow {
    pub fn new(entity: impl Into<EntityId>) -> Self {
        Self {
            entity: entity.into(),
            values: BTreeMap::new(),
        }
    }

    /// Builder-style [`FeatureRow::insert`]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FeatureValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FeatureValue>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn entity(&self) -> &EntityId {
        &self.entity
    }

    pub fn get(&self, name: &str) -> Option<&FeatureValue> {
        self.values.get(name)
    }

    /// Column names present in the row
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

/// Most recent row of every entity, ordered by entity.
///
/// The frame is ordered by `(store, date)` first when it has a date column;
/// otherwise frame order decides which row is the most recent. Rows without
/// a store are skipped.
pub fn latest_rows(df: &DataFrame) -> Result<Vec<FeatureRow>> {
    require_column(df, STORE_COLUMN)?;
    let plan = if has_column(df, DATE_COLUMN) {
        sort_by_entity_and_date(df.clone())?.lazy()
    } else {
        df.clone().lazy()
    };
    let latest = plan
        .filter(col(STORE_COLUMN).is_not_null())
        .groupby_stable([col(STORE_COLUMN)])
        .tail(Some(1))
        .collect()?;

    let columns = latest
        .get_columns()
        .iter()
        .map(|series| Ok((series.name(), cells(series)?)))
        .collect::<Result<Vec<_>>>()?;

    let mut rows = Vec::with_capacity(latest.height());
    for (i, entity) in entity_ids(&latest)?.into_iter().enumerate() {
        let Some(entity) = entity else { continue };
        let mut row = FeatureRow::new(entity);
        for (name, values) in &columns {
            row.insert(*name, values[i].clone());
        }
        rows.push(row);
    }
    rows.sort_by(|a, b| a.entity.cmp(&b.entity));
    Ok(rows)
}

fn cells(series: &Series) -> Result<Vec<FeatureValue>> {
    let values = if is_numeric(series) {
        let numbers = series.cast(&DataType::Float64)?;
        let values: Vec<FeatureValue> = numbers
            .f64()?
            .into_iter()
            .map(|v| v.map_or(FeatureValue::Missing, FeatureValue::Number))
            .collect();
        values
    } else {
        text_keys(series)?
            .into_iter()
            .map(|k| k.map_or(FeatureValue::Missing, FeatureValue::Category))
            .collect()
    };
    Ok(values)
}

/// A feature vector ordered like the manifest
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledRow {
    pub entity: EntityId,
    pub values: Vec<f64>,
}

/// Maps feature rows onto manifest-ordered vectors
#[derive(Debug, Clone)]
pub struct Reconciler {
    manifest: FeatureManifest,
    encoding: CategoryEncoding,
}

impl Reconciler {
    /// Build a reconciler.
    ///
    /// With [`EncodingSource::Rederive`] the codes of every manifest column
    /// holding a category in `rows` are fitted on `rows` themselves.
    pub fn new(manifest: FeatureManifest, source: EncodingSource, rows: &[FeatureRow]) -> Self {
        let encoding = match source {
            EncodingSource::Persisted(encoding) => encoding,
            EncodingSource::Rederive => rederive(&manifest, rows),
        };
        Self { manifest, encoding }
    }

    pub fn manifest(&self) -> &FeatureManifest {
        &self.manifest
    }

    pub fn encoding(&self) -> &CategoryEncoding {
        &self.encoding
    }

    /// Reconcile one row
    pub fn reconcile(&self, row: &FeatureRow) -> ReconciledRow {
        let values = self
            .manifest
            .names()
            .iter()
            .map(|name| self.value(row, name))
            .collect();
        ReconciledRow {
            entity: row.entity.clone(),
            values,
        }
    }

    /// Reconcile every row, keeping their order
    pub fn reconcile_all(&self, rows: &[FeatureRow]) -> Vec<ReconciledRow> {
        debug!(rows = rows.len(), features = self.manifest.len(), "reconciling rows");
        rows.iter().map(|row| self.reconcile(row)).collect()
    }

    fn value(&self, row: &FeatureRow, name: &str) -> f64 {
        let Some(value) = row.get(name) else {
            return 0.0;
        };

        if self.encoding.encodes(name) {
            let key = value.category_key();
            let code = self
                .encoding
                .code(name, key.as_deref())
                .unwrap_or(MISSING_CODE);
            if code == MISSING_CODE {
                if let Some(key) = key {
                    warn!(entity = %row.entity, feature = name, value = %key, "unseen category");
                }
            }
            return code;
        }

        match value {
            FeatureValue::Number(v) if v.is_nan() => 0.0,
            FeatureValue::Number(v) => *v,
            FeatureValue::Missing => 0.0,
            FeatureValue::Category(text) => {
                warn!(
                    entity = %row.entity,
                    feature = name,
                    value = %text,
                    "category in a column without codes"
                );
                MISSING_CODE
            }
        }
    }
}

fn rederive(manifest: &FeatureManifest, rows: &[FeatureRow]) -> CategoryEncoding {
    let mut encoding = CategoryEncoding::new();
    for name in manifest.names() {
        let categorical = rows
            .iter()
            .any(|row| matches!(row.get(name), Some(FeatureValue::Category(_))));
        if !categorical {
            continue;
        }
        let keys: Vec<Option<String>> = rows
            .iter()
            .map(|row| row.get(name).and_then(FeatureValue::category_key))
            .collect();
        encoding.fit_column(name, keys.iter().map(Option::as_deref));
    }
    encoding
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn manifest(names: &[&str]) -> FeatureManifest {
        FeatureManifest::new(names.iter().copied()).unwrap()
    }

    #[test]
    fn test_absent_feature_is_zero_and_extras_dropped() {
        let row = FeatureRow::new("1")
            .with("sales_lag_1", 50.0)
            .with("customers", 700.0);
        let reconciler = Reconciler::new(
            manifest(&["sales_lag_1", "rolling_mean_7"]),
            EncodingSource::Rederive,
            &[row.clone()],
        );

        let reconciled = reconciler.reconcile(&row);
        assert_eq!(reconciled.values, vec![50.0, 0.0]);
        assert_eq!(reconciled.entity, EntityId::new("1"));
    }

    #[test]
    fn test_missing_and_nan_numbers_are_zero() {
        let row = FeatureRow::new("1")
            .with("a", f64::NAN)
            .with("b", FeatureValue::Missing);
        let reconciler = Reconciler::new(manifest(&["a", "b"]), EncodingSource::Rederive, &[]);
        assert_eq!(reconciler.reconcile(&row).values, vec![0.0, 0.0]);
    }

    #[test]
    fn test_rederived_codes_follow_snapshot() {
        let rows = vec![
            FeatureRow::new("1").with("storetype", "c"),
            FeatureRow::new("2").with("storetype", "a"),
            FeatureRow::new("3").with("storetype", FeatureValue::Missing),
        ];
        let reconciler = Reconciler::new(manifest(&["storetype"]), EncodingSource::Rederive, &rows);

        let values: Vec<f64> = reconciler
            .reconcile_all(&rows)
            .into_iter()
            .map(|r| r.values[0])
            .collect();
        assert_eq!(values, vec![1.0, 0.0, MISSING_CODE]);
    }

    #[test]
    fn test_persisted_codes_mark_unseen_values() {
        let mut encoding = CategoryEncoding::new();
        encoding.fit_column("assortment", [Some("a"), Some("b"), Some("c")]);
        let rows = vec![
            FeatureRow::new("1").with("assortment", "c"),
            FeatureRow::new("2").with("assortment", "z"),
        ];
        let reconciler = Reconciler::new(
            manifest(&["assortment"]),
            EncodingSource::Persisted(encoding),
            &rows,
        );

        let reconciled = reconciler.reconcile_all(&rows);
        assert_eq!(reconciled[0].values, vec![2.0]);
        assert_eq!(reconciled[1].values, vec![MISSING_CODE]);
    }

    #[test]
    fn test_latest_rows_picks_last_date_per_store() {
        use crate::data::date_series;
        use chrono::NaiveDate;

        let day = |d| NaiveDate::from_ymd_opt(2015, 7, d);
        let df = DataFrame::new(vec![
            Series::new("store", &[Some(2i64), Some(1), Some(1), Some(2), None]),
            date_series("date", &[day(2), day(3), day(1), day(1), day(9)]),
            Series::new("sales_lag_1", &[Some(20.0), Some(11.0), Some(10.0), None, Some(99.0)]),
            Series::new("storetype", &["c", "a", "a", "c", "b"]),
        ])
        .unwrap();

        let rows = latest_rows(&df).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].entity(), &EntityId::new("1"));
        assert_eq!(rows[0].get("sales_lag_1"), Some(&FeatureValue::Number(11.0)));
        assert_eq!(rows[1].entity(), &EntityId::new("2"));
        assert_eq!(rows[1].get("sales_lag_1"), Some(&FeatureValue::Number(20.0)));
        assert_eq!(
            rows[1].get("date"),
            Some(&FeatureValue::Category("2015-07-02".to_string()))
        );
        assert_eq!(rows[1].get("storetype"), Some(&FeatureValue::from("c")));
    }

    #[test]
    fn test_latest_rows_without_dates_follow_frame_order() {
        let df = DataFrame::new(vec![
            Series::new("store", &["10", "9", "10"]),
            Series::new("sales_lag_1", &[1.0, 2.0, 3.0]),
        ])
        .unwrap();

        let rows = latest_rows(&df).unwrap();
        let entities: Vec<&str> = rows.iter().map(|r| r.entity().as_str()).collect();
        assert_eq!(entities, vec!["9", "10"]);
        assert_eq!(rows[1].get("sales_lag_1"), Some(&FeatureValue::Number(3.0)));
    }
}
