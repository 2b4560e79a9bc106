//! Forecast results and their CSV form
//!
//! A forecast file has one row per store: `store, day_1_pred, .., day_N_pred`.

use crate::data::{write_atomically, EntityId, STORE_COLUMN};
use crate::error::{ForecastError, Result};
use csv::{ReaderBuilder, WriterBuilder};
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;
use tracing::info;

/// Day-ahead predictions of one entity, day 1 first
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastResult {
    entity: EntityId,
    predictions: Vec<f64>,
}

impl ForecastResult {
    pub fn new(entity: EntityId, predictions: Vec<f64>) -> Result<Self> {
        if predictions.is_empty() {
            return Err(ForecastError::InvalidParameter(format!(
                "forecast for store {} has no predictions",
                entity
            )));
        }
        Ok(Self {
            entity,
            predictions,
        })
    }

    pub fn entity(&self) -> &EntityId {
        &self.entity
    }

    pub fn predictions(&self) -> &[f64] {
        &self.predictions
    }

    /// Number of days covered
    pub fn horizon(&self) -> usize {
        self.predictions.len()
    }
}

/// Forecasts of every entity for one horizon
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastTable {
    horizon: usize,
    rows: Vec<ForecastResult>,
}

impl ForecastTable {
    /// Assemble results, checking every entity appears once with `horizon` values
    pub fn new(horizon: usize, rows: Vec<ForecastResult>) -> Result<Self> {
        if horizon == 0 {
            return Err(ForecastError::InvalidParameter(
                "forecast horizon must be at least one day".to_string(),
            ));
        }

        let mut seen = HashSet::with_capacity(rows.len());
        for row in &rows {
            if row.horizon() != horizon {
                return Err(ForecastError::DataError(format!(
                    "store {} has {} predictions, expected {}",
                    row.entity,
                    row.horizon(),
                    horizon
                )));
            }
            if !seen.insert(row.entity.clone()) {
                return Err(ForecastError::DataError(format!(
                    "store {} appears more than once",
                    row.entity
                )));
            }
        }

        Ok(Self { horizon, rows })
    }

    /// File name of the forecast for a horizon
    pub fn file_name(horizon: usize) -> String {
        format!("next_{}day_preds.csv", horizon)
    }

    /// Column holding the prediction `day` days ahead (1-based)
    pub fn prediction_column(day: usize) -> String {
        format!("day_{}_pred", day)
    }

    /// Header row
    pub fn columns(&self) -> Vec<String> {
        std::iter::once(STORE_COLUMN.to_string())
            .chain((1..=self.horizon).map(Self::prediction_column))
            .collect()
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    pub fn rows(&self) -> &[ForecastResult] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Forecast of one store; identifiers compare as text
    pub fn get(&self, entity: &str) -> Option<&ForecastResult> {
        self.rows.iter().find(|row| row.entity.as_str() == entity)
    }

    /// Write the table, replacing any previous file
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        write_atomically(path, |file: &mut File| {
            let mut writer = WriterBuilder::new().from_writer(file);
            writer.write_record(self.columns())?;
            for row in &self.rows {
                let record = std::iter::once(row.entity.to_string())
                    .chain(row.predictions.iter().map(|p| format!("{:?}", p)));
                writer.write_record(record)?;
            }
            writer.flush()?;
            Ok(())
        })?;

        info!(
            path = %path.display(),
            stores = self.rows.len(),
            horizon = self.horizon,
            "wrote forecast"
        );
        Ok(())
    }

    /// Read a file written by [`ForecastTable::write_csv`]
    pub fn read_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ForecastError::MissingArtifact(path.to_path_buf()));
        }

        let mut reader = ReaderBuilder::new().flexible(true).from_path(path)?;
        let header = reader.headers()?.clone();
        let horizon = header.len().saturating_sub(1);
        let valid_header = header.get(0).map(str::trim) == Some(STORE_COLUMN)
            && header
                .iter()
                .skip(1)
                .enumerate()
                .all(|(i, name)| name.trim() == Self::prediction_column(i + 1));
        if !valid_header || horizon == 0 {
            return Err(ForecastError::SchemaError(format!(
                "{} does not look like a forecast file: {:?}",
                path.display(),
                header.iter().collect::<Vec<_>>()
            )));
        }

        let mut rows = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = record?;
            if record.len() != horizon + 1 {
                return Err(ForecastError::DataError(format!(
                    "{} row {} has {} values, expected {}",
                    path.display(),
                    line + 1,
                    record.len(),
                    horizon + 1
                )));
            }

            let entity = EntityId::new(record[0].trim());
            let predictions = record
                .iter()
                .skip(1)
                .map(|value| {
                    value.trim().parse::<f64>().map_err(|_| {
                        ForecastError::DataError(format!(
                            "store {}: '{}' is not a number",
                            entity, value
                        ))
                    })
                })
                .collect::<Result<Vec<f64>>>()?;
            rows.push(ForecastResult::new(entity, predictions)?);
        }

        Self::new(horizon, rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;

    fn result(entity: &str, predictions: &[f64]) -> ForecastResult {
        ForecastResult::new(EntityId::new(entity), predictions.to_vec()).unwrap()
    }

    #[test]
    fn test_file_and_column_names() {
        assert_eq!(ForecastTable::file_name(7), "next_7day_preds.csv");
        assert_eq!(ForecastTable::prediction_column(3), "day_3_pred");

        let table = ForecastTable::new(2, vec![result("1", &[1.0, 2.0])]).unwrap();
        assert_eq!(table.columns(), vec!["store", "day_1_pred", "day_2_pred"]);
    }

    #[test]
    fn test_new_validates_shape() {
        assert!(ForecastTable::new(2, vec![result("1", &[1.0])]).is_err());
        assert!(ForecastTable::new(1, vec![result("1", &[1.0]), result("1", &[2.0])]).is_err());
        assert!(ForecastTable::new(0, vec![]).is_err());
        assert!(ForecastResult::new(EntityId::new("1"), vec![]).is_err());
    }

    #[test]
    fn test_write_and_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(ForecastTable::file_name(2));
        let table = ForecastTable::new(
            2,
            vec![result("1", &[60.0, 60.0]), result("2", &[12.5, 13.25])],
        )
        .unwrap();

        table.write_csv(&path).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "store,day_1_pred,day_2_pred\n1,60.0,60.0\n2,12.5,13.25\n"
        );

        let read = ForecastTable::read_csv(&path).unwrap();
        assert_eq!(read, table);
        assert_eq!(read.get("2").unwrap().predictions(), &[12.5, 13.25]);
    }

    #[test]
    fn test_read_rejects_bad_files() {
        let dir = tempdir().unwrap();

        let header = dir.path().join("header.csv");
        fs::write(&header, "shop,day_1_pred\n1,2.0\n").unwrap();
        assert!(matches!(
            ForecastTable::read_csv(&header),
            Err(ForecastError::SchemaError(_))
        ));

        let short = dir.path().join("short.csv");
        fs::write(&short, "store,day_1_pred,day_2_pred\n1,2.0\n").unwrap();
        assert!(matches!(
            ForecastTable::read_csv(&short),
            Err(ForecastError::DataError(_))
        ));

        assert!(matches!(
            ForecastTable::read_csv(dir.path().join("absent.csv")),
            Err(ForecastError::MissingArtifact(_))
        ));
    }
}
