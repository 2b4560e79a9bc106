//! Data behind the forecast dashboard
//!
//! Everything a front end needs to draw a store's sales history next to its
//! forecast, list the forecast values and offer them for download. Nothing
//! here renders anything.
//!
//! When the feature table or the forecast file is missing the dashboard is
//! [`DashboardState::Unavailable`] with a warning to show instead.

use crate::assembly::{ForecastResult, ForecastTable};
use crate::config::PipelineConfig;
use crate::data::{
    date_values, entity_ids, numeric_values, read_table, write_atomically, EntityId, DATE_COLUMN,
    SALES_COLUMN,
};
use crate::error::{ForecastError, Result};
use crate::metrics::ValidationMetrics;
use chrono::{Duration, NaiveDate};
use csv::WriterBuilder;
use polars::prelude::DataFrame;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Shown when there is nothing to plot yet
pub const MISSING_FORECAST_WARNING: &str =
    "Please run training + prediction first to generate forecast files.";

/// Header of the per-store download
pub const TIDY_COLUMNS: [&str; 2] = ["Day", "Predicted Sales"];

/// Horizons with a forecast file in `model_dir`, ascending
pub fn available_horizons<P: AsRef<Path>>(model_dir: P) -> Result<Vec<usize>> {
    let model_dir = model_dir.as_ref();
    if !model_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut horizons = BTreeSet::new();
    for entry in fs::read_dir(model_dir)? {
        let name = entry?.file_name();
        let horizon = name
            .to_str()
            .and_then(|n| n.strip_prefix("next_"))
            .and_then(|n| n.strip_suffix("day_preds.csv"))
            .and_then(|n| n.parse::<usize>().ok())
            .filter(|&n| n > 0);
        if let Some(horizon) = horizon {
            horizons.insert(horizon);
        }
    }
    Ok(horizons.into_iter().collect())
}

/// Either a loaded dashboard or the reason there is none
#[derive(Debug, Clone)]
pub enum DashboardState {
    Ready(Dashboard),
    Unavailable {
        warning: String,
        metrics: Option<ValidationMetrics>,
    },
}

impl DashboardState {
    /// Load the feature table, the forecast for `horizon` and the metrics.
    ///
    /// Missing inputs degrade to [`DashboardState::Unavailable`]; unreadable
    /// ones are still errors.
    pub fn load(config: &PipelineConfig, horizon: usize) -> Result<Self> {
        let metrics = match ValidationMetrics::load(config.metrics_path()) {
            Ok(metrics) => Some(metrics),
            Err(ForecastError::MissingArtifact(_)) => None,
            Err(err) => return Err(err),
        };

        let history = read_table(config.features_path());
        let forecast = ForecastTable::read_csv(config.forecast_path(horizon));
        match (history, forecast) {
            (Ok(history), Ok(forecast)) => Ok(DashboardState::Ready(Dashboard {
                history,
                forecast,
                metrics,
            })),
            (Err(ForecastError::MissingArtifact(path)), _)
            | (_, Err(ForecastError::MissingArtifact(path))) => {
                debug!(path = %path.display(), "dashboard input missing");
                Ok(DashboardState::Unavailable {
                    warning: MISSING_FORECAST_WARNING.to_string(),
                    metrics,
                })
            }
            (Err(err), _) | (_, Err(err)) => Err(err),
        }
    }

    pub fn metrics(&self) -> Option<&ValidationMetrics> {
        match self {
            DashboardState::Ready(dashboard) => dashboard.metrics.as_ref(),
            DashboardState::Unavailable { metrics, .. } => metrics.as_ref(),
        }
    }
}

/// Sales history, one forecast horizon and the model's validation metrics
#[derive(Debug, Clone)]
pub struct Dashboard {
    history: DataFrame,
    forecast: ForecastTable,
    metrics: Option<ValidationMetrics>,
}

impl Dashboard {
    pub fn new(
        history: DataFrame,
        forecast: ForecastTable,
        metrics: Option<ValidationMetrics>,
    ) -> Self {
        Self {
            history,
            forecast,
            metrics,
        }
    }

    pub fn metrics(&self) -> Option<&ValidationMetrics> {
        self.metrics.as_ref()
    }

    pub fn forecast(&self) -> &ForecastTable {
        &self.forecast
    }

    /// Stores present in the history, in identifier order
    pub fn stores(&self) -> Result<Vec<EntityId>> {
        let ids: BTreeSet<EntityId> = entity_ids(&self.history)?.into_iter().flatten().collect();
        Ok(ids.into_iter().collect())
    }

    /// History and forecast of one store
    pub fn store_view(&self, store: &str) -> Result<StoreView> {
        let entity = EntityId::new(store);
        let ids = entity_ids(&self.history)?;
        let dates = date_values(&self.history, DATE_COLUMN)?;
        let sales = numeric_values(&self.history, SALES_COLUMN)?;

        let mut history: Vec<(NaiveDate, f64)> = ids
            .into_iter()
            .zip(dates.into_iter().zip(sales))
            .filter(|(id, _)| matches!(id, Some(id) if *id == entity))
            .filter_map(|(_, (date, value))| Some((date?, value?)))
            .collect();
        history.sort_by_key(|(date, _)| *date);

        let prediction = self.forecast.get(store);
        if history.is_empty() && prediction.is_none() {
            return Err(ForecastError::DataError(format!("unknown store {}", store)));
        }

        Ok(StoreView::new(entity, history, prediction))
    }
}

/// One row of the per-store forecast listing
#[derive(Debug, Clone, PartialEq)]
pub struct TidyRow {
    /// Forecast column the value came from, `day_<i>_pred`
    pub day: String,
    pub predicted_sales: f64,
}

/// Everything shown for a single store
#[derive(Debug, Clone, PartialEq)]
pub struct StoreView {
    pub store: EntityId,
    /// `(date, sales)` by date
    pub history: Vec<(NaiveDate, f64)>,
    /// `(date, prediction)` for the days after the last history date
    pub forecast: Vec<(NaiveDate, f64)>,
    pub tidy: Vec<TidyRow>,
}

impl StoreView {
    fn new(
        store: EntityId,
        history: Vec<(NaiveDate, f64)>,
        prediction: Option<&ForecastResult>,
    ) -> Self {
        let predictions = prediction.map(ForecastResult::predictions).unwrap_or(&[]);

        let forecast = match history.last() {
            Some(&(last_date, _)) => predictions
                .iter()
                .enumerate()
                .map(|(i, &value)| (last_date + Duration::days(i as i64 + 1), value))
                .collect(),
            None => Vec::new(),
        };

        let tidy = predictions
            .iter()
            .enumerate()
            .map(|(i, &value)| TidyRow {
                day: ForecastTable::prediction_column(i + 1),
                predicted_sales: value,
            })
            .collect();

        Self {
            store,
            history,
            forecast,
            tidy,
        }
    }

    /// Download file name, `store_<id>_forecast.csv`
    pub fn export_file_name(&self) -> String {
        format!("store_{}_forecast.csv", self.store)
    }

    /// Write the forecast listing into `dir`
    pub fn export_tidy_csv<P: AsRef<Path>>(&self, dir: P) -> Result<PathBuf> {
        let path = dir.as_ref().join(self.export_file_name());
        write_atomically(&path, |file| {
            let mut writer = WriterBuilder::new().from_writer(file);
            writer.write_record(TIDY_COLUMNS)?;
            for row in &self.tidy {
                writer.write_record([row.day.clone(), format!("{:?}", row.predicted_sales)])?;
            }
            writer.flush()?;
            Ok(())
        })?;
        info!(path = %path.display(), "exported store forecast");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{date_series, STORE_COLUMN};
    use polars::prelude::{NamedFrom, Series};
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2015, 7, d).unwrap()
    }

    fn dashboard() -> Dashboard {
        let history = DataFrame::new(vec![
            Series::new(STORE_COLUMN, &[1i64, 1, 2]),
            date_series(DATE_COLUMN, &[Some(day(31)), Some(day(30)), Some(day(30))]),
            Series::new(SALES_COLUMN, &[31.0, 30.0, 5.0]),
        ])
        .unwrap();
        let forecast = ForecastTable::new(
            2,
            vec![ForecastResult::new(EntityId::new("1"), vec![40.0, 41.0]).unwrap()],
        )
        .unwrap();
        Dashboard::new(history, forecast, None)
    }

    #[test]
    fn test_store_view_dates_follow_history() {
        let view = dashboard().store_view("1").unwrap();
        assert_eq!(view.history, vec![(day(30), 30.0), (day(31), 31.0)]);
        assert_eq!(
            view.forecast,
            vec![
                (NaiveDate::from_ymd_opt(2015, 8, 1).unwrap(), 40.0),
                (NaiveDate::from_ymd_opt(2015, 8, 2).unwrap(), 41.0)
            ]
        );
        assert_eq!(view.tidy[1].day, "day_2_pred");
    }

    #[test]
    fn test_store_without_forecast() {
        let dashboard = dashboard();
        assert_eq!(
            dashboard.stores().unwrap(),
            vec![EntityId::new("1"), EntityId::new("2")]
        );
        let view = dashboard.store_view("2").unwrap();
        assert!(view.forecast.is_empty());
        assert!(view.tidy.is_empty());
        assert!(dashboard.store_view("99").is_err());
    }

    #[test]
    fn test_export_tidy_csv() {
        let dir = tempdir().unwrap();
        let view = dashboard().store_view("1").unwrap();
        let path = view.export_tidy_csv(dir.path()).unwrap();

        assert_eq!(path.file_name().unwrap(), "store_1_forecast.csv");
        assert_eq!(
            fs::read_to_string(path).unwrap(),
            "Day,Predicted Sales\nday_1_pred,40.0\nday_2_pred,41.0\n"
        );
    }

    #[test]
    fn test_available_horizons() {
        let dir = tempdir().unwrap();
        for name in ["next_14day_preds.csv", "next_7day_preds.csv", "metrics.json", "next_xday_preds.csv"] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        assert_eq!(available_horizons(dir.path()).unwrap(), vec![7, 14]);
        assert!(available_horizons(dir.path().join("absent")).unwrap().is_empty());
    }

    #[test]
    fn test_missing_inputs_degrade_to_warning() {
        let dir = tempdir().unwrap();
        let config = PipelineConfig::rooted_at(dir.path());

        match DashboardState::load(&config, 7).unwrap() {
            DashboardState::Unavailable { warning, metrics } => {
                assert_eq!(warning, MISSING_FORECAST_WARNING);
                assert!(metrics.is_none());
            }
            DashboardState::Ready(_) => panic!("nothing has been produced yet"),
        }
    }
}
