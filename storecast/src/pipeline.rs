//! Pipeline stages
//!
//! Each stage reads the artifacts of the previous one from the directories
//! in [`PipelineConfig`] and writes its own. Stages can be rerun at will:
//! outputs are replaced whole.

use crate::assembly::ForecastTable;
use crate::config::PipelineConfig;
use crate::data::{read_table, write_table};
use crate::encoding::{CategoryEncoding, EncodingSource};
use crate::error::{ForecastError, Result};
use crate::etl::prepare_daily_sales;
use crate::features::add_features;
use crate::forecaster::IterativeForecaster;
use crate::manifest::FeatureManifest;
use crate::models::GbmRegressor;
use crate::reconcile::{latest_rows, Reconciler};
use crate::training::{train_model, TrainingOutcome};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Clean the raw exports into the daily sales table
pub fn run_etl(config: &PipelineConfig) -> Result<PathBuf> {
    let sales = read_table(config.train_csv())?;
    let stores = read_table(config.store_csv())?;
    let daily = prepare_daily_sales(sales, stores)?;

    let output = config.daily_sales_path();
    write_table(&output, &daily)?;
    info!(path = %output.display(), rows = daily.height(), "saved daily sales");
    Ok(output)
}

/// Derive the feature table from the daily sales table
pub fn run_features(config: &PipelineConfig) -> Result<PathBuf> {
    let daily = read_table(config.daily_sales_path())?;
    let features = add_features(&daily)?;

    let output = config.features_path();
    write_table(&output, &features)?;
    info!(path = %output.display(), rows = features.height(), "saved features");
    Ok(output)
}

/// Train on the feature table and save model, manifest, codes and metrics.
///
/// The four artifacts are staged next to their targets and renamed into
/// place only once all of them were written; a failed save keeps the
/// previous set intact.
pub fn run_training(config: &PipelineConfig) -> Result<TrainingOutcome> {
    let features = read_table(config.features_path())?;
    let outcome = train_model(&features, &config.training)?;

    save_artifacts(config, &outcome)?;
    info!(
        model = %config.model_path().display(),
        metrics = %outcome.metrics,
        "saved model artifacts"
    );
    Ok(outcome)
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".staged");
    path.with_file_name(name)
}

fn save_artifacts(config: &PipelineConfig, outcome: &TrainingOutcome) -> Result<()> {
    // renamed in this order, the model last
    let targets = [
        config.metrics_path(),
        config.category_codes_path(),
        config.manifest_path(),
        config.model_path(),
    ];
    let staged: Vec<PathBuf> = targets.iter().map(|path| staging_path(path)).collect();

    let saved = outcome
        .metrics
        .save(&staged[0])
        .and_then(|_| outcome.encoding.save(&staged[1]))
        .and_then(|_| outcome.manifest.save(&staged[2]))
        .and_then(|_| outcome.model.save(&staged[3]))
        .and_then(|_| {
            for (from, to) in staged.iter().zip(&targets) {
                fs::rename(from, to)?;
            }
            Ok(())
        });

    if saved.is_err() {
        for path in &staged {
            let _ = fs::remove_file(path);
        }
    }
    saved
}

/// Load the model and its manifest, checking they agree
fn load_model(config: &PipelineConfig) -> Result<(GbmRegressor, FeatureManifest)> {
    for path in [config.model_path(), config.manifest_path()] {
        if !path.exists() {
            return Err(ForecastError::MissingArtifact(path));
        }
    }

    let manifest = FeatureManifest::load(config.manifest_path())?;
    let model = GbmRegressor::load(config.model_path())?;
    if manifest.len() != model.num_features() {
        return Err(ForecastError::SchemaError(format!(
            "manifest lists {} features but the model was trained on {}",
            manifest.len(),
            model.num_features()
        )));
    }
    let differing = manifest
        .names()
        .iter()
        .zip(model.feature_names())
        .enumerate()
        .find(|(_, (listed, trained))| listed != trained);
    if let Some((position, (listed, trained))) = differing {
        return Err(ForecastError::SchemaError(format!(
            "manifest feature {} is '{}' but the model was trained with '{}' there",
            position + 1,
            listed,
            trained
        )));
    }
    Ok((model, manifest))
}

fn encoding_source(config: &PipelineConfig, rederive: bool) -> Result<EncodingSource> {
    if rederive {
        return Ok(EncodingSource::Rederive);
    }
    let path = config.category_codes_path();
    if !path.exists() {
        warn!(
            path = %path.display(),
            "no saved category codes, deriving them from the latest rows"
        );
        return Ok(EncodingSource::Rederive);
    }
    Ok(EncodingSource::Persisted(CategoryEncoding::load(path)?))
}

/// Forecast `horizon` days for every store without writing anything
pub fn forecast(config: &PipelineConfig, horizon: usize, rederive: bool) -> Result<ForecastTable> {
    if horizon == 0 {
        return Err(ForecastError::InvalidParameter(
            "forecast horizon must be at least one day".to_string(),
        ));
    }

    let (model, manifest) = load_model(config)?;
    let features = read_table(config.features_path())?;
    let rows = latest_rows(&features)?;

    let reconciler = Reconciler::new(manifest, encoding_source(config, rederive)?, &rows);
    let reconciled = reconciler.reconcile_all(&rows);

    let forecaster = IterativeForecaster::new(&model, reconciler.manifest());
    let results = forecaster.forecast_all(&reconciled, horizon)?;
    ForecastTable::new(horizon, results)
}

/// Forecast `horizon` days for every store and save `next_{N}day_preds.csv`
pub fn run_prediction(config: &PipelineConfig, horizon: usize, rederive: bool) -> Result<PathBuf> {
    let table = forecast(config, horizon, rederive)?;
    let output = config.forecast_path(horizon);
    table.write_csv(&output)?;
    Ok(output)
}

/// Run every stage in order
pub fn run_all(config: &PipelineConfig, horizon: usize) -> Result<PathBuf> {
    run_etl(config)?;
    run_features(config)?;
    run_training(config)?;
    run_prediction(config, horizon, false)
}
