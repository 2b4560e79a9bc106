//! Gradient-boosted regression trees
//!
//! Squared-error boosting: start from the mean target, then repeatedly fit a
//! leaf-wise tree to the current residuals and add its shrunken output.
//! Feature values are bucketed into histogram bins once, up front.
//!
//! ```no_run
//! use storecast::models::{GbmParams, GbmRegressor, Regressor};
//!
//! let rows = vec![vec![1.0], vec![2.0], vec![3.0]];
//! let target = vec![10.0, 20.0, 30.0];
//! let params = GbmParams { min_data_in_leaf: 1, ..GbmParams::default() };
//! let model = GbmRegressor::fit(&rows, &target, vec!["x".to_string()], &params)?;
//! let estimate = model.predict(&[2.0])?;
//! # Ok::<(), storecast::ForecastError>(())
//! ```

use crate::data::write_atomically;
use crate::error::{ForecastError, Result};
use crate::models::binning::{BinnedMatrix, FeatureBins};
use crate::models::tree::{RegressionTree, TreeGrower, TreeParams};
use crate::models::{check_width, Regressor};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

/// Boosting parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GbmParams {
    /// Shrinkage applied to every tree's output
    pub learning_rate: f64,
    /// Maximum leaves per tree
    pub num_leaves: usize,
    /// Number of boosting rounds
    pub n_estimators: usize,
    /// Minimum rows on each side of a split
    pub min_data_in_leaf: usize,
    /// Maximum histogram bins per feature
    pub max_bin: usize,
    /// L2 penalty on leaf values
    pub lambda_l2: f64,
    /// Fraction of rows sampled for each round, 1.0 uses every row
    pub bagging_fraction: f64,
    /// Seed of the row sampler
    pub seed: u64,
}

impl Default for GbmParams {
    fn default() -> Self {
        Self {
            learning_rate: 0.05,
            num_leaves: 64,
            n_estimators: 300,
            min_data_in_leaf: 20,
            max_bin: 255,
            lambda_l2: 0.0,
            bagging_fraction: 1.0,
            seed: 42,
        }
    }
}

impl GbmParams {
    /// Check parameter ranges
    pub fn validate(&self) -> Result<()> {
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(ForecastError::InvalidParameter(
                "learning_rate must be positive".to_string(),
            ));
        }
        if self.num_leaves < 1 {
            return Err(ForecastError::InvalidParameter(
                "num_leaves must be at least 1".to_string(),
            ));
        }
        if self.max_bin < 2 || self.max_bin > u16::MAX as usize + 1 {
            return Err(ForecastError::InvalidParameter(format!(
                "max_bin must be between 2 and {}",
                u16::MAX as usize + 1
            )));
        }
        if self.lambda_l2 < 0.0 {
            return Err(ForecastError::InvalidParameter(
                "lambda_l2 must not be negative".to_string(),
            ));
        }
        if !(self.bagging_fraction > 0.0 && self.bagging_fraction <= 1.0) {
            return Err(ForecastError::InvalidParameter(
                "bagging_fraction must be in (0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}

/// Trained gradient-boosted tree ensemble
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GbmRegressor {
    feature_names: Vec<String>,
    base_score: f64,
    trees: Vec<RegressionTree>,
    params: GbmParams,
}

impl GbmRegressor {
    /// Fit an ensemble on row-major `rows` against `target`
    pub fn fit(
        rows: &[Vec<f64>],
        target: &[f64],
        feature_names: Vec<String>,
        params: &GbmParams,
    ) -> Result<Self> {
        params.validate()?;
        if rows.is_empty() {
            return Err(ForecastError::DataError(
                "Cannot fit a model on zero rows".to_string(),
            ));
        }
        if rows.len() != target.len() {
            return Err(ForecastError::ValidationError(format!(
                "Row count ({}) doesn't match target length ({})",
                rows.len(),
                target.len()
            )));
        }
        let n_features = feature_names.len();
        if let Some(row) = rows.iter().find(|r| r.len() != n_features) {
            return Err(ForecastError::ValidationError(format!(
                "Row width ({}) doesn't match feature count ({})",
                row.len(),
                n_features
            )));
        }
        if target.iter().any(|y| !y.is_finite()) {
            return Err(ForecastError::DataError(
                "Target contains non-finite values".to_string(),
            ));
        }

        let bins: Vec<FeatureBins> = (0..n_features)
            .map(|j| {
                let column: Vec<f64> = rows.iter().map(|r| r[j]).collect();
                FeatureBins::fit(&column, params.max_bin)
            })
            .collect();
        let binned = BinnedMatrix::new(rows, &bins)?;
        let grower = TreeGrower::new(
            &binned,
            &bins,
            TreeParams {
                num_leaves: params.num_leaves,
                min_data_in_leaf: params.min_data_in_leaf,
                lambda_l2: params.lambda_l2,
                learning_rate: params.learning_rate,
            },
        );

        let n = target.len();
        let base_score = target.iter().sum::<f64>() / n as f64;
        let mut fitted = vec![base_score; n];
        let mut rng = StdRng::seed_from_u64(params.seed);
        let mut trees = Vec::with_capacity(params.n_estimators);

        info!(
            rows = n,
            features = n_features,
            rounds = params.n_estimators,
            "fitting gradient boosted trees"
        );

        for round in 0..params.n_estimators {
            let residuals: Vec<f64> = target.iter().zip(&fitted).map(|(y, f)| y - f).collect();
            let sample: Vec<usize> = if params.bagging_fraction < 1.0 {
                (0..n)
                    .filter(|_| rng.gen::<f64>() < params.bagging_fraction)
                    .collect()
            } else {
                (0..n).collect()
            };

            let tree = grower.grow(sample, &residuals);
            for (row, value) in rows.iter().zip(fitted.iter_mut()) {
                *value += tree.predict(row);
            }

            if (round + 1) % 50 == 0 {
                let mse = residuals.iter().map(|r| r * r).sum::<f64>() / n as f64;
                debug!(round = round + 1, train_rmse = mse.sqrt(), "boosting progress");
            }
            trees.push(tree);
        }

        Ok(Self {
            feature_names,
            base_score,
            trees,
            params: params.clone(),
        })
    }

    /// Feature names in training order
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn num_features(&self) -> usize {
        self.feature_names.len()
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn base_score(&self) -> f64 {
        self.base_score
    }

    pub fn params(&self) -> &GbmParams {
        &self.params
    }

    /// Write the model as JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string(self)?;
        write_atomically(path.as_ref(), |file| {
            file.write_all(json.as_bytes())?;
            Ok(())
        })
    }

    /// Read a model written by [`GbmRegressor::save`]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ForecastError::MissingArtifact(path.to_path_buf()));
        }
        let text = fs::read_to_string(path).map_err(|e| {
            ForecastError::SchemaError(format!("cannot read model {}: {}", path.display(), e))
        })?;
        let model: Self = serde_json::from_str(&text).map_err(|e| {
            ForecastError::SchemaError(format!(
                "cannot load model from {}: {}",
                path.display(),
                e
            ))
        })?;

        if let Some(feature) = model.trees.iter().filter_map(RegressionTree::max_feature).max() {
            if feature >= model.num_features() {
                return Err(ForecastError::SchemaError(format!(
                    "model splits on feature {} but declares {} features",
                    feature,
                    model.num_features()
                )));
            }
        }
        Ok(model)
    }
}

impl Regressor for GbmRegressor {
    fn predict(&self, features: &[f64]) -> Result<f64> {
        check_width(self.num_features(), features)?;
        Ok(self.base_score + self.trees.iter().map(|t| t.predict(features)).sum::<f64>())
    }
}
