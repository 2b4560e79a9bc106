//! Histogram bins for split search
//!
//! Each feature is bucketed once before boosting. Split search then scans
//! per-bin gradient sums instead of sorting raw values at every node.

use crate::error::{ForecastError, Result};
use serde::{Deserialize, Serialize};

/// Bin boundaries of one feature.
///
/// Bin `i` holds values `v` with `upper_bounds[i - 1] < v <= upper_bounds[i]`;
/// the last bin holds everything above the last bound. NaN falls in bin 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureBins {
    upper_bounds: Vec<f64>,
}

impl FeatureBins {
    /// Derive bins from the observed values of a feature
    pub fn fit(values: &[f64], max_bin: usize) -> Self {
        let mut distinct: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
        distinct.sort_by(|a, b| a.total_cmp(b));
        distinct.dedup();

        let upper_bounds = if distinct.len() <= 1 {
            Vec::new()
        } else if distinct.len() <= max_bin {
            distinct.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect()
        } else {
            // quantile cut points over the distinct values
            (1..max_bin)
                .map(|i| {
                    let idx = i * distinct.len() / max_bin;
                    (distinct[idx - 1] + distinct[idx]) / 2.0
                })
                .collect()
        };

        Self { upper_bounds }
    }

    /// Number of bins
    pub fn n_bins(&self) -> usize {
        self.upper_bounds.len() + 1
    }

    /// Bin of a value
    pub fn bin(&self, value: f64) -> usize {
        if value.is_nan() {
            return 0;
        }
        self.upper_bounds.partition_point(|&bound| bound < value)
    }

    /// Split threshold that sends bins `0..=bin` left
    pub fn threshold(&self, bin: usize) -> f64 {
        self.upper_bounds[bin]
    }
}

/// Feature matrix stored column-wise as bin indices
#[derive(Debug, Clone)]
pub struct BinnedMatrix {
    n_rows: usize,
    columns: Vec<Vec<u16>>,
}

impl BinnedMatrix {
    /// Bin every row of a row-major matrix
    pub fn new(rows: &[Vec<f64>], bins: &[FeatureBins]) -> Result<Self> {
        let mut columns = Vec::with_capacity(bins.len());
        for (feature, feature_bins) in bins.iter().enumerate() {
            if feature_bins.n_bins() > u16::MAX as usize + 1 {
                return Err(ForecastError::InvalidParameter(format!(
                    "feature {} has {} bins, at most {} are supported",
                    feature,
                    feature_bins.n_bins(),
                    u16::MAX as usize + 1
                )));
            }
            columns.push(
                rows.iter()
                    .map(|row| feature_bins.bin(row[feature]) as u16)
                    .collect(),
            );
        }

        Ok(Self {
            n_rows: rows.len(),
            columns,
        })
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_features(&self) -> usize {
        self.columns.len()
    }

    /// Bin indices of one feature for every row
    pub fn column(&self, feature: usize) -> &[u16] {
        &self.columns[feature]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_few_distinct_values() {
        let bins = FeatureBins::fit(&[3.0, 1.0, 2.0, 1.0, f64::NAN], 255);
        assert_eq!(bins.n_bins(), 3);
        assert_eq!(bins.threshold(0), 1.5);
        assert_eq!(bins.threshold(1), 2.5);

        assert_eq!(bins.bin(1.0), 0);
        assert_eq!(bins.bin(1.5), 0);
        assert_eq!(bins.bin(2.0), 1);
        assert_eq!(bins.bin(100.0), 2);
        assert_eq!(bins.bin(f64::NAN), 0);
    }

    #[test]
    fn test_fit_constant_feature() {
        let bins = FeatureBins::fit(&[4.0, 4.0, 4.0], 255);
        assert_eq!(bins.n_bins(), 1);
        assert_eq!(bins.bin(4.0), 0);
        assert_eq!(bins.bin(-1.0), 0);
    }

    #[test]
    fn test_fit_caps_bin_count() {
        let values: Vec<f64> = (0..1000).map(f64::from).collect();
        let bins = FeatureBins::fit(&values, 16);
        assert_eq!(bins.n_bins(), 16);

        // bins are monotone in the value
        let mut last = 0;
        for v in &values {
            let b = bins.bin(*v);
            assert!(b >= last);
            last = b;
        }
        assert_eq!(last, 15);
    }

    #[test]
    fn test_bin_agrees_with_threshold() {
        let values = vec![0.0, 1.0, 5.0, 9.0];
        let bins = FeatureBins::fit(&values, 255);
        for split in 0..bins.n_bins() - 1 {
            let threshold = bins.threshold(split);
            for v in &values {
                assert_eq!(bins.bin(*v) <= split, *v <= threshold);
            }
        }
    }

    #[test]
    fn test_binned_matrix() {
        let rows = vec![vec![1.0, 10.0], vec![2.0, 10.0], vec![3.0, 20.0]];
        let bins: Vec<FeatureBins> = (0..2)
            .map(|j| {
                let column: Vec<f64> = rows.iter().map(|r| r[j]).collect();
                FeatureBins::fit(&column, 255)
            })
            .collect();

        let matrix = BinnedMatrix::new(&rows, &bins).unwrap();
        assert_eq!(matrix.n_rows(), 3);
        assert_eq!(matrix.n_features(), 2);
        assert_eq!(matrix.column(0), &[0, 1, 2]);
        assert_eq!(matrix.column(1), &[0, 0, 1]);
    }
}
