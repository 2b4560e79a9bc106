//! Rolling-window calculations
//!
//! Series are slices of `Option<f64>` so that gaps produced by shifting
//! (or missing source values) propagate instead of being silently zeroed.
//! Callers decide how to fill the gaps afterwards.

use crate::{MathError, Result};
use std::collections::VecDeque;

/// Streaming mean over the last `window` observations.
///
/// The mean is only defined once `window` observations have been seen and
/// none of the observations currently inside the window is missing.
#[derive(Debug, Clone)]
pub struct RollingMean {
    window: usize,
    values: VecDeque<Option<f64>>,
    sum: f64,
    missing: usize,
}

impl RollingMean {
    /// Create a new rolling mean with the specified window
    pub fn new(window: usize) -> Result<Self> {
        if window == 0 {
            return Err(MathError::InvalidInput(
                "Window must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            window,
            values: VecDeque::with_capacity(window + 1),
            sum: 0.0,
            missing: 0,
        })
    }

    /// Push the next observation and return the mean of the current window
    pub fn update(&mut self, value: Option<f64>) -> Option<f64> {
        self.values.push_back(value);
        match value {
            Some(v) => self.sum += v,
            None => self.missing += 1,
        }

        if self.values.len() > self.window {
            match self.values.pop_front() {
                Some(Some(old)) => self.sum -= old,
                Some(None) => self.missing -= 1,
                None => {}
            }
        }

        self.value()
    }

    /// Mean of the current window, if fully populated
    pub fn value(&self) -> Option<f64> {
        if self.values.len() < self.window || self.missing > 0 {
            return None;
        }
        Some(self.sum / self.window as f64)
    }

    /// Window length
    pub fn window(&self) -> usize {
        self.window
    }

    /// Clear all observations
    pub fn reset(&mut self) {
        self.values.clear();
        self.sum = 0.0;
        self.missing = 0;
    }
}

/// Rolling mean ending at every position of `values`.
pub fn rolling_mean(values: &[Option<f64>], window: usize) -> Result<Vec<Option<f64>>> {
    let mut mean = RollingMean::new(window)?;
    Ok(values.iter().map(|&v| mean.update(v)).collect())
}

/// Fold a new observation into a `window`-long mean without the history.
///
/// `(old_mean * (window - 1) + value) / window`. This approximates sliding
/// the window forward: the dropped observation is assumed to equal the mean.
pub fn recursive_window_update(old_mean: f64, value: f64, window: usize) -> Result<f64> {
    if window == 0 {
        return Err(MathError::InvalidInput(
            "Window must be greater than zero".to_string(),
        ));
    }
    let k = window as f64;
    Ok((old_mean * (k - 1.0) + value) / k)
}
