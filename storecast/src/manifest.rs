//! Ordered list of the features a model was trained on

use crate::data::{write_atomically, STORE_COLUMN};
use crate::error::{ForecastError, Result};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Feature names in the positional order the regressor consumes them.
///
/// The entity identifier is metadata and never part of a manifest, even when
/// it is listed in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureManifest {
    names: Vec<String>,
}

impl FeatureManifest {
    /// Build a manifest, dropping the entity identifier
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut kept: Vec<String> = Vec::new();
        for name in names {
            let name = name.into();
            if name == STORE_COLUMN {
                continue;
            }
            if kept.contains(&name) {
                return Err(ForecastError::SchemaError(format!(
                    "feature '{}' is listed twice",
                    name
                )));
            }
            kept.push(name);
        }

        if kept.is_empty() {
            return Err(ForecastError::SchemaError(
                "feature manifest is empty".to_string(),
            ));
        }
        Ok(Self { names: kept })
    }

    /// Read a manifest, one name per line. Blank lines are ignored.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ForecastError::MissingArtifact(path.to_path_buf()));
        }
        let text = fs::read_to_string(path).map_err(|e| {
            ForecastError::SchemaError(format!(
                "cannot read feature manifest {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::new(
            text.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty()),
        )
    }

    /// Write one name per line
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_atomically(path.as_ref(), |file| {
            for name in &self.names {
                writeln!(file, "{}", name)?;
            }
            Ok(())
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Position of a feature in the model input
    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }
}
