//! Per-column standardisation applied between alignment and the classifier.

use crate::error::{Error, Result};
use serde::Deserialize;

/// `(x - mean) / scale` per column. Zero scales are treated as 1.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StandardScaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl StandardScaler {
    pub fn new(mean: Vec<f64>, scale: Vec<f64>) -> Result<Self> {
        Self { mean, scale }.validated()
    }

    pub(crate) fn validated(self) -> Result<Self> {
        if self.mean.len() != self.scale.len() {
            return Err(Error::Artifact(format!(
                "scaler has {} means but {} scales",
                self.mean.len(),
                self.scale.len()
            )));
        }
        Ok(self)
    }

    /// Number of columns the scaler was fitted on.
    pub fn width(&self) -> usize {
        self.mean.len()
    }

    pub fn transform(&self, x: &[f64]) -> Result<Vec<f64>> {
        if x.len() != self.width() {
            return Err(Error::ClassifierInvocation(format!(
                "scaler expects {} features, got {}",
                self.width(),
                x.len()
            )));
        }
        Ok(x.iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(v, (m, s))| {
                let s = if *s == 0.0 { 1.0 } else { *s };
                (v - m) / s
            })
            .collect())
    }
}
