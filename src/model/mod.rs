//! Trained classifiers and the artifacts that carry them.
//!
//! Every concrete model implements [`Classifier`]. Artifacts are JSON files whose
//! layout varies between producers; [`bundle`] resolves the layout once into a
//! [`ClassifierBundle`] and [`compat`] upgrades legacy model records before they
//! are deserialised. [`registry`] scans a model directory tree at startup.

pub mod bundle;
pub mod centroid;
pub mod compat;
pub mod linear;
pub mod registry;
pub mod scaler;
pub mod trees;

pub use bundle::{load_classifier_bundle, ClassifierBundle};
pub use centroid::NearestCentroid;
pub use linear::LogisticRegression;
pub use registry::{MaskInput, ModelRegistry, Pipeline, RegisteredModel};
pub use scaler::StandardScaler;
pub use trees::GradientBoostedTrees;

use crate::error::{Error, Result};
use serde::Deserialize;
use std::fmt::Debug;

/// Where a model's feature importances come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportanceSource {
    /// Average split gain per feature (tree ensembles).
    Gain,
    /// Mean absolute coefficient per feature (linear models).
    Coefficient,
}

/// Model-native importance per input column.
#[derive(Debug, Clone, PartialEq)]
pub struct Importances {
    pub source: ImportanceSource,
    pub values: Vec<f64>,
}

/// Capability contract every loaded model satisfies.
///
/// Only `predict` is mandatory. Models without calibrated outputs return `Ok(None)`
/// from `predict_proba`; models without native importances return `None`.
pub trait Classifier: Debug + Send + Sync {
    /// Class labels in output order.
    fn classes(&self) -> &[String];

    /// Hard decision for one aligned feature row.
    fn predict(&self, x: &[f64]) -> Result<String>;

    /// Class probabilities for one row, ordered like [`Classifier::classes`].
    fn predict_proba(&self, _x: &[f64]) -> Result<Option<Vec<f64>>> {
        Ok(None)
    }

    fn importances(&self) -> Option<Importances> {
        None
    }
}

/// Serialised model record, tagged by `kind`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelRecord {
    LogisticRegression(LogisticRegression),
    GradientBoostedTrees(GradientBoostedTrees),
    NearestCentroid(NearestCentroid),
}

impl ModelRecord {
    /// Check internal consistency and hand back the model behind the trait.
    pub fn build(self) -> Result<Box<dyn Classifier>> {
        Ok(match self {
            Self::LogisticRegression(m) => Box::new(m.validated()?),
            Self::GradientBoostedTrees(m) => Box::new(m.validated()?),
            Self::NearestCentroid(m) => Box::new(m.validated()?),
        })
    }
}

/// Reject a row whose width differs from what the model was trained on.
pub(crate) fn check_width(expected: usize, x: &[f64]) -> Result<()> {
    if x.len() != expected {
        return Err(Error::ClassifierInvocation(format!(
            "expected {expected} features, got {}",
            x.len()
        )));
    }
    Ok(())
}

/// Index of the largest value; ties and NaN resolve to the earliest index.
pub(crate) fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = i;
        }
    }
    best
}

/// Numerically stable softmax.
pub(crate) fn softmax(margins: &[f64]) -> Vec<f64> {
    let max = margins.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exp: Vec<f64> = margins.iter().map(|m| (m - max).exp()).collect();
    let total: f64 = exp.iter().sum();
    exp.into_iter().map(|e| e / total).collect()
}

/// Fail if a classifier produced a non-finite probability.
pub(crate) fn check_finite(proba: Vec<f64>) -> Result<Vec<f64>> {
    if proba.iter().any(|p| !p.is_finite()) {
        return Err(Error::ClassifierInvocation(
            "classifier produced non-finite probabilities".into(),
        ));
    }
    Ok(proba)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_argmax_prefers_first_tie() {
        assert_eq!(argmax(&[0.2, 0.4, 0.4]), 1);
        assert_eq!(argmax(&[0.0, 0.0]), 0);
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let p = softmax(&[1000.0, 1000.0, 998.0]);
        assert_abs_diff_eq!(p.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(p[0], p[1]);
    }

    #[test]
    fn test_model_record_is_tagged() {
        let parsed: ModelRecord = serde_json::from_str(
            r#"{"kind": "nearest_centroid", "classes": ["a", "b"], "centroids": [[0.0], [1.0]]}"#,
        )
        .unwrap();
        let model = parsed.build().unwrap();
        assert_eq!(model.classes(), &["a", "b"]);
        assert!(model.importances().is_none());
    }

    #[test]
    fn test_width_check() {
        assert!(check_width(2, &[1.0, 2.0]).is_ok());
        assert!(matches!(
            check_width(3, &[1.0]),
            Err(Error::ClassifierInvocation(_))
        ));
    }
}
