//! Feature alignment, classifier invocation and probability reconciliation.

use super::labels::friendly_name;
use super::ClassProbabilities;
use crate::error::Result;
use crate::features::FeatureVector;
use crate::model::{argmax, ClassifierBundle};
use std::collections::BTreeMap;

/// Values in `columns` order; columns the extractor did not produce become 0.0.
pub fn align_features(features: &FeatureVector, columns: &[String]) -> Vec<f64> {
    let mut missing = 0usize;
    let row: Vec<f64> = columns
        .iter()
        .map(|col| {
            features.get(col).unwrap_or_else(|| {
                missing += 1;
                0.0
            })
        })
        .collect();
    if missing > 0 {
        tracing::debug!(missing, columns = columns.len(), "zero-filled absent feature columns");
    }
    row
}

/// Fit `proba` to `n` declared classes (zero-pad or truncate) and renormalise.
///
/// A vector summing to zero is returned as-is.
pub fn reconcile_probabilities(mut proba: Vec<f64>, n: usize) -> Vec<f64> {
    if proba.len() != n {
        tracing::warn!(
            produced = proba.len(),
            declared = n,
            "classifier output length differs from declared classes"
        );
    }
    proba.resize(n, 0.0);
    let total: f64 = proba.iter().sum();
    if total != 0.0 {
        proba.iter_mut().for_each(|p| *p /= total);
    }
    proba
}

/// Distribution putting all mass on `label`; all zeros when it is not declared.
fn one_hot(label: &str, classes: &[String]) -> Vec<f64> {
    classes
        .iter()
        .map(|c| if c == label { 1.0 } else { 0.0 })
        .collect()
}

/// Outcome of one classifier call, before explanations.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// Declared class label chosen by the classifier.
    pub raw_label: String,
    /// Friendly name of `raw_label`.
    pub prediction: String,
    pub proba: ClassProbabilities,
}

/// Align, scale and classify one feature vector.
///
/// Classifier failures propagate as [`crate::Error::ClassifierInvocation`].
pub fn classify(
    bundle: &ClassifierBundle,
    features: &FeatureVector,
    class_name_map: Option<&BTreeMap<String, String>>,
) -> Result<Classification> {
    let declared = bundle.classes();
    let mut x = align_features(features, bundle.x_cols());
    if let Some(scaler) = bundle.scaler() {
        x = scaler.transform(&x)?;
    }

    let model = bundle.model();
    let (raw_label, proba) = match model.predict_proba(&x)? {
        Some(proba) => {
            let proba = reconcile_probabilities(proba, declared.len());
            (declared[argmax(&proba)].clone(), proba)
        }
        None => {
            let raw = model.predict(&x)?;
            let proba = one_hot(&raw, declared);
            (raw, proba)
        }
    };

    let mut named = ClassProbabilities::default();
    for (class, p) in declared.iter().zip(proba) {
        named.insert(friendly_name(class, class_name_map, declared), p);
    }
    let prediction = friendly_name(&raw_label, class_name_map, declared);
    tracing::debug!(%raw_label, %prediction, "classified");

    Ok(Classification {
        raw_label,
        prediction,
        proba: named,
    })
}
