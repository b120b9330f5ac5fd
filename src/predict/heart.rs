//! Heart pipeline: cardiac indices and segment thickness → classifier → explanation.

use super::classify::classify;
use super::explain::explain_heart;
use super::PredictionResult;
use crate::error::Result;
use crate::features::HeartFeatures;
use crate::model::ClassifierBundle;
use std::collections::BTreeMap;

/// Classify extracted heart features; segment scores ride along unchanged.
pub fn predict_heart(
    bundle: &ClassifierBundle,
    features: &HeartFeatures,
    class_name_map: Option<&BTreeMap<String, String>>,
    want_xai: bool,
) -> Result<PredictionResult> {
    let outcome = classify(bundle, &features.features, class_name_map)?;
    let xai = want_xai.then(|| explain_heart(bundle));

    Ok(PredictionResult {
        prediction: outcome.prediction,
        proba: outcome.proba,
        used_features: bundle.x_cols().to_vec(),
        xai,
        icv_mm3: None,
        top_regions: None,
        segment_scores: Some(features.segment_scores.clone()),
    })
}
