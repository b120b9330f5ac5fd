//! Brain pipeline: region volumes → classifier → explanation.

use super::classify::classify;
use super::explain::{explain_brain, volume_ranking, BRAIN_TOP_K};
use super::PredictionResult;
use crate::error::Result;
use crate::features::BrainFeatures;
use crate::lut::LabelTable;
use crate::model::ClassifierBundle;
use std::collections::BTreeMap;

/// Classify extracted brain features.
///
/// Volume-ranked `top_regions` are always reported; `xai` only when requested.
pub fn predict_brain(
    bundle: &ClassifierBundle,
    features: &BrainFeatures,
    lut: &LabelTable,
    class_name_map: Option<&BTreeMap<String, String>>,
    want_xai: bool,
) -> Result<PredictionResult> {
    let outcome = classify(bundle, &features.features, class_name_map)?;
    let xai = want_xai.then(|| explain_brain(bundle, features, lut));

    Ok(PredictionResult {
        prediction: outcome.prediction,
        proba: outcome.proba,
        used_features: bundle.x_cols().to_vec(),
        xai,
        icv_mm3: Some(features.icv_mm3),
        top_regions: Some(volume_ranking(features, lut, BRAIN_TOP_K)),
        segment_scores: None,
    })
}
