//! Explainability as ordered fallback chains.
//!
//! Each organ has a list of strategies tried in order; the first one that can
//! explain the prediction wins. A strategy declines by returning `None`, and when
//! every strategy declines the result is the `{"method": "none"}` marker. Nothing
//! here returns an error.

use super::{RegionScore, XaiMethod, XaiReport};
use crate::features::{label_id_from_feature, segment_id_from_feature, BrainFeatures};
use crate::lut::LabelTable;
use crate::model::{ClassifierBundle, ImportanceSource};

/// Regions reported for brain predictions.
pub const BRAIN_TOP_K: usize = 10;
/// Columns inspected for heart predictions.
pub const HEART_TOP_K: usize = 16;

const ICV_FLOOR: f64 = 1e-9;

struct BrainContext<'a> {
    bundle: &'a ClassifierBundle,
    features: &'a BrainFeatures,
    lut: &'a LabelTable,
}

type BrainStrategy = fn(&BrainContext<'_>) -> Option<XaiReport>;
type HeartStrategy = fn(&ClassifierBundle) -> Option<XaiReport>;

const BRAIN_STRATEGIES: [(&str, BrainStrategy); 2] = [
    ("feature_importance", brain_from_importances as BrainStrategy),
    ("normalized_volume", brain_from_volumes as BrainStrategy),
];

const HEART_STRATEGIES: [(&str, HeartStrategy); 1] = [("native_importance", heart_from_importances as HeartStrategy)];

/// Explain a brain prediction: native importances, else volume share of ICV.
pub fn explain_brain(bundle: &ClassifierBundle, features: &BrainFeatures, lut: &LabelTable) -> XaiReport {
    let ctx = BrainContext { bundle, features, lut };
    for (name, strategy) in BRAIN_STRATEGIES {
        if let Some(report) = strategy(&ctx) {
            return report;
        }
        tracing::warn!(strategy = name, "explanation strategy unavailable, falling back");
    }
    XaiReport::none()
}

/// Explain a heart prediction from native importances of AHA segment columns.
pub fn explain_heart(bundle: &ClassifierBundle) -> XaiReport {
    for (name, strategy) in HEART_STRATEGIES {
        if let Some(report) = strategy(bundle) {
            return report;
        }
        tracing::warn!(strategy = name, "explanation strategy unavailable, falling back");
    }
    XaiReport::none()
}

/// Native importances, if present, finite and one per declared column.
fn aligned_importances(bundle: &ClassifierBundle) -> Option<(ImportanceSource, Vec<f64>)> {
    let importances = bundle.model().importances()?;
    if importances.values.len() != bundle.x_cols().len() {
        tracing::warn!(
            importances = importances.values.len(),
            columns = bundle.x_cols().len(),
            "importance count does not match feature columns"
        );
        return None;
    }
    if importances.values.iter().any(|v| !v.is_finite()) {
        return None;
    }
    Some((importances.source, importances.values))
}

/// Column indices by descending `key(value)`; ties keep column order.
fn ranked_indices(values: &[f64], key: fn(f64) -> f64) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| key(values[b]).total_cmp(&key(values[a])));
    order
}

fn brain_from_importances(ctx: &BrainContext<'_>) -> Option<XaiReport> {
    let (_, importances) = aligned_importances(ctx.bundle)?;
    let columns = ctx.bundle.x_cols();
    let top = ranked_indices(&importances, f64::abs)
        .into_iter()
        .take(BRAIN_TOP_K)
        .map(|i| {
            let label_id = label_id_from_feature(&columns[i]);
            let label_name = label_id
                .and_then(|id| ctx.lut.get(id))
                .map_or_else(|| columns[i].clone(), str::to_string);
            RegionScore {
                label_id,
                label_name,
                score: importances[i],
            }
        })
        .collect();
    Some(XaiReport::ranked(XaiMethod::FeatureImportance, top))
}

fn brain_from_volumes(ctx: &BrainContext<'_>) -> Option<XaiReport> {
    Some(XaiReport::ranked(
        XaiMethod::NormalizedVolumeFallback,
        volume_ranking(ctx.features, ctx.lut, BRAIN_TOP_K),
    ))
}

/// Top `k` regions by share of the ICV proxy.
pub fn volume_ranking(features: &BrainFeatures, lut: &LabelTable, k: usize) -> Vec<RegionScore> {
    let mut items: Vec<(i32, f64)> = features
        .features
        .iter()
        .filter_map(|(name, mm3)| Some((label_id_from_feature(name)?, mm3 / (features.icv_mm3 + ICV_FLOOR))))
        .collect();
    items.sort_by(|a, b| b.1.total_cmp(&a.1));
    items
        .into_iter()
        .take(k)
        .map(|(id, score)| RegionScore {
            label_id: Some(id),
            label_name: lut
                .get(id)
                .map_or_else(|| format!("vol_{id}"), str::to_string),
            score,
        })
        .collect()
}

fn heart_from_importances(bundle: &ClassifierBundle) -> Option<XaiReport> {
    let (source, importances) = aligned_importances(bundle)?;
    let method = match source {
        ImportanceSource::Gain => XaiMethod::Gain,
        ImportanceSource::Coefficient => XaiMethod::Coefficient,
    };
    let columns = bundle.x_cols();
    let top = ranked_indices(&importances, f64::abs)
        .into_iter()
        .take(HEART_TOP_K)
        .filter_map(|i| {
            let zone = segment_id_from_feature(&columns[i])?;
            Some(RegionScore {
                label_id: Some(i32::from(zone)),
                label_name: format!("AHA{zone}"),
                score: importances[i],
            })
        })
        .collect();
    Some(XaiReport::ranked(method, top))
}
