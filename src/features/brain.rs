//! Brain region-volume features.

use super::FeatureVector;
use crate::lut::LabelTable;
use crate::nifti::LabelVolume;

const VOLUME_PREFIX: &str = "vol_";

/// Region volumes and their total.
#[derive(Debug, Clone, PartialEq)]
pub struct BrainFeatures {
    /// `vol_<id>` → mm³, one entry per LUT id in ascending order.
    pub features: FeatureVector,
    /// Sum of all region volumes (intracranial volume proxy), mm³.
    pub icv_mm3: f64,
}

/// Feature name for a label's volume.
pub fn volume_feature_name(label_id: i32) -> String {
    format!("{VOLUME_PREFIX}{label_id}")
}

/// Label id encoded in a `vol_<id>` feature name.
pub fn label_id_from_feature(name: &str) -> Option<i32> {
    name.strip_prefix(VOLUME_PREFIX)?.parse().ok()
}

/// Compute the volume of every LUT region present in (or absent from) the mask.
pub fn extract_brain_features(volume: &LabelVolume, lut: &LabelTable) -> BrainFeatures {
    let voxel_mm3 = volume.voxel_volume();
    let counts = volume.histogram();

    let mut features = FeatureVector::with_capacity(lut.len());
    let mut icv_mm3 = 0.0;
    for id in lut.ids() {
        let count = counts.get(&id).copied().unwrap_or(0);
        let mm3 = count as f64 * voxel_mm3;
        features.insert(volume_feature_name(id), mm3);
        icv_mm3 += mm3;
    }

    tracing::debug!(regions = features.len(), icv_mm3, "extracted brain features");
    BrainFeatures { features, icv_mm3 }
}
