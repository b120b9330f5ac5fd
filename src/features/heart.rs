//! Cardiac function and AHA segment wall-thickness features.
//!
//! Mask labels: 0 background, 1 left ventricle, 2 right ventricle, 3 LV myocardium.
//! Segment thickness is a distance-to-boundary proxy inside the myocardium,
//! summarised per AHA zone at end-diastole (ED) and end-systole (ES).

use super::distance::euclidean_distance_transform;
use super::stats::{iqr, median, sigmoid};
use super::FeatureVector;
use crate::aha::{self, ZONE_COUNT};
use crate::error::{Error, Result};
use crate::nifti::voxel_volume;
use ndarray::Array3;
use std::collections::BTreeMap;

pub const LV_LABEL: i32 = 1;
pub const RV_LABEL: i32 = 2;
pub const MYOCARDIUM_LABEL: i32 = 3;

/// Voxel spacing assumed for cardiac masks, in mm.
pub const DEFAULT_HEART_SPACING: [f64; 3] = [1.5, 1.5, 2.0];

/// Myocardial tissue density, g/mL.
const MYOCARDIUM_DENSITY: f64 = 1.05;
const EF_DENOMINATOR_FLOOR: f64 = 1e-6;
const IQR_FLOOR: f64 = 1e-6;

/// Output of [`extract_heart_features`].
#[derive(Debug, Clone, PartialEq)]
pub struct HeartFeatures {
    /// Global indices followed by `SEG<id>_thkED`, `SEG<id>_thkES`, `SEG<id>_dThk`.
    pub features: FeatureVector,
    /// Zone id (1..=16) → within-case abnormality score in `[0, 1]`.
    pub segment_scores: BTreeMap<u8, f64>,
}

/// AHA zone id encoded in a `SEG<id>_...` feature name.
pub fn segment_id_from_feature(name: &str) -> Option<u8> {
    let (prefix, suffix) = name.split_once('_')?;
    if !matches!(suffix, "thkED" | "thkES" | "dThk") {
        return None;
    }
    let id: u8 = prefix.strip_prefix("SEG")?.parse().ok()?;
    (1..=ZONE_COUNT).contains(&id).then_some(id)
}

struct LabelVolumesMm3 {
    lv: f64,
    rv: f64,
    myocardium: f64,
}

fn label_volumes(mask: &Array3<i32>, spacing: [f64; 3]) -> LabelVolumesMm3 {
    let (mut lv, mut rv, mut myo) = (0usize, 0usize, 0usize);
    for &v in mask {
        match v {
            LV_LABEL => lv += 1,
            RV_LABEL => rv += 1,
            MYOCARDIUM_LABEL => myo += 1,
            _ => {}
        }
    }
    let vx = voxel_volume(spacing);
    LabelVolumesMm3 {
        lv: lv as f64 * vx,
        rv: rv as f64 * vx,
        myocardium: myo as f64 * vx,
    }
}

/// Thickness proxy per voxel: distance from each myocardium voxel to the nearest
/// non-myocardium voxel. Degrades to zero thickness when no boundary exists.
fn wall_thickness(mask: &Array3<i32>) -> Array3<f64> {
    let myocardium = mask.mapv(|v| v == MYOCARDIUM_LABEL);
    match euclidean_distance_transform(&myocardium) {
        Some(thickness) => thickness,
        None => {
            tracing::warn!("distance transform unavailable, using zero wall thickness");
            Array3::zeros(mask.dim())
        }
    }
}

/// Median thickness over myocardium voxels of every zone; empty zones give 0.
fn zone_medians(mask: &Array3<i32>, thickness: &Array3<f64>, zone_ids: &Array3<u8>) -> Vec<f64> {
    let mut per_zone: Vec<Vec<f64>> = vec![Vec::new(); ZONE_COUNT as usize];
    for ((&zone, &label), &t) in zone_ids.iter().zip(mask.iter()).zip(thickness.iter()) {
        if zone != 0 && label == MYOCARDIUM_LABEL {
            per_zone[zone as usize - 1].push(t);
        }
    }
    per_zone
        .iter()
        .map(|values| median(values).unwrap_or(0.0))
        .collect()
}

/// Robust z-score of each value against the sample median and IQR.
fn robust_z(values: &[f64]) -> Vec<f64> {
    let center = median(values).unwrap_or(0.0);
    let spread = iqr(values).unwrap_or(0.0) + IQR_FLOOR;
    values.iter().map(|v| (v - center) / spread).collect()
}

/// Extract cardiac features from an ED/ES mask pair sharing one grid.
pub fn extract_heart_features(
    ed: &Array3<i32>,
    es: &Array3<i32>,
    spacing: [f64; 3],
) -> Result<HeartFeatures> {
    if ed.dim() != es.dim() {
        return Err(Error::ShapeMismatch(format!(
            "ED mask {:?} and ES mask {:?} differ",
            ed.dim(),
            es.dim()
        )));
    }

    let at_ed = label_volumes(ed, spacing);
    let at_es = label_volumes(es, spacing);
    let lvef = (at_ed.lv - at_es.lv) / at_ed.lv.max(EF_DENOMINATOR_FLOOR);
    let rvef = (at_ed.rv - at_es.rv) / at_ed.rv.max(EF_DENOMINATOR_FLOOR);
    let lv_mass_g = (at_ed.myocardium / 1000.0) * MYOCARDIUM_DENSITY;

    let mut features = FeatureVector::with_capacity(7 + 3 * ZONE_COUNT as usize);
    features.insert("LVEDV", at_ed.lv / 1000.0);
    features.insert("LVESV", at_es.lv / 1000.0);
    features.insert("LVEF", lvef);
    features.insert("RVEDV", at_ed.rv / 1000.0);
    features.insert("RVESV", at_es.rv / 1000.0);
    features.insert("RVEF", rvef);
    features.insert("LVMass", lv_mass_g);

    let (d, h, w) = ed.dim();
    let zones = aha::zones_for_shape(d, h, w);
    let thk_ed = zone_medians(ed, &wall_thickness(ed), zones.zone_ids());
    let thk_es = zone_medians(es, &wall_thickness(es), zones.zone_ids());
    let delta: Vec<f64> = thk_es.iter().zip(&thk_ed).map(|(s, e)| s - e).collect();

    for (i, zone) in (1..=ZONE_COUNT).enumerate() {
        features.insert(format!("SEG{zone}_thkED"), thk_ed[i]);
        features.insert(format!("SEG{zone}_thkES"), thk_es[i]);
        features.insert(format!("SEG{zone}_dThk"), delta[i]);
    }

    let z_ed = robust_z(&thk_ed);
    let z_delta = robust_z(&delta);
    let segment_scores = (1..=ZONE_COUNT)
        .zip(z_ed.iter().zip(&z_delta))
        .map(|(zone, (&ze, &zd))| {
            let score = 0.5 * sigmoid(ze) + 0.5 * (1.0 - sigmoid(zd));
            (zone, score.clamp(0.0, 1.0))
        })
        .collect();

    tracing::debug!(lvef, rvef, lv_mass_g, "extracted heart features");
    Ok(HeartFeatures {
        features,
        segment_scores,
    })
}
