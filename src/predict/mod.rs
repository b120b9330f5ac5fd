//! Prediction orchestration: align features, run the classifier, reconcile its
//! output with the declared classes and attach explanations.

pub mod brain;
pub mod classify;
pub mod explain;
pub mod heart;
pub mod labels;

pub use brain::predict_brain;
pub use classify::{align_features, classify, reconcile_probabilities, Classification};
pub use explain::{BRAIN_TOP_K, HEART_TOP_K};
pub use heart::predict_heart;
pub use labels::{friendly_name, looks_binary};

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::collections::BTreeMap;

/// Class name → probability, in declared class order.
///
/// Two raw classes mapping to the same friendly name share one entry; the later
/// probability wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassProbabilities(Vec<(String, f64)>);

impl ClassProbabilities {
    pub fn insert(&mut self, name: String, p: f64) {
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = p,
            None => self.0.push((name, p)),
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.iter().find(|(n, _)| n == name).map(|&(_, p)| p)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(n, p)| (n.as_str(), *p))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.0.iter().map(|(_, p)| p).sum()
    }
}

impl Serialize for ClassProbabilities {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, p) in &self.0 {
            map.serialize_entry(name, p)?;
        }
        map.end()
    }
}

/// One ranked region in an explanation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionScore {
    /// LUT label id (brain) or AHA zone id (heart); `None` for non-region columns.
    pub label_id: Option<i32>,
    pub label_name: String,
    pub score: f64,
}

/// Strategy that produced an explanation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum XaiMethod {
    FeatureImportance,
    NormalizedVolumeFallback,
    Gain,
    Coefficient,
    None,
}

/// Explainability payload. `top_regions` is absent only for [`XaiMethod::None`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct XaiReport {
    pub method: XaiMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_regions: Option<Vec<RegionScore>>,
}

impl XaiReport {
    pub fn ranked(method: XaiMethod, top_regions: Vec<RegionScore>) -> Self {
        Self {
            method,
            top_regions: Some(top_regions),
        }
    }

    /// Marker returned when no strategy could explain the prediction.
    pub fn none() -> Self {
        Self {
            method: XaiMethod::None,
            top_regions: None,
        }
    }
}

/// Structured result handed back to the request boundary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    /// Friendly predicted label.
    pub prediction: String,
    pub proba: ClassProbabilities,
    /// Columns fed to the classifier, in order.
    pub used_features: Vec<String>,
    /// Present when explanations were requested.
    pub xai: Option<XaiReport>,
    /// Brain only: total region volume.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icv_mm3: Option<f64>,
    /// Brain only: volume-ranked regions, always computed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_regions: Option<Vec<RegionScore>>,
    /// Heart only: AHA zone id → abnormality score.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segment_scores: Option<BTreeMap<u8, f64>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_probabilities_keep_order_and_merge() {
        let mut proba = ClassProbabilities::default();
        proba.insert("NOR".into(), 0.2);
        proba.insert("DCM".into(), 0.5);
        proba.insert("NOR".into(), 0.3);
        assert_eq!(proba.len(), 2);
        assert_eq!(proba.get("NOR"), Some(0.3));
        assert_eq!(serde_json::to_string(&proba).unwrap(), r#"{"NOR":0.3,"DCM":0.5}"#);
    }

    #[test]
    fn test_none_marker_serialization() {
        assert_eq!(serde_json::to_value(XaiReport::none()).unwrap(), json!({"method": "none"}));
        let ranked = XaiReport::ranked(
            XaiMethod::NormalizedVolumeFallback,
            vec![RegionScore {
                label_id: Some(3),
                label_name: "Left-Thalamus".into(),
                score: 0.25,
            }],
        );
        assert_eq!(
            serde_json::to_value(ranked).unwrap(),
            json!({
                "method": "normalized_volume_fallback",
                "top_regions": [{"label_id": 3, "label_name": "Left-Thalamus", "score": 0.25}]
            })
        );
    }

    #[test]
    fn test_result_omits_other_organ_fields() {
        let mut proba = ClassProbabilities::default();
        proba.insert("CN".into(), 1.0);
        let result = PredictionResult {
            prediction: "CN".into(),
            proba,
            used_features: vec!["vol_1".into()],
            xai: None,
            icv_mm3: None,
            top_regions: None,
            segment_scores: Some(BTreeMap::from([(1, 0.5), (10, 0.25)])),
        };
        let value = serde_json::to_value(result).unwrap();
        assert_eq!(value["xai"], serde_json::Value::Null);
        assert_eq!(value["segment_scores"], json!({"1": 0.5, "10": 0.25}));
        assert!(value.get("icv_mm3").is_none());
    }
}
