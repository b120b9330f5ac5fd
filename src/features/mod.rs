//! Feature extraction from label volumes.
//!
//! Extractors turn decoded masks into named numeric features in a fixed order:
//! per-region volumes for the brain, ventricular volumes, ejection fractions,
//! myocardial mass and AHA segment wall thickness for the heart.

pub mod brain;
pub mod distance;
pub mod heart;
pub mod stats;

pub use brain::{extract_brain_features, label_id_from_feature, BrainFeatures};
pub use heart::{extract_heart_features, segment_id_from_feature, HeartFeatures};

use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::HashMap;

/// Ordered mapping from feature name to value.
///
/// Insertion order is preserved; re-inserting a name overwrites its value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureVector {
    names: Vec<String>,
    values: Vec<f64>,
    index: HashMap<String, usize>,
}

impl FeatureVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            names: Vec::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
        }
    }

    /// Set `name` to `value`, appending it if new.
    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        let name = name.into();
        if let Some(&pos) = self.index.get(&name) {
            self.values[pos] = value;
            return;
        }
        self.index.insert(name.clone(), self.names.len());
        self.names.push(name);
        self.values.push(value);
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.index.get(name).map(|&pos| self.values[pos])
    }

    /// Feature names in insertion order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Values in insertion order.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for FeatureVector {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        let mut fv = Self::new();
        for (name, value) in iter {
            fv.insert(name, value);
        }
        fv
    }
}

impl Serialize for FeatureVector {
    fn serialize<Ser: Serializer>(&self, serializer: Ser) -> Result<Ser::Ok, Ser::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, &value)?;
        }
        map.end()
    }
}
