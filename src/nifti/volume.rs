//! Decoded label volumes.

use crate::error::{Error, Result};
use ndarray::Array3;
use std::collections::HashMap;

/// A 3D grid of integer label ids (0 = background) with physical voxel spacing.
///
/// Axes are `(depth, height, width)`, matching the on-disk `(i, j, k)` order.
#[derive(Debug, Clone)]
pub struct LabelVolume {
    labels: Array3<i32>,
    spacing: [f64; 3],
}

impl LabelVolume {
    /// Wrap a label array with its spacing in millimetres.
    pub fn new(labels: Array3<i32>, spacing: [f64; 3]) -> Result<Self> {
        for (axis, &s) in spacing.iter().enumerate() {
            if !s.is_finite() || s <= 0.0 {
                return Err(Error::InvalidDimensions(format!(
                    "spacing along axis {} must be finite and > 0, got {}",
                    axis, s
                )));
            }
        }
        Ok(Self { labels, spacing })
    }

    /// Label array.
    pub fn labels(&self) -> &Array3<i32> {
        &self.labels
    }

    /// Consume the volume, returning the label array.
    pub fn into_labels(self) -> Array3<i32> {
        self.labels
    }

    /// Voxel spacing in millimetres per axis.
    pub fn spacing(&self) -> [f64; 3] {
        self.spacing
    }

    /// `(depth, height, width)`.
    pub fn shape(&self) -> (usize, usize, usize) {
        self.labels.dim()
    }

    /// Volume of a single voxel in mm³.
    pub fn voxel_volume(&self) -> f64 {
        voxel_volume(self.spacing)
    }

    /// Number of voxels carrying `label`.
    pub fn count(&self, label: i32) -> usize {
        self.labels.iter().filter(|&&v| v == label).count()
    }

    /// Voxel count for every label present, in a single pass.
    pub fn histogram(&self) -> HashMap<i32, usize> {
        let mut counts = HashMap::new();
        for &v in &self.labels {
            *counts.entry(v).or_insert(0) += 1;
        }
        counts
    }
}

/// Product of the three spacing components.
pub fn voxel_volume(spacing: [f64; 3]) -> f64 {
    spacing[0] * spacing[1] * spacing[2]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_and_histogram() {
        let mut labels = Array3::<i32>::zeros((2, 3, 4));
        labels[[0, 0, 0]] = 5;
        labels[[1, 2, 3]] = 5;
        labels[[1, 1, 1]] = 7;
        let vol = LabelVolume::new(labels, [1.0, 2.0, 0.5]).unwrap();

        assert_eq!(vol.shape(), (2, 3, 4));
        assert_eq!(vol.count(5), 2);
        assert_eq!(vol.count(9), 0);
        assert_eq!(vol.voxel_volume(), 1.0);

        let hist = vol.histogram();
        assert_eq!(hist[&0], 21);
        assert_eq!(hist[&5], 2);
        assert_eq!(hist[&7], 1);
    }

    #[test]
    fn test_rejects_non_positive_spacing() {
        let labels = Array3::<i32>::zeros((1, 1, 1));
        assert!(LabelVolume::new(labels.clone(), [1.0, 0.0, 1.0]).is_err());
        assert!(LabelVolume::new(labels, [1.0, f64::NAN, 1.0]).is_err());
    }
}
