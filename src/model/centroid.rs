//! Nearest-centroid classifier. Hard decisions only.

use super::{check_width, Classifier};
use crate::error::{Error, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct NearestCentroid {
    classes: Vec<String>,
    centroids: Vec<Vec<f64>>,
}

impl NearestCentroid {
    pub fn new(classes: Vec<String>, centroids: Vec<Vec<f64>>) -> Result<Self> {
        Self { classes, centroids }.validated()
    }

    pub(crate) fn validated(self) -> Result<Self> {
        if self.classes.is_empty() || self.classes.len() != self.centroids.len() {
            return Err(Error::Artifact(format!(
                "nearest centroid needs one centroid per class, got {} classes and {} centroids",
                self.classes.len(),
                self.centroids.len()
            )));
        }
        let width = self.centroids[0].len();
        if self.centroids.iter().any(|c| c.len() != width) {
            return Err(Error::Artifact("centroids differ in width".into()));
        }
        Ok(self)
    }
}

impl Classifier for NearestCentroid {
    fn classes(&self) -> &[String] {
        &self.classes
    }

    fn predict(&self, x: &[f64]) -> Result<String> {
        check_width(self.centroids[0].len(), x)?;
        let distances: Vec<f64> = self
            .centroids
            .iter()
            .map(|c| c.iter().zip(x).map(|(a, b)| (a - b) * (a - b)).sum())
            .collect();
        if distances.iter().any(|d: &f64| d.is_nan()) {
            return Err(Error::ClassifierInvocation("NaN distance to centroid".into()));
        }
        let nearest = distances
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(b.1))
            .map_or(0, |(i, _)| i);
        Ok(self.classes[nearest].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> NearestCentroid {
        NearestCentroid::new(
            vec!["CN".into(), "AD".into()],
            vec![vec![0.0, 0.0], vec![10.0, 10.0]],
        )
        .unwrap()
    }

    #[test]
    fn test_picks_nearest() {
        let m = model();
        assert_eq!(m.predict(&[1.0, 2.0]).unwrap(), "CN");
        assert_eq!(m.predict(&[8.0, 9.0]).unwrap(), "AD");
    }

    #[test]
    fn test_has_no_probabilities() {
        assert!(model().predict_proba(&[1.0, 2.0]).unwrap().is_none());
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(matches!(
            model().predict(&[1.0]),
            Err(Error::ClassifierInvocation(_))
        ));
        assert!(matches!(
            model().predict(&[f64::NAN, 0.0]),
            Err(Error::ClassifierInvocation(_))
        ));
        assert!(NearestCentroid::new(vec!["a".into()], vec![]).is_err());
    }
}
