//! Logistic regression (binary sigmoid or multinomial softmax).

use super::{argmax, check_finite, check_width, softmax, Classifier, ImportanceSource, Importances};
use crate::error::{Error, Result};
use crate::features::stats::sigmoid;
use serde::Deserialize;

/// Linear classifier over aligned feature rows.
///
/// Binary models carry one coefficient row scoring the second class; multi-class
/// models carry one row per class.
#[derive(Debug, Clone, Deserialize)]
pub struct LogisticRegression {
    classes: Vec<String>,
    coef: Vec<Vec<f64>>,
    intercept: Vec<f64>,
}

impl LogisticRegression {
    pub fn new(classes: Vec<String>, coef: Vec<Vec<f64>>, intercept: Vec<f64>) -> Result<Self> {
        Self {
            classes,
            coef,
            intercept,
        }
        .validated()
    }

    pub(crate) fn validated(self) -> Result<Self> {
        let expected_rows = if self.classes.len() == 2 { 1 } else { self.classes.len() };
        if self.classes.len() < 2 {
            return Err(Error::Artifact(
                "logistic regression needs at least two classes".into(),
            ));
        }
        if self.coef.len() != expected_rows || self.intercept.len() != expected_rows {
            return Err(Error::Artifact(format!(
                "logistic regression with {} classes needs {expected_rows} coefficient rows and intercepts, got {} and {}",
                self.classes.len(),
                self.coef.len(),
                self.intercept.len()
            )));
        }
        let width = self.coef[0].len();
        if self.coef.iter().any(|row| row.len() != width) {
            return Err(Error::Artifact("ragged coefficient matrix".into()));
        }
        Ok(self)
    }

    pub fn n_features(&self) -> usize {
        self.coef.first().map_or(0, Vec::len)
    }

    fn margins(&self, x: &[f64]) -> Vec<f64> {
        self.coef
            .iter()
            .zip(&self.intercept)
            .map(|(row, b)| row.iter().zip(x).map(|(w, v)| w * v).sum::<f64>() + b)
            .collect()
    }

    fn probabilities(&self, x: &[f64]) -> Result<Vec<f64>> {
        check_width(self.n_features(), x)?;
        let margins = self.margins(x);
        let proba = if self.classes.len() == 2 {
            let p = sigmoid(margins[0]);
            vec![1.0 - p, p]
        } else {
            softmax(&margins)
        };
        check_finite(proba)
    }
}

impl Classifier for LogisticRegression {
    fn classes(&self) -> &[String] {
        &self.classes
    }

    fn predict(&self, x: &[f64]) -> Result<String> {
        let proba = self.probabilities(x)?;
        Ok(self.classes[argmax(&proba)].clone())
    }

    fn predict_proba(&self, x: &[f64]) -> Result<Option<Vec<f64>>> {
        self.probabilities(x).map(Some)
    }

    fn importances(&self) -> Option<Importances> {
        let rows = self.coef.len() as f64;
        let values = (0..self.n_features())
            .map(|j| self.coef.iter().map(|row| row[j].abs()).sum::<f64>() / rows)
            .collect();
        Some(Importances {
            source: ImportanceSource::Coefficient,
            values,
        })
    }
}
