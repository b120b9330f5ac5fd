//! Gradient-boosted decision trees in the xgboost layout.
//!
//! Trees are assigned to classes round-robin: tree `t` adds to the margin of class
//! `t % k` for `k > 2` classes; binary ensembles have a single margin scored with a
//! sigmoid. `base_score` is a probability for binary models and a raw margin offset
//! otherwise.

use super::{argmax, check_finite, check_width, softmax, Classifier, ImportanceSource, Importances};
use crate::error::{Error, Result};
use crate::features::stats::sigmoid;
use serde::Deserialize;

/// One tree node. Children are stored at larger indices than their parent.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        #[serde(default)]
        gain: f64,
    },
    Leaf {
        leaf: f64,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    /// Leaf value reached by row `x`. `x[feature] < threshold` goes left.
    fn score(&self, x: &[f64]) -> f64 {
        let mut i = 0;
        loop {
            match self.nodes[i] {
                Node::Leaf { leaf } => return leaf,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => i = if x[feature] < threshold { left } else { right },
            }
        }
    }

    fn validate(&self, n_features: usize) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(Error::Artifact("empty tree".into()));
        }
        for (i, node) in self.nodes.iter().enumerate() {
            if let Node::Split {
                feature,
                left,
                right,
                ..
            } = *node
            {
                if feature >= n_features {
                    return Err(Error::Artifact(format!(
                        "split on feature {feature} but model has {n_features} features"
                    )));
                }
                let bounds = i + 1..self.nodes.len();
                if !bounds.contains(&left) || !bounds.contains(&right) {
                    return Err(Error::Artifact(format!(
                        "node {i} has out-of-order children {left}/{right}"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Boosted tree ensemble.
#[derive(Debug, Clone, Deserialize)]
pub struct GradientBoostedTrees {
    classes: Vec<String>,
    n_features: usize,
    base_score: f64,
    trees: Vec<Tree>,
}

impl GradientBoostedTrees {
    pub fn new(classes: Vec<String>, n_features: usize, base_score: f64, trees: Vec<Tree>) -> Result<Self> {
        Self {
            classes,
            n_features,
            base_score,
            trees,
        }
        .validated()
    }

    pub(crate) fn validated(self) -> Result<Self> {
        if self.classes.len() < 2 {
            return Err(Error::Artifact(
                "boosted trees need at least two classes".into(),
            ));
        }
        if self.is_binary() && !(self.base_score > 0.0 && self.base_score < 1.0) {
            return Err(Error::Artifact(format!(
                "binary base_score must lie in (0, 1), got {}",
                self.base_score
            )));
        }
        for tree in &self.trees {
            tree.validate(self.n_features)?;
        }
        Ok(self)
    }

    fn is_binary(&self) -> bool {
        self.classes.len() == 2
    }

    fn margins(&self, x: &[f64]) -> Vec<f64> {
        if self.is_binary() {
            let base = (self.base_score / (1.0 - self.base_score)).ln();
            return vec![base + self.trees.iter().map(|t| t.score(x)).sum::<f64>()];
        }
        let k = self.classes.len();
        let mut margins = vec![self.base_score; k];
        for (t, tree) in self.trees.iter().enumerate() {
            margins[t % k] += tree.score(x);
        }
        margins
    }

    fn probabilities(&self, x: &[f64]) -> Result<Vec<f64>> {
        check_width(self.n_features, x)?;
        let margins = self.margins(x);
        let proba = if self.is_binary() {
            let p = sigmoid(margins[0]);
            vec![1.0 - p, p]
        } else {
            softmax(&margins)
        };
        check_finite(proba)
    }
}

impl Classifier for GradientBoostedTrees {
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

    /// Average gain of the splits on each feature; unused features score 0.
    fn importances(&self) -> Option<Importances> {
        let mut total = vec![0.0; self.n_features];
        let mut count = vec![0usize; self.n_features];
        for node in self.trees.iter().flat_map(|t| &t.nodes) {
            if let Node::Split { feature, gain, .. } = *node {
                total[feature] += gain;
                count[feature] += 1;
            }
        }
        let values = total
            .into_iter()
            .zip(count)
            .map(|(g, n)| if n == 0 { 0.0 } else { g / n as f64 })
            .collect();
        Some(Importances {
            source: ImportanceSource::Gain,
            values,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn stump(feature: usize, threshold: f64, lo: f64, hi: f64, gain: f64) -> Tree {
        Tree {
            nodes: vec![
                Node::Split {
                    feature,
                    threshold,
                    left: 1,
                    right: 2,
                    gain,
                },
                Node::Leaf { leaf: lo },
                Node::Leaf { leaf: hi },
            ],
        }
    }

    fn binary() -> GradientBoostedTrees {
        GradientBoostedTrees::new(
            vec!["0".into(), "1".into()],
            3,
            0.5,
            vec![stump(0, 0.5, -1.0, 1.0, 10.0), stump(2, 1.0, -0.5, 0.5, 4.0), stump(0, 2.0, 0.0, 0.2, 2.0)],
        )
        .unwrap()
    }

    #[test]
    fn test_binary_probabilities() {
        let model = binary();
        // base margin 0, leaves -1 and -0.5 and 0
        let proba = model.predict_proba(&[0.0, 0.0, 0.0]).unwrap().unwrap();
        assert_abs_diff_eq!(proba[1], sigmoid(-1.5), epsilon = 1e-12);
        assert_abs_diff_eq!(proba[0] + proba[1], 1.0, epsilon = 1e-12);
        assert_eq!(model.predict(&[1.0, 0.0, 2.0]).unwrap(), "1");
    }

    #[test]
    fn test_multiclass_round_robin() {
        let model = GradientBoostedTrees::new(
            vec!["a".into(), "b".into(), "c".into()],
            1,
            0.5,
            vec![
                stump(0, 0.0, 0.0, 2.0, 1.0),
                stump(0, 0.0, 0.0, 0.0, 1.0),
                stump(0, 0.0, 3.0, 0.0, 1.0),
            ],
        )
        .unwrap();
        assert_eq!(model.predict(&[1.0]).unwrap(), "a");
        assert_eq!(model.predict(&[-1.0]).unwrap(), "c");
    }

    #[test]
    fn test_gain_importances_are_averages() {
        let imp = binary().importances().unwrap();
        assert_eq!(imp.source, ImportanceSource::Gain);
        assert_eq!(imp.values, vec![6.0, 0.0, 4.0]);
    }

    #[test]
    fn test_rejects_malformed_trees() {
        let cyclic = Tree {
            nodes: vec![
                Node::Split {
                    feature: 0,
                    threshold: 0.0,
                    left: 0,
                    right: 1,
                    gain: 0.0,
                },
                Node::Leaf { leaf: 0.0 },
            ],
        };
        assert!(GradientBoostedTrees::new(vec!["0".into(), "1".into()], 1, 0.5, vec![cyclic]).is_err());
        let wide = stump(5, 0.0, 0.0, 0.0, 0.0);
        assert!(GradientBoostedTrees::new(vec!["0".into(), "1".into()], 2, 0.5, vec![wide]).is_err());
        assert!(GradientBoostedTrees::new(vec!["0".into(), "1".into()], 1, 1.0, vec![]).is_err());
    }

    #[test]
    fn test_deserializes_node_shapes() {
        let tree: Tree = serde_json::from_str(
            r#"{"nodes": [{"feature": 0, "threshold": 1.5, "left": 1, "right": 2, "gain": 3.0}, {"leaf": -0.1}, {"leaf": 0.1}]}"#,
        )
        .unwrap();
        assert_eq!(tree.score(&[1.0]), -0.1);
        assert_eq!(tree.score(&[2.0]), 0.1);
    }
}
