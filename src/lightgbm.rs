//! Minimal evaluator for binary LightGBM text dumps.

use crate::classifier::ProbabilisticClassifier;
use crate::error::{MonitorError, MonitorResult};
use std::str::FromStr;

fn invalid(message: impl Into<String>) -> MonitorError {
    MonitorError::ModelUnavailable(format!("LightGBM model invalid: {}", message.into()))
}

#[derive(Debug)]
struct LightGbmTree {
    split_features: Vec<usize>,
    thresholds: Vec<f64>,
    left_child: Vec<i32>,
    right_child: Vec<i32>,
    leaf_values: Vec<f64>,
    shrinkage: f64,
}

impl LightGbmTree {
    /// Builds a tree from the `key=value` lines between two `Tree=` markers.
    fn from_block(block: &[&str]) -> MonitorResult<Self> {
        let mut num_leaves: Option<usize> = None;
        let mut split_features = Vec::new();
        let mut thresholds = Vec::new();
        let mut left_child = Vec::new();
        let mut right_child = Vec::new();
        let mut leaf_values = Vec::new();
        let mut shrinkage = 1.0;

        for (key, value) in block.iter().filter_map(|line| split_entry(line)) {
            match key {
                "num_leaves" => num_leaves = Some(scalar(key, value)?),
                "split_feature" => split_features = list(key, value)?,
                "threshold" => thresholds = list(key, value)?,
                "left_child" => left_child = list(key, value)?,
                "right_child" => right_child = list(key, value)?,
                "leaf_value" => leaf_values = list(key, value)?,
                "shrinkage" => shrinkage = scalar(key, value)?,
                _ => {}
            }
        }

        let internal_nodes = split_features.len();
        if thresholds.len() != internal_nodes
            || left_child.len() != internal_nodes
            || right_child.len() != internal_nodes
        {
            return Err(invalid("split/child/threshold length mismatch"));
        }

        let declared_leaves = num_leaves.unwrap_or(leaf_values.len());
        if declared_leaves != leaf_values.len() || leaf_values.is_empty() {
            return Err(invalid(format!(
                "leaf count mismatch: expected {declared_leaves}, found {}",
                leaf_values.len()
            )));
        }

        Ok(Self {
            split_features,
            thresholds,
            left_child,
            right_child,
            leaf_values,
            shrinkage,
        })
    }

    fn predict(&self, features: &[f64]) -> f64 {
        // Stumps with a single leaf have no internal nodes.
        if self.split_features.is_empty() {
            return self.leaf_values[0] * self.shrinkage;
        }

        let mut node_idx = 0usize;
        loop {
            let feature_idx = self.split_features[node_idx];
            let feature_value = features.get(feature_idx).copied().unwrap_or(0.0);
            let child = if feature_value <= self.thresholds[node_idx] {
                self.left_child[node_idx]
            } else {
                self.right_child[node_idx]
            };

            if child < 0 {
                let leaf_idx = (-child - 1) as usize;
                return self.leaf_values.get(leaf_idx).copied().unwrap_or_default()
                    * self.shrinkage;
            }

            node_idx = child as usize;
            if node_idx >= self.split_features.len() {
                return 0.0;
            }
        }
    }
}

/// Binary-objective booster; the positive class probability is
/// `sigmoid(sigmoid_coef * sum(tree outputs))`.
#[derive(Debug)]
pub struct LightGbmClassifier {
    trees: Vec<LightGbmTree>,
    feature_count: usize,
    sigmoid: f64,
}

impl LightGbmClassifier {
    pub fn from_model_text(text: &str) -> MonitorResult<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Err(invalid("model text was empty"));
        }

        // Header lines precede the first `Tree=`; everything after
        // `end of trees` (importances, parameters) is ignored.
        let mut header: Vec<&str> = Vec::new();
        let mut blocks: Vec<Vec<&str>> = Vec::new();
        for line in text.lines().map(str::trim).filter(|line| !line.is_empty()) {
            if line.starts_with("end of trees") {
                break;
            }
            if line.starts_with("Tree=") {
                blocks.push(Vec::new());
                continue;
            }
            match blocks.last_mut() {
                Some(block) => block.push(line),
                None => header.push(line),
            }
        }

        let mut sigmoid = 1.0;
        let mut max_feature_idx: Option<usize> = None;
        for (key, value) in header.iter().filter_map(|line| split_entry(line)) {
            match key {
                "objective" => sigmoid = binary_sigmoid(value)?,
                "max_feature_idx" => max_feature_idx = Some(scalar(key, value)?),
                _ => {}
            }
        }

        let trees = blocks
            .iter()
            .map(|block| LightGbmTree::from_block(block))
            .collect::<MonitorResult<Vec<_>>>()?;
        if trees.is_empty() {
            return Err(invalid("model contained no trees"));
        }

        let feature_count = match max_feature_idx {
            Some(idx) => idx + 1,
            None => {
                trees
                    .iter()
                    .flat_map(|tree| tree.split_features.iter().copied())
                    .max()
                    .unwrap_or(0)
                    + 1
            }
        };

        Ok(Self {
            trees,
            feature_count,
            sigmoid,
        })
    }
}

impl ProbabilisticClassifier for LightGbmClassifier {
    fn num_features(&self) -> usize {
        self.feature_count
    }

    fn predict_probability(&self, features: &[f64]) -> MonitorResult<f64> {
        if features.len() != self.feature_count {
            return Err(MonitorError::FeatureShapeMismatch {
                expected: format!("{} feature(s)", self.feature_count),
                found: format!("{} feature(s)", features.len()),
            });
        }

        let raw_score: f64 = self.trees.iter().map(|tree| tree.predict(features)).sum();
        let logit = raw_score * self.sigmoid;
        Ok((1.0 / (1.0 + (-logit).exp())).clamp(0.0, 1.0))
    }
}

fn split_entry(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once('=')?;
    Some((key.trim(), value.trim()))
}

fn scalar<T: FromStr>(key: &str, value: &str) -> MonitorResult<T> {
    value
        .parse()
        .map_err(|_| invalid(format!("{key} has unreadable value \"{value}\"")))
}

fn list<T: FromStr>(key: &str, value: &str) -> MonitorResult<Vec<T>> {
    value
        .split_whitespace()
        .map(|token| scalar(key, token))
        .collect()
}

/// Sigmoid coefficient of a `binary sigmoid:<coef>` objective. Any other
/// objective, or a non-positive coefficient, makes the model unusable.
fn binary_sigmoid(objective: &str) -> MonitorResult<f64> {
    let mut tokens = objective.split_whitespace();
    if tokens.next() != Some("binary") {
        return Err(invalid(format!(
            "only binary objectives are supported ({objective})"
        )));
    }

    let coefficient = tokens
        .filter_map(|token| token.split_once(':'))
        .find(|(name, _)| *name == "sigmoid")
        .map(|(name, raw)| scalar::<f64>(name, raw))
        .transpose()?
        .unwrap_or(1.0);
    if !(coefficient.is_finite() && coefficient > 0.0) {
        return Err(invalid(format!("sigmoid must be positive ({objective})")));
    }
    Ok(coefficient)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stump_model_text() -> &'static str {
        "objective=binary sigmoid:1\nmax_feature_idx=5\nTree=0\nnum_leaves=2\nsplit_feature=4\nthreshold=0\nleft_child=-1\nright_child=-2\nleaf_value=2 -2\nshrinkage=1\nend of trees\n"
    }

    #[test]
    fn negative_lagged_zscore_raises_probability() {
        let model = LightGbmClassifier::from_model_text(stump_model_text()).unwrap();
        assert_eq!(model.num_features(), 6);

        let weak = model
            .predict_probability(&[0.0, 0.0, 0.0, 0.0, -1.0, 0.0])
            .unwrap();
        let strong = model
            .predict_probability(&[0.0, 0.0, 0.0, 0.0, 1.0, 0.0])
            .unwrap();
        assert!((weak - 1.0 / (1.0 + (-2.0f64).exp())).abs() < 1e-12);
        assert!(strong < 0.5);
    }

    #[test]
    fn multiclass_models_are_rejected() {
        let text = "objective=multiclass num_class:3\nTree=0\nnum_leaves=1\nleaf_value=0.1\n";
        let err = LightGbmClassifier::from_model_text(text).unwrap_err();
        assert!(matches!(err, MonitorError::ModelUnavailable(_)));
    }

    #[test]
    fn empty_model_text_is_unavailable() {
        assert!(LightGbmClassifier::from_model_text("   ").is_err());
        assert!(LightGbmClassifier::from_model_text("objective=binary sigmoid:1\n").is_err());
    }

    #[test]
    fn objective_options_are_read_by_name() {
        let text = stump_model_text().replace("sigmoid:1", "boost_from_average:1 sigmoid:2");
        let model = LightGbmClassifier::from_model_text(&text).unwrap();
        let weak = model
            .predict_probability(&[0.0, 0.0, 0.0, 0.0, -1.0, 0.0])
            .unwrap();
        assert!((weak - 1.0 / (1.0 + (-4.0f64).exp())).abs() < 1e-12);

        let broken = stump_model_text().replace("sigmoid:1", "sigmoid:-1");
        assert!(LightGbmClassifier::from_model_text(&broken).is_err());
    }

    #[test]
    fn trailing_sections_after_trees_are_ignored() {
        let text = format!(
            "{}\nfeature_importances:\nzscore_lag1=1\n\nparameters:\n[boosting: gbdt]\nend of parameters\n",
            stump_model_text()
        );
        let model = LightGbmClassifier::from_model_text(&text).unwrap();
        assert_eq!(model.trees.len(), 1);
    }

    #[test]
    fn unreadable_tree_values_are_rejected() {
        let text = stump_model_text().replace("leaf_value=2 -2", "leaf_value=2 oops");
        let err = LightGbmClassifier::from_model_text(&text).unwrap_err();
        assert!(err.to_string().contains("leaf_value"));
    }

    #[test]
    fn wrong_arity_is_shape_mismatch() {
        let model = LightGbmClassifier::from_model_text(stump_model_text()).unwrap();
        let err = model.predict_probability(&[0.0; 3]).unwrap_err();
        assert!(matches!(err, MonitorError::FeatureShapeMismatch { .. }));
    }
}
