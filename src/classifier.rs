use crate::error::{MonitorError, MonitorResult};
use crate::features::{FeatureVector, FEATURE_COUNT, FEATURE_NAMES};
use crate::lightgbm::LightGbmClassifier;
use log::info;
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::Path;

pub const SCALER_FILE: &str = "scaler.json";
pub const LOGISTIC_MODEL_FILE: &str = "logistic_model.json";
pub const LIGHTGBM_MODEL_FILE: &str = "lightgbm_model.txt";

const EPSILON: f64 = 1e-12;

/// Feature normalisation applied before the classifier sees a row.
pub trait FeatureScaler {
    fn transform(&self, features: &[f64]) -> MonitorResult<Vec<f64>>;
}

/// Binary classifier exposing the probability of the positive class.
pub trait ProbabilisticClassifier {
    fn num_features(&self) -> usize;
    fn predict_probability(&self, features: &[f64]) -> MonitorResult<f64>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierKind {
    Logistic,
    LightGbm,
}

impl ClassifierKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "logistic" | "logit" => Some(Self::Logistic),
            "lightgbm" | "lgbm" => Some(Self::LightGbm),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Logistic => "logistic regression",
            Self::LightGbm => "LightGBM",
        }
    }
}

fn shape_mismatch(expected: impl fmt::Display, found: impl fmt::Display) -> MonitorError {
    MonitorError::FeatureShapeMismatch {
        expected: expected.to_string(),
        found: found.to_string(),
    }
}

fn check_arity(expected: usize, features: &[f64]) -> MonitorResult<()> {
    if features.len() != expected {
        return Err(shape_mismatch(
            format!("{expected} feature(s)"),
            format!("{} feature(s)", features.len()),
        ));
    }
    Ok(())
}

/// Artifacts may name their columns; when they do, the names must match the
/// canonical order exactly.
fn check_feature_names(names: Option<&[String]>) -> MonitorResult<()> {
    let Some(names) = names else {
        return Ok(());
    };
    let matches = names.len() == FEATURE_COUNT
        && names
            .iter()
            .zip(FEATURE_NAMES.iter())
            .all(|(name, expected)| name == expected);
    if !matches {
        return Err(shape_mismatch(FEATURE_NAMES.join(","), names.join(",")));
    }
    Ok(())
}

fn read_artifact(path: &Path) -> MonitorResult<String> {
    fs::read_to_string(path).map_err(|err| {
        MonitorError::ModelUnavailable(format!("failed to read {}: {err}", path.display()))
    })
}

fn parse_json_artifact<T: for<'de> Deserialize<'de>>(path: &Path) -> MonitorResult<T> {
    let text = read_artifact(path)?;
    serde_json::from_str(&text).map_err(|err| {
        MonitorError::ModelUnavailable(format!("failed to parse {}: {err}", path.display()))
    })
}

/// `(x - mean) / scale`, the layout of a fitted standard scaler.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StandardScaler {
    #[serde(default)]
    pub feature_names: Option<Vec<String>>,
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    pub fn from_path(path: impl AsRef<Path>) -> MonitorResult<Self> {
        let scaler: Self = parse_json_artifact(path.as_ref())?;
        scaler.validate()?;
        Ok(scaler)
    }

    pub fn validate(&self) -> MonitorResult<()> {
        if self.mean.len() != self.scale.len() {
            return Err(MonitorError::ModelUnavailable(format!(
                "scaler has {} mean(s) but {} scale(s)",
                self.mean.len(),
                self.scale.len()
            )));
        }
        check_feature_names(self.feature_names.as_deref())?;
        if self.mean.len() != FEATURE_COUNT {
            return Err(shape_mismatch(
                format!("{FEATURE_COUNT} feature(s)"),
                format!("scaler fitted on {} feature(s)", self.mean.len()),
            ));
        }
        Ok(())
    }
}

impl FeatureScaler for StandardScaler {
    fn transform(&self, features: &[f64]) -> MonitorResult<Vec<f64>> {
        check_arity(self.mean.len(), features)?;
        Ok(features
            .iter()
            .zip(self.mean.iter().zip(self.scale.iter()))
            .map(|(value, (mean, scale))| {
                let scale = if scale.abs() <= EPSILON { 1.0 } else { *scale };
                (value - mean) / scale
            })
            .collect())
    }
}

/// Pass-through scaler for models trained on raw features.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityScaler;

impl FeatureScaler for IdentityScaler {
    fn transform(&self, features: &[f64]) -> MonitorResult<Vec<f64>> {
        Ok(features.to_vec())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LogisticRegression {
    #[serde(default)]
    pub feature_names: Option<Vec<String>>,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

impl LogisticRegression {
    pub fn from_path(path: impl AsRef<Path>) -> MonitorResult<Self> {
        let model: Self = parse_json_artifact(path.as_ref())?;
        check_feature_names(model.feature_names.as_deref())?;
        if model.coefficients.len() != FEATURE_COUNT {
            return Err(shape_mismatch(
                format!("{FEATURE_COUNT} feature(s)"),
                format!("model trained on {} feature(s)", model.coefficients.len()),
            ));
        }
        Ok(model)
    }
}

impl ProbabilisticClassifier for LogisticRegression {
    fn num_features(&self) -> usize {
        self.coefficients.len()
    }

    fn predict_probability(&self, features: &[f64]) -> MonitorResult<f64> {
        check_arity(self.coefficients.len(), features)?;
        let logit = self.intercept
            + self
                .coefficients
                .iter()
                .zip(features.iter())
                .map(|(coef, value)| coef * value)
                .sum::<f64>();
        Ok(1.0 / (1.0 + (-logit).exp()))
    }
}

/// Scaler + classifier pair turning a feature vector into a score in [0, 1].
pub struct ScoringModel {
    scaler: Box<dyn FeatureScaler>,
    classifier: Box<dyn ProbabilisticClassifier>,
}

impl ScoringModel {
    pub fn new(
        scaler: Box<dyn FeatureScaler>,
        classifier: Box<dyn ProbabilisticClassifier>,
    ) -> MonitorResult<Self> {
        if classifier.num_features() != FEATURE_COUNT {
            return Err(shape_mismatch(
                format!("{FEATURE_COUNT} feature(s)"),
                format!("classifier expects {} feature(s)", classifier.num_features()),
            ));
        }
        Ok(Self { scaler, classifier })
    }

    /// Loads the artifacts for `kind` from `model_dir`.
    pub fn load(model_dir: impl AsRef<Path>, kind: ClassifierKind) -> MonitorResult<Self> {
        let model_dir = model_dir.as_ref();
        let scaler_path = model_dir.join(SCALER_FILE);

        let model = match kind {
            ClassifierKind::Logistic => {
                let scaler = StandardScaler::from_path(&scaler_path)?;
                let classifier = LogisticRegression::from_path(model_dir.join(LOGISTIC_MODEL_FILE))?;
                Self::new(Box::new(scaler), Box::new(classifier))?
            }
            ClassifierKind::LightGbm => {
                let scaler: Box<dyn FeatureScaler> = if scaler_path.exists() {
                    Box::new(StandardScaler::from_path(&scaler_path)?)
                } else {
                    Box::new(IdentityScaler)
                };
                let text = read_artifact(&model_dir.join(LIGHTGBM_MODEL_FILE))?;
                let classifier = LightGbmClassifier::from_model_text(&text)?;
                Self::new(scaler, Box::new(classifier))?
            }
        };

        info!(
            "Loaded {} model from {}",
            kind.label(),
            model_dir.display()
        );
        Ok(model)
    }

    pub fn score(&self, features: &FeatureVector) -> MonitorResult<f64> {
        check_arity(FEATURE_COUNT, &features.values)?;
        let normalized = self.scaler.transform(&features.values)?;
        let probability = self.classifier.predict_probability(&normalized)?;
        if !probability.is_finite() {
            return Err(MonitorError::ModelUnavailable(format!(
                "classifier produced a non-finite probability ({probability})"
            )));
        }
        Ok(probability.clamp(0.0, 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, name: &str, body: &str) {
        fs::write(dir.join(name), body).unwrap();
    }

    fn vector(values: [f64; FEATURE_COUNT]) -> FeatureVector {
        FeatureVector {
            values: values.to_vec(),
        }
    }

    #[test]
    fn standard_scaler_centres_and_scales() {
        let scaler = StandardScaler {
            feature_names: None,
            mean: vec![1.0, 0.0, 0.0, 0.0, 0.0, 2.0],
            scale: vec![2.0, 1.0, 1.0, 1.0, 0.0, 4.0],
        };
        let out = scaler.transform(&[3.0, 1.0, 1.0, 1.0, 5.0, 2.0]).unwrap();
        assert_eq!(out, vec![1.0, 1.0, 1.0, 1.0, 5.0, 0.0]);
        assert!(scaler.transform(&[1.0]).is_err());
    }

    #[test]
    fn logistic_probability_of_zero_logit_is_half() {
        let model = LogisticRegression {
            feature_names: None,
            coefficients: vec![1.0; FEATURE_COUNT],
            intercept: 0.0,
        };
        let p = model.predict_probability(&[0.0; FEATURE_COUNT]).unwrap();
        assert!((p - 0.5).abs() < 1e-12);
        let high = model.predict_probability(&[5.0; FEATURE_COUNT]).unwrap();
        assert!(high > 0.99);
    }

    #[test]
    fn load_reads_logistic_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            SCALER_FILE,
            r#"{"mean":[0,0,0,0,0,0],"scale":[1,1,1,1,1,1]}"#,
        );
        write(
            dir.path(),
            LOGISTIC_MODEL_FILE,
            r#"{"feature_names":["return","return_3m","return_6m","volatility_6m","zscore_lag1","zscore_rel_lag1"],
                "coefficients":[0,0,0,0,-1,0],"intercept":0}"#,
        );

        let model = ScoringModel::load(dir.path(), ClassifierKind::Logistic).unwrap();
        let score = model.score(&vector([0.0, 0.0, 0.0, 0.0, -2.0, 0.0])).unwrap();
        assert!((score - 1.0 / (1.0 + (-2.0f64).exp())).abs() < 1e-12);
    }

    #[test]
    fn missing_artifacts_are_model_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let err = ScoringModel::load(dir.path(), ClassifierKind::Logistic)
            .err()
            .unwrap();
        assert!(matches!(err, MonitorError::ModelUnavailable(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn reordered_feature_names_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            SCALER_FILE,
            r#"{"feature_names":["return_3m","return","return_6m","volatility_6m","zscore_lag1","zscore_rel_lag1"],
                "mean":[0,0,0,0,0,0],"scale":[1,1,1,1,1,1]}"#,
        );
        let err = StandardScaler::from_path(dir.path().join(SCALER_FILE)).unwrap_err();
        assert!(matches!(err, MonitorError::FeatureShapeMismatch { .. }));
    }

    #[test]
    fn classifier_with_wrong_arity_is_rejected() {
        let classifier = LogisticRegression {
            feature_names: None,
            coefficients: vec![1.0; 4],
            intercept: 0.0,
        };
        let err = ScoringModel::new(Box::new(IdentityScaler), Box::new(classifier))
            .err()
            .unwrap();
        assert!(matches!(err, MonitorError::FeatureShapeMismatch { .. }));
    }

    #[test]
    fn classifier_kind_parses_aliases() {
        assert_eq!(ClassifierKind::parse(" LightGBM "), Some(ClassifierKind::LightGbm));
        assert_eq!(ClassifierKind::parse("logit"), Some(ClassifierKind::Logistic));
        assert_eq!(ClassifierKind::parse("svm"), None);
    }
}
