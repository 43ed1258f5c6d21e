use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MonitorError {
    #[error("{asset}: insufficient history ({available} observation(s), {required} required)")]
    InsufficientHistory {
        asset: String,
        required: usize,
        available: usize,
    },

    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("feature shape mismatch: expected {expected}, found {found}")]
    FeatureShapeMismatch { expected: String, found: String },

    #[error("{asset}: no timestamps shared with benchmark {benchmark}")]
    MisalignedSeries { asset: String, benchmark: String },

    #[error("{asset}: feature {feature} is undefined")]
    UndefinedFeature { asset: String, feature: &'static str },

    #[error("{asset}: no observation for period {period}")]
    MissingPeriod { asset: String, period: NaiveDate },
}

impl MonitorError {
    /// Errors that invalidate every score of the run rather than a single asset.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MonitorError::ModelUnavailable(_) | MonitorError::FeatureShapeMismatch { .. }
        )
    }
}

pub type MonitorResult<T> = Result<T, MonitorError>;
