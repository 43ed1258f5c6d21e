use crate::error::{MonitorError, MonitorResult};
use crate::indicators::{compounded_return, trailing_std};
use crate::models::ReturnSeries;

pub const FEATURE_COUNT: usize = 6;
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "return",
    "return_3m",
    "return_6m",
    "volatility_6m",
    "zscore_lag1",
    "zscore_rel_lag1",
];

const SHORT_HORIZON: usize = 3;
const LONG_HORIZON: usize = 6;

/// Returns needed before every feature can be defined for a given z-score window:
/// a full window ending one period before the latest, plus the latest itself.
pub fn required_returns(window: usize) -> usize {
    (window + 1).max(LONG_HORIZON)
}

/// Latest-period model inputs for one asset. `None` marks a feature without
/// enough history behind it.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FeatureSnapshot {
    pub current_return: Option<f64>,
    pub return_3m: Option<f64>,
    pub return_6m: Option<f64>,
    pub volatility_6m: Option<f64>,
    pub zscore_lag1: Option<f64>,
    pub zscore_rel_lag1: Option<f64>,
}

/// Fully defined feature values in `FEATURE_NAMES` order.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureVector {
    pub values: Vec<f64>,
}

impl FeatureSnapshot {
    pub fn as_array(&self) -> [Option<f64>; FEATURE_COUNT] {
        [
            self.current_return,
            self.return_3m,
            self.return_6m,
            self.volatility_6m,
            self.zscore_lag1,
            self.zscore_rel_lag1,
        ]
    }

    pub fn first_undefined(&self) -> Option<&'static str> {
        self.as_array()
            .iter()
            .zip(FEATURE_NAMES.iter())
            .find(|(value, _)| value.map_or(true, |v| !v.is_finite()))
            .map(|(_, name)| *name)
    }

    pub fn to_vector(&self, asset: &str) -> MonitorResult<FeatureVector> {
        if let Some(feature) = self.first_undefined() {
            return Err(MonitorError::UndefinedFeature {
                asset: asset.to_string(),
                feature,
            });
        }
        Ok(FeatureVector {
            values: self.as_array().iter().flatten().copied().collect(),
        })
    }
}

/// Builds the snapshot for the period at `end_idx` of `returns`.
///
/// `absolute_z` and `relative_z` must be aligned index-for-index with the
/// returns. Lagged z-scores read the period before `end_idx`.
pub fn assemble_features(
    returns: &ReturnSeries,
    absolute_z: &[Option<f64>],
    relative_z: &[Option<f64>],
    end_idx: usize,
) -> FeatureSnapshot {
    let values = &returns.values;
    let lag_idx = end_idx.checked_sub(1);
    let lagged = |series: &[Option<f64>]| lag_idx.and_then(|idx| series.get(idx).copied().flatten());

    FeatureSnapshot {
        current_return: values.get(end_idx).copied().flatten(),
        return_3m: compounded_return(values, end_idx, SHORT_HORIZON),
        return_6m: compounded_return(values, end_idx, LONG_HORIZON),
        volatility_6m: trailing_std(values, end_idx, LONG_HORIZON),
        zscore_lag1: lagged(absolute_z),
        zscore_rel_lag1: lagged(relative_z),
    }
}
