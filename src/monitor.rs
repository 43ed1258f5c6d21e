use crate::classifier::ScoringModel;
use crate::diagnostic::{Diagnostic, DEFAULT_ATTENTION_THRESHOLD};
use crate::error::{MonitorError, MonitorResult};
use crate::features::{assemble_features, required_returns, FeatureSnapshot};
use crate::indicators::{absolute_zscores, relative_zscores, simple_returns};
use crate::models::{PriceSeries, ReturnSeries};
use crate::prices::MarketData;
use crate::regime::latest_label;
use crate::report::{AssetAssessment, MonitorReport};
use chrono::NaiveDate;
use log::{debug, info, warn};

pub const DEFAULT_ZSCORE_WINDOW: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitorParams {
    pub zscore_window: usize,
    pub attention_threshold: f64,
}

impl Default for MonitorParams {
    fn default() -> Self {
        Self {
            zscore_window: DEFAULT_ZSCORE_WINDOW,
            attention_threshold: DEFAULT_ATTENTION_THRESHOLD,
        }
    }
}

/// Runs the monthly pipeline: returns, z-scores, persistence label, features,
/// model score, diagnostic and ranking.
pub struct RegimeMonitor<'a> {
    model: &'a ScoringModel,
    params: MonitorParams,
}

impl<'a> RegimeMonitor<'a> {
    pub fn new(model: &'a ScoringModel, params: MonitorParams) -> Self {
        Self { model, params }
    }

    /// Per-asset problems end up as exclusions in the report; only model
    /// failures abort the run.
    pub fn run(&self, market_data: &MarketData) -> MonitorResult<MonitorReport> {
        let period = market_data.reporting_period();
        let benchmark_returns = simple_returns(&market_data.benchmark);
        info!(
            "Evaluating {} asset(s) for period {} against {}",
            market_data.assets.len(),
            period.map_or_else(|| "-".to_string(), |date| date.to_string()),
            market_data.benchmark.symbol
        );

        let mut details = Vec::with_capacity(market_data.assets.len());
        for series in &market_data.assets {
            let assessment = self.assess_asset(series, &benchmark_returns, period)?;
            if let Some(reason) = &assessment.exclusion {
                warn!("Excluding {} from ranking: {}", assessment.asset, reason);
            }
            details.push(assessment);
        }

        let report = MonitorReport::assemble(period, details);
        info!(
            "Ranked {} asset(s): {} weak regime, {} attention, {} normal, {} excluded",
            report.rows.len(),
            report.count_by(Diagnostic::WeakRegime),
            report.count_by(Diagnostic::Attention),
            report.count_by(Diagnostic::Normal),
            report.excluded().count()
        );
        Ok(report)
    }

    fn assess_asset(
        &self,
        series: &PriceSeries,
        benchmark_returns: &ReturnSeries,
        period: Option<NaiveDate>,
    ) -> MonitorResult<AssetAssessment> {
        let asset = series.symbol.as_str();
        let window = self.params.zscore_window;
        let returns = simple_returns(series);

        let Some(end_idx) = returns.len().checked_sub(1) else {
            return Ok(AssetAssessment::excluded(
                asset,
                FeatureSnapshot::default(),
                None,
                MonitorError::InsufficientHistory {
                    asset: asset.to_string(),
                    required: required_returns(window) + 1,
                    available: series.observations(),
                },
            ));
        };

        if let Some(period) = period {
            if returns.last_date() != Some(period) {
                return Ok(AssetAssessment::excluded(
                    asset,
                    FeatureSnapshot::default(),
                    None,
                    MonitorError::MissingPeriod {
                        asset: asset.to_string(),
                        period,
                    },
                ));
            }
        }

        let absolute_z = absolute_zscores(&returns, window);
        let (relative_z, misalignment) = match relative_zscores(&returns, benchmark_returns, window)
        {
            Ok(values) => (values, None),
            Err(err) => (vec![None; returns.len()], Some(err)),
        };

        let label = latest_label(&absolute_z);
        let features = assemble_features(&returns, &absolute_z, &relative_z, end_idx);
        debug!("{asset} features: {features:?}, label: {label:?}");

        let vector = match features.to_vector(asset) {
            Ok(vector) => vector,
            Err(err) => {
                let reason = if returns.len() < required_returns(window) {
                    MonitorError::InsufficientHistory {
                        asset: asset.to_string(),
                        required: required_returns(window) + 1,
                        available: series.observations(),
                    }
                } else {
                    misalignment.unwrap_or(err)
                };
                return Ok(AssetAssessment::excluded(asset, features, label, reason));
            }
        };

        let Some(label) = label else {
            return Ok(AssetAssessment::excluded(
                asset,
                features,
                None,
                MonitorError::UndefinedFeature {
                    asset: asset.to_string(),
                    feature: "zscore",
                },
            ));
        };

        let score = self.model.score(&vector)?;
        let diagnostic = Diagnostic::classify(label, score, self.params.attention_threshold);
        debug!("{asset} score {score:.4} label {label} => {diagnostic}");

        Ok(AssetAssessment::scored(
            asset, features, label, score, diagnostic,
        ))
    }
}
