use crate::diagnostic::Diagnostic;
use crate::error::MonitorError;
use crate::features::FeatureSnapshot;
use chrono::NaiveDate;
use std::cmp::Ordering;

/// Everything computed for one asset during a run, scored or not.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetAssessment {
    pub asset: String,
    pub features: FeatureSnapshot,
    pub label: Option<u8>,
    pub score: Option<f64>,
    pub diagnostic: Option<Diagnostic>,
    /// Why the asset has no diagnostic, when it has none.
    pub exclusion: Option<MonitorError>,
}

impl AssetAssessment {
    pub fn excluded(
        asset: impl Into<String>,
        features: FeatureSnapshot,
        label: Option<u8>,
        reason: MonitorError,
    ) -> Self {
        Self {
            asset: asset.into(),
            features,
            label,
            score: None,
            diagnostic: None,
            exclusion: Some(reason),
        }
    }

    pub fn scored(
        asset: impl Into<String>,
        features: FeatureSnapshot,
        label: u8,
        score: f64,
        diagnostic: Diagnostic,
    ) -> Self {
        Self {
            asset: asset.into(),
            features,
            label: Some(label),
            score: Some(score),
            diagnostic: Some(diagnostic),
            exclusion: None,
        }
    }

    fn report_row(&self) -> Option<ReportRow> {
        Some(ReportRow {
            asset: self.asset.clone(),
            diagnostic: self.diagnostic?,
            score: self.score?,
            current_return: self.features.current_return?,
            return_6m: self.features.return_6m?,
            label: self.label?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub asset: String,
    pub diagnostic: Diagnostic,
    pub score: f64,
    pub current_return: f64,
    pub return_6m: f64,
    pub label: u8,
}

/// Severity first, then highest score. The sort is stable, so equal keys keep
/// their input order.
pub fn rank_rows(rows: &mut [ReportRow]) {
    rows.sort_by(|a, b| {
        a.diagnostic
            .severity_rank()
            .cmp(&b.diagnostic.severity_rank())
            .then_with(|| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal))
    });
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorReport {
    pub period: Option<NaiveDate>,
    /// Ranked summary, one row per scored asset.
    pub rows: Vec<ReportRow>,
    /// One entry per input asset, in input order.
    pub details: Vec<AssetAssessment>,
}

impl MonitorReport {
    pub fn assemble(period: Option<NaiveDate>, details: Vec<AssetAssessment>) -> Self {
        let mut rows: Vec<ReportRow> = details
            .iter()
            .filter_map(AssetAssessment::report_row)
            .collect();
        rank_rows(&mut rows);
        Self {
            period,
            rows,
            details,
        }
    }

    pub fn excluded(&self) -> impl Iterator<Item = &AssetAssessment> {
        self.details
            .iter()
            .filter(|assessment| assessment.exclusion.is_some())
    }

    pub fn count_by(&self, diagnostic: Diagnostic) -> usize {
        self.rows
            .iter()
            .filter(|row| row.diagnostic == diagnostic)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.details.is_empty()
    }
}
