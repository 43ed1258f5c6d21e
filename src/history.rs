use crate::diagnostic::Diagnostic;
use crate::report::MonitorReport;
use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::Path;

pub const HISTORY_FILE: &str = "monitor_history.csv";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRow {
    pub period: NaiveDate,
    pub asset: String,
    pub score: f64,
    pub diagnostic: Diagnostic,
    pub label: u8,
}

/// Monitoring history keyed by (period, asset); the last write for a key wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryLedger {
    rows: BTreeMap<(NaiveDate, String), HistoryRow>,
}

impl HistoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows(rows: impl IntoIterator<Item = HistoryRow>) -> Self {
        let mut ledger = Self::new();
        for row in rows {
            ledger.insert(row);
        }
        ledger
    }

    fn insert(&mut self, row: HistoryRow) {
        self.rows.insert((row.period, row.asset.clone()), row);
    }

    /// Replaces whatever is stored for `period` and `assets` with `rows`.
    ///
    /// Every asset in `assets` loses its row for `period` even when `rows` has
    /// none for it. Rows stamped with another period are re-keyed to `period`.
    pub fn upsert<'a>(
        &mut self,
        period: NaiveDate,
        assets: impl IntoIterator<Item = &'a str>,
        rows: impl IntoIterator<Item = HistoryRow>,
    ) {
        for asset in assets {
            self.rows.remove(&(period, asset.to_string()));
        }
        for mut row in rows {
            row.period = period;
            self.insert(row);
        }
    }

    /// Records the ranked rows of a report under its period. Assets the run
    /// evaluated but excluded lose any earlier row for that period.
    pub fn record_report(&mut self, report: &MonitorReport) -> usize {
        let Some(period) = report.period else {
            return 0;
        };
        let rows: Vec<HistoryRow> = report
            .rows
            .iter()
            .map(|row| HistoryRow {
                period,
                asset: row.asset.clone(),
                score: row.score,
                diagnostic: row.diagnostic,
                label: row.label,
            })
            .collect();
        let count = rows.len();
        let evaluated = report
            .details
            .iter()
            .map(|assessment| assessment.asset.as_str());
        self.upsert(period, evaluated, rows);
        let dropped = report.excluded().count();
        if dropped > 0 {
            debug!("Cleared history rows of {dropped} excluded asset(s) for {period}");
        }
        count
    }

    pub fn rows(&self) -> impl Iterator<Item = &HistoryRow> {
        self.rows.values()
    }

    pub fn rows_for_asset<'a>(&'a self, asset: &'a str) -> impl Iterator<Item = &'a HistoryRow> {
        self.rows.values().filter(move |row| row.asset == asset)
    }

    pub fn get(&self, period: NaiveDate, asset: &str) -> Option<&HistoryRow> {
        self.rows.get(&(period, asset.to_string()))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Reads the ledger from CSV; a missing file is an empty ledger.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::new());
        }

        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("Failed to open history file {}", path.display()))?;
        let mut rows = Vec::new();
        for (idx, record) in reader.deserialize::<HistoryRow>().enumerate() {
            let row = record.map_err(|err| {
                anyhow!(
                    "Invalid history row {} in {}: {}",
                    idx + 1,
                    path.display(),
                    err
                )
            })?;
            rows.push(row);
        }

        info!("Loaded {} history row(s) from {}", rows.len(), path.display());
        Ok(Self::from_rows(rows))
    }

    /// Rewrites the whole file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create history directory {}", parent.display())
                })?;
            }
        }

        let file = File::create(path)
            .with_context(|| format!("Unable to create history file {}", path.display()))?;
        let mut writer = csv::Writer::from_writer(file);
        for row in self.rows() {
            writer
                .serialize(row)
                .with_context(|| format!("Failed to write history row for {}", row.asset))?;
        }
        writer
            .flush()
            .with_context(|| format!("Failed to flush history file {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MonitorError;
    use crate::features::FeatureSnapshot;
    use crate::report::AssetAssessment;

    fn complete_features() -> FeatureSnapshot {
        FeatureSnapshot {
            current_return: Some(0.01),
            return_3m: Some(0.02),
            return_6m: Some(0.03),
            volatility_6m: Some(0.04),
            zscore_lag1: Some(0.5),
            zscore_rel_lag1: Some(0.2),
        }
    }

    fn period(month: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, month, 1)
            .map(crate::prices::month_end)
            .unwrap()
    }

    fn row(month: u32, asset: &str, score: f64, diagnostic: Diagnostic) -> HistoryRow {
        HistoryRow {
            period: period(month),
            asset: asset.to_string(),
            score,
            diagnostic,
            label: u8::from(diagnostic == Diagnostic::WeakRegime),
        }
    }

    #[test]
    fn upsert_replaces_rows_for_same_period_and_assets() {
        let mut ledger = HistoryLedger::new();
        ledger.upsert(
            period(5),
            ["A", "B"],
            vec![
                row(5, "A", 0.2, Diagnostic::Normal),
                row(5, "B", 0.7, Diagnostic::Attention),
            ],
        );
        ledger.upsert(
            period(5),
            ["A", "B"],
            vec![
                row(5, "A", 0.9, Diagnostic::Attention),
                row(5, "B", 0.1, Diagnostic::WeakRegime),
            ],
        );

        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.get(period(5), "A").unwrap().score, 0.9);
        assert_eq!(
            ledger.get(period(5), "B").unwrap().diagnostic,
            Diagnostic::WeakRegime
        );
    }

    #[test]
    fn upsert_keeps_other_periods_and_assets() {
        let mut ledger = HistoryLedger::from_rows(vec![
            row(4, "A", 0.3, Diagnostic::Normal),
            row(5, "C", 0.3, Diagnostic::Normal),
        ]);
        ledger.upsert(period(5), ["A"], vec![row(5, "A", 0.4, Diagnostic::Normal)]);

        assert_eq!(ledger.len(), 3);
        assert_eq!(ledger.rows_for_asset("A").count(), 2);
        assert_eq!(ledger.get(period(4), "A").unwrap().score, 0.3);
    }

    #[test]
    fn upsert_clears_assets_without_new_rows() {
        let mut ledger = HistoryLedger::from_rows(vec![
            row(5, "A", 0.9, Diagnostic::Attention),
            row(5, "B", 0.2, Diagnostic::Normal),
        ]);
        ledger.upsert(period(5), ["A", "B"], vec![row(5, "B", 0.3, Diagnostic::Normal)]);

        assert_eq!(ledger.get(period(5), "A"), None);
        assert_eq!(ledger.get(period(5), "B").unwrap().score, 0.3);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn rerun_that_excludes_an_asset_drops_its_row() {
        let first = MonitorReport::assemble(
            Some(period(5)),
            vec![AssetAssessment::scored(
                "A",
                complete_features(),
                0,
                0.9,
                Diagnostic::Attention,
            )],
        );
        let rerun = MonitorReport::assemble(
            Some(period(5)),
            vec![AssetAssessment::excluded(
                "A",
                FeatureSnapshot::default(),
                None,
                MonitorError::MissingPeriod {
                    asset: "A".to_string(),
                    period: period(5),
                },
            )],
        );

        let mut ledger = HistoryLedger::new();
        assert_eq!(ledger.record_report(&first), 1);
        assert_eq!(ledger.get(period(5), "A").unwrap().score, 0.9);

        assert_eq!(ledger.record_report(&rerun), 0);
        assert_eq!(ledger.get(period(5), "A"), None);
        assert!(ledger.is_empty());
    }

    #[test]
    fn unknown_diagnostic_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(HISTORY_FILE);
        fs::write(
            &path,
            "period,asset,score,diagnostic,label\n2024-05-31,A,0.5,Panic,0\n",
        )
        .unwrap();

        assert!(HistoryLedger::load(&path).is_err());
    }

    #[test]
    fn save_and_load_round_trip_through_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join(HISTORY_FILE);
        let ledger = HistoryLedger::from_rows(vec![
            row(4, "A", 0.25, Diagnostic::Normal),
            row(5, "B", 0.75, Diagnostic::Attention),
        ]);

        ledger.save(&path).unwrap();
        let loaded = HistoryLedger::load(&path).unwrap();
        assert_eq!(loaded, ledger);

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("period,asset,score,diagnostic,label"));
        assert!(text.contains(",Attention,"));
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = HistoryLedger::load(dir.path().join(HISTORY_FILE)).unwrap();
        assert!(ledger.is_empty());
    }
}
