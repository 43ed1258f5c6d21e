use crate::context::AppContext;
use crate::history::{HistoryLedger, HISTORY_FILE};
use crate::monitor::RegimeMonitor;
use crate::report::MonitorReport;
use crate::workbook::{build_workbook, ReportContext};
use anyhow::{Context, Result};
use chrono::Local;
use log::{info, warn};
use std::path::{Path, PathBuf};

pub fn report_stem(date: chrono::NaiveDate) -> String {
    format!("monitor_report_{}", date.format("%Y_%m_%d"))
}

pub async fn run(app: &AppContext, data_file: Option<&Path>) -> Result<Vec<PathBuf>> {
    let settings = app.settings();
    let model = app.load_model()?;
    let market_data = app.market_data(data_file).await?;

    let monitor = RegimeMonitor::new(&model, settings.params);
    let report = monitor
        .run(&market_data)
        .context("Monitoring run aborted")?;
    if let Some(message) = empty_summary_warning(&report) {
        warn!("{}", message);
    }
    log_summary(&report);

    let context = ReportContext {
        benchmark: settings.benchmark.clone(),
        zscore_window: settings.params.zscore_window,
        attention_threshold: settings.params.attention_threshold,
        classifier: settings.classifier.label().to_string(),
    };
    let workbook = build_workbook(&report, &context, settings.score_bands);
    let sink = settings.report_format.sink(&settings.output_dir);
    let written = sink.write(&report_stem(Local::now().date_naive()), &workbook)?;

    let history_path = settings.output_dir.join(HISTORY_FILE);
    let mut ledger = HistoryLedger::load(&history_path)?;
    let recorded = ledger.record_report(&report);
    ledger.save(&history_path)?;
    info!(
        "Recorded {} row(s) in {} ({} total)",
        recorded,
        history_path.display(),
        ledger.len()
    );

    Ok(written)
}

/// Warning text when the summary sheet would have no ranked row, including
/// the case where every asset was excluded.
fn empty_summary_warning(report: &MonitorReport) -> Option<String> {
    if !report.rows.is_empty() {
        return None;
    }
    Some(format!(
        "No asset could be ranked ({} of {} excluded); writing an empty summary",
        report.excluded().count(),
        report.details.len()
    ))
}

fn log_summary(report: &MonitorReport) {
    for row in &report.rows {
        info!(
            "{:<12} {:<12} score={:.3} return={:.2}% return_6m={:.2}%",
            row.asset,
            row.diagnostic.as_str(),
            row.score,
            row.current_return * 100.0,
            row.return_6m * 100.0
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MonitorError;
    use crate::features::FeatureSnapshot;
    use crate::report::AssetAssessment;
    use chrono::NaiveDate;

    #[test]
    fn stem_uses_underscored_date() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(report_stem(date), "monitor_report_2024_03_07");
    }

    #[test]
    fn all_excluded_run_still_warns() {
        let details = vec![AssetAssessment::excluded(
            "AAA",
            FeatureSnapshot::default(),
            None,
            MonitorError::InsufficientHistory {
                asset: "AAA".to_string(),
                required: 25,
                available: 4,
            },
        )];
        let report = MonitorReport::assemble(None, details);
        assert!(!report.is_empty());

        let message = empty_summary_warning(&report).unwrap();
        assert!(message.contains("1 of 1 excluded"));
        assert!(empty_summary_warning(&MonitorReport::assemble(None, Vec::new())).is_some());
    }
}
