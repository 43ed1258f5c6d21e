use crate::classifier::ClassifierKind;
use crate::diagnostic::DEFAULT_ATTENTION_THRESHOLD;
use crate::monitor::{MonitorParams, DEFAULT_ZSCORE_WINDOW};
use crate::workbook::{ReportFormat, ScoreBands};
use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::path::PathBuf;

pub const DEFAULT_ASSETS: [&str; 13] = [
    "TRIS3.SA", "SAPR4.SA", "KLBN3.SA", "UNIP6.SA", "PETR4.SA", "CPFE3.SA", "ITSA4.SA",
    "SANB11.SA", "BBAS3.SA", "ABCB4.SA", "WEGE3.SA", "GGBR4.SA", "VALE3.SA",
];
pub const DEFAULT_BENCHMARK: &str = "^BVSP";
pub const DEFAULT_START_DATE: &str = "2000-01-01";
pub const DEFAULT_MODEL_DIR: &str = "models";
pub const DEFAULT_OUTPUT_DIR: &str = "outputs";
pub const DEFAULT_YAHOO_CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

/// Every setting key the monitor reads from the environment.
pub const SETTING_KEYS: [&str; 12] = [
    "MONITOR_ASSETS",
    "MONITOR_BENCHMARK",
    "MONITOR_START_DATE",
    "MONITOR_ZSCORE_WINDOW",
    "MONITOR_ATTENTION_THRESHOLD",
    "MONITOR_SCORE_GREEN_BELOW",
    "MONITOR_SCORE_YELLOW_BELOW",
    "MONITOR_MODEL_DIR",
    "MONITOR_CLASSIFIER",
    "MONITOR_OUTPUT_DIR",
    "MONITOR_REPORT_FORMAT",
    "YAHOO_CHART_URL",
];

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorSettings {
    pub assets: Vec<String>,
    pub benchmark: String,
    pub start_date: NaiveDate,
    pub params: MonitorParams,
    pub score_bands: ScoreBands,
    pub model_dir: PathBuf,
    pub classifier: ClassifierKind,
    pub output_dir: PathBuf,
    pub report_format: ReportFormat,
    pub yahoo_chart_url: String,
}

impl MonitorSettings {
    pub fn from_settings_map(settings: &HashMap<String, String>) -> Result<Self> {
        let assets = match setting(settings, "MONITOR_ASSETS") {
            Some(_) => setting_list(settings, "MONITOR_ASSETS")?,
            None => DEFAULT_ASSETS.iter().map(|asset| asset.to_string()).collect(),
        };
        let benchmark = setting(settings, "MONITOR_BENCHMARK")
            .unwrap_or(DEFAULT_BENCHMARK)
            .to_string();
        let start_date = setting_date(settings, "MONITOR_START_DATE", DEFAULT_START_DATE)?;
        let zscore_window =
            setting_usize(settings, "MONITOR_ZSCORE_WINDOW", DEFAULT_ZSCORE_WINDOW, 2)?;
        let attention_threshold = setting_f64(
            settings,
            "MONITOR_ATTENTION_THRESHOLD",
            DEFAULT_ATTENTION_THRESHOLD,
            Some(0.0),
            Some(1.0),
        )?;
        let defaults = ScoreBands::default();
        let green_below = setting_f64(
            settings,
            "MONITOR_SCORE_GREEN_BELOW",
            defaults.green_below,
            Some(0.0),
            Some(1.0),
        )?;
        let yellow_below = setting_f64(
            settings,
            "MONITOR_SCORE_YELLOW_BELOW",
            defaults.yellow_below,
            Some(0.0),
            Some(1.0),
        )?;
        let raw_classifier = setting(settings, "MONITOR_CLASSIFIER").unwrap_or("logistic");
        let classifier = ClassifierKind::parse(raw_classifier).ok_or_else(|| {
            anyhow!(
                "MONITOR_CLASSIFIER must be logistic or lightgbm (value: {})",
                raw_classifier
            )
        })?;
        let raw_format = setting(settings, "MONITOR_REPORT_FORMAT").unwrap_or("xlsx");
        let report_format = ReportFormat::parse(raw_format).ok_or_else(|| {
            anyhow!(
                "MONITOR_REPORT_FORMAT must be xlsx or csv (value: {})",
                raw_format
            )
        })?;

        if assets.iter().any(|asset| asset == &benchmark) {
            return Err(anyhow!(
                "MONITOR_BENCHMARK ({}) must not be one of the monitored assets",
                benchmark
            ));
        }
        if yellow_below < green_below {
            return Err(anyhow!(
                "MONITOR_SCORE_YELLOW_BELOW ({}) must be >= MONITOR_SCORE_GREEN_BELOW ({})",
                yellow_below,
                green_below
            ));
        }

        Ok(Self {
            assets,
            benchmark,
            start_date,
            params: MonitorParams {
                zscore_window,
                attention_threshold,
            },
            score_bands: ScoreBands {
                green_below,
                yellow_below,
            },
            model_dir: PathBuf::from(
                setting(settings, "MONITOR_MODEL_DIR").unwrap_or(DEFAULT_MODEL_DIR),
            ),
            classifier,
            output_dir: PathBuf::from(
                setting(settings, "MONITOR_OUTPUT_DIR").unwrap_or(DEFAULT_OUTPUT_DIR),
            ),
            report_format,
            yahoo_chart_url: setting(settings, "YAHOO_CHART_URL")
                .unwrap_or(DEFAULT_YAHOO_CHART_URL)
                .trim_end_matches('/')
                .to_string(),
        })
    }

    /// Benchmark first, then the assets in configured order.
    pub fn symbols(&self) -> Vec<String> {
        std::iter::once(self.benchmark.clone())
            .chain(self.assets.iter().cloned())
            .collect()
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            assets: DEFAULT_ASSETS.iter().map(|asset| asset.to_string()).collect(),
            benchmark: DEFAULT_BENCHMARK.to_string(),
            start_date: NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or(NaiveDate::MIN),
            params: MonitorParams::default(),
            score_bands: ScoreBands::default(),
            model_dir: PathBuf::from(DEFAULT_MODEL_DIR),
            classifier: ClassifierKind::Logistic,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            report_format: ReportFormat::Xlsx,
            yahoo_chart_url: DEFAULT_YAHOO_CHART_URL.to_string(),
        }
    }
}

fn setting<'a>(settings: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    settings
        .get(key)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}

fn setting_date(settings: &HashMap<String, String>, key: &str, default: &str) -> Result<NaiveDate> {
    let raw = setting(settings, key).unwrap_or(default);
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
        anyhow!(
            "Setting {} must be a date in YYYY-MM-DD format (value: {})",
            key,
            raw
        )
    })
}

fn setting_f64(
    settings: &HashMap<String, String>,
    key: &str,
    default: f64,
    min: Option<f64>,
    max: Option<f64>,
) -> Result<f64> {
    let Some(raw) = setting(settings, key) else {
        return Ok(default);
    };
    let value = raw
        .parse::<f64>()
        .map_err(|_| anyhow!("Setting {} must be a number (value: {})", key, raw))?;
    if !value.is_finite() {
        return Err(anyhow!("Setting {} must be finite (value: {})", key, raw));
    }
    if let Some(min_value) = min {
        if value < min_value {
            return Err(anyhow!(
                "Setting {} must be >= {} (value: {})",
                key,
                min_value,
                raw
            ));
        }
    }
    if let Some(max_value) = max {
        if value > max_value {
            return Err(anyhow!(
                "Setting {} must be <= {} (value: {})",
                key,
                max_value,
                raw
            ));
        }
    }
    Ok(value)
}

fn setting_usize(
    settings: &HashMap<String, String>,
    key: &str,
    default: usize,
    min: usize,
) -> Result<usize> {
    let Some(raw) = setting(settings, key) else {
        return Ok(default);
    };
    let value = raw
        .parse::<usize>()
        .map_err(|_| anyhow!("Setting {} must be a non-negative integer (value: {})", key, raw))?;
    if value < min {
        return Err(anyhow!(
            "Setting {} must be >= {} (value: {})",
            key,
            min,
            raw
        ));
    }
    Ok(value)
}

fn setting_list(settings: &HashMap<String, String>, key: &str) -> Result<Vec<String>> {
    let raw = setting(settings, key).ok_or_else(|| anyhow!("Missing required setting {}", key))?;
    let trimmed = raw.trim_matches(|c| c == '[' || c == ']');
    let mut values: Vec<String> = Vec::new();

    for part in trimmed.split(|c: char| c == ',' || c.is_whitespace()) {
        let entry = part.trim().trim_matches(|c| c == '"' || c == '\'');
        if entry.is_empty() {
            continue;
        }
        let symbol = entry.to_uppercase();
        if !values.contains(&symbol) {
            values.push(symbol);
        }
    }

    if values.is_empty() {
        return Err(anyhow!(
            "Setting {} must contain at least one symbol (value: {})",
            key,
            raw
        ));
    }

    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn empty_map_yields_defaults() {
        let settings = MonitorSettings::from_settings_map(&HashMap::new()).unwrap();
        assert_eq!(settings, MonitorSettings::default());
        assert_eq!(settings.params.zscore_window, 24);
        assert_eq!(settings.params.attention_threshold, 0.60);
        assert_eq!(settings.assets.len(), 13);
        assert_eq!(settings.symbols()[0], "^BVSP");
        assert_eq!(settings.report_format, ReportFormat::Xlsx);
    }

    #[test]
    fn overrides_are_parsed() {
        let settings = MonitorSettings::from_settings_map(&map(&[
            ("MONITOR_ASSETS", "[aaa, BBB  ccc,aaa]"),
            ("MONITOR_BENCHMARK", "^GSPC"),
            ("MONITOR_START_DATE", "2010-06-30"),
            ("MONITOR_ZSCORE_WINDOW", "36"),
            ("MONITOR_ATTENTION_THRESHOLD", "0.7"),
            ("MONITOR_CLASSIFIER", "lightgbm"),
            ("MONITOR_REPORT_FORMAT", "CSV"),
            ("YAHOO_CHART_URL", "http://localhost:9000/chart/"),
        ]))
        .unwrap();

        assert_eq!(settings.assets, vec!["AAA", "BBB", "CCC"]);
        assert_eq!(settings.benchmark, "^GSPC");
        assert_eq!(settings.start_date, NaiveDate::from_ymd_opt(2010, 6, 30).unwrap());
        assert_eq!(settings.params.zscore_window, 36);
        assert_eq!(settings.params.attention_threshold, 0.7);
        assert_eq!(settings.classifier, ClassifierKind::LightGbm);
        assert_eq!(settings.report_format, ReportFormat::Csv);
        assert_eq!(settings.yahoo_chart_url, "http://localhost:9000/chart");
    }

    #[test]
    fn invalid_values_are_rejected() {
        for (key, value) in [
            ("MONITOR_ZSCORE_WINDOW", "1"),
            ("MONITOR_ZSCORE_WINDOW", "twelve"),
            ("MONITOR_ATTENTION_THRESHOLD", "1.5"),
            ("MONITOR_START_DATE", "01/01/2000"),
            ("MONITOR_CLASSIFIER", "forest"),
            ("MONITOR_REPORT_FORMAT", "ods"),
            ("MONITOR_ASSETS", ", ,"),
            ("MONITOR_ASSETS", "^BVSP"),
        ] {
            let result = MonitorSettings::from_settings_map(&map(&[(key, value)]));
            assert!(result.is_err(), "{key}={value} should be rejected");
        }
    }

    #[test]
    fn score_bands_must_be_ordered() {
        let result = MonitorSettings::from_settings_map(&map(&[
            ("MONITOR_SCORE_GREEN_BELOW", "0.5"),
            ("MONITOR_SCORE_YELLOW_BELOW", "0.2"),
        ]));
        assert!(result.is_err());
    }
}
