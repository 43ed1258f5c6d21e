use crate::models::{MonthlyClose, PricePoint, PriceSeries};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

const PRICE_SNAPSHOT_VERSION: u32 = 2;

/// Last calendar day of the month containing `date`.
pub fn month_end(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first| first.pred_opt())
        .unwrap_or(date)
}

/// Month end of the month after the one containing `date`.
pub fn next_month_end(date: NaiveDate) -> Option<NaiveDate> {
    month_end(date).succ_opt().map(month_end)
}

/// Reduces daily closes to one slot per calendar month.
///
/// Non-positive and non-finite prices are dropped first; the last remaining
/// price of each month is kept and stamped with the month-end date. Months
/// between the first and last price that have none stay in the series with
/// an undefined close.
pub fn resample_monthly(symbol: &str, daily: &[PricePoint]) -> PriceSeries {
    let mut sorted: Vec<PricePoint> = daily
        .iter()
        .copied()
        .filter(|point| point.close.is_finite() && point.close > 0.0)
        .collect();
    sorted.sort_by_key(|point| point.date);

    let mut monthly: Vec<MonthlyClose> = Vec::new();
    for point in sorted {
        let period = month_end(point.date);
        if let Some(last) = monthly.last_mut() {
            if last.date == period {
                last.close = Some(point.close);
                continue;
            }
            let mut gap = next_month_end(last.date);
            while let Some(missing) = gap.filter(|missing| *missing < period) {
                monthly.push(MonthlyClose {
                    date: missing,
                    close: None,
                });
                gap = next_month_end(missing);
            }
        }
        monthly.push(MonthlyClose {
            date: period,
            close: Some(point.close),
        });
    }

    PriceSeries::new(symbol, monthly)
}

/// Monthly prices for the monitored assets and their benchmark.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketData {
    pub benchmark: PriceSeries,
    pub assets: Vec<PriceSeries>,
}

#[derive(Serialize, Deserialize)]
struct PriceSnapshot {
    version: u32,
    generated_at: DateTime<Utc>,
    market_data: MarketData,
}

impl MarketData {
    pub fn new(benchmark: PriceSeries, assets: Vec<PriceSeries>) -> Self {
        Self { benchmark, assets }
    }

    pub fn asset_symbols(&self) -> Vec<String> {
        self.assets.iter().map(|series| series.symbol.clone()).collect()
    }

    /// The latest month any asset has a price for.
    pub fn reporting_period(&self) -> Option<NaiveDate> {
        self.assets.iter().filter_map(PriceSeries::last_date).max()
    }

    /// Keeps only the requested assets, in the requested order.
    pub fn restrict_to(self, symbols: &[String]) -> Result<Self> {
        let mut assets = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let series = self
                .assets
                .iter()
                .find(|series| &series.symbol == symbol)
                .cloned()
                .ok_or_else(|| anyhow!("Price snapshot has no series for {}", symbol))?;
            assets.push(series);
        }
        Ok(Self {
            benchmark: self.benchmark,
            assets,
        })
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading price snapshot from {}", path.display());
        let file = File::open(path)
            .with_context(|| format!("Failed to open price snapshot at {}", path.display()))?;
        let reader = BufReader::new(file);
        let snapshot: PriceSnapshot =
            bincode::deserialize_from(reader).context("Snapshot decode failed")?;

        if snapshot.version != PRICE_SNAPSHOT_VERSION {
            return Err(anyhow!(
                "Price snapshot version mismatch (found {}, expected {})",
                snapshot.version,
                PRICE_SNAPSHOT_VERSION
            ));
        }

        info!(
            "Price snapshot generated at {} with {} asset(s)",
            snapshot.generated_at,
            snapshot.market_data.assets.len()
        );
        Ok(snapshot.market_data)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create snapshot directory {}", parent.display())
                })?;
            }
        }

        let file = File::create(path)
            .with_context(|| format!("Unable to create price snapshot at {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        let snapshot = PriceSnapshot {
            version: PRICE_SNAPSHOT_VERSION,
            generated_at: Utc::now(),
            market_data: self.clone(),
        };
        bincode::serialize_into(&mut writer, &snapshot)
            .context("Failed to serialize price snapshot")?;
        writer
            .flush()
            .context("Failed to flush price snapshot to disk")?;
        Ok(())
    }
}
