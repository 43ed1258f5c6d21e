use crate::config::MonitorSettings;
use crate::models::{PricePoint, PriceSeries};
use crate::prices::{resample_monthly, MarketData};
use crate::retry::{RetryPolicy, Transient};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = "Mozilla/5.0 (compatible; regime-monitor)";

#[derive(Debug, Error)]
pub enum ChartFetchError {
    #[error("request to {url} failed")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned {status}: {body}")]
    Status {
        url: String,
        status: StatusCode,
        body: String,
    },
}

impl Transient for ChartFetchError {
    fn is_transient(&self) -> bool {
        match self {
            ChartFetchError::Transport { source, .. } => !source.is_builder(),
            ChartFetchError::Status { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
        }
    }
}

/// Daily price history from the Yahoo chart endpoint.
pub struct YahooClient {
    http: Client,
    base_url: String,
}

impl YahooClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Adjusted daily closes for `symbol` from `start` through now.
    pub async fn fetch_daily_closes(&self, symbol: &str, start: NaiveDate) -> Result<Vec<PricePoint>> {
        let period1 = start
            .and_hms_opt(0, 0, 0)
            .map(|datetime| datetime.and_utc().timestamp())
            .unwrap_or(0);
        let period2 = Utc::now().timestamp();
        let url = format!("{}/{}", self.base_url, encode_symbol(symbol));

        let url = url.as_str();
        let client = self;
        let body = RetryPolicy::default()
            .run(&format!("price download for {symbol}"), move || {
                client.get_chart(url, period1, period2)
            })
            .await?;
        parse_chart_response(symbol, &body)
    }

    async fn get_chart(
        &self,
        url: &str,
        period1: i64,
        period2: i64,
    ) -> Result<String, ChartFetchError> {
        let transport = |source: reqwest::Error| ChartFetchError::Transport {
            url: url.to_string(),
            source,
        };
        let response = self
            .http
            .get(url)
            .query(&[
                ("period1", period1.to_string()),
                ("period2", period2.to_string()),
                ("interval", "1d".to_string()),
                ("events", "div,splits".to_string()),
                ("includeAdjustedClose", "true".to_string()),
            ])
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        let body = response.text().await.map_err(transport)?;
        if !status.is_success() {
            return Err(ChartFetchError::Status {
                url: url.to_string(),
                status,
                body: truncate(&body).to_string(),
            });
        }
        Ok(body)
    }
}

/// Downloads the benchmark and every configured asset and resamples them to
/// month-end closes. An asset whose download fails keeps an empty series so
/// it is reported as excluded; a benchmark failure is an error.
pub async fn fetch_market_data(client: &YahooClient, settings: &MonitorSettings) -> Result<MarketData> {
    let symbols = settings.symbols();
    info!(
        "Downloading daily prices for {} symbol(s) since {}",
        symbols.len(),
        settings.start_date
    );

    let pb = ProgressBar::new(symbols.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    let benchmark_daily = client
        .fetch_daily_closes(&settings.benchmark, settings.start_date)
        .await
        .with_context(|| format!("Failed to download benchmark {}", settings.benchmark))?;
    let benchmark = resample_monthly(&settings.benchmark, &benchmark_daily);
    if benchmark.is_empty() {
        return Err(anyhow!("Benchmark {} returned no usable prices", settings.benchmark));
    }
    pb.inc(1);

    let mut assets = Vec::with_capacity(settings.assets.len());
    for symbol in &settings.assets {
        pb.set_message(symbol.clone());
        let series = match client.fetch_daily_closes(symbol, settings.start_date).await {
            Ok(daily) => resample_monthly(symbol, &daily),
            Err(err) => {
                warn!("Price download for {} failed: {:#}", symbol, err);
                PriceSeries::new(symbol.clone(), Vec::new())
            }
        };
        assets.push(series);
        pb.inc(1);
    }
    pb.finish_and_clear();

    info!(
        "Resampled {} asset(s) to monthly closes; benchmark has {} month(s)",
        assets.len(),
        benchmark.len()
    );
    Ok(MarketData::new(benchmark, assets))
}

fn encode_symbol(symbol: &str) -> String {
    symbol.replace('^', "%5E")
}

fn truncate(body: &str) -> &str {
    let end = body
        .char_indices()
        .nth(200)
        .map_or(body.len(), |(idx, _)| idx);
    &body[..end]
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartData,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
    #[serde(default)]
    adjclose: Vec<ChartAdjClose>,
}

#[derive(Debug, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct ChartAdjClose {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

/// Parses a chart payload, preferring adjusted closes over raw closes.
/// Days without a price are skipped.
pub fn parse_chart_response(symbol: &str, body: &str) -> Result<Vec<PricePoint>> {
    let response: ChartResponse = serde_json::from_str(body)
        .with_context(|| format!("Failed to parse chart response for {symbol}"))?;

    if let Some(error) = response.chart.error {
        return Err(anyhow!(
            "Chart API error for {}: {} {}",
            symbol,
            error.code.unwrap_or_default(),
            error.description.unwrap_or_default()
        ));
    }

    let result = response
        .chart
        .result
        .and_then(|results| results.into_iter().next())
        .ok_or_else(|| anyhow!("No chart data returned for {symbol}"))?;

    let closes = match result.indicators.adjclose.into_iter().next() {
        Some(adjusted) if !adjusted.adjclose.is_empty() => adjusted.adjclose,
        _ => result
            .indicators
            .quote
            .into_iter()
            .next()
            .map(|quote| quote.close)
            .unwrap_or_default(),
    };

    let points = result
        .timestamp
        .iter()
        .zip(closes.iter())
        .filter_map(|(timestamp, close)| {
            let close = (*close)?;
            let date = DateTime::<Utc>::from_timestamp(*timestamp, 0)?.date_naive();
            Some(PricePoint { date, close })
        })
        .collect();

    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_adjusted_closes_and_skips_gaps() {
        let body = r#"{"chart":{"result":[{"timestamp":[1704196800,1704283200,1704369600],
            "indicators":{"quote":[{"close":[10.0,11.0,12.0]}],
            "adjclose":[{"adjclose":[9.5,null,11.5]}]}}],"error":null}}"#;

        let points = parse_chart_response("AAA", body).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].close, 9.5);
        assert_eq!(points[0].date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(points[1].close, 11.5);
    }

    #[test]
    fn falls_back_to_raw_closes() {
        let body = r#"{"chart":{"result":[{"timestamp":[1704196800],
            "indicators":{"quote":[{"close":[10.0]}]}}],"error":null}}"#;
        let points = parse_chart_response("AAA", body).unwrap();
        assert_eq!(points[0].close, 10.0);
    }

    #[test]
    fn api_errors_are_reported() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        let err = parse_chart_response("ZZZZ", body).unwrap_err();
        assert!(err.to_string().contains("Not Found"));
    }

    fn status_error(code: u16) -> ChartFetchError {
        ChartFetchError::Status {
            url: "http://localhost/chart/AAA".to_string(),
            status: StatusCode::from_u16(code).unwrap(),
            body: String::new(),
        }
    }

    #[test]
    fn only_throttling_and_server_errors_are_retried() {
        assert!(status_error(429).is_transient());
        assert!(status_error(500).is_transient());
        assert!(status_error(503).is_transient());
        assert!(!status_error(400).is_transient());
        assert!(!status_error(404).is_transient());
        assert!(!status_error(401).is_transient());
    }

    #[test]
    fn index_symbols_are_escaped() {
        assert_eq!(encode_symbol("^BVSP"), "%5EBVSP");
        assert_eq!(encode_symbol("PETR4.SA"), "PETR4.SA");
    }
}
