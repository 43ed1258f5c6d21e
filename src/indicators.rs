use crate::error::{MonitorError, MonitorResult};
use crate::models::{PriceSeries, ReturnSeries};
use chrono::NaiveDate;
use statrs::statistics::Statistics;

/// Dispersion at or below this fraction of the window's largest magnitude is
/// treated as zero. Relative, so rescaling a series never changes the outcome.
const RELATIVE_DISPERSION_FLOOR: f64 = 1e-12;

/// Period-over-period simple returns, `price_t / price_{t-1} - 1`.
///
/// A series with fewer than two months yields an empty return series. A
/// period whose start or end month has no price is `None`.
pub fn simple_returns(series: &PriceSeries) -> ReturnSeries {
    let (dates, values): (Vec<NaiveDate>, Vec<Option<f64>>) = series
        .points
        .windows(2)
        .map(|pair| {
            let value = match (pair[0].close, pair[1].close) {
                (Some(previous), Some(current)) => Some(current / previous - 1.0),
                _ => None,
            };
            (pair[1].date, value)
        })
        .unzip();

    ReturnSeries {
        symbol: series.symbol.clone(),
        dates,
        values,
    }
}

/// Asset-minus-benchmark return differential on the asset's dates.
///
/// Dates the benchmark does not cover, or where either return is undefined,
/// are `None`. Fails only when the two series share no date at all.
pub fn relative_returns(
    asset: &ReturnSeries,
    benchmark: &ReturnSeries,
) -> MonitorResult<Vec<Option<f64>>> {
    let positions: Vec<Option<usize>> = asset
        .dates
        .iter()
        .map(|date| benchmark.position_of(*date))
        .collect();

    if !asset.is_empty() && positions.iter().all(Option::is_none) {
        return Err(MonitorError::MisalignedSeries {
            asset: asset.symbol.clone(),
            benchmark: benchmark.symbol.clone(),
        });
    }

    Ok(asset
        .values
        .iter()
        .zip(positions)
        .map(|(value, position)| Some((*value)? - benchmark.values[position?]?))
        .collect())
}

fn rolling_slice<T>(data: &[T], end_idx: usize, window: usize) -> Option<&[T]> {
    if window == 0 || end_idx + 1 < window || end_idx >= data.len() {
        None
    } else {
        Some(&data[end_idx + 1 - window..=end_idx])
    }
}

/// Collects a full window, or nothing if any slot inside it is undefined.
fn defined_window(data: &[Option<f64>], end_idx: usize, window: usize) -> Option<Vec<f64>> {
    rolling_slice(data, end_idx, window)?
        .iter()
        .copied()
        .collect::<Option<Vec<f64>>>()
}

pub fn rolling_mean(data: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    (0..data.len())
        .map(|idx| defined_window(data, idx, window).map(|values| values.iter().mean()))
        .collect()
}

/// Trailing sample standard deviation; needs at least two points per window.
pub fn rolling_std(data: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    (0..data.len())
        .map(|idx| {
            if window < 2 {
                return None;
            }
            defined_window(data, idx, window).map(|values| values.iter().std_dev())
        })
        .collect()
}

/// `(x_t - mean_t) / std_t` over a trailing window that includes `x_t`.
///
/// Positions before the first full window, windows with an undefined value and
/// windows without dispersion are `None`.
pub fn rolling_zscore(data: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    let means = rolling_mean(data, window);
    let stds = rolling_std(data, window);

    (0..data.len())
        .map(|idx| {
            let value = data[idx]?;
            let (mean, std) = (means[idx]?, stds[idx]?);
            let magnitude = defined_window(data, idx, window)?
                .iter()
                .fold(0.0_f64, |acc, value| acc.max(value.abs()));
            (std.is_finite() && std > magnitude * RELATIVE_DISPERSION_FLOOR)
                .then(|| (value - mean) / std)
        })
        .collect()
}

/// Absolute z-score of a return series.
pub fn absolute_zscores(returns: &ReturnSeries, window: usize) -> Vec<Option<f64>> {
    rolling_zscore(&returns.values, window)
}

/// Z-score of the asset-minus-benchmark differential, aligned with `asset`.
pub fn relative_zscores(
    asset: &ReturnSeries,
    benchmark: &ReturnSeries,
    window: usize,
) -> MonitorResult<Vec<Option<f64>>> {
    let differential = relative_returns(asset, benchmark)?;
    Ok(rolling_zscore(&differential, window))
}

/// Product of `(1 + r)` over the trailing window ending at `end_idx`, minus one.
pub fn compounded_return(values: &[Option<f64>], end_idx: usize, window: usize) -> Option<f64> {
    let window_values = defined_window(values, end_idx, window)?;
    Some(window_values.iter().fold(1.0, |acc, value| acc * (1.0 + value)) - 1.0)
}

/// Sample standard deviation of the trailing window ending at `end_idx`.
pub fn trailing_std(values: &[Option<f64>], end_idx: usize, window: usize) -> Option<f64> {
    if window < 2 {
        return None;
    }
    let std = defined_window(values, end_idx, window)?.iter().std_dev();
    std.is_finite().then_some(std)
}
