/// Average True Range (ATR) indicator
///
/// Measures market volatility by averaging true ranges over a period.
/// True Range is the greatest of:
/// - Current High - Current Low
/// - Abs(Current High - Previous Close)
/// - Abs(Current Low - Previous Close)
///
/// ATR here is the arithmetic mean of the trailing `period` true ranges.

use super::moving_average::calculate_sma;
use crate::models::Candle;

/// True range of a candle given the previous close
pub fn true_range(high: f64, low: f64, prev_close: f64) -> f64 {
    (high - low)
        .max((high - prev_close).abs())
        .max((low - prev_close).abs())
}

/// True ranges for every candle after the first
fn true_ranges(candles: &[Candle]) -> Vec<f64> {
    candles
        .windows(2)
        .map(|w| true_range(w[1].high, w[1].low, w[0].close))
        .collect()
}

/// Calculate ATR for the given candles
///
/// Returns the current ATR value, or None if insufficient data
pub fn calculate_atr(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < period + 1 {
        return None;
    }

    calculate_sma(&true_ranges(candles), period)
}

/// Calculate ATR and return all intermediate values (for analysis)
///
/// Returns vector of ATR values aligned with candles (starting from index period)
pub fn calculate_atr_series(candles: &[Candle], period: usize) -> Vec<f64> {
    if period == 0 || candles.len() < period + 1 {
        return Vec::new();
    }

    true_ranges(candles)
        .windows(period)
        .map(|window| window.iter().sum::<f64>() / period as f64)
        .collect()
}
