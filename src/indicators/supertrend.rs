/// Supertrend indicator
///
/// ATR-band trend follower with a discrete up/down state. Bands sit at
/// `hl2 ± multiplier * ATR(period)` and ratchet toward price until the close
/// crosses the active band, which flips the direction.

use super::atr::calculate_atr_series;
use super::TrendDirection;
use crate::models::Candle;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Supertrend {
    pub direction: TrendDirection,
    /// Active band: lower band in an uptrend, upper band in a downtrend
    pub value: f64,
    /// Direction flipped down -> up on the last candle
    pub buy_signal: bool,
    /// Direction flipped up -> down on the last candle
    pub sell_signal: bool,
}

/// Calculate Supertrend for the last candle
///
/// Returns the neutral default when fewer than `period + 1` candles are given
pub fn calculate_supertrend(candles: &[Candle], period: usize, multiplier: f64) -> Supertrend {
    let atr_series = calculate_atr_series(candles, period);
    if atr_series.is_empty() {
        return Supertrend::default();
    }

    let mut final_upper = 0.0;
    let mut final_lower = 0.0;
    let mut direction = TrendDirection::Neutral;
    let mut prev_direction = TrendDirection::Neutral;

    // atr_series[k] belongs to candles[k + period]
    for (k, atr) in atr_series.iter().enumerate() {
        let i = k + period;
        let candle = &candles[i];
        let hl2 = (candle.high + candle.low) / 2.0;
        let basic_upper = hl2 + multiplier * atr;
        let basic_lower = hl2 - multiplier * atr;

        if k == 0 {
            final_upper = basic_upper;
            final_lower = basic_lower;
            direction = if candle.close >= candles[i - 1].close {
                TrendDirection::Up
            } else {
                TrendDirection::Down
            };
            prev_direction = direction;
            continue;
        }

        let prev_close = candles[i - 1].close;
        if basic_upper < final_upper || prev_close > final_upper {
            final_upper = basic_upper;
        }
        if basic_lower > final_lower || prev_close < final_lower {
            final_lower = basic_lower;
        }

        prev_direction = direction;
        direction = match direction {
            TrendDirection::Up if candle.close < final_lower => TrendDirection::Down,
            TrendDirection::Down if candle.close > final_upper => TrendDirection::Up,
            unchanged => unchanged,
        };
    }

    let value = if direction == TrendDirection::Up {
        final_lower
    } else {
        final_upper
    };

    Supertrend {
        direction,
        value,
        buy_signal: prev_direction == TrendDirection::Down && direction == TrendDirection::Up,
        sell_signal: prev_direction == TrendDirection::Up && direction == TrendDirection::Down,
    }
}
