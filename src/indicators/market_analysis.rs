/// Market structure analysis
///
/// Classifies the trend from swing points: a swing high (low) is a candle
/// whose high (low) is strictly above (below) every other candle within
/// `swing_window` candles on each side.

use crate::models::Candle;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MarketStructure {
    #[serde(rename = "HH_HL")]
    HigherHighsHigherLows, // Uptrend
    #[serde(rename = "LH_LL")]
    LowerHighsLowerLows, // Downtrend
    #[default]
    Mixed, // No clear structure
}

/// Analyze market structure using swing points over `swing_window`
///
/// Compares the last two swing highs and the last two swing lows. A one-way
/// move with no pullbacks has no confirmed swings, so the latest
/// `swing_window` candles are compared with the block before them instead.
///
/// Returns Mixed when fewer than `2 * swing_window + 1` candles are given.
pub fn analyze_market_structure(candles: &[Candle], swing_window: usize) -> MarketStructure {
    if swing_window == 0 || candles.len() < 2 * swing_window + 1 {
        return MarketStructure::Mixed;
    }

    let (swing_highs, swing_lows) = find_swings(candles, swing_window);

    if swing_highs.len() >= 2 && swing_lows.len() >= 2 {
        let (prev_high, last_high) = last_two(&swing_highs);
        let (prev_low, last_low) = last_two(&swing_lows);
        return classify(prev_high, last_high, prev_low, last_low);
    }

    let n = candles.len();
    let prior = &candles[n - 2 * swing_window..n - swing_window];
    let recent = &candles[n - swing_window..];

    classify(
        highest_high(prior),
        highest_high(recent),
        lowest_low(prior),
        lowest_low(recent),
    )
}

/// Collect swing high and swing low prices in chronological order
fn find_swings(candles: &[Candle], window: usize) -> (Vec<f64>, Vec<f64>) {
    let mut swing_highs = Vec::new();
    let mut swing_lows = Vec::new();

    for i in window..candles.len() - window {
        let neighbourhood = &candles[i - window..=i + window];
        let candle = &candles[i];

        let is_high = neighbourhood
            .iter()
            .enumerate()
            .all(|(j, c)| j == window || c.high < candle.high);
        let is_low = neighbourhood
            .iter()
            .enumerate()
            .all(|(j, c)| j == window || c.low > candle.low);

        if is_high {
            swing_highs.push(candle.high);
        }
        if is_low {
            swing_lows.push(candle.low);
        }
    }

    (swing_highs, swing_lows)
}

fn last_two(values: &[f64]) -> (f64, f64) {
    (values[values.len() - 2], values[values.len() - 1])
}

fn highest_high(candles: &[Candle]) -> f64 {
    candles.iter().map(|c| c.high).fold(f64::MIN, f64::max)
}

fn lowest_low(candles: &[Candle]) -> f64 {
    candles.iter().map(|c| c.low).fold(f64::MAX, f64::min)
}

fn classify(prev_high: f64, last_high: f64, prev_low: f64, last_low: f64) -> MarketStructure {
    if last_high > prev_high && last_low > prev_low {
        MarketStructure::HigherHighsHigherLows
    } else if last_high < prev_high && last_low < prev_low {
        MarketStructure::LowerHighsLowerLows
    } else {
        MarketStructure::Mixed
    }
}
