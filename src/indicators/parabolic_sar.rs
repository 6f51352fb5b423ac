/// Parabolic SAR (stop and reverse)
///
/// Trailing stop that accelerates toward price by `step` each time a new
/// extreme point is made (capped at `max`) and flips to the other side of
/// price on reversal.

use super::TrendDirection;
use crate::models::Candle;
use serde::{Deserialize, Serialize};

pub const DEFAULT_STEP: f64 = 0.02;
pub const DEFAULT_MAX: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ParabolicSar {
    pub value: f64,
    /// Up when SAR is below the last close, Down when above
    pub trend: TrendDirection,
}

/// Calculate Parabolic SAR with the standard 0.02 / 0.2 acceleration
pub fn calculate_parabolic_sar_default(candles: &[Candle]) -> ParabolicSar {
    calculate_parabolic_sar(candles, DEFAULT_STEP, DEFAULT_MAX)
}

/// Calculate Parabolic SAR for the last candle
///
/// Needs at least two candles to seed; returns the neutral default otherwise
pub fn calculate_parabolic_sar(candles: &[Candle], step: f64, max: f64) -> ParabolicSar {
    if candles.len() < 2 {
        return ParabolicSar::default();
    }

    let (first, second) = (&candles[0], &candles[1]);
    let mut long = second.close >= first.close;
    let mut af = step;
    let (mut sar, mut ep) = if long {
        (first.low.min(second.low), first.high.max(second.high))
    } else {
        (first.high.max(second.high), first.low.min(second.low))
    };

    for i in 2..candles.len() {
        let candle = &candles[i];
        let mut next = sar + af * (ep - sar);

        if long {
            // SAR may not rise above the two prior lows
            next = next.min(candles[i - 1].low).min(candles[i - 2].low);
            if candle.low < next {
                long = false;
                next = ep;
                ep = candle.low;
                af = step;
            } else if candle.high > ep {
                ep = candle.high;
                af = (af + step).min(max);
            }
        } else {
            next = next.max(candles[i - 1].high).max(candles[i - 2].high);
            if candle.high > next {
                long = true;
                next = ep;
                ep = candle.high;
                af = step;
            } else if candle.low < ep {
                ep = candle.low;
                af = (af + step).min(max);
            }
        }

        sar = next;
    }

    let last_close = candles[candles.len() - 1].close;
    let trend = if sar < last_close {
        TrendDirection::Up
    } else if sar > last_close {
        TrendDirection::Down
    } else {
        TrendDirection::Neutral
    };

    ParabolicSar { value: sar, trend }
}
