/// Heikin-Ashi candle transform
///
/// Smooths candles for trend reading. The first output candle equals the
/// first input; every later candle is derived from the previous HA candle:
/// - HA Open  = (prev HA Open + prev HA Close) / 2
/// - HA Close = (Open + High + Low + Close) / 4
/// - HA High  = max(High, HA Open, HA Close)
/// - HA Low   = min(Low, HA Open, HA Close)

use crate::models::Candle;

/// Lazy Heikin-Ashi iterator over a candle slice
///
/// Cloning before consumption (or calling [`heikin_ashi`] again) restarts
/// the sequence from the first candle.
#[derive(Debug, Clone)]
pub struct HeikinAshi<'a> {
    candles: &'a [Candle],
    index: usize,
    prev: Option<(f64, f64)>, // (ha_open, ha_close)
}

/// Transform candles into Heikin-Ashi candles
pub fn heikin_ashi(candles: &[Candle]) -> HeikinAshi<'_> {
    HeikinAshi {
        candles,
        index: 0,
        prev: None,
    }
}

impl Iterator for HeikinAshi<'_> {
    type Item = Candle;

    fn next(&mut self) -> Option<Candle> {
        let candle = self.candles.get(self.index)?;
        self.index += 1;

        let ha = match self.prev {
            None => candle.clone(),
            Some((prev_open, prev_close)) => {
                let open = (prev_open + prev_close) / 2.0;
                let close = (candle.open + candle.high + candle.low + candle.close) / 4.0;
                Candle {
                    timestamp: candle.timestamp,
                    open,
                    high: candle.high.max(open).max(close),
                    low: candle.low.min(open).min(close),
                    close,
                    volume: candle.volume,
                }
            }
        };

        self.prev = Some((ha.open, ha.close));
        Some(ha)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.candles.len() - self.index;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for HeikinAshi<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn create_test_candles(prices: &[(f64, f64, f64, f64)]) -> Vec<Candle> {
        prices
            .iter()
            .enumerate()
            .map(|(i, &(open, high, low, close))| Candle {
                timestamp: Utc::now() + chrono::Duration::minutes(i as i64 * 5),
                open,
                high,
                low,
                close,
                volume: 500.0,
            })
            .collect()
    }

    #[test]
    fn test_first_candle_unchanged() {
        let candles = create_test_candles(&[
            (100.0, 105.0, 95.0, 102.0),
            (102.0, 108.0, 101.0, 107.0),
        ]);

        let ha: Vec<Candle> = heikin_ashi(&candles).collect();
        assert_eq!(ha[0], candles[0]);
    }

    #[test]
    fn test_transform_formula() {
        let candles = create_test_candles(&[
            (100.0, 105.0, 95.0, 102.0),
            (102.0, 108.0, 101.0, 107.0),
        ]);

        let ha: Vec<Candle> = heikin_ashi(&candles).collect();

        // open = (100 + 102) / 2, close = (102 + 108 + 101 + 107) / 4
        assert_eq!(ha[1].open, 101.0);
        assert_eq!(ha[1].close, 104.5);
        assert_eq!(ha[1].high, 108.0);
        assert_eq!(ha[1].low, 101.0);
        assert_eq!(ha[1].timestamp, candles[1].timestamp);
    }

    #[test]
    fn test_low_extends_to_ha_open() {
        // HA open sits below the raw low, so it becomes the HA low
        let candles = create_test_candles(&[
            (90.0, 92.0, 88.0, 90.0),
            (110.0, 112.0, 109.0, 111.0),
        ]);

        let ha: Vec<Candle> = heikin_ashi(&candles).collect();
        assert_eq!(ha[1].open, 90.0);
        assert_eq!(ha[1].low, 90.0);
    }

    #[test]
    fn test_length_matches_input() {
        for n in 1..30 {
            let prices: Vec<_> = (0..n)
                .map(|i| {
                    let p = 100.0 + (i as f64 * 0.7).sin() * 5.0;
                    (p, p + 1.0, p - 1.0, p + 0.5)
                })
                .collect();
            let candles = create_test_candles(&prices);

            let ha = heikin_ashi(&candles);
            assert_eq!(ha.len(), n);
            assert_eq!(ha.count(), n);
        }
    }

    #[test]
    fn test_restartable() {
        let candles = create_test_candles(&[
            (100.0, 105.0, 95.0, 102.0),
            (102.0, 108.0, 101.0, 107.0),
            (107.0, 109.0, 103.0, 104.0),
        ]);

        let seq = heikin_ashi(&candles);
        let first: Vec<Candle> = seq.clone().collect();
        let second: Vec<Candle> = seq.collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(heikin_ashi(&[]).count(), 0);
    }
}
