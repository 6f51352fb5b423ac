//! Multi-timeframe technical analysis
//!
//! For each requested timeframe the candles are smoothed with Heikin-Ashi and
//! read through Supertrend, Parabolic SAR and market structure:
//! - Trend: Supertrend direction (up = Bullish, otherwise Bearish)
//! - Signal: Buy/Sell only on the candle where Supertrend flips
//! - Strong: trend, PSAR side and market structure all agree
//!
//! Price levels always come from the raw candles, never the smoothed series.
//! A daily ATR envelope gives the expected range and entry levels.

use chrono::{DateTime, Utc};
use futures_util::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::error::AnalysisError;
use crate::indicators::{
    analyze_market_structure, calculate_atr, calculate_parabolic_sar, calculate_supertrend,
    heikin_ashi, MarketStructure, ParabolicSar, Supertrend, TrendDirection,
};
use crate::models::{Candle, Timeframe};
use crate::store::CandleSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Trend {
    Bullish,
    Bearish,
    /// No candles for the timeframe
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalType {
    Buy,
    Sell,
    Hold,
}

/// Indicator parameters used by the analyzer
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// Number of timeframe buckets fetched per series
    pub lookback_candles: usize,
    pub supertrend_period: usize,
    pub supertrend_multiplier: f64,
    pub psar_step: f64,
    pub psar_max: f64,
    pub swing_window: usize,
    pub atr_period: usize,
    /// Fraction of ATR added to / taken from the close for entry levels
    pub entry_atr_fraction: f64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            lookback_candles: 200,
            supertrend_period: 14,
            supertrend_multiplier: 1.5,
            psar_step: 0.02,
            psar_max: 0.2,
            swing_window: 5,
            atr_period: 14,
            entry_atr_fraction: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeframeAnalysis {
    pub timeframe: Timeframe,
    pub candle_count: usize,
    /// Close of the last raw candle
    pub current_price: Option<f64>,
    pub trend: Trend,
    pub signal: SignalType,
    pub strong: bool,
    pub supertrend: Supertrend,
    pub psar: ParabolicSar,
    pub structure: MarketStructure,
    /// Supertrend if below price, else PSAR if below; independent of trend
    pub support: Option<f64>,
    /// Supertrend if above price, else PSAR if above; independent of trend
    pub resistance: Option<f64>,
}

impl TimeframeAnalysis {
    fn empty(timeframe: Timeframe) -> Self {
        Self {
            timeframe,
            candle_count: 0,
            current_price: None,
            trend: Trend::Neutral,
            signal: SignalType::Hold,
            strong: false,
            supertrend: Supertrend::default(),
            psar: ParabolicSar::default(),
            structure: MarketStructure::Mixed,
            support: None,
            resistance: None,
        }
    }
}

/// Daily ATR envelope around the last close
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolatilityReport {
    pub atr: f64,
    pub expected_high: f64,
    pub expected_low: f64,
    pub buy_price: f64,
    pub sell_price: f64,
}

/// Agreement across timeframes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Confluence {
    /// Majority trend over timeframes with data; Neutral on a tie or no data
    pub trend: Trend,
    /// Every timeframe with data has the same trend
    pub aligned: bool,
    pub bullish_count: usize,
    pub bearish_count: usize,
    pub strong_count: usize,
}

impl Confluence {
    pub fn from_timeframes(timeframes: &[TimeframeAnalysis]) -> Self {
        let bullish_count = timeframes.iter().filter(|t| t.trend == Trend::Bullish).count();
        let bearish_count = timeframes.iter().filter(|t| t.trend == Trend::Bearish).count();
        let strong_count = timeframes.iter().filter(|t| t.strong).count();

        let trend = if bullish_count > bearish_count {
            Trend::Bullish
        } else if bearish_count > bullish_count {
            Trend::Bearish
        } else {
            Trend::Neutral
        };
        let with_data = bullish_count + bearish_count;
        let aligned = with_data > 0 && (bullish_count == 0 || bearish_count == 0);

        Self {
            trend,
            aligned,
            bullish_count,
            bearish_count,
            strong_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiTimeframeReport {
    pub symbol: String,
    pub generated_at: DateTime<Utc>,
    pub timeframes: Vec<TimeframeAnalysis>,
    pub volatility: Option<VolatilityReport>,
    pub confluence: Confluence,
}

pub struct MultiTimeframeAnalyzer {
    source: Arc<dyn CandleSource>,
    config: AnalyzerConfig,
}

impl MultiTimeframeAnalyzer {
    pub fn new(source: Arc<dyn CandleSource>, config: AnalyzerConfig) -> Self {
        Self { source, config }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Analyze `symbol` on every requested timeframe
    ///
    /// The daily series is fetched for the volatility envelope even when D1
    /// is not requested. Fails with SymbolNotFound when no series has data.
    pub async fn analyze(
        &self,
        symbol: &str,
        timeframes: &[Timeframe],
    ) -> Result<MultiTimeframeReport, AnalysisError> {
        let now = Utc::now();

        let mut wanted: Vec<Timeframe> = Vec::with_capacity(timeframes.len() + 1);
        for &tf in timeframes {
            if !wanted.contains(&tf) {
                wanted.push(tf);
            }
        }
        let daily_requested = wanted.contains(&Timeframe::D1);
        if !daily_requested {
            wanted.push(Timeframe::D1);
        }

        let series = try_join_all(wanted.iter().map(|&tf| self.fetch(symbol, tf, now))).await?;

        if series.iter().all(|(_, candles)| candles.is_empty()) {
            return Err(AnalysisError::SymbolNotFound(symbol.to_string()));
        }

        let volatility = series
            .iter()
            .find(|(tf, _)| *tf == Timeframe::D1)
            .and_then(|(_, candles)| volatility_report(candles, &self.config));

        let analyses: Vec<TimeframeAnalysis> = series
            .iter()
            .filter(|(tf, _)| daily_requested || *tf != Timeframe::D1)
            .map(|(tf, candles)| analyze_timeframe(*tf, candles, &self.config))
            .collect();

        Ok(MultiTimeframeReport {
            symbol: symbol.to_string(),
            generated_at: now,
            confluence: Confluence::from_timeframes(&analyses),
            timeframes: analyses,
            volatility,
        })
    }

    async fn fetch(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        to: DateTime<Utc>,
    ) -> Result<(Timeframe, Vec<Candle>), AnalysisError> {
        let lookback = self.config.lookback_candles.clamp(1, 10_000);
        let from = to - timeframe.duration() * lookback as i32;

        let mut candles = self
            .source
            .get_historical_data(symbol, timeframe, from, to)
            .await?;

        if candles.len() > lookback {
            candles.drain(..candles.len() - lookback);
        }

        debug!(symbol, timeframe = %timeframe, count = candles.len(), "Fetched candles");
        Ok((timeframe, candles))
    }
}

/// Analyze a single timeframe's candles
pub fn analyze_timeframe(
    timeframe: Timeframe,
    candles: &[Candle],
    config: &AnalyzerConfig,
) -> TimeframeAnalysis {
    let Some(last) = candles.last() else {
        return TimeframeAnalysis::empty(timeframe);
    };
    let price = last.close;

    let ha: Vec<Candle> = heikin_ashi(candles).collect();
    let supertrend = calculate_supertrend(
        &ha,
        config.supertrend_period,
        config.supertrend_multiplier,
    );
    let psar = calculate_parabolic_sar(&ha, config.psar_step, config.psar_max);
    let structure = analyze_market_structure(&ha, config.swing_window);

    let trend = if supertrend.direction == TrendDirection::Up {
        Trend::Bullish
    } else {
        Trend::Bearish
    };

    let signal = if supertrend.buy_signal {
        SignalType::Buy
    } else if supertrend.sell_signal {
        SignalType::Sell
    } else {
        SignalType::Hold
    };

    let strong = match trend {
        Trend::Bullish => psar.value < price && structure == MarketStructure::HigherHighsHigherLows,
        Trend::Bearish => psar.value > price && structure == MarketStructure::LowerHighsLowerLows,
        Trend::Neutral => false,
    };

    // Zero means the indicator had too little data
    let levels = [supertrend.value, psar.value];
    let support = levels.iter().copied().find(|&v| v > 0.0 && v < price);
    let resistance = levels.iter().copied().find(|&v| v > 0.0 && v > price);

    TimeframeAnalysis {
        timeframe,
        candle_count: candles.len(),
        current_price: Some(price),
        trend,
        signal,
        strong,
        supertrend,
        psar,
        structure,
        support,
        resistance,
    }
}

/// ATR envelope around the last daily close; None with too few candles
pub fn volatility_report(daily: &[Candle], config: &AnalyzerConfig) -> Option<VolatilityReport> {
    let atr = calculate_atr(daily, config.atr_period)?;
    let close = daily.last()?.close;
    let band = config.entry_atr_fraction * atr;

    Some(VolatilityReport {
        atr,
        expected_high: close + atr,
        expected_low: close - atr,
        buy_price: close + band,
        sell_price: close - band,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn create_test_candles(prices: &[(f64, f64, f64, f64)]) -> Vec<Candle> {
        let start = Utc::now() - Duration::hours(prices.len() as i64);
        prices
            .iter()
            .enumerate()
            .map(|(i, &(open, high, low, close))| Candle {
                timestamp: start + Duration::hours(i as i64),
                open,
                high,
                low,
                close,
                volume: 1000.0,
            })
            .collect()
    }

    fn rising(n: usize) -> Vec<(f64, f64, f64, f64)> {
        (0..n)
            .map(|i| {
                let close = 100.0 + i as f64;
                (close - 0.5, close + 1.0, close - 1.0, close)
            })
            .collect()
    }

    fn falling(n: usize) -> Vec<(f64, f64, f64, f64)> {
        (0..n)
            .map(|i| {
                let close = 200.0 - i as f64;
                (close + 0.5, close + 1.0, close - 1.0, close)
            })
            .collect()
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_volatility_envelope() {
        // Every true range is 5, last close 200
        let candles = create_test_candles(&[(200.0, 202.5, 197.5, 200.0); 20]);
        let report = volatility_report(&candles, &AnalyzerConfig::default()).unwrap();

        assert!(approx(report.atr, 5.0));
        assert!(approx(report.expected_high, 205.0));
        assert!(approx(report.expected_low, 195.0));
        assert!(approx(report.buy_price, 201.0));
        assert!(approx(report.sell_price, 199.0));
    }

    #[test]
    fn test_volatility_insufficient_data() {
        let candles = create_test_candles(&[(200.0, 202.5, 197.5, 200.0); 10]);
        assert!(volatility_report(&candles, &AnalyzerConfig::default()).is_none());
    }

    #[test]
    fn test_strong_bullish_timeframe() {
        let candles = create_test_candles(&rising(60));
        let analysis = analyze_timeframe(Timeframe::H1, &candles, &AnalyzerConfig::default());

        assert_eq!(analysis.trend, Trend::Bullish);
        assert_eq!(analysis.signal, SignalType::Hold);
        assert_eq!(analysis.structure, MarketStructure::HigherHighsHigherLows);
        assert!(analysis.strong);
        assert_eq!(analysis.candle_count, 60);

        let price = analysis.current_price.unwrap();
        assert_eq!(price, 159.0);
        assert!(analysis.support.unwrap() < price);
        assert_eq!(analysis.support, Some(analysis.supertrend.value));
    }

    #[test]
    fn test_strong_bearish_timeframe() {
        let candles = create_test_candles(&falling(60));
        let analysis = analyze_timeframe(Timeframe::H1, &candles, &AnalyzerConfig::default());

        assert_eq!(analysis.trend, Trend::Bearish);
        assert_eq!(analysis.structure, MarketStructure::LowerHighsLowerLows);
        assert!(analysis.strong);
        assert!(analysis.resistance.unwrap() > analysis.current_price.unwrap());
    }

    #[test]
    fn test_price_read_from_raw_candles() {
        let candles = create_test_candles(&rising(30));
        let analysis = analyze_timeframe(Timeframe::M15, &candles, &AnalyzerConfig::default());

        // HA close would be the OHLC average, not the raw close
        assert_eq!(analysis.current_price, Some(candles.last().unwrap().close));
    }

    #[test]
    fn test_sell_signal_on_crash() {
        let mut prices = rising(30);
        prices.push((130.0, 130.0, 49.0, 50.0));
        let candles = create_test_candles(&prices);

        let analysis = analyze_timeframe(Timeframe::H1, &candles, &AnalyzerConfig::default());
        assert_eq!(analysis.signal, SignalType::Sell);
        assert_eq!(analysis.trend, Trend::Bearish);
    }

    #[test]
    fn test_empty_timeframe_is_neutral() {
        let analysis = analyze_timeframe(Timeframe::M5, &[], &AnalyzerConfig::default());

        assert_eq!(analysis.candle_count, 0);
        assert_eq!(analysis.current_price, None);
        assert_eq!(analysis.trend, Trend::Neutral);
        assert_eq!(analysis.signal, SignalType::Hold);
        assert!(!analysis.strong);
    }

    #[test]
    fn test_short_series_does_not_panic() {
        let candles = create_test_candles(&rising(3));
        let analysis = analyze_timeframe(Timeframe::M5, &candles, &AnalyzerConfig::default());

        assert_eq!(analysis.supertrend, Supertrend::default());
        assert_eq!(analysis.support, Some(analysis.psar.value));
        assert!(!analysis.strong);
    }

    #[test]
    fn test_confluence_majority() {
        let config = AnalyzerConfig::default();
        let up = analyze_timeframe(Timeframe::M5, &create_test_candles(&rising(60)), &config);
        let down = analyze_timeframe(Timeframe::H1, &create_test_candles(&falling(60)), &config);
        let empty = analyze_timeframe(Timeframe::D1, &[], &config);

        let confluence = Confluence::from_timeframes(&[up.clone(), up.clone(), down.clone(), empty.clone()]);
        assert_eq!(confluence.trend, Trend::Bullish);
        assert!(!confluence.aligned);
        assert_eq!(confluence.bullish_count, 2);
        assert_eq!(confluence.strong_count, 3);

        let confluence = Confluence::from_timeframes(&[down.clone(), down, empty.clone()]);
        assert_eq!(confluence.trend, Trend::Bearish);
        assert!(confluence.aligned);

        let confluence = Confluence::from_timeframes(&[empty]);
        assert_eq!(confluence.trend, Trend::Neutral);
        assert!(!confluence.aligned);
    }
}
