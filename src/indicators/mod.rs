// Technical indicators module
// Implements ATR, SMA, Heikin-Ashi, Supertrend, Parabolic SAR and market structure

use serde::{Deserialize, Serialize};

pub mod atr;
pub mod heikin_ashi;
pub mod market_analysis;
pub mod moving_average;
pub mod parabolic_sar;
pub mod supertrend;

pub use atr::{calculate_atr, calculate_atr_series, true_range};
pub use heikin_ashi::{heikin_ashi, HeikinAshi};
pub use market_analysis::{analyze_market_structure, MarketStructure};
pub use moving_average::calculate_sma;
pub use parabolic_sar::{calculate_parabolic_sar, calculate_parabolic_sar_default, ParabolicSar};
pub use supertrend::{calculate_supertrend, Supertrend};

/// Discrete trend state shared by the trend-following indicators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    Down,
    #[default]
    Neutral,
}

impl TrendDirection {
    /// +1 for up, -1 for down, 0 when undetermined
    pub fn sign(&self) -> i8 {
        match self {
            TrendDirection::Up => 1,
            TrendDirection::Down => -1,
            TrendDirection::Neutral => 0,
        }
    }
}
