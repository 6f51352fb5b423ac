//! User-defined strategy definitions evaluated by the engine

use super::Timeframe;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// A user-defined trading strategy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Strategy {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    /// Primary instrument
    pub symbol: String,
    /// Additional instruments for multi-symbol strategies
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub symbols: Vec<String>,
    pub timeframe: Timeframe,
    pub segment: String,
    pub candle_type: CandleType,
    pub rules: RuleTree,
    pub action: StrategyAction,
    pub status: StrategyStatus,
    #[serde(default)]
    pub stats: StrategyStats,
    #[serde(default)]
    pub is_system: bool,
    #[serde(default)]
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Strategy {
    /// Create an active strategy with a single rule
    pub fn new(
        user_id: Uuid,
        name: impl Into<String>,
        symbol: impl Into<String>,
        rule: Rule,
        action: StrategyAction,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            name: name.into(),
            symbol: symbol.into(),
            symbols: Vec::new(),
            timeframe: Timeframe::M15,
            segment: "crypto".to_string(),
            candle_type: CandleType::Standard,
            rules: RuleTree {
                condition: LogicalOperator::And,
                rules: vec![rule],
            },
            action,
            status: StrategyStatus::Active,
            stats: StrategyStats::default(),
            is_system: false,
            is_default: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this strategy watches the given instrument
    pub fn trades(&self, symbol: &str) -> bool {
        self.symbol == symbol || self.symbols.iter().any(|s| s == symbol)
    }

    pub fn is_active(&self) -> bool {
        self.status == StrategyStatus::Active
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StrategyAction {
    Buy,
    Sell,
    Alert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyStatus {
    Active,
    Paused,
    Archived,
}

impl StrategyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyStatus::Active => "Active",
            StrategyStatus::Paused => "Paused",
            StrategyStatus::Archived => "Archived",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CandleType {
    Standard,
    HeikinAshi,
}

/// Signal bookkeeping used for cooldown
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyStats {
    pub total_signals: u64,
    pub last_signal_at: Option<DateTime<Utc>>,
}

/// Boolean composition of rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleTree {
    pub condition: LogicalOperator,
    pub rules: Vec<Rule>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalOperator {
    And,
    Or,
}

/// Single indicator comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub indicator: Indicator,
    #[serde(default)]
    pub params: BTreeMap<String, f64>,
    pub operator: Operator,
    pub target: RuleTarget,
}

impl Rule {
    /// Compare the raw price against a literal threshold
    pub fn price(operator: Operator, value: f64) -> Self {
        Self {
            indicator: Indicator::Price,
            params: BTreeMap::new(),
            operator,
            target: RuleTarget::Value { value },
        }
    }
}

/// Right-hand side of a rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "compare_type", rename_all = "UPPERCASE")]
pub enum RuleTarget {
    Value {
        value: f64,
    },
    Indicator {
        indicator: Indicator,
        #[serde(default)]
        params: BTreeMap<String, f64>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Indicator {
    /// Raw price, no indicator
    #[serde(alias = "NONE")]
    Price,
    Rsi,
    Sma,
    Ema,
    Macd,
    Supertrend,
    Psar,
}

impl Indicator {
    /// Indicators reserved for candle-based analysis.
    /// The tick-level evaluator never matches these.
    pub fn is_advanced(&self) -> bool {
        matches!(
            self,
            Indicator::Supertrend
                | Indicator::Psar
                | Indicator::Rsi
                | Indicator::Ema
                | Indicator::Sma
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "CROSS_ABOVE")]
    CrossAbove,
    #[serde(rename = "CROSS_BELOW")]
    CrossBelow,
}
