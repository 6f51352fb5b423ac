//! Trading signals produced by matched strategies

use super::{Strategy, StrategyAction, Tick, Timeframe};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const STOP_LOSS_FACTOR: f64 = 0.98;
const TARGET_FACTORS: [f64; 3] = [1.02, 1.04, 1.06];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalDirection {
    Buy,
    Sell,
}

impl SignalDirection {
    /// Alert strategies have no trade direction
    pub fn from_action(action: StrategyAction) -> Option<Self> {
        match action {
            StrategyAction::Buy => Some(SignalDirection::Buy),
            StrategyAction::Sell => Some(SignalDirection::Sell),
            StrategyAction::Alert => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalDirection::Buy => "BUY",
            SignalDirection::Sell => "SELL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalStatus {
    Active,
    TargetHit,
    StoplossHit,
    Closed,
}

impl SignalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalStatus::Active => "Active",
            SignalStatus::TargetHit => "Target Hit",
            SignalStatus::StoplossHit => "Stoploss Hit",
            SignalStatus::Closed => "Closed",
        }
    }
}

/// Which strategy produced a signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalProvenance {
    pub strategy_id: Uuid,
    pub strategy_name: String,
    pub timeframe: Timeframe,
}

/// Signal content before it is handed to the signal store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalPayload {
    pub symbol: String,
    pub direction: SignalDirection,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub targets: Vec<f64>,
    pub is_free: bool,
    pub provenance: SignalProvenance,
    pub note: String,
    pub status: SignalStatus,
}

impl SignalPayload {
    /// Build the payload for a strategy that matched a tick.
    ///
    /// Stop-loss and targets use the same long-biased factors for both
    /// directions. Returns None for alert-only strategies.
    pub fn from_match(strategy: &Strategy, tick: &Tick) -> Option<Self> {
        let direction = SignalDirection::from_action(strategy.action)?;
        let entry = tick.price;

        Some(Self {
            symbol: tick.symbol.clone(),
            direction,
            entry_price: entry,
            stop_loss: entry * STOP_LOSS_FACTOR,
            targets: TARGET_FACTORS.iter().map(|f| entry * f).collect(),
            is_free: false,
            provenance: SignalProvenance {
                strategy_id: strategy.id,
                strategy_name: strategy.name.clone(),
                timeframe: strategy.timeframe,
            },
            note: format!("Auto-generated by strategy: {}", strategy.name),
            status: SignalStatus::Active,
        })
    }
}

/// A persisted trading signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: Uuid,
    #[serde(flatten)]
    pub payload: SignalPayload,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Admin,
}

/// Identity a store call is made on behalf of
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: Uuid,
    pub role: Role,
}

impl Principal {
    /// System-generated signals bypass per-user authoring checks
    pub fn admin(user_id: Uuid) -> Self {
        Self {
            user_id,
            role: Role::Admin,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}
