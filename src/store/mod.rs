//! Collaborator traits for everything the engine reads or writes
//!
//! Storage of strategies, signals and candles lives outside the engine; the
//! engine and analyzer only see these traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{Candle, Principal, Signal, SignalPayload, Strategy, Timeframe};

pub mod memory;

pub use memory::MemoryStore;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait StrategyStore: Send + Sync {
    /// All strategies with status Active
    async fn find_active(&self) -> StoreResult<Vec<Strategy>>;

    /// The strategy flagged as default, if any
    async fn find_default(&self) -> StoreResult<Option<Strategy>>;

    async fn insert(&self, strategy: &Strategy) -> StoreResult<()>;
}

#[async_trait]
pub trait SignalStore: Send + Sync {
    async fn create_signal(
        &self,
        payload: SignalPayload,
        principal: &Principal,
    ) -> StoreResult<Signal>;

    /// Add `increment` to the strategy's signal count and record `last_signal_at`
    async fn update_signal_stats(
        &self,
        strategy_id: Uuid,
        increment: u64,
        last_signal_at: DateTime<Utc>,
    ) -> StoreResult<()>;
}

#[async_trait]
pub trait CandleSource: Send + Sync {
    /// Candles for `symbol` in `[from, to]`, oldest first
    async fn get_historical_data(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<Candle>>;
}
