use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{CandleSource, SignalStore, StoreResult, StrategyStore};
use crate::error::StoreError;
use crate::models::{Candle, Principal, Signal, SignalPayload, Strategy, Timeframe};

/// In-process store implementing every collaborator trait
///
/// Backs the engine when no database is configured and is the fixture used
/// throughout the integration tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    strategies: RwLock<Vec<Strategy>>,
    signals: RwLock<Vec<Signal>>,
    candles: RwLock<HashMap<(String, Timeframe), Vec<Candle>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_strategies(strategies: Vec<Strategy>) -> Self {
        Self {
            strategies: RwLock::new(strategies),
            ..Self::default()
        }
    }

    /// Replace a strategy with the same id, or append it
    pub async fn upsert_strategy(&self, strategy: Strategy) {
        let mut strategies = self.strategies.write().await;
        match strategies.iter_mut().find(|s| s.id == strategy.id) {
            Some(existing) => *existing = strategy,
            None => strategies.push(strategy),
        }
    }

    pub async fn remove_strategy(&self, id: Uuid) -> bool {
        let mut strategies = self.strategies.write().await;
        let before = strategies.len();
        strategies.retain(|s| s.id != id);
        strategies.len() != before
    }

    pub async fn strategy(&self, id: Uuid) -> Option<Strategy> {
        self.strategies
            .read()
            .await
            .iter()
            .find(|s| s.id == id)
            .cloned()
    }

    pub async fn signals(&self) -> Vec<Signal> {
        self.signals.read().await.clone()
    }

    /// Store candles for a symbol/timeframe, kept sorted by timestamp
    pub async fn set_candles(&self, symbol: &str, timeframe: Timeframe, mut candles: Vec<Candle>) {
        candles.sort_by_key(|c| c.timestamp);
        self.candles
            .write()
            .await
            .insert((symbol.to_string(), timeframe), candles);
    }
}

#[async_trait]
impl StrategyStore for MemoryStore {
    async fn find_active(&self) -> StoreResult<Vec<Strategy>> {
        Ok(self
            .strategies
            .read()
            .await
            .iter()
            .filter(|s| s.is_active())
            .cloned()
            .collect())
    }

    async fn find_default(&self) -> StoreResult<Option<Strategy>> {
        Ok(self
            .strategies
            .read()
            .await
            .iter()
            .find(|s| s.is_default)
            .cloned())
    }

    async fn insert(&self, strategy: &Strategy) -> StoreResult<()> {
        self.strategies.write().await.push(strategy.clone());
        Ok(())
    }
}

#[async_trait]
impl SignalStore for MemoryStore {
    async fn create_signal(
        &self,
        payload: SignalPayload,
        principal: &Principal,
    ) -> StoreResult<Signal> {
        let signal = Signal {
            id: Uuid::new_v4(),
            payload,
            created_by: principal.user_id,
            created_at: Utc::now(),
        };

        self.signals.write().await.push(signal.clone());
        Ok(signal)
    }

    async fn update_signal_stats(
        &self,
        strategy_id: Uuid,
        increment: u64,
        last_signal_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut strategies = self.strategies.write().await;
        let strategy = strategies
            .iter_mut()
            .find(|s| s.id == strategy_id)
            .ok_or_else(|| StoreError::NotFound(format!("strategy {}", strategy_id)))?;

        strategy.stats.total_signals += increment;
        strategy.stats.last_signal_at = Some(last_signal_at);
        strategy.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl CandleSource for MemoryStore {
    async fn get_historical_data(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<Candle>> {
        let candles = self.candles.read().await;
        Ok(candles
            .get(&(symbol.to_string(), timeframe))
            .map(|series| {
                series
                    .iter()
                    .filter(|c| c.timestamp >= from && c.timestamp <= to)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
