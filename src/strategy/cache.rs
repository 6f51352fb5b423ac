use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{Strategy, StrategyStats};
use crate::store::StrategyStore;

/// A cached strategy definition with its live signal stats
///
/// The definition is immutable for the life of the snapshot. Stats sit
/// behind their own lock so the cooldown can be checked and claimed in one
/// step. Entries for the same strategy id share one stats cell across
/// refreshes.
#[derive(Debug)]
pub struct CachedStrategy {
    strategy: Strategy,
    stats: Arc<Mutex<StrategyStats>>,
}

impl CachedStrategy {
    pub fn new(strategy: Strategy) -> Self {
        let stats = strategy.stats.clone();
        Self {
            strategy,
            stats: Arc::new(Mutex::new(stats)),
        }
    }

    /// New definition reusing `previous`'s stats cell
    ///
    /// Stored stats are merged in so the cell holds the newer of both.
    fn replacing(strategy: Strategy, previous: &CachedStrategy) -> Self {
        {
            let mut live = previous.stats.lock().unwrap_or_else(PoisonError::into_inner);
            merge_stats(&mut live, &strategy.stats);
        }

        Self {
            strategy,
            stats: Arc::clone(&previous.stats),
        }
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    pub fn id(&self) -> Uuid {
        self.strategy.id
    }

    pub fn stats(&self) -> StrategyStats {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Claim the cooldown window starting at `now`
    ///
    /// Returns false, leaving stats untouched, when the previous signal is
    /// less than `cooldown` old.
    pub fn try_claim_cooldown(&self, now: DateTime<Utc>, cooldown: Duration) -> bool {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(last) = stats.last_signal_at {
            if now - last < cooldown {
                return false;
            }
        }

        stats.last_signal_at = Some(now);
        true
    }

    /// Count a signal that reached the signal store
    pub fn record_signal(&self) {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        stats.total_signals += 1;
    }

    /// Copy of the definition carrying the live stats
    pub fn to_strategy(&self) -> Strategy {
        let mut strategy = self.strategy.clone();
        strategy.stats = self.stats();
        strategy
    }
}

type Snapshot = Arc<Vec<Arc<CachedStrategy>>>;

/// In-memory snapshot of every active strategy
///
/// Refresh replaces the whole snapshot; readers clone the current `Arc` and
/// never wait on store I/O or on a refresh rebuilding entries.
pub struct StrategyCache {
    store: Arc<dyn StrategyStore>,
    entries: RwLock<Snapshot>,
    refreshing: tokio::sync::Mutex<()>,
}

impl StrategyCache {
    pub fn new(store: Arc<dyn StrategyStore>) -> Self {
        Self {
            store,
            entries: RwLock::new(Arc::new(Vec::new())),
            refreshing: tokio::sync::Mutex::new(()),
        }
    }

    fn current(&self) -> Snapshot {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Reload all active strategies from the store
    ///
    /// A strategy already cached keeps its stats cell, so a trigger still
    /// holding the old entry claims the same cooldown as the new one.
    /// Returns the number cached.
    pub async fn refresh(&self) -> Result<usize, StoreError> {
        // One refresh at a time, else two could mint separate cells for a new id
        let _refreshing = self.refreshing.lock().await;

        let strategies = self.store.find_active().await?;

        let previous = self.current();
        let by_id: HashMap<Uuid, &Arc<CachedStrategy>> =
            previous.iter().map(|entry| (entry.id(), entry)).collect();

        let refreshed: Vec<Arc<CachedStrategy>> = strategies
            .into_iter()
            .filter(|s| s.is_active())
            .map(|strategy| match by_id.get(&strategy.id) {
                Some(existing) => Arc::new(CachedStrategy::replacing(strategy, existing)),
                None => Arc::new(CachedStrategy::new(strategy)),
            })
            .collect();

        let count = refreshed.len();
        *self.entries.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(refreshed);

        info!(count, "Strategy cache refreshed");
        Ok(count)
    }

    /// Strategies watching `symbol`
    pub fn lookup(&self, symbol: &str) -> Vec<Arc<CachedStrategy>> {
        let matches: Vec<_> = self
            .current()
            .iter()
            .filter(|entry| entry.strategy().trades(symbol))
            .cloned()
            .collect();

        debug!(symbol, count = matches.len(), "Cache lookup");
        matches
    }

    pub fn get(&self, id: Uuid) -> Option<Arc<CachedStrategy>> {
        self.current().iter().find(|entry| entry.id() == id).cloned()
    }

    pub fn clear(&self) {
        *self.entries.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(Vec::new());
    }

    pub fn len(&self) -> usize {
        self.current().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cached strategies with their live stats
    pub fn snapshot(&self) -> Vec<Strategy> {
        self.current().iter().map(|entry| entry.to_strategy()).collect()
    }
}

fn merge_stats(live: &mut StrategyStats, stored: &StrategyStats) {
    if stored.last_signal_at > live.last_signal_at {
        live.last_signal_at = stored.last_signal_at;
    }
    live.total_signals = live.total_signals.max(stored.total_signals);
}
