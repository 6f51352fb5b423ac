use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

/// In-flight trigger attempt for one strategy on one symbol
pub type PendingKey = (Uuid, String);

/// Set of trigger attempts currently in flight
///
/// A key is held by exactly one [`PendingPermit`] and released when the
/// permit drops, on every exit path.
#[derive(Debug, Default)]
pub struct PendingGuard {
    keys: Mutex<HashSet<PendingKey>>,
}

impl PendingGuard {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Claim the key, or None when another attempt already holds it
    pub fn try_acquire(self: &Arc<Self>, strategy_id: Uuid, symbol: &str) -> Option<PendingPermit> {
        let key = (strategy_id, symbol.to_string());
        let inserted = self
            .keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone());

        inserted.then(|| PendingPermit {
            guard: Arc::clone(self),
            key,
        })
    }

    pub fn is_pending(&self, strategy_id: Uuid, symbol: &str) -> bool {
        self.keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&(strategy_id, symbol.to_string()))
    }

    pub fn len(&self) -> usize {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Holds a pending key until dropped
#[derive(Debug)]
pub struct PendingPermit {
    guard: Arc<PendingGuard>,
    key: PendingKey,
}

impl PendingPermit {
    pub fn key(&self) -> &PendingKey {
        &self.key
    }
}

impl Drop for PendingPermit {
    fn drop(&mut self) {
        self.guard
            .keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}
