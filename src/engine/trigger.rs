use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{debug, error, info};

use super::pending::PendingGuard;
use crate::models::{Principal, Signal, SignalPayload, Tick};
use crate::store::SignalStore;
use crate::strategy::CachedStrategy;

/// Result of one trigger attempt
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerOutcome {
    Created(Signal),
    /// Another attempt for the same strategy and symbol is in flight
    Duplicate,
    CoolingDown,
    /// Alert-only strategy, nothing to persist
    Skipped,
    /// The signal store rejected the signal
    Failed,
}

/// Turns a matched (strategy, tick) pair into a persisted signal
///
/// Per pair: pending guard, then cooldown, then persistence. The cooldown is
/// claimed before any I/O so a concurrent tick sees it even while the store
/// call is still running.
pub struct SignalTrigger {
    signals: Arc<dyn SignalStore>,
    pending: Arc<PendingGuard>,
    cooldown: Duration,
}

impl SignalTrigger {
    pub fn new(signals: Arc<dyn SignalStore>, cooldown: Duration) -> Self {
        Self {
            signals,
            pending: PendingGuard::new(),
            cooldown,
        }
    }

    pub fn pending(&self) -> &Arc<PendingGuard> {
        &self.pending
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub async fn fire(&self, cached: &CachedStrategy, tick: &Tick) -> TriggerOutcome {
        let strategy = cached.strategy();

        let Some(payload) = SignalPayload::from_match(strategy, tick) else {
            info!(
                strategy_id = %strategy.id,
                strategy = %strategy.name,
                symbol = %tick.symbol,
                price = tick.price,
                "Alert strategy matched"
            );
            return TriggerOutcome::Skipped;
        };

        let Some(_permit) = self.pending.try_acquire(strategy.id, &tick.symbol) else {
            debug!(strategy_id = %strategy.id, symbol = %tick.symbol, "Signal already pending");
            return TriggerOutcome::Duplicate;
        };

        let now = Utc::now();
        if !cached.try_claim_cooldown(now, self.cooldown) {
            debug!(strategy_id = %strategy.id, symbol = %tick.symbol, "Strategy cooling down");
            return TriggerOutcome::CoolingDown;
        }

        let principal = Principal::admin(strategy.user_id);
        let signal = match self.signals.create_signal(payload, &principal).await {
            Ok(signal) => signal,
            Err(e) => {
                error!(
                    strategy_id = %strategy.id,
                    symbol = %tick.symbol,
                    error = %e,
                    "Failed to create signal"
                );
                return TriggerOutcome::Failed;
            }
        };
        cached.record_signal();

        info!(
            signal_id = %signal.id,
            strategy_id = %strategy.id,
            symbol = %tick.symbol,
            direction = signal.payload.direction.as_str(),
            entry = signal.payload.entry_price,
            "Signal created"
        );

        // Stats lag behind until the next successful write
        if let Err(e) = self.signals.update_signal_stats(strategy.id, 1, now).await {
            error!(strategy_id = %strategy.id, error = %e, "Failed to update strategy stats");
        }

        TriggerOutcome::Created(signal)
    }
}
