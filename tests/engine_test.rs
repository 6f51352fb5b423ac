use async_trait::async_trait;
use chrono::{DateTime, Utc};
use signalbot::analysis::AnalyzerConfig;
use signalbot::feed::BroadcastTickFeed;
use signalbot::store::{MemoryStore, SignalStore, StoreResult, StrategyStore};
use signalbot::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const EVENT: &str = "price_update";

fn breakout(threshold: f64, action: StrategyAction) -> Strategy {
    Strategy::new(
        Uuid::new_v4(),
        "Breakout",
        "BTCUSDT",
        Rule::price(Operator::Gt, threshold),
        action,
    )
}

fn engine(
    store: Arc<MemoryStore>,
    signals: Arc<dyn SignalStore>,
    feed: Arc<BroadcastTickFeed>,
    cooldown_secs: i64,
) -> StrategyEngine {
    let config = EngineConfig {
        tick_event: EVENT.to_string(),
        cooldown: chrono::Duration::seconds(cooldown_secs),
    };
    StrategyEngine::new(store.clone(), signals, store, feed, config, AnalyzerConfig::default())
}

async fn outcomes(engine: &StrategyEngine, tick: Tick) -> Vec<TriggerOutcome> {
    let mut results = Vec::new();
    for handle in engine.process_tick(&tick) {
        results.push(handle.await.unwrap());
    }
    results
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

/// Signal store that holds create calls open for a while
struct SlowStore {
    inner: Arc<MemoryStore>,
    delay: Duration,
    /// Delay only signals for this symbol; all when None
    only: Option<&'static str>,
}

#[async_trait]
impl SignalStore for SlowStore {
    async fn create_signal(&self, payload: SignalPayload, principal: &Principal) -> StoreResult<Signal> {
        if self.only.map_or(true, |symbol| symbol == payload.symbol) {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.create_signal(payload, principal).await
    }

    async fn update_signal_stats(
        &self,
        strategy_id: Uuid,
        increment: u64,
        last_signal_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.inner
            .update_signal_stats(strategy_id, increment, last_signal_at)
            .await
    }
}

struct RejectingStore;

#[async_trait]
impl SignalStore for RejectingStore {
    async fn create_signal(&self, _: SignalPayload, _: &Principal) -> StoreResult<Signal> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn update_signal_stats(&self, _: Uuid, _: u64, _: DateTime<Utc>) -> StoreResult<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_breakout_creates_one_signal() {
    let strategy = breakout(100.0, StrategyAction::Buy);
    let store = Arc::new(MemoryStore::with_strategies(vec![strategy.clone()]));
    let engine = engine(store.clone(), store.clone(), Arc::new(BroadcastTickFeed::default()), 30);
    engine.refresh_cache().await.unwrap();

    let results = outcomes(&engine, Tick::new("BTCUSDT", 101.0)).await;
    assert_eq!(results.len(), 1);

    let signals = store.signals().await;
    assert_eq!(signals.len(), 1);

    let signal = &signals[0];
    assert_eq!(signal.payload.symbol, "BTCUSDT");
    assert_eq!(signal.payload.direction, SignalDirection::Buy);
    assert_eq!(signal.payload.status, SignalStatus::Active);
    assert!(!signal.payload.is_free);
    assert!(approx(signal.payload.entry_price, 101.0));
    assert!(approx(signal.payload.stop_loss, 98.98));
    assert_eq!(signal.payload.targets.len(), 3);
    assert!(approx(signal.payload.targets[0], 103.02));
    assert!(approx(signal.payload.targets[1], 105.04));
    assert!(approx(signal.payload.targets[2], 107.06));
    assert_eq!(signal.payload.provenance.strategy_id, strategy.id);
    assert_eq!(signal.payload.note, "Auto-generated by strategy: Breakout");

    // Stats written through to the store
    let stored = store.strategy(strategy.id).await.unwrap();
    assert_eq!(stored.stats.total_signals, 1);
    assert!(stored.stats.last_signal_at.is_some());
}

#[tokio::test]
async fn test_second_tick_within_cooldown_is_ignored() {
    let store = Arc::new(MemoryStore::with_strategies(vec![breakout(100.0, StrategyAction::Buy)]));
    let engine = engine(store.clone(), store.clone(), Arc::new(BroadcastTickFeed::default()), 30);
    engine.refresh_cache().await.unwrap();

    outcomes(&engine, Tick::new("BTCUSDT", 101.0)).await;
    let second = outcomes(&engine, Tick::new("BTCUSDT", 102.0)).await;

    assert_eq!(second, vec![TriggerOutcome::CoolingDown]);
    assert_eq!(store.signals().await.len(), 1);
}

#[tokio::test]
async fn test_non_matching_tick_does_nothing() {
    let store = Arc::new(MemoryStore::with_strategies(vec![breakout(100.0, StrategyAction::Buy)]));
    let engine = engine(store.clone(), store.clone(), Arc::new(BroadcastTickFeed::default()), 30);
    engine.refresh_cache().await.unwrap();

    assert!(outcomes(&engine, Tick::new("BTCUSDT", 99.0)).await.is_empty());
    assert!(outcomes(&engine, Tick::new("ETHUSDT", 5000.0)).await.is_empty());
    assert!(store.signals().await.is_empty());
}

#[tokio::test]
async fn test_concurrent_ticks_create_single_signal() {
    let store = Arc::new(MemoryStore::with_strategies(vec![breakout(100.0, StrategyAction::Buy)]));
    let slow = Arc::new(SlowStore {
        inner: store.clone(),
        delay: Duration::from_millis(50),
        only: None,
    });
    let engine = engine(store.clone(), slow, Arc::new(BroadcastTickFeed::default()), 30);
    engine.refresh_cache().await.unwrap();

    let mut handles = engine.process_tick(&Tick::new("BTCUSDT", 101.0));
    handles.extend(engine.process_tick(&Tick::new("BTCUSDT", 101.5)));

    let mut created = 0;
    for handle in handles {
        match handle.await.unwrap() {
            TriggerOutcome::Created(_) => created += 1,
            TriggerOutcome::Duplicate | TriggerOutcome::CoolingDown => {}
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    assert_eq!(created, 1);
    assert_eq!(store.signals().await.len(), 1);
    assert!(engine.trigger().pending().is_empty());
}

#[tokio::test]
async fn test_advanced_indicator_never_matches() {
    let mut strategy = breakout(100.0, StrategyAction::Buy);
    strategy.rules.rules = vec![Rule {
        indicator: Indicator::Rsi,
        params: BTreeMap::from([("period".to_string(), 14.0)]),
        operator: Operator::Gt,
        target: RuleTarget::Value { value: 0.0 },
    }];

    let store = Arc::new(MemoryStore::with_strategies(vec![strategy]));
    let engine = engine(store.clone(), store.clone(), Arc::new(BroadcastTickFeed::default()), 30);
    engine.refresh_cache().await.unwrap();

    assert!(outcomes(&engine, Tick::new("BTCUSDT", 1_000_000.0)).await.is_empty());
    assert!(store.signals().await.is_empty());
}

#[tokio::test]
async fn test_alert_strategy_persists_nothing() {
    let store = Arc::new(MemoryStore::with_strategies(vec![breakout(100.0, StrategyAction::Alert)]));
    let engine = engine(store.clone(), store.clone(), Arc::new(BroadcastTickFeed::default()), 30);
    engine.refresh_cache().await.unwrap();

    let results = outcomes(&engine, Tick::new("BTCUSDT", 101.0)).await;

    assert_eq!(results, vec![TriggerOutcome::Skipped]);
    assert!(store.signals().await.is_empty());
}

#[tokio::test]
async fn test_refresh_is_idempotent_and_keeps_stats() {
    let strategy = breakout(100.0, StrategyAction::Buy);
    let store = Arc::new(MemoryStore::with_strategies(vec![strategy.clone()]));
    let engine = engine(store.clone(), store.clone(), Arc::new(BroadcastTickFeed::default()), 30);

    assert_eq!(engine.refresh_cache().await.unwrap(), 1);
    outcomes(&engine, Tick::new("BTCUSDT", 101.0)).await;

    assert_eq!(engine.refresh_cache().await.unwrap(), 1);
    assert_eq!(engine.refresh_cache().await.unwrap(), 1);

    let cached = engine.cache().get(strategy.id).unwrap();
    assert_eq!(cached.stats().total_signals, 1);

    // Cooldown survives the refresh
    let again = outcomes(&engine, Tick::new("BTCUSDT", 101.0)).await;
    assert_eq!(again, vec![TriggerOutcome::CoolingDown]);
}

#[tokio::test]
async fn test_refresh_between_lookup_and_trigger_keeps_cooldown() {
    let strategy = breakout(100.0, StrategyAction::Buy);
    let store = Arc::new(MemoryStore::with_strategies(vec![strategy.clone()]));
    let engine = engine(store.clone(), store.clone(), Arc::new(BroadcastTickFeed::default()), 30);
    engine.refresh_cache().await.unwrap();

    // Entry matched before a refresh, trigger runs after it
    let stale = engine.cache().lookup("BTCUSDT").remove(0);
    engine.refresh_cache().await.unwrap();

    let first = engine.trigger().fire(&stale, &Tick::new("BTCUSDT", 101.0)).await;
    let fresh = engine.cache().get(strategy.id).unwrap();
    let second = engine.trigger().fire(&fresh, &Tick::new("BTCUSDT", 102.0)).await;

    assert!(matches!(first, TriggerOutcome::Created(_)));
    assert_eq!(second, TriggerOutcome::CoolingDown);
    assert_eq!(store.signals().await.len(), 1);
}

#[tokio::test]
async fn test_slow_pair_does_not_hold_up_other_pairs() {
    let btc = breakout(100.0, StrategyAction::Buy);
    let mut eth = breakout(100.0, StrategyAction::Buy);
    eth.symbol = "ETHUSDT".to_string();

    let store = Arc::new(MemoryStore::with_strategies(vec![btc, eth]));
    let slow = Arc::new(SlowStore {
        inner: store.clone(),
        delay: Duration::from_secs(3),
        only: Some("BTCUSDT"),
    });
    let feed = Arc::new(BroadcastTickFeed::default());
    let engine = engine(store.clone(), slow, feed.clone(), 30);
    engine.start().await.unwrap();

    feed.publish(EVENT, Tick::new("BTCUSDT", 101.0));
    feed.publish(EVENT, Tick::new("ETHUSDT", 101.0));

    let signals = tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            let signals = store.signals().await;
            if !signals.is_empty() {
                return signals;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("ETHUSDT signal waited behind BTCUSDT");

    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0].payload.symbol, "ETHUSDT");
    // BTCUSDT still in flight
    assert_eq!(engine.trigger().pending().len(), 1);

    engine.stop().await;
}

#[tokio::test]
async fn test_refresh_picks_up_store_changes() {
    let mut strategy = breakout(100.0, StrategyAction::Buy);
    let store = Arc::new(MemoryStore::with_strategies(vec![strategy.clone()]));
    let engine = engine(store.clone(), store.clone(), Arc::new(BroadcastTickFeed::default()), 30);
    engine.refresh_cache().await.unwrap();

    strategy.status = StrategyStatus::Paused;
    store.upsert_strategy(strategy).await;
    engine.refresh_cache().await.unwrap();

    assert!(engine.cache().lookup("BTCUSDT").is_empty());
    assert!(outcomes(&engine, Tick::new("BTCUSDT", 101.0)).await.is_empty());
}

#[tokio::test]
async fn test_failed_store_releases_pending_key() {
    let store = Arc::new(MemoryStore::with_strategies(vec![breakout(100.0, StrategyAction::Buy)]));
    let engine = engine(store.clone(), Arc::new(RejectingStore), Arc::new(BroadcastTickFeed::default()), 0);
    engine.refresh_cache().await.unwrap();

    let first = outcomes(&engine, Tick::new("BTCUSDT", 101.0)).await;
    assert_eq!(first, vec![TriggerOutcome::Failed]);
    assert!(engine.trigger().pending().is_empty());

    // Nothing stuck: the next attempt reaches the store again
    let second = outcomes(&engine, Tick::new("BTCUSDT", 101.0)).await;
    assert_eq!(second, vec![TriggerOutcome::Failed]);
}

#[tokio::test]
async fn test_start_stop_lifecycle() {
    let store = Arc::new(MemoryStore::with_strategies(vec![breakout(100.0, StrategyAction::Buy)]));
    let feed = Arc::new(BroadcastTickFeed::default());
    let engine = engine(store.clone(), store.clone(), feed.clone(), 30);

    engine.start().await.unwrap();
    engine.start().await.unwrap();
    assert!(engine.is_running().await);
    assert_eq!(feed.subscriber_count(EVENT), 1);
    assert_eq!(engine.cache().len(), 1);

    engine.stop().await;
    engine.stop().await;
    assert!(!engine.is_running().await);
    assert_eq!(feed.subscriber_count(EVENT), 0);
    assert!(engine.cache().is_empty());

    // Restart reloads the cache
    engine.start().await.unwrap();
    assert_eq!(engine.cache().len(), 1);
    engine.stop().await;
}

#[tokio::test]
async fn test_feed_ticks_reach_the_store() {
    let store = Arc::new(MemoryStore::with_strategies(vec![breakout(100.0, StrategyAction::Sell)]));
    let feed = Arc::new(BroadcastTickFeed::default());
    let engine = engine(store.clone(), store.clone(), feed.clone(), 30);
    engine.start().await.unwrap();

    assert_eq!(feed.publish(EVENT, Tick::new("BTCUSDT", 99.0)), 1);
    assert_eq!(feed.publish(EVENT, Tick::new("BTCUSDT", 150.0)), 1);

    let signals = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let signals = store.signals().await;
            if !signals.is_empty() {
                return signals;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("signal not created in time");

    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0].payload.direction, SignalDirection::Sell);
    assert!(approx(signals[0].payload.entry_price, 150.0));
    // Sell levels use the same factors as Buy
    assert!(approx(signals[0].payload.stop_loss, 147.0));

    engine.stop().await;
}

#[tokio::test]
async fn test_ticks_ignored_after_stop() {
    let store = Arc::new(MemoryStore::with_strategies(vec![breakout(100.0, StrategyAction::Buy)]));
    let feed = Arc::new(BroadcastTickFeed::default());
    let engine = engine(store.clone(), store.clone(), feed.clone(), 30);

    engine.start().await.unwrap();
    engine.stop().await;

    assert_eq!(feed.publish(EVENT, Tick::new("BTCUSDT", 101.0)), 0);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(store.signals().await.is_empty());
}

#[tokio::test]
async fn test_seed_inserts_default_once() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine(store.clone(), store.clone(), Arc::new(BroadcastTickFeed::default()), 30);
    let user = Uuid::new_v4();

    assert!(engine.seed(user).await.unwrap());
    assert!(!engine.seed(user).await.unwrap());

    let default = store.find_default().await.unwrap().unwrap();
    assert_eq!(default.symbol, "BTCUSDT");
    assert_eq!(default.user_id, user);
    assert!(default.is_system);
}
