//! Real-time strategy engine
//!
//! Subscribes to the tick feed, matches each tick against the cached
//! strategies for its symbol and hands every match to the signal trigger on
//! its own task, so a slow store never holds up later ticks.

use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::analysis::{AnalyzerConfig, MultiTimeframeAnalyzer, MultiTimeframeReport};
use crate::error::{AnalysisError, EngineError};
use crate::feed::{RecvError, TickFeed, TickSubscription};
use crate::models::{Operator, Rule, Strategy, StrategyAction, Tick, Timeframe};
use crate::store::{CandleSource, SignalStore, StrategyStore};
use crate::strategy::{RuleEvaluator, StrategyCache};

pub mod pending;
pub mod trigger;

pub use pending::{PendingGuard, PendingKey, PendingPermit};
pub use trigger::{SignalTrigger, TriggerOutcome};

pub const DEFAULT_TICK_EVENT: &str = "price_update";
pub const DEFAULT_COOLDOWN_SECS: i64 = 30;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Feed event carrying price ticks
    pub tick_event: String,
    /// Minimum time between signals from one strategy
    pub cooldown: chrono::Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_event: DEFAULT_TICK_EVENT.to_string(),
            cooldown: chrono::Duration::seconds(DEFAULT_COOLDOWN_SECS),
        }
    }
}

/// The example strategy inserted by [`StrategyEngine::seed`]
pub fn default_strategy(user_id: Uuid) -> Strategy {
    let mut strategy = Strategy::new(
        user_id,
        "Sample BTCUSDT Breakout",
        "BTCUSDT",
        Rule::price(Operator::Gt, 100_000.0),
        StrategyAction::Buy,
    );
    strategy.is_system = true;
    strategy.is_default = true;
    strategy
}

/// Matches ticks and spawns trigger tasks; shared with the dispatch task
#[derive(Clone)]
struct Dispatcher {
    cache: Arc<StrategyCache>,
    evaluator: RuleEvaluator,
    trigger: Arc<SignalTrigger>,
}

impl Dispatcher {
    fn dispatch(&self, tick: &Tick) -> Vec<JoinHandle<TriggerOutcome>> {
        self.cache
            .lookup(&tick.symbol)
            .into_iter()
            .filter(|cached| self.evaluator.evaluate(&cached.strategy().rules, tick))
            .map(|cached| {
                debug!(strategy_id = %cached.id(), symbol = %tick.symbol, price = tick.price, "Rule matched");
                let trigger = Arc::clone(&self.trigger);
                let tick = tick.clone();
                tokio::spawn(async move { trigger.fire(&cached, &tick).await })
            })
            .collect()
    }

    async fn run(self, mut subscription: TickSubscription) {
        loop {
            match subscription.recv().await {
                Ok(tick) => {
                    self.dispatch(&tick);
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(event = subscription.event(), skipped, "Tick dispatcher lagging, ticks dropped");
                }
                Err(RecvError::Closed) => {
                    info!(event = subscription.event(), "Tick feed closed");
                    break;
                }
            }
        }
    }
}

enum EngineState {
    Stopped,
    Running { dispatcher: JoinHandle<()> },
}

pub struct StrategyEngine {
    dispatcher: Dispatcher,
    strategies: Arc<dyn StrategyStore>,
    feed: Arc<dyn TickFeed>,
    analyzer: MultiTimeframeAnalyzer,
    config: EngineConfig,
    state: Mutex<EngineState>,
}

impl StrategyEngine {
    pub fn new(
        strategies: Arc<dyn StrategyStore>,
        signals: Arc<dyn SignalStore>,
        candles: Arc<dyn CandleSource>,
        feed: Arc<dyn TickFeed>,
        config: EngineConfig,
        analyzer_config: AnalyzerConfig,
    ) -> Self {
        let dispatcher = Dispatcher {
            cache: Arc::new(StrategyCache::new(Arc::clone(&strategies))),
            evaluator: RuleEvaluator::default(),
            trigger: Arc::new(SignalTrigger::new(signals, config.cooldown)),
        };

        Self {
            dispatcher,
            strategies,
            feed,
            analyzer: MultiTimeframeAnalyzer::new(candles, analyzer_config),
            config,
            state: Mutex::new(EngineState::Stopped),
        }
    }

    /// Load strategies and begin consuming ticks; no-op when running
    pub async fn start(&self) -> Result<(), EngineError> {
        let mut state = self.state.lock().await;
        if matches!(*state, EngineState::Running { .. }) {
            debug!("Engine already running");
            return Ok(());
        }

        let count = self.dispatcher.cache.refresh().await?;
        let subscription = self.feed.subscribe(&self.config.tick_event);
        let dispatcher = tokio::spawn(self.dispatcher.clone().run(subscription));

        *state = EngineState::Running { dispatcher };
        info!(strategies = count, event = %self.config.tick_event, "Strategy engine started");
        Ok(())
    }

    /// Stop consuming ticks and drop the cache; no-op when stopped
    ///
    /// Trigger tasks already spawned run to completion.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        let EngineState::Running { dispatcher } = std::mem::replace(&mut *state, EngineState::Stopped)
        else {
            debug!("Engine already stopped");
            return;
        };

        // Cancelling the dispatch task drops its subscription
        dispatcher.abort();
        let _ = dispatcher.await;

        self.dispatcher.cache.clear();
        info!("Strategy engine stopped");
    }

    pub async fn is_running(&self) -> bool {
        matches!(*self.state.lock().await, EngineState::Running { .. })
    }

    /// Re-read every active strategy; call after any create/update/delete
    pub async fn refresh_cache(&self) -> Result<usize, EngineError> {
        Ok(self.dispatcher.cache.refresh().await?)
    }

    /// Insert the example strategy unless a default strategy already exists
    ///
    /// Returns true when a strategy was inserted.
    pub async fn seed(&self, default_user: Uuid) -> Result<bool, EngineError> {
        if let Some(existing) = self.strategies.find_default().await? {
            debug!(strategy_id = %existing.id, "Default strategy already present");
            return Ok(false);
        }

        let strategy = default_strategy(default_user);
        self.strategies.insert(&strategy).await?;
        info!(strategy_id = %strategy.id, name = %strategy.name, "Seeded default strategy");

        if self.is_running().await {
            self.refresh_cache().await?;
        }

        Ok(true)
    }

    /// Match one tick against the cache and spawn its triggers
    ///
    /// The dispatch task calls this for every feed tick; the handles let
    /// callers wait for the outcomes.
    pub fn process_tick(&self, tick: &Tick) -> Vec<JoinHandle<TriggerOutcome>> {
        self.dispatcher.dispatch(tick)
    }

    pub async fn analyze(
        &self,
        symbol: &str,
        timeframes: &[Timeframe],
    ) -> Result<MultiTimeframeReport, AnalysisError> {
        self.analyzer.analyze(symbol, timeframes).await
    }

    /// Analyze a cached strategy's symbol on its own timeframe
    pub async fn analyze_strategy(&self, id: Uuid) -> Result<MultiTimeframeReport, AnalysisError> {
        let cached = self
            .dispatcher
            .cache
            .get(id)
            .ok_or(AnalysisError::StrategyNotFound(id))?;
        let strategy = cached.strategy();

        self.analyzer
            .analyze(&strategy.symbol, &[strategy.timeframe, Timeframe::D1])
            .await
    }

    pub fn cache(&self) -> &Arc<StrategyCache> {
        &self.dispatcher.cache
    }

    pub fn trigger(&self) -> &Arc<SignalTrigger> {
        &self.dispatcher.trigger
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
