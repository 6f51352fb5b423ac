use ::config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;
use uuid::Uuid;

use crate::analysis::AnalyzerConfig;
use crate::engine::EngineConfig;

const DEFAULT_CONFIG_PATH: &str = "config/default";

/// Runtime settings
///
/// Read from `config/default.toml` when present, then `SIGNALBOT_*`
/// environment variables (e.g. `SIGNALBOT_DATABASE_URL`).
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Postgres for strategies and signals; in-memory store when unset
    pub database_url: Option<String>,
    /// Redis for candles and the tick bridge
    pub redis_url: Option<String>,
    /// Kline HTTP API, preferred over Redis for candles when set
    pub candle_api_url: Option<String>,
    pub tick_event: String,
    /// Redis pub/sub channel bridged onto the tick feed
    pub tick_channel: String,
    pub feed_capacity: usize,
    pub cooldown_secs: u64,
    pub lookback_candles: usize,
    pub log_filter: String,
    /// Owner of the seeded default strategy
    pub default_user_id: Option<Uuid>,
}

impl Settings {
    /// Load from the default config file and the environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::with_defaults()?
            .add_source(File::with_name(DEFAULT_CONFIG_PATH).required(false))
            .add_source(
                Environment::with_prefix("SIGNALBOT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Parse settings from TOML text layered over the defaults
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        Self::with_defaults()?
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    fn with_defaults() -> Result<::config::ConfigBuilder<::config::builder::DefaultState>, ConfigError> {
        Config::builder()
            .set_default("tick_event", crate::engine::DEFAULT_TICK_EVENT)?
            .set_default("tick_channel", "ticks")?
            .set_default("feed_capacity", crate::feed::DEFAULT_CAPACITY as u64)?
            .set_default("cooldown_secs", crate::engine::DEFAULT_COOLDOWN_SECS)?
            .set_default("lookback_candles", 200u64)?
            .set_default("log_filter", "signalbot=info")
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            tick_event: self.tick_event.clone(),
            cooldown: chrono::Duration::seconds(i64::try_from(self.cooldown_secs).unwrap_or(i64::MAX)),
        }
    }

    pub fn analyzer_config(&self) -> AnalyzerConfig {
        AnalyzerConfig {
            lookback_candles: self.lookback_candles,
            ..AnalyzerConfig::default()
        }
    }
}
