use thiserror::Error;
use uuid::Uuid;

/// Failures reported by external collaborators (stores, candle sources, feeds)
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid stored data: {0}")]
    InvalidData(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced by the on-demand analysis path
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("no candle data for symbol {0}")]
    SymbolNotFound(String),

    #[error("strategy {0} not found")]
    StrategyNotFound(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Engine lifecycle errors
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to load strategies: {0}")]
    Store(#[from] StoreError),
}
