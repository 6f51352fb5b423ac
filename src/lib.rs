// Core modules
pub mod analysis;
pub mod api;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod feed;
pub mod indicators;
pub mod models;
pub mod persistence;
pub mod store;
pub mod strategy;

// Re-export commonly used types
pub use analysis::{MultiTimeframeAnalyzer, MultiTimeframeReport};
pub use engine::{EngineConfig, StrategyEngine, TriggerOutcome};
pub use error::{AnalysisError, EngineError, StoreError};
pub use models::*;

// Error handling
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
