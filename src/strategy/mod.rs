// Strategy evaluation: rule matching and the in-memory strategy cache
pub mod cache;
pub mod rules;

pub use cache::{CachedStrategy, StrategyCache};
pub use rules::RuleEvaluator;
