/// Tick-level rule evaluation
///
/// Only the first rule of a tree is inspected and the AND/OR condition is
/// not applied yet. Candle-based indicators never match here; they belong to
/// the multi-timeframe analyzer.

use crate::models::{Operator, Rule, RuleTarget, RuleTree, Tick};

#[derive(Debug, Clone)]
pub struct RuleEvaluator {
    /// Absolute tolerance for `==`
    eq_tolerance: f64,
}

impl Default for RuleEvaluator {
    fn default() -> Self {
        Self { eq_tolerance: 1e-9 }
    }
}

impl RuleEvaluator {
    pub fn new(eq_tolerance: f64) -> Self {
        Self { eq_tolerance }
    }

    /// Whether the tick satisfies the strategy's rules
    pub fn evaluate(&self, tree: &RuleTree, tick: &Tick) -> bool {
        match tree.rules.first() {
            Some(rule) => self.evaluate_rule(rule, tick.price),
            None => false,
        }
    }

    fn evaluate_rule(&self, rule: &Rule, price: f64) -> bool {
        if rule.indicator.is_advanced() {
            return false;
        }

        let threshold = match rule.target {
            RuleTarget::Value { value } => value,
            // No literal to compare against at tick level
            RuleTarget::Indicator { .. } => return false,
        };

        self.compare(price, rule.operator, threshold)
    }

    fn compare(&self, price: f64, operator: Operator, threshold: f64) -> bool {
        match operator {
            Operator::Gt | Operator::CrossAbove => price > threshold,
            Operator::Lt | Operator::CrossBelow => price < threshold,
            Operator::Gte => price >= threshold,
            Operator::Lte => price <= threshold,
            Operator::Eq => (price - threshold).abs() <= self.eq_tolerance,
        }
    }
}
