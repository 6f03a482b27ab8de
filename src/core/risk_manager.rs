//! Symbol-level guardrails for single-position strategies
//!
//! Stateless checks over the `grid_strategies` / `grid_orders` tables:
//! notional ceiling per symbol, concurrent strategy ceiling, and
//! stop-loss detection. Independent of the per-ladder position cap the
//! grid engine applies to its own levels.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::db::{Database, GridOrder, GridStrategy, PositionDirection, StrategyStatus};
use crate::error::{GridError, GridResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskDecision {
    Allowed,
    Rejected { reason: String },
}

impl RiskDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RiskDecision::Allowed)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            RiskDecision::Allowed => None,
            RiskDecision::Rejected { reason } => Some(reason),
        }
    }

    fn reject(reason: String) -> Self {
        RiskDecision::Rejected { reason }
    }
}

#[derive(Clone)]
pub struct RiskManager {
    db: Database,
}

impl RiskManager {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Sum of entry notional over active strategies on `symbol`
    pub fn calculate_total_position_value(&self, symbol: &str) -> GridResult<Decimal> {
        Ok(GridStrategy::list_active_by_symbol(&self.db, symbol)?
            .iter()
            .map(GridStrategy::position_value)
            .sum())
    }

    pub fn check_max_position_limit(
        &self,
        symbol: &str,
        new_position_value: Decimal,
        max_position_value: Decimal,
    ) -> GridResult<RiskDecision> {
        let current = self.calculate_total_position_value(symbol)?;
        let total = current + new_position_value;
        if total > max_position_value {
            return Ok(RiskDecision::reject(format!(
                "position value {} on {} would exceed limit {} (current {})",
                total, symbol, max_position_value, current
            )));
        }
        Ok(RiskDecision::Allowed)
    }

    pub fn check_concurrent_strategy_limit(
        &self,
        symbol: &str,
        max_concurrent: usize,
    ) -> GridResult<RiskDecision> {
        let active = GridStrategy::list_active_by_symbol(&self.db, symbol)?.len();
        if active >= max_concurrent {
            return Ok(RiskDecision::reject(format!(
                "{} already has {} active strategies (max {})",
                symbol, active, max_concurrent
            )));
        }
        Ok(RiskDecision::Allowed)
    }

    /// Long stops at entry * (1 - pct), short at entry * (1 + pct)
    pub fn check_stop_loss(strategy: &GridStrategy, price: Decimal) -> bool {
        let Some(entry) = strategy.entry_price else {
            return false;
        };
        match strategy.direction {
            PositionDirection::Long => price <= entry * (Decimal::ONE - strategy.stop_loss_pct),
            PositionDirection::Short => price >= entry * (Decimal::ONE + strategy.stop_loss_pct),
        }
    }

    /// Concurrency first, then notional
    pub fn validate_new_strategy(
        &self,
        symbol: &str,
        position_value: Decimal,
        max_position_value: Decimal,
        max_concurrent: usize,
    ) -> GridResult<RiskDecision> {
        let decision = self.check_concurrent_strategy_limit(symbol, max_concurrent)?;
        if !decision.is_allowed() {
            warn!("Rejected new strategy on {}: {:?}", symbol, decision.reason());
            return Ok(decision);
        }
        let decision = self.check_max_position_limit(symbol, position_value, max_position_value)?;
        if !decision.is_allowed() {
            warn!("Rejected new strategy on {}: {:?}", symbol, decision.reason());
        }
        Ok(decision)
    }

    /// Recompute and store unrealized PnL at `price`
    pub fn mark_to_market(&self, strategy_id: i64, price: Decimal) -> GridResult<Decimal> {
        let mut strategy = self.load(strategy_id)?;
        let pnl = match strategy.entry_price {
            Some(entry) => match strategy.direction {
                PositionDirection::Long => (price - entry) * strategy.position_size,
                PositionDirection::Short => (entry - price) * strategy.position_size,
            },
            None => Decimal::ZERO,
        };
        strategy.current_pnl = pnl;
        strategy.update(&self.db)?;
        Ok(pnl)
    }

    /// Stop the strategy and cancel its pending orders if its stop is hit
    pub fn enforce_stop_loss(&self, strategy_id: i64, price: Decimal) -> GridResult<bool> {
        let strategy = self.load(strategy_id)?;
        if strategy.status != StrategyStatus::Active || !Self::check_stop_loss(&strategy, price) {
            return Ok(false);
        }

        GridStrategy::set_status(&self.db, strategy_id, StrategyStatus::Stopped)?;
        let cancelled = GridOrder::cancel_pending(&self.db, strategy_id)?;
        info!(
            "Stop-loss hit for strategy {} ({}) at {}: stopped, {} orders cancelled",
            strategy.name, strategy.symbol, price, cancelled
        );
        Ok(true)
    }

    fn load(&self, strategy_id: i64) -> GridResult<GridStrategy> {
        GridStrategy::find_by_id(&self.db, strategy_id)?
            .ok_or_else(|| GridError::not_found("GridStrategy", strategy_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn strategy(direction: PositionDirection, entry: Decimal) -> GridStrategy {
        let mut s = GridStrategy::new("BTCUSDT", "t", direction, dec!(1), dec!(0.05));
        s.entry_price = Some(entry);
        s.status = StrategyStatus::Active;
        s
    }

    #[test]
    fn test_stop_loss_thresholds() {
        let long = strategy(PositionDirection::Long, dec!(100));
        assert!(!RiskManager::check_stop_loss(&long, dec!(95.01)));
        assert!(RiskManager::check_stop_loss(&long, dec!(95)));

        let short = strategy(PositionDirection::Short, dec!(100));
        assert!(!RiskManager::check_stop_loss(&short, dec!(104.99)));
        assert!(RiskManager::check_stop_loss(&short, dec!(105)));

        let flat = GridStrategy::new("BTCUSDT", "t", PositionDirection::Long, dec!(1), dec!(0.05));
        assert!(!RiskManager::check_stop_loss(&flat, dec!(1)));
    }

    #[test]
    fn test_decision_accessors() {
        assert!(RiskDecision::Allowed.is_allowed());
        let rejected = RiskDecision::reject("too big".to_string());
        assert_eq!(rejected.reason(), Some("too big"));
    }
}
