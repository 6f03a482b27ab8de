//! Ideal-order derivation per grid mode
//!
//! Every function here is pure: the order a level *should* have resting
//! on the exchange depends only on the config and the level's own state.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::level::{GridLevel, LevelEvent};
use crate::db::GridConfig;
use crate::error::GridResult;
use crate::types::{GridMode, LevelStatus, OrderIntentKind, OrderSide};

/// The order a level should currently have on the book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdealOrder {
    pub level_index: i32,
    pub intent: OrderIntentKind,
    pub side: OrderSide,
    pub price: Decimal,
    pub amount: Decimal,
}

impl IdealOrder {
    /// Position change if this order fills completely
    pub fn position_delta(&self) -> Decimal {
        Decimal::from(self.side.sign()) * self.amount
    }
}

/// Capability shared by every grid mode
pub trait LevelStrategy {
    fn mode(&self) -> GridMode;

    /// Whether idle levels on this side open positions
    fn enters_on(&self, side: OrderSide) -> bool;

    fn ideal_order_for(&self, config: &GridConfig, level: &GridLevel) -> Option<IdealOrder> {
        let amount = config.order_amount();
        match level.status() {
            // No entry where the clamped exit would land on the entry price
            LevelStatus::Idle
                if self.enters_on(level.side) && exit_price(config, level) != level.price =>
            {
                Some(IdealOrder {
                    level_index: level.level_index,
                    intent: OrderIntentKind::Entry,
                    side: level.side,
                    price: level.price,
                    amount,
                })
            }
            LevelStatus::Idle => None,
            LevelStatus::EntryWorking => Some(IdealOrder {
                level_index: level.level_index,
                intent: OrderIntentKind::Entry,
                side: level.side,
                price: level.price,
                amount,
            }),
            LevelStatus::PositionOpen | LevelStatus::ExitWorking => Some(IdealOrder {
                level_index: level.level_index,
                intent: OrderIntentKind::Exit,
                side: level.side.opposite(),
                price: exit_price(config, level),
                amount,
            }),
        }
    }

    fn compute_ideal_orders(&self, config: &GridConfig, levels: &[GridLevel]) -> Vec<IdealOrder> {
        levels
            .iter()
            .filter_map(|level| self.ideal_order_for(config, level))
            .collect()
    }

    /// Drive the level forward for a filled order
    fn on_fill(&self, level: &mut GridLevel, intent: OrderIntentKind) -> GridResult<LevelStatus> {
        level.transition(LevelEvent::filled(intent))
    }

    fn get_position(&self, config: &GridConfig, levels: &[GridLevel]) -> Decimal {
        get_current_position(config, levels)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyMode {
    Short,
    Long,
    Neutral,
}

impl From<GridMode> for StrategyMode {
    fn from(mode: GridMode) -> Self {
        match mode {
            GridMode::Short => StrategyMode::Short,
            GridMode::Long => StrategyMode::Long,
            GridMode::Neutral => StrategyMode::Neutral,
        }
    }
}

impl LevelStrategy for StrategyMode {
    fn mode(&self) -> GridMode {
        match self {
            StrategyMode::Short => GridMode::Short,
            StrategyMode::Long => GridMode::Long,
            StrategyMode::Neutral => GridMode::Neutral,
        }
    }

    fn enters_on(&self, side: OrderSide) -> bool {
        match self {
            StrategyMode::Short => side == OrderSide::Sell,
            StrategyMode::Long => side == OrderSide::Buy,
            StrategyMode::Neutral => true,
        }
    }
}

/// One spacing back toward the center, on the tick, inside the band
pub fn exit_price(config: &GridConfig, level: &GridLevel) -> Decimal {
    let spacing = config.grid_spacing();
    let raw = match level.side {
        OrderSide::Sell => level.price - spacing,
        OrderSide::Buy => level.price + spacing,
    };
    config
        .quantize_price(raw)
        .max(config.lower_price)
        .min(config.upper_price)
}

/// Signed inventory: each level holding a position contributes one
/// order amount, negative for short entries.
pub fn get_current_position(config: &GridConfig, levels: &[GridLevel]) -> Decimal {
    let amount = config.order_amount();
    levels
        .iter()
        .filter(|level| level.status().holds_position())
        .map(|level| Decimal::from(level.side.sign()) * amount)
        .sum()
}

pub fn check_position_limit(position: Decimal, max_position_size: Decimal) -> bool {
    position.abs() <= max_position_size
}

/// Result of applying the position ceiling to a set of ideal orders
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilteredOrders {
    pub allowed: Vec<IdealOrder>,
    pub filtered: Vec<IdealOrder>,
}

/// Admit entry orders while the worst case on each side stays within
/// `max_position_size`. Buys accumulate toward the long bound and sells
/// toward the short bound, exits included, so any subset of the admitted
/// orders filling keeps |position| under the cap. Entries closest to the
/// center are considered first. Exits are always allowed.
pub fn filter_orders_by_position_limit(
    orders: Vec<IdealOrder>,
    current_position: Decimal,
    max_position_size: Decimal,
) -> FilteredOrders {
    let (exits, mut entries): (Vec<_>, Vec<_>) = orders
        .into_iter()
        .partition(|order| order.intent == OrderIntentKind::Exit);
    entries.sort_by_key(|order| (order.level_index.abs(), order.level_index));

    let mut long_bound = current_position;
    let mut short_bound = current_position;
    for exit in &exits {
        match exit.side {
            OrderSide::Buy => long_bound += exit.position_delta(),
            OrderSide::Sell => short_bound += exit.position_delta(),
        }
    }

    let mut result = FilteredOrders {
        allowed: exits,
        filtered: Vec::new(),
    };

    for order in entries {
        let bound = match order.side {
            OrderSide::Buy => &mut long_bound,
            OrderSide::Sell => &mut short_bound,
        };
        let next = *bound + order.position_delta();
        if next.abs() > max_position_size {
            result.filtered.push(order);
        } else {
            *bound = next;
            result.allowed.push(order);
        }
    }

    result.allowed.sort_by_key(|order| (order.level_index, order.intent));
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::level::OrderRef;
    use crate::types::GridMode;
    use rust_decimal_macros::dec;

    fn config(mode: GridMode) -> GridConfig {
        let mut config = GridConfig::new(
            "btc", "sim", "BTCUSDT", mode, dec!(60000), dec!(65000), 20, dec!(1), dec!(3),
        );
        config.id = Some(1);
        config
    }

    fn open(mut level: GridLevel) -> GridLevel {
        level.transition(LevelEvent::EntryPlaced(OrderRef::new("e", "c"))).unwrap();
        level.transition(LevelEvent::EntryFilled).unwrap();
        level
    }

    #[test]
    fn test_short_ideal_orders() {
        let config = config(GridMode::Short);
        let strategy = StrategyMode::from(GridMode::Short);

        let sell = GridLevel::new(1, 1, dec!(62631.58), OrderSide::Sell);
        let buy = GridLevel::new(1, 0, dec!(62368.42), OrderSide::Buy);

        let entry = strategy.ideal_order_for(&config, &sell).unwrap();
        assert_eq!(entry.intent, OrderIntentKind::Entry);
        assert_eq!(entry.side, OrderSide::Sell);
        assert_eq!(entry.price, dec!(62631.58));
        assert!(strategy.ideal_order_for(&config, &buy).is_none());

        let exit = strategy.ideal_order_for(&config, &open(sell)).unwrap();
        assert_eq!(exit.intent, OrderIntentKind::Exit);
        assert_eq!(exit.side, OrderSide::Buy);
        assert_eq!(exit.price, dec!(62368.42));
    }

    #[test]
    fn test_exit_price_is_clamped_to_band() {
        let config = config(GridMode::Short);
        let lowest_sell = GridLevel::new(1, -9, dec!(60000), OrderSide::Sell);
        assert_eq!(exit_price(&config, &lowest_sell), dec!(60000));

        let highest_buy = GridLevel::new(1, 10, dec!(65000), OrderSide::Buy);
        assert_eq!(exit_price(&config, &highest_buy), dec!(65000));

        // A long entry there could only exit at its own price
        let long = StrategyMode::Long;
        assert!(long.ideal_order_for(&config, &highest_buy).is_none());
        let exit = long.ideal_order_for(&config, &open(highest_buy)).unwrap();
        assert_eq!(exit.intent, OrderIntentKind::Exit);
        assert_eq!(exit.price, dec!(65000));
    }

    #[test]
    fn test_long_mirrors_short() {
        let config = config(GridMode::Long);
        let strategy = StrategyMode::Long;

        let buy = GridLevel::new(1, -1, dec!(62368.42), OrderSide::Buy);
        let sell = GridLevel::new(1, 1, dec!(62631.58), OrderSide::Sell);
        assert_eq!(strategy.ideal_order_for(&config, &buy).unwrap().side, OrderSide::Buy);
        assert!(strategy.ideal_order_for(&config, &sell).is_none());

        let exit = strategy.ideal_order_for(&config, &open(buy)).unwrap();
        assert_eq!(exit.side, OrderSide::Sell);
        assert_eq!(exit.price, dec!(62631.58));
    }

    #[test]
    fn test_position_sign_follows_side() {
        let config = config(GridMode::Neutral);
        let levels = vec![
            open(GridLevel::new(1, 1, dec!(62631.58), OrderSide::Sell)),
            open(GridLevel::new(1, 2, dec!(62894.74), OrderSide::Sell)),
            open(GridLevel::new(1, -1, dec!(62105.26), OrderSide::Buy)),
            GridLevel::new(1, 3, dec!(63157.89), OrderSide::Sell),
        ];
        assert_eq!(get_current_position(&config, &levels), dec!(-1));
        assert!(check_position_limit(dec!(-3), dec!(3)));
        assert!(!check_position_limit(dec!(-3.5), dec!(3)));
    }

    #[test]
    fn test_filter_caps_cumulative_entries() {
        let entries: Vec<IdealOrder> = (1..=5)
            .map(|i| IdealOrder {
                level_index: i,
                intent: OrderIntentKind::Entry,
                side: OrderSide::Sell,
                price: Decimal::from(100 + i),
                amount: dec!(1),
            })
            .collect();
        let exit = IdealOrder {
            level_index: 7,
            intent: OrderIntentKind::Exit,
            side: OrderSide::Buy,
            price: dec!(99),
            amount: dec!(1),
        };
        let mut orders = entries.clone();
        orders.push(exit.clone());

        let result = filter_orders_by_position_limit(orders, dec!(-1), dec!(3));
        assert_eq!(result.allowed.len(), 3);
        assert!(result.allowed.contains(&exit));
        assert_eq!(result.filtered.len(), 3);
        let kept: Vec<i32> = result
            .allowed
            .iter()
            .filter(|o| o.intent == OrderIntentKind::Entry)
            .map(|o| o.level_index)
            .collect();
        assert_eq!(kept, vec![1, 2]);
    }

    #[test]
    fn test_exits_pass_even_over_the_limit() {
        let exit = IdealOrder {
            level_index: 2,
            intent: OrderIntentKind::Exit,
            side: OrderSide::Buy,
            price: dec!(99),
            amount: dec!(1),
        };
        let result = filter_orders_by_position_limit(vec![exit], dec!(-10), dec!(3));
        assert_eq!(result.allowed.len(), 1);
        assert!(result.filtered.is_empty());
    }

    #[test]
    fn test_neutral_bounds_each_side_separately() {
        let order = |level_index: i32, side: OrderSide| IdealOrder {
            level_index,
            intent: OrderIntentKind::Entry,
            side,
            price: dec!(100),
            amount: dec!(1),
        };
        let orders = vec![
            order(-2, OrderSide::Buy),
            order(-1, OrderSide::Buy),
            order(1, OrderSide::Sell),
            order(2, OrderSide::Sell),
        ];
        let result = filter_orders_by_position_limit(orders, Decimal::ZERO, dec!(1));
        assert_eq!(result.allowed.len(), 2);
        assert_eq!(result.filtered.len(), 2);
        assert!(result.allowed.iter().any(|o| o.side == OrderSide::Buy));
        assert!(result.allowed.iter().any(|o| o.side == OrderSide::Sell));
    }

    #[test]
    fn test_exits_count_toward_their_side() {
        // Two shorts open: their buy exits already spend the long side back to zero
        let exit = |level_index: i32| IdealOrder {
            level_index,
            intent: OrderIntentKind::Exit,
            side: OrderSide::Buy,
            price: dec!(99),
            amount: dec!(1),
        };
        let buy = |level_index: i32| IdealOrder {
            level_index,
            intent: OrderIntentKind::Entry,
            side: OrderSide::Buy,
            price: dec!(98),
            amount: dec!(1),
        };
        let orders = vec![exit(1), exit(2), buy(-1), buy(-2), buy(-3)];
        let result = filter_orders_by_position_limit(orders, dec!(-2), dec!(2));
        assert_eq!(result.allowed.len(), 4);
        assert_eq!(result.filtered.len(), 1);
        assert_eq!(result.filtered[0].level_index, -3);
    }
}
