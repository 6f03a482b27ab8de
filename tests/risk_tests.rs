// Integration tests for symbol-level risk guardrails

mod common;

use rust_decimal_macros::dec;

use grid_engine::{
    GridOrder, GridOrderStatus, GridStrategy, OrderSide, PositionDirection, RiskManager,
    StrategyStatus,
};
use common::memory_db;

fn active_strategy(
    db: &grid_engine::Database,
    name: &str,
    direction: PositionDirection,
    entry: rust_decimal::Decimal,
    size: rust_decimal::Decimal,
) -> i64 {
    let mut strategy = GridStrategy::new("BTCUSDT", name, direction, size, dec!(0.05));
    strategy.entry_price = Some(entry);
    strategy.status = StrategyStatus::Active;
    strategy.insert(db).expect("Failed to insert strategy")
}

#[test]
fn test_position_value_sums_active_strategies() {
    let db = memory_db();
    active_strategy(&db, "a", PositionDirection::Long, dec!(60000), dec!(0.1));
    active_strategy(&db, "b", PositionDirection::Short, dec!(62000), dec!(0.05));

    let idle = GridStrategy::new("BTCUSDT", "idle", PositionDirection::Long, dec!(1), dec!(0.05));
    idle.insert(&db).unwrap();

    let risk = RiskManager::new((*db).clone());
    assert_eq!(risk.calculate_total_position_value("BTCUSDT").unwrap(), dec!(9100));
    assert_eq!(risk.calculate_total_position_value("ETHUSDT").unwrap(), dec!(0));
}

#[test]
fn test_validate_new_strategy() {
    let db = memory_db();
    let risk = RiskManager::new((*db).clone());

    assert!(risk
        .validate_new_strategy("BTCUSDT", dec!(5000), dec!(10000), 2)
        .unwrap()
        .is_allowed());

    active_strategy(&db, "a", PositionDirection::Long, dec!(60000), dec!(0.1));

    let too_big = risk
        .validate_new_strategy("BTCUSDT", dec!(5000), dec!(10000), 2)
        .unwrap();
    assert!(!too_big.is_allowed());
    assert!(too_big.reason().unwrap().contains("exceed"));

    active_strategy(&db, "b", PositionDirection::Long, dec!(100), dec!(1));
    let too_many = risk
        .validate_new_strategy("BTCUSDT", dec!(1), dec!(1000000), 2)
        .unwrap();
    assert!(too_many.reason().unwrap().contains("active strategies"));
}

#[test]
fn test_enforce_stop_loss_stops_strategy_and_cancels_orders() {
    let db = memory_db();
    let id = active_strategy(&db, "long", PositionDirection::Long, dec!(100), dec!(2));
    GridOrder::new(id, OrderSide::Buy, dec!(98), dec!(1)).insert(&db).unwrap();
    GridOrder::new(id, OrderSide::Sell, dec!(102), dec!(1)).insert(&db).unwrap();

    let risk = RiskManager::new((*db).clone());
    assert!(!risk.enforce_stop_loss(id, dec!(96)).unwrap());
    assert!(risk.enforce_stop_loss(id, dec!(95)).unwrap());

    let stopped = GridStrategy::find_by_id(&db, id).unwrap().unwrap();
    assert_eq!(stopped.status, StrategyStatus::Stopped);
    let orders = GridOrder::list_by_strategy(&db, id).unwrap();
    assert!(orders.iter().all(|o| o.status == GridOrderStatus::Cancelled));

    // Already stopped: nothing further to do
    assert!(!risk.enforce_stop_loss(id, dec!(90)).unwrap());
}

#[test]
fn test_mark_to_market() {
    let db = memory_db();
    let long = active_strategy(&db, "long", PositionDirection::Long, dec!(100), dec!(2));
    let short = active_strategy(&db, "short", PositionDirection::Short, dec!(100), dec!(2));

    let risk = RiskManager::new((*db).clone());
    assert_eq!(risk.mark_to_market(long, dec!(103)).unwrap(), dec!(6));
    assert_eq!(risk.mark_to_market(short, dec!(103)).unwrap(), dec!(-6));
    assert_eq!(
        GridStrategy::find_by_id(&db, long).unwrap().unwrap().current_pnl,
        dec!(6)
    );

    assert!(risk.mark_to_market(999, dec!(1)).is_err());
}
