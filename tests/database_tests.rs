// Integration tests for database operations

mod common;

use chrono::Utc;
use rust_decimal_macros::dec;

use grid_engine::{
    Database, GridConfig, GridError, GridMode, GridRepository, OrderIntent, OrderIntentKind,
    OrderSide, OrderStatus, TradeLog, TradeLogEvent,
};
use common::{create_temp_db_dir, sample_config};

#[test]
fn test_database_creation() {
    let (_temp_dir, db_path) = create_temp_db_dir();

    let db = Database::open_and_migrate(&db_path);
    assert!(db.is_ok(), "Database creation should succeed");
    assert!(db.unwrap().health_check().unwrap());

    // Migrations are safe to run again
    let again = Database::open_and_migrate(&db_path);
    assert!(again.is_ok());
}

#[test]
fn test_config_persists_exact_decimals() {
    let (_temp_dir, db_path) = create_temp_db_dir();
    let id = {
        let db = Database::open_and_migrate(&db_path).unwrap();
        let mut config = sample_config(GridMode::Neutral);
        config.trade_amount = dec!(0.00012345);
        config.qty_step = dec!(0.00000001);
        config.price_tick = dec!(0.5);
        config.insert(&db).unwrap()
    };

    let db = Database::open_and_migrate(&db_path).unwrap();
    let loaded = db.load_config(id).unwrap();
    assert_eq!(loaded.name, "btc-grid");
    assert_eq!(loaded.grid_mode, GridMode::Neutral);
    assert_eq!(loaded.trade_amount.to_string(), "0.00012345");
    assert_eq!(loaded.price_tick, dec!(0.5));
    assert_eq!(loaded.upper_price, dec!(65000));

    assert_eq!(GridConfig::resolve(&db, "btc-grid").unwrap().id, Some(id));
    assert_eq!(GridConfig::resolve(&db, &id.to_string()).unwrap().name, "btc-grid");
    assert!(matches!(
        GridConfig::resolve(&db, "missing"),
        Err(GridError::NotFound { .. })
    ));
}

#[test]
fn test_invalid_config_is_rejected() {
    let mut config = sample_config(GridMode::Short);
    config.lower_price = dec!(70000);
    assert!(matches!(config.validate(), Err(GridError::ConfigValidation(_))));

    let mut config = sample_config(GridMode::Short);
    config.grid_levels = 4;
    assert!(matches!(config.validate(), Err(GridError::ConfigValidation(_))));

    assert!(sample_config(GridMode::Short).validate().is_ok());
}

#[test]
fn test_one_active_intent_per_level_and_kind() {
    let db = Database::new_in_memory().unwrap();
    db.run_migrations().unwrap();
    let config_id = sample_config(GridMode::Short).insert(&db).unwrap();
    let now = Utc::now();

    let intent = |client: &str, order: &str, kind: OrderIntentKind| {
        OrderIntent::new(
            config_id,
            3,
            client.to_string(),
            Some(order.to_string()),
            kind,
            OrderSide::Sell,
            dec!(63000),
            dec!(0.01),
            now,
        )
    };

    let first = db.insert_intent(&intent("c1", "o1", OrderIntentKind::Entry)).unwrap();
    assert!(db.insert_intent(&intent("c2", "o2", OrderIntentKind::Entry)).is_err());
    db.insert_intent(&intent("c3", "o3", OrderIntentKind::Exit)).unwrap();

    db.update_intent_status(first, OrderStatus::Canceled, now).unwrap();
    db.insert_intent(&intent("c4", "o4", OrderIntentKind::Entry)).unwrap();

    let active = db.active_intents(config_id).unwrap();
    assert_eq!(active.len(), 2);
    assert_eq!(
        db.find_intent_by_order_id("o1").unwrap().unwrap().status,
        OrderStatus::Canceled
    );
    assert!(db.find_intent_by_order_id("nope").unwrap().is_none());
}

#[test]
fn test_trade_log_is_append_only_history() {
    let db = Database::new_in_memory().unwrap();
    db.run_migrations().unwrap();
    let config_id = sample_config(GridMode::Short).insert(&db).unwrap();
    let now = Utc::now();

    db.append_log(&TradeLog::new(config_id, TradeLogEvent::Init, "initialized", now))
        .unwrap();
    db.append_log(
        &TradeLog::new(config_id, TradeLogEvent::OrderCreate, "placed", now)
            .with_level(2)
            .with_order("o-2"),
    )
    .unwrap();
    db.append_log(&TradeLog::new(config_id, TradeLogEvent::Error, "create failed", now))
        .unwrap();

    let recent = db.recent_logs(config_id, 2).unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].event, TradeLogEvent::Error);
    assert_eq!(recent[1].level_index, Some(2));
    assert_eq!(recent[1].order_id.as_deref(), Some("o-2"));
    assert_eq!(
        TradeLog::count_by_event(&db, config_id, TradeLogEvent::Init).unwrap(),
        1
    );
}
