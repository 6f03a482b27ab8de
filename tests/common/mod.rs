// Common test utilities and helpers
#![allow(dead_code)]

use chrono::{Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

use grid_engine::{
    Candle, Database, EngineConfig, GridConfig, GridEngine, GridMode, ManualClock,
    SimulatedExchange,
};

/// Create a temporary directory for test databases
pub fn create_temp_db_dir() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let db_path = temp_dir.path().join("test.db");
    (temp_dir, db_path)
}

pub fn memory_db() -> Arc<Database> {
    let db = Database::new_in_memory().expect("Failed to open in-memory database");
    db.run_migrations().expect("Failed to run migrations");
    Arc::new(db)
}

/// 20 levels between 60000 and 65000, 0.01 per level, cap 0.05
pub fn sample_config(mode: GridMode) -> GridConfig {
    GridConfig::new(
        "btc-grid",
        "sim",
        "BTCUSDT",
        mode,
        dec!(60000),
        dec!(65000),
        20,
        dec!(0.01),
        dec!(0.05),
    )
}

/// Insert the sample config and return it with its id set
pub fn saved_config(db: &Database, mode: GridMode, max_position: Decimal) -> GridConfig {
    let mut config = sample_config(mode);
    config.max_position_size = max_position;
    config.id = Some(config.insert(db).expect("Failed to insert config"));
    config
}

pub fn test_clock() -> ManualClock {
    ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
}

pub fn engine_with_exchange(
    db: &Arc<Database>,
    config: &GridConfig,
    exchange: &SimulatedExchange,
    clock: &ManualClock,
) -> GridEngine {
    GridEngine::builder(config.clone(), db.clone())
        .with_exchange(Arc::new(exchange.clone()))
        .with_clock(Arc::new(clock.clone()))
        .with_settings(EngineConfig::default())
        .build()
        .expect("Failed to build engine")
}

pub fn dry_run_engine(db: &Arc<Database>, config: &GridConfig, clock: &ManualClock) -> GridEngine {
    GridEngine::builder(config.clone(), db.clone())
        .with_clock(Arc::new(clock.clone()))
        .build()
        .expect("Failed to build engine")
}

/// Candles oscillating between `low` and `high`, one minute apart
pub fn oscillating_candles(count: usize, low: Decimal, high: Decimal) -> Vec<Candle> {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let mid = (low + high) / dec!(2);
    (0..count)
        .map(|i| {
            let (open, close) = if i % 2 == 0 { (mid, high) } else { (mid, low) };
            Candle::new(
                start + Duration::minutes(i as i64),
                open,
                open.max(close),
                open.min(close),
                close,
            )
        })
        .collect()
}
