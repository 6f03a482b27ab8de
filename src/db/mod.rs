//! Database module for SQLite-backed grid state
//!
//! SQLite is the single source of truth across ticks: levels, order intents
//! and the audit log are written immediately after every exchange action so
//! a restarted engine can rebuild its view purely from committed rows.

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, Result as SqlResult, Row};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{GridError, GridResult};

pub mod grid_config;
pub mod grid_level;
pub mod order_intent;
pub mod repository;
pub mod strategy;
pub mod trade_log;

pub use grid_config::GridConfig;
pub use order_intent::OrderIntent;
pub use repository::GridRepository;
pub use strategy::{GridOrder, GridOrderStatus, GridStrategy, PositionDirection, StrategyStatus};
pub use trade_log::TradeLog;

/// Database manager wrapping a shared SQLite connection
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) a database file
    pub fn new<P: AsRef<Path>>(path: P) -> GridResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        Ok(Database {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory database (tests and isolated backtests)
    pub fn new_in_memory() -> GridResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        Ok(Database {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open a database file and bring its schema up to date
    pub fn open_and_migrate<P: AsRef<Path>>(path: P) -> GridResult<Self> {
        let db = Self::new(path)?;
        db.run_migrations()?;
        Ok(db)
    }

    /// Run migrations to set up or update the schema
    pub fn run_migrations(&self) -> GridResult<()> {
        let conn = self.lock()?;
        let migration_sql = include_str!("migrations/V1__initial_schema.sql");
        conn.execute_batch(migration_sql)?;
        Ok(())
    }

    /// Check database health
    pub fn health_check(&self) -> GridResult<bool> {
        let conn = self.lock()?;
        let result: i32 = conn.query_row("SELECT 1", [], |row| row.get(0))?;
        Ok(result == 1)
    }

    pub(crate) fn lock(&self) -> GridResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| GridError::Database("connection mutex poisoned".to_string()))
    }
}

pub(crate) fn decimal_to_sql(value: &Decimal) -> String {
    value.normalize().to_string()
}

pub(crate) fn decimal_col(row: &Row, idx: usize) -> SqlResult<Decimal> {
    let text: String = row.get(idx)?;
    Decimal::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn opt_decimal_col(row: &Row, idx: usize) -> SqlResult<Option<Decimal>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| {
        Decimal::from_str(&t)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

pub(crate) fn enum_col<T>(row: &Row, idx: usize) -> SqlResult<T>
where
    T: FromStr<Err = GridError>,
{
    let text: String = row.get(idx)?;
    text.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn millis_col(row: &Row, idx: usize) -> SqlResult<Option<DateTime<Utc>>> {
    let millis: Option<i64> = row.get(idx)?;
    Ok(millis.and_then(DateTime::from_timestamp_millis))
}
