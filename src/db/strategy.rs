//! Strategy database operations
//!
//! `GridStrategy` is the simple single-position model the risk manager
//! guards: one long or short position with an entry price, a stop-loss
//! percentage and its constituent `GridOrder`s.

use rusqlite::{params, OptionalExtension, Result as SqlResult, Row};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{decimal_col, decimal_to_sql, enum_col, opt_decimal_col, Database};
use crate::error::{GridError, GridResult};
use crate::types::{db_enum, OrderSide};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionDirection {
    Long,
    Short,
}

db_enum!(PositionDirection, "position direction", {
    Long => "LONG",
    Short => "SHORT",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyStatus {
    Idle,
    Active,
    Stopped,
}

db_enum!(StrategyStatus, "strategy status", {
    Idle => "IDLE",
    Active => "ACTIVE",
    Stopped => "STOPPED",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GridOrderStatus {
    Pending,
    Filled,
    Cancelled,
}

db_enum!(GridOrderStatus, "grid order status", {
    Pending => "PENDING",
    Filled => "FILLED",
    Cancelled => "CANCELLED",
});

const STRATEGY_COLUMNS: &str = "SELECT id, symbol, name, direction, entry_price, position_size,
        stop_loss_pct, current_pnl, status, created_at, updated_at
     FROM grid_strategies";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridStrategy {
    pub id: Option<i64>,
    pub symbol: String,
    pub name: String,
    pub direction: PositionDirection,
    pub entry_price: Option<Decimal>,
    pub position_size: Decimal,
    pub stop_loss_pct: Decimal,
    pub current_pnl: Decimal,
    pub status: StrategyStatus,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl GridStrategy {
    /// Create a new idle strategy with no entry yet
    pub fn new(
        symbol: impl Into<String>,
        name: impl Into<String>,
        direction: PositionDirection,
        position_size: Decimal,
        stop_loss_pct: Decimal,
    ) -> Self {
        GridStrategy {
            id: None,
            symbol: symbol.into(),
            name: name.into(),
            direction,
            entry_price: None,
            position_size,
            stop_loss_pct,
            current_pnl: Decimal::ZERO,
            status: StrategyStatus::Idle,
            created_at: None,
            updated_at: None,
        }
    }

    /// Notional value at the entry price; zero until an entry exists
    pub fn position_value(&self) -> Decimal {
        self.entry_price
            .map(|entry| entry * self.position_size)
            .unwrap_or(Decimal::ZERO)
    }

    fn from_row(row: &Row) -> SqlResult<Self> {
        Ok(GridStrategy {
            id: Some(row.get(0)?),
            symbol: row.get(1)?,
            name: row.get(2)?,
            direction: enum_col(row, 3)?,
            entry_price: opt_decimal_col(row, 4)?,
            position_size: decimal_col(row, 5)?,
            stop_loss_pct: decimal_col(row, 6)?,
            current_pnl: decimal_col(row, 7)?,
            status: enum_col(row, 8)?,
            created_at: Some(row.get(9)?),
            updated_at: Some(row.get(10)?),
        })
    }

    /// Insert strategy into database
    pub fn insert(&self, db: &Database) -> GridResult<i64> {
        let conn = db.lock()?;
        conn.execute(
            "INSERT INTO grid_strategies (
                symbol, name, direction, entry_price, position_size, stop_loss_pct,
                current_pnl, status
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                self.symbol,
                self.name,
                self.direction.as_str(),
                self.entry_price.as_ref().map(decimal_to_sql),
                decimal_to_sql(&self.position_size),
                decimal_to_sql(&self.stop_loss_pct),
                decimal_to_sql(&self.current_pnl),
                self.status.as_str(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Update strategy in database
    pub fn update(&self, db: &Database) -> GridResult<usize> {
        let id = self
            .id
            .ok_or_else(|| GridError::StateInconsistency("strategy has no id".to_string()))?;
        let conn = db.lock()?;
        Ok(conn.execute(
            "UPDATE grid_strategies SET
                name = ?1, direction = ?2, entry_price = ?3, position_size = ?4,
                stop_loss_pct = ?5, current_pnl = ?6, status = ?7,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = ?8",
            params![
                self.name,
                self.direction.as_str(),
                self.entry_price.as_ref().map(decimal_to_sql),
                decimal_to_sql(&self.position_size),
                decimal_to_sql(&self.stop_loss_pct),
                decimal_to_sql(&self.current_pnl),
                self.status.as_str(),
                id,
            ],
        )?)
    }

    /// Find strategy by ID
    pub fn find_by_id(db: &Database, id: i64) -> GridResult<Option<Self>> {
        let conn = db.lock()?;
        let sql = format!("{} WHERE id = ?1", STRATEGY_COLUMNS);
        Ok(conn
            .query_row(&sql, params![id], |row| Self::from_row(row))
            .optional()?)
    }

    /// Active strategies trading the given symbol
    pub fn list_active_by_symbol(db: &Database, symbol: &str) -> GridResult<Vec<Self>> {
        let conn = db.lock()?;
        let sql = format!(
            "{} WHERE symbol = ?1 AND status = 'ACTIVE' ORDER BY id",
            STRATEGY_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![symbol], |row| Self::from_row(row))?;
        Ok(rows.collect::<SqlResult<Vec<_>>>()?)
    }

    /// List all strategies
    pub fn list_all(db: &Database) -> GridResult<Vec<Self>> {
        let conn = db.lock()?;
        let sql = format!("{} ORDER BY symbol, id", STRATEGY_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| Self::from_row(row))?;
        Ok(rows.collect::<SqlResult<Vec<_>>>()?)
    }

    pub fn set_status(db: &Database, id: i64, status: StrategyStatus) -> GridResult<()> {
        let conn = db.lock()?;
        let changed = conn.execute(
            "UPDATE grid_strategies SET status = ?1, updated_at = CURRENT_TIMESTAMP WHERE id = ?2",
            params![status.as_str(), id],
        )?;
        if changed == 0 {
            return Err(GridError::not_found("GridStrategy", id));
        }
        Ok(())
    }

    /// Delete strategy by ID (orders cascade)
    pub fn delete(db: &Database, id: i64) -> GridResult<usize> {
        let conn = db.lock()?;
        Ok(conn.execute("DELETE FROM grid_strategies WHERE id = ?1", params![id])?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridOrder {
    pub id: Option<i64>,
    pub strategy_id: i64,
    pub side: OrderSide,
    pub price: Decimal,
    pub quantity: Decimal,
    pub status: GridOrderStatus,
    pub order_id: Option<String>,
    pub created_at: Option<String>,
}

impl GridOrder {
    pub fn new(strategy_id: i64, side: OrderSide, price: Decimal, quantity: Decimal) -> Self {
        GridOrder {
            id: None,
            strategy_id,
            side,
            price,
            quantity,
            status: GridOrderStatus::Pending,
            order_id: None,
            created_at: None,
        }
    }

    fn from_row(row: &Row) -> SqlResult<Self> {
        Ok(GridOrder {
            id: Some(row.get(0)?),
            strategy_id: row.get(1)?,
            side: enum_col(row, 2)?,
            price: decimal_col(row, 3)?,
            quantity: decimal_col(row, 4)?,
            status: enum_col(row, 5)?,
            order_id: row.get(6)?,
            created_at: Some(row.get(7)?),
        })
    }

    pub fn insert(&self, db: &Database) -> GridResult<i64> {
        let conn = db.lock()?;
        conn.execute(
            "INSERT INTO grid_orders (strategy_id, side, price, quantity, status, order_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                self.strategy_id,
                self.side.as_str(),
                decimal_to_sql(&self.price),
                decimal_to_sql(&self.quantity),
                self.status.as_str(),
                self.order_id,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn list_by_strategy(db: &Database, strategy_id: i64) -> GridResult<Vec<Self>> {
        let conn = db.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, strategy_id, side, price, quantity, status, order_id, created_at
             FROM grid_orders WHERE strategy_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![strategy_id], |row| Self::from_row(row))?;
        Ok(rows.collect::<SqlResult<Vec<_>>>()?)
    }

    pub fn set_status(db: &Database, id: i64, status: GridOrderStatus) -> GridResult<()> {
        let conn = db.lock()?;
        let changed = conn.execute(
            "UPDATE grid_orders SET status = ?1 WHERE id = ?2",
            params![status.as_str(), id],
        )?;
        if changed == 0 {
            return Err(GridError::not_found("GridOrder", id));
        }
        Ok(())
    }

    /// Cancel every pending order of a strategy; returns how many changed
    pub fn cancel_pending(db: &Database, strategy_id: i64) -> GridResult<usize> {
        let conn = db.lock()?;
        Ok(conn.execute(
            "UPDATE grid_orders SET status = 'CANCELLED' WHERE strategy_id = ?1 AND status = 'PENDING'",
            params![strategy_id],
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn setup() -> Database {
        let db = Database::new_in_memory().unwrap();
        db.run_migrations().unwrap();
        db
    }

    #[test]
    fn test_strategy_crud() {
        let db = setup();

        // Create
        let mut strategy =
            GridStrategy::new("BTCUSDT", "btc swing", PositionDirection::Long, dec!(0.5), dec!(0.05));
        let id = strategy.insert(&db).unwrap();
        strategy.id = Some(id);

        // Read
        let loaded = GridStrategy::find_by_id(&db, id).unwrap().unwrap();
        assert_eq!(loaded.symbol, "BTCUSDT");
        assert_eq!(loaded.entry_price, None);
        assert_eq!(loaded.status, StrategyStatus::Idle);

        // Update
        let mut updated = loaded.clone();
        updated.entry_price = Some(dec!(60000));
        updated.status = StrategyStatus::Active;
        updated.update(&db).unwrap();

        let active = GridStrategy::list_active_by_symbol(&db, "BTCUSDT").unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].position_value(), dec!(30000));

        // Delete
        GridStrategy::delete(&db, id).unwrap();
        assert!(GridStrategy::find_by_id(&db, id).unwrap().is_none());
    }

    #[test]
    fn test_cancel_pending_orders() {
        let db = setup();
        let strategy_id = GridStrategy::new("ETHUSDT", "eth", PositionDirection::Short, dec!(2), dec!(0.1))
            .insert(&db)
            .unwrap();

        let filled = GridOrder::new(strategy_id, OrderSide::Sell, dec!(3000), dec!(1))
            .insert(&db)
            .unwrap();
        GridOrder::set_status(&db, filled, GridOrderStatus::Filled).unwrap();
        GridOrder::new(strategy_id, OrderSide::Buy, dec!(2900), dec!(1)).insert(&db).unwrap();

        assert_eq!(GridOrder::cancel_pending(&db, strategy_id).unwrap(), 1);
        let statuses: Vec<_> = GridOrder::list_by_strategy(&db, strategy_id)
            .unwrap()
            .into_iter()
            .map(|o| o.status)
            .collect();
        assert_eq!(statuses, vec![GridOrderStatus::Filled, GridOrderStatus::Cancelled]);
    }
}
