//! Locally tracked orders

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Result as SqlResult, Row};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{decimal_col, decimal_to_sql, enum_col, millis_col, Database};
use crate::error::{GridError, GridResult};
use crate::types::{OrderIntentKind, OrderSide, OrderStatus};

const SELECT_COLUMNS: &str = "SELECT id, config_id, level_index, client_order_id, order_id, intent,
        side, price, amount, status, created_at, updated_at
     FROM order_intents";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderIntent {
    pub id: Option<i64>,
    pub config_id: i64,
    pub level_index: i32,
    pub client_order_id: String,
    pub order_id: Option<String>,
    pub intent: OrderIntentKind,
    pub side: OrderSide,
    pub price: Decimal,
    pub amount: Decimal,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderIntent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config_id: i64,
        level_index: i32,
        client_order_id: String,
        order_id: Option<String>,
        intent: OrderIntentKind,
        side: OrderSide,
        price: Decimal,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Self {
        OrderIntent {
            id: None,
            config_id,
            level_index,
            client_order_id,
            order_id,
            intent,
            side,
            price,
            amount,
            status: OrderStatus::New,
            created_at: now,
            updated_at: now,
        }
    }

    fn from_row(row: &Row) -> SqlResult<Self> {
        Ok(OrderIntent {
            id: Some(row.get(0)?),
            config_id: row.get(1)?,
            level_index: row.get(2)?,
            client_order_id: row.get(3)?,
            order_id: row.get(4)?,
            intent: enum_col(row, 5)?,
            side: enum_col(row, 6)?,
            price: decimal_col(row, 7)?,
            amount: decimal_col(row, 8)?,
            status: enum_col(row, 9)?,
            created_at: millis_col(row, 10)?.unwrap_or_default(),
            updated_at: millis_col(row, 11)?.unwrap_or_default(),
        })
    }

    pub fn insert(&self, db: &Database) -> GridResult<i64> {
        let conn = db.lock()?;
        conn.execute(
            "INSERT INTO order_intents (
                config_id, level_index, client_order_id, order_id, intent, side, price,
                amount, status, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                self.config_id,
                self.level_index,
                self.client_order_id,
                self.order_id,
                self.intent.as_str(),
                self.side.as_str(),
                decimal_to_sql(&self.price),
                decimal_to_sql(&self.amount),
                self.status.as_str(),
                self.created_at.timestamp_millis(),
                self.updated_at.timestamp_millis(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn update_status(
        db: &Database,
        id: i64,
        status: OrderStatus,
        now: DateTime<Utc>,
    ) -> GridResult<()> {
        let conn = db.lock()?;
        let changed = conn.execute(
            "UPDATE order_intents SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), now.timestamp_millis(), id],
        )?;
        if changed == 0 {
            return Err(GridError::not_found("OrderIntent", id));
        }
        Ok(())
    }

    /// Intents that may still be resting on the exchange (NEW, PARTIALLY_FILLED)
    pub fn list_active(db: &Database, config_id: i64) -> GridResult<Vec<Self>> {
        let conn = db.lock()?;
        let sql = format!(
            "{} WHERE config_id = ?1 AND status IN ('NEW', 'PARTIALLY_FILLED') ORDER BY level_index, id",
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![config_id], |row| Self::from_row(row))?;
        Ok(rows.collect::<SqlResult<Vec<_>>>()?)
    }

    pub fn find_by_order_id(db: &Database, order_id: &str) -> GridResult<Option<Self>> {
        let conn = db.lock()?;
        let sql = format!("{} WHERE order_id = ?1 ORDER BY id DESC LIMIT 1", SELECT_COLUMNS);
        let intent = conn
            .query_row(&sql, params![order_id], |row| Self::from_row(row))
            .optional()?;
        Ok(intent)
    }

    pub fn list_by_config(db: &Database, config_id: i64) -> GridResult<Vec<Self>> {
        let conn = db.lock()?;
        let sql = format!("{} WHERE config_id = ?1 ORDER BY id", SELECT_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![config_id], |row| Self::from_row(row))?;
        Ok(rows.collect::<SqlResult<Vec<_>>>()?)
    }
}
