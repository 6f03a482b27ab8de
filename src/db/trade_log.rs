//! Append-only audit trail

use chrono::{DateTime, Utc};
use rusqlite::{params, Result as SqlResult, Row};
use serde::{Deserialize, Serialize};

use super::{enum_col, millis_col, Database};
use crate::error::GridResult;
use crate::types::TradeLogEvent;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeLog {
    pub id: Option<i64>,
    pub config_id: i64,
    pub event: TradeLogEvent,
    pub level_index: Option<i32>,
    pub order_id: Option<String>,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl TradeLog {
    pub fn new(
        config_id: i64,
        event: TradeLogEvent,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        TradeLog {
            id: None,
            config_id,
            event,
            level_index: None,
            order_id: None,
            message: message.into(),
            created_at: now,
        }
    }

    pub fn with_level(mut self, level_index: i32) -> Self {
        self.level_index = Some(level_index);
        self
    }

    pub fn with_order(mut self, order_id: impl Into<String>) -> Self {
        self.order_id = Some(order_id.into());
        self
    }

    fn from_row(row: &Row) -> SqlResult<Self> {
        Ok(TradeLog {
            id: Some(row.get(0)?),
            config_id: row.get(1)?,
            event: enum_col(row, 2)?,
            level_index: row.get(3)?,
            order_id: row.get(4)?,
            message: row.get(5)?,
            created_at: millis_col(row, 6)?.unwrap_or_default(),
        })
    }

    pub fn append(&self, db: &Database) -> GridResult<i64> {
        let conn = db.lock()?;
        conn.execute(
            "INSERT INTO trade_logs (config_id, event, level_index, order_id, message, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                self.config_id,
                self.event.as_str(),
                self.level_index,
                self.order_id,
                self.message,
                self.created_at.timestamp_millis(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Newest first
    pub fn list_recent(db: &Database, config_id: i64, limit: usize) -> GridResult<Vec<Self>> {
        let conn = db.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, config_id, event, level_index, order_id, message, created_at
             FROM trade_logs WHERE config_id = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![config_id, limit as i64], |row| Self::from_row(row))?;
        Ok(rows.collect::<SqlResult<Vec<_>>>()?)
    }

    pub fn count_by_event(db: &Database, config_id: i64, event: TradeLogEvent) -> GridResult<i64> {
        let conn = db.lock()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM trade_logs WHERE config_id = ?1 AND event = ?2",
            params![config_id, event.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
