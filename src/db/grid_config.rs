//! Grid configuration storage and invariants

use rusqlite::{params, OptionalExtension, Result as SqlResult, Row};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::{decimal_col, decimal_to_sql, enum_col, Database};
use crate::error::{GridError, GridResult};
use crate::types::GridMode;

/// Minimum number of rungs a ladder may have
pub const MIN_GRID_LEVELS: u32 = 5;

const SELECT_COLUMNS: &str = "SELECT id, name, exchange, symbol, grid_mode, lower_price, upper_price,
        grid_levels, trade_amount, max_position_size, stop_loss_buffer_pct, price_tick,
        qty_step, refresh_interval_secs, is_active, created_at, updated_at
     FROM grid_configs";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    pub id: Option<i64>,
    pub name: String,
    pub exchange: String,
    pub symbol: String,
    pub grid_mode: GridMode,
    pub lower_price: Decimal,
    pub upper_price: Decimal,
    pub grid_levels: u32,
    pub trade_amount: Decimal,
    pub max_position_size: Decimal,
    pub stop_loss_buffer_pct: Decimal,
    pub price_tick: Decimal,
    pub qty_step: Decimal,
    pub refresh_interval_secs: u64,
    pub is_active: bool,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl GridConfig {
    /// Create a new, unsaved configuration with conservative defaults for
    /// the optional knobs.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        exchange: impl Into<String>,
        symbol: impl Into<String>,
        grid_mode: GridMode,
        lower_price: Decimal,
        upper_price: Decimal,
        grid_levels: u32,
        trade_amount: Decimal,
        max_position_size: Decimal,
    ) -> Self {
        GridConfig {
            id: None,
            name: name.into(),
            exchange: exchange.into(),
            symbol: symbol.into(),
            grid_mode,
            lower_price,
            upper_price,
            grid_levels,
            trade_amount,
            max_position_size,
            stop_loss_buffer_pct: Decimal::new(2, 2),
            price_tick: Decimal::new(1, 2),
            qty_step: Decimal::new(1, 3),
            refresh_interval_secs: 5,
            is_active: true,
            created_at: None,
            updated_at: None,
        }
    }

    /// Check every configuration invariant; a failure blocks engine start.
    pub fn validate(&self) -> GridResult<()> {
        let fail = |msg: String| Err(GridError::ConfigValidation(msg));

        if self.name.trim().is_empty() {
            return fail("name must not be empty".to_string());
        }
        if self.exchange.trim().is_empty() || self.symbol.trim().is_empty() {
            return fail("exchange and symbol must not be empty".to_string());
        }
        if self.lower_price <= Decimal::ZERO || self.upper_price <= Decimal::ZERO {
            return fail("price bounds must be positive".to_string());
        }
        if self.lower_price >= self.upper_price {
            return fail(format!(
                "lower_price {} must be below upper_price {}",
                self.lower_price, self.upper_price
            ));
        }
        if self.grid_levels < MIN_GRID_LEVELS {
            return fail(format!("grid_levels must be at least {}", MIN_GRID_LEVELS));
        }
        if self.trade_amount <= Decimal::ZERO {
            return fail("trade_amount must be positive".to_string());
        }
        if self.price_tick <= Decimal::ZERO || self.qty_step <= Decimal::ZERO {
            return fail("price_tick and qty_step must be positive".to_string());
        }
        if self.trade_amount < self.qty_step {
            return fail(format!(
                "trade_amount {} is smaller than qty_step {}",
                self.trade_amount, self.qty_step
            ));
        }
        if self.max_position_size <= Decimal::ZERO {
            return fail("max_position_size must be positive".to_string());
        }
        if self.stop_loss_buffer_pct < Decimal::ZERO {
            return fail("stop_loss_buffer_pct must not be negative".to_string());
        }
        if self.refresh_interval_secs == 0 {
            return fail("refresh_interval_secs must be greater than 0".to_string());
        }

        Ok(())
    }

    pub fn require_id(&self) -> GridResult<i64> {
        self.id
            .ok_or_else(|| GridError::StateInconsistency(format!("config '{}' has not been saved", self.name)))
    }

    /// Distance between adjacent levels: (upper - lower) / (levels - 1)
    pub fn grid_spacing(&self) -> Decimal {
        (self.upper_price - self.lower_price) / Decimal::from(self.grid_levels - 1)
    }

    pub fn center_price(&self) -> Decimal {
        (self.upper_price + self.lower_price) / Decimal::TWO
    }

    /// Round a price to the nearest tick.
    pub fn quantize_price(&self, price: Decimal) -> Decimal {
        ((price / self.price_tick).round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            * self.price_tick)
            .normalize()
    }

    /// Floor a quantity to the lot step.
    pub fn quantize_qty(&self, qty: Decimal) -> Decimal {
        ((qty / self.qty_step).floor() * self.qty_step).normalize()
    }

    /// Quantity placed by every entry and exit order
    pub fn order_amount(&self) -> Decimal {
        self.quantize_qty(self.trade_amount)
    }

    fn from_row(row: &Row) -> SqlResult<Self> {
        Ok(GridConfig {
            id: Some(row.get(0)?),
            name: row.get(1)?,
            exchange: row.get(2)?,
            symbol: row.get(3)?,
            grid_mode: enum_col(row, 4)?,
            lower_price: decimal_col(row, 5)?,
            upper_price: decimal_col(row, 6)?,
            grid_levels: row.get(7)?,
            trade_amount: decimal_col(row, 8)?,
            max_position_size: decimal_col(row, 9)?,
            stop_loss_buffer_pct: decimal_col(row, 10)?,
            price_tick: decimal_col(row, 11)?,
            qty_step: decimal_col(row, 12)?,
            refresh_interval_secs: row.get::<_, i64>(13)? as u64,
            is_active: row.get::<_, i32>(14)? == 1,
            created_at: Some(row.get(15)?),
            updated_at: Some(row.get(16)?),
        })
    }

    /// Validate and insert; returns the new row id.
    pub fn insert(&self, db: &Database) -> GridResult<i64> {
        self.validate()?;
        let conn = db.lock()?;
        conn.execute(
            "INSERT INTO grid_configs (
                name, exchange, symbol, grid_mode, lower_price, upper_price, grid_levels,
                trade_amount, max_position_size, stop_loss_buffer_pct, price_tick, qty_step,
                refresh_interval_secs, is_active
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                self.name,
                self.exchange,
                self.symbol,
                self.grid_mode.as_str(),
                decimal_to_sql(&self.lower_price),
                decimal_to_sql(&self.upper_price),
                self.grid_levels,
                decimal_to_sql(&self.trade_amount),
                decimal_to_sql(&self.max_position_size),
                decimal_to_sql(&self.stop_loss_buffer_pct),
                decimal_to_sql(&self.price_tick),
                decimal_to_sql(&self.qty_step),
                self.refresh_interval_secs as i64,
                if self.is_active { 1 } else { 0 },
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Validate and update an existing row
    pub fn update(&self, db: &Database) -> GridResult<usize> {
        self.validate()?;
        let id = self.require_id()?;
        let conn = db.lock()?;
        let changed = conn.execute(
            "UPDATE grid_configs SET
                name = ?1, exchange = ?2, symbol = ?3, grid_mode = ?4, lower_price = ?5,
                upper_price = ?6, grid_levels = ?7, trade_amount = ?8, max_position_size = ?9,
                stop_loss_buffer_pct = ?10, price_tick = ?11, qty_step = ?12,
                refresh_interval_secs = ?13, is_active = ?14, updated_at = CURRENT_TIMESTAMP
            WHERE id = ?15",
            params![
                self.name,
                self.exchange,
                self.symbol,
                self.grid_mode.as_str(),
                decimal_to_sql(&self.lower_price),
                decimal_to_sql(&self.upper_price),
                self.grid_levels,
                decimal_to_sql(&self.trade_amount),
                decimal_to_sql(&self.max_position_size),
                decimal_to_sql(&self.stop_loss_buffer_pct),
                decimal_to_sql(&self.price_tick),
                decimal_to_sql(&self.qty_step),
                self.refresh_interval_secs as i64,
                if self.is_active { 1 } else { 0 },
                id,
            ],
        )?;
        Ok(changed)
    }

    pub fn find_by_id(db: &Database, id: i64) -> GridResult<Option<Self>> {
        let conn = db.lock()?;
        let sql = format!("{} WHERE id = ?1", SELECT_COLUMNS);
        let config = conn
            .query_row(&sql, params![id], |row| Self::from_row(row))
            .optional()?;
        Ok(config)
    }

    pub fn find_by_name(db: &Database, name: &str) -> GridResult<Option<Self>> {
        let conn = db.lock()?;
        let sql = format!("{} WHERE name = ?1", SELECT_COLUMNS);
        let config = conn
            .query_row(&sql, params![name], |row| Self::from_row(row))
            .optional()?;
        Ok(config)
    }

    /// Resolve a config by numeric id or by name
    pub fn resolve(db: &Database, id_or_name: &str) -> GridResult<Self> {
        let by_id = match id_or_name.parse::<i64>() {
            Ok(id) => Self::find_by_id(db, id)?,
            Err(_) => None,
        };
        match by_id {
            Some(config) => Ok(config),
            None => Self::find_by_name(db, id_or_name)?
                .ok_or_else(|| GridError::not_found("GridConfig", id_or_name)),
        }
    }

    pub fn list_all(db: &Database) -> GridResult<Vec<Self>> {
        let conn = db.lock()?;
        let sql = format!("{} ORDER BY id", SELECT_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| Self::from_row(row))?;
        Ok(rows.collect::<SqlResult<Vec<_>>>()?)
    }

    /// Toggle the active flag
    pub fn set_active(db: &Database, id: i64, active: bool) -> GridResult<usize> {
        let conn = db.lock()?;
        let changed = conn.execute(
            "UPDATE grid_configs SET is_active = ?1, updated_at = CURRENT_TIMESTAMP WHERE id = ?2",
            params![if active { 1 } else { 0 }, id],
        )?;
        if changed == 0 {
            return Err(GridError::not_found("GridConfig", id));
        }
        Ok(changed)
    }
}
