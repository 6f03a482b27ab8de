//! Storage seam between the engine and SQLite
//!
//! The engine only touches persisted state through this trait, at the
//! points where it explicitly refreshes (tick start, fill handling) or
//! persists (after every exchange action, periodic flush).

use chrono::{DateTime, Utc};

use super::{Database, GridConfig, OrderIntent, TradeLog};
use crate::core::level::GridLevel;
use crate::error::{GridError, GridResult};
use crate::types::OrderStatus;

pub trait GridRepository: Send + Sync {
    fn load_config(&self, config_id: i64) -> GridResult<GridConfig>;

    /// All levels of a config, ordered by level index
    fn load_levels(&self, config_id: i64) -> GridResult<Vec<GridLevel>>;

    /// Persist a batch of levels atomically
    fn save_levels(&self, levels: &mut [GridLevel]) -> GridResult<()>;

    fn save_level(&self, level: &mut GridLevel) -> GridResult<()>;

    fn delete_levels(&self, config_id: i64) -> GridResult<usize>;

    /// Intents with status NEW or PARTIALLY_FILLED
    fn active_intents(&self, config_id: i64) -> GridResult<Vec<OrderIntent>>;

    fn insert_intent(&self, intent: &OrderIntent) -> GridResult<i64>;

    fn update_intent_status(
        &self,
        intent_id: i64,
        status: OrderStatus,
        now: DateTime<Utc>,
    ) -> GridResult<()>;

    fn find_intent_by_order_id(&self, order_id: &str) -> GridResult<Option<OrderIntent>>;

    fn append_log(&self, log: &TradeLog) -> GridResult<()>;

    fn recent_logs(&self, config_id: i64, limit: usize) -> GridResult<Vec<TradeLog>>;
}

impl GridRepository for Database {
    fn load_config(&self, config_id: i64) -> GridResult<GridConfig> {
        GridConfig::find_by_id(self, config_id)?
            .ok_or_else(|| GridError::not_found("GridConfig", config_id))
    }

    fn load_levels(&self, config_id: i64) -> GridResult<Vec<GridLevel>> {
        GridLevel::list_by_config(self, config_id)
    }

    fn save_levels(&self, levels: &mut [GridLevel]) -> GridResult<()> {
        GridLevel::save_all(self, levels)
    }

    fn save_level(&self, level: &mut GridLevel) -> GridResult<()> {
        level.save(self)
    }

    fn delete_levels(&self, config_id: i64) -> GridResult<usize> {
        GridLevel::delete_by_config(self, config_id)
    }

    fn active_intents(&self, config_id: i64) -> GridResult<Vec<OrderIntent>> {
        OrderIntent::list_active(self, config_id)
    }

    fn insert_intent(&self, intent: &OrderIntent) -> GridResult<i64> {
        intent.insert(self)
    }

    fn update_intent_status(
        &self,
        intent_id: i64,
        status: OrderStatus,
        now: DateTime<Utc>,
    ) -> GridResult<()> {
        OrderIntent::update_status(self, intent_id, status, now)
    }

    fn find_intent_by_order_id(&self, order_id: &str) -> GridResult<Option<OrderIntent>> {
        OrderIntent::find_by_order_id(self, order_id)
    }

    fn append_log(&self, log: &TradeLog) -> GridResult<()> {
        log.append(self).map(|_| ())
    }

    fn recent_logs(&self, config_id: i64, limit: usize) -> GridResult<Vec<TradeLog>> {
        TradeLog::list_recent(self, config_id, limit)
    }
}
