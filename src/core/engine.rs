//! Grid engine: one ladder, one tick at a time
//!
//! The engine is driven from outside (`tick()` per price update,
//! `on_order_filled()` per fill report). It holds no background tasks and
//! reloads levels from the repository at the start of every operation;
//! the in-memory copy is never trusted between calls.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::clients::ExchangeAdapter;
use crate::config::EngineConfig;
use crate::core::clock::{Clock, SystemClock};
use crate::core::level::{GridLevel, LevelEvent, OrderRef};
use crate::core::strategy::{
    check_position_limit, filter_orders_by_position_limit, LevelStrategy, StrategyMode,
};
use crate::core::sync::OrderSyncManager;
use crate::db::{GridConfig, GridRepository, OrderIntent, TradeLog};
use crate::error::{GridError, GridResult};
use crate::types::{GridMode, LevelStatus, OrderIntentKind, OrderSide, OrderStatus, TradeLogEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineState {
    Created,
    Running,
    Stopped,
}

/// Structured result of one tick
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TickSummary {
    pub current_price: Decimal,
    pub current_position: Decimal,
    pub position_within_limit: bool,
    pub ideal_orders: usize,
    pub allowed_orders: usize,
    pub filtered_orders: usize,
    pub created_orders: usize,
    pub cancelled_orders: usize,
    pub failed_orders: usize,
    pub stop_loss_triggered: bool,
    pub persisted: bool,
}

/// What `start()` found and fixed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecoveryReport {
    pub levels_loaded: usize,
    pub repaired_levels: usize,
    pub orphan_order_ids: Vec<String>,
    pub adopted_intents: usize,
    /// Active intents closed as FILLED because their level had moved on
    pub settled_intents: usize,
    pub initialized: bool,
}

pub struct GridEngineBuilder {
    config: GridConfig,
    repo: Arc<dyn GridRepository>,
    exchange: Option<Arc<dyn ExchangeAdapter>>,
    clock: Option<Arc<dyn Clock>>,
    settings: EngineConfig,
}

impl GridEngineBuilder {
    /// Without an exchange the engine runs dry and invents `test_*` ids
    pub fn with_exchange(mut self, exchange: Arc<dyn ExchangeAdapter>) -> Self {
        self.exchange = Some(exchange);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_settings(mut self, settings: EngineConfig) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> GridResult<GridEngine> {
        let config_id = self.config.require_id()?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let strategy = StrategyMode::from(self.config.grid_mode);
        let sync = OrderSyncManager::new(
            self.repo.clone(),
            self.exchange.clone(),
            clock.clone(),
            self.settings.cooldown(),
            self.settings.price_key_precision,
        );

        Ok(GridEngine {
            config_id,
            config: self.config,
            repo: self.repo,
            exchange: self.exchange,
            clock,
            settings: self.settings,
            strategy,
            sync,
            state: EngineState::Created,
            levels: Vec::new(),
            last_persist: None,
            stop_loss_latched: false,
            limit_breach_latched: false,
        })
    }
}

pub struct GridEngine {
    config_id: i64,
    config: GridConfig,
    repo: Arc<dyn GridRepository>,
    exchange: Option<Arc<dyn ExchangeAdapter>>,
    clock: Arc<dyn Clock>,
    settings: EngineConfig,
    strategy: StrategyMode,
    sync: OrderSyncManager,
    state: EngineState,
    levels: Vec<GridLevel>,
    last_persist: Option<DateTime<Utc>>,
    stop_loss_latched: bool,
    limit_breach_latched: bool,
}

impl GridEngine {
    pub fn builder(config: GridConfig, repo: Arc<dyn GridRepository>) -> GridEngineBuilder {
        GridEngineBuilder {
            config,
            repo,
            exchange: None,
            clock: None,
            settings: EngineConfig::default(),
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    /// Levels as of the last operation
    pub fn levels(&self) -> &[GridLevel] {
        &self.levels
    }

    pub fn mode(&self) -> GridMode {
        self.strategy.mode()
    }

    pub fn is_dry_run(&self) -> bool {
        self.exchange.is_none()
    }

    pub fn current_position(&self) -> Decimal {
        self.strategy.get_position(&self.config, &self.levels)
    }

    /// Validate, recover persisted state (or lay out a fresh grid) and
    /// enter the running state.
    pub fn start(&mut self) -> GridResult<RecoveryReport> {
        if self.state == EngineState::Running {
            return Err(GridError::EngineState("engine is already running".to_string()));
        }

        self.config = self.repo.load_config(self.config_id)?;
        self.config.validate()?;
        if !self.config.is_active {
            return Err(GridError::EngineState(format!(
                "config '{}' is inactive",
                self.config.name
            )));
        }
        self.strategy = StrategyMode::from(self.config.grid_mode);

        let mut report = self.recover_from_existing_positions()?;
        if report.levels_loaded == 0 {
            let created = self.initialize_grid()?;
            report.initialized = true;
            info!("Initialized {} levels for {}", created, self.config.name);
        }

        self.state = EngineState::Running;
        self.last_persist = Some(self.clock.now());
        self.log_event(
            TradeLogEvent::Info,
            format!(
                "engine started ({} mode, {})",
                self.config.grid_mode,
                if self.is_dry_run() { "dry run" } else { "live" }
            ),
        )?;

        info!(
            "Engine started for {}: {} levels, {} repaired, {} orphan orders, {} adopted, {} settled",
            self.config.name,
            self.levels.len(),
            report.repaired_levels,
            report.orphan_order_ids.len(),
            report.adopted_intents,
            report.settled_intents
        );
        Ok(report)
    }

    /// Rebuild a consistent view from persisted levels and live intents.
    pub fn recover_from_existing_positions(&mut self) -> GridResult<RecoveryReport> {
        let now = self.clock.now();
        let mut levels = self.repo.load_levels(self.config_id)?;
        let mut report = RecoveryReport {
            levels_loaded: levels.len(),
            ..Default::default()
        };
        if levels.is_empty() {
            self.levels = levels;
            return Ok(report);
        }

        let mut touched = vec![false; levels.len()];

        for (pos, level) in levels.iter_mut().enumerate() {
            if let Some(repair) = level.repair() {
                warn!(
                    "Repaired level {}: {} -> {} ({})",
                    repair.level_index, repair.from, repair.to, repair.reason
                );
                for orphan in &repair.orphan_order_ids {
                    warn!("Orphan order {} on level {}", orphan, repair.level_index);
                }
                self.repo.append_log(
                    &TradeLog::new(
                        self.config_id,
                        TradeLogEvent::Warning,
                        format!("repaired {} -> {}: {}", repair.from, repair.to, repair.reason),
                        now,
                    )
                    .with_level(repair.level_index),
                )?;
                report.orphan_order_ids.extend(repair.orphan_order_ids);
                touched[pos] = true;
            }
        }

        let index: HashMap<i32, usize> = levels
            .iter()
            .enumerate()
            .map(|(pos, level)| (level.level_index, pos))
            .collect();

        let active = self.repo.active_intents(self.config_id)?;
        let mut live_orders: Vec<(i32, OrderIntentKind)> = Vec::new();

        for intent in &active {
            let order_id = intent.order_id.clone().unwrap_or_default();
            let Some(&pos) = index.get(&intent.level_index) else {
                warn!("Live order {} has no level {}", order_id, intent.level_index);
                report.orphan_order_ids.push(order_id);
                continue;
            };
            let level = &mut levels[pos];
            let order = OrderRef::new(order_id.as_str(), intent.client_order_id.as_str());
            let tracked = level.order_for(intent.intent).map(|o| o.order_id.as_str());
            let working = GridLevel::working_status(intent.intent);
            let pre_placement = match intent.intent {
                OrderIntentKind::Entry => LevelStatus::Idle,
                OrderIntentKind::Exit => LevelStatus::PositionOpen,
            };

            if level.status() == working && tracked == Some(order_id.as_str()) {
                live_orders.push((intent.level_index, intent.intent));
            } else if level.status() == pre_placement && tracked.is_none() {
                level.transition(LevelEvent::placed(intent.intent, order))?;
                info!("Adopted live {} order {} on level {}", intent.intent, order_id, level.level_index);
                report.adopted_intents += 1;
                live_orders.push((intent.level_index, intent.intent));
                touched[pos] = true;
            } else if level.status() == working {
                // The level points at a stale order; re-point it at the live one
                if let Some(stale) = tracked {
                    report.orphan_order_ids.push(stale.to_string());
                }
                level.transition(LevelEvent::canceled(intent.intent))?;
                level.transition(LevelEvent::placed(intent.intent, order))?;
                report.adopted_intents += 1;
                live_orders.push((intent.level_index, intent.intent));
                touched[pos] = true;
            } else if intent.intent == OrderIntentKind::Entry
                && matches!(level.status(), LevelStatus::PositionOpen | LevelStatus::ExitWorking)
                && tracked == Some(order_id.as_str())
            {
                // The level already holds the position this entry opened
                let intent_id = intent.id.ok_or_else(|| {
                    GridError::StateInconsistency("stored intent without id".to_string())
                })?;
                self.repo.update_intent_status(intent_id, OrderStatus::Filled, now)?;
                warn!(
                    "Entry order {} on level {} filled without being recorded, closing it",
                    order_id, intent.level_index
                );
                self.repo.append_log(
                    &TradeLog::new(
                        self.config_id,
                        TradeLogEvent::Warning,
                        format!("recovered unrecorded entry fill ({})", level.status()),
                        now,
                    )
                    .with_level(intent.level_index)
                    .with_order(order_id.as_str()),
                )?;
                report.settled_intents += 1;
            } else {
                warn!(
                    "Live {} order {} does not match level {} in {}",
                    intent.intent,
                    order_id,
                    level.level_index,
                    level.status()
                );
                report.orphan_order_ids.push(order_id);
            }
        }

        // Working levels whose order is no longer live: settle from the
        // order's final status so sync can act on the level again.
        for (pos, level) in levels.iter_mut().enumerate() {
            let intent_kind = match level.status() {
                LevelStatus::EntryWorking => OrderIntentKind::Entry,
                LevelStatus::ExitWorking => OrderIntentKind::Exit,
                _ => continue,
            };
            if live_orders.contains(&(level.level_index, intent_kind)) {
                continue;
            }
            let Some(order_id) = level.order_for(intent_kind).map(|o| o.order_id.clone()) else {
                continue;
            };
            let final_status = self
                .repo
                .find_intent_by_order_id(&order_id)?
                .map(|intent| intent.status);
            let event = match final_status {
                Some(OrderStatus::Filled) => LevelEvent::filled(intent_kind),
                Some(_) => LevelEvent::canceled(intent_kind),
                None => {
                    warn!("Level {} tracks unknown order {}", level.level_index, order_id);
                    report.orphan_order_ids.push(order_id.clone());
                    LevelEvent::canceled(intent_kind)
                }
            };
            let from = level.status();
            let to = level.transition(event)?;
            warn!(
                "Settled level {} from {} to {} (order {} no longer live)",
                level.level_index, from, to, order_id
            );
            touched[pos] = true;
        }

        report.repaired_levels = touched.iter().filter(|t| **t).count();
        report.orphan_order_ids.sort();
        report.orphan_order_ids.dedup();

        if report.repaired_levels > 0 {
            self.repo.save_levels(&mut levels)?;
        }
        if !report.orphan_order_ids.is_empty() {
            self.log_event(
                TradeLogEvent::Warning,
                format!(
                    "recovery found {} orphan orders: {}",
                    report.orphan_order_ids.len(),
                    report.orphan_order_ids.join(", ")
                ),
            )?;
        }

        self.levels = levels;
        Ok(report)
    }

    /// Lay out a fresh ladder. Levels are spaced linearly between the
    /// bounds and indexed so that 0 sits just below the middle.
    pub fn initialize_grid(&mut self) -> GridResult<usize> {
        let config = &self.config;
        let spacing = config.grid_spacing();
        let center = config.center_price();
        let offset = ((config.grid_levels - 1) / 2) as i32;

        let mut levels: Vec<GridLevel> = (0..config.grid_levels)
            .map(|i| {
                let price = config.quantize_price(config.lower_price + spacing * Decimal::from(i));
                let upper_half = price >= center;
                let side = match (config.grid_mode, upper_half) {
                    (GridMode::Short | GridMode::Neutral, true) => OrderSide::Sell,
                    (GridMode::Short | GridMode::Neutral, false) => OrderSide::Buy,
                    (GridMode::Long, true) => OrderSide::Buy,
                    (GridMode::Long, false) => OrderSide::Sell,
                };
                GridLevel::new(self.config_id, i as i32 - offset, price, side)
            })
            .collect();

        self.repo.save_levels(&mut levels)?;
        let count = levels.len();
        self.levels = levels;

        self.log_event(
            TradeLogEvent::Init,
            format!(
                "initialized {} levels {}..{} spacing {}",
                count,
                self.config.lower_price,
                self.config.upper_price,
                self.config.quantize_price(spacing)
            ),
        )?;
        Ok(count)
    }

    pub fn tick(&mut self, current_price: Decimal) -> GridResult<TickSummary> {
        self.require_running("tick")?;

        let mut levels = self.repo.load_levels(self.config_id)?;
        let position = self.strategy.get_position(&self.config, &levels);
        let within_limit = check_position_limit(position, self.config.max_position_size);
        self.watch_position_limit(position, within_limit)?;

        let stop_loss_triggered = self.watch_stop_loss(current_price, position)?;

        let ideal = self.strategy.compute_ideal_orders(&self.config, &levels);
        let ideal_count = ideal.len();
        let filtered = filter_orders_by_position_limit(ideal, position, self.config.max_position_size);
        if !filtered.filtered.is_empty() {
            debug!(
                "{} entry orders held back by the position limit",
                filtered.filtered.len()
            );
        }

        let outcome = self.sync.sync(&self.config, &mut levels, &filtered.allowed)?;
        self.levels = levels;
        let persisted = self.maybe_persist(false)?;

        let summary = TickSummary {
            current_price,
            current_position: position,
            position_within_limit: within_limit,
            ideal_orders: ideal_count,
            allowed_orders: filtered.allowed.len(),
            filtered_orders: filtered.filtered.len(),
            created_orders: outcome.created_order_ids.len(),
            cancelled_orders: outcome.cancelled_order_ids.len(),
            failed_orders: outcome.failed,
            stop_loss_triggered,
            persisted,
        };
        debug!("Tick {} @ {}: {:?}", self.config.name, current_price, summary);
        Ok(summary)
    }

    /// Apply a fill report. Returns the level's new status, or `None` when
    /// the fill was already processed.
    pub fn on_order_filled(
        &mut self,
        order_id: &str,
        intent: OrderIntentKind,
    ) -> GridResult<Option<LevelStatus>> {
        self.require_running("on_order_filled")?;

        let order = self
            .repo
            .find_intent_by_order_id(order_id)?
            .ok_or_else(|| GridError::not_found("OrderIntent", order_id))?;
        if order.status == OrderStatus::Filled {
            debug!("Fill for {} already processed", order_id);
            return Ok(None);
        }
        self.check_fill_matches(&order, intent)?;

        self.levels = self.repo.load_levels(self.config_id)?;
        let level = self
            .levels
            .iter_mut()
            .find(|level| level.level_index == order.level_index)
            .ok_or_else(|| {
                GridError::not_found("GridLevel", format!("{}/{}", order.config_id, order.level_index))
            })?;

        let status = self.strategy.on_fill(level, intent)?;

        // Intent before level; recovery settles a working level whose
        // intent is already FILLED.
        let intent_id = order
            .id
            .ok_or_else(|| GridError::StateInconsistency("stored intent without id".to_string()))?;
        let now = self.clock.now();
        self.repo.update_intent_status(intent_id, OrderStatus::Filled, now)?;
        self.repo.save_level(level)?;
        self.repo.append_log(
            &TradeLog::new(
                self.config_id,
                TradeLogEvent::OrderFill,
                format!("filled {} {} {} @ {}", order.intent, order.side, order.amount, order.price),
                now,
            )
            .with_level(order.level_index)
            .with_order(order_id),
        )?;

        info!(
            "Filled {} {} on level {} @ {} -> {}",
            order.intent, order.side, order.level_index, order.price, status
        );
        Ok(Some(status))
    }

    /// Final persistence; the engine can be started again afterwards.
    pub fn stop(&mut self) -> GridResult<()> {
        if self.state != EngineState::Running {
            return Err(GridError::EngineState("engine is not running".to_string()));
        }
        self.maybe_persist(true)?;
        self.state = EngineState::Stopped;
        self.log_event(TradeLogEvent::Info, "engine stopped".to_string())?;
        info!("Engine stopped for {}", self.config.name);
        Ok(())
    }

    /// Cancel every live order and delete the ladder. Returns the number of
    /// orders cancelled. Stops at the first failed exchange cancel so no
    /// level is removed while its order may still rest on the book.
    pub fn reset_grid(&mut self) -> GridResult<usize> {
        if self.state == EngineState::Running {
            return Err(GridError::EngineState("stop the engine before resetting".to_string()));
        }

        let now = self.clock.now();
        let mut cancelled = 0;
        for intent in self.repo.active_intents(self.config_id)? {
            if let (Some(exchange), Some(order_id)) = (&self.exchange, intent.order_id.as_deref()) {
                let ack = exchange.cancel_order(&self.config.symbol, order_id)?;
                if ack.status == OrderStatus::Filled {
                    warn!("Order {} filled before reset could cancel it", order_id);
                }
            }
            let intent_id = intent
                .id
                .ok_or_else(|| GridError::StateInconsistency("stored intent without id".to_string()))?;
            self.repo.update_intent_status(intent_id, OrderStatus::Canceled, now)?;
            let mut log = TradeLog::new(
                self.config_id,
                TradeLogEvent::OrderCancel,
                format!("reset cancelled {} {} @ {}", intent.intent, intent.side, intent.price),
                now,
            )
            .with_level(intent.level_index);
            if let Some(order_id) = &intent.order_id {
                log = log.with_order(order_id.as_str());
            }
            self.repo.append_log(&log)?;
            cancelled += 1;
        }

        let removed = self.repo.delete_levels(self.config_id)?;
        self.levels.clear();
        self.log_event(
            TradeLogEvent::Info,
            format!("grid reset: {} orders cancelled, {} levels removed", cancelled, removed),
        )?;
        info!("Reset {}: {} orders cancelled, {} levels removed", self.config.name, cancelled, removed);
        Ok(cancelled)
    }

    fn check_fill_matches(&self, order: &OrderIntent, intent: OrderIntentKind) -> GridResult<()> {
        if order.config_id != self.config_id {
            return Err(GridError::StateInconsistency(format!(
                "order {} belongs to config {}",
                order.client_order_id, order.config_id
            )));
        }
        if order.intent != intent {
            return Err(GridError::StateInconsistency(format!(
                "order {} is an {} order, fill reported as {}",
                order.client_order_id, order.intent, intent
            )));
        }
        Ok(())
    }

    /// Log one STOP_LOSS event each time price enters the breach zone
    /// while a position is open. Returns whether the breach holds now.
    /// One WARNING per excursion over the limit
    fn watch_position_limit(&mut self, position: Decimal, within_limit: bool) -> GridResult<()> {
        if within_limit {
            self.limit_breach_latched = false;
            return Ok(());
        }
        if self.limit_breach_latched {
            return Ok(());
        }
        self.limit_breach_latched = true;
        warn!(
            "Position {} exceeds limit {} for {}",
            position, self.config.max_position_size, self.config.name
        );
        self.log_event(
            TradeLogEvent::Warning,
            format!("position {} exceeds limit {}", position, self.config.max_position_size),
        )
    }

    fn watch_stop_loss(&mut self, price: Decimal, position: Decimal) -> GridResult<bool> {
        let buffer = self.config.stop_loss_buffer_pct;
        let above = price >= self.config.upper_price * (Decimal::ONE + buffer);
        let below = price <= self.config.lower_price * (Decimal::ONE - buffer);
        let breach = match self.config.grid_mode {
            GridMode::Short => above,
            GridMode::Long => below,
            GridMode::Neutral => above || below,
        };

        if !breach {
            self.stop_loss_latched = false;
            return Ok(false);
        }
        if position.is_zero() {
            return Ok(false);
        }
        if !self.stop_loss_latched {
            self.stop_loss_latched = true;
            warn!(
                "Stop-loss boundary breached for {} at {} with position {}",
                self.config.name, price, position
            );
            self.log_event(
                TradeLogEvent::StopLoss,
                format!("price {} breached the stop-loss boundary with position {}", price, position),
            )?;
        }
        Ok(true)
    }

    fn maybe_persist(&mut self, force: bool) -> GridResult<bool> {
        let now = self.clock.now();
        let interval = self.settings.persist_interval();
        let due = match self.last_persist {
            Some(last) => now - last >= interval,
            None => true,
        };
        if !(force || due) {
            return Ok(false);
        }
        self.repo.save_levels(&mut self.levels)?;
        self.last_persist = Some(now);
        debug!("Persisted {} levels for {}", self.levels.len(), self.config.name);
        Ok(true)
    }

    fn require_running(&self, operation: &str) -> GridResult<()> {
        if self.state != EngineState::Running {
            return Err(GridError::EngineState(format!(
                "{} requires a running engine (state: {:?})",
                operation, self.state
            )));
        }
        Ok(())
    }

    fn log_event(&self, event: TradeLogEvent, message: String) -> GridResult<()> {
        self.repo
            .append_log(&TradeLog::new(self.config_id, event, message, self.clock.now()))
    }
}
