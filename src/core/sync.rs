//! Order synchronization
//!
//! Reconciles the ideal-order set against the locally tracked live orders.
//! Both sides are reduced to `OrderKey`s; the cancel set is
//! `existing - ideal` and the create set is `ideal - existing`, so a second
//! pass over unchanged inputs issues nothing. Every exchange call is
//! followed immediately by the matching local write, and a failing level
//! is cooled down without affecting the others.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::clients::{ExchangeAdapter, OrderRequest};
use crate::core::clock::Clock;
use crate::core::level::{GridLevel, LevelEvent, OrderRef};
use crate::core::strategy::IdealOrder;
use crate::db::{GridConfig, GridRepository, OrderIntent, TradeLog};
use crate::error::{GridError, GridResult};
use crate::types::{OrderIntentKind, OrderSide, OrderStatus, OrderType, TradeLogEvent};

static LAST_CLIENT_ID_MILLIS: AtomicI64 = AtomicI64::new(0);

/// Identity of an order for reconciliation purposes
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OrderKey {
    pub intent: OrderIntentKind,
    pub side: OrderSide,
    pub price: Decimal,
    pub level_index: i32,
}

impl OrderKey {
    pub fn new(
        intent: OrderIntentKind,
        side: OrderSide,
        price: Decimal,
        level_index: i32,
        precision: u32,
    ) -> Self {
        OrderKey {
            intent,
            side,
            price: price.round_dp(precision).normalize(),
            level_index,
        }
    }

    pub fn from_intent(intent: &OrderIntent, precision: u32) -> Self {
        Self::new(intent.intent, intent.side, intent.price, intent.level_index, precision)
    }

    pub fn from_ideal(order: &IdealOrder, precision: u32) -> Self {
        Self::new(order.intent, order.side, order.price, order.level_index, precision)
    }
}

/// What one sync pass did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncOutcome {
    pub created_order_ids: Vec<String>,
    pub cancelled_order_ids: Vec<String>,
    pub failed: usize,
    pub skipped_blocked: usize,
}

/// `{config}_{INTENT}_{SIDE}_{level}_{epoch_ms}_{4 hex}`.
///
/// The millisecond component never repeats within a process, so ids for
/// the same (intent, side, level) are distinct even when generated in a
/// tight loop; the random suffix separates concurrent processes.
pub fn generate_client_order_id(
    config_id: i64,
    intent: OrderIntentKind,
    side: OrderSide,
    level_index: i32,
    now: DateTime<Utc>,
) -> String {
    let wanted = now.timestamp_millis();
    let previous = LAST_CLIENT_ID_MILLIS
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(wanted.max(last + 1))
        })
        .unwrap_or(wanted);
    let millis = wanted.max(previous + 1);
    let suffix: u16 = rand::random();

    format!(
        "{}_{}_{}_{}_{}_{:04x}",
        config_id,
        intent.as_str(),
        side.as_str(),
        level_index,
        millis,
        suffix
    )
}

pub struct OrderSyncManager {
    repo: Arc<dyn GridRepository>,
    exchange: Option<Arc<dyn ExchangeAdapter>>,
    clock: Arc<dyn Clock>,
    cooldown: Duration,
    price_key_precision: u32,
}

impl OrderSyncManager {
    pub fn new(
        repo: Arc<dyn GridRepository>,
        exchange: Option<Arc<dyn ExchangeAdapter>>,
        clock: Arc<dyn Clock>,
        cooldown: Duration,
        price_key_precision: u32,
    ) -> Self {
        Self {
            repo,
            exchange,
            clock,
            cooldown,
            price_key_precision,
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.exchange.is_none()
    }

    /// Bring live orders in line with `ideal`. Level mutations are written
    /// through to the repository and reflected in `levels`.
    pub fn sync(
        &self,
        config: &GridConfig,
        levels: &mut [GridLevel],
        ideal: &[IdealOrder],
    ) -> GridResult<SyncOutcome> {
        let config_id = config.require_id()?;
        let precision = self.price_key_precision;

        let mut existing: BTreeMap<OrderKey, OrderIntent> = BTreeMap::new();
        for intent in self.repo.active_intents(config_id)? {
            let key = OrderKey::from_intent(&intent, precision);
            if existing.contains_key(&key) {
                warn!(
                    "Duplicate live order for level {} ({}), keeping the first",
                    intent.level_index, intent.client_order_id
                );
                continue;
            }
            existing.insert(key, intent);
        }

        let wanted: BTreeMap<OrderKey, &IdealOrder> = ideal
            .iter()
            .map(|order| (OrderKey::from_ideal(order, precision), order))
            .collect();

        let to_cancel: Vec<&OrderIntent> = existing
            .iter()
            .filter(|(key, _)| !wanted.contains_key(*key))
            .map(|(_, intent)| intent)
            .collect();
        let to_create: Vec<&IdealOrder> = wanted
            .iter()
            .filter(|(key, _)| !existing.contains_key(*key))
            .map(|(_, order)| *order)
            .collect();

        debug!(
            "Sync {}: {} live, {} ideal, {} to cancel, {} to create",
            config.name,
            existing.len(),
            wanted.len(),
            to_cancel.len(),
            to_create.len()
        );

        let index: HashMap<i32, usize> = levels
            .iter()
            .enumerate()
            .map(|(pos, level)| (level.level_index, pos))
            .collect();

        let mut outcome = SyncOutcome::default();

        for intent in to_cancel {
            let level = index.get(&intent.level_index).map(|&pos| &mut levels[pos]);
            self.cancel_one(config, intent, level, &mut outcome)?;
        }

        for order in to_create {
            match index.get(&order.level_index) {
                Some(&pos) => self.create_one(config, order, &mut levels[pos], &mut outcome)?,
                None => warn!("No level {} for ideal order, skipping", order.level_index),
            }
        }

        if !outcome.created_order_ids.is_empty() || !outcome.cancelled_order_ids.is_empty() {
            info!(
                "Sync {}: created {}, cancelled {}, failed {}",
                config.name,
                outcome.created_order_ids.len(),
                outcome.cancelled_order_ids.len(),
                outcome.failed
            );
        }

        Ok(outcome)
    }

    fn cancel_one(
        &self,
        config: &GridConfig,
        intent: &OrderIntent,
        mut level: Option<&mut GridLevel>,
        outcome: &mut SyncOutcome,
    ) -> GridResult<()> {
        let now = self.clock.now();
        if let Some(level) = level.as_deref() {
            if level.is_blocked(now) {
                outcome.skipped_blocked += 1;
                return Ok(());
            }
        }

        let intent_id = intent
            .id
            .ok_or_else(|| GridError::StateInconsistency("active intent without id".to_string()))?;
        let order_id = intent.order_id.clone().unwrap_or_default();

        let status = match (&self.exchange, intent.order_id.as_deref()) {
            (Some(exchange), Some(order_id)) => {
                match exchange.cancel_order(&config.symbol, order_id) {
                    Ok(ack) => ack.status,
                    Err(e) => {
                        self.record_failure(config, intent.level_index, level, "cancel", &order_id, &e)?;
                        outcome.failed += 1;
                        return Ok(());
                    }
                }
            }
            _ => OrderStatus::Canceled,
        };

        if status == OrderStatus::Filled {
            warn!(
                "Order {} on level {} filled before it could be cancelled",
                order_id, intent.level_index
            );
            self.repo.append_log(
                &TradeLog::new(
                    config.require_id()?,
                    TradeLogEvent::Warning,
                    "cancel raced a fill; waiting for the fill report",
                    now,
                )
                .with_level(intent.level_index)
                .with_order(order_id.as_str()),
            )?;
            return Ok(());
        }

        self.repo
            .update_intent_status(intent_id, OrderStatus::Canceled, now)?;

        if let Some(level) = level.as_deref_mut() {
            let tracked = level
                .order_for(intent.intent)
                .map(|o| o.order_id.as_str() == order_id)
                .unwrap_or(false);
            if level.status() == GridLevel::working_status(intent.intent) && tracked {
                level.transition(LevelEvent::canceled(intent.intent))?;
                self.repo.save_level(level)?;
            } else {
                warn!(
                    "Cancelled order {} was not tracked by level {} ({})",
                    order_id,
                    level.level_index,
                    level.status()
                );
            }
        }

        self.repo.append_log(
            &TradeLog::new(
                config.require_id()?,
                TradeLogEvent::OrderCancel,
                format!("cancelled {} {} @ {}", intent.intent, intent.side, intent.price),
                now,
            )
            .with_level(intent.level_index)
            .with_order(order_id.as_str()),
        )?;
        outcome.cancelled_order_ids.push(order_id);
        Ok(())
    }

    fn create_one(
        &self,
        config: &GridConfig,
        order: &IdealOrder,
        level: &mut GridLevel,
        outcome: &mut SyncOutcome,
    ) -> GridResult<()> {
        let now = self.clock.now();
        if level.is_blocked(now) {
            outcome.skipped_blocked += 1;
            return Ok(());
        }
        if !level.can_place(order.intent, now) {
            debug!(
                "Level {} in {} cannot place {} order",
                level.level_index,
                level.status(),
                order.intent
            );
            return Ok(());
        }

        let config_id = config.require_id()?;
        let client_order_id =
            generate_client_order_id(config_id, order.intent, order.side, order.level_index, now);

        let (order_id, status) = match &self.exchange {
            Some(exchange) => {
                let request = OrderRequest {
                    symbol: config.symbol.clone(),
                    side: order.side,
                    order_type: OrderType::Limit,
                    quantity: order.amount,
                    price: order.price,
                    client_order_id: client_order_id.clone(),
                };
                let result = exchange.create_order(&request).and_then(|ack| {
                    if ack.status.is_active() || ack.status == OrderStatus::Filled {
                        Ok(ack)
                    } else {
                        Err(GridError::ExchangeCall(format!("order {} came back {}", ack.order_id, ack.status)))
                    }
                });
                match result {
                    Ok(ack) => (ack.order_id, ack.status),
                    Err(e) => {
                        self.record_failure(config, order.level_index, Some(level), "create", &client_order_id, &e)?;
                        outcome.failed += 1;
                        return Ok(());
                    }
                }
            }
            None => (format!("test_{}", Uuid::new_v4().simple()), OrderStatus::New),
        };

        // A fill reported at creation is still delivered through the fill path
        let mut intent = OrderIntent::new(
            config_id,
            order.level_index,
            client_order_id.clone(),
            Some(order_id.clone()),
            order.intent,
            order.side,
            order.price,
            order.amount,
            now,
        );
        if status == OrderStatus::PartiallyFilled {
            intent.status = status;
        }
        if let Err(e) = self.repo.insert_intent(&intent) {
            error!(
                "Order {} is live on the exchange but could not be recorded: {}",
                order_id, e
            );
            return Err(e);
        }

        level.transition(LevelEvent::placed(order.intent, OrderRef::new(order_id.as_str(), client_order_id)))?;
        self.repo.save_level(level)?;

        self.repo.append_log(
            &TradeLog::new(
                config_id,
                TradeLogEvent::OrderCreate,
                format!("placed {} {} {} @ {}", order.intent, order.side, order.amount, order.price),
                now,
            )
            .with_level(order.level_index)
            .with_order(order_id.as_str()),
        )?;
        outcome.created_order_ids.push(order_id);
        Ok(())
    }

    /// ERROR audit entry plus a cooldown on the level
    fn record_failure(
        &self,
        config: &GridConfig,
        level_index: i32,
        level: Option<&mut GridLevel>,
        action: &str,
        reference: &str,
        err: &GridError,
    ) -> GridResult<()> {
        let now = self.clock.now();
        error!("Failed to {} order on level {}: {}", action, level_index, err);

        self.repo.append_log(
            &TradeLog::new(
                config.require_id()?,
                TradeLogEvent::Error,
                format!("{} failed: {}", action, err),
                now,
            )
            .with_level(level_index)
            .with_order(reference),
        )?;

        if let Some(level) = level {
            level.cooldown(now, self.cooldown);
            self.repo.save_level(level)?;
        }
        Ok(())
    }
}
