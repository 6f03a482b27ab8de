//! Grid level lifecycle
//!
//! A level cycles `idle -> entry_working -> position_open -> exit_working ->
//! idle` indefinitely. Only the six transitions below exist; anything else
//! is a logic error and is reported as `GridError::InvalidTransition`.
//!
//! | from            | event           | to              | order ids                |
//! |-----------------|-----------------|-----------------|--------------------------|
//! | idle            | entry placed    | entry_working   | store entry              |
//! | entry_working   | entry filled    | position_open   | retained                 |
//! | entry_working   | entry canceled  | idle            | clear entry              |
//! | position_open   | exit placed     | exit_working    | store exit               |
//! | exit_working    | exit canceled   | position_open   | clear exit               |
//! | exit_working    | exit filled     | idle            | clear all                |

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{GridError, GridResult};
use crate::types::{LevelStatus, OrderIntentKind, OrderSide};

/// Exchange order id plus the client id we generated for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRef {
    pub order_id: String,
    pub client_order_id: String,
}

impl OrderRef {
    pub fn new(order_id: impl Into<String>, client_order_id: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
            client_order_id: client_order_id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LevelEvent {
    EntryPlaced(OrderRef),
    EntryFilled,
    EntryCanceled,
    ExitPlaced(OrderRef),
    ExitCanceled,
    ExitFilled,
}

impl LevelEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LevelEvent::EntryPlaced(_) => "entry_placed",
            LevelEvent::EntryFilled => "entry_filled",
            LevelEvent::EntryCanceled => "entry_canceled",
            LevelEvent::ExitPlaced(_) => "exit_placed",
            LevelEvent::ExitCanceled => "exit_canceled",
            LevelEvent::ExitFilled => "exit_filled",
        }
    }

    pub fn placed(intent: OrderIntentKind, order: OrderRef) -> Self {
        match intent {
            OrderIntentKind::Entry => LevelEvent::EntryPlaced(order),
            OrderIntentKind::Exit => LevelEvent::ExitPlaced(order),
        }
    }

    pub fn filled(intent: OrderIntentKind) -> Self {
        match intent {
            OrderIntentKind::Entry => LevelEvent::EntryFilled,
            OrderIntentKind::Exit => LevelEvent::ExitFilled,
        }
    }

    pub fn canceled(intent: OrderIntentKind) -> Self {
        match intent {
            OrderIntentKind::Entry => LevelEvent::EntryCanceled,
            OrderIntentKind::Exit => LevelEvent::ExitCanceled,
        }
    }
}

/// Flat column view of a persisted level, before invariants are applied
#[derive(Debug, Clone, Default)]
pub struct LevelRecord {
    pub id: Option<i64>,
    pub config_id: i64,
    pub level_index: i32,
    pub price: Decimal,
    pub side: Option<OrderSide>,
    pub status: Option<LevelStatus>,
    pub entry_order_id: Option<String>,
    pub entry_client_order_id: Option<String>,
    pub exit_order_id: Option<String>,
    pub exit_client_order_id: Option<String>,
    pub blocked_until: Option<DateTime<Utc>>,
}

/// Outcome of repairing one inconsistent level
#[derive(Debug, Clone, PartialEq)]
pub struct LevelRepair {
    pub level_index: i32,
    pub from: LevelStatus,
    pub to: LevelStatus,
    pub orphan_order_ids: Vec<String>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridLevel {
    pub id: Option<i64>,
    pub config_id: i64,
    pub level_index: i32,
    pub price: Decimal,
    pub side: OrderSide,
    status: LevelStatus,
    entry: Option<OrderRef>,
    exit: Option<OrderRef>,
    blocked_until: Option<DateTime<Utc>>,
}

impl GridLevel {
    pub fn new(config_id: i64, level_index: i32, price: Decimal, side: OrderSide) -> Self {
        Self {
            id: None,
            config_id,
            level_index,
            price,
            side,
            status: LevelStatus::Idle,
            entry: None,
            exit: None,
            blocked_until: None,
        }
    }

    /// Rebuild a level from stored columns without validating the
    /// status/order-id pairing; recovery repairs any drift afterwards.
    pub fn rehydrate(record: LevelRecord) -> Self {
        let pair = |order_id: Option<String>, client_id: Option<String>| {
            order_id.map(|order_id| OrderRef {
                order_id,
                client_order_id: client_id.unwrap_or_default(),
            })
        };

        Self {
            id: record.id,
            config_id: record.config_id,
            level_index: record.level_index,
            price: record.price,
            side: record.side.unwrap_or(OrderSide::Sell),
            status: record.status.unwrap_or(LevelStatus::Idle),
            entry: pair(record.entry_order_id, record.entry_client_order_id),
            exit: pair(record.exit_order_id, record.exit_client_order_id),
            blocked_until: record.blocked_until,
        }
    }

    pub fn status(&self) -> LevelStatus {
        self.status
    }

    pub fn entry_order(&self) -> Option<&OrderRef> {
        self.entry.as_ref()
    }

    pub fn exit_order(&self) -> Option<&OrderRef> {
        self.exit.as_ref()
    }

    /// Order currently tracked for the given intent
    pub fn order_for(&self, intent: OrderIntentKind) -> Option<&OrderRef> {
        match intent {
            OrderIntentKind::Entry => self.entry.as_ref(),
            OrderIntentKind::Exit => self.exit.as_ref(),
        }
    }

    pub fn blocked_until(&self) -> Option<DateTime<Utc>> {
        self.blocked_until
    }

    /// Apply one lifecycle event. Undefined (state, event) pairs fail and
    /// leave the level untouched.
    pub fn transition(&mut self, event: LevelEvent) -> GridResult<LevelStatus> {
        let next = match (self.status, event) {
            (LevelStatus::Idle, LevelEvent::EntryPlaced(order)) => {
                self.entry = Some(order);
                LevelStatus::EntryWorking
            }
            (LevelStatus::EntryWorking, LevelEvent::EntryFilled) => LevelStatus::PositionOpen,
            (LevelStatus::EntryWorking, LevelEvent::EntryCanceled) => {
                self.entry = None;
                LevelStatus::Idle
            }
            (LevelStatus::PositionOpen, LevelEvent::ExitPlaced(order)) => {
                self.exit = Some(order);
                LevelStatus::ExitWorking
            }
            (LevelStatus::ExitWorking, LevelEvent::ExitCanceled) => {
                self.exit = None;
                LevelStatus::PositionOpen
            }
            (LevelStatus::ExitWorking, LevelEvent::ExitFilled) => {
                self.entry = None;
                self.exit = None;
                LevelStatus::Idle
            }
            (from, event) => {
                return Err(GridError::InvalidTransition {
                    level_index: self.level_index,
                    from,
                    event: event.name(),
                })
            }
        };

        self.status = next;
        Ok(next)
    }

    pub fn is_blocked(&self, now: DateTime<Utc>) -> bool {
        matches!(self.blocked_until, Some(until) if now < until)
    }

    /// Exclude the level from sync actions until `now + duration`.
    pub fn cooldown(&mut self, now: DateTime<Utc>, duration: Duration) {
        self.blocked_until = Some(now + duration);
    }

    pub fn can_place_entry_order(&self, now: DateTime<Utc>) -> bool {
        self.status == LevelStatus::Idle && !self.is_blocked(now)
    }

    pub fn can_place_exit_order(&self, now: DateTime<Utc>) -> bool {
        self.status == LevelStatus::PositionOpen && !self.is_blocked(now)
    }

    pub fn can_place(&self, intent: OrderIntentKind, now: DateTime<Utc>) -> bool {
        match intent {
            OrderIntentKind::Entry => self.can_place_entry_order(now),
            OrderIntentKind::Exit => self.can_place_exit_order(now),
        }
    }

    /// Status a level must be in while an order of this intent is live
    pub fn working_status(intent: OrderIntentKind) -> LevelStatus {
        match intent {
            OrderIntentKind::Entry => LevelStatus::EntryWorking,
            OrderIntentKind::Exit => LevelStatus::ExitWorking,
        }
    }

    /// Move the level to the nearest consistent state when its status and
    /// recorded order ids disagree. Returns `None` when nothing changed.
    pub fn repair(&mut self) -> Option<LevelRepair> {
        let from = self.status;
        let mut orphans = Vec::new();
        let mut reasons = Vec::new();

        match self.status {
            LevelStatus::EntryWorking if self.entry.is_none() => {
                self.status = LevelStatus::Idle;
                reasons.push("entry_working without entry order id");
            }
            LevelStatus::ExitWorking if self.exit.is_none() => {
                self.status = LevelStatus::PositionOpen;
                reasons.push("exit_working without exit order id");
            }
            _ => {}
        }

        if self.status == LevelStatus::Idle {
            if let Some(entry) = self.entry.take() {
                orphans.push(entry.order_id);
                reasons.push("idle level still referenced an entry order");
            }
        }
        if self.status != LevelStatus::ExitWorking {
            if let Some(exit) = self.exit.take() {
                orphans.push(exit.order_id);
                reasons.push("exit order recorded without exit_working status");
            }
        }

        if reasons.is_empty() {
            return None;
        }

        Some(LevelRepair {
            level_index: self.level_index,
            from,
            to: self.status,
            orphan_order_ids: orphans,
            reason: reasons.join("; "),
        })
    }

    pub fn is_consistent(&self) -> bool {
        let mut probe = self.clone();
        probe.repair().is_none()
    }
}
