// Common enums shared by the persistence layer and the grid engine.
// Each one round-trips through a TEXT column via `as_str` / `FromStr`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::GridError;

macro_rules! db_enum {
    ($name:ident, $label:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = GridError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_uppercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    other => Err(GridError::DataParse(format!("unknown {}: {}", $label, other))),
                }
            }
        }
    };
}

pub(crate) use db_enum;

/// Direction a grid ladder trades in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GridMode {
    Short,
    Long,
    Neutral,
}

db_enum!(GridMode, "grid mode", {
    Short => "SHORT",
    Long => "LONG",
    Neutral => "NEUTRAL",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

db_enum!(OrderSide, "order side", {
    Buy => "BUY",
    Sell => "SELL",
});

impl OrderSide {
    pub fn opposite(&self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }

    /// +1 for buys, -1 for sells. Multiply by a quantity to get a position delta.
    pub fn sign(&self) -> i32 {
        match self {
            OrderSide::Buy => 1,
            OrderSide::Sell => -1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Limit,
    Market,
}

db_enum!(OrderType, "order type", {
    Limit => "LIMIT",
    Market => "MARKET",
});

/// Lifecycle state of a single grid level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LevelStatus {
    Idle,
    EntryWorking,
    PositionOpen,
    ExitWorking,
}

db_enum!(LevelStatus, "level status", {
    Idle => "IDLE",
    EntryWorking => "ENTRY_WORKING",
    PositionOpen => "POSITION_OPEN",
    ExitWorking => "EXIT_WORKING",
});

impl LevelStatus {
    pub const ALL: [LevelStatus; 4] = [
        LevelStatus::Idle,
        LevelStatus::EntryWorking,
        LevelStatus::PositionOpen,
        LevelStatus::ExitWorking,
    ];

    /// Levels in these states carry inventory.
    pub fn holds_position(&self) -> bool {
        matches!(self, LevelStatus::PositionOpen | LevelStatus::ExitWorking)
    }
}

/// Whether an order opens (entry) or closes (exit) a level's position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OrderIntentKind {
    Entry,
    Exit,
}

db_enum!(OrderIntentKind, "order intent", {
    Entry => "ENTRY",
    Exit => "EXIT",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
    Expired,
}

db_enum!(OrderStatus, "order status", {
    New => "NEW",
    PartiallyFilled => "PARTIALLY_FILLED",
    Filled => "FILLED",
    Canceled => "CANCELED",
    Rejected => "REJECTED",
    Expired => "EXPIRED",
});

impl OrderStatus {
    /// Orders in these states may still be resting on the exchange.
    pub fn is_active(&self) -> bool {
        matches!(self, OrderStatus::New | OrderStatus::PartiallyFilled)
    }
}

/// Audit trail event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeLogEvent {
    Init,
    OrderCreate,
    OrderFill,
    OrderCancel,
    StopLoss,
    Error,
    Warning,
    Info,
}

db_enum!(TradeLogEvent, "trade log event", {
    Init => "INIT",
    OrderCreate => "ORDER_CREATE",
    OrderFill => "ORDER_FILL",
    OrderCancel => "ORDER_CANCEL",
    StopLoss => "STOP_LOSS",
    Error => "ERROR",
    Warning => "WARNING",
    Info => "INFO",
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_text() {
        for status in LevelStatus::ALL {
            assert_eq!(status.as_str().parse::<LevelStatus>().unwrap(), status);
        }
        assert_eq!("partially_filled".parse::<OrderStatus>().unwrap(), OrderStatus::PartiallyFilled);
    }

    #[test]
    fn test_unknown_value_is_rejected() {
        assert!("SIDEWAYS".parse::<GridMode>().is_err());
    }

    #[test]
    fn test_active_order_statuses() {
        assert!(OrderStatus::New.is_active());
        assert!(OrderStatus::PartiallyFilled.is_active());
        assert!(!OrderStatus::Filled.is_active());
        assert!(!OrderStatus::Canceled.is_active());
    }

    #[test]
    fn test_side_helpers() {
        assert_eq!(OrderSide::Buy.opposite(), OrderSide::Sell);
        assert_eq!(OrderSide::Sell.sign(), -1);
    }
}
