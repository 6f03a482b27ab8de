// Grid Trading Engine Library
//
// Per-level order lifecycle, ideal-order derivation, idempotent order
// synchronization and risk guardrails for grid trading, backed by SQLite.

pub mod backtesting;
pub mod clients;
pub mod config;
pub mod core;
pub mod db;          // SQLite database layer
pub mod error;       // Unified error handling
pub mod progress;
pub mod simulation;
pub mod types;

// Re-export core engine types
pub use self::core::{
    Clock, EngineState, GridEngine, GridLevel, IdealOrder, LevelEvent, LevelStrategy, ManualClock,
    OrderSyncManager, RecoveryReport, RiskDecision, RiskManager, StrategyMode, SystemClock,
    TickSummary,
};

// Re-export error types
pub use error::{GridError, GridResult};

// Re-export configuration
pub use config::{Config, ConfigError, DatabaseConfig, EngineConfig, LoggingConfig};

// Re-export database types
pub use db::{
    Database, GridConfig, GridOrder, GridOrderStatus, GridRepository, GridStrategy, OrderIntent,
    PositionDirection, StrategyStatus, TradeLog,
};

// Re-export exchange and replay components
pub use backtesting::{load_candles_csv, BacktestHarness, BacktestReport, Candle};
pub use clients::{CancelAck, ExchangeAdapter, OrderAck, OrderRequest};
pub use simulation::{SimulatedExchange, SimulatedFill};

pub use types::{
    GridMode, LevelStatus, OrderIntentKind, OrderSide, OrderStatus, OrderType, TradeLogEvent,
};
