// Core grid engine modules

pub mod clock;
pub mod engine;
pub mod level;
pub mod risk_manager;
pub mod strategy;
pub mod sync;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{EngineState, GridEngine, GridEngineBuilder, RecoveryReport, TickSummary};
pub use level::{GridLevel, LevelEvent, LevelRepair, OrderRef};
pub use risk_manager::{RiskDecision, RiskManager};
pub use strategy::{IdealOrder, LevelStrategy, StrategyMode};
pub use sync::{OrderKey, OrderSyncManager, SyncOutcome};
