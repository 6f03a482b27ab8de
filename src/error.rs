//! Unified error handling for the grid engine
//!
//! Every fallible operation in the crate returns `GridResult<T>`. The
//! variants map onto the failure classes the engine distinguishes:
//! logic bugs (`InvalidTransition`), recoverable exchange failures
//! (`ExchangeCall`), fatal configuration problems (`ConfigValidation`),
//! and repaired-on-start drift (`StateInconsistency`).

use std::io;

use thiserror::Error;

use crate::types::LevelStatus;

/// Main error type for the grid engine
#[derive(Debug, Error)]
pub enum GridError {
    #[error("Invalid transition on level {level_index}: {from} cannot handle {event}")]
    InvalidTransition {
        level_index: i32,
        from: LevelStatus,
        event: &'static str,
    },

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("Exchange call failed: {0}")]
    ExchangeCall(String),

    #[error("Configuration validation error: {0}")]
    ConfigValidation(String),

    #[error("State inconsistency: {0}")]
    StateInconsistency(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Engine is not in a valid state for this operation: {0}")]
    EngineState(String),

    #[error("Configuration parse error: {0}")]
    ConfigParse(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Data parse error: {0}")]
    DataParse(String),
}

impl GridError {
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        GridError::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    /// Get a user-friendly error message with helpful context
    pub fn user_message(&self) -> String {
        match self {
            GridError::ConfigValidation(msg) => {
                format!(
                    "Grid configuration is invalid: {}\n\n\
                    💡 Check that:\n\
                    - lower_price < upper_price and both are positive\n\
                    - grid_levels is at least 5\n\
                    - trade_amount, price_tick and qty_step are positive",
                    msg
                )
            }
            GridError::NotFound { entity, key } => {
                format!(
                    "{} not found: {}\n\n\
                    💡 List what exists with: grid-bot config list",
                    entity, key
                )
            }
            GridError::Database(msg) => {
                format!(
                    "Database error: {}\n\n\
                    💡 Try:\n\
                    1. Run: grid-bot init\n\
                    2. Check the data/ directory permissions",
                    msg
                )
            }
            _ => self.to_string(),
        }
    }

    /// Exchange failures are retried on a later tick once the level cools down.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GridError::ExchangeCall(_))
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            GridError::InvalidTransition { .. } | GridError::StateInconsistency(_) => "state",
            GridError::NotFound { .. } | GridError::Database(_) => "database",
            GridError::ExchangeCall(_) => "exchange",
            GridError::ConfigValidation(_) | GridError::ConfigParse(_) => "config",
            GridError::EngineState(_) => "engine",
            GridError::Io(_) | GridError::DataParse(_) => "io",
        }
    }
}

impl From<io::Error> for GridError {
    fn from(err: io::Error) -> Self {
        GridError::Io(err.to_string())
    }
}

impl From<rusqlite::Error> for GridError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(_, Some(msg)) => {
                if msg.contains("UNIQUE constraint") || msg.contains("FOREIGN KEY constraint") {
                    GridError::Database(format!("constraint violation: {}", msg))
                } else {
                    GridError::Database(msg)
                }
            }
            rusqlite::Error::QueryReturnedNoRows => {
                GridError::Database("Query returned no rows".to_string())
            }
            _ => GridError::Database(err.to_string()),
        }
    }
}

impl From<toml::de::Error> for GridError {
    fn from(err: toml::de::Error) -> Self {
        GridError::ConfigParse(format!("TOML parse error: {}", err))
    }
}

impl From<crate::config::ConfigError> for GridError {
    fn from(err: crate::config::ConfigError) -> Self {
        use crate::config::ConfigError;
        match err {
            ConfigError::Validation(msg) => GridError::ConfigValidation(msg),
            ConfigError::Parse(msg) => GridError::ConfigParse(msg),
            other => GridError::Io(other.to_string()),
        }
    }
}

impl From<rust_decimal::Error> for GridError {
    fn from(err: rust_decimal::Error) -> Self {
        GridError::DataParse(format!("decimal: {}", err))
    }
}

/// Result type alias using GridError
pub type GridResult<T> = Result<T, GridError>;
