// Backtesting data structures
//
// Candles are replayed through the unchanged engine and sync path against
// a simulated exchange; see `engine::BacktestHarness`.

pub mod engine;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::error::{GridError, GridResult};

pub use engine::{route_fill, BacktestHarness, BacktestReport};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
}

impl Candle {
    pub fn new(timestamp: DateTime<Utc>, open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
        }
    }

    fn validate(&self) -> GridResult<()> {
        if self.low > self.high
            || self.open < self.low
            || self.open > self.high
            || self.close < self.low
            || self.close > self.high
        {
            return Err(GridError::DataParse(format!(
                "inconsistent candle at {}: o={} h={} l={} c={}",
                self.timestamp, self.open, self.high, self.low, self.close
            )));
        }
        Ok(())
    }
}

/// Parse `timestamp_ms,open,high,low,close` lines; a header row and blank
/// lines are skipped.
pub fn parse_candles(content: &str) -> GridResult<Vec<Candle>> {
    let mut candles = Vec::new();

    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if line_no == 0 && fields.first().map_or(false, |f| f.parse::<i64>().is_err()) {
            continue;
        }
        if fields.len() < 5 {
            return Err(GridError::DataParse(format!(
                "line {}: expected 5 fields, found {}",
                line_no + 1,
                fields.len()
            )));
        }

        let millis: i64 = fields[0]
            .parse()
            .map_err(|e| GridError::DataParse(format!("line {}: bad timestamp: {}", line_no + 1, e)))?;
        let timestamp = DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| GridError::DataParse(format!("line {}: timestamp out of range", line_no + 1)))?;
        let price = |idx: usize| {
            Decimal::from_str(fields[idx])
                .map_err(|e| GridError::DataParse(format!("line {}: bad price '{}': {}", line_no + 1, fields[idx], e)))
        };

        let candle = Candle::new(timestamp, price(1)?, price(2)?, price(3)?, price(4)?);
        candle.validate()?;
        candles.push(candle);
    }

    Ok(candles)
}

pub fn load_candles_csv<P: AsRef<Path>>(path: P) -> GridResult<Vec<Candle>> {
    let content = fs::read_to_string(path)?;
    parse_candles(&content)
}
