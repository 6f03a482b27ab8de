// Backtest harness
//
// Drives a `GridEngine` over historical candles: the clock jumps to each
// candle, the engine ticks at the open, the simulated exchange fills what
// the candle traded through, and every fill is fed back through
// `on_order_filled`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use super::Candle;
use crate::config::EngineConfig;
use crate::core::clock::ManualClock;
use crate::core::engine::{EngineState, GridEngine};
use crate::db::{GridConfig, GridRepository};
use crate::error::{GridError, GridResult};
use crate::progress::BacktestProgress;
use crate::simulation::{SimulatedExchange, SimulatedFill};
use crate::types::{LevelStatus, OrderSide};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BacktestReport {
    pub candles: usize,
    pub ticks: usize,
    pub fills: usize,
    pub orders_created: usize,
    pub orders_cancelled: usize,
    pub orders_failed: usize,
    pub filtered_orders: usize,
    pub final_position: Decimal,
    pub max_abs_position: Decimal,
    /// Sell proceeds minus buy cost
    pub net_cash_flow: Decimal,
    /// Cash flow plus the open position valued at the last close
    pub marked_pnl: Decimal,
}

pub struct BacktestHarness {
    engine: GridEngine,
    exchange: SimulatedExchange,
    clock: ManualClock,
    repo: Arc<dyn GridRepository>,
    show_progress: bool,
}

impl BacktestHarness {
    pub fn new(
        config: GridConfig,
        repo: Arc<dyn GridRepository>,
        exchange: SimulatedExchange,
        settings: EngineConfig,
    ) -> GridResult<Self> {
        let clock = ManualClock::new(chrono::Utc::now());
        let engine = GridEngine::builder(config, repo.clone())
            .with_exchange(Arc::new(exchange.clone()))
            .with_clock(Arc::new(clock.clone()))
            .with_settings(settings)
            .build()?;

        Ok(Self {
            engine,
            exchange,
            clock,
            repo,
            show_progress: false,
        })
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn engine(&self) -> &GridEngine {
        &self.engine
    }

    pub fn exchange(&self) -> &SimulatedExchange {
        &self.exchange
    }

    pub fn run(&mut self, candles: &[Candle]) -> GridResult<BacktestReport> {
        let first = candles
            .first()
            .ok_or_else(|| GridError::DataParse("no candles to replay".to_string()))?;

        if self.engine.state() != EngineState::Running {
            self.clock.set(first.timestamp);
            self.engine.start()?;
        }

        let progress = if self.show_progress {
            BacktestProgress::new(candles.len())
        } else {
            BacktestProgress::hidden()
        };

        let mut report = BacktestReport {
            candles: candles.len(),
            ..Default::default()
        };

        for candle in candles {
            self.clock.set(candle.timestamp);

            let summary = self.engine.tick(candle.open)?;
            report.ticks += 1;
            report.orders_created += summary.created_orders;
            report.orders_cancelled += summary.cancelled_orders;
            report.orders_failed += summary.failed_orders;
            report.filtered_orders += summary.filtered_orders;

            let fills = self.exchange.match_orders(candle.open, candle.high, candle.low, candle.close)?;
            for fill in &fills {
                route_fill(&mut self.engine, self.repo.as_ref(), fill)?;

                let notional = fill.price * fill.quantity;
                report.net_cash_flow += match fill.side {
                    OrderSide::Sell => notional,
                    OrderSide::Buy => -notional,
                };
                report.fills += 1;

                let position = self.engine.current_position();
                report.max_abs_position = report.max_abs_position.max(position.abs());
            }

            progress.step(report.fills, self.engine.current_position());
        }

        self.engine.stop()?;

        report.final_position = self.engine.current_position();
        let last_close = candles.last().map(|c| c.close).unwrap_or(Decimal::ZERO);
        report.marked_pnl = report.net_cash_flow + report.final_position * last_close;
        progress.finish(report.fills, report.net_cash_flow);

        info!(
            "Backtest {}: {} candles, {} fills, final position {}, net cash flow {}",
            self.engine.config().name,
            report.candles,
            report.fills,
            report.final_position,
            report.net_cash_flow
        );
        Ok(report)
    }
}

/// Hand one exchange fill to the engine, looking up which side of the
/// level's cycle the order belonged to.
pub fn route_fill(
    engine: &mut GridEngine,
    repo: &dyn GridRepository,
    fill: &SimulatedFill,
) -> GridResult<Option<LevelStatus>> {
    let intent = repo
        .find_intent_by_order_id(&fill.order_id)?
        .ok_or_else(|| GridError::not_found("OrderIntent", &fill.order_id))?;
    engine.on_order_filled(&fill.order_id, intent.intent)
}
