//! Progress bar utilities for long-running operations
//!
//! Visual feedback during candle replay and other slow CLI commands,
//! using the indicatif crate.

use indicatif::{ProgressBar, ProgressStyle};
use rust_decimal::Decimal;
use std::time::Duration;

fn bar_style(template: &str) -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
}

/// Progress bar for backtesting operations
pub struct BacktestProgress {
    pub progress: ProgressBar,
}

impl BacktestProgress {
    /// Create a new backtest progress bar
    pub fn new(total_candles: usize) -> Self {
        let progress = ProgressBar::new(total_candles as u64);
        progress.set_style(bar_style(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len}\n{msg}",
        ));

        Self { progress }
    }

    /// Hidden bar for library callers and tests
    pub fn hidden() -> Self {
        Self {
            progress: ProgressBar::hidden(),
        }
    }

    /// Advance one candle
    pub fn step(&self, fills: usize, position: Decimal) {
        self.progress.inc(1);
        self.progress
            .set_message(format!("📊 fills: {} | position: {}", fills, position));
    }

    /// Mark backtest as complete
    pub fn finish(&self, fills: usize, net_cash_flow: Decimal) {
        self.progress.finish_with_message(format!(
            "✅ Backtest complete! {} fills, net cash flow {}",
            fills, net_cash_flow
        ));
    }
}

/// Spinner for quick operations
pub struct Spinner {
    pub spinner: ProgressBar,
}

impl Spinner {
    /// Create a new spinner
    pub fn new(message: &str) -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(Duration::from_millis(100));
        spinner.set_message(message.to_string());

        Self { spinner }
    }

    /// Finish spinner with success
    pub fn finish(&self, message: &str) {
        self.spinner.finish_with_message(format!("✅ {}", message));
    }

    /// Finish spinner with error
    pub fn finish_with_error(&self, message: &str) {
        self.spinner.finish_with_message(format!("❌ {}", message));
    }
}
