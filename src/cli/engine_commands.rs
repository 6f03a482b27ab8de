// Engine command implementations: paper trading, candle replay, reset
use rust_decimal::Decimal;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use grid_engine::backtesting::route_fill;
use grid_engine::progress::Spinner;
use grid_engine::simulation::RestingOrder;
use grid_engine::{
    load_candles_csv, BacktestHarness, Config, Database, GridConfig, GridEngine, GridError,
    GridRepository, GridResult, OrderIntent, SimulatedExchange, TickSummary,
};

/// One price per line; for CSV rows the last column (close) is used.
/// A non-numeric first line is treated as a header.
pub fn load_prices<P: AsRef<Path>>(path: P) -> GridResult<Vec<Decimal>> {
    let content = fs::read_to_string(path)?;
    let mut prices = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let field = line.rsplit(',').next().unwrap_or(line).trim();
        match Decimal::from_str(field) {
            Ok(price) if price > Decimal::ZERO => prices.push(price),
            Ok(price) => {
                return Err(GridError::DataParse(format!(
                    "line {}: price must be positive, got {}",
                    line_no + 1,
                    price
                )))
            }
            Err(_) if line_no == 0 => continue,
            Err(e) => {
                return Err(GridError::DataParse(format!("line {}: {}", line_no + 1, e)))
            }
        }
    }
    Ok(prices)
}

/// Put orders left live by a previous paper session back on the
/// simulated book so recovery and sync see a consistent venue.
fn restore_open_orders(
    exchange: &SimulatedExchange,
    db: &Database,
    config: &GridConfig,
) -> GridResult<usize> {
    let mut restored = 0;
    for intent in OrderIntent::list_active(db, config.require_id()?)? {
        let Some(order_id) = intent.order_id.clone() else {
            continue;
        };
        if !order_id.starts_with("sim-") {
            continue;
        }
        exchange.restore_order(RestingOrder {
            order_id,
            client_order_id: intent.client_order_id,
            symbol: config.symbol.clone(),
            side: intent.side,
            price: intent.price,
            quantity: intent.amount,
        })?;
        restored += 1;
    }
    Ok(restored)
}

fn paper_step(
    engine: &mut GridEngine,
    exchange: Option<&SimulatedExchange>,
    repo: &dyn GridRepository,
    price: Decimal,
) -> GridResult<(TickSummary, usize)> {
    let summary = engine.tick(price)?;
    let mut fills = 0;
    if let Some(exchange) = exchange {
        for fill in exchange.match_orders(price, price, price, price)? {
            route_fill(engine, repo, &fill)?;
            info!("💱 Filled {} {} @ {}", fill.side, fill.quantity, fill.price);
            fills += 1;
        }
    }
    Ok((summary, fills))
}

pub async fn run_paper_trading(
    settings: &Config,
    db: Database,
    id_or_name: &str,
    prices_path: &Path,
    dry_run: bool,
    max_ticks: Option<usize>,
) -> GridResult<()> {
    let config = GridConfig::resolve(&db, id_or_name)?;
    let prices = load_prices(prices_path)?;
    if prices.is_empty() {
        return Err(GridError::DataParse(format!(
            "no prices in {}",
            prices_path.display()
        )));
    }

    let repo: Arc<dyn GridRepository> = Arc::new(db.clone());
    let mut builder =
        GridEngine::builder(config.clone(), repo.clone()).with_settings(settings.engine.clone());

    let exchange = if dry_run {
        info!("🧪 DRY RUN: no exchange, synthetic order ids");
        None
    } else {
        let exchange = SimulatedExchange::with_default_config();
        let restored = restore_open_orders(&exchange, &db, &config)?;
        if restored > 0 {
            info!("♻️  Restored {} open paper orders", restored);
        }
        builder = builder.with_exchange(Arc::new(exchange.clone()));
        info!("📄 Paper trading against the simulated exchange");
        Some(exchange)
    };

    let mut engine = builder.build()?;
    let report = engine.start()?;
    info!(
        "🚀 {} started: {} levels, {} repaired, {} orphans, {} adopted, {} settled",
        config.name,
        engine.levels().len(),
        report.repaired_levels,
        report.orphan_order_ids.len(),
        report.adopted_intents,
        report.settled_intents
    );

    let mut interval = tokio::time::interval(Duration::from_secs(config.refresh_interval_secs));
    let mut feed = prices.into_iter();
    let mut ticks = 0usize;
    let mut outcome: GridResult<()> = Ok(());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                warn!("⏹️  Interrupted, stopping engine");
                break;
            }
            _ = interval.tick() => {
                let Some(price) = feed.next() else {
                    info!("Price feed exhausted after {} ticks", ticks);
                    break;
                };

                match paper_step(&mut engine, exchange.as_ref(), repo.as_ref(), price) {
                    Ok((summary, fills)) => {
                        if settings.logging.tick_logging {
                            info!(
                                "📈 {} | pos {} | ideal {} allowed {} filtered {} | +{} -{} !{} | fills {}{}",
                                price,
                                summary.current_position,
                                summary.ideal_orders,
                                summary.allowed_orders,
                                summary.filtered_orders,
                                summary.created_orders,
                                summary.cancelled_orders,
                                summary.failed_orders,
                                fills,
                                if summary.stop_loss_triggered { " | ⚠️ STOP-LOSS" } else { "" }
                            );
                        }
                    }
                    Err(e) => {
                        error!("❌ Tick failed: {}", e.user_message());
                        outcome = Err(e);
                        break;
                    }
                }

                ticks += 1;
                if max_ticks.map_or(false, |max| ticks >= max) {
                    info!("Reached {} ticks", ticks);
                    break;
                }
            }
        }
    }

    engine.stop()?;
    info!(
        "✅ Stopped {} after {} ticks, position {}",
        config.name,
        ticks,
        engine.current_position()
    );
    outcome
}

pub fn run_backtest(
    settings: &Config,
    db: &Database,
    id_or_name: &str,
    candles_path: &Path,
    json: bool,
) -> GridResult<()> {
    let mut config = GridConfig::resolve(db, id_or_name)?;
    let candles = if json {
        load_candles_csv(candles_path)?
    } else {
        let spinner = Spinner::new(&format!("Loading candles from {}...", candles_path.display()));
        match load_candles_csv(candles_path) {
            Ok(candles) => {
                spinner.finish(&format!("Loaded {} candles", candles.len()));
                candles
            }
            Err(e) => {
                spinner.finish_with_error("Failed to load candles");
                return Err(e);
            }
        }
    };
    info!(
        "📊 Replaying {} candles for '{}' in an isolated database",
        candles.len(),
        config.name
    );

    let scratch = Database::new_in_memory()?;
    scratch.run_migrations()?;
    config.is_active = true;
    config.id = Some(config.insert(&scratch)?);

    let repo: Arc<dyn GridRepository> = Arc::new(scratch);
    let mut harness = BacktestHarness::new(
        config,
        repo,
        SimulatedExchange::with_default_config(),
        settings.engine.clone(),
    )?
    .with_progress(!json);
    let report = harness.run(&candles)?;

    if json {
        let text = serde_json::to_string_pretty(&report)
            .map_err(|e| GridError::DataParse(e.to_string()))?;
        println!("{}", text);
    } else {
        println!();
        println!("Candles:          {}", report.candles);
        println!("Fills:            {}", report.fills);
        println!("Orders created:   {}", report.orders_created);
        println!("Orders cancelled: {}", report.orders_cancelled);
        println!("Orders failed:    {}", report.orders_failed);
        println!("Entries filtered: {}", report.filtered_orders);
        println!("Final position:   {}", report.final_position);
        println!("Max |position|:   {}", report.max_abs_position);
        println!("Net cash flow:    {}", report.net_cash_flow);
        println!("Marked PnL:       {}", report.marked_pnl);
    }
    Ok(())
}

pub fn reset_grid(settings: &Config, db: &Database, id_or_name: &str) -> GridResult<()> {
    let config = GridConfig::resolve(db, id_or_name)?;
    let name = config.name.clone();
    let mut engine = GridEngine::builder(config, Arc::new(db.clone()))
        .with_settings(settings.engine.clone())
        .build()?;
    let cancelled = engine.reset_grid()?;
    info!("🧹 Reset '{}': {} tracked orders cancelled", name, cancelled);
    Ok(())
}
