// Grid config administration and read-only views
use rust_decimal::Decimal;
use tracing::{info, warn};

use grid_engine::{Database, GridConfig, GridMode, GridResult, TradeLog};

/// Arguments for `grid-bot config add`
pub struct NewGridConfig {
    pub name: String,
    pub exchange: String,
    pub symbol: String,
    pub mode: GridMode,
    pub lower: Decimal,
    pub upper: Decimal,
    pub levels: u32,
    pub trade_amount: Decimal,
    pub max_position: Decimal,
    pub stop_loss_buffer: Option<Decimal>,
    pub price_tick: Option<Decimal>,
    pub qty_step: Option<Decimal>,
    pub refresh_secs: Option<u64>,
}

pub fn add_config(db: &Database, args: NewGridConfig) -> GridResult<i64> {
    let mut config = GridConfig::new(
        args.name,
        args.exchange,
        args.symbol,
        args.mode,
        args.lower,
        args.upper,
        args.levels,
        args.trade_amount,
        args.max_position,
    );
    if let Some(buffer) = args.stop_loss_buffer {
        config.stop_loss_buffer_pct = buffer;
    }
    if let Some(tick) = args.price_tick {
        config.price_tick = tick;
    }
    if let Some(step) = args.qty_step {
        config.qty_step = step;
    }
    if let Some(secs) = args.refresh_secs {
        config.refresh_interval_secs = secs;
    }

    let id = config.insert(db)?;
    info!("✅ Created grid config '{}' (id {})", config.name, id);
    info!(
        "   {} {} {}..{} x{} levels, spacing {}",
        config.symbol,
        config.grid_mode,
        config.lower_price,
        config.upper_price,
        config.grid_levels,
        config.quantize_price(config.grid_spacing())
    );
    Ok(id)
}

pub fn list_configs(db: &Database) -> GridResult<()> {
    let configs = GridConfig::list_all(db)?;
    if configs.is_empty() {
        warn!("No grid configs yet. Create one with: grid-bot config add --help");
        return Ok(());
    }

    println!(
        "{:<4} {:<20} {:<10} {:<8} {:>12} {:>12} {:>6} {:>10} {:>10}  {}",
        "ID", "NAME", "SYMBOL", "MODE", "LOWER", "UPPER", "LEVELS", "AMOUNT", "MAX POS", "ACTIVE"
    );
    for config in configs {
        println!(
            "{:<4} {:<20} {:<10} {:<8} {:>12} {:>12} {:>6} {:>10} {:>10}  {}",
            config.id.unwrap_or_default(),
            config.name,
            config.symbol,
            config.grid_mode.as_str(),
            config.lower_price.to_string(),
            config.upper_price.to_string(),
            config.grid_levels,
            config.trade_amount.to_string(),
            config.max_position_size.to_string(),
            if config.is_active { "yes" } else { "no" }
        );
    }
    Ok(())
}

pub fn set_config_active(db: &Database, id_or_name: &str, active: bool) -> GridResult<()> {
    let config = GridConfig::resolve(db, id_or_name)?;
    GridConfig::set_active(db, config.require_id()?, active)?;
    info!(
        "{} grid config '{}'",
        if active { "✅ Activated" } else { "⏸️  Deactivated" },
        config.name
    );
    Ok(())
}

pub fn show_levels(db: &Database, id_or_name: &str) -> GridResult<()> {
    let config = GridConfig::resolve(db, id_or_name)?;
    let levels = grid_engine::GridLevel::list_by_config(db, config.require_id()?)?;
    if levels.is_empty() {
        warn!("Grid '{}' has no levels yet; they are created on the first run", config.name);
        return Ok(());
    }

    println!(
        "{:>6} {:>14} {:<5} {:<14} {:<24} {:<24}",
        "INDEX", "PRICE", "SIDE", "STATUS", "ENTRY ORDER", "EXIT ORDER"
    );
    for level in levels.iter().rev() {
        println!(
            "{:>6} {:>14} {:<5} {:<14} {:<24} {:<24}",
            level.level_index,
            level.price.to_string(),
            level.side.as_str(),
            level.status().as_str(),
            level.entry_order().map(|o| o.order_id.as_str()).unwrap_or("-"),
            level.exit_order().map(|o| o.order_id.as_str()).unwrap_or("-"),
        );
    }

    let position = grid_engine::core::strategy::get_current_position(&config, &levels);
    println!();
    println!("Position: {} (limit {})", position, config.max_position_size);
    Ok(())
}

pub fn show_logs(db: &Database, id_or_name: &str, limit: usize) -> GridResult<()> {
    let config = GridConfig::resolve(db, id_or_name)?;
    let logs = TradeLog::list_recent(db, config.require_id()?, limit)?;
    if logs.is_empty() {
        warn!("No trade log entries for '{}'", config.name);
        return Ok(());
    }

    for log in logs.iter().rev() {
        let level = log
            .level_index
            .map(|idx| format!("L{}", idx))
            .unwrap_or_default();
        println!(
            "{} {:<12} {:<5} {:<24} {}",
            log.created_at.format("%Y-%m-%d %H:%M:%S%.3f"),
            log.event.as_str(),
            level,
            log.order_id.as_deref().unwrap_or(""),
            log.message
        );
    }
    Ok(())
}
