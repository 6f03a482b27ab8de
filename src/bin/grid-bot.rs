// Grid engine CLI
// Single entry point for config administration, paper trading and replay

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn, Level};

use grid_engine::{Config, Database, GridError, GridMode, GridResult};

// Load command modules from cli directory
#[path = "../cli/config_commands.rs"]
mod config_commands;
#[path = "../cli/engine_commands.rs"]
mod engine_commands;

use config_commands::NewGridConfig;

#[derive(Parser)]
#[command(name = "grid-bot")]
#[command(version)]
#[command(about = "Per-level grid trading engine", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create config.toml and the database schema
    Init,

    /// Grid config management
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Paper trade a grid over a price feed
    Run {
        /// Grid config id or name
        grid: String,

        /// File with one price per line (or CSV whose last column is the price)
        #[arg(short, long)]
        prices: PathBuf,

        /// Skip the exchange entirely and record synthetic order ids
        #[arg(short, long)]
        dry_run: bool,

        /// Stop after this many ticks
        #[arg(long)]
        max_ticks: Option<usize>,
    },

    /// Replay OHLC candles through the engine in an isolated database
    Backtest {
        /// Grid config id or name
        grid: String,

        /// CSV: timestamp,open,high,low,close
        #[arg(long)]
        candles: PathBuf,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the ladder and its current position
    Levels {
        /// Grid config id or name
        grid: String,
    },

    /// Show recent trade log entries
    Logs {
        /// Grid config id or name
        grid: String,

        #[arg(short, long, default_value = "50")]
        limit: usize,
    },

    /// Cancel tracked orders and discard all levels of a grid
    Reset {
        /// Grid config id or name
        grid: String,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Create a grid config
    Add {
        #[arg(long)]
        name: String,

        #[arg(long, default_value = "paper")]
        exchange: String,

        #[arg(long)]
        symbol: String,

        /// SHORT, LONG or NEUTRAL
        #[arg(long, default_value = "NEUTRAL")]
        mode: GridMode,

        #[arg(long)]
        lower: Decimal,

        #[arg(long)]
        upper: Decimal,

        #[arg(long)]
        levels: u32,

        /// Base-asset amount per level
        #[arg(long)]
        amount: Decimal,

        /// Maximum absolute net position
        #[arg(long)]
        max_position: Decimal,

        /// Stop-loss buffer beyond the range edge (0.02 = 2%)
        #[arg(long)]
        stop_loss_buffer: Option<Decimal>,

        #[arg(long)]
        price_tick: Option<Decimal>,

        #[arg(long)]
        qty_step: Option<Decimal>,

        #[arg(long)]
        refresh_secs: Option<u64>,
    },

    /// List grid configs
    List,

    /// Mark a grid config active
    Activate { grid: String },

    /// Mark a grid config inactive; the engine refuses to start it
    Deactivate { grid: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Init writes the config file, so it runs before the config is loaded
    if matches!(cli.command, Commands::Init) {
        init_logging(cli.verbose, "info");
        if let Err(e) = init_workspace(&cli.config) {
            error!("❌ {}", e.user_message());
            std::process::exit(1);
        }
        return Ok(());
    }

    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            init_logging(cli.verbose, "info");
            error!("❌ Configuration Error");
            error!("{}", e.user_message());
            std::process::exit(1);
        }
    };
    init_logging(cli.verbose, &config.logging.level);

    if let Err(e) = dispatch(cli.command, &config).await {
        error!("❌ {} error", e.category());
        error!("{}", e.user_message());
        std::process::exit(1);
    }

    Ok(())
}

fn init_logging(verbose: bool, level: &str) {
    let level = if verbose {
        Level::DEBUG
    } else {
        match level.to_ascii_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    };
    tracing_subscriber::fmt().with_max_level(level).init();
}

fn load_config(path: &str) -> GridResult<Config> {
    if Path::new(path).exists() {
        Ok(Config::from_file(path)?)
    } else {
        let config = Config::default();
        config.validate()?;
        Ok(config)
    }
}

fn open_database(config: &Config) -> GridResult<Database> {
    if let Some(parent) = Path::new(&config.database.path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Database::open_and_migrate(&config.database.path)
}

async fn dispatch(command: Commands, config: &Config) -> GridResult<()> {
    let db = open_database(config)?;

    match command {
        Commands::Init => Ok(()),
        Commands::Config(cmd) => handle_config_command(cmd, &db),
        Commands::Run {
            grid,
            prices,
            dry_run,
            max_ticks,
        } => {
            engine_commands::run_paper_trading(config, db, &grid, &prices, dry_run, max_ticks)
                .await
        }
        Commands::Backtest {
            grid,
            candles,
            json,
        } => engine_commands::run_backtest(config, &db, &grid, &candles, json),
        Commands::Levels { grid } => config_commands::show_levels(&db, &grid),
        Commands::Logs { grid, limit } => config_commands::show_logs(&db, &grid, limit),
        Commands::Reset { grid } => engine_commands::reset_grid(config, &db, &grid),
    }
}

fn handle_config_command(cmd: ConfigCommands, db: &Database) -> GridResult<()> {
    match cmd {
        ConfigCommands::Add {
            name,
            exchange,
            symbol,
            mode,
            lower,
            upper,
            levels,
            amount,
            max_position,
            stop_loss_buffer,
            price_tick,
            qty_step,
            refresh_secs,
        } => {
            config_commands::add_config(
                db,
                NewGridConfig {
                    name,
                    exchange,
                    symbol,
                    mode,
                    lower,
                    upper,
                    levels,
                    trade_amount: amount,
                    max_position,
                    stop_loss_buffer,
                    price_tick,
                    qty_step,
                    refresh_secs,
                },
            )?;
            Ok(())
        }
        ConfigCommands::List => config_commands::list_configs(db),
        ConfigCommands::Activate { grid } => config_commands::set_config_active(db, &grid, true),
        ConfigCommands::Deactivate { grid } => {
            config_commands::set_config_active(db, &grid, false)
        }
    }
}

fn init_workspace(config_path: &str) -> GridResult<()> {
    info!("🔧 Initializing workspace...");

    if Path::new(config_path).exists() {
        warn!("⚠️  {} already exists, skipping", config_path);
    } else {
        let default_config = include_str!("../../config.toml.example");
        fs::write(config_path, default_config)?;
        info!("📝 Created {}", config_path);
    }

    let config = Config::from_file(config_path).map_err(GridError::from)?;
    let db = open_database(&config)?;
    if !db.health_check()? {
        return Err(GridError::Database("health check failed".to_string()));
    }
    info!("💾 Database ready at {}", config.database.path);

    info!("✅ Workspace initialized successfully!");
    info!("💡 Next steps:");
    info!("   1. grid-bot config add --name btc --symbol BTCUSDT --lower 60000 --upper 65000 --levels 20 --amount 0.01 --max-position 0.1");
    info!("   2. grid-bot run btc --prices prices.txt --dry-run");
    Ok(())
}
