//! Crypto backtest - main entry point
//!
//! This binary provides two subcommands:
//! - backtest: Run a rule set against a candle CSV
//! - validate: Check a rule-set document without running it

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "crypto-backtest")]
#[command(about = "Deterministic backtests for long-only crypto strategies", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a backtest
    Backtest {
        /// Path to the backtest configuration file (JSON, rule set included)
        #[arg(short, long)]
        config: String,

        /// Path to the candle CSV (date,open,high,low,close,volume)
        #[arg(short, long)]
        data: String,

        /// Initial capital (overrides config file)
        #[arg(long)]
        capital: Option<f64>,

        /// Start date YYYY-MM-DD (overrides config file)
        #[arg(long)]
        start: Option<String>,

        /// End date YYYY-MM-DD (overrides config file)
        #[arg(long)]
        end: Option<String>,

        /// Write the trade log as CSV to this path
        #[arg(long)]
        export_trades: Option<String>,

        /// Write the full result as JSON to this path
        #[arg(long)]
        output: Option<String>,
    },

    /// Validate a rule-set document
    Validate {
        /// Path to a rule-set JSON file
        #[arg(short, long, conflicts_with = "share_code")]
        rules: Option<String>,

        /// A base64 share code instead of a file
        #[arg(long)]
        share_code: Option<String>,
    },
}

fn setup_logging(verbose: bool, command_name: &str) -> Result<()> {
    std::fs::create_dir_all("logs")?;

    let log_filename = format!("{}.log", command_name);
    let log_path = PathBuf::from("logs").join(&log_filename);

    let level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_ansi(true);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_appender)
        .with_target(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!("Logging initialized");
    info!("Log file: {}", log_path.display());

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let command_name = match &cli.command {
        Commands::Backtest { .. } => "backtest",
        Commands::Validate { .. } => "validate",
    };
    setup_logging(cli.verbose, command_name)?;

    match cli.command {
        Commands::Backtest {
            config,
            data,
            capital,
            start,
            end,
            export_trades,
            output,
        } => commands::backtest::run(config, data, capital, start, end, export_trades, output),

        Commands::Validate { rules, share_code } => commands::validate::run(rules, share_code),
    }
}
