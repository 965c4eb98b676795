//! CLI definitions.

pub mod commands;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;

use retrace_config::{load_config, AppConfig};
use retrace_core::types::Timeframe;

#[derive(Parser)]
#[command(name = "retrace")]
#[command(author, version, about = "Retracement-entry strategy backtester and parameter sweeper")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: PathBuf,

    /// Log level (overrides the configuration file)
    #[arg(short, long)]
    pub log_level: Option<LogLevel>,

    /// Enable JSON log format
    #[arg(long)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a backtest over historical bars
    Backtest(BacktestArgs),
    /// Run the configured parameter grid and rank the results
    Sweep(SweepArgs),
    /// Replay historical bars through the paper exchange
    Paper(PaperArgs),
    /// List available strategy presets
    Strategies,
    /// Validate configuration
    ValidateConfig,
}

/// Where to read bars from.
#[derive(clap::Args)]
pub struct DataArgs {
    /// CSV file or directory of SYMBOL[_TF].csv files (defaults to data.dir)
    #[arg(long)]
    pub data: Option<PathBuf>,

    /// Symbols to load (comma-separated)
    #[arg(short = 'S', long, value_delimiter = ',')]
    pub symbols: Vec<String>,

    /// Timeframe (defaults to data.timeframe)
    #[arg(short, long)]
    pub timeframe: Option<Timeframe>,
}

/// Strategy selection shared by every run command.
#[derive(clap::Args)]
pub struct StrategyArgs {
    /// Detector preset replacing the configured detector
    #[arg(short, long)]
    pub preset: Option<String>,

    /// Initial equity (defaults to backtest.initial_equity)
    #[arg(long)]
    pub capital: Option<Decimal>,
}

#[derive(Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(clap::Args)]
pub struct BacktestArgs {
    #[command(flatten)]
    pub data: DataArgs,

    #[command(flatten)]
    pub strategy: StrategyArgs,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// Save the JSON report to file
    #[arg(long)]
    pub save: Option<PathBuf>,

    /// Write the trade log as CSV
    #[arg(long)]
    pub trades_csv: Option<PathBuf>,

    /// Write the equity curve as CSV
    #[arg(long)]
    pub equity_csv: Option<PathBuf>,
}

#[derive(clap::Args)]
pub struct SweepArgs {
    #[command(flatten)]
    pub data: DataArgs,

    #[command(flatten)]
    pub strategy: StrategyArgs,

    /// Number of ranked results to print
    #[arg(long, default_value = "10")]
    pub top: usize,

    /// Run grid points one at a time
    #[arg(long)]
    pub sequential: bool,

    /// Save all ranked results as JSON
    #[arg(long)]
    pub save: Option<PathBuf>,
}

#[derive(clap::Args)]
pub struct PaperArgs {
    #[command(flatten)]
    pub data: DataArgs,

    #[command(flatten)]
    pub strategy: StrategyArgs,
}

/// Load the configuration file, falling back to defaults when the default
/// path does not exist.
pub fn load_app_config(path: &Path) -> Result<(AppConfig, bool)> {
    if !path.exists() && path == Path::new("config/default.toml") {
        return Ok((AppConfig::default(), false));
    }
    let config = load_config(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    Ok((config, true))
}
