//! CLI definition and dispatch.

use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use crate::adapters::csv_market_adapter::CsvMarketAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::{self, BacktestConfig, ExitReason};
use crate::domain::candle::Interval;
use crate::domain::error::DaytraderError;
use crate::engine::aggregator::CandleAggregator;
use crate::ports::config_port::ConfigPort;

/// Daily candles fed to the backtest scorer.
const DAILY_LOOKBACK: usize = 120;

#[derive(Parser, Debug)]
#[command(name = "daytrader", about = "Multi-factor intraday trading engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay stored candles through the scoring strategy
    Backtest {
        #[arg(long)]
        code: String,
        /// Directory holding flushed intraday candle files
        #[arg(long)]
        data_dir: PathBuf,
        /// Directory holding `<code>_daily.csv` files (defaults to data-dir)
        #[arg(long)]
        daily_dir: Option<PathBuf>,
        /// Trailing days of intraday candles to replay
        #[arg(long, default_value_t = 5)]
        days: usize,
        /// Last session date (defaults to today)
        #[arg(long)]
        as_of: Option<NaiveDate>,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print one day of stored candles
    Candles {
        #[arg(long)]
        code: String,
        #[arg(long)]
        data_dir: PathBuf,
        #[arg(long)]
        date: NaiveDate,
        /// Interval in minutes (15 or 60)
        #[arg(long, default_value_t = 15)]
        interval: u32,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Backtest {
            code,
            data_dir,
            daily_dir,
            days,
            as_of,
            config,
        } => run_backtest(&code, data_dir, daily_dir, days, as_of, config.as_deref()),
        Command::Candles {
            code,
            data_dir,
            date,
            interval,
        } => run_candles(&code, data_dir, date, interval),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(&e)
        }
    }
}

/// `[backtest]` section with per-key defaults.
fn backtest_config(cfg: &dyn ConfigPort) -> BacktestConfig {
    let defaults = BacktestConfig::default();
    BacktestConfig {
        take_profit_pct: cfg.get_double("backtest", "take_profit_pct", defaults.take_profit_pct),
        max_hold_bars: cfg.get_int("backtest", "max_hold_bars", defaults.max_hold_bars as i64)
            as usize,
        fallback_stop_pct: cfg.get_double(
            "backtest",
            "fallback_stop_pct",
            defaults.fallback_stop_pct,
        ),
    }
}

fn run_backtest(
    code: &str,
    data_dir: PathBuf,
    daily_dir: Option<PathBuf>,
    days: usize,
    as_of: Option<NaiveDate>,
    config: Option<&std::path::Path>,
) -> Result<(), DaytraderError> {
    let cfg = match config {
        Some(path) => {
            let adapter =
                FileConfigAdapter::from_file(path).map_err(|e| DaytraderError::ConfigParse {
                    file: path.display().to_string(),
                    reason: e.to_string(),
                })?;
            backtest_config(&adapter)
        }
        None => BacktestConfig::default(),
    };

    let as_of = as_of.unwrap_or_else(|| Local::now().date_naive());
    let aggregator = CandleAggregator::new(data_dir.clone());
    let intraday = aggregator.load_days(code, Interval::Min15, days, as_of)?;
    if intraday.is_empty() {
        return Err(DaytraderError::InsufficientData {
            code: code.to_string(),
            bars: 0,
            minimum: 1,
        });
    }

    let market = CsvMarketAdapter::new(daily_dir.unwrap_or(data_dir));
    let daily = market.read_daily(code, DAILY_LOOKBACK)?;

    let result = backtest::run(code, &intraday, &daily, &cfg);

    println!(
        "backtest {}: {} bars, {} trades",
        result.code, result.total_bars, result.total_trades
    );
    println!("  cumulative return : {:+.2}%", result.cum_return_pct);
    println!("  annualized        : {:+.2}%", result.annualized_pct);
    println!("  max drawdown      : {:.2}%", result.max_drawdown_pct);
    println!("  win rate          : {:.1}%", result.win_rate_pct);
    println!("  risk/reward       : {:.2}", result.risk_reward);
    for trade in &result.trades {
        let reason = match trade.exit_reason {
            ExitReason::Stop => "stop",
            ExitReason::TakeProfit => "tp",
            ExitReason::Timeout => "trail",
        };
        println!(
            "  {} {:.1} -> {} {:.1}  {:+.2}% ({})",
            trade.entry_time.format("%m-%d %H:%M"),
            trade.entry_price,
            trade.exit_time.format("%m-%d %H:%M"),
            trade.exit_price,
            trade.pnl_pct,
            reason,
        );
    }
    Ok(())
}

fn run_candles(
    code: &str,
    data_dir: PathBuf,
    date: NaiveDate,
    interval: u32,
) -> Result<(), DaytraderError> {
    let interval = Interval::from_minutes(interval).ok_or_else(|| DaytraderError::ConfigInvalid {
        section: "candles".to_string(),
        key: "interval".to_string(),
        reason: "supported intervals are 15 and 60 minutes".to_string(),
    })?;

    let aggregator = CandleAggregator::new(data_dir);
    let candles = aggregator.load(code, interval, date)?;
    if candles.is_empty() {
        println!("no candles for {} on {}", code, date);
        return Ok(());
    }
    println!("time,open,high,low,close,volume");
    for c in &candles {
        println!(
            "{},{},{},{},{},{}",
            c.ts.format("%H:%M"),
            c.open,
            c.high,
            c.low,
            c.close,
            c.volume
        );
    }
    Ok(())
}
