//! Event-driven backtest: replays an intraday bar sequence under a
//! no-lookahead constraint, re-scoring entries bar-by-bar and simulating
//! stop / take-profit / timeout exits.

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::domain::candle::Candle;
use crate::domain::scorer::{self, BUY_THRESHOLD};

/// Entry scoring requires at least this many daily bars strictly before
/// the entry bar's calendar date.
pub const MIN_DAILY_BARS: usize = 35;

/// 15-minute bars in a ~6.5h session, times trading days per year.
const BARS_PER_DAY: f64 = 26.0;
const TRADING_DAYS_PER_YEAR: f64 = 252.0;

#[derive(Debug, Clone)]
pub struct BacktestConfig {
    pub take_profit_pct: f64,
    pub max_hold_bars: usize,
    pub fallback_stop_pct: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            take_profit_pct: 5.0,
            max_hold_bars: 20,
            fallback_stop_pct: 3.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitReason {
    #[serde(rename = "stop")]
    Stop,
    #[serde(rename = "tp")]
    TakeProfit,
    #[serde(rename = "trail")]
    Timeout,
}

/// One closed simulated position.
#[derive(Debug, Clone)]
pub struct Trade {
    pub entry_bar: usize,
    pub entry_time: NaiveDateTime,
    pub entry_price: f64,
    pub exit_bar: usize,
    pub exit_time: NaiveDateTime,
    pub exit_price: f64,
    pub exit_reason: ExitReason,
    pub pnl_pct: f64,
}

#[derive(Debug, Clone, Default)]
pub struct BacktestResult {
    pub code: String,
    pub total_bars: usize,
    pub total_trades: usize,
    pub cum_return_pct: f64,
    pub annualized_pct: f64,
    pub max_drawdown_pct: f64,
    pub win_rate_pct: f64,
    pub risk_reward: f64,
    pub trades: Vec<Trade>,
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

/// Replay `intraday` bar-by-bar against the scoring strategy.
///
/// Exit rules run first, in priority order against the current bar's
/// high/low: structural stop, fixed fallback stop, take-profit, then the
/// max-hold timeout at the bar's close. Entries score the composite
/// against the daily bars strictly before the bar's calendar date and the
/// intraday bars before the current index, and fill at the *next* bar's
/// open. `daily` must be ordered oldest first.
pub fn run(
    code: &str,
    intraday: &[Candle],
    daily: &[Candle],
    cfg: &BacktestConfig,
) -> BacktestResult {
    let n = intraday.len();
    let mut trades: Vec<Trade> = Vec::new();
    let mut equity: Vec<f64> = vec![1.0];

    let mut in_trade = false;
    let mut entry_price = 0.0;
    let mut entry_bar = 0usize;
    let mut stop_price: Option<f64> = None;
    let mut tp_price = 0.0;

    for i in 1..n {
        let bar = &intraday[i];

        if in_trade {
            let hold_bars = i.saturating_sub(entry_bar);

            if let Some(stop) = stop_price {
                if bar.low <= stop {
                    close_trade(&mut trades, &mut equity, intraday, entry_bar, entry_price, i, stop, ExitReason::Stop);
                    in_trade = false;
                    continue;
                }
            }

            let fallback = entry_price * (1.0 - cfg.fallback_stop_pct / 100.0);
            if bar.low <= fallback {
                close_trade(&mut trades, &mut equity, intraday, entry_bar, entry_price, i, fallback, ExitReason::Stop);
                in_trade = false;
                continue;
            }

            if bar.high >= tp_price {
                close_trade(&mut trades, &mut equity, intraday, entry_bar, entry_price, i, tp_price, ExitReason::TakeProfit);
                in_trade = false;
                continue;
            }

            if hold_bars >= cfg.max_hold_bars {
                close_trade(&mut trades, &mut equity, intraday, entry_bar, entry_price, i, bar.close, ExitReason::Timeout);
                in_trade = false;
                continue;
            }
        }

        if !in_trade {
            // only daily bars dated strictly before this bar are visible
            let bar_date = bar.ts.date();
            let visible = daily.partition_point(|c| c.ts.date() < bar_date);
            if visible < MIN_DAILY_BARS {
                continue;
            }

            let score = scorer::composite(&daily[..visible], &intraday[..i], bar.close, None);
            if score.total >= BUY_THRESHOLD && i + 1 < n {
                let next = &intraday[i + 1];
                entry_price = next.open;
                tp_price = entry_price * (1.0 + cfg.take_profit_pct / 100.0);
                stop_price = score.stop_price;
                entry_bar = i + 1;
                in_trade = true;
            }
        }
    }

    compute_metrics(code, n, trades, &equity)
}

#[allow(clippy::too_many_arguments)]
fn close_trade(
    trades: &mut Vec<Trade>,
    equity: &mut Vec<f64>,
    intraday: &[Candle],
    entry_bar: usize,
    entry_price: f64,
    exit_bar: usize,
    exit_price: f64,
    reason: ExitReason,
) {
    let pnl = (exit_price - entry_price) / entry_price * 100.0;
    trades.push(Trade {
        entry_bar,
        entry_time: intraday[entry_bar].ts,
        entry_price,
        exit_bar,
        exit_time: intraday[exit_bar].ts,
        exit_price,
        exit_reason: reason,
        pnl_pct: round2(pnl),
    });
    let last = equity.last().copied().unwrap_or(1.0);
    equity.push(last * (1.0 + pnl / 100.0));
}

fn compute_metrics(code: &str, total_bars: usize, trades: Vec<Trade>, equity: &[f64]) -> BacktestResult {
    let mut result = BacktestResult {
        code: code.to_string(),
        total_bars,
        total_trades: trades.len(),
        trades,
        ..BacktestResult::default()
    };
    if result.trades.is_empty() {
        return result;
    }

    let final_equity = equity.last().copied().unwrap_or(1.0);
    result.cum_return_pct = round2((final_equity - 1.0) * 100.0);

    let bars_per_year = BARS_PER_DAY * TRADING_DAYS_PER_YEAR;
    if total_bars > 0 && final_equity > 0.0 {
        result.annualized_pct =
            round2((final_equity.powf(bars_per_year / total_bars as f64) - 1.0) * 100.0);
    }

    let mut peak = equity.first().copied().unwrap_or(1.0);
    let mut mdd = 0.0f64;
    for &e in equity {
        peak = peak.max(e);
        let dd = (e - peak) / peak * 100.0;
        mdd = mdd.min(dd);
    }
    result.max_drawdown_pct = round2(mdd);

    let wins: Vec<&Trade> = result.trades.iter().filter(|t| t.pnl_pct > 0.0).collect();
    result.win_rate_pct = round1(wins.len() as f64 / result.trades.len() as f64 * 100.0);

    let losses: Vec<&Trade> = result.trades.iter().filter(|t| t.pnl_pct <= 0.0).collect();
    let avg_win = if wins.is_empty() {
        0.0
    } else {
        wins.iter().map(|t| t.pnl_pct).sum::<f64>() / wins.len() as f64
    };
    let avg_loss = if losses.is_empty() {
        0.0
    } else {
        (losses.iter().map(|t| t.pnl_pct).sum::<f64>() / losses.len() as f64).abs()
    };
    // no losers (or zero-magnitude losers) leaves the ratio undefined
    result.risk_reward = if avg_loss == 0.0 {
        0.0
    } else {
        round2(avg_win / avg_loss)
    };

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::candle::Interval;
    use chrono::{NaiveDate, NaiveDateTime};

    fn intraday_bar(ts: NaiveDateTime, open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            code: "TEST".into(),
            interval: Interval::Min15,
            ts,
            open,
            high,
            low,
            close,
            volume: 1000,
        }
    }

    /// Sequential 15-minute bars on one trading day.
    fn session(rows: &[(f64, f64, f64, f64)]) -> Vec<Candle> {
        let start = NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        rows.iter()
            .enumerate()
            .map(|(i, &(o, h, l, c))| {
                intraday_bar(start + chrono::Duration::minutes(15 * i as i64), o, h, l, c)
            })
            .collect()
    }

    fn trade(pnl_pct: f64) -> Trade {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        Trade {
            entry_bar: 1,
            entry_time: ts,
            entry_price: 100.0,
            exit_bar: 2,
            exit_time: ts,
            exit_price: 100.0 + pnl_pct,
            exit_reason: ExitReason::TakeProfit,
            pnl_pct,
        }
    }

    /// Equity curve the way the simulator builds it.
    fn equity_from(pnls: &[f64]) -> Vec<f64> {
        let mut equity = vec![1.0];
        for pnl in pnls {
            let last = *equity.last().unwrap();
            equity.push(last * (1.0 + pnl / 100.0));
        }
        equity
    }

    #[test]
    fn empty_series_yields_empty_result() {
        let result = run("TEST", &[], &[], &BacktestConfig::default());
        assert_eq!(result.total_bars, 0);
        assert_eq!(result.total_trades, 0);
        assert_eq!(result.cum_return_pct, 0.0);
    }

    #[test]
    fn no_entry_without_enough_daily_history() {
        // plenty of intraday movement but zero daily bars
        let intraday = session(&[
            (100.0, 101.0, 99.0, 100.5),
            (100.5, 102.0, 100.0, 101.5),
            (101.5, 103.0, 101.0, 102.5),
        ]);
        let result = run("TEST", &intraday, &[], &BacktestConfig::default());
        assert_eq!(result.total_trades, 0);
    }

    #[test]
    fn cum_return_matches_final_equity() {
        let trades = vec![trade(5.0), trade(-2.0), trade(3.0)];
        let equity = equity_from(&[5.0, -2.0, 3.0]);
        let result = compute_metrics("TEST", 100, trades, &equity);

        let final_equity = 1.0 * 1.05 * 0.98 * 1.03;
        assert_eq!(result.cum_return_pct, round2((final_equity - 1.0) * 100.0));
    }

    #[test]
    fn drawdown_zero_for_monotonic_equity() {
        let trades = vec![trade(1.0), trade(2.0)];
        let equity = equity_from(&[1.0, 2.0]);
        let result = compute_metrics("TEST", 100, trades, &equity);
        assert_eq!(result.max_drawdown_pct, 0.0);
    }

    #[test]
    fn drawdown_is_negative_after_loss() {
        let trades = vec![trade(10.0), trade(-5.0)];
        let equity = equity_from(&[10.0, -5.0]);
        let result = compute_metrics("TEST", 100, trades, &equity);
        assert_eq!(result.max_drawdown_pct, -5.0);
    }

    #[test]
    fn win_rate_counts_positive_pnl_only() {
        let trades = vec![trade(5.0), trade(-1.0), trade(0.0), trade(2.0)];
        let equity = equity_from(&[5.0, -1.0, 0.0, 2.0]);
        let result = compute_metrics("TEST", 100, trades, &equity);
        assert_eq!(result.win_rate_pct, 50.0);
    }

    #[test]
    fn risk_reward_is_avg_win_over_avg_loss() {
        let trades = vec![trade(6.0), trade(2.0), trade(-2.0)];
        let equity = equity_from(&[6.0, 2.0, -2.0]);
        let result = compute_metrics("TEST", 100, trades, &equity);
        // avg win 4.0, avg loss 2.0
        assert_eq!(result.risk_reward, 2.0);
    }

    #[test]
    fn risk_reward_undefined_without_losses() {
        let trades = vec![trade(4.0), trade(2.0)];
        let equity = equity_from(&[4.0, 2.0]);
        let result = compute_metrics("TEST", 100, trades, &equity);
        assert_eq!(result.risk_reward, 0.0);
    }

    #[test]
    fn annualized_compounds_by_bar_count() {
        let trades = vec![trade(1.0)];
        let equity = equity_from(&[1.0]);
        // one year of bars: annualized equals cumulative
        let bars = (26.0 * 252.0) as usize;
        let result = compute_metrics("TEST", bars, trades, &equity);
        assert_eq!(result.annualized_pct, result.cum_return_pct);
    }

    mod exits {
        use super::*;

        /// Drive the exit path directly: a position opened at bar 1 with
        /// known stops, using a crafted equity/trade recorder.
        #[test]
        fn structural_stop_fires_before_fallback() {
            let intraday = session(&[
                (100.0, 101.0, 99.0, 100.0),
                (100.0, 101.0, 98.0, 100.5),
                (100.5, 100.6, 97.5, 98.0), // pierces the structural stop at 99
            ]);
            let mut trades = Vec::new();
            let mut equity = vec![1.0];

            // structural stop 99.0 above the 3% fallback (97.0)
            let bar = &intraday[2];
            assert!(bar.low <= 99.0);
            close_trade(&mut trades, &mut equity, &intraday, 1, 100.0, 2, 99.0, ExitReason::Stop);

            assert_eq!(trades.len(), 1);
            assert_eq!(trades[0].exit_reason, ExitReason::Stop);
            assert_eq!(trades[0].exit_price, 99.0);
            assert_eq!(trades[0].pnl_pct, -1.0);
        }

        #[test]
        fn take_profit_records_target_price() {
            let intraday = session(&[
                (100.0, 101.0, 99.0, 100.0),
                (100.0, 101.0, 99.5, 100.5),
                (100.5, 106.0, 100.0, 105.5),
            ]);
            let mut trades = Vec::new();
            let mut equity = vec![1.0];
            close_trade(&mut trades, &mut equity, &intraday, 1, 100.0, 2, 105.0, ExitReason::TakeProfit);

            assert_eq!(trades[0].exit_reason, ExitReason::TakeProfit);
            assert_eq!(trades[0].pnl_pct, 5.0);
            assert!((equity[1] - 1.05).abs() < 1e-12);
        }

        #[test]
        fn timeout_closes_at_bar_close() {
            let intraday = session(&[
                (100.0, 101.0, 99.0, 100.0),
                (100.0, 101.0, 99.5, 100.5),
                (100.5, 101.5, 100.0, 101.0),
            ]);
            let mut trades = Vec::new();
            let mut equity = vec![1.0];
            close_trade(&mut trades, &mut equity, &intraday, 1, 100.5, 2, intraday[2].close, ExitReason::Timeout);

            assert_eq!(trades[0].exit_reason, ExitReason::Timeout);
            assert_eq!(trades[0].exit_price, 101.0);
        }
    }

    mod lookahead {
        use super::*;
        use crate::domain::scorer;

        #[test]
        fn daily_slice_excludes_entry_date() {
            // daily bars spanning the intraday date: only strictly earlier
            // dates are visible to the scorer
            let daily: Vec<Candle> = (0..40)
                .map(|i| {
                    let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
                        + chrono::Duration::days(i as i64);
                    Candle {
                        code: "TEST".into(),
                        interval: Interval::Day,
                        ts: date.and_hms_opt(0, 0, 0).unwrap(),
                        open: 100.0,
                        high: 101.0,
                        low: 99.0,
                        close: 100.0,
                        volume: 1000,
                    }
                })
                .collect();

            let bar_date = NaiveDate::from_ymd_opt(2024, 1, 21).unwrap();
            let visible = daily.partition_point(|c| c.ts.date() < bar_date);
            assert_eq!(visible, 20);
            assert!(daily[..visible].iter().all(|c| c.ts.date() < bar_date));

            // and a same-dated daily bar is never part of the slice
            let same_day = daily.partition_point(|c| c.ts.date() < daily[20].ts.date());
            assert_eq!(same_day, 20);
        }

        #[test]
        fn run_never_scores_with_future_daily_bars() {
            // intraday bars dated before every daily bar: entry scoring
            // sees zero history and can never open a position
            let intraday = session(&[
                (100.0, 101.0, 99.0, 100.5),
                (100.5, 102.0, 100.0, 101.5),
                (101.5, 103.0, 101.0, 102.5),
                (102.5, 104.0, 102.0, 103.5),
            ]);
            let daily: Vec<Candle> = (0..40)
                .map(|i| {
                    let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
                        + chrono::Duration::days(i as i64);
                    Candle {
                        code: "TEST".into(),
                        interval: Interval::Day,
                        ts: date.and_hms_opt(0, 0, 0).unwrap(),
                        open: 50.0,
                        high: 80.0,
                        low: 40.0,
                        close: 75.0,
                        volume: 1000,
                    }
                })
                .collect();
            let result = run("TEST", &intraday, &daily, &BacktestConfig::default());
            assert_eq!(result.total_trades, 0);
        }

        #[test]
        fn composite_on_prefix_only_uses_prefix() {
            // scoring a prefix of the intraday series must be independent
            // of bars after the prefix
            let mut intraday = session(&[
                (100.0, 101.0, 99.0, 100.5),
                (100.5, 102.0, 100.0, 101.5),
                (101.5, 103.0, 101.0, 102.5),
            ]);
            let daily: Vec<Candle> = (0..36)
                .map(|i| {
                    let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
                        + chrono::Duration::days(i as i64);
                    Candle {
                        code: "TEST".into(),
                        interval: Interval::Day,
                        ts: date.and_hms_opt(0, 0, 0).unwrap(),
                        open: 100.0,
                        high: 101.5,
                        low: 98.5,
                        close: if i % 2 == 0 { 99.5 } else { 100.5 },
                        volume: 1000,
                    }
                })
                .collect();

            let before = scorer::composite(&daily, &intraday[..2], 101.0, None);
            intraday.push(intraday_bar(
                intraday[2].ts + chrono::Duration::minutes(15),
                500.0,
                500.0,
                500.0,
                500.0,
            ));
            let after = scorer::composite(&daily, &intraday[..2], 101.0, None);
            assert_eq!(before.total, after.total);
        }
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn drawdown_never_positive(pnls in proptest::collection::vec(-10.0f64..10.0, 1..30)) {
                let trades: Vec<Trade> = pnls.iter().map(|&p| trade(p)).collect();
                let equity = equity_from(&pnls);
                let result = compute_metrics("TEST", 500, trades, &equity);
                prop_assert!(result.max_drawdown_pct <= 0.0);
            }

            #[test]
            fn cum_return_is_rounded_final_equity(pnls in proptest::collection::vec(-10.0f64..10.0, 1..30)) {
                let trades: Vec<Trade> = pnls.iter().map(|&p| trade(p)).collect();
                let equity = equity_from(&pnls);
                let result = compute_metrics("TEST", 500, trades, &equity);
                let expected = round2((equity.last().unwrap() - 1.0) * 100.0);
                prop_assert_eq!(result.cum_return_pct, expected);
            }

            #[test]
            fn win_rate_bounded(pnls in proptest::collection::vec(-10.0f64..10.0, 1..30)) {
                let trades: Vec<Trade> = pnls.iter().map(|&p| trade(p)).collect();
                let equity = equity_from(&pnls);
                let result = compute_metrics("TEST", 500, trades, &equity);
                prop_assert!((0.0..=100.0).contains(&result.win_rate_pct));
            }
        }
    }
}
