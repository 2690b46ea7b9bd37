//! The trading loop: a time-gated state machine that owns open positions,
//! rescans the watch list for buy candidates, monitors held positions for
//! stop/target exits, and force-liquidates everything at session close.

use chrono::{Datelike, Local, NaiveDateTime, NaiveTime};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinHandle;

use crate::domain::error::DaytraderError;
use crate::domain::position::Position;
use crate::domain::scorer::{Evaluation, Signal};
use crate::engine::aggregator::CandleAggregator;
use crate::engine::evaluator::Evaluator;
use crate::engine::journal::{JournalEntry, TradeJournal, TradeKind};
use crate::engine::tick_queue::TickQueue;
use crate::ports::broker_port::BrokerPort;
use crate::ports::config_port::ConfigPort;
use crate::ports::forecast_port::ForecastPort;

/// Concurrent instrument evaluations during a watch-list scan.
pub const SCAN_PERMITS: usize = 5;
/// Stricter cap when every evaluation also calls the forecaster.
pub const FORECAST_PERMITS: usize = 2;

const POLL_INTERVAL: Duration = Duration::from_secs(5);
const MONITOR_SPACING: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotState {
    Idle,
    Running,
    Stopped,
}

/// Best-effort, at-most-once observer events.
#[derive(Debug, Clone)]
pub enum BotEvent {
    Message(String),
    Trade(JournalEntry),
    Alert(String),
}

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub watch_list: Vec<String>,
    pub target_position_count: usize,
    pub buy_percent: f64,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub buy_score_threshold: f64,
    pub use_forecast: bool,
    pub scan_start: NaiveTime,
    pub forced_exit: NaiveTime,
    pub hard_exit: NaiveTime,
}

impl Default for BotConfig {
    fn default() -> Self {
        BotConfig {
            watch_list: Vec::new(),
            target_position_count: 3,
            buy_percent: 0.33,
            stop_loss_pct: 3.0,
            take_profit_pct: 5.0,
            buy_score_threshold: 55.0,
            use_forecast: false,
            scan_start: NaiveTime::from_hms_opt(9, 5, 0).unwrap_or_default(),
            forced_exit: NaiveTime::from_hms_opt(15, 15, 0).unwrap_or_default(),
            hard_exit: NaiveTime::from_hms_opt(15, 20, 0).unwrap_or_default(),
        }
    }
}

impl BotConfig {
    /// Read from an INI-style config; every key falls back to its default.
    pub fn from_config(cfg: &dyn ConfigPort) -> Self {
        let defaults = BotConfig::default();
        let time = |key: &str, default: NaiveTime| {
            cfg.get_string("session", key)
                .and_then(|s| NaiveTime::parse_from_str(s.trim(), "%H:%M").ok())
                .unwrap_or(default)
        };
        BotConfig {
            watch_list: cfg
                .get_string("trading", "watch_list")
                .map(|s| {
                    s.split(',')
                        .map(|c| c.trim().to_string())
                        .filter(|c| !c.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            target_position_count: cfg.get_int(
                "trading",
                "target_position_count",
                defaults.target_position_count as i64,
            ) as usize,
            buy_percent: cfg.get_double("trading", "buy_percent", defaults.buy_percent),
            stop_loss_pct: cfg.get_double("trading", "stop_loss_pct", defaults.stop_loss_pct),
            take_profit_pct: cfg.get_double("trading", "take_profit_pct", defaults.take_profit_pct),
            buy_score_threshold: cfg.get_double(
                "trading",
                "buy_score_threshold",
                defaults.buy_score_threshold,
            ),
            use_forecast: cfg.get_bool("trading", "use_forecast", defaults.use_forecast),
            scan_start: time("scan_start", defaults.scan_start),
            forced_exit: time("forced_exit", defaults.forced_exit),
            hard_exit: time("hard_exit", defaults.hard_exit),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BotStatus {
    pub state: BotState,
    pub held: Vec<String>,
    pub today_trades: Vec<JournalEntry>,
}

pub struct TradeBot {
    inner: Arc<BotInner>,
    task: Mutex<Option<JoinHandle<()>>>,
}

struct BotInner {
    config: BotConfig,
    broker: Arc<dyn BrokerPort>,
    forecaster: Option<Arc<dyn ForecastPort>>,
    evaluator: Arc<Evaluator>,
    aggregator: Arc<CandleAggregator>,
    queue: Arc<TickQueue>,
    journal: TradeJournal,
    positions: tokio::sync::Mutex<HashMap<String, Position>>,
    state: Mutex<BotState>,
    events: broadcast::Sender<BotEvent>,
}

impl TradeBot {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: BotConfig,
        broker: Arc<dyn BrokerPort>,
        forecaster: Option<Arc<dyn ForecastPort>>,
        evaluator: Arc<Evaluator>,
        aggregator: Arc<CandleAggregator>,
        queue: Arc<TickQueue>,
        journal_dir: PathBuf,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        TradeBot {
            inner: Arc::new(BotInner {
                config,
                broker,
                forecaster,
                evaluator,
                aggregator,
                queue,
                journal: TradeJournal::new(journal_dir),
                positions: tokio::sync::Mutex::new(HashMap::new()),
                state: Mutex::new(BotState::Idle),
                events,
            }),
            task: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BotEvent> {
        self.inner.events.subscribe()
    }

    pub fn state(&self) -> BotState {
        self.inner.state()
    }

    pub async fn status(&self) -> BotStatus {
        let mut held: Vec<String> = self.inner.positions.lock().await.keys().cloned().collect();
        held.sort();
        BotStatus {
            state: self.inner.state(),
            held,
            today_trades: self.inner.journal.load(Local::now().date_naive()),
        }
    }

    /// Capture current holdings, compute the per-position budget, start the
    /// tick consumer, and spawn the main loop.
    pub async fn start(&self) -> Result<(), DaytraderError> {
        {
            let mut state = lock(&self.inner.state);
            if *state == BotState::Running {
                return Ok(());
            }
            *state = BotState::Running;
        }

        let seeded = async {
            let holdings = self.inner.broker.holdings().await?;
            let cash = self.inner.broker.cash().await?;
            let mut positions = self.inner.positions.lock().await;
            positions.clear();
            for h in holdings {
                positions.insert(
                    h.code.clone(),
                    Position {
                        code: h.code,
                        name: h.name,
                        quantity: h.quantity,
                        avg_price: h.avg_price,
                        stop_price: None,
                    },
                );
            }
            Ok::<f64, DaytraderError>(cash * self.inner.config.buy_percent)
        }
        .await;

        let budget = match seeded {
            Ok(budget) => budget,
            Err(e) => {
                *lock(&self.inner.state) = BotState::Idle;
                return Err(e);
            }
        };

        self.inner.queue.start(self.inner.aggregator.clone());
        self.inner
            .msg(format!("auto trading started (budget {budget:.0} per position)"));

        let inner = self.inner.clone();
        let handle = tokio::spawn(async move { BotInner::run_loop(inner, budget).await });
        *lock(&self.task) = Some(handle);
        Ok(())
    }

    /// Cancel the loop, flush the aggregator, and stop the tick consumer.
    /// Open positions are left alone — only the scheduled forced-exit
    /// window liquidates.
    pub async fn stop(&self) -> Result<usize, DaytraderError> {
        *lock(&self.inner.state) = BotState::Stopped;
        let handle = lock(&self.task).take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }
        self.inner.queue.stop().await;
        let saved = self.inner.aggregator.flush(Local::now().date_naive()).await?;
        self.inner
            .msg(format!("auto trading stopped ({saved} candle series saved)"));
        Ok(saved)
    }
}

impl BotInner {
    fn state(&self) -> BotState {
        *lock(&self.state)
    }

    fn is_running(&self) -> bool {
        self.state() == BotState::Running
    }

    fn emit(&self, event: BotEvent) {
        let _ = self.events.send(event);
    }

    fn msg(&self, text: impl Into<String>) {
        let text = text.into();
        log::info!("{text}");
        let now = Local::now().format("%Y-%m-%d %H:%M:%S");
        self.emit(BotEvent::Message(format!("[{now}] {text}")));
    }

    fn record_trade(
        &self,
        code: &str,
        name: &str,
        kind: TradeKind,
        qty: i64,
        price: f64,
        success: bool,
        message: &str,
    ) -> Result<(), DaytraderError> {
        let now: NaiveDateTime = Local::now().naive_local();
        let entry = JournalEntry {
            time: now.format("%Y-%m-%d %H:%M:%S").to_string(),
            code: code.to_string(),
            name: name.to_string(),
            kind,
            qty,
            price,
            success,
            message: message.to_string(),
        };
        self.journal.append(now.date(), entry.clone())?;
        let action = match kind {
            TradeKind::Buy => "buy",
            TradeKind::Sell => "sell",
        };
        let outcome = if success { "filled" } else { "rejected" };
        self.msg(format!("[{action} {outcome}] {name_or_code} x{qty} @ {price:.0}",
            name_or_code = if name.is_empty() { code } else { name }));
        self.emit(BotEvent::Trade(entry));
        Ok(())
    }

    async fn run_loop(inner: Arc<BotInner>, budget: f64) {
        if let Err(e) = Self::run_session(&inner, budget).await {
            log::error!("trading loop halted: {e}");
            inner.emit(BotEvent::Alert(format!("trading loop halted: {e}")));
        }
        *lock(&inner.state) = BotState::Stopped;
    }

    async fn run_session(inner: &Arc<BotInner>, budget: f64) -> Result<(), DaytraderError> {
        let mut sold_out = false;
        let mut last_scan_minute: Option<(u32, u32)> = None;
        let mut last_refresh_minute: Option<(u32, u32)> = None;
        let mut last_monitor: Option<std::time::Instant> = None;

        loop {
            if !inner.is_running() {
                break;
            }
            let now = Local::now().naive_local();

            if now.weekday().number_from_monday() >= 6 {
                inner.msg("weekend: shutting down");
                break;
            }
            let time = now.time();
            if time > inner.config.hard_exit {
                inner.msg("session over: shutting down");
                break;
            }

            if time > inner.config.scan_start && time < inner.config.forced_exit {
                use chrono::Timelike;
                let minute_key = (time.hour(), time.minute());

                let monitor_due = last_monitor
                    .map(|at| at.elapsed() >= MONITOR_SPACING)
                    .unwrap_or(true);
                if monitor_due && !inner.positions.lock().await.is_empty() {
                    last_monitor = Some(std::time::Instant::now());
                    Self::monitor_positions(inner).await?;
                }

                if time.minute() % 5 == 0 && last_scan_minute != Some(minute_key) {
                    last_scan_minute = Some(minute_key);
                    Self::scan_watch_list(inner, budget).await?;
                }

                if time.minute() % 30 == 0 && last_refresh_minute != Some(minute_key) {
                    last_refresh_minute = Some(minute_key);
                    Self::refresh_holdings(inner).await;
                }
            }

            if time > inner.config.forced_exit && time < inner.config.hard_exit && !sold_out {
                sold_out = true;
                Self::liquidate_all(inner).await?;
            }

            tokio::time::sleep(POLL_INTERVAL).await;
        }
        Ok(())
    }

    /// Check every held position's stop/target and liquidate on trigger.
    async fn monitor_positions(inner: &Arc<BotInner>) -> Result<(), DaytraderError> {
        let snapshot: Vec<Position> = inner.positions.lock().await.values().cloned().collect();
        for pos in snapshot {
            let (tripped, pnl) = inner
                .evaluator
                .stop_check(&pos.code, pos.avg_price, pos.stop_price, inner.config.stop_loss_pct)
                .await;
            if tripped {
                let basis = match pos.stop_price {
                    Some(stop) => format!("structural {stop:.0}"),
                    None => format!("{}%", inner.config.stop_loss_pct),
                };
                inner.msg(format!(
                    "[stop] {} at {pnl:.2}% (basis: {basis})",
                    pos.code
                ));
                Self::sell_position(inner, &pos.code).await?;
            } else if pnl >= inner.config.take_profit_pct {
                inner.msg(format!(
                    "[take profit] {} at {pnl:+.2}% >= +{}%",
                    pos.code, inner.config.take_profit_pct
                ));
                Self::sell_position(inner, &pos.code).await?;
            }
        }
        Ok(())
    }

    async fn sell_position(inner: &Arc<BotInner>, code: &str) -> Result<(), DaytraderError> {
        let pos = { inner.positions.lock().await.get(code).cloned() };
        let Some(pos) = pos else {
            return Ok(());
        };
        match inner.broker.sell(code, pos.quantity).await {
            Ok(outcome) => {
                let price = inner.evaluator.quote(code).await.unwrap_or(pos.avg_price);
                inner.record_trade(
                    &pos.code,
                    &pos.name,
                    TradeKind::Sell,
                    pos.quantity,
                    price,
                    outcome.success,
                    &outcome.message,
                )?;
                if outcome.success {
                    inner.positions.lock().await.remove(code);
                }
            }
            Err(e) => log::error!("sell {code} failed: {e}"),
        }
        Ok(())
    }

    /// Evaluate unheld watch-list candidates under a concurrency cap and
    /// buy until the target position count is reached.
    async fn scan_watch_list(inner: &Arc<BotInner>, budget: f64) -> Result<(), DaytraderError> {
        let held: HashSet<String> = inner.positions.lock().await.keys().cloned().collect();
        if held.len() >= inner.config.target_position_count {
            return Ok(());
        }
        let candidates: Vec<String> = inner
            .config
            .watch_list
            .iter()
            .filter(|code| !held.contains(*code))
            .cloned()
            .collect();
        if candidates.is_empty() {
            return Ok(());
        }

        let permits = if inner.config.use_forecast {
            FORECAST_PERMITS
        } else {
            SCAN_PERMITS
        };
        let semaphore = Arc::new(Semaphore::new(permits));
        let mut tasks = Vec::new();
        for code in candidates {
            let inner = inner.clone();
            let semaphore = semaphore.clone();
            tasks.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                let forecast = match (&inner.forecaster, inner.config.use_forecast) {
                    (Some(forecaster), true) => forecaster.predict(&code).await.ok(),
                    _ => None,
                };
                let evaluation = inner.evaluator.evaluate(&code, forecast.as_ref(), false).await;
                Some((code, evaluation))
            }));
        }

        for task in tasks {
            let Ok(Some((code, evaluation))) = task.await else {
                continue;
            };
            if inner.positions.lock().await.len() >= inner.config.target_position_count {
                break;
            }
            Self::try_buy(inner, &code, &evaluation, budget).await?;
        }
        Ok(())
    }

    async fn try_buy(
        inner: &Arc<BotInner>,
        code: &str,
        evaluation: &Evaluation,
        budget: f64,
    ) -> Result<(), DaytraderError> {
        if evaluation.signal != Signal::Buy
            || evaluation.score < inner.config.buy_score_threshold
            || evaluation.price <= 0.0
        {
            return Ok(());
        }
        let qty = (budget / evaluation.price).floor() as i64;
        if qty <= 0 {
            return Ok(());
        }

        let active: Vec<String> = evaluation
            .factors
            .iter()
            .filter(|f| f.score != 0.0)
            .map(|f| format!("{}={:+.0}", f.name, f.score))
            .collect();
        inner.msg(format!(
            "[buy signal] {code} score {:+.0} ({})",
            evaluation.score,
            active.join(", ")
        ));
        if let Some(stop) = evaluation.stop_price {
            inner.msg(format!("  structural stop at {stop:.1}"));
        }

        match inner.broker.buy(code, qty).await {
            Ok(outcome) => {
                inner.record_trade(
                    code,
                    "",
                    TradeKind::Buy,
                    qty,
                    evaluation.price,
                    outcome.success,
                    &outcome.message,
                )?;
                if outcome.success {
                    inner.positions.lock().await.insert(
                        code.to_string(),
                        Position {
                            code: code.to_string(),
                            name: String::new(),
                            quantity: qty,
                            avg_price: evaluation.price,
                            stop_price: evaluation.stop_price,
                        },
                    );
                }
            }
            Err(e) => log::error!("buy {code} failed: {e}"),
        }
        Ok(())
    }

    /// Replace the position snapshot from the broker, carrying over known
    /// structural stops.
    async fn refresh_holdings(inner: &Arc<BotInner>) {
        match inner.broker.holdings().await {
            Ok(holdings) => {
                let mut positions = inner.positions.lock().await;
                let mut refreshed = HashMap::new();
                for h in holdings {
                    let stop_price = positions.get(&h.code).and_then(|p| p.stop_price);
                    refreshed.insert(
                        h.code.clone(),
                        Position {
                            code: h.code,
                            name: h.name,
                            quantity: h.quantity,
                            avg_price: h.avg_price,
                            stop_price,
                        },
                    );
                }
                *positions = refreshed;
            }
            Err(e) => log::warn!("holdings refresh failed: {e}"),
        }
    }

    /// Sell every open position at market, regardless of score or stops.
    async fn liquidate_all(inner: &Arc<BotInner>) -> Result<(), DaytraderError> {
        inner.msg("[session close] liquidating all positions");
        let holdings = match inner.broker.holdings().await {
            Ok(holdings) => holdings,
            Err(e) => {
                log::error!("forced exit could not fetch holdings: {e}");
                return Ok(());
            }
        };
        for h in holdings {
            match inner.broker.sell(&h.code, h.quantity).await {
                Ok(outcome) => inner.record_trade(
                    &h.code,
                    &h.name,
                    TradeKind::Sell,
                    h.quantity,
                    h.current_price,
                    outcome.success,
                    &outcome.message,
                )?,
                Err(e) => log::error!("forced exit sell {} failed: {e}", h.code),
            }
        }
        inner.positions.lock().await.clear();
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
