//! Multi-factor scoring: nine weighted factors combining technical
//! indicators, market structure, and an optional external forecast into a
//! composite score, a buy/hold/sell signal, and a dynamic stop price.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::candle::Candle;
use crate::domain::indicator::{self, Bollinger, Macd};
use crate::domain::structure;

/// Per-factor weights. Positive and negative magnitudes each sum to 100.
pub const W_RSI: f64 = 15.0;
pub const W_MACD: f64 = 15.0;
pub const W_BOLLINGER: f64 = 10.0;
pub const W_VOLATILITY: f64 = 12.0;
pub const W_FORECAST: f64 = 10.0;
pub const W_DAILY_GAP: f64 = 8.0;
pub const W_DAILY_OB: f64 = 7.0;
pub const W_INTRADAY_GAP: f64 = 15.0;
pub const W_STRUCTURE: f64 = 8.0;

/// Buying needs less conviction than calling a reversal.
pub const BUY_THRESHOLD: f64 = 55.0;
pub const SELL_THRESHOLD: f64 = -40.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Buy,
    Hold,
    Sell,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Buy => "buy",
            Signal::Hold => "hold",
            Signal::Sell => "sell",
        }
    }
}

/// One factor's contribution. Always produced, even on insufficient data
/// (score 0 with the reason explaining why).
#[derive(Debug, Clone, PartialEq)]
pub struct FactorResult {
    pub name: &'static str,
    pub score: f64,
    pub max_score: f64,
    pub reason: String,
}

/// Full scoring outcome for one instrument.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub signal: Signal,
    pub score: f64,
    pub factors: Vec<FactorResult>,
    pub summary: String,
    pub price: f64,
    pub stop_price: Option<f64>,
}

impl Evaluation {
    /// Degraded result for a failed evaluation: always `hold`, score 0,
    /// failure reason in the summary.
    pub fn failed(reason: impl std::fmt::Display) -> Self {
        Evaluation {
            signal: Signal::Hold,
            score: 0.0,
            factors: Vec::new(),
            summary: format!("evaluation failed: {reason}"),
            price: 0.0,
            stop_price: None,
        }
    }
}

/// One bar of an external multi-day price forecast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// Opaque forecaster output: a short forecast plus an accuracy metric.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forecast {
    pub predictions: Vec<ForecastBar>,
    pub accuracy_pct: f64,
}

/// Banded RSI thresholds, monotonic around the neutral 40–60 band.
pub fn rsi_factor(value: Option<f64>) -> (f64, String) {
    let Some(v) = value else {
        return (0.0, "insufficient data for RSI".to_string());
    };
    if v <= 25.0 {
        (W_RSI, format!("RSI {v:.1} (deeply oversold)"))
    } else if v <= 30.0 {
        (W_RSI * 0.8, format!("RSI {v:.1} (oversold)"))
    } else if v <= 40.0 {
        (W_RSI * 0.4, format!("RSI {v:.1} (weak, rebound possible)"))
    } else if v <= 60.0 {
        (0.0, format!("RSI {v:.1} (neutral)"))
    } else if v <= 70.0 {
        (-W_RSI * 0.4, format!("RSI {v:.1} (getting hot)"))
    } else if v <= 80.0 {
        (-W_RSI * 0.8, format!("RSI {v:.1} (overbought)"))
    } else {
        (-W_RSI, format!("RSI {v:.1} (deeply overbought)"))
    }
}

pub fn macd_factor(value: Option<&Macd>) -> (f64, String) {
    let Some(m) = value else {
        return (0.0, "insufficient data for MACD".to_string());
    };
    if m.histogram > 0.0 && m.macd > m.signal {
        let strength = (m.histogram.abs() / m.signal.abs().max(1.0) * 10.0).min(1.0);
        (
            W_MACD * strength,
            format!("MACD golden cross (hist {:+.2})", m.histogram),
        )
    } else if m.histogram < 0.0 && m.macd < m.signal {
        let strength = (m.histogram.abs() / m.signal.abs().max(1.0) * 10.0).min(1.0);
        (
            -W_MACD * strength,
            format!("MACD dead cross (hist {:+.2})", m.histogram),
        )
    } else {
        (0.0, format!("MACD neutral (hist {:+.2})", m.histogram))
    }
}

pub fn bollinger_factor(value: Option<&Bollinger>) -> (f64, String) {
    let Some(b) = value else {
        return (0.0, "insufficient data for Bollinger bands".to_string());
    };
    let width = b.upper - b.lower;
    if width == 0.0 {
        return (0.0, "zero band width".to_string());
    }
    let price = b.current_price;
    if price <= b.lower {
        (
            W_BOLLINGER,
            format!("below lower band ({:.1} <= {:.1})", price, b.lower),
        )
    } else if price < b.lower + width * 0.2 {
        (W_BOLLINGER * 0.6, "near lower band".to_string())
    } else if price >= b.upper {
        (
            -W_BOLLINGER,
            format!("above upper band ({:.1} >= {:.1})", price, b.upper),
        )
    } else if price > b.upper - width * 0.2 {
        (-W_BOLLINGER * 0.6, "near upper band".to_string())
    } else {
        (0.0, "inside bands".to_string())
    }
}

/// Volatility breakout: target = today's open + half the previous bar's
/// range; beating it scores by excess (floor 0.5, cap 1.0 of weight).
pub fn volatility_factor(candles: &[Candle], price: f64) -> (f64, String) {
    if candles.len() < 2 {
        return (0.0, "insufficient candle history".to_string());
    }
    let prev = &candles[candles.len() - 2];
    let today_open = candles[candles.len() - 1].open;
    let target = today_open + (prev.high - prev.low) * 0.5;
    if target == 0.0 {
        return (0.0, "degenerate breakout target".to_string());
    }
    if price >= target {
        let excess = (price - target) / target * 100.0;
        let strength = (excess / 2.0).min(1.0);
        (
            W_VOLATILITY * strength.max(0.5),
            format!("breakout (target {target:.1}, price {price:.1})"),
        )
    } else {
        let gap_pct = (target - price) / target * 100.0;
        if gap_pct < 0.5 {
            (
                W_VOLATILITY * 0.3,
                format!("breakout near (target {target:.1}, price {price:.1})"),
            )
        } else {
            (0.0, format!("no breakout (target {target:.1})"))
        }
    }
}

/// Forecast direction: final forecast close vs. current price plus the
/// count of up-days decides the band.
pub fn forecast_factor(forecast: Option<&Forecast>, price: f64) -> (f64, String) {
    let Some(f) = forecast else {
        return (0.0, "no forecast available".to_string());
    };
    let Some(last) = f.predictions.last() else {
        return (0.0, "forecast returned no bars".to_string());
    };
    if price == 0.0 {
        return (0.0, "no reference price for forecast".to_string());
    }

    let change_pct = (last.close - price) / price * 100.0;
    let mut up_days = 0usize;
    let mut prev = price;
    for bar in &f.predictions {
        if bar.close > prev {
            up_days += 1;
        }
        prev = bar.close;
    }

    if change_pct > 3.0 && up_days >= 3 {
        (
            W_FORECAST,
            format!("forecast {change_pct:+.1}% with sustained uptrend"),
        )
    } else if change_pct > 1.0 {
        (W_FORECAST * 0.5, format!("forecast {change_pct:+.1}% (mildly up)"))
    } else if change_pct < -3.0 && up_days <= 1 {
        (
            -W_FORECAST,
            format!("forecast {change_pct:+.1}% with sustained downtrend"),
        )
    } else if change_pct < -1.0 {
        (
            -W_FORECAST * 0.5,
            format!("forecast {change_pct:+.1}% (mildly down)"),
        )
    } else {
        (0.0, format!("forecast {change_pct:+.1}% (neutral)"))
    }
}

pub fn daily_gap_factor(daily: &[Candle], price: f64) -> (f64, String) {
    let (native, reason) = structure::gap_score(daily, price);
    (native * (W_DAILY_GAP / structure::GAP_MAX_POINTS), reason)
}

pub fn daily_order_block_factor(daily: &[Candle], price: f64) -> (f64, String) {
    let (native, reason) = structure::order_block_score(daily, price);
    (native * (W_DAILY_OB / structure::OB_MAX_POINTS), reason)
}

pub fn intraday_gap_factor(intraday: &[Candle], price: f64) -> (f64, String) {
    let (native, reason) = structure::gap_score(intraday, price);
    (native * (W_INTRADAY_GAP / structure::GAP_MAX_POINTS), reason)
}

pub fn structure_factor(intraday: &[Candle]) -> (f64, String) {
    let (native, reason) = structure::structure_score(intraday);
    (native * (W_STRUCTURE / structure::BOS_POINTS), reason)
}

/// Composite scoring outcome before signal classification.
#[derive(Debug, Clone)]
pub struct Score {
    pub total: f64,
    pub factors: Vec<FactorResult>,
    pub stop_price: Option<f64>,
}

/// Score one instrument from its daily series, intraday series, current
/// price, and optional forecast. An empty intraday slice falls back to the
/// daily series for the intraday factors (fast mode / early session).
pub fn composite(
    daily: &[Candle],
    intraday: &[Candle],
    price: f64,
    forecast: Option<&Forecast>,
) -> Score {
    let ind = indicator::summary(daily);
    let smc: &[Candle] = if intraday.is_empty() { daily } else { intraday };

    let (rsi_s, rsi_r) = rsi_factor(ind.rsi);
    let (macd_s, macd_r) = macd_factor(ind.macd.as_ref());
    let (bb_s, bb_r) = bollinger_factor(ind.bollinger.as_ref());
    let (vol_s, vol_r) = volatility_factor(daily, price);
    let (pred_s, pred_r) = forecast_factor(forecast, price);
    let (gap_s, gap_r) = daily_gap_factor(daily, price);
    let (ob_s, ob_r) = daily_order_block_factor(daily, price);
    let (igap_s, igap_r) = intraday_gap_factor(smc, price);
    let (str_s, str_r) = structure_factor(smc);

    let factors = vec![
        FactorResult { name: "RSI", score: rsi_s, max_score: W_RSI, reason: rsi_r },
        FactorResult { name: "MACD", score: macd_s, max_score: W_MACD, reason: macd_r },
        FactorResult { name: "Bollinger", score: bb_s, max_score: W_BOLLINGER, reason: bb_r },
        FactorResult { name: "Volatility", score: vol_s, max_score: W_VOLATILITY, reason: vol_r },
        FactorResult { name: "Forecast", score: pred_s, max_score: W_FORECAST, reason: pred_r },
        FactorResult { name: "Daily Gap", score: gap_s, max_score: W_DAILY_GAP, reason: gap_r },
        FactorResult { name: "Order Block", score: ob_s, max_score: W_DAILY_OB, reason: ob_r },
        FactorResult { name: "Intraday Gap", score: igap_s, max_score: W_INTRADAY_GAP, reason: igap_r },
        FactorResult { name: "Structure", score: str_s, max_score: W_STRUCTURE, reason: str_r },
    ];
    let total = factors.iter().map(|f| f.score).sum();
    let stop_price = structure::structural_stop(smc, price);

    Score { total, factors, stop_price }
}

pub fn classify(total: f64) -> Signal {
    if total >= BUY_THRESHOLD {
        Signal::Buy
    } else if total <= SELL_THRESHOLD {
        Signal::Sell
    } else {
        Signal::Hold
    }
}

/// Build a full [`Evaluation`] from pre-fetched candle slices.
pub fn evaluate_slices(
    daily: &[Candle],
    intraday: &[Candle],
    price: f64,
    forecast: Option<&Forecast>,
) -> Evaluation {
    let score = composite(daily, intraday, price, forecast);
    let signal = classify(score.total);
    let summary = match signal {
        Signal::Buy => format!("buy signal (score {:+.0}/100)", score.total),
        Signal::Sell => format!("sell signal (score {:+.0}/100)", score.total),
        Signal::Hold => format!("holding (score {:+.0}/100)", score.total),
    };
    Evaluation {
        signal,
        score: score.total,
        factors: score.factors,
        summary,
        price,
        stop_price: score.stop_price,
    }
}
