//! RSI (Relative Strength Index) with Wilder smoothing.
//!
//! The first `period` deltas seed the average gain/loss as a simple mean;
//! every later bar updates them exponentially:
//! `avg = (prev_avg * (n-1) + current) / n`.
//! RSI = 100 - 100 / (1 + avg_gain / avg_loss); 100 when avg_loss is 0.

use crate::domain::candle::Candle;
use crate::domain::indicator::closes;

pub const DEFAULT_PERIOD: usize = 14;

/// Latest RSI value, or `None` with fewer than `period + 1` bars.
pub fn rsi(candles: &[Candle], period: usize) -> Option<f64> {
    let closes = closes(candles);
    if period == 0 || closes.len() < period + 1 {
        return None;
    }

    let mut gains = 0.0;
    let mut losses = 0.0;
    for i in 1..=period {
        let diff = closes[i] - closes[i - 1];
        if diff > 0.0 {
            gains += diff;
        } else {
            losses -= diff;
        }
    }
    let n = period as f64;
    let mut avg_gain = gains / n;
    let mut avg_loss = losses / n;

    for i in (period + 1)..closes.len() {
        let diff = closes[i] - closes[i - 1];
        let (gain, loss) = if diff > 0.0 { (diff, 0.0) } else { (0.0, -diff) };
        avg_gain = (avg_gain * (n - 1.0) + gain) / n;
        avg_loss = (avg_loss * (n - 1.0) + loss) / n;
    }

    if avg_loss == 0.0 {
        return Some(100.0);
    }
    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

pub fn rsi_default(candles: &[Candle]) -> Option<f64> {
    rsi(candles, DEFAULT_PERIOD)
}
