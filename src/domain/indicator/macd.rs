//! MACD (Moving Average Convergence Divergence).
//!
//! MACD line = EMA(fast) - EMA(slow); signal line = EMA over the MACD line
//! starting once `slow` samples exist; histogram = MACD - signal.

use crate::domain::candle::Candle;
use crate::domain::indicator::{closes, ema};

pub const DEFAULT_FAST: usize = 12;
pub const DEFAULT_SLOW: usize = 26;
pub const DEFAULT_SIGNAL: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Macd {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

/// Latest MACD readout, or `None` with fewer than `slow + signal` bars.
pub fn macd(candles: &[Candle], fast: usize, slow: usize, signal_period: usize) -> Option<Macd> {
    if fast == 0 || slow == 0 || signal_period == 0 {
        return None;
    }
    let closes = closes(candles);
    if closes.len() < slow + signal_period {
        return None;
    }

    let ema_fast = ema(&closes, fast);
    let ema_slow = ema(&closes, slow);
    let macd_line: Vec<f64> = ema_fast
        .iter()
        .zip(ema_slow.iter())
        .map(|(f, s)| f - s)
        .collect();

    let signal_line = ema(&macd_line[slow - 1..], signal_period);

    let line = *macd_line.last()?;
    let signal = signal_line.last().copied().unwrap_or(0.0);
    Some(Macd {
        macd: line,
        signal,
        histogram: line - signal,
    })
}

pub fn macd_default(candles: &[Candle]) -> Option<Macd> {
    macd(candles, DEFAULT_FAST, DEFAULT_SLOW, DEFAULT_SIGNAL)
}
