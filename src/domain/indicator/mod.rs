//! Technical indicators over a chronologically ordered candle sequence
//! (oldest first).
//!
//! Every function returns `None` when the sequence is too short — callers
//! treat that as a valid, scoreable state, not a failure.

pub mod bollinger;
pub mod macd;
pub mod rsi;

pub use bollinger::{bollinger, bollinger_default, Bollinger};
pub use macd::{macd, macd_default, Macd};
pub use rsi::{rsi, rsi_default};

use crate::domain::candle::Candle;

/// All indicator readouts for one candle sequence.
#[derive(Debug, Clone, Default)]
pub struct IndicatorSummary {
    pub rsi: Option<f64>,
    pub macd: Option<Macd>,
    pub bollinger: Option<Bollinger>,
    pub close: Option<f64>,
    pub volume: Option<i64>,
}

pub fn summary(candles: &[Candle]) -> IndicatorSummary {
    IndicatorSummary {
        rsi: rsi_default(candles),
        macd: macd_default(candles),
        bollinger: bollinger_default(candles),
        close: candles.last().map(|c| c.close),
        volume: candles.last().map(|c| c.volume),
    }
}

pub(crate) fn closes(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.close).collect()
}

/// Exponential moving average seeded at the first value, k = 2/(period+1).
pub(crate) fn ema(values: &[f64], period: usize) -> Vec<f64> {
    let Some(first) = values.first() else {
        return Vec::new();
    };
    let k = 2.0 / (period as f64 + 1.0);
    let mut result = Vec::with_capacity(values.len());
    result.push(*first);
    for v in &values[1..] {
        let prev = result[result.len() - 1];
        result.push(v * k + prev * (1.0 - k));
    }
    result
}
