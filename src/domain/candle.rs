//! Tick and OHLCV candle representation.

use chrono::{NaiveDateTime, NaiveTime, Timelike};

/// A single trade tick. Ephemeral — never persisted individually.
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub code: String,
    pub price: f64,
    pub volume: i64,
    pub ts: NaiveDateTime,
}

/// Candle time bucket width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Interval {
    Min15,
    Min60,
    Day,
}

impl Interval {
    pub fn minutes(&self) -> u32 {
        match self {
            Interval::Min15 => 15,
            Interval::Min60 => 60,
            Interval::Day => 24 * 60,
        }
    }

    pub fn from_minutes(minutes: u32) -> Option<Interval> {
        match minutes {
            15 => Some(Interval::Min15),
            60 => Some(Interval::Min60),
            1440 => Some(Interval::Day),
            _ => None,
        }
    }

    /// Sub-day intervals are scoped to a single trading session.
    pub fn is_intraday(&self) -> bool {
        !matches!(self, Interval::Day)
    }

    /// Tag used in persisted file names, e.g. `15m`.
    pub fn file_tag(&self) -> &'static str {
        match self {
            Interval::Min15 => "15m",
            Interval::Min60 => "60m",
            Interval::Day => "1d",
        }
    }
}

/// One OHLCV bar. Invariant: `low <= {open, close} <= high`.
///
/// Created from the first tick in its bucket, mutated by later ticks in the
/// same bucket, immutable once read back from storage.
#[derive(Debug, Clone, PartialEq)]
pub struct Candle {
    pub code: String,
    pub interval: Interval,
    pub ts: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

impl Candle {
    /// Seed a new candle from the first tick of a bucket.
    pub fn from_tick(code: &str, interval: Interval, price: f64, volume: i64, ts: NaiveDateTime) -> Self {
        Candle {
            code: code.to_string(),
            interval,
            ts,
            open: price,
            high: price,
            low: price,
            close: price,
            volume,
        }
    }

    /// Fold a later tick from the same bucket into the candle.
    pub fn update(&mut self, price: f64, volume: i64) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
        self.volume += volume;
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    /// Signed body fraction of the full range; 0 for a zero-range bar.
    pub fn body_ratio(&self) -> f64 {
        let range = self.high - self.low;
        if range == 0.0 {
            return 0.0;
        }
        (self.close - self.open) / range
    }

    /// Timestamp label used on derived zones.
    pub fn stamp(&self) -> String {
        if self.interval.is_intraday() {
            self.ts.format("%Y-%m-%d %H:%M").to_string()
        } else {
            self.ts.format("%Y-%m-%d").to_string()
        }
    }
}

/// Floor a timestamp's minute to its interval boundary, truncating seconds.
pub fn bucket_start(ts: NaiveDateTime, interval: Interval) -> NaiveDateTime {
    if !interval.is_intraday() {
        return NaiveDateTime::new(ts.date(), NaiveTime::MIN);
    }
    let width = interval.minutes().min(60);
    let minute = (ts.minute() / width) * width;
    let time = NaiveTime::from_hms_opt(ts.hour(), minute, 0).unwrap_or(ts.time());
    NaiveDateTime::new(ts.date(), time)
}
