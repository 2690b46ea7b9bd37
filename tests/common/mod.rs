#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use daytrader::domain::candle::{Candle, Interval, Tick};

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn daily_bar(day_offset: i64, open: f64, high: f64, low: f64, close: f64) -> Candle {
    let ts = date(2024, 1, 1) + chrono::Duration::days(day_offset);
    Candle {
        code: "005930".into(),
        interval: Interval::Day,
        ts: ts.and_hms_opt(0, 0, 0).unwrap(),
        open,
        high,
        low,
        close,
        volume: 1000,
    }
}

/// Alternating-close daily series with wide overlapping ranges: every
/// factor that can score it lands on zero or near it, and no gap, swing,
/// or breakout structure exists.
pub fn balanced_daily(n: usize) -> Vec<Candle> {
    (0..n)
        .map(|i| {
            let close = if i % 2 == 0 { 99.5 } else { 100.5 };
            daily_bar(i as i64, 100.0, 101.5, 98.5, close)
        })
        .collect()
}

/// Sequential same-session 15-minute bars starting 09:00 on the given day.
pub fn intraday_session(day: NaiveDate, rows: &[(f64, f64, f64, f64)]) -> Vec<Candle> {
    let start: NaiveDateTime = day.and_hms_opt(9, 0, 0).unwrap();
    rows.iter()
        .enumerate()
        .map(|(i, &(open, high, low, close))| Candle {
            code: "005930".into(),
            interval: Interval::Min15,
            ts: start + chrono::Duration::minutes(15 * i as i64),
            open,
            high,
            low,
            close,
            volume: 1000,
        })
        .collect()
}

pub fn tick(code: &str, price: f64, volume: i64, ts: NaiveDateTime) -> Tick {
    Tick {
        code: code.into(),
        price,
        volume,
        ts,
    }
}
