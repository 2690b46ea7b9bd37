//! Bollinger bands: SMA ± multiplier × population standard deviation over
//! the trailing window, plus the latest close for band-position checks.

use crate::domain::candle::Candle;
use crate::domain::indicator::closes;

pub const DEFAULT_PERIOD: usize = 20;
pub const DEFAULT_STD_DEV: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bollinger {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
    pub current_price: f64,
}

/// Latest band values, or `None` with fewer than `period` bars.
pub fn bollinger(candles: &[Candle], period: usize, std_dev: f64) -> Option<Bollinger> {
    if period == 0 {
        return None;
    }
    let closes = closes(candles);
    if closes.len() < period {
        return None;
    }

    let window = &closes[closes.len() - period..];
    let middle: f64 = window.iter().sum::<f64>() / period as f64;
    let variance: f64 = window
        .iter()
        .map(|c| {
            let diff = c - middle;
            diff * diff
        })
        .sum::<f64>()
        / period as f64;
    let sd = variance.sqrt();

    Some(Bollinger {
        upper: middle + std_dev * sd,
        middle,
        lower: middle - std_dev * sd,
        current_price: closes[closes.len() - 1],
    })
}

pub fn bollinger_default(candles: &[Candle]) -> Option<Bollinger> {
    bollinger(candles, DEFAULT_PERIOD, DEFAULT_STD_DEV)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::test_support::bars_from_closes;

    #[test]
    fn too_few_bars() {
        let bars = bars_from_closes(&vec![100.0; 19]);
        assert!(bollinger_default(&bars).is_none());
    }

    #[test]
    fn zero_period() {
        let bars = bars_from_closes(&[100.0, 101.0]);
        assert!(bollinger(&bars, 0, 2.0).is_none());
    }

    #[test]
    fn constant_series_collapses_bands() {
        let bars = bars_from_closes(&vec![100.0; 20]);
        let b = bollinger_default(&bars).unwrap();
        assert!((b.upper - 100.0).abs() < f64::EPSILON);
        assert!((b.middle - 100.0).abs() < f64::EPSILON);
        assert!((b.lower - 100.0).abs() < f64::EPSILON);
        assert_eq!(b.current_price, 100.0);
    }

    #[test]
    fn known_three_bar_window() {
        let bars = bars_from_closes(&[10.0, 20.0, 30.0]);
        let b = bollinger(&bars, 3, 2.0).unwrap();

        let middle = 20.0;
        let variance = ((10.0f64 - middle).powi(2)
            + (20.0f64 - middle).powi(2)
            + (30.0f64 - middle).powi(2))
            / 3.0;
        let sd = variance.sqrt();

        assert!((b.middle - middle).abs() < 1e-10);
        assert!((b.upper - (middle + 2.0 * sd)).abs() < 1e-10);
        assert!((b.lower - (middle - 2.0 * sd)).abs() < 1e-10);
    }

    #[test]
    fn bands_symmetric_around_middle() {
        let closes: Vec<f64> = (0..25).map(|i| 100.0 + ((i * 3) % 7) as f64).collect();
        let bars = bars_from_closes(&closes);
        let b = bollinger_default(&bars).unwrap();
        assert!(((b.upper - b.middle) - (b.middle - b.lower)).abs() < 1e-10);
    }

    #[test]
    fn uses_only_trailing_window() {
        // leading garbage outside the window must not affect the bands
        let mut closes = vec![1_000_000.0; 5];
        closes.extend(vec![100.0; 20]);
        let bars = bars_from_closes(&closes);
        let b = bollinger_default(&bars).unwrap();
        assert!((b.middle - 100.0).abs() < f64::EPSILON);
    }
}
