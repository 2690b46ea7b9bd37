//! Price/candle provider port. Implementations are expected to cache and
//! rate-limit on their side.

use async_trait::async_trait;

use crate::domain::candle::Candle;
use crate::domain::error::DaytraderError;

/// Snapshot quote for one instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceQuote {
    pub price: f64,
    pub change_pct: f64,
    pub volume: i64,
}

#[async_trait]
pub trait MarketPort: Send + Sync {
    async fn price(&self, code: &str) -> Result<PriceQuote, DaytraderError>;

    /// Up to `count` daily candles, ordered oldest first.
    async fn daily(&self, code: &str, count: usize) -> Result<Vec<Candle>, DaytraderError>;
}
