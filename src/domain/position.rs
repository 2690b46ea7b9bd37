//! Live position tracking.

/// One held position. Owned exclusively by the trading loop: created on a
/// filled buy, destroyed on a filled sell.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub code: String,
    pub name: String,
    pub quantity: i64,
    pub avg_price: f64,
    /// Structural stop from the entry evaluation, when one existed.
    pub stop_price: Option<f64>,
}

impl Position {
    pub fn pnl_pct(&self, price: f64) -> f64 {
        if self.avg_price == 0.0 {
            return 0.0;
        }
        (price - self.avg_price) / self.avg_price * 100.0
    }

    pub fn market_value(&self, price: f64) -> f64 {
        self.quantity as f64 * price
    }

    /// Structural stop when known, fixed-percentage fallback otherwise.
    pub fn should_stop(&self, price: f64, fallback_pct: f64) -> bool {
        match self.stop_price {
            Some(stop) => price <= stop,
            None => self.pnl_pct(price) <= -fallback_pct,
        }
    }

    pub fn should_take_profit(&self, price: f64, take_profit_pct: f64) -> bool {
        self.pnl_pct(price) >= take_profit_pct
    }
}
