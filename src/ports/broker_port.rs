//! Broker port: holdings, cash, and whole-share market orders.

use async_trait::async_trait;

use crate::domain::error::DaytraderError;

#[derive(Debug, Clone, PartialEq)]
pub struct Holding {
    pub code: String,
    pub name: String,
    pub quantity: i64,
    pub avg_price: f64,
    pub current_price: f64,
}

/// Fill attempt outcome. Failures are ordinary results, not errors.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderOutcome {
    pub success: bool,
    pub message: String,
}

#[async_trait]
pub trait BrokerPort: Send + Sync {
    async fn holdings(&self) -> Result<Vec<Holding>, DaytraderError>;

    async fn cash(&self) -> Result<f64, DaytraderError>;

    async fn buy(&self, code: &str, quantity: i64) -> Result<OrderOutcome, DaytraderError>;

    async fn sell(&self, code: &str, quantity: i64) -> Result<OrderOutcome, DaytraderError>;
}
