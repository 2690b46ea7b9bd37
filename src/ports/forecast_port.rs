//! Multi-day price forecaster port. Treated as opaque and possibly slow or
//! absent; callers degrade to a zero forecast factor on failure.

use async_trait::async_trait;

use crate::domain::error::DaytraderError;
use crate::domain::scorer::Forecast;

#[async_trait]
pub trait ForecastPort: Send + Sync {
    async fn predict(&self, code: &str) -> Result<Forecast, DaytraderError>;
}
