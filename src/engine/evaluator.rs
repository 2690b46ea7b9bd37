//! Live evaluation service: fetches collaborator data, runs the factor
//! scorer, and caches forecast-free results for a short TTL.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::domain::candle::Interval;
use crate::domain::scorer::{self, Evaluation, Forecast};
use crate::engine::aggregator::CandleAggregator;
use crate::ports::market_port::MarketPort;

/// Forecast-free evaluations are reused for this long.
pub const EVALUATION_TTL: Duration = Duration::from_secs(120);

/// Daily candles requested per evaluation.
const DAILY_COUNT: usize = 60;

pub struct Evaluator {
    market: Arc<dyn MarketPort>,
    aggregator: Arc<CandleAggregator>,
    cache: Mutex<HashMap<String, (Instant, Evaluation)>>,
}

impl Evaluator {
    pub fn new(market: Arc<dyn MarketPort>, aggregator: Arc<CandleAggregator>) -> Self {
        Evaluator {
            market,
            aggregator,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Score one instrument. Never fails: collaborator errors degrade to a
    /// `hold` evaluation carrying the failure reason.
    ///
    /// Fast mode skips the intraday fetch and scores the intraday factors
    /// on the daily series, keeping wide-universe screening cheap.
    /// Forecast-bearing evaluations always recompute; only forecast-free
    /// results are cached (last-writer-wins).
    pub async fn evaluate(&self, code: &str, forecast: Option<&Forecast>, fast: bool) -> Evaluation {
        if forecast.is_none() {
            let cache = self.cache.lock().await;
            if let Some((stored_at, eval)) = cache.get(code) {
                if stored_at.elapsed() < EVALUATION_TTL {
                    return eval.clone();
                }
            }
        }

        let (daily, quote) = tokio::join!(
            self.market.daily(code, DAILY_COUNT),
            self.market.price(code)
        );
        let daily = match daily {
            Ok(daily) => daily,
            Err(e) => {
                log::warn!("evaluation of {code} degraded: {e}");
                return Evaluation::failed(e);
            }
        };
        let quote = match quote {
            Ok(quote) => quote,
            Err(e) => {
                log::warn!("evaluation of {code} degraded: {e}");
                return Evaluation::failed(e);
            }
        };

        let intraday = if fast {
            Vec::new()
        } else {
            self.aggregator.candles(code, Interval::Min15).await
        };

        let evaluation = scorer::evaluate_slices(&daily, &intraday, quote.price, forecast);

        if forecast.is_none() {
            let mut cache = self.cache.lock().await;
            cache.insert(code.to_string(), (Instant::now(), evaluation.clone()));
        }
        evaluation
    }

    /// Current stop/take-profit inputs for a held position: returns the
    /// live pnl and whether the stop tripped. Collaborator failure reads
    /// as "no trigger".
    pub async fn stop_check(
        &self,
        code: &str,
        avg_price: f64,
        structural_stop: Option<f64>,
        fallback_pct: f64,
    ) -> (bool, f64) {
        let Ok(quote) = self.market.price(code).await else {
            return (false, 0.0);
        };
        if avg_price == 0.0 {
            return (false, 0.0);
        }
        let pnl = (quote.price - avg_price) / avg_price * 100.0;
        let tripped = match structural_stop {
            Some(stop) => quote.price <= stop,
            None => pnl <= -fallback_pct,
        };
        (tripped, pnl)
    }

    /// Latest quote, for callers that already hold an evaluation.
    pub async fn quote(&self, code: &str) -> Option<f64> {
        self.market.price(code).await.ok().map(|q| q.price)
    }
}
