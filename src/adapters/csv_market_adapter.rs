//! CSV-backed market data adapter for offline runs: daily candles from one
//! `<code>_daily.csv` file per instrument, rows `date,open,high,low,close,volume`.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::path::PathBuf;

use crate::domain::candle::{Candle, Interval};
use crate::domain::error::DaytraderError;
use crate::ports::market_port::{MarketPort, PriceQuote};

pub struct CsvMarketAdapter {
    base_path: PathBuf,
}

impl CsvMarketAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, code: &str) -> PathBuf {
        self.base_path.join(format!("{}_daily.csv", code))
    }

    /// Synchronous read used by the CLI; the port impl delegates here.
    pub fn read_daily(&self, code: &str, count: usize) -> Result<Vec<Candle>, DaytraderError> {
        let path = self.csv_path(code);
        let mut rdr = csv::Reader::from_path(&path).map_err(|e| DaytraderError::Market {
            code: code.to_string(),
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let mut bars = Vec::new();
        for record in rdr.records() {
            let record = record.map_err(|e| DaytraderError::Market {
                code: code.to_string(),
                reason: format!("CSV parse error: {}", e),
            })?;

            let field = |idx: usize, name: &str| -> Result<String, DaytraderError> {
                record
                    .get(idx)
                    .map(str::to_string)
                    .ok_or_else(|| DaytraderError::Market {
                        code: code.to_string(),
                        reason: format!("missing {} column", name),
                    })
            };

            let date = NaiveDate::parse_from_str(&field(0, "date")?, "%Y-%m-%d").map_err(|e| {
                DaytraderError::Market {
                    code: code.to_string(),
                    reason: format!("invalid date: {}", e),
                }
            })?;
            let parse_f64 = |idx: usize, name: &str| -> Result<f64, DaytraderError> {
                field(idx, name)?.parse().map_err(|e| DaytraderError::Market {
                    code: code.to_string(),
                    reason: format!("invalid {} value: {}", name, e),
                })
            };

            let open = parse_f64(1, "open")?;
            let high = parse_f64(2, "high")?;
            let low = parse_f64(3, "low")?;
            let close = parse_f64(4, "close")?;
            let volume: i64 = field(5, "volume")?.parse().map_err(|e| DaytraderError::Market {
                code: code.to_string(),
                reason: format!("invalid volume value: {}", e),
            })?;

            bars.push(Candle {
                code: code.to_string(),
                interval: Interval::Day,
                ts: date.and_hms_opt(0, 0, 0).unwrap_or_default(),
                open,
                high,
                low,
                close,
                volume,
            });
        }

        bars.sort_by_key(|b| b.ts);
        if bars.len() > count {
            bars.drain(..bars.len() - count);
        }
        Ok(bars)
    }
}

#[async_trait]
impl MarketPort for CsvMarketAdapter {
    async fn price(&self, code: &str) -> Result<PriceQuote, DaytraderError> {
        let bars = self.read_daily(code, 2)?;
        let last = bars.last().ok_or_else(|| DaytraderError::Market {
            code: code.to_string(),
            reason: "no daily candles on file".to_string(),
        })?;
        let change_pct = match bars.len() {
            2 if bars[0].close != 0.0 => (last.close - bars[0].close) / bars[0].close * 100.0,
            _ => 0.0,
        };
        Ok(PriceQuote {
            price: last.close,
            change_pct,
            volume: last.volume,
        })
    }

    async fn daily(&self, code: &str, count: usize) -> Result<Vec<Candle>, DaytraderError> {
        self.read_daily(code, count)
    }
}
