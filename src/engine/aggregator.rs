//! Tick-to-candle aggregation: per-instrument, per-interval in-memory
//! buckets, flushed to one CSV file per (instrument, interval, day).
//!
//! Bucket keys are time-of-day; the end-of-day flush clears every buffer
//! before a key can recur on the next session.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use tokio::sync::Mutex;

use crate::domain::candle::{bucket_start, Candle, Interval, Tick};
use crate::domain::error::DaytraderError;

/// Intervals assembled from the live tick stream.
pub const INTERVALS: [Interval; 2] = [Interval::Min15, Interval::Min60];

type IntervalBuckets = HashMap<Interval, BTreeMap<NaiveTime, Candle>>;

pub struct CandleAggregator {
    dir: PathBuf,
    // single lock: ingest and flush are mutually exclusive
    buf: Mutex<HashMap<String, IntervalBuckets>>,
}

impl CandleAggregator {
    pub fn new(dir: PathBuf) -> Self {
        CandleAggregator {
            dir,
            buf: Mutex::new(HashMap::new()),
        }
    }

    /// Fold one tick into every interval's bucket for its instrument.
    pub async fn ingest(&self, tick: &Tick) {
        let mut buf = self.buf.lock().await;
        let by_interval = buf.entry(tick.code.clone()).or_default();
        for interval in INTERVALS {
            let start = bucket_start(tick.ts, interval);
            let bucket = by_interval.entry(interval).or_default();
            match bucket.get_mut(&start.time()) {
                Some(candle) => candle.update(tick.price, tick.volume),
                None => {
                    bucket.insert(
                        start.time(),
                        Candle::from_tick(&tick.code, interval, tick.price, tick.volume, start),
                    );
                }
            }
        }
    }

    /// Current session's candles for one instrument/interval, in time order.
    pub async fn candles(&self, code: &str, interval: Interval) -> Vec<Candle> {
        let buf = self.buf.lock().await;
        buf.get(code)
            .and_then(|by_interval| by_interval.get(&interval))
            .map(|bucket| bucket.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Write every non-empty bucket map to durable storage for `date`,
    /// then clear the in-memory state. Returns the number of interval
    /// series written.
    pub async fn flush(&self, date: NaiveDate) -> Result<usize, DaytraderError> {
        let mut buf = self.buf.lock().await;
        let mut saved = 0usize;

        for (code, by_interval) in buf.iter() {
            for (interval, bucket) in by_interval {
                if bucket.is_empty() {
                    continue;
                }
                let path = self.path(code, *interval, date);
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let mut writer = csv::Writer::from_path(&path).map_err(|e| {
                    DaytraderError::Storage {
                        reason: format!("failed to open {}: {}", path.display(), e),
                    }
                })?;
                writer
                    .write_record(["time", "open", "high", "low", "close", "volume"])
                    .map_err(|e| DaytraderError::Storage { reason: e.to_string() })?;
                for candle in bucket.values() {
                    writer
                        .write_record([
                            candle.ts.format("%Y-%m-%d %H:%M:%S").to_string(),
                            candle.open.to_string(),
                            candle.high.to_string(),
                            candle.low.to_string(),
                            candle.close.to_string(),
                            candle.volume.to_string(),
                        ])
                        .map_err(|e| DaytraderError::Storage { reason: e.to_string() })?;
                }
                writer
                    .flush()
                    .map_err(|e| DaytraderError::Storage { reason: e.to_string() })?;
                saved += 1;
                log::info!("saved {} candles to {}", bucket.len(), path.display());
            }
        }

        buf.clear();
        Ok(saved)
    }

    /// Read back one persisted day. A missing file is an empty day, not an
    /// error.
    pub fn load(
        &self,
        code: &str,
        interval: Interval,
        date: NaiveDate,
    ) -> Result<Vec<Candle>, DaytraderError> {
        let path = self.path(code, interval, date);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let mut rdr = csv::Reader::from_path(&path).map_err(|e| DaytraderError::Storage {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;
        let mut candles = Vec::new();
        for record in rdr.records() {
            let record = record.map_err(|e| DaytraderError::Storage {
                reason: format!("CSV parse error in {}: {}", path.display(), e),
            })?;
            if record.len() < 6 {
                continue;
            }
            let parse = |idx: usize| -> Result<f64, DaytraderError> {
                record[idx].parse().map_err(|e| DaytraderError::Storage {
                    reason: format!("invalid number in {}: {}", path.display(), e),
                })
            };
            let ts = NaiveDateTime::parse_from_str(&record[0], "%Y-%m-%d %H:%M:%S").map_err(
                |e| DaytraderError::Storage {
                    reason: format!("invalid timestamp in {}: {}", path.display(), e),
                },
            )?;
            candles.push(Candle {
                code: code.to_string(),
                interval,
                ts,
                open: parse(1)?,
                high: parse(2)?,
                low: parse(3)?,
                close: parse(4)?,
                volume: record[5].parse().map_err(|e| DaytraderError::Storage {
                    reason: format!("invalid volume in {}: {}", path.display(), e),
                })?,
            });
        }
        Ok(candles)
    }

    /// Trailing `days`-day window ending at `as_of`, concatenated in
    /// chronological order.
    pub fn load_days(
        &self,
        code: &str,
        interval: Interval,
        days: usize,
        as_of: NaiveDate,
    ) -> Result<Vec<Candle>, DaytraderError> {
        let mut result = Vec::new();
        for back in (0..days).rev() {
            let date = as_of - chrono::Duration::days(back as i64);
            result.extend(self.load(code, interval, date)?);
        }
        Ok(result)
    }

    fn path(&self, code: &str, interval: Interval, date: NaiveDate) -> PathBuf {
        self.dir
            .join(code)
            .join(format!("{}_{}.csv", date.format("%Y-%m-%d"), interval.file_tag()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tick(code: &str, price: f64, volume: i64, h: u32, m: u32, s: u32) -> Tick {
        Tick {
            code: code.to_string(),
            price,
            volume,
            ts: NaiveDate::from_ymd_opt(2024, 3, 4)
                .unwrap()
                .and_hms_opt(h, m, s)
                .unwrap(),
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()
    }

    #[tokio::test]
    async fn ticks_in_one_bucket_merge() {
        let dir = TempDir::new().unwrap();
        let agg = CandleAggregator::new(dir.path().to_path_buf());

        agg.ingest(&tick("005930", 100.0, 10, 9, 16, 0)).await;
        agg.ingest(&tick("005930", 103.0, 5, 9, 20, 30)).await;
        agg.ingest(&tick("005930", 99.0, 7, 9, 29, 59)).await;

        let candles = agg.candles("005930", Interval::Min15).await;
        assert_eq!(candles.len(), 1);
        let c = &candles[0];
        assert_eq!(c.ts.time(), NaiveTime::from_hms_opt(9, 15, 0).unwrap());
        assert_eq!(c.open, 100.0);
        assert_eq!(c.high, 103.0);
        assert_eq!(c.low, 99.0);
        assert_eq!(c.close, 99.0);
        assert_eq!(c.volume, 22);
    }

    #[tokio::test]
    async fn buckets_split_on_interval_boundary() {
        let dir = TempDir::new().unwrap();
        let agg = CandleAggregator::new(dir.path().to_path_buf());

        agg.ingest(&tick("005930", 100.0, 1, 9, 14, 59)).await;
        agg.ingest(&tick("005930", 101.0, 1, 9, 15, 0)).await;

        let m15 = agg.candles("005930", Interval::Min15).await;
        assert_eq!(m15.len(), 2);
        // both land in the same 60-minute bucket
        let m60 = agg.candles("005930", Interval::Min60).await;
        assert_eq!(m60.len(), 1);
        assert_eq!(m60[0].volume, 2);
    }

    #[tokio::test]
    async fn candles_ordered_by_time() {
        let dir = TempDir::new().unwrap();
        let agg = CandleAggregator::new(dir.path().to_path_buf());

        agg.ingest(&tick("005930", 100.0, 1, 10, 40, 0)).await;
        agg.ingest(&tick("005930", 101.0, 1, 9, 10, 0)).await;
        agg.ingest(&tick("005930", 102.0, 1, 10, 5, 0)).await;

        let candles = agg.candles("005930", Interval::Min15).await;
        let times: Vec<NaiveTime> = candles.iter().map(|c| c.ts.time()).collect();
        let mut sorted = times.clone();
        sorted.sort();
        assert_eq!(times, sorted);
    }

    #[tokio::test]
    async fn unknown_code_is_empty() {
        let dir = TempDir::new().unwrap();
        let agg = CandleAggregator::new(dir.path().to_path_buf());
        assert!(agg.candles("999999", Interval::Min15).await.is_empty());
    }

    #[tokio::test]
    async fn flush_writes_and_clears() {
        let dir = TempDir::new().unwrap();
        let agg = CandleAggregator::new(dir.path().to_path_buf());

        agg.ingest(&tick("005930", 100.0, 10, 9, 16, 0)).await;
        agg.ingest(&tick("035720", 50.0, 5, 9, 16, 0)).await;

        // two codes times two intervals
        let saved = agg.flush(date()).await.unwrap();
        assert_eq!(saved, 4);

        assert!(agg.candles("005930", Interval::Min15).await.is_empty());
        assert!(dir.path().join("005930").join("2024-03-04_15m.csv").exists());
        assert!(dir.path().join("035720").join("2024-03-04_60m.csv").exists());

        // nothing left to write
        let saved_again = agg.flush(date()).await.unwrap();
        assert_eq!(saved_again, 0);
    }

    #[tokio::test]
    async fn flush_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let agg = CandleAggregator::new(dir.path().to_path_buf());

        agg.ingest(&tick("005930", 70_000.0, 10, 9, 16, 0)).await;
        agg.ingest(&tick("005930", 70_500.5, 5, 9, 20, 0)).await;
        agg.ingest(&tick("005930", 69_900.0, 3, 9, 31, 0)).await;
        let expected = agg.candles("005930", Interval::Min15).await;

        agg.flush(date()).await.unwrap();
        let loaded = agg.load("005930", Interval::Min15, date()).unwrap();
        assert_eq!(loaded, expected);
    }

    #[tokio::test]
    async fn load_missing_day_is_empty() {
        let dir = TempDir::new().unwrap();
        let agg = CandleAggregator::new(dir.path().to_path_buf());
        let loaded = agg.load("005930", Interval::Min15, date()).unwrap();
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn load_days_concatenates_chronologically() {
        let dir = TempDir::new().unwrap();
        let agg = CandleAggregator::new(dir.path().to_path_buf());

        // day 1
        agg.ingest(&Tick {
            code: "005930".into(),
            price: 100.0,
            volume: 1,
            ts: NaiveDate::from_ymd_opt(2024, 3, 4)
                .unwrap()
                .and_hms_opt(9, 16, 0)
                .unwrap(),
        })
        .await;
        agg.flush(NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()).await.unwrap();

        // day 2
        agg.ingest(&Tick {
            code: "005930".into(),
            price: 105.0,
            volume: 1,
            ts: NaiveDate::from_ymd_opt(2024, 3, 5)
                .unwrap()
                .and_hms_opt(9, 16, 0)
                .unwrap(),
        })
        .await;
        agg.flush(NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()).await.unwrap();

        let all = agg
            .load_days(
                "005930",
                Interval::Min15,
                3,
                NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
            )
            .unwrap();
        assert_eq!(all.len(), 2);
        assert!(all[0].ts < all[1].ts);
        assert_eq!(all[0].close, 100.0);
        assert_eq!(all[1].close, 105.0);
    }
}
