//! Per-day trade journal: one JSON file per calendar day holding the
//! ordered list of fill attempts.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::domain::error::DaytraderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeKind {
    Buy,
    Sell,
}

/// One fill attempt, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub time: String,
    pub code: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: TradeKind,
    pub qty: i64,
    pub price: f64,
    pub success: bool,
    pub message: String,
}

pub struct TradeJournal {
    dir: PathBuf,
}

impl TradeJournal {
    pub fn new(dir: PathBuf) -> Self {
        TradeJournal { dir }
    }

    fn path(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("{}.json", date.format("%Y-%m-%d")))
    }

    /// All entries for one day; a missing or unreadable file is an empty day.
    pub fn load(&self, date: NaiveDate) -> Vec<JournalEntry> {
        let path = self.path(date);
        let Ok(content) = std::fs::read_to_string(&path) else {
            return Vec::new();
        };
        serde_json::from_str(&content).unwrap_or_default()
    }

    /// Append one entry to its day's file.
    pub fn append(&self, date: NaiveDate, entry: JournalEntry) -> Result<(), DaytraderError> {
        std::fs::create_dir_all(&self.dir)?;
        let mut entries = self.load(date);
        entries.push(entry);
        let json = serde_json::to_string_pretty(&entries).map_err(|e| DaytraderError::Storage {
            reason: format!("journal serialization failed: {}", e),
        })?;
        std::fs::write(self.path(date), json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(code: &str, kind: TradeKind, success: bool) -> JournalEntry {
        JournalEntry {
            time: "2024-03-04 09:31:02".into(),
            code: code.into(),
            name: "Samsung Electronics".into(),
            kind,
            qty: 10,
            price: 70_000.0,
            success,
            message: if success { "filled" } else { "rejected" }.into(),
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()
    }

    #[test]
    fn append_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let journal = TradeJournal::new(dir.path().to_path_buf());

        journal.append(date(), entry("005930", TradeKind::Buy, true)).unwrap();
        journal.append(date(), entry("005930", TradeKind::Sell, false)).unwrap();

        let entries = journal.load(date());
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind, TradeKind::Buy);
        assert!(entries[0].success);
        assert_eq!(entries[1].kind, TradeKind::Sell);
        assert!(!entries[1].success);
    }

    #[test]
    fn missing_day_loads_empty() {
        let dir = TempDir::new().unwrap();
        let journal = TradeJournal::new(dir.path().to_path_buf());
        assert!(journal.load(date()).is_empty());
    }

    #[test]
    fn corrupt_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let journal = TradeJournal::new(dir.path().to_path_buf());
        std::fs::write(dir.path().join("2024-03-04.json"), "not json").unwrap();
        assert!(journal.load(date()).is_empty());
    }

    #[test]
    fn days_are_isolated() {
        let dir = TempDir::new().unwrap();
        let journal = TradeJournal::new(dir.path().to_path_buf());
        let other = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();

        journal.append(date(), entry("005930", TradeKind::Buy, true)).unwrap();
        journal.append(other, entry("035720", TradeKind::Buy, true)).unwrap();

        assert_eq!(journal.load(date()).len(), 1);
        assert_eq!(journal.load(other).len(), 1);
        assert_eq!(journal.load(date())[0].code, "005930");
        assert_eq!(journal.load(other)[0].code, "035720");
    }

    #[test]
    fn kind_serializes_lowercase() {
        let json = serde_json::to_string(&entry("005930", TradeKind::Buy, true)).unwrap();
        assert!(json.contains("\"type\":\"buy\""));
    }
}
