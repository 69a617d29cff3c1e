//! Stock price history CSV import
//!
//! Reads a tabular file with columns Date (month/day/year), Close, High,
//! Low, Volume. Volume may be the literal "N/A", treated as zero. The full
//! stored set is replaced wholesale on each import (delete-all then insert),
//! so re-running the importer is idempotent.

use crate::error::{MailbenchError, Result};
use crate::storage::SqliteStore;
use crate::types::StockHistoryPoint;
use chrono::NaiveDate;
use serde::Deserialize;
use std::path::Path;
use tracing::info;

#[derive(Debug, Deserialize)]
struct RawStockRow {
    #[serde(rename = "Date")]
    date: String,

    #[serde(rename = "Close")]
    close: f64,

    #[serde(rename = "High")]
    high: f64,

    #[serde(rename = "Low")]
    low: f64,

    #[serde(rename = "Volume")]
    volume: String,
}

impl RawStockRow {
    fn into_point(self) -> Result<StockHistoryPoint> {
        let date = NaiveDate::parse_from_str(&self.date, "%m/%d/%Y").map_err(|e| {
            MailbenchError::Other(format!("Bad stock date '{}': {}", self.date, e))
        })?;
        let volume = if self.volume.trim() == "N/A" {
            0.0
        } else {
            self.volume.trim().parse::<f64>().map_err(|e| {
                MailbenchError::Other(format!("Bad stock volume '{}': {}", self.volume, e))
            })?
        };
        Ok(StockHistoryPoint {
            date,
            close: self.close,
            high: self.high,
            low: self.low,
            volume,
        })
    }
}

/// Import the stock history file, replacing any previously stored set
pub fn import_stock_csv(store: &SqliteStore, path: &Path) -> Result<usize> {
    let mut reader = csv::Reader::from_path(path)?;

    let mut points = Vec::new();
    for row in reader.deserialize::<RawStockRow>() {
        points.push(row?.into_point()?);
    }

    let count = store.replace_stock_history(&points)?;
    info!("Imported {} stock prices from {}", count, path.display());
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CSV: &str = "Date,Close,High,Low,Volume\n\
06/14/2001,50.0,51.0,49.0,1000\n\
06/20/2001,45.0,46.0,44.0,N/A\n";

    fn write_csv(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_import_parses_dates_and_na_volume() {
        let store = SqliteStore::open_in_memory().unwrap();
        let file = write_csv(CSV);

        let count = import_stock_csv(&store, file.path()).unwrap();
        assert_eq!(count, 2);

        let point = store
            .latest_price_on_or_before(
                chrono::DateTime::parse_from_rfc3339("2001-06-20T12:00:00Z")
                    .unwrap()
                    .with_timezone(&chrono::Utc),
            )
            .unwrap()
            .unwrap();
        assert_eq!(point.close, 45.0);
        assert_eq!(point.volume, 0.0);
    }

    #[test]
    fn test_reimport_is_idempotent() {
        let store = SqliteStore::open_in_memory().unwrap();
        let file = write_csv(CSV);

        import_stock_csv(&store, file.path()).unwrap();
        import_stock_csv(&store, file.path()).unwrap();
        assert_eq!(store.stock_history_count().unwrap(), 2);
    }

    #[test]
    fn test_bad_date_is_an_error() {
        let store = SqliteStore::open_in_memory().unwrap();
        let file = write_csv("Date,Close,High,Low,Volume\n2001-06-14,50.0,51.0,49.0,100\n");
        assert!(import_stock_csv(&store, file.path()).is_err());
    }
}
