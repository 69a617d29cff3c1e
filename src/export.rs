//! Benchmark export
//!
//! Materializes a scored benchmark as a self-contained directory under the
//! results root: a metadata file, a tabular summary joining each scored email
//! to the latest stock price at or before its timestamp, and a zip archive of
//! the raw email files. Rows that were never successfully scored are skipped;
//! a missing price or raw file degrades to an empty field or a logged warning,
//! never an aborted export.

use crate::error::{MailbenchError, Result};
use crate::storage::SqliteStore;
use crate::types::{Benchmark, BenchmarkId, Email, ProcessedEmail};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Outcome of one export
#[derive(Debug, Clone)]
pub struct ExportSummary {
    /// Rows written to the tabular file
    pub rows: usize,

    /// Result rows skipped because they were never scored
    pub skipped_unscored: usize,

    /// Referenced raw email files not found on disk
    pub missing_files: usize,

    /// Directory the artifacts were written to
    pub dir: PathBuf,
}

/// Writes benchmark artifacts to the results directory
pub struct Exporter<'a> {
    store: &'a SqliteStore,
    maildir: &'a Path,
    results_dir: &'a Path,
}

impl<'a> Exporter<'a> {
    pub fn new(store: &'a SqliteStore, maildir: &'a Path, results_dir: &'a Path) -> Self {
        Self {
            store,
            maildir,
            results_dir,
        }
    }

    /// Export one benchmark to `<results_dir>/<id>_<model>/`
    pub fn export(&self, id: BenchmarkId) -> Result<ExportSummary> {
        let benchmark = self
            .store
            .get_benchmark(id)?
            .ok_or_else(|| MailbenchError::BenchmarkNotFound(id.to_string()))?;

        let dir = self
            .results_dir
            .join(format!("{}_{}", benchmark.id, benchmark.model));
        std::fs::create_dir_all(&dir)?;

        let all_rows = self.store.results_for_benchmark(benchmark.id)?;
        let total = all_rows.len();

        // Only rows the classifier actually scored make it into the artifact
        let mut scored: Vec<(ProcessedEmail, Email)> = Vec::new();
        for row in all_rows {
            if row.processed_at.is_none() {
                continue;
            }
            match self.store.get_email(&row.email_path)? {
                Some(email) => scored.push((row, email)),
                None => {
                    warn!("Result row references unknown email {}", row.email_path);
                }
            }
        }
        let skipped_unscored = total - scored.len();
        scored.sort_by_key(|(_, email)| email.date);

        self.write_info(&dir, &benchmark)?;
        self.write_table(&dir, &scored)?;
        let missing_files = self.write_archive(&dir, &scored)?;

        info!(
            "Exported benchmark {} ({} rows, {} skipped) to {}",
            benchmark.id,
            scored.len(),
            skipped_unscored,
            dir.display()
        );

        Ok(ExportSummary {
            rows: scored.len(),
            skipped_unscored,
            missing_files,
            dir,
        })
    }

    fn write_info(&self, dir: &Path, benchmark: &Benchmark) -> Result<()> {
        let path = dir.join("benchmark_info.json");
        let json = serde_json::to_string_pretty(benchmark)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    fn write_table(&self, dir: &Path, scored: &[(ProcessedEmail, Email)]) -> Result<()> {
        let path = dir.join("benchmark.csv");
        let mut writer = csv::Writer::from_path(&path)?;
        writer.write_record([
            "sender",
            "recipients",
            "date",
            "summary",
            "price",
            "stock_discussion",
        ])?;

        for (row, email) in scored {
            let date = email.date.map(|d| d.to_rfc3339()).unwrap_or_default();
            let price = match email.date {
                Some(ts) => self
                    .store
                    .latest_price_on_or_before(ts)?
                    .map(|p| p.close.to_string())
                    .unwrap_or_default(),
                None => String::new(),
            };
            writer.write_record([
                email.from_address.as_str(),
                &email.recipients().join(";"),
                &date,
                &row.summary,
                &price,
                if row.stock_discussion { "true" } else { "false" },
            ])?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Zip the raw email files into `emails.zip`; returns the missing count
    fn write_archive(&self, dir: &Path, scored: &[(ProcessedEmail, Email)]) -> Result<usize> {
        let path = dir.join("emails.zip");
        let file = File::create(&path)?;
        let mut zip = ZipWriter::new(file);
        let options = SimpleFileOptions::default();

        let mut missing = 0usize;
        for (_, email) in scored {
            let source = self.maildir.join(&email.path);
            let bytes = match std::fs::read(&source) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("Email file {} missing from maildir: {}", email.path, e);
                    missing += 1;
                    continue;
                }
            };
            zip.start_file(format!("emails/{}", email.path), options)
                .map_err(MailbenchError::Archive)?;
            zip.write_all(&bytes)?;
        }
        zip.finish().map_err(MailbenchError::Archive)?;
        Ok(missing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::{DayOfWeek, Period, SamplePolicy};
    use crate::types::{ResultId, ResultStatus, StockHistoryPoint};
    use chrono::{NaiveDate, TimeZone, Utc};

    fn seed(store: &SqliteStore, maildir: &Path) -> BenchmarkId {
        let write = |rel: &str, content: &str| {
            let path = maildir.join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
        };
        write("m/1", "From: a@example.com\n\nstock talk");
        write("m/2", "From: b@example.com\n\nlunch");

        let email = |path: &str, day: u32, from: &str, to: Vec<String>| Email {
            path: path.to_string(),
            message_id: String::new(),
            date: Some(Utc.with_ymd_and_hms(2001, 6, 16, day, 0, 0).unwrap()),
            from_address: from.to_string(),
            to_addresses: to,
            cc_addresses: vec![],
            bcc_addresses: vec![],
            subject: String::new(),
            headers: Default::default(),
            body: String::new(),
        };
        store
            .insert_emails(&[
                email("m/1", 9, "a@example.com", vec!["x@example.com".into()]),
                email("m/2", 11, "b@example.com", vec![]),
            ])
            .unwrap();

        store
            .replace_stock_history(&[StockHistoryPoint {
                date: NaiveDate::from_ymd_opt(2001, 6, 14).unwrap(),
                close: 50.0,
                high: 51.0,
                low: 49.0,
                volume: 1000.0,
            }])
            .unwrap();

        let now = Utc::now();
        let benchmark = Benchmark {
            id: BenchmarkId::new(),
            name: "export test".into(),
            model: "fake-model".into(),
            subset: "ALL".into(),
            policy: SamplePolicy::new(Period::All, 0, DayOfWeek::All),
            system_prompt: "prompt".into(),
            created_at: now,
            updated_at: now,
        };
        store.create_benchmark(&benchmark).unwrap();

        let scored = ProcessedEmail {
            id: ResultId::new(),
            email_path: "m/1".into(),
            benchmark_id: benchmark.id,
            summary: "Discusses stock prices".into(),
            stock_discussion: true,
            status: ResultStatus::Succeeded,
            attempts: 1,
            last_error: None,
            created_at: now,
            updated_at: now,
            processed_at: Some(now),
        };
        store.create_result(&scored).unwrap();
        store
            .create_result(&ProcessedEmail::pending(benchmark.id, "m/2"))
            .unwrap();

        benchmark.id
    }

    #[test]
    fn test_export_writes_artifacts_and_skips_unscored() {
        let maildir = tempfile::TempDir::new().unwrap();
        let results = tempfile::TempDir::new().unwrap();
        let store = SqliteStore::open_in_memory().unwrap();
        let id = seed(&store, maildir.path());

        let exporter = Exporter::new(&store, maildir.path(), results.path());
        let summary = exporter.export(id).unwrap();

        assert_eq!(summary.rows, 1);
        assert_eq!(summary.skipped_unscored, 1);
        assert_eq!(summary.missing_files, 0);
        assert!(summary.dir.join("benchmark_info.json").exists());
        assert!(summary.dir.join("benchmark.csv").exists());
        assert!(summary.dir.join("emails.zip").exists());
    }

    #[test]
    fn test_export_table_round_trip() {
        let maildir = tempfile::TempDir::new().unwrap();
        let results = tempfile::TempDir::new().unwrap();
        let store = SqliteStore::open_in_memory().unwrap();
        let id = seed(&store, maildir.path());

        let exporter = Exporter::new(&store, maildir.path(), results.path());
        let summary = exporter.export(id).unwrap();

        let mut reader = csv::Reader::from_path(summary.dir.join("benchmark.csv")).unwrap();
        let records: Vec<csv::StringRecord> =
            reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 1);

        let row = &records[0];
        assert_eq!(&row[0], "a@example.com");
        assert_eq!(&row[1], "x@example.com");
        assert_eq!(&row[2], "2001-06-16T09:00:00+00:00");
        assert_eq!(&row[3], "Discusses stock prices");
        // Latest price at or before 2001-06-16 is the 06-14 close
        assert_eq!(&row[4], "50");
        assert_eq!(&row[5], "true");
    }

    #[test]
    fn test_export_price_empty_when_no_history() {
        let maildir = tempfile::TempDir::new().unwrap();
        let results = tempfile::TempDir::new().unwrap();
        let store = SqliteStore::open_in_memory().unwrap();
        let id = seed(&store, maildir.path());
        store.replace_stock_history(&[]).unwrap();

        let exporter = Exporter::new(&store, maildir.path(), results.path());
        let summary = exporter.export(id).unwrap();

        let mut reader = csv::Reader::from_path(summary.dir.join("benchmark.csv")).unwrap();
        let record = reader.records().next().unwrap().unwrap();
        assert_eq!(&record[4], "");
    }

    #[test]
    fn test_export_counts_missing_raw_files() {
        let maildir = tempfile::TempDir::new().unwrap();
        let results = tempfile::TempDir::new().unwrap();
        let store = SqliteStore::open_in_memory().unwrap();
        let id = seed(&store, maildir.path());
        std::fs::remove_file(maildir.path().join("m/1")).unwrap();

        let exporter = Exporter::new(&store, maildir.path(), results.path());
        let summary = exporter.export(id).unwrap();
        assert_eq!(summary.missing_files, 1);
        assert!(summary.dir.join("emails.zip").exists());
    }

    #[test]
    fn test_export_unknown_benchmark_is_not_found() {
        let maildir = tempfile::TempDir::new().unwrap();
        let results = tempfile::TempDir::new().unwrap();
        let store = SqliteStore::open_in_memory().unwrap();

        let exporter = Exporter::new(&store, maildir.path(), results.path());
        let err = exporter.export(BenchmarkId::new()).unwrap_err();
        assert!(matches!(err, MailbenchError::BenchmarkNotFound(_)));
    }
}
