//! SQLite record store
//!
//! Single-connection store over rusqlite. The schema is created on open;
//! each logical operation (one classification result, one benchmark
//! creation, one bulk import) commits as its own transaction.

use crate::error::{MailbenchError, Result};
use crate::sampler::SamplePolicy;
use crate::types::{
    Benchmark, BenchmarkId, Email, ProcessedEmail, ResultId, ResultStatus, StockHistoryPoint,
};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use tracing::{debug, info};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS emails (
    path          TEXT PRIMARY KEY,
    message_id    TEXT NOT NULL DEFAULT '',
    date          TEXT,
    from_address  TEXT NOT NULL DEFAULT '',
    to_addresses  TEXT NOT NULL DEFAULT '[]',
    cc_addresses  TEXT NOT NULL DEFAULT '[]',
    bcc_addresses TEXT NOT NULL DEFAULT '[]',
    subject       TEXT NOT NULL DEFAULT '',
    headers       TEXT NOT NULL DEFAULT '{}',
    body          TEXT NOT NULL DEFAULT ''
);

CREATE INDEX IF NOT EXISTS idx_emails_date ON emails(date);

CREATE TABLE IF NOT EXISTS stock_history (
    date       TEXT PRIMARY KEY,
    close      REAL NOT NULL DEFAULT 0.0,
    high       REAL NOT NULL DEFAULT 0.0,
    low        REAL NOT NULL DEFAULT 0.0,
    volume     REAL NOT NULL DEFAULT 0.0,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
);

CREATE TABLE IF NOT EXISTS benchmarks (
    id            TEXT PRIMARY KEY,
    name          TEXT NOT NULL DEFAULT '',
    model         TEXT NOT NULL DEFAULT '',
    subset        TEXT NOT NULL DEFAULT '',
    period        TEXT NOT NULL DEFAULT 'ALL',
    per_period    INTEGER,
    weekday       TEXT NOT NULL DEFAULT 'ALL',
    system_prompt TEXT NOT NULL DEFAULT '',
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS processed_emails (
    id               TEXT PRIMARY KEY,
    email_path       TEXT NOT NULL REFERENCES emails(path),
    benchmark_id     TEXT NOT NULL REFERENCES benchmarks(id),
    summary          TEXT NOT NULL DEFAULT '',
    stock_discussion INTEGER NOT NULL DEFAULT 0,
    status           TEXT NOT NULL DEFAULT 'pending',
    attempts         INTEGER NOT NULL DEFAULT 0,
    last_error       TEXT,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL,
    processed_at     TEXT
);

CREATE INDEX IF NOT EXISTS idx_processed_benchmark
    ON processed_emails(benchmark_id);
CREATE UNIQUE INDEX IF NOT EXISTS idx_processed_pair
    ON processed_emails(benchmark_id, email_path);
"#;

/// SQLite-backed record store
pub struct SqliteStore {
    conn: Connection,
}

fn ts_to_sql(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

fn sql_to_ts(s: &str) -> std::result::Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn json_err(e: serde_json::Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
}

impl SqliteStore {
    /// Open (or create) the store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        info!("Opening database: {}", path.as_ref().display());
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Open an in-memory store (tests)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Drop every table and recreate the schema (full reset)
    pub fn reset(&self) -> Result<()> {
        info!("Resetting database");
        self.conn.execute_batch(
            r#"
            DROP TABLE IF EXISTS processed_emails;
            DROP TABLE IF EXISTS benchmarks;
            DROP TABLE IF EXISTS stock_history;
            DROP TABLE IF EXISTS emails;
            "#,
        )?;
        self.init_schema()
    }

    // ----- emails -----

    /// Bulk insert ingested emails in one transaction
    pub fn insert_emails(&self, emails: &[Email]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT OR REPLACE INTO emails (
                    path, message_id, date, from_address,
                    to_addresses, cc_addresses, bcc_addresses,
                    subject, headers, body
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )?;
            for email in emails {
                stmt.execute(params![
                    email.path,
                    email.message_id,
                    email.date.map(ts_to_sql),
                    email.from_address,
                    serde_json::to_string(&email.to_addresses)?,
                    serde_json::to_string(&email.cc_addresses)?,
                    serde_json::to_string(&email.bcc_addresses)?,
                    email.subject,
                    serde_json::to_string(&email.headers)?,
                    email.body,
                ])?;
            }
        }
        tx.commit()?;
        debug!("Inserted {} emails", emails.len());
        Ok(emails.len())
    }

    fn row_to_email(row: &Row<'_>) -> std::result::Result<Email, rusqlite::Error> {
        let date: Option<String> = row.get("date")?;
        let date = date.as_deref().map(sql_to_ts).transpose()?;

        let to_addresses: String = row.get("to_addresses")?;
        let cc_addresses: String = row.get("cc_addresses")?;
        let bcc_addresses: String = row.get("bcc_addresses")?;
        let headers: String = row.get("headers")?;

        Ok(Email {
            path: row.get("path")?,
            message_id: row.get("message_id")?,
            date,
            from_address: row.get("from_address")?,
            to_addresses: serde_json::from_str(&to_addresses).map_err(json_err)?,
            cc_addresses: serde_json::from_str(&cc_addresses).map_err(json_err)?,
            bcc_addresses: serde_json::from_str(&bcc_addresses).map_err(json_err)?,
            subject: row.get("subject")?,
            headers: serde_json::from_str(&headers).map_err(json_err)?,
            body: row.get("body")?,
        })
    }

    /// Fetch one email by its maildir-relative path
    pub fn get_email(&self, path: &str) -> Result<Option<Email>> {
        let email = self
            .conn
            .query_row(
                "SELECT * FROM emails WHERE path = ?",
                params![path],
                Self::row_to_email,
            )
            .optional()?;
        Ok(email)
    }

    /// All emails with a known timestamp, ordered by timestamp ascending
    pub fn list_dated_emails(&self) -> Result<Vec<Email>> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM emails WHERE date IS NOT NULL ORDER BY date ASC")?;
        let rows = stmt.query_map([], Self::row_to_email)?;
        let mut emails = Vec::new();
        for row in rows {
            emails.push(row?);
        }
        Ok(emails)
    }

    pub fn email_count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM emails", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ----- stock history -----

    /// Replace the full stock history set: delete-all then insert, one transaction
    pub fn replace_stock_history(&self, points: &[StockHistoryPoint]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM stock_history", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO stock_history (date, close, high, low, volume)
                 VALUES (?, ?, ?, ?, ?)",
            )?;
            for point in points {
                stmt.execute(params![
                    point.date.format("%Y-%m-%d").to_string(),
                    point.close,
                    point.high,
                    point.low,
                    point.volume,
                ])?;
            }
        }
        tx.commit()?;
        debug!("Replaced stock history with {} points", points.len());
        Ok(points.len())
    }

    pub fn stock_history_count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM stock_history", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Most recent stock point with date on or before the given timestamp
    ///
    /// Returns None when no such point exists; callers leave the price
    /// field empty rather than guessing a default.
    pub fn latest_price_on_or_before(
        &self,
        ts: DateTime<Utc>,
    ) -> Result<Option<StockHistoryPoint>> {
        let day = ts.date_naive().format("%Y-%m-%d").to_string();
        let point = self
            .conn
            .query_row(
                "SELECT date, close, high, low, volume FROM stock_history
                 WHERE date <= ? ORDER BY date DESC LIMIT 1",
                params![day],
                |row| {
                    let date_str: String = row.get("date")?;
                    let date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d").map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(
                            0,
                            rusqlite::types::Type::Text,
                            Box::new(e),
                        )
                    })?;
                    Ok(StockHistoryPoint {
                        date,
                        close: row.get("close")?,
                        high: row.get("high")?,
                        low: row.get("low")?,
                        volume: row.get("volume")?,
                    })
                },
            )
            .optional()?;
        Ok(point)
    }

    // ----- benchmarks -----

    pub fn create_benchmark(&self, benchmark: &Benchmark) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO benchmarks (
                id, name, model, subset, period, per_period, weekday,
                system_prompt, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                benchmark.id.to_string(),
                benchmark.name,
                benchmark.model,
                benchmark.subset,
                benchmark.policy.period.to_string(),
                benchmark.policy.per_period.map(|n| n as i64),
                benchmark.policy.weekday.to_string(),
                benchmark.system_prompt,
                ts_to_sql(benchmark.created_at),
                ts_to_sql(benchmark.updated_at),
            ],
        )?;
        debug!("Created benchmark {}", benchmark.id);
        Ok(())
    }

    fn row_to_benchmark(row: &Row<'_>) -> std::result::Result<Benchmark, rusqlite::Error> {
        let text_err = |msg: String| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                msg.into(),
            )
        };

        let id: String = row.get("id")?;
        let id = BenchmarkId::from_string(&id).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })?;
        let created_at: String = row.get("created_at")?;
        let updated_at: String = row.get("updated_at")?;

        let period: String = row.get("period")?;
        let weekday: String = row.get("weekday")?;
        let per_period: Option<i64> = row.get("per_period")?;
        let policy = SamplePolicy {
            period: period.parse().map_err(text_err)?,
            per_period: per_period.map(|n| n as usize),
            weekday: weekday.parse().map_err(text_err)?,
        };

        Ok(Benchmark {
            id,
            name: row.get("name")?,
            model: row.get("model")?,
            subset: row.get("subset")?,
            policy,
            system_prompt: row.get("system_prompt")?,
            created_at: sql_to_ts(&created_at)?,
            updated_at: sql_to_ts(&updated_at)?,
        })
    }

    pub fn get_benchmark(&self, id: BenchmarkId) -> Result<Option<Benchmark>> {
        let benchmark = self
            .conn
            .query_row(
                "SELECT * FROM benchmarks WHERE id = ?",
                params![id.to_string()],
                Self::row_to_benchmark,
            )
            .optional()?;
        Ok(benchmark)
    }

    pub fn list_benchmarks(&self) -> Result<Vec<Benchmark>> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM benchmarks ORDER BY created_at ASC")?;
        let rows = stmt.query_map([], Self::row_to_benchmark)?;
        let mut benchmarks = Vec::new();
        for row in rows {
            benchmarks.push(row?);
        }
        Ok(benchmarks)
    }

    pub fn benchmark_count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM benchmarks", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ----- results -----

    pub fn create_result(&self, result: &ProcessedEmail) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO processed_emails (
                id, email_path, benchmark_id, summary, stock_discussion,
                status, attempts, last_error, created_at, updated_at, processed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                result.id.to_string(),
                result.email_path,
                result.benchmark_id.to_string(),
                result.summary,
                result.stock_discussion as i32,
                result.status.as_str(),
                result.attempts,
                result.last_error,
                ts_to_sql(result.created_at),
                ts_to_sql(result.updated_at),
                result.processed_at.map(ts_to_sql),
            ],
        )?;
        Ok(())
    }

    /// Persist the mutable fields of a result row
    pub fn update_result(&self, result: &ProcessedEmail) -> Result<()> {
        let changed = self.conn.execute(
            r#"
            UPDATE processed_emails SET
                summary = ?, stock_discussion = ?, status = ?, attempts = ?,
                last_error = ?, updated_at = ?, processed_at = ?
            WHERE id = ?
            "#,
            params![
                result.summary,
                result.stock_discussion as i32,
                result.status.as_str(),
                result.attempts,
                result.last_error,
                ts_to_sql(result.updated_at),
                result.processed_at.map(ts_to_sql),
                result.id.to_string(),
            ],
        )?;
        if changed == 0 {
            return Err(MailbenchError::Other(format!(
                "Result row {} not found for update",
                result.id
            )));
        }
        Ok(())
    }

    fn row_to_result(row: &Row<'_>) -> std::result::Result<ProcessedEmail, rusqlite::Error> {
        let id: String = row.get("id")?;
        let benchmark_id: String = row.get("benchmark_id")?;
        let status: String = row.get("status")?;
        let created_at: String = row.get("created_at")?;
        let updated_at: String = row.get("updated_at")?;
        let processed_at: Option<String> = row.get("processed_at")?;

        let conv = |e: uuid::Error| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        };

        Ok(ProcessedEmail {
            id: ResultId::from_string(&id).map_err(conv)?,
            email_path: row.get("email_path")?,
            benchmark_id: BenchmarkId::from_string(&benchmark_id).map_err(conv)?,
            summary: row.get("summary")?,
            stock_discussion: row.get::<_, i32>("stock_discussion")? != 0,
            status: ResultStatus::parse(&status).unwrap_or(ResultStatus::Pending),
            attempts: row.get::<_, i64>("attempts")? as u32,
            last_error: row.get("last_error")?,
            created_at: sql_to_ts(&created_at)?,
            updated_at: sql_to_ts(&updated_at)?,
            processed_at: processed_at.as_deref().map(sql_to_ts).transpose()?,
        })
    }

    /// Find the result row for a (benchmark, email) pair, if any
    pub fn find_result(
        &self,
        benchmark_id: BenchmarkId,
        email_path: &str,
    ) -> Result<Option<ProcessedEmail>> {
        let result = self
            .conn
            .query_row(
                "SELECT * FROM processed_emails WHERE benchmark_id = ? AND email_path = ?",
                params![benchmark_id.to_string(), email_path],
                Self::row_to_result,
            )
            .optional()?;
        Ok(result)
    }

    /// All result rows for a benchmark, in creation order
    pub fn results_for_benchmark(&self, benchmark_id: BenchmarkId) -> Result<Vec<ProcessedEmail>> {
        let mut stmt = self.conn.prepare(
            "SELECT * FROM processed_emails WHERE benchmark_id = ? ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map(params![benchmark_id.to_string()], Self::row_to_result)?;
        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    pub fn processed_email_count(&self) -> Result<u64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM processed_emails", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
