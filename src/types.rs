//! Core data types for the mailbench pipeline
//!
//! This module defines the fundamental data structures used throughout
//! mailbench: ingested emails, stock history points, benchmark definitions,
//! and per-email benchmark results.

use crate::sampler::SamplePolicy;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for benchmarks
///
/// Wraps a UUID to provide type safety and prevent mixing benchmark IDs
/// with other UUID-based identifiers in the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BenchmarkId(pub Uuid);

impl BenchmarkId {
    /// Create a new random benchmark ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a benchmark ID from a string
    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for BenchmarkId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BenchmarkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for benchmark result rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultId(pub Uuid);

impl ResultId {
    /// Create a new random result ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a result ID from a string
    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for ResultId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ResultId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One ingested email, keyed by its maildir-relative file path
///
/// Immutable after ingestion. Emails whose Date header could not be parsed
/// carry `date = None` and are excluded from sampling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Email {
    /// Normalized file path relative to the maildir root (primary key)
    pub path: String,

    /// Message-ID header, if present
    pub message_id: String,

    /// Parsed Date header; None when missing or unparseable
    pub date: Option<DateTime<Utc>>,

    /// From header address
    pub from_address: String,

    /// To header addresses
    pub to_addresses: Vec<String>,

    /// Cc header addresses
    pub cc_addresses: Vec<String>,

    /// Bcc header addresses
    pub bcc_addresses: Vec<String>,

    /// Subject header
    pub subject: String,

    /// Full header map (last value wins for repeated headers)
    pub headers: std::collections::HashMap<String, String>,

    /// Message body text
    pub body: String,
}

impl Email {
    /// Merged recipient list: to + cc + bcc, falling back to the sender
    /// when all three are empty
    pub fn recipients(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .to_addresses
            .iter()
            .chain(self.cc_addresses.iter())
            .chain(self.bcc_addresses.iter())
            .cloned()
            .collect();
        if out.is_empty() {
            out.push(self.from_address.clone());
        }
        out
    }
}

/// One historical stock price record, keyed by calendar date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockHistoryPoint {
    /// Trading date (primary key)
    pub date: NaiveDate,

    /// Closing price
    pub close: f64,

    /// Daily high
    pub high: f64,

    /// Daily low
    pub low: f64,

    /// Trading volume; 0.0 when the source reported "N/A"
    pub volume: f64,
}

/// A named, reproducible benchmark configuration
///
/// Describes which emails to sample and which model/prompt to score them
/// with. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Benchmark {
    pub id: BenchmarkId,

    /// Human-readable name (e.g. "DeepSeekV3 Tuesdays")
    pub name: String,

    /// Target model identifier passed to the classifier service
    pub model: String,

    /// Free-text description of the sampling subset (e.g. "2 per DAY (ALL)")
    pub subset: String,

    /// Structured sampling policy, kept so a benchmark can be re-run with
    /// identical candidate selection
    pub policy: SamplePolicy,

    /// System prompt sent with every classification request
    pub system_prompt: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lifecycle state of a benchmark result row
///
/// `Failed` is terminal for a single run: the row exhausted its retry budget
/// and is surfaced to the operator. Re-running the benchmark picks such rows
/// up again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Pending,
    InProgress,
    Succeeded,
    Failed,
}

impl ResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultStatus::Pending => "pending",
            ResultStatus::InProgress => "in_progress",
            ResultStatus::Succeeded => "succeeded",
            ResultStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ResultStatus::Pending),
            "in_progress" => Some(ResultStatus::InProgress),
            "succeeded" => Some(ResultStatus::Succeeded),
            "failed" => Some(ResultStatus::Failed),
            _ => None,
        }
    }
}

/// One scored result row linking an email to a benchmark
///
/// Created in `Pending` state at sampling time and mutated in place by the
/// runner. `processed_at` is non-null if and only if classification succeeded
/// and `summary`/`stock_discussion` hold the model's verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedEmail {
    pub id: ResultId,

    /// Referenced email (maildir-relative path)
    pub email_path: String,

    /// Owning benchmark
    pub benchmark_id: BenchmarkId,

    /// Model's one-sentence summary; empty until scored
    pub summary: String,

    /// Model's verdict on whether the email discusses stocks
    pub stock_discussion: bool,

    pub status: ResultStatus,

    /// Number of classification attempts made so far
    pub attempts: u32,

    /// Last classification error, kept for operator triage
    pub last_error: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Set exactly once, when classification succeeds
    pub processed_at: Option<DateTime<Utc>>,
}

impl ProcessedEmail {
    /// Create a fresh pending row for a (benchmark, email) pair
    pub fn pending(benchmark_id: BenchmarkId, email_path: &str) -> Self {
        let now = Utc::now();
        Self {
            id: ResultId::new(),
            email_path: email_path.to_string(),
            benchmark_id,
            summary: String::new(),
            stock_discussion: false,
            status: ResultStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
            processed_at: None,
        }
    }
}
