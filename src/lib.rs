//! Mailbench - Email Corpus Stock-Discussion Benchmark Pipeline
//!
//! A Rust pipeline for benchmarking language models on email classification:
//! - Maildir-style email corpus and stock price history ingestion
//! - Periodic windowed sampling (hour/day/week/month buckets, per-period caps,
//!   weekday filters)
//! - LLM-backed classification of each sampled email ("is it discussing
//!   stocks?") with bounded retries
//! - CSV + zip export of scored benchmarks
//!
//! # Architecture
//!
//! The system is organized into several layers:
//! - **Types**: Core data structures (Email, Benchmark, ProcessedEmail, etc.)
//! - **Storage**: SQLite record store
//! - **Ingest**: Raw email parsing and stock CSV import
//! - **Sampler**: Periodic windowing policy
//! - **Services**: LLM classifier client
//! - **Runner / Export**: Benchmark orchestration and artifact export
//!
//! # Example
//!
//! ```ignore
//! use mailbench_core::{
//!     BenchmarkRunner, ClassifierConfig, NewBenchmark, OllamaClassifier,
//!     RetryPolicy, SamplePolicy, SqliteStore,
//! };
//! use mailbench_core::sampler::{DayOfWeek, Period};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = SqliteStore::open("mailbench.db")?;
//!     let classifier = OllamaClassifier::new(ClassifierConfig {
//!         base_url: "http://localhost:11434".to_string(),
//!         model: "llama3".to_string(),
//!     });
//!
//!     let runner = BenchmarkRunner::new(&store, &classifier, RetryPolicy::default());
//!     let report = runner
//!         .create_and_run(NewBenchmark {
//!             name: "llama3 tuesdays".to_string(),
//!             system_prompt: mailbench_core::DEFAULT_SYSTEM_PROMPT.to_string(),
//!             policy: SamplePolicy::new(Period::Day, 2, DayOfWeek::Tuesday),
//!         })
//!         .await?;
//!
//!     println!("{} scored, {} failed", report.succeeded, report.failed);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod export;
pub mod ingest;
pub mod runner;
pub mod sampler;
pub mod services;
pub mod storage;
pub mod types;

// Re-export commonly used types
pub use config::Settings;
pub use error::{MailbenchError, Result};
pub use export::{ExportSummary, Exporter};
pub use ingest::{import_stock_csv, ingest_emails, IngestReport};
pub use runner::{BenchmarkRunner, NewBenchmark, RetryPolicy, RunReport, DEFAULT_SYSTEM_PROMPT};
pub use sampler::{sample, SamplePolicy};
pub use services::{Classifier, ClassifierConfig, OllamaClassifier, Verdict};
pub use storage::SqliteStore;
pub use types::{
    Benchmark, BenchmarkId, Email, ProcessedEmail, ResultId, ResultStatus, StockHistoryPoint,
};
