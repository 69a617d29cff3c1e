//! Benchmark orchestration
//!
//! Turns a benchmark definition into a fully-scored set of result rows:
//! create the benchmark, sample candidates, then drive the classifier over
//! each candidate strictly sequentially, committing every outcome before
//! moving on. Classification failures are retried a bounded number of times
//! with exponential backoff; a row that exhausts its budget is marked
//! `failed` and surfaced in the run report instead of blocking the run.

use crate::error::{MailbenchError, Result};
use crate::sampler::{sample, SamplePolicy};
use crate::services::Classifier;
use crate::storage::SqliteStore;
use crate::types::{Benchmark, BenchmarkId, Email, ProcessedEmail, ResultStatus};
use chrono::Utc;
use std::time::Duration;
use tracing::{info, warn};

/// Default system prompt for new benchmarks
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an investigator for the SEC. You specialize in securities fraud. Your job is analyzing emails to determine their nature and whether or not they are discussing stocks, the stock market, stock tickers, stock prices, etc. You will provide a brief (1 sentence) summary of the email's subject matter and flag your best evaluation of whether the email is discussing stocks, stock prices, etc. Your summary should be brief and to the point, without any preamble or conclusion.";

/// Bounded retry policy for classification calls
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Attempts per email before the row is marked failed
    pub max_attempts: u32,

    /// Backoff before the second attempt; doubles after each failure
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(500),
        }
    }
}

/// Parameters for a new benchmark run
#[derive(Debug, Clone)]
pub struct NewBenchmark {
    pub name: String,
    pub system_prompt: String,
    pub policy: SamplePolicy,
}

/// Operator-facing summary of one run
#[derive(Debug, Clone, Copy)]
pub struct RunReport {
    pub benchmark_id: BenchmarkId,

    /// Emails the sampler selected for this benchmark
    pub candidates: usize,

    pub succeeded: usize,

    /// Rows that exhausted the retry budget this run
    pub failed: usize,

    /// Rows already succeeded in a previous run
    pub skipped: usize,
}

/// Drives one benchmark from definition to scored result rows
pub struct BenchmarkRunner<'a> {
    store: &'a SqliteStore,
    classifier: &'a dyn Classifier,
    retry: RetryPolicy,
}

impl<'a> BenchmarkRunner<'a> {
    pub fn new(store: &'a SqliteStore, classifier: &'a dyn Classifier, retry: RetryPolicy) -> Self {
        Self {
            store,
            classifier,
            retry,
        }
    }

    /// Create a benchmark and score its sampled emails
    ///
    /// The benchmark row is committed before any classification work begins
    /// so its identifier is durable even if the run is interrupted.
    pub async fn create_and_run(&self, request: NewBenchmark) -> Result<RunReport> {
        let now = Utc::now();
        let benchmark = Benchmark {
            id: BenchmarkId::new(),
            name: request.name,
            model: self.classifier.model().to_string(),
            subset: request.policy.describe(),
            policy: request.policy,
            system_prompt: request.system_prompt,
            created_at: now,
            updated_at: now,
        };
        self.store.create_benchmark(&benchmark)?;
        info!("Benchmark created with id {}", benchmark.id);

        self.run_benchmark(&benchmark).await
    }

    /// Re-run an existing benchmark
    ///
    /// Samples with the stored policy; emails that already have a succeeded
    /// row are skipped, so re-running is idempotent and resumes interrupted
    /// or partially failed runs.
    pub async fn run(&self, id: BenchmarkId) -> Result<RunReport> {
        let benchmark = self
            .store
            .get_benchmark(id)?
            .ok_or_else(|| MailbenchError::BenchmarkNotFound(id.to_string()))?;
        self.run_benchmark(&benchmark).await
    }

    async fn run_benchmark(&self, benchmark: &Benchmark) -> Result<RunReport> {
        let candidates = sample(self.store.list_dated_emails()?, &benchmark.policy);
        info!(
            "Found {} emails in subset ({})",
            candidates.len(),
            benchmark.subset
        );

        let mut report = RunReport {
            benchmark_id: benchmark.id,
            candidates: candidates.len(),
            succeeded: 0,
            failed: 0,
            skipped: 0,
        };

        for email in &candidates {
            let mut row = match self.store.find_result(benchmark.id, &email.path)? {
                Some(existing) if existing.status == ResultStatus::Succeeded => {
                    report.skipped += 1;
                    continue;
                }
                Some(existing) => existing,
                None => {
                    let row = ProcessedEmail::pending(benchmark.id, &email.path);
                    self.store.create_result(&row)?;
                    row
                }
            };

            if self.score_email(benchmark, email, &mut row).await? {
                report.succeeded += 1;
            } else {
                report.failed += 1;
            }
        }

        info!(
            "Benchmark {} run complete: {} succeeded, {} failed, {} skipped",
            benchmark.id, report.succeeded, report.failed, report.skipped
        );
        Ok(report)
    }

    /// Classify one email with bounded retries; returns whether it succeeded
    async fn score_email(
        &self,
        benchmark: &Benchmark,
        email: &Email,
        row: &mut ProcessedEmail,
    ) -> Result<bool> {
        info!("Processing email {}", email.path);
        row.status = ResultStatus::InProgress;
        row.updated_at = Utc::now();
        self.store.update_result(row)?;

        let mut backoff = self.retry.initial_backoff;
        for attempt in 1..=self.retry.max_attempts {
            row.attempts += 1;
            match self
                .classifier
                .classify(&benchmark.system_prompt, &email.body)
                .await
            {
                Ok(verdict) => {
                    row.summary = verdict.summary;
                    row.stock_discussion = verdict.is_discussing_stocks;
                    row.status = ResultStatus::Succeeded;
                    row.last_error = None;
                    row.processed_at = Some(Utc::now());
                    row.updated_at = Utc::now();
                    self.store.update_result(row)?;
                    info!("{}: {}", email.path, row.summary);
                    return Ok(true);
                }
                Err(e) => {
                    warn!(
                        "Error processing email {} (attempt {}/{}): {}",
                        email.path, attempt, self.retry.max_attempts, e
                    );
                    row.last_error = Some(e.to_string());
                    row.updated_at = Utc::now();
                    self.store.update_result(row)?;
                    if attempt < self.retry.max_attempts {
                        tokio::time::sleep(backoff).await;
                        backoff *= 2;
                    }
                }
            }
        }

        row.status = ResultStatus::Failed;
        row.updated_at = Utc::now();
        self.store.update_result(row)?;
        warn!(
            "Email {} failed after {} attempts; left for manual re-run",
            email.path, row.attempts
        );
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::{DayOfWeek, Period};
    use crate::services::Verdict;
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Classifier that fails a scripted number of times before succeeding
    struct FlakyClassifier {
        failures_per_email: usize,
        calls: AtomicUsize,
    }

    impl FlakyClassifier {
        fn new(failures_per_email: usize) -> Self {
            Self {
                failures_per_email,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Classifier for FlakyClassifier {
        async fn classify(&self, _system_prompt: &str, body: &str) -> Result<Verdict> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call % (self.failures_per_email + 1) < self.failures_per_email {
                return Err(MailbenchError::Classification("scripted failure".into()));
            }
            Ok(Verdict {
                summary: format!("Summary of: {}", body),
                is_discussing_stocks: body.contains("stock"),
            })
        }

        fn model(&self) -> &str {
            "fake-model"
        }
    }

    /// Classifier that always fails
    struct BrokenClassifier;

    #[async_trait]
    impl Classifier for BrokenClassifier {
        async fn classify(&self, _system_prompt: &str, _body: &str) -> Result<Verdict> {
            Err(MailbenchError::Classification("service down".into()))
        }

        fn model(&self) -> &str {
            "fake-model"
        }
    }

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
        }
    }

    fn seed_emails(store: &SqliteStore) {
        let ts = |h: u32| -> DateTime<Utc> { Utc.with_ymd_and_hms(2001, 5, 14, h, 0, 0).unwrap() };
        let email = |path: &str, hour: u32, body: &str| Email {
            path: path.to_string(),
            message_id: String::new(),
            date: Some(ts(hour)),
            from_address: "a@example.com".into(),
            to_addresses: vec!["b@example.com".into()],
            cc_addresses: vec![],
            bcc_addresses: vec![],
            subject: String::new(),
            headers: Default::default(),
            body: body.to_string(),
        };
        store
            .insert_emails(&[
                email("m/1", 9, "stock tips inside"),
                email("m/2", 11, "lunch plans"),
                email("m/3", 15, "afternoon note"),
            ])
            .unwrap();
    }

    fn request(num: i64) -> NewBenchmark {
        NewBenchmark {
            name: "test run".into(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            policy: SamplePolicy::new(Period::Day, num, DayOfWeek::All),
        }
    }

    #[tokio::test]
    async fn test_run_scores_sampled_emails_in_order() {
        let store = SqliteStore::open_in_memory().unwrap();
        seed_emails(&store);

        let classifier = FlakyClassifier::new(0);
        let runner = BenchmarkRunner::new(&store, &classifier, fast_retry(3));
        let report = runner.create_and_run(request(2)).await.unwrap();

        // Day cap of 2 keeps the 09:00 and 11:00 emails, not the 15:00 one
        assert_eq!(report.candidates, 2);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 0);

        let rows = store.results_for_benchmark(report.benchmark_id).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.status == ResultStatus::Succeeded));
        assert!(rows.iter().all(|r| r.processed_at.is_some()));
        assert!(rows[0].stock_discussion);
        assert!(!rows[1].stock_discussion);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let store = SqliteStore::open_in_memory().unwrap();
        seed_emails(&store);

        // Two failures per email, budget of three attempts
        let classifier = FlakyClassifier::new(2);
        let runner = BenchmarkRunner::new(&store, &classifier, fast_retry(3));
        let report = runner.create_and_run(request(1)).await.unwrap();

        assert_eq!(report.succeeded, 1);
        let rows = store.results_for_benchmark(report.benchmark_id).unwrap();
        assert_eq!(rows[0].attempts, 3);
        assert_eq!(rows[0].status, ResultStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_exhausted_budget_marks_row_failed_and_continues() {
        let store = SqliteStore::open_in_memory().unwrap();
        seed_emails(&store);

        let classifier = BrokenClassifier;
        let runner = BenchmarkRunner::new(&store, &classifier, fast_retry(2));
        let report = runner.create_and_run(request(2)).await.unwrap();

        // Both candidates processed despite every call failing
        assert_eq!(report.candidates, 2);
        assert_eq!(report.failed, 2);
        assert_eq!(report.succeeded, 0);

        let rows = store.results_for_benchmark(report.benchmark_id).unwrap();
        assert_eq!(rows.len(), 2);
        for row in rows {
            assert_eq!(row.status, ResultStatus::Failed);
            assert_eq!(row.attempts, 2);
            assert!(row.processed_at.is_none());
            assert!(row.last_error.is_some());
        }
    }

    #[tokio::test]
    async fn test_rerun_skips_succeeded_rows() {
        let store = SqliteStore::open_in_memory().unwrap();
        seed_emails(&store);

        let classifier = FlakyClassifier::new(0);
        let runner = BenchmarkRunner::new(&store, &classifier, fast_retry(3));
        let report = runner.create_and_run(request(2)).await.unwrap();
        assert_eq!(report.succeeded, 2);

        let rerun = runner.run(report.benchmark_id).await.unwrap();
        assert_eq!(rerun.skipped, 2);
        assert_eq!(rerun.succeeded, 0);

        // No duplicate rows created
        let rows = store.results_for_benchmark(report.benchmark_id).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_rerun_picks_up_failed_rows() {
        let store = SqliteStore::open_in_memory().unwrap();
        seed_emails(&store);

        let broken = BrokenClassifier;
        let runner = BenchmarkRunner::new(&store, &broken, fast_retry(1));
        let report = runner.create_and_run(request(1)).await.unwrap();
        assert_eq!(report.failed, 1);

        let healthy = FlakyClassifier::new(0);
        let runner = BenchmarkRunner::new(&store, &healthy, fast_retry(1));
        let rerun = runner.run(report.benchmark_id).await.unwrap();
        assert_eq!(rerun.succeeded, 1);

        let rows = store.results_for_benchmark(report.benchmark_id).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, ResultStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_run_unknown_benchmark_is_not_found() {
        let store = SqliteStore::open_in_memory().unwrap();
        let classifier = BrokenClassifier;
        let runner = BenchmarkRunner::new(&store, &classifier, fast_retry(1));
        let err = runner.run(BenchmarkId::new()).await.unwrap_err();
        assert!(matches!(err, MailbenchError::BenchmarkNotFound(_)));
    }
}
