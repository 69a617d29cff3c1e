//! End-to-end pipeline integration test
//!
//! Exercises the full ingest -> sample -> classify -> export flow against a
//! temporary maildir, a temporary database file, and a scripted classifier.

use async_trait::async_trait;
use mailbench_core::error::Result;
use mailbench_core::sampler::{DayOfWeek, Period, SamplePolicy};
use mailbench_core::{
    import_stock_csv, ingest_emails, BenchmarkRunner, Classifier, Exporter, NewBenchmark,
    ResultStatus, RetryPolicy, SqliteStore, Verdict, DEFAULT_SYSTEM_PROMPT,
};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

/// Deterministic stand-in for the LLM service
struct KeywordClassifier;

#[async_trait]
impl Classifier for KeywordClassifier {
    async fn classify(&self, _system_prompt: &str, body: &str) -> Result<Verdict> {
        Ok(Verdict {
            summary: format!("{} words", body.split_whitespace().count()),
            is_discussing_stocks: body.to_lowercase().contains("stock"),
        })
    }

    fn model(&self) -> &str {
        "keyword-test"
    }
}

fn write_email(root: &std::path::Path, rel: &str, date: &str, from: &str, body: &str) -> PathBuf {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let content = format!(
        "Message-ID: <{rel}@example.com>\nDate: {date}\nFrom: {from}\nTo: desk@example.com\nSubject: note\n\n{body}\n"
    );
    std::fs::write(&path, content).unwrap();
    path
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 2,
        initial_backoff: Duration::from_millis(1),
    }
}

#[tokio::test]
async fn test_full_pipeline_ingest_run_export() {
    let maildir = tempfile::TempDir::new().unwrap();
    let results = tempfile::TempDir::new().unwrap();
    let db_dir = tempfile::TempDir::new().unwrap();

    // Three emails on the same day; day cap of 2 keeps the earliest two
    write_email(
        maildir.path(),
        "allen-p/sent/1.",
        "Mon, 14 May 2001 09:00:00 -0000",
        "phillip.allen@example.com",
        "The stock price looks strong this quarter.",
    );
    write_email(
        maildir.path(),
        "allen-p/sent/2.",
        "Mon, 14 May 2001 11:00:00 -0000",
        "phillip.allen@example.com",
        "Lunch at noon?",
    );
    write_email(
        maildir.path(),
        "allen-p/sent/3.",
        "Mon, 14 May 2001 15:00:00 -0000",
        "phillip.allen@example.com",
        "Afternoon recap attached.",
    );

    let store = SqliteStore::open(db_dir.path().join("pipeline.db")).unwrap();

    let report = ingest_emails(&store, maildir.path()).unwrap();
    assert_eq!(report.parsed, 3);

    let mut csv_file = tempfile::NamedTempFile::new().unwrap();
    csv_file
        .write_all(b"Date,Close,High,Low,Volume\n05/11/2001,42.5,43.0,41.0,1000\n")
        .unwrap();
    assert_eq!(import_stock_csv(&store, csv_file.path()).unwrap(), 1);

    let classifier = KeywordClassifier;
    let runner = BenchmarkRunner::new(&store, &classifier, fast_retry());
    let run = runner
        .create_and_run(NewBenchmark {
            name: "pipeline test".into(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            policy: SamplePolicy::new(Period::Day, 2, DayOfWeek::All),
        })
        .await
        .unwrap();

    assert_eq!(run.candidates, 2);
    assert_eq!(run.succeeded, 2);
    assert_eq!(run.failed, 0);

    let rows = store.results_for_benchmark(run.benchmark_id).unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.status == ResultStatus::Succeeded));

    let exporter = Exporter::new(&store, maildir.path(), results.path());
    let summary = exporter.export(run.benchmark_id).unwrap();
    assert_eq!(summary.rows, 2);
    assert_eq!(summary.skipped_unscored, 0);
    assert_eq!(summary.missing_files, 0);

    // The table carries the 05/11 close for both 05/14 emails and the
    // classifier's verdict per row
    let mut reader = csv::Reader::from_path(summary.dir.join("benchmark.csv")).unwrap();
    let records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(records.len(), 2);
    assert_eq!(&records[0][0], "phillip.allen@example.com");
    assert_eq!(&records[0][4], "42.5");
    assert_eq!(&records[0][5], "true");
    assert_eq!(&records[1][5], "false");

    assert!(summary.dir.join("benchmark_info.json").exists());
    assert!(summary.dir.join("emails.zip").exists());
}

#[tokio::test]
async fn test_rerun_is_idempotent_across_store_reopen() {
    let maildir = tempfile::TempDir::new().unwrap();
    let db_dir = tempfile::TempDir::new().unwrap();
    let db_path = db_dir.path().join("resume.db");

    write_email(
        maildir.path(),
        "m/1.",
        "Tue, 15 May 2001 09:00:00 -0000",
        "a@example.com",
        "stock chatter",
    );

    let benchmark_id = {
        let store = SqliteStore::open(&db_path).unwrap();
        ingest_emails(&store, maildir.path()).unwrap();

        let classifier = KeywordClassifier;
        let runner = BenchmarkRunner::new(&store, &classifier, fast_retry());
        let run = runner
            .create_and_run(NewBenchmark {
                name: "resume test".into(),
                system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
                policy: SamplePolicy::new(Period::All, 0, DayOfWeek::All),
            })
            .await
            .unwrap();
        assert_eq!(run.succeeded, 1);
        run.benchmark_id
    };

    // Reopen and re-run: the stored policy drives sampling, scored rows skip
    let store = SqliteStore::open(&db_path).unwrap();
    let classifier = KeywordClassifier;
    let runner = BenchmarkRunner::new(&store, &classifier, fast_retry());
    let rerun = runner.run(benchmark_id).await.unwrap();

    assert_eq!(rerun.skipped, 1);
    assert_eq!(rerun.succeeded, 0);
    assert_eq!(store.results_for_benchmark(benchmark_id).unwrap().len(), 1);
}
