//! Mailbench - Email Corpus Stock-Discussion Benchmark Pipeline
//!
//! This is the main entry point for the mailbench CLI, which drives the
//! ingest / sample / classify / export pipeline against a local database
//! and an Ollama-compatible classifier service.

use clap::{Parser, Subcommand};
use mailbench_core::{
    error::Result,
    sampler::{DayOfWeek, Period, SamplePolicy},
    BenchmarkId, BenchmarkRunner, ClassifierConfig, Exporter, NewBenchmark, OllamaClassifier,
    RetryPolicy, Settings, SqliteStore, DEFAULT_SYSTEM_PROMPT,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, Level};
use tracing_subscriber::{self, EnvFilter};

#[derive(Parser)]
#[command(name = "mailbench")]
#[command(about = "Email corpus stock-discussion benchmark pipeline", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Set log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Database path (overrides MAILBENCH_DB_PATH env var and default)
    #[arg(long)]
    db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Drop and recreate all tables
    Reset,

    /// Walk the maildir tree and ingest every email file
    IngestEmails {
        /// Maildir root (overrides configuration)
        #[arg(long)]
        maildir: Option<PathBuf>,
    },

    /// Import the stock price history file, replacing any stored set
    IngestStocks {
        /// Stock history CSV path (overrides configuration)
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Create a benchmark and score its sampled emails
    NewBenchmark {
        /// Human-readable benchmark name
        #[arg(long)]
        name: String,

        /// System prompt sent with every classification request
        #[arg(long, default_value = DEFAULT_SYSTEM_PROMPT)]
        system_prompt: String,

        /// Emails per period; 0 or negative means unlimited
        #[arg(long, default_value = "1")]
        num: i64,

        /// Period unit: hour, day, week, month, or all
        #[arg(long, default_value = "day")]
        per: Period,

        /// Day-of-week filter, e.g. tuesday; "all" disables the filter
        #[arg(long, default_value = "all")]
        dow: DayOfWeek,
    },

    /// Re-run an existing benchmark, skipping already-scored emails
    Run {
        /// Benchmark ID
        #[arg(long)]
        id: String,
    },

    /// Export a scored benchmark to CSV + zip artifacts
    Export {
        /// Benchmark ID
        #[arg(long)]
        id: String,
    },

    /// List stored benchmarks
    Benchmarks,

    /// Show database counts and classifier health
    Status,
}

fn open_store(settings: &Settings, db_path: Option<PathBuf>) -> Result<SqliteStore> {
    let path = db_path
        .or_else(|| std::env::var("MAILBENCH_DB_PATH").ok().map(PathBuf::from))
        .unwrap_or_else(|| settings.db_path.clone());
    SqliteStore::open(path)
}

fn classifier_from(settings: &Settings) -> OllamaClassifier {
    OllamaClassifier::new(ClassifierConfig {
        base_url: settings.classifier.base_url.clone(),
        model: settings.classifier.model.clone(),
    })
}

fn retry_from(settings: &Settings) -> RetryPolicy {
    RetryPolicy {
        max_attempts: settings.runner.max_attempts,
        initial_backoff: Duration::from_millis(settings.runner.initial_backoff_ms),
    }
}

fn parse_id(raw: &str) -> Result<BenchmarkId> {
    Ok(BenchmarkId::from_string(raw)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Use the specified level for mailbench, but WARN for noisy HTTP internals
    let filter = EnvFilter::new(format!(
        "mailbench={},hyper=warn,reqwest=warn",
        level.as_str().to_lowercase()
    ));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    debug!("Mailbench v{} starting...", env!("CARGO_PKG_VERSION"));

    let settings = Settings::load()?;

    match cli.command {
        Commands::Reset => {
            let store = open_store(&settings, cli.db_path)?;
            store.reset()?;
            println!("Database reset");
            Ok(())
        }

        Commands::IngestEmails { maildir } => {
            let store = open_store(&settings, cli.db_path)?;
            let root = maildir.unwrap_or_else(|| settings.maildir.clone());
            let report = mailbench_core::ingest_emails(&store, &root)?;
            println!(
                "Ingested {} of {} files from {}",
                report.parsed,
                report.total,
                root.display()
            );
            Ok(())
        }

        Commands::IngestStocks { file } => {
            let store = open_store(&settings, cli.db_path)?;
            let path = file.unwrap_or_else(|| settings.stock_csv.clone());
            let count = mailbench_core::import_stock_csv(&store, &path)?;
            println!("Imported {} stock prices from {}", count, path.display());
            Ok(())
        }

        Commands::NewBenchmark {
            name,
            system_prompt,
            num,
            per,
            dow,
        } => {
            let store = open_store(&settings, cli.db_path)?;
            let classifier = classifier_from(&settings);
            let runner = BenchmarkRunner::new(&store, &classifier, retry_from(&settings));

            let policy = SamplePolicy::new(per, num, dow);
            println!("Sampling {}", policy.describe());

            let report = runner
                .create_and_run(NewBenchmark {
                    name,
                    system_prompt,
                    policy,
                })
                .await?;
            print_run_report(&report);
            Ok(())
        }

        Commands::Run { id } => {
            let store = open_store(&settings, cli.db_path)?;
            let classifier = classifier_from(&settings);
            let runner = BenchmarkRunner::new(&store, &classifier, retry_from(&settings));

            let report = runner.run(parse_id(&id)?).await?;
            print_run_report(&report);
            Ok(())
        }

        Commands::Export { id } => {
            let store = open_store(&settings, cli.db_path)?;
            let exporter = Exporter::new(&store, &settings.maildir, &settings.results_dir);
            let summary = exporter.export(parse_id(&id)?)?;
            println!(
                "Exported {} rows to {} ({} unscored skipped, {} files missing)",
                summary.rows,
                summary.dir.display(),
                summary.skipped_unscored,
                summary.missing_files
            );
            Ok(())
        }

        Commands::Benchmarks => {
            let store = open_store(&settings, cli.db_path)?;
            let benchmarks = store.list_benchmarks()?;
            if benchmarks.is_empty() {
                println!("No benchmarks stored");
                return Ok(());
            }
            for benchmark in benchmarks {
                println!(
                    "{}  {}  model={}  subset={}  created={}",
                    benchmark.id,
                    benchmark.name,
                    benchmark.model,
                    benchmark.subset,
                    benchmark.created_at.to_rfc3339()
                );
            }
            Ok(())
        }

        Commands::Status => {
            let store = open_store(&settings, cli.db_path)?;
            let classifier = classifier_from(&settings);

            println!("Emails:           {}", store.email_count()?);
            println!("Stock prices:     {}", store.stock_history_count()?);
            println!("Benchmarks:       {}", store.benchmark_count()?);
            println!("Processed emails: {}", store.processed_email_count()?);
            println!(
                "Classifier:       {} ({})",
                settings.classifier.base_url,
                if classifier.is_healthy().await {
                    "healthy"
                } else {
                    "unreachable"
                }
            );
            Ok(())
        }
    }
}

fn print_run_report(report: &mailbench_core::RunReport) {
    println!("Benchmark: {}", report.benchmark_id);
    println!(
        "{} candidates: {} succeeded, {} failed, {} skipped",
        report.candidates, report.succeeded, report.failed, report.skipped
    );
}
