//! Configuration for the mailbench pipeline
//!
//! Settings are layered: built-in defaults, then an optional `mailbench.toml`
//! in the working directory, then `MAILBENCH_*` environment variables. The
//! resulting [`Settings`] value is constructed once at startup and passed
//! explicitly into each component; there is no ambient global state.

use crate::error::Result;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

/// Classifier service settings
#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierSettings {
    /// Base URL of the Ollama-compatible chat API
    pub base_url: String,

    /// Default model identifier for new benchmarks
    pub model: String,
}

/// Runner retry policy
#[derive(Debug, Clone, Deserialize)]
pub struct RunnerSettings {
    /// Maximum classification attempts per email before the row is marked failed
    pub max_attempts: u32,

    /// Backoff before the second attempt; doubles on each further failure
    pub initial_backoff_ms: u64,
}

/// Top-level settings for the pipeline
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// SQLite database path
    pub db_path: PathBuf,

    /// Root of the raw email corpus
    pub maildir: PathBuf,

    /// Stock price history CSV file
    pub stock_csv: PathBuf,

    /// Directory export bundles are written into
    pub results_dir: PathBuf,

    pub classifier: ClassifierSettings,

    pub runner: RunnerSettings,
}

impl Settings {
    /// Load settings from defaults, `mailbench.toml`, and the environment
    ///
    /// Environment variables use a double underscore for nesting, e.g.
    /// `MAILBENCH_CLASSIFIER__MODEL=llama3`.
    pub fn load() -> Result<Self> {
        let settings = Config::builder()
            .set_default("db_path", "mailbench.db")?
            .set_default("maildir", "maildir")?
            .set_default("stock_csv", "stock_history.csv")?
            .set_default("results_dir", "results")?
            .set_default("classifier.base_url", "http://localhost:11434")?
            .set_default("classifier.model", "llama3")?
            .set_default("runner.max_attempts", 5)?
            .set_default("runner.initial_backoff_ms", 500)?
            .add_source(File::with_name("mailbench").required(false))
            .add_source(Environment::with_prefix("MAILBENCH").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
