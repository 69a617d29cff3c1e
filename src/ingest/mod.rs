//! Corpus ingestion
//!
//! Bulk loaders for the two source datasets: raw email files from a maildir
//! tree and the stock price history CSV. Both recover locally from bad
//! records (skip-and-continue) to maximize data captured from an imperfect
//! corpus.

pub mod email;
pub mod stocks;

pub use email::{ingest_emails, parse_email_file, IngestReport};
pub use stocks::import_stock_csv;
