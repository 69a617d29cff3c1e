//! Storage layer for the mailbench pipeline
//!
//! Provides the record store used by every pipeline stage: emails, stock
//! price history, benchmark definitions, and per-email benchmark results.
//! The store handle is constructed once and passed into each component.

pub mod sqlite;

pub use sqlite::SqliteStore;
