//! Raw email file parsing and bulk ingestion
//!
//! Parses RFC 2822-style message files: a header block of possibly folded
//! lines, a blank line, then the body. Files are read lossily so messages
//! with broken encodings still ingest. A missing or unparseable Date header
//! is not an error; the email is stored with no timestamp and excluded from
//! sampling.

use crate::error::{MailbenchError, Result};
use crate::storage::SqliteStore;
use crate::types::Email;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};
use walkdir::WalkDir;

/// Outcome of a corpus ingestion pass
#[derive(Debug, Clone, Copy)]
pub struct IngestReport {
    /// Files successfully parsed and stored
    pub parsed: usize,

    /// Regular files encountered under the root
    pub total: usize,
}

/// Parse one raw email file into an [`Email`]
///
/// The returned record is keyed by the file's path relative to `root`.
pub fn parse_email_file(root: &Path, path: &Path) -> Result<Email> {
    let bytes = std::fs::read(path)?;
    let text = String::from_utf8_lossy(&bytes);

    let relative = path
        .strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/");

    let (headers, body) = split_message(&text);
    let header_map = parse_headers(headers);

    let get = |name: &str| -> String {
        header_map
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
            .unwrap_or_default()
    };

    Ok(Email {
        path: relative,
        message_id: get("Message-ID"),
        date: parse_date(&get("Date")),
        from_address: get("From"),
        to_addresses: split_addresses(&get("To")),
        cc_addresses: split_addresses(&get("Cc")),
        bcc_addresses: split_addresses(&get("Bcc")),
        subject: get("Subject"),
        headers: header_map,
        body: body.to_string(),
    })
}

/// Split a message into its header block and body at the first blank line
fn split_message(text: &str) -> (&str, &str) {
    for sep in ["\r\n\r\n", "\n\n"] {
        if let Some(idx) = text.find(sep) {
            return (&text[..idx], &text[idx + sep.len()..]);
        }
    }
    // Headers only, no body
    (text, "")
}

/// Parse a header block, unfolding continuation lines
///
/// Repeated headers keep the last value.
fn parse_headers(block: &str) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    let mut current: Option<(String, String)> = None;

    for line in block.lines() {
        if line.starts_with(' ') || line.starts_with('\t') {
            // Folded continuation of the previous header
            if let Some((_, value)) = current.as_mut() {
                value.push(' ');
                value.push_str(line.trim());
            }
            continue;
        }
        if let Some((name, value)) = current.take() {
            headers.insert(name, value);
        }
        if let Some((name, value)) = line.split_once(':') {
            current = Some((name.trim().to_string(), value.trim().to_string()));
        }
    }
    if let Some((name, value)) = current {
        headers.insert(name, value);
    }
    headers
}

/// Parse an RFC 2822 Date header, tolerating a trailing timezone comment
/// like "(PDT)"
fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    let without_comment = match trimmed.find('(') {
        Some(idx) => trimmed[..idx].trim_end(),
        None => trimmed,
    };
    DateTime::parse_from_rfc2822(without_comment)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Split an address header on commas and whitespace
fn split_addresses(value: &str) -> Vec<String> {
    value
        .replace(',', " ")
        .split_whitespace()
        .map(|s| s.to_string())
        .collect()
}

/// Walk the maildir tree and ingest every regular file
///
/// Per-file parse errors are logged and skipped; the whole batch is
/// committed in one transaction.
pub fn ingest_emails(store: &SqliteStore, root: &Path) -> Result<IngestReport> {
    if !root.is_dir() {
        return Err(MailbenchError::Other(format!(
            "Maildir root is not a directory: {}",
            root.display()
        )));
    }

    let mut emails = Vec::new();
    let mut total = 0usize;

    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        total += 1;
        match parse_email_file(root, entry.path()) {
            Ok(email) => emails.push(email),
            Err(e) => {
                warn!("Error parsing email file {}: {}", entry.path().display(), e);
            }
        }
    }

    store.insert_emails(&emails)?;
    info!("Parsed {} of {} emails", emails.len(), total);

    Ok(IngestReport {
        parsed: emails.len(),
        total,
    })
}
