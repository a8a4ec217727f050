//! Address-list and header-list helpers shared by the builder and the CLI.

use std::path::Path;

use crate::error::{MailieError, Result};
use crate::model::header::EmailHeader;

/// Anything that can stand in for "one address or many".
pub trait IntoAddressList {
    fn into_address_list(self) -> Vec<String>;
}

impl IntoAddressList for &str {
    fn into_address_list(self) -> Vec<String> {
        vec![self.to_string()]
    }
}

impl IntoAddressList for String {
    fn into_address_list(self) -> Vec<String> {
        vec![self]
    }
}

impl IntoAddressList for &String {
    fn into_address_list(self) -> Vec<String> {
        vec![self.clone()]
    }
}

impl<S: AsRef<str>> IntoAddressList for Vec<S> {
    fn into_address_list(self) -> Vec<String> {
        self.iter().map(|s| s.as_ref().to_string()).collect()
    }
}

impl<S: AsRef<str>> IntoAddressList for &[S] {
    fn into_address_list(self) -> Vec<String> {
        self.iter().map(|s| s.as_ref().to_string()).collect()
    }
}

impl<S: AsRef<str>, const N: usize> IntoAddressList for [S; N] {
    fn into_address_list(self) -> Vec<String> {
        self.iter().map(|s| s.as_ref().to_string()).collect()
    }
}

impl<T: IntoAddressList> IntoAddressList for Option<T> {
    fn into_address_list(self) -> Vec<String> {
        self.map(IntoAddressList::into_address_list)
            .unwrap_or_default()
    }
}

/// Normalize one address or many into a list without duplicates.
///
/// First occurrences win, so the output order is deterministic.
pub fn emails_to_list(emails: impl IntoAddressList) -> Vec<String> {
    dedup(emails.into_address_list())
}

/// Remove duplicates, keeping the first occurrence of each entry.
pub fn dedup(items: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

/// Split `name:value` strings into `[name, value]` pairs on the first colon.
pub fn split_headers_per_rfc<S: AsRef<str>>(headers: &[S]) -> Result<Vec<[String; 2]>> {
    headers
        .iter()
        .map(|h| {
            let (name, value) = EmailHeader::from_string(h.as_ref())?.into_parts();
            Ok([name, value])
        })
        .collect()
}

/// Expand a recipient argument that may name a CSV file.
///
/// If `recipient_or_path` is an existing file, every cell of every record is
/// returned (RFC 4180 quoting honoured, trimmed, empty cells skipped).
/// Otherwise the trimmed argument itself is returned as the only address.
pub fn unpack_recipients_from_csv(recipient_or_path: &str) -> Result<Vec<String>> {
    let trimmed = recipient_or_path.trim();
    let path = Path::new(trimmed);
    if !path.is_file() {
        return Ok(vec![trimmed.to_string()]);
    }

    let csv_error = |source| MailieError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(csv_error)?;

    let mut results = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_error)?;
        results.extend(
            record
                .iter()
                .map(str::trim)
                .filter(|cell| !cell.is_empty())
                .map(str::to_string),
        );
    }
    tracing::debug!(path = %path.display(), count = results.len(), "Read recipients file");
    Ok(results)
}
