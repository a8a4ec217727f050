//! RFC 5322 header fields.
//!
//! A header field is a field name, a colon, and a field body. Field names are
//! printable US-ASCII (33..=126) excluding the colon; the body may not carry
//! bare CR or LF (folding is applied at serialization time, never stored).

use std::fmt;

use crate::error::{MailieError, Result};
use crate::model::policy::Policy;

/// A single `name: value` header field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailHeader {
    name: String,
    value: String,
}

impl EmailHeader {
    /// Separator between the field name and the field body.
    pub const DELIMITER: char = ':';

    /// Build a header from an explicit name and value.
    ///
    /// Surrounding whitespace is trimmed from both. The name must be non-empty
    /// and free of colons; the value must not contain CR or LF.
    pub fn new(name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let name = name.as_ref().trim();
        let value = value.as_ref().trim();

        if name.is_empty() {
            return Err(MailieError::InvalidHeader("empty field name".into()));
        }
        if name.contains(Self::DELIMITER) {
            return Err(MailieError::InvalidHeader(format!(
                "field name '{name}' contains a colon"
            )));
        }
        if value.contains(['\r', '\n']) {
            return Err(MailieError::InvalidHeader(format!(
                "value of '{name}' contains a line break"
            )));
        }

        Ok(Self {
            name: name.to_string(),
            value: value.to_string(),
        })
    }

    /// Parse a `name:value` string, splitting on the first colon only.
    pub fn from_string(header: &str) -> Result<Self> {
        let (name, value) = header.split_once(Self::DELIMITER).ok_or_else(|| {
            MailieError::InvalidHeader(format!("'{header}' has no ':' delimiter"))
        })?;
        Self::new(name, value)
    }

    /// Check the field name against RFC 5322 `ftext` when the policy is strict.
    pub fn check(&self, policy: Policy) -> Result<()> {
        if policy.raise_on_defect() && !is_ftext(&self.name) {
            return Err(MailieError::InvalidHeader(format!(
                "field name '{}' is not printable US-ASCII",
                self.name
            )));
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Case-insensitive field-name comparison.
    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    /// Split into `(name, value)`.
    pub fn into_parts(self) -> (String, String) {
        (self.name, self.value)
    }
}

impl fmt::Display for EmailHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.value)
    }
}

impl TryFrom<&str> for EmailHeader {
    type Error = MailieError;

    fn try_from(value: &str) -> Result<Self> {
        Self::from_string(value)
    }
}

impl TryFrom<(&str, &str)> for EmailHeader {
    type Error = MailieError;

    fn try_from((name, value): (&str, &str)) -> Result<Self> {
        Self::new(name, value)
    }
}

fn is_ftext(name: &str) -> bool {
    name.bytes().all(|b| (33..=126).contains(&b) && b != b':')
}

/// An ordered header collection.
///
/// Lookups are case-insensitive and duplicates coexist until explicitly
/// replaced or removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    headers: Vec<EmailHeader>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a header, keeping any existing ones with the same name.
    pub fn push(&mut self, header: EmailHeader) {
        self.headers.push(header);
    }

    /// Value of the first header with `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.is_named(name))
            .map(|h| h.value())
    }

    /// Values of every header with `name`, in order.
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|h| h.is_named(name))
            .map(|h| h.value())
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.headers.iter().any(|h| h.is_named(name))
    }

    /// Replace the first header with the same name in place, or append it.
    ///
    /// Later duplicates are dropped so exactly one instance remains.
    pub fn replace(&mut self, header: EmailHeader) {
        match self.headers.iter().position(|h| h.is_named(header.name())) {
            Some(pos) => {
                let name = header.name().to_string();
                self.headers[pos] = header;
                let mut index = 0;
                self.headers.retain(|h| {
                    let keep = index <= pos || !h.is_named(&name);
                    index += 1;
                    keep
                });
            }
            None => self.headers.push(header),
        }
    }

    /// Remove every header with `name`, returning how many were removed.
    pub fn remove_all(&mut self, name: &str) -> usize {
        let before = self.headers.len();
        self.headers.retain(|h| !h.is_named(name));
        before - self.headers.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EmailHeader> {
        self.headers.iter()
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

impl<'a> IntoIterator for &'a HeaderMap {
    type Item = &'a EmailHeader;
    type IntoIter = std::slice::Iter<'a, EmailHeader>;

    fn into_iter(self) -> Self::IntoIter {
        self.headers.iter()
    }
}

impl FromIterator<EmailHeader> for HeaderMap {
    fn from_iter<T: IntoIterator<Item = EmailHeader>>(iter: T) -> Self {
        Self {
            headers: iter.into_iter().collect(),
        }
    }
}
