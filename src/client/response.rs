//! Results of a send: the final server reply plus per-recipient refusals.

use std::collections::BTreeMap;

use lettre::transport::smtp::response::{Code, Response};
use serde::Serialize;

/// A single negative server reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SmtpError {
    /// Three-digit reply code, absent when the failure had no server reply.
    pub code: Option<u16>,
    pub message: String,
}

impl SmtpError {
    pub(crate) fn from_delegate(err: &lettre::transport::smtp::Error) -> Self {
        Self {
            code: err.status().and_then(code_number),
            message: err.to_string(),
        }
    }
}

impl std::fmt::Display for SmtpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "{code} {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Outcome of one delivered message.
///
/// A message counts as delivered once at least one recipient was accepted;
/// refused recipients are listed in `refused` rather than failing the send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SmtpResponse {
    /// Reply code to the end of `DATA`.
    pub code: u16,
    /// Reply text to the end of `DATA`, one line per reply line.
    pub message: String,
    pub accepted: Vec<String>,
    pub refused: BTreeMap<String, SmtpError>,
    /// Whether the send required every recipient to be accepted.
    pub enforce_all: bool,
}

impl SmtpResponse {
    pub(crate) fn new(
        reply: &Response,
        accepted: Vec<String>,
        refused: BTreeMap<String, SmtpError>,
        enforce_all: bool,
    ) -> Self {
        Self {
            code: code_number(reply.code()).unwrap_or_default(),
            message: reply.message().collect::<Vec<_>>().join("\n"),
            accepted,
            refused,
            enforce_all,
        }
    }

    /// `true` when no recipient was refused.
    pub fn all_accepted(&self) -> bool {
        self.refused.is_empty()
    }
}

/// Per-send overrides.
///
/// The envelope normally comes from the message itself; `from_addr` and
/// `to_addrs` replace it for one send without touching the headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendOptions {
    pub from_addr: Option<String>,
    pub to_addrs: Option<Vec<String>>,
    /// Fail the send if any single recipient is refused.
    pub enforce_all: bool,
}

impl SendOptions {
    pub fn from_addr(mut self, from: impl Into<String>) -> Self {
        self.from_addr = Some(from.into());
        self
    }

    pub fn to_addrs(mut self, to: impl crate::utility::IntoAddressList) -> Self {
        self.to_addrs = Some(crate::utility::emails_to_list(to));
        self
    }

    pub fn enforce_all(mut self, enforce: bool) -> Self {
        self.enforce_all = enforce;
        self
    }
}

/// Numeric value of a reply code (`Code` only exposes its digits through `Display`).
pub(crate) fn code_number(code: Code) -> Option<u16> {
    code.to_string().parse().ok()
}
