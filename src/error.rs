//! Centralized error types for mailie.

use std::collections::BTreeMap;
use std::path::PathBuf;

use thiserror::Error;

use crate::client::response::SmtpError;

/// All errors produced by the mailie library.
#[derive(Error, Debug)]
pub enum MailieError {
    /// An attachment path is neither a regular file nor a directory.
    #[error("path: {} was not a directory or file.", .path.display())]
    FilePathNotAttachment { path: PathBuf },

    /// An attachment directory holds no attachable files.
    #[error("Directory: {} does not contain any suitable files", .path.display())]
    EmptyAttachmentFolder { path: PathBuf },

    /// I/O error with the associated file path.
    #[error("I/O error reading '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A recipients file is not valid CSV.
    #[error("Could not read recipients from '{}': {source}", .path.display())]
    Csv { path: PathBuf, source: csv::Error },

    /// A header could not be built from the supplied name/value.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// The requested body charset is unknown.
    #[error("Unsupported charset: {0}")]
    UnsupportedCharset(String),

    /// The SMTP delegate reported a failure.
    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    /// An envelope address could not be used for the SMTP conversation.
    #[error("Invalid envelope address '{address}': {source}")]
    InvalidAddress {
        address: String,
        source: lettre::address::AddressError,
    },

    /// The server refused the recipients of a message.
    #[error("Recipients refused: {}", .refused.keys().cloned().collect::<Vec<_>>().join(", "))]
    RecipientsRefused {
        refused: BTreeMap<String, SmtpError>,
    },

    /// The message needs an SMTP extension the server does not advertise.
    #[error("Not supported by server: {0}")]
    NotSupported(String),

    /// STARTTLS was requested but the server does not offer it.
    #[error("StartTLS not supported on: {host}:{port}")]
    StartTlsNotSupported { host: String, port: u16 },

    /// A send was attempted on a client that has been closed.
    #[error("Cannot send mail, this client has been closed.  Open a new instance.")]
    ClientClosed,

    /// Configuration could not be loaded or applied.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Convenience alias for `Result<T, MailieError>`.
pub type Result<T> = std::result::Result<T, MailieError>;

impl MailieError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// `true` for every problem raised while resolving attachments.
    pub fn is_invalid_attachment(&self) -> bool {
        matches!(
            self,
            Self::FilePathNotAttachment { .. } | Self::EmptyAttachmentFolder { .. } | Self::Io { .. }
        )
    }

    /// `true` for every failure raised around the SMTP conversation.
    pub fn is_smtp(&self) -> bool {
        matches!(
            self,
            Self::Smtp(_)
                | Self::InvalidAddress { .. }
                | Self::RecipientsRefused { .. }
                | Self::NotSupported(_)
                | Self::StartTlsNotSupported { .. }
                | Self::ClientClosed
        )
    }
}
