//! File attachments pulled into memory.
//!
//! The payload is read once, when the attachment is resolved. Nothing touches
//! the disk again after that, including serialization.

use std::path::{Path, PathBuf};

use crate::error::{MailieError, Result};

/// Extensions that describe a content *encoding* rather than a content type.
/// Files carrying one are sent as an opaque bag of bits.
const ENCODING_EXTENSIONS: [&str; 5] = ["gz", "bz2", "xz", "Z", "br"];

/// One file's content, ready to be embedded in a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAttachment {
    /// Path the file was read from.
    pub file_path: PathBuf,
    /// Display name (the final path component).
    pub file_name: String,
    /// Final extension including the dot (e.g. `".png"`), empty if none.
    pub file_extension: String,
    /// Raw file contents.
    pub data: Vec<u8>,
}

impl FileAttachment {
    /// Read `path` fully into memory.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|e| MailieError::io(path, e))?;
        tracing::debug!(path = %path.display(), size = data.len(), "Read attachment");
        Ok(Self::from_bytes(path, data))
    }

    /// Wrap bytes that were already loaded, naming them after `path`.
    pub fn from_bytes(path: impl Into<PathBuf>, data: Vec<u8>) -> Self {
        let file_path = path.into();
        let file_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file_extension = file_path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();

        Self {
            file_path,
            file_name,
            file_extension,
            data,
        }
    }

    /// The `(maintype, subtype)` guessed from the file extension.
    ///
    /// Unknown extensions, and extensions implying a content encoding
    /// (`.gz`, `.bz2`, …), yield `application/octet-stream`.
    pub fn mime_types(&self) -> (String, String) {
        let encoded = self
            .file_path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| ENCODING_EXTENSIONS.contains(&e));

        let guessed = if encoded {
            None
        } else {
            mime_guess::from_path(&self.file_path).first_raw()
        };

        let (main, sub) = guessed
            .and_then(|ct| ct.split_once('/'))
            .unwrap_or(("application", "octet-stream"));
        (main.to_string(), sub.to_string())
    }

    /// `maintype/subtype` as a single string.
    pub fn content_type(&self) -> String {
        let (main, sub) = self.mime_types();
        format!("{main}/{sub}")
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_from_path() {
        let att = FileAttachment::from_bytes("/tmp/report.final.pdf", vec![1, 2, 3]);
        assert_eq!(att.file_name, "report.final.pdf");
        assert_eq!(att.file_extension, ".pdf");
        assert_eq!(att.size(), 3);
    }

    #[test]
    fn test_known_type() {
        let att = FileAttachment::from_bytes("image.png", vec![]);
        assert_eq!(
            att.mime_types(),
            ("image".to_string(), "png".to_string())
        );
    }

    #[test]
    fn test_unknown_extension_falls_back() {
        let att = FileAttachment::from_bytes("blob.nothingknown", vec![]);
        assert_eq!(att.content_type(), "application/octet-stream");
        let att = FileAttachment::from_bytes("no_extension", vec![]);
        assert_eq!(att.content_type(), "application/octet-stream");
        assert_eq!(att.file_extension, "");
    }

    #[test]
    fn test_encoding_extension_falls_back() {
        let att = FileAttachment::from_bytes("archive.tar.gz", vec![]);
        assert_eq!(att.content_type(), "application/octet-stream");
    }
}
