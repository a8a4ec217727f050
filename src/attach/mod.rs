//! Attachment resolution: turn caller-supplied paths into in-memory attachments.
//!
//! Resolution is pluggable through [`Attachable`]. [`AttachmentStrategy`] is the
//! built-in, non-recursive strategy; [`RecursiveStrategy`] also descends into
//! subdirectories.

use std::path::{Path, PathBuf};

use crate::error::{MailieError, Result};
use crate::model::attachment::FileAttachment;

/// A capability that resolves paths into attachments.
pub trait Attachable {
    /// Resolve every path, in the order given.
    ///
    /// An empty slice yields an empty list.
    fn resolve(&self, paths: &[PathBuf]) -> Result<Vec<FileAttachment>>;
}

/// Non-recursive strategy.
///
/// A file path yields one attachment. A directory path yields one attachment
/// per regular file directly inside it (sorted by name); subdirectories are
/// skipped. A directory without any regular files is an error, as is a path
/// that is neither a file nor a directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttachmentStrategy;

impl Attachable for AttachmentStrategy {
    fn resolve(&self, paths: &[PathBuf]) -> Result<Vec<FileAttachment>> {
        resolve_with(paths, false)
    }
}

/// Like [`AttachmentStrategy`], but walks subdirectories depth-first.
///
/// The "empty folder" check applies to the top-level directory as a whole:
/// it fails only when no file is found anywhere beneath it.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecursiveStrategy;

impl Attachable for RecursiveStrategy {
    fn resolve(&self, paths: &[PathBuf]) -> Result<Vec<FileAttachment>> {
        resolve_with(paths, true)
    }
}

fn resolve_with(paths: &[PathBuf], recursive: bool) -> Result<Vec<FileAttachment>> {
    let mut files = Vec::new();

    for raw in paths {
        let path = normalize(raw);
        if path.is_file() {
            files.push(FileAttachment::from_path(&path)?);
        } else if path.is_dir() {
            let entries = list_files(&path, recursive)?;
            if entries.is_empty() {
                return Err(MailieError::EmptyAttachmentFolder { path });
            }
            tracing::debug!(
                dir = %path.display(),
                count = entries.len(),
                "Attaching directory contents"
            );
            for entry in entries {
                files.push(FileAttachment::from_path(&entry)?);
            }
        } else {
            return Err(MailieError::FilePathNotAttachment { path });
        }
    }

    Ok(files)
}

/// Drop redundant separators and trailing slashes (`foo/bar/` → `foo/bar`).
fn normalize(path: &Path) -> PathBuf {
    let normalized: PathBuf = path.components().collect();
    if normalized.as_os_str().is_empty() {
        path.to_path_buf()
    } else {
        normalized
    }
}

/// Regular files in `dir`, sorted by file name. Subdirectories are walked
/// (after the files of the current level) when `recursive` is set.
fn list_files(dir: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    let read = std::fs::read_dir(dir).map_err(|e| MailieError::io(dir, e))?;

    let mut files = Vec::new();
    let mut subdirs = Vec::new();
    for entry in read {
        let entry = entry.map_err(|e| MailieError::io(dir, e))?;
        let path = entry.path();
        if path.is_file() {
            files.push(path);
        } else if recursive && path.is_dir() {
            subdirs.push(path);
        }
    }

    files.sort();
    subdirs.sort();
    for sub in subdirs {
        files.extend(list_files(&sub, true)?);
    }
    Ok(files)
}
