//! File handles and pipeline working copies.
//!
//! A [`FileHandle`] is a read-only view over "a file somewhere": a path on
//! local disk or a buffer already held in memory. It is what callers hand to
//! [`FileHandler::process`](crate::handler::FileHandler::process) and what
//! storage gateways hand back.
//!
//! A [`WorkingCopy`] is the path-backed value that flows through a strategy
//! chain. Strategies never mutate a working copy in place: every setter
//! consumes the value and returns a new one, so a copy can't be aliased
//! between concurrent variant runs.
//!
//! ## Extensions
//!
//! The extension is never stored. [`FileHandle::extension`] and
//! [`WorkingCopy::extension`] derive it from the name on every call, so
//! renaming a file is the only way to change its extension.

use std::borrow::Cow;
use std::fs;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("File '{0}' is not deletable")]
    NotDeletable(String),
    #[error("Failed to delete {}: {source}", path.display())]
    DeleteFailed {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
enum Content {
    Local(PathBuf),
    Memory(Arc<[u8]>),
}

/// Read-only view over a file on disk or in memory.
#[derive(Debug, Clone)]
pub struct FileHandle {
    content: Content,
    name: Option<String>,
    mime_type: Option<String>,
    size: u64,
    uploaded: bool,
}

impl FileHandle {
    /// Handle for an existing local file. The name defaults to the basename.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self, FileError> {
        let path = path.into();
        let meta = fs::metadata(&path).map_err(|e| not_found_or_io(&path, e))?;
        Ok(Self {
            name: basename(&path),
            size: meta.len(),
            content: Content::Local(path),
            mime_type: None,
            uploaded: false,
        })
    }

    /// Handle over bytes held in memory.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        let bytes: Vec<u8> = bytes.into();
        Self {
            size: bytes.len() as u64,
            content: Content::Memory(bytes.into()),
            name: None,
            mime_type: None,
            uploaded: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Mark the handle as coming straight from an upload form.
    pub fn uploaded(mut self, uploaded: bool) -> Self {
        self.uploaded = uploaded;
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    /// Extension derived from the name, without the leading dot.
    pub fn extension(&self) -> Option<&str> {
        self.name.as_deref().and_then(extension_of)
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_uploaded(&self) -> bool {
        self.uploaded
    }

    /// Local path, `None` for in-memory handles.
    pub fn path(&self) -> Option<&Path> {
        match &self.content {
            Content::Local(path) => Some(path),
            Content::Memory(_) => None,
        }
    }

    /// The full file contents.
    pub fn content(&self) -> Result<Cow<'_, [u8]>, FileError> {
        match &self.content {
            Content::Local(path) => Ok(Cow::Owned(read_existing(path)?)),
            Content::Memory(bytes) => Ok(Cow::Borrowed(&bytes[..])),
        }
    }

    /// Open a reader over the contents. The stream closes when dropped.
    pub fn open_stream(&self) -> Result<Box<dyn Read + Send>, FileError> {
        match &self.content {
            Content::Local(path) => {
                let file = fs::File::open(path).map_err(|e| not_found_or_io(path, e))?;
                Ok(Box::new(std::io::BufReader::new(file)))
            }
            Content::Memory(bytes) => Ok(Box::new(Cursor::new(bytes.clone()))),
        }
    }

    /// Copy the contents to `dest`, replacing anything already there.
    pub fn copy_to(&self, dest: &Path) -> Result<(), FileError> {
        match &self.content {
            Content::Local(path) => {
                fs::copy(path, dest).map_err(|e| not_found_or_io(path, e))?;
            }
            Content::Memory(bytes) => fs::write(dest, bytes)?,
        }
        Ok(())
    }

    /// Remove the underlying file. In-memory handles can't be deleted.
    pub fn delete(&self) -> Result<(), FileError> {
        match &self.content {
            Content::Local(path) => {
                fs::remove_file(path).map_err(|source| FileError::DeleteFailed {
                    path: path.clone(),
                    source,
                })
            }
            Content::Memory(_) => Err(FileError::NotDeletable(
                self.name.clone().unwrap_or_else(|| "<memory>".to_string()),
            )),
        }
    }
}

/// Path-backed file value owned by one strategy chain run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingCopy {
    path: PathBuf,
    name: Option<String>,
    mime_type: Option<String>,
    size: u64,
}

impl WorkingCopy {
    /// Working copy over an existing local file.
    ///
    /// `name` and `mime_type` are carried over from the source so the copy
    /// keeps describing the upload, not the temporary file it lives in.
    pub fn new(
        path: impl Into<PathBuf>,
        name: Option<String>,
        mime_type: Option<String>,
    ) -> Result<Self, FileError> {
        let path = path.into();
        let size = file_size(&path)?;
        Ok(Self {
            path,
            name,
            mime_type,
            size,
        })
    }

    /// Point the copy at different data.
    ///
    /// Re-derives the size and, when no name is set yet, takes the basename
    /// of the new path. Fails with [`FileError::NotFound`] if the path does
    /// not exist.
    pub fn with_data(self, path: impl Into<PathBuf>) -> Result<Self, FileError> {
        let path = path.into();
        let size = file_size(&path)?;
        let name = self.name.or_else(|| basename(&path));
        Ok(Self {
            path,
            name,
            mime_type: self.mime_type,
            size,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Re-read the size after the file was rewritten in place.
    pub fn refresh(mut self) -> Result<Self, FileError> {
        self.size = file_size(&self.path)?;
        Ok(self)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    pub fn extension(&self) -> Option<&str> {
        self.name.as_deref().and_then(extension_of)
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn content(&self) -> Result<Vec<u8>, FileError> {
        read_existing(&self.path)
    }

    /// Read-only handle over the same file, ready for storage.
    pub fn to_handle(&self) -> FileHandle {
        FileHandle {
            content: Content::Local(self.path.clone()),
            name: self.name.clone(),
            mime_type: self.mime_type.clone(),
            size: self.size,
            uploaded: false,
        }
    }
}

/// Extension of a file name, without the dot. Dotfiles have none.
pub fn extension_of(name: &str) -> Option<&str> {
    let base = name.rsplit('/').next().unwrap_or(name);
    match base.rfind('.') {
        Some(0) | None => None,
        Some(idx) => Some(&base[idx + 1..]),
    }
}

fn basename(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

fn file_size(path: &Path) -> Result<u64, FileError> {
    fs::metadata(path)
        .map(|m| m.len())
        .map_err(|e| not_found_or_io(path, e))
}

fn read_existing(path: &Path) -> Result<Vec<u8>, FileError> {
    fs::read(path).map_err(|e| not_found_or_io(path, e))
}

fn not_found_or_io(path: &Path, e: std::io::Error) -> FileError {
    if e.kind() == std::io::ErrorKind::NotFound {
        FileError::NotFound(path.to_path_buf())
    } else {
        FileError::Io(e)
    }
}
