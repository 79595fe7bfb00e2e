//! Storage gateway trait and the local-disk implementation.
//!
//! The [`Storage`] trait is everything the handler needs from a byte store:
//! existence checks, public URLs, reads, writes and deletes, all keyed by
//! `/`-separated storage paths. [`LocalStorage`] maps those paths onto a
//! root directory and URLs onto a base URL.
//!
//! A recording `MockStorage` lives in [`tests`] for handler tests.

use crate::file::{FileError, FileHandle};
use std::fs;
use std::io;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    File(#[from] FileError),
    #[error("Failed to write '{path}': {source}")]
    WriteFailed { path: String, source: io::Error },
    #[error("Failed to delete '{path}': {source}")]
    DeleteFailed { path: String, source: io::Error },
    #[error("Nothing stored at '{0}'")]
    NotFound(String),
    #[error("Invalid storage path '{0}'")]
    InvalidPath(String),
}

/// A file as held by storage, with its public URL.
#[derive(Debug, Clone)]
pub struct StoredFile {
    file: FileHandle,
    url: String,
}

impl StoredFile {
    pub fn new(file: FileHandle, url: impl Into<String>) -> Self {
        Self {
            file,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn file(&self) -> &FileHandle {
        &self.file
    }

    pub fn into_file(self) -> FileHandle {
        self.file
    }
}

impl Deref for StoredFile {
    type Target = FileHandle;

    fn deref(&self) -> &FileHandle {
        &self.file
    }
}

/// Byte store addressed by storage paths.
///
/// Implementations must be `Sync`: the handler stores variants from rayon
/// workers.
pub trait Storage: Send + Sync {
    fn exists(&self, path: &str) -> bool;

    /// Public URL of `path`. Not guaranteed to be escaped.
    fn url(&self, path: &str) -> String;

    fn get(&self, path: &str) -> Result<StoredFile, StorageError>;

    /// Write `file` at `path`, replacing whatever is there.
    fn store(&self, file: &FileHandle, path: &str) -> Result<StoredFile, StorageError>;

    fn delete(&self, path: &str) -> Result<(), StorageError>;
}

/// Storage rooted in a local directory.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
    base_url: String,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Disk location of a storage path. `..` and empty paths are rejected.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        let relative = path.trim_start_matches('/');
        let invalid = relative.is_empty()
            || relative
                .split('/')
                .any(|segment| segment.is_empty() || segment == "." || segment == "..");
        if invalid {
            return Err(StorageError::InvalidPath(path.to_string()));
        }
        Ok(relative.split('/').fold(self.root.clone(), |dir, s| dir.join(s)))
    }
}

impl Storage for LocalStorage {
    fn exists(&self, path: &str) -> bool {
        self.resolve(path).is_ok_and(|p| p.is_file())
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn get(&self, path: &str) -> Result<StoredFile, StorageError> {
        let disk_path = self.resolve(path)?;
        let bytes = fs::read(&disk_path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StorageError::NotFound(path.to_string()),
            _ => StorageError::Io(e),
        })?;

        let mime_type = infer::get(&bytes).map(|kind| kind.mime_type());
        let mut file = FileHandle::from_bytes(bytes);
        if let Some(mime_type) = mime_type {
            file = file.with_mime_type(mime_type);
        }
        if let Some(name) = path.rsplit('/').next() {
            file = file.with_name(name);
        }
        Ok(StoredFile::new(file, self.url(path)))
    }

    fn store(&self, file: &FileHandle, path: &str) -> Result<StoredFile, StorageError> {
        let dest = self.resolve(path)?;
        let write_failed = |source: io::Error| StorageError::WriteFailed {
            path: path.to_string(),
            source,
        };

        let parent = dest.parent().unwrap_or(self.root.as_path());
        fs::create_dir_all(parent).map_err(write_failed)?;

        // `dest` may be the source itself: never open it for writing.
        let mut reader = file.open_stream()?;
        let mut out = tempfile::Builder::new()
            .prefix(".store-")
            .tempfile_in(parent)
            .map_err(write_failed)?;
        io::copy(&mut reader, out.as_file_mut()).map_err(write_failed)?;
        out.as_file().sync_all().map_err(write_failed)?;
        drop(reader);
        out.persist(&dest).map_err(|e| write_failed(e.error))?;
        log::debug!("stored {} bytes at {}", file.size(), dest.display());

        let mut stored = FileHandle::from_path(&dest)?;
        if let Some(name) = file.name() {
            stored = stored.with_name(name);
        }
        if let Some(mime) = file.mime_type() {
            stored = stored.with_mime_type(mime);
        }
        Ok(StoredFile::new(stored, self.url(path)))
    }

    fn delete(&self, path: &str) -> Result<(), StorageError> {
        let disk_path = self.resolve(path)?;
        fs::remove_file(&disk_path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => StorageError::NotFound(path.to_string()),
            _ => StorageError::DeleteFailed {
                path: path.to_string(),
                source,
            },
        })
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Storage that keeps files in memory and records every call.
    /// Uses Mutex (not RefCell) so it is Sync and works with rayon's par_iter.
    pub struct MockStorage {
        base_url: String,
        pub files: Mutex<HashMap<String, Vec<u8>>>,
        pub operations: Mutex<Vec<RecordedOp>>,
        failing_stores: HashSet<String>,
        failing_deletes: HashSet<String>,
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum RecordedOp {
        Exists(String),
        Url(String),
        Get(String),
        Store { path: String, name: Option<String> },
        Delete(String),
    }

    impl Default for MockStorage {
        fn default() -> Self {
            Self::new("https://cdn.test")
        }
    }

    impl MockStorage {
        pub fn new(base_url: &str) -> Self {
            Self {
                base_url: base_url.to_string(),
                files: Mutex::new(HashMap::new()),
                operations: Mutex::new(Vec::new()),
                failing_stores: HashSet::new(),
                failing_deletes: HashSet::new(),
            }
        }

        /// Pretend `path` is already stored.
        pub fn with_file(self, path: &str) -> Self {
            self.files
                .lock()
                .unwrap()
                .insert(path.to_string(), b"existing".to_vec());
            self
        }

        pub fn failing_store(mut self, path: &str) -> Self {
            self.failing_stores.insert(path.to_string());
            self
        }

        pub fn failing_delete(mut self, path: &str) -> Self {
            self.failing_deletes.insert(path.to_string());
            self
        }

        pub fn get_operations(&self) -> Vec<RecordedOp> {
            self.operations.lock().unwrap().clone()
        }

        pub fn clear_operations(&self) {
            self.operations.lock().unwrap().clear();
        }

        pub fn stored_paths(&self) -> Vec<String> {
            let mut paths: Vec<String> = self.files.lock().unwrap().keys().cloned().collect();
            paths.sort();
            paths
        }

        pub fn content(&self, path: &str) -> Option<Vec<u8>> {
            self.files.lock().unwrap().get(path).cloned()
        }

        fn record(&self, op: RecordedOp) {
            self.operations.lock().unwrap().push(op);
        }
    }

    impl Storage for MockStorage {
        fn exists(&self, path: &str) -> bool {
            self.record(RecordedOp::Exists(path.to_string()));
            self.files.lock().unwrap().contains_key(path)
        }

        fn url(&self, path: &str) -> String {
            self.record(RecordedOp::Url(path.to_string()));
            format!("{}/{}", self.base_url, path)
        }

        fn get(&self, path: &str) -> Result<StoredFile, StorageError> {
            self.record(RecordedOp::Get(path.to_string()));
            let bytes = self
                .content(path)
                .ok_or_else(|| StorageError::NotFound(path.to_string()))?;
            Ok(StoredFile::new(
                FileHandle::from_bytes(bytes),
                format!("{}/{}", self.base_url, path),
            ))
        }

        fn store(&self, file: &FileHandle, path: &str) -> Result<StoredFile, StorageError> {
            self.record(RecordedOp::Store {
                path: path.to_string(),
                name: file.name().map(str::to_string),
            });
            if self.failing_stores.contains(path) {
                return Err(StorageError::WriteFailed {
                    path: path.to_string(),
                    source: io::Error::other("mock write failure"),
                });
            }
            let bytes = file.content()?.into_owned();
            self.files.lock().unwrap().insert(path.to_string(), bytes);
            Ok(StoredFile::new(
                file.clone(),
                format!("{}/{}", self.base_url, path),
            ))
        }

        fn delete(&self, path: &str) -> Result<(), StorageError> {
            self.record(RecordedOp::Delete(path.to_string()));
            if self.failing_deletes.contains(path) {
                return Err(StorageError::DeleteFailed {
                    path: path.to_string(),
                    source: io::Error::other("mock delete failure"),
                });
            }
            self.files
                .lock()
                .unwrap()
                .remove(path)
                .map(|_| ())
                .ok_or_else(|| StorageError::NotFound(path.to_string()))
        }
    }

    // =========================================================================
    // LocalStorage
    // =========================================================================

    fn local(tmp: &TempDir) -> LocalStorage {
        LocalStorage::new(tmp.path(), "https://files.example.com/")
    }

    #[test]
    fn url_joins_base_and_path() {
        let tmp = TempDir::new().unwrap();
        let storage = local(&tmp);
        assert_eq!(
            storage.url("/a/b.jpg"),
            "https://files.example.com/a/b.jpg"
        );
        assert_eq!(
            LocalStorage::new(tmp.path(), "").url("a/b.jpg"),
            "/a/b.jpg"
        );
    }

    #[test]
    fn resolve_rejects_escapes() {
        let tmp = TempDir::new().unwrap();
        let storage = local(&tmp);
        assert!(storage.resolve("a/b/c.txt").unwrap().starts_with(tmp.path()));
        assert!(matches!(
            storage.resolve("../etc/passwd"),
            Err(StorageError::InvalidPath(_))
        ));
        assert!(storage.resolve("a//b").is_err());
        assert!(storage.resolve("").is_err());
        assert!(storage.resolve("/").is_err());
    }

    #[test]
    fn store_creates_directories_and_keeps_metadata() {
        let tmp = TempDir::new().unwrap();
        let storage = local(&tmp);
        let file = FileHandle::from_bytes(b"payload".to_vec())
            .with_name("upload.txt")
            .with_mime_type("text/plain");

        let stored = storage.store(&file, "deep/er/original/upload.txt").unwrap();
        assert_eq!(stored.url(), "https://files.example.com/deep/er/original/upload.txt");
        assert_eq!(stored.name(), Some("upload.txt"));
        assert_eq!(stored.mime_type(), Some("text/plain"));
        assert_eq!(stored.size(), 7);
        assert_eq!(
            fs::read(tmp.path().join("deep/er/original/upload.txt")).unwrap(),
            b"payload"
        );
        assert!(storage.exists("deep/er/original/upload.txt"));
        assert!(!storage.exists("deep/er"));
    }

    #[test]
    fn store_streams_from_local_file() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src.bin");
        fs::write(&src, vec![7u8; 100_000]).unwrap();
        let storage = LocalStorage::new(tmp.path().join("root"), "http://x");

        let stored = storage
            .store(&FileHandle::from_path(&src).unwrap(), "a/b.bin")
            .unwrap();
        assert_eq!(stored.size(), 100_000);
    }

    #[test]
    fn store_onto_own_path_keeps_content() {
        let tmp = TempDir::new().unwrap();
        let storage = local(&tmp);
        let existing = tmp.path().join("uploads/original/a.txt");
        fs::create_dir_all(existing.parent().unwrap()).unwrap();
        fs::write(&existing, b"precious bytes").unwrap();

        let stored = storage
            .store(
                &FileHandle::from_path(&existing).unwrap(),
                "uploads/original/a.txt",
            )
            .unwrap();

        assert_eq!(fs::read(&existing).unwrap(), b"precious bytes");
        assert_eq!(stored.size(), 14);
        // Only the stored file is left in the directory
        assert_eq!(fs::read_dir(existing.parent().unwrap()).unwrap().count(), 1);
    }

    #[test]
    fn store_replaces_existing_file() {
        let tmp = TempDir::new().unwrap();
        let storage = local(&tmp);
        storage
            .store(&FileHandle::from_bytes(b"first".to_vec()), "x/y.txt")
            .unwrap();
        storage
            .store(&FileHandle::from_bytes(b"second".to_vec()), "x/y.txt")
            .unwrap();
        assert_eq!(fs::read(tmp.path().join("x/y.txt")).unwrap(), b"second");
    }

    #[test]
    fn get_sniffs_mime_and_names_file() {
        let tmp = TempDir::new().unwrap();
        let storage = local(&tmp);
        let png = tmp.path().join("p.png");
        crate::test_helpers::create_test_png(&png, 4, 4);
        storage
            .store(&FileHandle::from_path(&png).unwrap(), "img/thumb/p.png")
            .unwrap();

        let fetched = storage.get("img/thumb/p.png").unwrap();
        assert_eq!(fetched.name(), Some("p.png"));
        assert_eq!(fetched.mime_type(), Some("image/png"));
        assert!(matches!(
            storage.get("img/nope.png"),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn delete_removes_then_reports_missing() {
        let tmp = TempDir::new().unwrap();
        let storage = local(&tmp);
        storage
            .store(&FileHandle::from_bytes(b"x".to_vec()), "a/x.txt")
            .unwrap();

        storage.delete("a/x.txt").unwrap();
        assert!(!storage.exists("a/x.txt"));
        assert!(matches!(
            storage.delete("a/x.txt"),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn stored_file_derefs_to_handle() {
        let stored = StoredFile::new(
            FileHandle::from_bytes(b"abc".to_vec()).with_name("a.txt"),
            "https://x/a.txt",
        );
        assert_eq!(stored.extension(), Some("txt"));
        assert_eq!(stored.url(), "https://x/a.txt");
        assert_eq!(stored.into_file().size(), 3);
    }

    #[test]
    fn mock_records_operations() {
        let storage = MockStorage::default().with_file("a.txt");
        assert!(storage.exists("a.txt"));
        assert!(!storage.exists("b.txt"));
        storage.delete("a.txt").unwrap();
        assert_eq!(
            storage.get_operations(),
            vec![
                RecordedOp::Exists("a.txt".into()),
                RecordedOp::Exists("b.txt".into()),
                RecordedOp::Delete("a.txt".into()),
            ]
        );
    }
}
