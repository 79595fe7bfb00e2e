//! File handler: stores an upload and its processed variants.
//!
//! ```text
//! source ──store──────────────────────────────▶ target.original()      "original"
//!    │
//!    ├──▶ VariantProcessor(chain "thumb") ──store──▶ target.variant("thumb")
//!    └──▶ VariantProcessor(chain "large") ──store──▶ target.variant("large")
//! ```
//!
//! The original is stored first. Variants are then processed in parallel
//! (rayon) and merged back in configuration order, so the resulting map and
//! the ledger of temporary files read the same as a sequential run.
//!
//! Errors are fatal: the first failing variant (in configuration order) is
//! reported as a [`ProcessFailure`] carrying everything that was stored and
//! every temporary file created up to then. Nothing stored is rolled back;
//! the caller decides whether to [`FileHandler::delete`] it.

use crate::file::{FileError, FileHandle};
use crate::processor::{Chain, ChainError, TemporaryFiles, VariantProcessor};
use crate::storage::{Storage, StorageError, StoredFile};
use crate::target::Target;
use indexmap::IndexMap;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use rayon::prelude::*;
use thiserror::Error;

/// Key of the unprocessed upload in results and URL maps.
pub const ORIGINAL: &str = "original";

/// Characters `rawurlencode` leaves alone: alphanumerics plus `-_.~`.
const FILENAME_SAFE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("Failed to store '{key}' at '{path}': {source}")]
    Store {
        key: String,
        path: String,
        source: StorageError,
    },
    #[error("Variant '{variant}' failed: {source}")]
    Variant { variant: String, source: ChainError },
    #[error("'{0}' is reserved for the unprocessed upload")]
    ReservedVariant(String),
}

impl HandlerError {
    /// Name of the variant (or `original`) the error belongs to.
    pub fn variant(&self) -> &str {
        match self {
            HandlerError::Store { key, .. } => key,
            HandlerError::Variant { variant, .. } => variant,
            HandlerError::ReservedVariant(name) => name,
        }
    }

    /// Strategy that broke the chain, when a strategy did.
    pub fn strategy(&self) -> Option<&str> {
        match self {
            HandlerError::Variant { source, .. } => source.strategy(),
            _ => None,
        }
    }
}

/// A failed run together with whatever it left behind.
#[derive(Error, Debug)]
#[error("{error}")]
pub struct ProcessFailure {
    #[source]
    error: HandlerError,
    partial: ProcessResult,
}

impl ProcessFailure {
    fn new(error: HandlerError, partial: ProcessResult) -> Self {
        Self { error, partial }
    }

    pub fn error(&self) -> &HandlerError {
        &self.error
    }

    /// Files stored and temporary files created before the run stopped.
    pub fn partial(&self) -> &ProcessResult {
        &self.partial
    }

    pub fn into_parts(self) -> (HandlerError, ProcessResult) {
        (self.error, self.partial)
    }
}

/// Stored files keyed by variant name plus the temporary files left over.
#[derive(Debug, Clone, Default)]
pub struct ProcessResult {
    stored_files: IndexMap<String, StoredFile>,
    temporary_files: TemporaryFiles,
}

impl ProcessResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// `original` first (when processing a whole upload), then variants in
    /// configuration order.
    pub fn stored_files(&self) -> &IndexMap<String, StoredFile> {
        &self.stored_files
    }

    pub fn temporary_files(&self) -> &TemporaryFiles {
        &self.temporary_files
    }

    pub fn get(&self, key: &str) -> Option<&StoredFile> {
        self.stored_files.get(key)
    }

    pub fn original(&self) -> Option<&StoredFile> {
        self.get(ORIGINAL)
    }

    /// Public URLs of every stored file, in result order.
    pub fn urls(&self) -> IndexMap<String, String> {
        self.stored_files
            .iter()
            .map(|(key, stored)| (key.clone(), stored.url().to_string()))
            .collect()
    }

    /// Remove the temporary files from disk. See [`TemporaryFiles::cleanup`].
    pub fn cleanup_temporary_files(&mut self) -> Vec<(FileHandle, FileError)> {
        self.temporary_files.cleanup()
    }

    pub fn into_parts(self) -> (IndexMap<String, StoredFile>, TemporaryFiles) {
        (self.stored_files, self.temporary_files)
    }

    fn with_temporary_files(temporary_files: TemporaryFiles) -> Self {
        Self {
            stored_files: IndexMap::new(),
            temporary_files,
        }
    }

    fn merge(&mut self, other: ProcessResult) {
        self.stored_files.extend(other.stored_files);
        self.temporary_files.extend(other.temporary_files);
    }
}

/// Variants to produce, keyed by name, each with its strategy chain.
#[derive(Debug, Clone, Default)]
pub struct ProcessOptions {
    pub variants: IndexMap<String, Chain>,
}

impl ProcessOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_variant(mut self, name: impl Into<String>, chain: Chain) -> Self {
        self.variants.insert(name.into(), chain);
        self
    }
}

/// Couples a storage backend with a variant processor.
pub struct FileHandler<S: Storage> {
    storage: S,
    processor: VariantProcessor,
}

impl<S: Storage> FileHandler<S> {
    pub fn new(storage: S, processor: VariantProcessor) -> Self {
        Self { storage, processor }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn processor(&self) -> &VariantProcessor {
        &self.processor
    }

    /// Store `source` as the original and produce every configured variant.
    pub fn process(
        &self,
        source: &FileHandle,
        target: &Target,
        options: &ProcessOptions,
    ) -> Result<ProcessResult, ProcessFailure> {
        if let Some(name) = options.variants.keys().find(|name| *name == ORIGINAL) {
            return Err(ProcessFailure::new(
                HandlerError::ReservedVariant(name.clone()),
                ProcessResult::new(),
            ));
        }

        let original = self
            .store(source, ORIGINAL, target.original())
            .map_err(|error| ProcessFailure::new(error, ProcessResult::new()))?;
        let mut result = ProcessResult::new();
        result.stored_files.insert(ORIGINAL.to_string(), original);

        let variants: Vec<(&String, &Chain)> = options.variants.iter().collect();
        let outcomes: Vec<Result<ProcessResult, ProcessFailure>> = variants
            .into_par_iter()
            .map(|(name, chain)| self.process_variant(source, target, name, chain))
            .collect();

        let mut first_error = None;
        for outcome in outcomes {
            match outcome {
                Ok(partial) => result.merge(partial),
                Err(failure) => {
                    let (error, partial) = failure.into_parts();
                    result.merge(partial);
                    if first_error.is_none() {
                        first_error = Some(error);
                    } else {
                        log::warn!("{error}");
                    }
                }
            }
        }

        match first_error {
            Some(error) => Err(ProcessFailure::new(error, result)),
            None => Ok(result),
        }
    }

    /// Produce and store a single variant.
    ///
    /// Returns a one-entry result keyed by `variant`, with the temporary
    /// files of this run only.
    pub fn process_variant(
        &self,
        source: &FileHandle,
        target: &Target,
        variant: &str,
        chain: &Chain,
    ) -> Result<ProcessResult, ProcessFailure> {
        if variant == ORIGINAL {
            return Err(ProcessFailure::new(
                HandlerError::ReservedVariant(variant.to_string()),
                ProcessResult::new(),
            ));
        }

        let mut ledger = TemporaryFiles::new();
        let copy = match self.processor.process(source, variant, chain, &mut ledger) {
            Ok(copy) => copy,
            Err(source) => {
                return Err(ProcessFailure::new(
                    HandlerError::Variant {
                        variant: variant.to_string(),
                        source,
                    },
                    ProcessResult::with_temporary_files(ledger),
                ));
            }
        };

        let path = target.variant(variant);
        let mut result = ProcessResult::with_temporary_files(ledger);
        match self.store(&copy.to_handle(), variant, &path) {
            Ok(stored) => {
                result.stored_files.insert(variant.to_string(), stored);
                Ok(result)
            }
            Err(error) => Err(ProcessFailure::new(error, result)),
        }
    }

    /// Public URLs of the original and the given variants.
    ///
    /// `original` always comes first and appears once. Nothing is checked
    /// for existence.
    pub fn variant_urls_for_target<K: AsRef<str>>(
        &self,
        target: &Target,
        variants: &[K],
    ) -> IndexMap<String, String> {
        let mut urls = IndexMap::new();
        urls.insert(
            ORIGINAL.to_string(),
            sanitize_url(&self.storage.url(target.original())),
        );
        for variant in variants {
            let variant: &str = variant.as_ref();
            if urls.contains_key(variant) {
                continue;
            }
            let url = sanitize_url(&self.storage.url(&target.variant(variant)));
            urls.insert(variant.to_string(), url);
        }
        urls
    }

    /// Delete the given variants and the original.
    ///
    /// Every deletion is attempted; returns `true` only if all succeeded.
    pub fn delete<K: AsRef<str>>(&self, target: &Target, variants: &[K]) -> bool {
        let mut keys: Vec<&str> = variants.iter().map(AsRef::as_ref).collect();
        if !keys.contains(&ORIGINAL) {
            keys.push(ORIGINAL);
        }
        keys.into_iter()
            .fold(true, |ok, key| self.delete_variant(target, key) && ok)
    }

    /// Delete one stored file. A file that does not exist counts as deleted.
    pub fn delete_variant(&self, target: &Target, variant: &str) -> bool {
        let path = if variant == ORIGINAL {
            target.original().to_string()
        } else {
            target.variant(variant)
        };

        if !self.storage.exists(&path) {
            log::debug!("'{variant}' not stored at {path}, nothing to delete");
            return true;
        }
        match self.storage.delete(&path) {
            Ok(()) => {
                log::info!("deleted '{variant}' at {path}");
                true
            }
            Err(e) => {
                log::warn!("could not delete '{variant}' at {path}: {e}");
                false
            }
        }
    }

    fn store(&self, file: &FileHandle, key: &str, path: &str) -> Result<StoredFile, HandlerError> {
        let stored = self
            .storage
            .store(file, path)
            .map_err(|source| HandlerError::Store {
                key: key.to_string(),
                path: path.to_string(),
                source,
            })?;
        log::info!("stored '{key}' at {path}");
        Ok(stored)
    }
}

/// Percent-encode the last path segment of `url` unless it already is a
/// valid URL.
///
/// A URL counts as valid when it parses and contains only printable ASCII.
/// Only the file name is encoded so directory separators and the scheme
/// survive.
pub fn sanitize_url(url: &str) -> String {
    if is_valid_url(url) {
        return url.to_string();
    }
    match url.rsplit_once('/') {
        Some((head, filename)) => {
            format!("{head}/{}", utf8_percent_encode(filename, FILENAME_SAFE))
        }
        None => utf8_percent_encode(url, FILENAME_SAFE).to_string(),
    }
}

fn is_valid_url(url: &str) -> bool {
    url.chars().all(|c| c.is_ascii_graphic()) && url::Url::parse(url).is_ok()
}
