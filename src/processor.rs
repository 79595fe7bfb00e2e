//! Variant processor: runs one strategy chain against a source file.
//!
//! ```text
//! source ──copy──▶ temp working copy ──▶ step 1 ──▶ step 2 ──▶ … ──▶ result
//!                        │                  │          │
//!                        └──────────────────┴──────────┴──▶ TemporaryFiles
//! ```
//!
//! The source is never touched. Each call copies it to a fresh temporary
//! file and runs the chain against that copy, in configuration order. Every
//! temporary file the call creates (the initial copy and any new file a
//! strategy hands back, like an extracted video frame) is recorded in a
//! [`TemporaryFiles`] ledger that the caller passes in.
//!
//! The ledger belongs to the invocation, not the processor, so a single
//! `VariantProcessor` can run chains for different variants in parallel.
//! Nothing here deletes temporary files; [`TemporaryFiles::cleanup`] does that
//! when the caller decides to.
//!
//! ## Outcomes
//!
//! | Strategy outcome | `force_apply = false` | `force_apply = true` |
//! |---|---|---|
//! | `Applied(next)` | continue with `next` | continue with `next` |
//! | `NotApplicable` | skip, keep current copy | [`ChainError::StrategyNotApplied`] |
//! | `Failed(e)` | [`ChainError::StrategyApplicationFailed`] | same |

use crate::file::{FileError, FileHandle, WorkingCopy};
use crate::strategy::{Outcome, ResolveError, StrategyError, StrategyOptions, StrategyResolver};
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Ordered `identifier → options` steps of one variant.
pub type Chain = IndexMap<String, StrategyOptions>;

const TEMP_PREFIX: &str = "filehandling-variant-";

#[derive(Error, Debug)]
pub enum ChainError {
    #[error("Failed to copy source to a temporary file in {}: {source}", dir.display())]
    SourceCopyFailed { dir: PathBuf, source: FileError },
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("Strategy '{strategy}' does not apply to '{file}'")]
    StrategyNotApplied { strategy: String, file: String },
    #[error("Strategy '{strategy}' failed on '{file}': {source}")]
    StrategyApplicationFailed {
        strategy: String,
        file: String,
        source: StrategyError,
    },
}

impl ChainError {
    /// Identifier of the step that broke the chain, if a step did.
    pub fn strategy(&self) -> Option<&str> {
        match self {
            ChainError::StrategyNotApplied { strategy, .. }
            | ChainError::StrategyApplicationFailed { strategy, .. } => Some(strategy.as_str()),
            ChainError::Resolve(ResolveError::Unresolvable(id))
            | ChainError::Resolve(ResolveError::WrongCapability { identifier: id, .. }) => {
                Some(id.as_str())
            }
            ChainError::SourceCopyFailed { .. } => None,
        }
    }
}

/// Temporary files created while processing, owned by the caller.
#[derive(Debug, Clone, Default)]
pub struct TemporaryFiles {
    files: Vec<FileHandle>,
}

impl TemporaryFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn files(&self) -> &[FileHandle] {
        &self.files
    }

    pub fn push(&mut self, file: FileHandle) {
        self.files.push(file);
    }

    /// Append every entry of another ledger.
    pub fn extend(&mut self, other: TemporaryFiles) {
        self.files.extend(other.files);
    }

    /// Forget all entries. The files stay on disk.
    pub fn clear(&mut self) {
        self.files.clear();
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FileHandle> {
        self.files.iter()
    }

    pub fn contains_path(&self, path: &Path) -> bool {
        self.files.iter().any(|f| f.path() == Some(path))
    }

    /// Delete every listed file from disk.
    ///
    /// Files that are already gone count as deleted, so cleanup can run
    /// twice. Returns the files that could not be removed; the ledger keeps
    /// only those.
    pub fn cleanup(&mut self) -> Vec<(FileHandle, FileError)> {
        let mut failures = Vec::new();
        for file in self.files.drain(..) {
            match file.delete() {
                Ok(()) => log::debug!("removed temporary file {:?}", file.path()),
                Err(FileError::DeleteFailed { source, .. })
                    if source.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    log::warn!("could not remove temporary file {:?}: {e}", file.path());
                    failures.push((file, e));
                }
            }
        }
        self.files = failures.iter().map(|(f, _)| f.clone()).collect();
        failures
    }
}

impl IntoIterator for TemporaryFiles {
    type Item = FileHandle;
    type IntoIter = std::vec::IntoIter<FileHandle>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.into_iter()
    }
}

impl<'a> IntoIterator for &'a TemporaryFiles {
    type Item = &'a FileHandle;
    type IntoIter = std::slice::Iter<'a, FileHandle>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.iter()
    }
}

/// Executes strategy chains.
#[derive(Debug, Clone)]
pub struct VariantProcessor {
    resolver: StrategyResolver,
    force_apply: bool,
    temp_dir: PathBuf,
}

impl VariantProcessor {
    /// A processor that skips non-applicable steps and works in the system
    /// temporary directory.
    pub fn new(resolver: StrategyResolver) -> Self {
        Self {
            resolver,
            force_apply: false,
            temp_dir: std::env::temp_dir(),
        }
    }

    /// Treat a non-applicable step as a chain failure.
    pub fn with_force_apply(mut self, force_apply: bool) -> Self {
        self.force_apply = force_apply;
        self
    }

    /// Directory for temporary working copies.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    pub fn resolver(&self) -> &StrategyResolver {
        &self.resolver
    }

    pub fn force_apply(&self) -> bool {
        self.force_apply
    }

    /// Run `chain` against a temporary copy of `source`.
    ///
    /// Temporary files are appended to `ledger`, also when the chain fails
    /// halfway, so the caller can always clean up.
    pub fn process(
        &self,
        source: &FileHandle,
        variant: &str,
        chain: &Chain,
        ledger: &mut TemporaryFiles,
    ) -> Result<WorkingCopy, ChainError> {
        let mut current = self.copy_source(source)?;
        ledger.push(current.to_handle());
        log::debug!(
            "variant '{variant}': working copy {} ({} steps)",
            current.path().display(),
            chain.len()
        );

        for (identifier, options) in chain {
            let strategy = self.resolver.resolve(identifier, options)?;
            match strategy.apply(&current) {
                Outcome::Applied(next) => {
                    if !ledger.contains_path(next.path()) {
                        ledger.push(next.to_handle());
                    }
                    log::debug!("variant '{variant}': applied '{identifier}'");
                    current = next;
                }
                Outcome::NotApplicable if self.force_apply => {
                    return Err(ChainError::StrategyNotApplied {
                        strategy: identifier.clone(),
                        file: display_name(&current),
                    });
                }
                Outcome::NotApplicable => {
                    log::info!(
                        "variant '{variant}': skipped '{identifier}', not applicable to {}",
                        display_name(&current)
                    );
                }
                Outcome::Failed(source) => {
                    return Err(ChainError::StrategyApplicationFailed {
                        strategy: identifier.clone(),
                        file: display_name(&current),
                        source,
                    });
                }
            }
        }

        Ok(current)
    }

    /// Copy the source bytes to a fresh, uniquely named temporary file.
    ///
    /// The suffix keeps the source extension so tools that sniff by extension
    /// (ffmpeg) still work.
    fn copy_source(&self, source: &FileHandle) -> Result<WorkingCopy, ChainError> {
        let failed = |source: FileError| ChainError::SourceCopyFailed {
            dir: self.temp_dir.clone(),
            source,
        };

        let suffix = source
            .extension()
            .map(|ext| format!(".{ext}"))
            .unwrap_or_default();
        let temp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(&suffix)
            .tempfile_in(&self.temp_dir)
            .map_err(|e| failed(e.into()))?;
        let path = temp
            .into_temp_path()
            .keep()
            .map_err(|e| failed(e.error.into()))?;

        if let Err(e) = source.copy_to(&path) {
            let _ = std::fs::remove_file(&path);
            return Err(failed(e));
        }

        WorkingCopy::new(
            path,
            source.name().map(str::to_string),
            source.mime_type().map(str::to_string),
        )
        .map_err(failed)
    }
}

fn display_name(file: &WorkingCopy) -> String {
    file.name()
        .map(str::to_string)
        .unwrap_or_else(|| file.path().display().to_string())
}
