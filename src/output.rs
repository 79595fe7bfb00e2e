//! CLI output formatting for every command.
//!
//! Output leads with the variant key, the thing a caller asked for, and shows
//! the URL it landed at on the same line. File details are indented context
//! lines underneath.
//!
//! # Output Format
//!
//! ## Process
//!
//! ```text
//! original → /storage/media/original/photo.jpg
//!     photo.jpg (image/jpeg, 48213 bytes)
//! thumb → /storage/media/thumb/photo.jpg
//!     photo.jpg (image/jpeg, 5120 bytes)
//! Temporary files: 1 removed
//! ```
//!
//! ## Urls
//!
//! ```text
//! original → /storage/media/original/photo.jpg
//! thumb → /storage/media/thumb/photo.jpg
//! ```
//!
//! ## Check
//!
//! ```text
//! Variants
//! 001 thumb
//!     auto-orient → image-auto-orient
//!     resize → image-resize {"dimensions":"150x150#"}
//!
//! Aliases
//!     resize → image-resize
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability. Format functions are pure: no I/O, no side effects.
//! [`print_lines`] writes them to stdout.

use crate::config::HandlerConfig;
use crate::file::{FileError, FileHandle};
use crate::handler::{ProcessFailure, ProcessResult};
use crate::storage::StoredFile;
use crate::strategy::{StrategyOptions, StrategyResolver};
use indexmap::IndexMap;

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// `key → url`
fn keyed_line(key: &str, url: &str) -> String {
    format!("{} → {}", key, url)
}

/// Indented description of a stored file.
///
/// ```text
///     photo.jpg (image/jpeg, 5120 bytes)
///     (unnamed, 5120 bytes)
/// ```
fn stored_detail(stored: &StoredFile) -> String {
    let name = stored.name().unwrap_or("(unnamed)");
    match stored.mime_type() {
        Some(mime) => format!("{}{} ({}, {} bytes)", indent(1), name, mime, stored.size()),
        None => format!("{}{} ({} bytes)", indent(1), name, stored.size()),
    }
}

fn format_stored(stored: &IndexMap<String, StoredFile>) -> Vec<String> {
    let mut lines = Vec::new();
    for (key, file) in stored {
        lines.push(keyed_line(key, file.url()));
        lines.push(stored_detail(file));
    }
    lines
}

/// Options rendered inline, omitted when empty.
fn options_suffix(options: &StrategyOptions) -> String {
    if options.is_empty() {
        return String::new();
    }
    match serde_json::to_string(options) {
        Ok(json) => format!(" {}", json),
        Err(_) => String::new(),
    }
}

// ============================================================================
// process
// ============================================================================

/// Every stored key with its URL and file details.
pub fn format_process_result(result: &ProcessResult) -> Vec<String> {
    format_stored(result.stored_files())
}

/// The error, then whatever was stored before processing stopped.
pub fn format_process_failure(failure: &ProcessFailure) -> Vec<String> {
    let mut lines = vec![format!("Failed: {}", failure.error())];
    let partial = failure.partial();
    if !partial.stored_files().is_empty() {
        lines.push("Stored before failure:".to_string());
        lines.extend(
            format_stored(partial.stored_files())
                .into_iter()
                .map(|line| format!("{}{}", indent(1), line)),
        );
    }
    lines
}

/// Summary of a temporary file cleanup.
///
/// ```text
/// Temporary files: 2 removed
/// Temporary files: 1 removed, 1 left behind
///     /tmp/filehandling-variant-abc.jpg: permission denied
/// ```
pub fn format_cleanup(total: usize, failures: &[(FileHandle, FileError)]) -> Vec<String> {
    let removed = total.saturating_sub(failures.len());
    if failures.is_empty() {
        return vec![format!("Temporary files: {} removed", removed)];
    }
    let mut lines = vec![format!(
        "Temporary files: {} removed, {} left behind",
        removed,
        failures.len()
    )];
    for (file, error) in failures {
        let path = file
            .path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(in memory)".to_string());
        lines.push(format!("{}{}: {}", indent(1), path, error));
    }
    lines
}

/// Temporary files kept on request.
pub fn format_kept_temporaries(files: &[FileHandle]) -> Vec<String> {
    let mut lines = vec![format!("Temporary files kept: {}", files.len())];
    for path in files.iter().filter_map(FileHandle::path) {
        lines.push(format!("{}{}", indent(1), path.display()));
    }
    lines
}

// ============================================================================
// urls / delete
// ============================================================================

pub fn format_urls(urls: &IndexMap<String, String>) -> Vec<String> {
    urls.iter().map(|(key, url)| keyed_line(key, url)).collect()
}

pub fn format_delete(path: &str, success: bool) -> Vec<String> {
    if success {
        vec![format!("Deleted {} and its variants", path)]
    } else {
        vec![format!("Could not delete everything for {}", path)]
    }
}

// ============================================================================
// check
// ============================================================================

/// Configured variants with each step's canonical identifier, then the
/// alias table.
pub fn format_check(config: &HandlerConfig, resolver: &StrategyResolver) -> Vec<String> {
    let mut lines = Vec::new();

    if config.variants.is_empty() {
        lines.push("No variants configured".to_string());
    } else {
        lines.push("Variants".to_string());
        for (i, (name, chain)) in config.variants.iter().enumerate() {
            lines.push(format!("{} {}", format_index(i + 1), name));
            if chain.is_empty() {
                lines.push(format!("{}(copy of the original)", indent(1)));
            }
            for (identifier, options) in chain {
                let canonical = resolver.canonical(identifier);
                let step = if canonical == identifier {
                    identifier.clone()
                } else {
                    format!("{} → {}", identifier, canonical)
                };
                lines.push(format!("{}{}{}", indent(1), step, options_suffix(options)));
            }
        }
    }

    let aliases = resolver.aliases();
    if !aliases.is_empty() {
        lines.push(String::new());
        lines.push("Aliases".to_string());
        for (alias, identifier) in aliases {
            lines.push(format!("{}{} → {}", indent(1), alias, identifier));
        }
    }
    lines
}

pub fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{}", line);
    }
}
