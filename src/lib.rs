//! # file-variants
//!
//! Stores an uploaded file together with named variants derived from it:
//! thumbnails, re-oriented or watermarked copies, video poster frames.
//! Variants are described as ordered chains of strategies, applied to a
//! temporary copy of the upload, and stored next to the original.
//!
//! # Architecture: Store, Fan Out, Store
//!
//! ```text
//!                 ┌──────────────▶ storage: uploads/original/photo.jpg
//! upload ─────────┤
//!                 ├─ temp copy ─▶ orient ─▶ resize ─▶ storage: uploads/thumb/photo.jpg
//!                 └─ temp copy ─▶ resize ─▶ optimize ─▶ storage: uploads/large/photo.jpg
//! ```
//!
//! 1. The original is stored unchanged at the [`target::Target`]'s original path.
//! 2. Each variant gets its own temporary copy and runs its chain on it, in
//!    parallel with the other variants.
//! 3. The final copy of each chain is stored at the variant path.
//!
//! Temporary files are never removed behind the caller's back. Each run
//! reports them in a [`processor::TemporaryFiles`] ledger, and the caller
//! cleans up when it is done with them.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`file`] | `FileHandle` (upload or stored file) and `WorkingCopy` (path-backed pipeline value) |
//! | [`strategy`] | The `Strategy` trait, its tri-state `Outcome`, and the built-in image and video strategies |
//! | [`strategy::registry`] | Identifier and alias resolution to configured strategy instances |
//! | [`processor`] | Runs one chain on a temporary copy, recording every temporary file |
//! | [`target`] | Storage paths for the original and its variants (`:variant` templates) |
//! | [`storage`] | The `Storage` gateway trait and the local-disk implementation |
//! | [`handler`] | `FileHandler`: process, URL lookup, and deletion of an upload's variants |
//! | [`config`] | `file-variants.toml` loading, merging, and load-time chain validation |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Strategies Return New Values
//!
//! A strategy takes a [`file::WorkingCopy`] and hands back a new one. It may
//! rewrite the file in place (resize) or produce a different file (a video
//! frame), but it never mutates the value it was given. The processor only has
//! to compare paths to know whether a strategy created a new temporary file.
//!
//! ## Not Applicable Is Not an Error
//!
//! Applying a strategy has three outcomes: applied, not applicable (resize on
//! a PDF), and failed. A not-applicable step is skipped by default so one
//! chain can serve mixed uploads. With `force_apply` it fails the variant.
//!
//! ## Configuration Errors Surface at Load Time
//!
//! Every chain entry is resolved with its options when the config loads. An
//! unknown identifier or a malformed `dimensions` string stops the program
//! before the first upload, rather than half way through one.
//!
//! ## No Rollback
//!
//! When one variant fails, variants that already succeeded stay stored. The
//! failure carries everything stored and every temporary file created, so a
//! caller that wants all-or-nothing can delete the upload itself.

pub mod config;
pub mod file;
pub mod handler;
pub mod output;
pub mod processor;
pub mod storage;
pub mod strategy;
pub mod target;

#[cfg(test)]
pub(crate) mod test_helpers;
