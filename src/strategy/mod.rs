//! Variant strategies: single transformation steps in a chain.
//!
//! A [`Strategy`] takes a [`WorkingCopy`] and reports one of three
//! [`Outcome`]s:
//!
//! - [`Outcome::Applied`] carries the next working copy. It may point at a
//!   different file, name or mime type than the input (a video frame
//!   extractor hands back a JPEG).
//! - [`Outcome::NotApplicable`] means the strategy's precondition doesn't hold
//!   for this file. It is a normal skip, not an error.
//! - [`Outcome::Failed`] means the strategy ran and could not finish.
//!
//! Strategies are built from their options through the
//! [`StrategyResolver`](registry::StrategyResolver); an instance only exists
//! once its options were accepted.
//!
//! ## Built-in strategies
//!
//! | Identifier | Alias | Applies to |
//! |---|---|---|
//! | `image-resize` | `resize` | `image/*` |
//! | `image-auto-orient` | `auto-orient` | `image/*` with EXIF-capable extension |
//! | `image-watermark` | `watermark` | `image/*` |
//! | `image-optimize` | `optimize` | `image/*` |
//! | `video-screenshot` | `screenshot` | `video/*` |

pub mod calculations;
pub mod codec;
pub mod optimize;
pub mod orient;
pub mod registry;
pub mod resize;
pub mod video;
pub mod watermark;

pub use registry::{ResolveError, StrategyResolver};

use crate::file::{FileError, WorkingCopy};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a strategy reported [`Outcome::Failed`].
#[derive(Error, Debug)]
pub enum StrategyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    File(#[from] FileError),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("EXIF error: {0}")]
    Exif(#[from] exif::Error),
    #[error("Command failed: {0}")]
    Command(String),
    #[error("{0}")]
    Invalid(String),
}

/// Options a strategy rejected.
#[derive(Error, Debug)]
pub enum OptionsError {
    #[error("Invalid strategy options: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid value for '{key}': {reason}")]
    Value { key: &'static str, reason: String },
}

/// Opaque per-strategy configuration map.
///
/// Deserializes from any self-describing format; in config files it is the
/// inline table next to the strategy identifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StrategyOptions(serde_json::Map<String, serde_json::Value>);

impl StrategyOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Deserialize the map into a strategy's typed options.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, OptionsError> {
        Ok(serde_json::from_value(serde_json::Value::Object(
            self.0.clone(),
        ))?)
    }
}

/// Result of applying a strategy to a working copy.
#[derive(Debug)]
pub enum Outcome {
    Applied(WorkingCopy),
    NotApplicable,
    Failed(StrategyError),
}

/// A single transformation step.
///
/// Implementors provide [`perform`](Strategy::perform) and usually
/// [`applies_to`](Strategy::applies_to); [`apply`](Strategy::apply) wires
/// them into an [`Outcome`].
pub trait Strategy: Send + Sync {
    /// Applicability predicate. Must be free of side effects.
    fn applies_to(&self, _file: &WorkingCopy) -> bool {
        true
    }

    /// Run the transformation.
    fn perform(&self, file: WorkingCopy) -> Result<WorkingCopy, StrategyError>;

    fn apply(&self, file: &WorkingCopy) -> Outcome {
        if !self.applies_to(file) {
            return Outcome::NotApplicable;
        }
        match self.perform(file.clone()) {
            Ok(next) => Outcome::Applied(next),
            Err(e) => Outcome::Failed(e),
        }
    }
}

pub(crate) fn is_image(file: &WorkingCopy) -> bool {
    has_mime_prefix(file, "image/")
}

pub(crate) fn is_video(file: &WorkingCopy) -> bool {
    has_mime_prefix(file, "video/")
}

fn has_mime_prefix(file: &WorkingCopy, prefix: &str) -> bool {
    file.mime_type()
        .is_some_and(|m| m.to_ascii_lowercase().starts_with(prefix))
}
