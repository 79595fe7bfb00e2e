//! Handler configuration module.
//!
//! Loads, validates, and merges `file-variants.toml`. The user file is sparse:
//! it is merged on top of stock defaults, so it only needs the keys it wants
//! to change. Unknown keys are rejected to catch typos early.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! force_apply = false            # Non-applicable strategy fails the variant
//!
//! [aliases]                      # Extra identifier aliases
//! thumbify = "image-resize"
//!
//! [processing]
//! max_processes = 4              # Parallel variants (omit for auto = CPU cores)
//! temp_dir = "/tmp"              # Working copies (omit for the system temp dir)
//!
//! [storage]
//! root = "storage"               # Local storage directory
//! base_url = "/storage"          # Prefix of public URLs
//!
//! [target]
//! variant_path = "media/:variant/file.jpg"  # Omit to derive from the original
//!
//! [target.filenames]
//! thumb = "thumbnail"            # Per-variant file name (extension kept)
//!
//! [target.extensions]
//! thumb = "webp"                 # Per-variant extension
//!
//! [variants.thumb]               # Chain, applied top to bottom
//! auto-orient = {}
//! resize = { dimensions = "150x150#" }
//! ```
//!
//! ## Chain Order
//!
//! Strategies run in the order they are written. The TOML layer preserves
//! document order and chains are held in an `IndexMap`, and [`merge_toml`]
//! keeps the position of keys it overrides.
//!
//! ## Load-Time Validation
//!
//! [`load_config`] resolves every chain entry once with its options, so an
//! unknown identifier or malformed options fail at startup instead of in the
//! middle of an upload.

use crate::handler::{ORIGINAL, ProcessOptions};
use crate::processor::{Chain, VariantProcessor};
use crate::storage::LocalStorage;
use crate::strategy::{ResolveError, StrategyResolver};
use crate::target::Target;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "file-variants.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
    #[error("Variant '{variant}': {source}")]
    Resolve {
        variant: String,
        source: ResolveError,
    },
}

/// Handler configuration loaded from `file-variants.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HandlerConfig {
    /// Fail a variant when one of its strategies does not apply.
    pub force_apply: bool,
    /// Additional `alias -> identifier` entries on top of the built-in ones.
    pub aliases: IndexMap<String, String>,
    /// Parallelism and temporary files.
    pub processing: ProcessingConfig,
    /// Local storage location and URL prefix.
    pub storage: StorageConfig,
    /// Variant path template and per-variant overrides.
    pub target: TargetConfig,
    /// Variant name -> strategy chain.
    pub variants: IndexMap<String, Chain>,
}

impl HandlerConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.processing.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_processes must be at least 1".into(),
            ));
        }
        if self.storage.base_url.is_empty() {
            return Err(ConfigError::Validation(
                "storage.base_url must not be empty".into(),
            ));
        }
        for name in self.variants.keys() {
            if name.is_empty() {
                return Err(ConfigError::Validation(
                    "variant names must not be empty".into(),
                ));
            }
            if name.contains('/') {
                return Err(ConfigError::Validation(format!(
                    "variant '{name}' must not contain '/'"
                )));
            }
            if name == ORIGINAL {
                return Err(ConfigError::Validation(format!(
                    "variant name '{ORIGINAL}' is reserved"
                )));
            }
        }
        Ok(())
    }

    /// Resolver with the built-in strategies, default aliases and the
    /// configured aliases.
    pub fn build_resolver(&self) -> StrategyResolver {
        let mut resolver = StrategyResolver::with_defaults();
        resolver.extend_aliases(
            self.aliases
                .iter()
                .map(|(alias, identifier)| (alias.clone(), identifier.clone())),
        );
        resolver
    }

    /// Resolve every chain entry once with its options.
    pub fn validate_variants(&self, resolver: &StrategyResolver) -> Result<(), ConfigError> {
        for (variant, chain) in &self.variants {
            resolver
                .validate_chain(chain)
                .map_err(|source| ConfigError::Resolve {
                    variant: variant.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    /// A processor for the configured chains, after checking they resolve.
    pub fn processor(&self) -> Result<VariantProcessor, ConfigError> {
        let resolver = self.build_resolver();
        self.validate_variants(&resolver)?;
        let mut processor = VariantProcessor::new(resolver).with_force_apply(self.force_apply);
        if let Some(dir) = &self.processing.temp_dir {
            processor = processor.with_temp_dir(dir);
        }
        Ok(processor)
    }

    pub fn process_options(&self) -> ProcessOptions {
        ProcessOptions {
            variants: self.variants.clone(),
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of variants processed in parallel.
    /// When absent or null, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
    /// Directory for temporary working copies.
    pub temp_dir: Option<PathBuf>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub root: PathBuf,
    pub base_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("storage"),
            base_url: "/storage".to_string(),
        }
    }
}

impl StorageConfig {
    pub fn local_storage(&self) -> LocalStorage {
        LocalStorage::new(&self.root, &self.base_url)
    }
}

/// Path template settings applied to every [`Target`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TargetConfig {
    /// Template containing `:variant`. Omit to derive variant paths from the
    /// original path.
    pub variant_path: Option<String>,
    pub filenames: HashMap<String, String>,
    pub extensions: HashMap<String, String>,
}

impl TargetConfig {
    /// Target for an original stored at `original_path`.
    pub fn target(&self, original_path: &str) -> Target {
        let mut target = Target::new(original_path);
        if let Some(template) = &self.variant_path {
            target = target.with_variant_path(template.clone());
        }
        target.set_variant_filenames(self.filenames.clone());
        target.set_variant_extensions(self.extensions.clone());
        target
    }
}

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the base layer user overrides are merged on top of.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(HandlerConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved, in place.
/// - New keys from overlay are appended in overlay order.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                match base_table.get_mut(&key) {
                    Some(slot) => {
                        let base_val = std::mem::replace(slot, toml::Value::Boolean(false));
                        *slot = merge_toml(base_val, overlay_val);
                    }
                    None => {
                        base_table.insert(key, overlay_val);
                    }
                }
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<HandlerConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: HandlerConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `path`.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// validates the result and checks every chain resolves.
pub fn load_config(path: &Path) -> Result<HandlerConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(path)?;
    let config = resolve_config(base, overlay)?;
    config.validate_variants(&config.build_resolver())?;
    Ok(config)
}

/// Returns a fully-commented stock `file-variants.toml` with all keys and
/// explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# file-variants Configuration
# ===========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
# Unknown keys will cause an error.

# Fail a variant when one of its strategies does not apply to the file
# (e.g. resizing a PDF). When false the strategy is skipped.
force_apply = false

# ---------------------------------------------------------------------------
# Aliases
# ---------------------------------------------------------------------------
# Extra short names for strategies. Built in:
#   resize -> image-resize, auto-orient -> image-auto-orient,
#   watermark -> image-watermark, optimize -> image-optimize,
#   screenshot -> video-screenshot
[aliases]
# thumbify = "image-resize"

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum variants processed in parallel.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4

# Directory for temporary working copies (default: system temp dir).
# temp_dir = "/tmp"

# ---------------------------------------------------------------------------
# Storage
# ---------------------------------------------------------------------------
[storage]
# Directory stored files are written under.
root = "storage"

# Prefix of public URLs. A stored path is appended after a "/".
base_url = "/storage"

# ---------------------------------------------------------------------------
# Target paths
# ---------------------------------------------------------------------------
[target]
# Template for variant paths; ":variant" is replaced by the variant name.
# Omit to store variants next to the original, with the original's
# directory replaced by the variant name:
#   uploads/original/photo.jpg -> uploads/thumb/photo.jpg
# variant_path = "uploads/:variant/photo.jpg"

# Per-variant file name, keeping the extension.
[target.filenames]
# thumb = "thumbnail"

# Per-variant extension. An empty string drops the extension.
[target.extensions]
# thumb = "webp"

# ---------------------------------------------------------------------------
# Variants
# ---------------------------------------------------------------------------
# One table per variant. Each key is a strategy identifier (or alias) with
# its options; strategies run top to bottom.
#
# Built-in strategies:
#   image-resize       dimensions = "W" | "xH" | "WxH" | "WxH#" (crop) | "WxH!" (exact)
#                      convert_options = { quality = 90 }
#   image-auto-orient  quiet = true
#   image-watermark    watermark = "path/to/mark.png", position = "bottom-right"
#   image-optimize     quality = 85
#   video-screenshot   seconds = 1.0 | percentage = 10, ffmpeg = "ffmpeg",
#                      ffprobe = "ffprobe", timeout_seconds = 30
[variants]
# [variants.thumb]
# auto-orient = {}
# resize = { dimensions = "150x150#" }
#
# [variants.poster]
# screenshot = { percentage = 10 }
# resize = { dimensions = "800x" }
"##
}
