//! Storage path templating for originals and their variants.
//!
//! A [`Target`] is built once per upload from the path the original is
//! stored at. Variant paths are derived from it:
//!
//! ```text
//! original:        uploads/2024/original/photo.jpg
//! variant "thumb": uploads/2024/thumb/photo.jpg        (directory replaced)
//! with template "media/:variant/cover.jpg":
//! variant "thumb": media/thumb/cover.jpg
//! ```
//!
//! Per-variant filename and extension overrides are applied after the
//! placeholder is substituted, filename first. Storage paths are always
//! `/`-separated strings, independent of the host platform.

use crate::file::extension_of;
use std::collections::HashMap;

/// Token replaced by the variant name in path templates.
pub const VARIANT_PLACEHOLDER: &str = ":variant";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Target {
    original_path: String,
    variant_path: Option<String>,
    variant_filenames: HashMap<String, String>,
    variant_extensions: HashMap<String, String>,
}

impl Target {
    pub fn new(original_path: impl Into<String>) -> Self {
        Self {
            original_path: original_path.into(),
            ..Self::default()
        }
    }

    /// Use an explicit template containing [`VARIANT_PLACEHOLDER`].
    pub fn with_variant_path(mut self, template: impl Into<String>) -> Self {
        self.variant_path = Some(template.into()).filter(|t: &String| !t.is_empty());
        self
    }

    /// Store `variant` under a different file name. The extension is kept.
    pub fn set_variant_filename(&mut self, variant: impl Into<String>, filename: impl Into<String>) {
        self.variant_filenames.insert(variant.into(), filename.into());
    }

    /// Store `variant` with a different extension. An empty extension drops it.
    pub fn set_variant_extension(&mut self, variant: impl Into<String>, extension: impl Into<String>) {
        self.variant_extensions
            .insert(variant.into(), extension.into());
    }

    /// Replace all filename overrides.
    pub fn set_variant_filenames(&mut self, filenames: HashMap<String, String>) {
        self.variant_filenames = filenames;
    }

    /// Replace all extension overrides.
    pub fn set_variant_extensions(&mut self, extensions: HashMap<String, String>) {
        self.variant_extensions = extensions;
    }

    /// Storage path of the original, verbatim.
    pub fn original(&self) -> &str {
        &self.original_path
    }

    /// Storage path of the named variant.
    pub fn variant(&self, variant: &str) -> String {
        let template = match &self.variant_path {
            Some(template) => template.clone(),
            None => self.derived_template(),
        };
        let mut path = template.replace(VARIANT_PLACEHOLDER, variant);

        if let Some(filename) = self.variant_filenames.get(variant) {
            path = replace_file_name(&path, filename);
        }
        if let Some(extension) = self.variant_extensions.get(variant) {
            path = replace_extension(&path, extension);
        }
        path
    }

    /// The original path with its containing directory swapped for the
    /// placeholder.
    fn derived_template(&self) -> String {
        let (dir, file) = split_dir(&self.original_path);
        let segments: Vec<&str> = dir.map(|d| d.split('/').collect()).unwrap_or_default();
        if segments.len() < 2 {
            return format!("{VARIANT_PLACEHOLDER}/{file}");
        }
        let parent = segments[..segments.len() - 1].join("/");
        format!("{parent}/{VARIANT_PLACEHOLDER}/{file}")
    }
}

/// Split into `(directory, file name)`. A leading `/` counts as a directory.
fn split_dir(path: &str) -> (Option<&str>, &str) {
    match path.rfind('/') {
        None => (None, path),
        Some(0) => (Some("/"), &path[1..]),
        Some(idx) => (Some(&path[..idx]), &path[idx + 1..]),
    }
}

fn join(dir: Option<&str>, file: &str) -> String {
    match dir {
        None => file.to_string(),
        Some("/") => format!("/{file}"),
        Some(dir) => format!("{dir}/{file}"),
    }
}

fn stem_and_extension(file: &str) -> (&str, Option<&str>) {
    match extension_of(file) {
        Some(ext) => (&file[..file.len() - ext.len() - 1], Some(ext)),
        None => (file, None),
    }
}

fn replace_file_name(path: &str, filename: &str) -> String {
    let (dir, file) = split_dir(path);
    let new_file = match stem_and_extension(file).1 {
        Some(ext) => format!("{filename}.{ext}"),
        None => filename.to_string(),
    };
    join(dir, &new_file)
}

fn replace_extension(path: &str, extension: &str) -> String {
    let (dir, file) = split_dir(path);
    let stem = stem_and_extension(file).0;
    let new_file = if extension.is_empty() {
        stem.to_string()
    } else {
        format!("{stem}.{extension}")
    };
    join(dir, &new_file)
}
