//! Shared test utilities for the file-variants test suite.
//!
//! Provides synthetic image writers and spy strategies that make chain
//! behavior observable without real pixel work.
//!
//! # Usage
//!
//! ```rust,ignore
//! use crate::test_helpers::*;
//!
//! let tmp = TempDir::new().unwrap();
//! let file = working_copy(tmp.path(), "a.txt", "text/plain");
//! let resolver = spy_resolver();
//! ```

use std::path::Path;

use crate::file::WorkingCopy;
use crate::strategy::{Strategy, StrategyError, StrategyOptions, StrategyResolver};

// =========================================================================
// Fixture files
// =========================================================================

/// Write a gradient JPEG so resize and crop results are distinguishable.
pub fn create_test_jpeg(path: &Path, width: u32, height: u32) {
    std::fs::write(path, jpeg_bytes(width, height)).unwrap();
}

pub fn create_test_png(path: &Path, width: u32, height: u32) {
    let img = image::RgbaImage::from_fn(width, height, |x, y| {
        image::Rgba([(x % 256) as u8, (y % 256) as u8, 200, 255])
    });
    img.save_with_format(path, image::ImageFormat::Png).unwrap();
}

/// Write a JPEG carrying an EXIF `Orientation` tag.
pub fn create_test_jpeg_with_orientation(path: &Path, width: u32, height: u32, orientation: u16) {
    let jpeg = jpeg_bytes(width, height);

    // Big-endian TIFF with a single IFD0 entry: Orientation (0x0112), SHORT, 1
    let mut tiff = vec![b'M', b'M', 0x00, 0x2A, 0, 0, 0, 8, 0, 1, 0x01, 0x12, 0, 3, 0, 0, 0, 1];
    tiff.extend_from_slice(&orientation.to_be_bytes());
    tiff.extend_from_slice(&[0, 0, 0, 0, 0, 0]);

    let mut payload = b"Exif\0\0".to_vec();
    payload.extend_from_slice(&tiff);
    let len = (payload.len() + 2) as u16;

    let mut out = Vec::with_capacity(jpeg.len() + payload.len() + 4);
    out.extend_from_slice(&jpeg[..2]); // SOI
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(&payload);
    out.extend_from_slice(&jpeg[2..]);
    std::fs::write(path, out).unwrap();
}

fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    let mut buffer = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut buffer, image::ImageFormat::Jpeg)
        .unwrap();
    buffer.into_inner()
}

/// Write `name` with some text content and wrap it in a working copy.
pub fn working_copy(dir: &Path, name: &str, mime_type: &str) -> WorkingCopy {
    let path = dir.join(name);
    std::fs::write(&path, format!("contents of {name}")).unwrap();
    WorkingCopy::new(path, Some(name.to_string()), Some(mime_type.to_string())).unwrap()
}

// =========================================================================
// Spy strategies
// =========================================================================

/// Renames the working copy. Makes chain order observable.
pub struct RenameStrategy {
    name: String,
}

impl RenameStrategy {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Strategy for RenameStrategy {
    fn perform(&self, file: WorkingCopy) -> Result<WorkingCopy, StrategyError> {
        Ok(file.with_name(self.name.clone()))
    }
}

/// Never applies to anything.
pub struct NeverApplicable;

impl Strategy for NeverApplicable {
    fn applies_to(&self, _file: &WorkingCopy) -> bool {
        false
    }

    fn perform(&self, _file: WorkingCopy) -> Result<WorkingCopy, StrategyError> {
        panic!("perform called on a strategy that never applies")
    }
}

/// Always fails.
pub struct FailingStrategy;

impl Strategy for FailingStrategy {
    fn perform(&self, _file: WorkingCopy) -> Result<WorkingCopy, StrategyError> {
        Err(StrategyError::Invalid("spy failure".into()))
    }
}

/// Writes a sibling file and hands it back, like a frame extractor does.
pub struct SiblingStrategy;

impl Strategy for SiblingStrategy {
    fn perform(&self, file: WorkingCopy) -> Result<WorkingCopy, StrategyError> {
        let sibling = file.path().with_extension("sibling");
        std::fs::write(&sibling, b"derived")?;
        Ok(file.with_data(sibling)?.with_name("derived.txt"))
    }
}

/// Resolver with the spy strategies registered.
///
/// | Identifier | Strategy |
/// |---|---|
/// | `rename` | [`RenameStrategy`] taking its name from the `name` option |
/// | `never` | [`NeverApplicable`] |
/// | `fail` | [`FailingStrategy`] |
/// | `sibling` | [`SiblingStrategy`] |
pub fn spy_resolver() -> StrategyResolver {
    let mut resolver = StrategyResolver::new();
    resolver.register("rename", |options: &StrategyOptions| {
        #[derive(serde::Deserialize)]
        struct Opts {
            name: String,
        }
        let opts: Opts = options.parse()?;
        Ok(Box::new(RenameStrategy::new(opts.name)))
    });
    resolver.register("never", |_: &StrategyOptions| Ok(Box::new(NeverApplicable)));
    resolver.register("fail", |_: &StrategyOptions| Ok(Box::new(FailingStrategy)));
    resolver.register("sibling", |_: &StrategyOptions| Ok(Box::new(SiblingStrategy)));
    resolver
}
