//! `image-auto-orient`: bake the EXIF orientation into the pixels.
//!
//! Cameras store rotation as an EXIF tag instead of rotating the pixels.
//! Anything that later ignores EXIF (resizers, browsers rendering a thumbnail
//! without metadata) would show the image sideways, so chains usually run
//! this step before `resize`.
//!
//! The image is rewritten without its EXIF block, so the fix is never
//! applied twice. Images that are already upright are left untouched.

use super::calculations::{Transform, orientation_transforms};
use super::codec::{EncodeOptions, load_image, save_image};
use super::{OptionsError, Strategy, StrategyError, StrategyOptions, is_image};
use crate::file::WorkingCopy;
use image::DynamicImage;
use serde::Deserialize;
use std::io::BufReader;
use std::path::Path;

/// Extensions whose containers can carry EXIF data.
const EXIF_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "tiff", "wav", // standard formats
    "3fr", "ari", "cap", "cr2", "crw", "dat", "dcf", "dcr", "dcs", "dng", "eip", "erf", "k25",
    "kdc", "lfp", "ndf", "nef", "nrw", "pxn", "r3d", "raf", "raw", "rdc", "rw2", "rwz",
];

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Options {
    #[serde(default = "default_quiet")]
    quiet: bool,
}

fn default_quiet() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoOrientStrategy {
    /// Swallow unreadable EXIF data instead of failing.
    quiet: bool,
}

impl AutoOrientStrategy {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }

    pub fn from_options(options: &StrategyOptions) -> Result<Box<dyn Strategy>, OptionsError> {
        let opts: Options = options.parse()?;
        Ok(Box::new(Self::new(opts.quiet)))
    }
}

impl Strategy for AutoOrientStrategy {
    fn applies_to(&self, file: &WorkingCopy) -> bool {
        is_image(file)
            && file.extension().is_none_or(|ext| {
                EXIF_EXTENSIONS
                    .iter()
                    .any(|candidate| ext.eq_ignore_ascii_case(candidate))
            })
    }

    fn perform(&self, file: WorkingCopy) -> Result<WorkingCopy, StrategyError> {
        let orientation = match read_orientation(file.path()) {
            Ok(value) => value,
            Err(e) if self.quiet => {
                log::debug!("ignoring unreadable EXIF in {}: {e}", file.path().display());
                return Ok(file);
            }
            Err(e) => return Err(e),
        };

        let transforms = orientation_transforms(orientation.unwrap_or(1));
        if transforms.is_empty() {
            return Ok(file);
        }

        log::debug!(
            "re-orienting {} (EXIF orientation {})",
            file.path().display(),
            orientation.unwrap_or(1)
        );
        let (img, format) = load_image(file.path())?;
        let upright = transforms.iter().fold(img, apply_transform);
        save_image(&upright, file.path(), format, EncodeOptions::default())?;
        Ok(file.refresh()?)
    }
}

/// EXIF orientation tag of the primary image, `None` when absent.
fn read_orientation(path: &Path) -> Result<Option<u32>, StrategyError> {
    let file = std::fs::File::open(path)?;
    let mut reader = BufReader::new(file);
    let exif = match exif::Reader::new().read_from_container(&mut reader) {
        Ok(exif) => exif,
        // No EXIF block at all is the same as no orientation tag.
        Err(exif::Error::NotFound(_)) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(exif
        .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|field| field.value.get_uint(0)))
}

fn apply_transform(img: DynamicImage, transform: &Transform) -> DynamicImage {
    match transform {
        Transform::FlipHorizontal => img.fliph(),
        Transform::FlipVertical => img.flipv(),
        Transform::Rotate90 => img.rotate90(),
        Transform::Rotate180 => img.rotate180(),
        Transform::Rotate270 => img.rotate270(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::Outcome;
    use crate::test_helpers::{create_test_jpeg, create_test_jpeg_with_orientation, working_copy};
    use tempfile::TempDir;

    fn jpeg_copy(path: &Path, name: &str) -> WorkingCopy {
        WorkingCopy::new(path, Some(name.into()), Some("image/jpeg".into())).unwrap()
    }

    #[test]
    fn rotates_orientation_six() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("sideways.jpg");
        create_test_jpeg_with_orientation(&path, 40, 20, 6);
        assert_eq!(read_orientation(&path).unwrap(), Some(6));

        let file = jpeg_copy(&path, "sideways.jpg");
        let Outcome::Applied(out) = AutoOrientStrategy::new(true).apply(&file) else {
            panic!("expected Applied");
        };
        assert_eq!(image::image_dimensions(out.path()).unwrap(), (20, 40));
        // EXIF stripped, a second pass is a no-op
        assert_eq!(read_orientation(out.path()).unwrap(), None);
    }

    #[test]
    fn upright_image_is_untouched() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("plain.jpg");
        create_test_jpeg(&path, 40, 20);
        let before = std::fs::read(&path).unwrap();

        let file = jpeg_copy(&path, "plain.jpg");
        let Outcome::Applied(out) = AutoOrientStrategy::new(false).apply(&file) else {
            panic!("expected Applied");
        };
        assert_eq!(out, file);
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[test]
    fn applies_only_to_exif_capable_extensions() {
        let tmp = TempDir::new().unwrap();
        let strategy = AutoOrientStrategy::new(true);
        assert!(strategy.applies_to(&working_copy(tmp.path(), "a.JPG", "image/jpeg")));
        assert!(strategy.applies_to(&working_copy(tmp.path(), "b.cr2", "image/x-canon-cr2")));
        assert!(!strategy.applies_to(&working_copy(tmp.path(), "c.png", "image/png")));
        assert!(!strategy.applies_to(&working_copy(tmp.path(), "d.jpg", "text/plain")));
    }

    #[test]
    fn applies_when_extension_missing() {
        let tmp = TempDir::new().unwrap();
        let file = working_copy(tmp.path(), "upload", "image/jpeg");
        assert!(AutoOrientStrategy::new(true).applies_to(&file));
    }

    #[test]
    fn quiet_ignores_broken_exif() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("broken.jpg");
        // SOI, then an APP1 "Exif" segment with a truncated TIFF header
        std::fs::write(
            &path,
            [0xFF, 0xD8, 0xFF, 0xE1, 0x00, 0x0A, b'E', b'x', b'i', b'f', 0, 0, b'M', b'M'],
        )
        .unwrap();
        let file = jpeg_copy(&path, "broken.jpg");

        assert!(matches!(
            AutoOrientStrategy::new(true).apply(&file),
            Outcome::Applied(_)
        ));
        assert!(matches!(
            AutoOrientStrategy::new(false).apply(&file),
            Outcome::Failed(_)
        ));
    }

    #[test]
    fn quiet_defaults_to_true() {
        assert!(AutoOrientStrategy::from_options(&StrategyOptions::new()).is_ok());
        assert!(
            AutoOrientStrategy::from_options(&StrategyOptions::new().with("quiet", "yes")).is_err()
        );
    }
}
