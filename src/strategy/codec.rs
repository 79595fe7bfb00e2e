//! Image decode/encode shared by the image strategies.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, TIFF, WebP, GIF, BMP) | `image::ImageReader` with content sniffing |
//! | Encode JPEG | `image::codecs::jpeg::JpegEncoder` with [`Quality`] |
//! | Encode PNG | `image::codecs::png::PngEncoder`, best compression when asked |
//! | Everything else | `DynamicImage::write_to` in the source format |
//!
//! Images are always written back in the format they were read in, so a
//! strategy never silently changes a file's type.

use super::StrategyError;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::{DynamicImage, ImageFormat, ImageReader};
use serde::Deserialize;
use std::io::Cursor;
use std::path::Path;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "u32")]
pub struct Quality(u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl From<u32> for Quality {
    fn from(value: u32) -> Self {
        Self::new(value)
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(90)
    }
}

/// Encoder knobs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncodeOptions {
    pub quality: Quality,
    pub best_compression: bool,
}

/// Load and decode an image from disk, sniffing the format from its bytes.
pub fn load_image(path: &Path) -> Result<(DynamicImage, ImageFormat), StrategyError> {
    let reader = ImageReader::open(path)?.with_guessed_format()?;
    let format = reader.format().ok_or_else(|| {
        StrategyError::Invalid(format!("Unrecognized image format: {}", path.display()))
    })?;
    Ok((reader.decode()?, format))
}

/// Encode an image into memory.
pub fn encode_image(
    img: &DynamicImage,
    format: ImageFormat,
    options: EncodeOptions,
) -> Result<Vec<u8>, StrategyError> {
    let mut buffer = Cursor::new(Vec::new());
    match format {
        ImageFormat::Jpeg => {
            // JPEG has no alpha channel.
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            let encoder = JpegEncoder::new_with_quality(&mut buffer, options.quality.value() as u8);
            rgb.write_with_encoder(encoder)?;
        }
        ImageFormat::Png => {
            let compression = if options.best_compression {
                CompressionType::Best
            } else {
                CompressionType::Default
            };
            let encoder =
                PngEncoder::new_with_quality(&mut buffer, compression, PngFilter::Adaptive);
            img.write_with_encoder(encoder)?;
        }
        other => img.write_to(&mut buffer, other)?,
    }
    Ok(buffer.into_inner())
}

/// Encode an image and replace the file at `path`.
pub fn save_image(
    img: &DynamicImage,
    path: &Path,
    format: ImageFormat,
    options: EncodeOptions,
) -> Result<(), StrategyError> {
    let bytes = encode_image(img, format, options)?;
    std::fs::write(path, bytes)?;
    Ok(())
}
