//! `image-optimize`: re-encode an image to shave bytes.
//!
//! JPEGs are re-encoded at the configured quality, PNGs with the best zlib
//! compression, other formats as-is. Metadata is dropped on the way. The new
//! bytes only replace the file when they are actually smaller.

use super::codec::{EncodeOptions, Quality, encode_image, load_image};
use super::{OptionsError, Strategy, StrategyError, StrategyOptions, is_image};
use crate::file::WorkingCopy;
use serde::Deserialize;

const DEFAULT_QUALITY: u32 = 85;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Options {
    quality: Option<Quality>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizeStrategy {
    quality: Quality,
}

impl OptimizeStrategy {
    pub fn new(quality: Quality) -> Self {
        Self { quality }
    }

    pub fn from_options(options: &StrategyOptions) -> Result<Box<dyn Strategy>, OptionsError> {
        let opts: Options = options.parse()?;
        let quality = opts.quality.unwrap_or(Quality::new(DEFAULT_QUALITY));
        Ok(Box::new(Self::new(quality)))
    }
}

impl Strategy for OptimizeStrategy {
    fn applies_to(&self, file: &WorkingCopy) -> bool {
        is_image(file)
    }

    fn perform(&self, file: WorkingCopy) -> Result<WorkingCopy, StrategyError> {
        let (img, format) = load_image(file.path())?;
        let encoded = encode_image(
            &img,
            format,
            EncodeOptions {
                quality: self.quality,
                best_compression: true,
            },
        )?;

        let before = file.size();
        if (encoded.len() as u64) < before {
            log::debug!(
                "optimized {}: {} -> {} bytes",
                file.path().display(),
                before,
                encoded.len()
            );
            std::fs::write(file.path(), encoded)?;
            Ok(file.refresh()?)
        } else {
            log::debug!("{} already optimal", file.path().display());
            Ok(file)
        }
    }
}
