//! `image-watermark`: paste an overlay image onto a corner or the center.
//!
//! ```toml
//! watermark = { watermark = "assets/logo.png", position = "bottom-right" }
//! ```

use super::calculations::{Position, watermark_offset};
use super::codec::{EncodeOptions, load_image, save_image};
use super::{OptionsError, Strategy, StrategyError, StrategyOptions, is_image};
use crate::file::WorkingCopy;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Options {
    watermark: Option<PathBuf>,
    #[serde(default)]
    position: Position,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatermarkStrategy {
    watermark: Option<PathBuf>,
    position: Position,
}

impl WatermarkStrategy {
    pub fn new(watermark: Option<PathBuf>, position: Position) -> Self {
        Self {
            watermark,
            position,
        }
    }

    pub fn from_options(options: &StrategyOptions) -> Result<Box<dyn Strategy>, OptionsError> {
        let opts: Options = options.parse()?;
        Ok(Box::new(Self::new(opts.watermark, opts.position)))
    }
}

impl Strategy for WatermarkStrategy {
    fn applies_to(&self, file: &WorkingCopy) -> bool {
        is_image(file)
    }

    fn perform(&self, file: WorkingCopy) -> Result<WorkingCopy, StrategyError> {
        let Some(mark_path) = &self.watermark else {
            return Err(StrategyError::Invalid("no watermark image configured".into()));
        };
        let (mark, _) = load_image(mark_path).map_err(|e| {
            StrategyError::Invalid(format!(
                "Could not open watermark image at '{}': {e}",
                mark_path.display()
            ))
        })?;

        let (base, format) = load_image(file.path())?;
        let (x, y) = watermark_offset(
            (base.width(), base.height()),
            (mark.width(), mark.height()),
            self.position,
        );

        let mut marked = base;
        image::imageops::overlay(&mut marked, &mark, x, y);
        save_image(&marked, file.path(), format, EncodeOptions::default())?;
        Ok(file.refresh()?)
    }
}
