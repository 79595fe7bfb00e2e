//! `image-resize`: scale or crop an image to configured dimensions.
//!
//! ```toml
//! [variants.thumb]
//! resize = { dimensions = "150x150#", convert_options = { quality = 80 } }
//! ```
//!
//! See [`ResizeSpec`] for the dimension syntax. The image is rewritten in
//! place, in its own format, with Lanczos3 resampling.

use super::calculations::{ResizePlan, ResizeSpec, center_crop_offset, parse_dimensions, plan_resize};
use super::codec::{EncodeOptions, Quality, load_image, save_image};
use super::{OptionsError, Strategy, StrategyError, StrategyOptions, is_image};
use crate::file::WorkingCopy;
use image::imageops::FilterType;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Options {
    dimensions: String,
    #[serde(default, alias = "convertOptions")]
    convert_options: ConvertOptions,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConvertOptions {
    quality: Option<Quality>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResizeStrategy {
    spec: ResizeSpec,
    quality: Quality,
}

impl ResizeStrategy {
    pub fn new(spec: ResizeSpec, quality: Quality) -> Self {
        Self { spec, quality }
    }

    pub fn from_options(options: &StrategyOptions) -> Result<Box<dyn Strategy>, OptionsError> {
        let opts: Options = options.parse()?;
        let spec = parse_dimensions(&opts.dimensions).map_err(|reason| OptionsError::Value {
            key: "dimensions",
            reason,
        })?;
        let quality = opts.convert_options.quality.unwrap_or_default();
        Ok(Box::new(Self::new(spec, quality)))
    }
}

impl Strategy for ResizeStrategy {
    fn applies_to(&self, file: &WorkingCopy) -> bool {
        is_image(file)
    }

    fn perform(&self, file: WorkingCopy) -> Result<WorkingCopy, StrategyError> {
        let (img, format) = load_image(file.path())?;
        let plan = plan_resize((img.width(), img.height()), self.spec);
        log::debug!(
            "resizing {} from {}x{} to {:?}",
            file.path().display(),
            img.width(),
            img.height(),
            plan.output()
        );

        let resized = match plan {
            ResizePlan::Scale { width, height } => img.resize_exact(width, height, FilterType::Lanczos3),
            ResizePlan::FillCrop {
                fill,
                width,
                height,
            } => {
                let filled = img.resize_exact(fill.0, fill.1, FilterType::Lanczos3);
                let (x, y) = center_crop_offset(fill, (width, height));
                filled.crop_imm(x, y, width, height)
            }
        };

        let encode = EncodeOptions {
            quality: self.quality,
            best_compression: false,
        };
        save_image(&resized, file.path(), format, encode)?;
        Ok(file.refresh()?)
    }
}
