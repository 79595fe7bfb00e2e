//! Pure calculation functions for image geometry.
//!
//! All functions here are pure and testable without any I/O or images.

use serde::Deserialize;

/// A parsed `dimensions` option of the resize strategy.
///
/// | Syntax | Meaning |
/// |---|---|
/// | `W`, `Wx` | fixed width, height follows the aspect ratio |
/// | `xH` | fixed height, width follows the aspect ratio |
/// | `WxH` | fit by the longer side of the source |
/// | `WxH#` | fill `W×H`, then center-crop the overflow |
/// | `WxH!` | exactly `W×H`, ratio ignored |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeSpec {
    Width(u32),
    Height(u32),
    Auto { width: u32, height: u32 },
    Crop { width: u32, height: u32 },
    Exact { width: u32, height: u32 },
}

/// Parse a dimensions string such as `"800x600#"`.
///
/// # Examples
/// ```
/// # use file_variants::strategy::calculations::{parse_dimensions, ResizeSpec};
/// assert_eq!(parse_dimensions("300"), Ok(ResizeSpec::Width(300)));
/// assert_eq!(parse_dimensions("x200"), Ok(ResizeSpec::Height(200)));
/// assert_eq!(
///     parse_dimensions("150x150#"),
///     Ok(ResizeSpec::Crop { width: 150, height: 150 })
/// );
/// ```
pub fn parse_dimensions(input: &str) -> Result<ResizeSpec, String> {
    let input = input.trim();
    let parts: Vec<&str> = input.split('x').collect();

    match parts.as_slice() {
        [width] | [width, ""] => Ok(ResizeSpec::Width(parse_edge(width, input)?)),
        ["", height] => Ok(ResizeSpec::Height(parse_edge(height, input)?)),
        [width, height] => {
            let width = parse_edge(width, input)?;
            if let Some(h) = height.strip_suffix('#') {
                Ok(ResizeSpec::Crop {
                    width,
                    height: parse_edge(h, input)?,
                })
            } else if let Some(h) = height.strip_suffix('!') {
                Ok(ResizeSpec::Exact {
                    width,
                    height: parse_edge(h, input)?,
                })
            } else {
                Ok(ResizeSpec::Auto {
                    width,
                    height: parse_edge(height, input)?,
                })
            }
        }
        _ => Err(format!("malformed dimensions '{input}'")),
    }
}

fn parse_edge(value: &str, input: &str) -> Result<u32, String> {
    match value.parse::<u32>() {
        Ok(0) => Err(format!("zero-sized edge in dimensions '{input}'")),
        Ok(n) => Ok(n),
        Err(_) => Err(format!("malformed dimensions '{input}'")),
    }
}

/// What the resize strategy will do to an image of a given size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizePlan {
    /// Scale the whole image to exactly these dimensions.
    Scale { width: u32, height: u32 },
    /// Scale to `fill`, then crop a centered `width × height` window.
    FillCrop {
        fill: (u32, u32),
        width: u32,
        height: u32,
    },
}

impl ResizePlan {
    /// Final output dimensions.
    pub fn output(&self) -> (u32, u32) {
        match *self {
            ResizePlan::Scale { width, height } | ResizePlan::FillCrop { width, height, .. } => {
                (width, height)
            }
        }
    }
}

/// Resolve a [`ResizeSpec`] against the source dimensions.
///
/// `Auto` picks landscape for wide sources and portrait for tall ones. For
/// square sources the requested box decides, and a square box means exact.
pub fn plan_resize(source: (u32, u32), spec: ResizeSpec) -> ResizePlan {
    let (src_w, src_h) = source;
    match spec {
        ResizeSpec::Width(width) => ResizePlan::Scale {
            width,
            height: height_for_width(source, width),
        },
        ResizeSpec::Height(height) => ResizePlan::Scale {
            width: width_for_height(source, height),
            height,
        },
        ResizeSpec::Auto { width, height } => {
            let landscape = src_h < src_w || (src_h == src_w && height < width);
            let portrait = src_h > src_w || (src_h == src_w && height > width);
            if landscape {
                plan_resize(source, ResizeSpec::Width(width))
            } else if portrait {
                plan_resize(source, ResizeSpec::Height(height))
            } else {
                ResizePlan::Scale { width, height }
            }
        }
        ResizeSpec::Exact { width, height } => ResizePlan::Scale { width, height },
        ResizeSpec::Crop { width, height } => ResizePlan::FillCrop {
            fill: calculate_fill_dimensions(source, (width, height)),
            width,
            height,
        },
    }
}

fn height_for_width(source: (u32, u32), width: u32) -> u32 {
    let (src_w, src_h) = source;
    ((src_h as f64 * width as f64 / src_w as f64).round() as u32).max(1)
}

fn width_for_height(source: (u32, u32), height: u32) -> u32 {
    let (src_w, src_h) = source;
    ((src_w as f64 * height as f64 / src_h as f64).round() as u32).max(1)
}

/// Calculate dimensions needed to fill a target area (resize before crop).
///
/// Returns dimensions that completely cover the target area while maintaining
/// the source aspect ratio. One dimension will match exactly, the other may exceed.
///
/// # Arguments
/// * `source` - Original image dimensions (width, height)
/// * `target` - Target area dimensions (width, height)
///
/// # Returns
/// * `(width, height)` - Fill dimensions (at least one matches target)
pub fn calculate_fill_dimensions(source: (u32, u32), target: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (tgt_w, tgt_h) = target;

    let src_aspect = src_w as f64 / src_h as f64;
    let tgt_aspect = tgt_w as f64 / tgt_h as f64;

    if src_aspect > tgt_aspect {
        // Source is wider: height will match, width will exceed
        let h = tgt_h;
        let w = ((h as f64 * src_aspect).round() as u32).max(tgt_w);
        (w, h)
    } else {
        // Source is taller: width will match, height will exceed
        let w = tgt_w;
        let h = ((w as f64 / src_aspect).round() as u32).max(tgt_h);
        (w, h)
    }
}

/// Top-left corner of a centered `crop` window inside `fill`.
pub fn center_crop_offset(fill: (u32, u32), crop: (u32, u32)) -> (u32, u32) {
    (
        fill.0.saturating_sub(crop.0) / 2,
        fill.1.saturating_sub(crop.1) / 2,
    )
}

/// Where a watermark is placed on the base image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Position {
    TopLeft,
    TopRight,
    BottomLeft,
    #[default]
    BottomRight,
    Center,
}

/// Top-left coordinate of the watermark on the base image.
///
/// Can be negative when the watermark is larger than the base.
pub fn watermark_offset(base: (u32, u32), mark: (u32, u32), position: Position) -> (i64, i64) {
    let (bw, bh) = (base.0 as i64, base.1 as i64);
    let (mw, mh) = (mark.0 as i64, mark.1 as i64);
    match position {
        Position::TopLeft => (0, 0),
        Position::TopRight => (bw - mw, 0),
        Position::BottomLeft => (0, bh - mh),
        Position::BottomRight => (bw - mw, bh - mh),
        // Halves round up on both sides.
        Position::Center => ((bw + 1) / 2 - (mw + 1) / 2, (bh + 1) / 2 - (mh + 1) / 2),
    }
}

/// Pixel operations that undo an EXIF orientation, in application order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    FlipHorizontal,
    FlipVertical,
    Rotate90,
    Rotate180,
    Rotate270,
}

/// Transforms that bring an image with EXIF `Orientation = value` upright.
///
/// Values outside 2..=8 (including the normal orientation 1) need nothing.
pub fn orientation_transforms(value: u32) -> &'static [Transform] {
    use Transform::*;
    match value {
        2 => &[FlipHorizontal],
        3 => &[Rotate180],
        4 => &[FlipVertical],
        5 => &[FlipVertical, Rotate90],
        6 => &[Rotate90],
        7 => &[FlipHorizontal, Rotate90],
        8 => &[Rotate270],
        _ => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // parse_dimensions
    // =========================================================================

    #[test]
    fn parse_width_only() {
        assert_eq!(parse_dimensions("300"), Ok(ResizeSpec::Width(300)));
        assert_eq!(parse_dimensions("300x"), Ok(ResizeSpec::Width(300)));
    }

    #[test]
    fn parse_height_only() {
        assert_eq!(parse_dimensions("x200"), Ok(ResizeSpec::Height(200)));
    }

    #[test]
    fn parse_box_modes() {
        assert_eq!(
            parse_dimensions("100x50"),
            Ok(ResizeSpec::Auto {
                width: 100,
                height: 50
            })
        );
        assert_eq!(
            parse_dimensions("100x50#"),
            Ok(ResizeSpec::Crop {
                width: 100,
                height: 50
            })
        );
        assert_eq!(
            parse_dimensions(" 100x50! "),
            Ok(ResizeSpec::Exact {
                width: 100,
                height: 50
            })
        );
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse_dimensions("").is_err());
        assert!(parse_dimensions("abc").is_err());
        assert!(parse_dimensions("10x20x30").is_err());
        assert!(parse_dimensions("0x20").is_err());
        assert!(parse_dimensions("10x20%").is_err());
    }

    // =========================================================================
    // plan_resize
    // =========================================================================

    #[test]
    fn plan_width_keeps_ratio() {
        let plan = plan_resize((400, 300), ResizeSpec::Width(200));
        assert_eq!(plan.output(), (200, 150));
    }

    #[test]
    fn plan_height_keeps_ratio() {
        let plan = plan_resize((400, 300), ResizeSpec::Height(150));
        assert_eq!(plan.output(), (200, 150));
    }

    #[test]
    fn plan_auto_landscape_source_fixes_width() {
        let spec = ResizeSpec::Auto {
            width: 100,
            height: 100,
        };
        assert_eq!(plan_resize((400, 200), spec).output(), (100, 50));
    }

    #[test]
    fn plan_auto_portrait_source_fixes_height() {
        let spec = ResizeSpec::Auto {
            width: 100,
            height: 100,
        };
        assert_eq!(plan_resize((200, 400), spec).output(), (50, 100));
    }

    #[test]
    fn plan_auto_square_source_follows_box() {
        let wide = ResizeSpec::Auto {
            width: 100,
            height: 50,
        };
        assert_eq!(plan_resize((300, 300), wide).output(), (100, 100));

        let tall = ResizeSpec::Auto {
            width: 50,
            height: 100,
        };
        assert_eq!(plan_resize((300, 300), tall).output(), (100, 100));

        let square = ResizeSpec::Auto {
            width: 80,
            height: 80,
        };
        assert_eq!(
            plan_resize((300, 300), square),
            ResizePlan::Scale {
                width: 80,
                height: 80
            }
        );
    }

    #[test]
    fn plan_exact_ignores_ratio() {
        let spec = ResizeSpec::Exact {
            width: 10,
            height: 90,
        };
        assert_eq!(plan_resize((400, 300), spec).output(), (10, 90));
    }

    #[test]
    fn plan_crop_fills_then_crops() {
        let spec = ResizeSpec::Crop {
            width: 100,
            height: 100,
        };
        assert_eq!(
            plan_resize((400, 200), spec),
            ResizePlan::FillCrop {
                fill: (200, 100),
                width: 100,
                height: 100
            }
        );
    }

    #[test]
    fn plan_never_produces_zero_edge() {
        let plan = plan_resize((4000, 10), ResizeSpec::Width(10));
        assert_eq!(plan.output(), (10, 1));
    }

    // =========================================================================
    // calculate_fill_dimensions
    // =========================================================================

    #[test]
    fn fill_wider_source() {
        // 3:2 source into a 1:1 target, height matches
        assert_eq!(calculate_fill_dimensions((600, 400), (200, 200)), (300, 200));
    }

    #[test]
    fn fill_taller_source() {
        // 2:3 source into a 1:1 target, width matches
        assert_eq!(calculate_fill_dimensions((400, 600), (200, 200)), (200, 300));
    }

    #[test]
    fn fill_same_aspect() {
        assert_eq!(calculate_fill_dimensions((800, 600), (400, 300)), (400, 300));
    }

    #[test]
    fn center_crop_offset_centers() {
        assert_eq!(center_crop_offset((300, 200), (200, 200)), (50, 0));
        assert_eq!(center_crop_offset((100, 100), (100, 100)), (0, 0));
    }

    // =========================================================================
    // watermark_offset
    // =========================================================================

    #[test]
    fn watermark_corners() {
        let base = (200, 100);
        let mark = (20, 10);
        assert_eq!(watermark_offset(base, mark, Position::TopLeft), (0, 0));
        assert_eq!(watermark_offset(base, mark, Position::TopRight), (180, 0));
        assert_eq!(watermark_offset(base, mark, Position::BottomLeft), (0, 90));
        assert_eq!(watermark_offset(base, mark, Position::BottomRight), (180, 90));
    }

    #[test]
    fn watermark_center_rounds_halves_up() {
        assert_eq!(
            watermark_offset((201, 100), (21, 11), Position::Center),
            (101 - 11, 50 - 6)
        );
    }

    #[test]
    fn watermark_position_default_is_bottom_right() {
        assert_eq!(Position::default(), Position::BottomRight);
    }

    #[test]
    fn orientation_table() {
        assert!(orientation_transforms(1).is_empty());
        assert!(orientation_transforms(0).is_empty());
        assert_eq!(orientation_transforms(6), &[Transform::Rotate90]);
        assert_eq!(
            orientation_transforms(5),
            &[Transform::FlipVertical, Transform::Rotate90]
        );
        assert_eq!(orientation_transforms(8), &[Transform::Rotate270]);
    }
}
