//! Pure dimension arithmetic for the resize policy.
//!
//! Nothing here touches pixels; the processor feeds the resulting plan to the
//! `image` crate.

use crate::models::FitMode;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Component-wise minimum, used to keep a target box within the source.
    fn clamp_to(self, bounds: Dimensions) -> Self {
        Self {
            width: self.width.min(bounds.width),
            height: self.height.min(bounds.height),
        }
    }
}

/// What the processor does to the decoded image: resize to `resize_to`, then
/// place it on (contain) or crop it to (cover) `output`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizePlan {
    pub resize_to: Dimensions,
    pub output: Dimensions,
}

impl ResizePlan {
    /// Offset of the resized image inside the output canvas (contain), or of
    /// the crop window inside the resized image (cover). Always centered.
    pub fn offset(&self) -> (u32, u32) {
        (
            self.resize_to.width.abs_diff(self.output.width) / 2,
            self.resize_to.height.abs_diff(self.output.height) / 2,
        )
    }
}

fn scale(value: u32, numerator: u32, denominator: u32) -> u32 {
    let scaled = (value as f64 * numerator as f64 / denominator as f64).round() as u32;
    scaled.max(1)
}

/// Resolve the requested box against the source aspect ratio.
///
/// A missing height is derived from the width (and vice versa); with neither
/// given, `default_width` stands in for the width.
pub fn resolve_target(
    source: Dimensions,
    width: Option<u32>,
    height: Option<u32>,
    default_width: u32,
) -> Result<Dimensions> {
    if source.width == 0 || source.height == 0 {
        return Err(Error::Decode(format!(
            "Degenerate source dimensions {}x{}",
            source.width, source.height
        )));
    }

    let target = match (width, height) {
        (Some(w), Some(h)) => Dimensions::new(w, h),
        (Some(w), None) => Dimensions::new(w, scale(w, source.height, source.width)),
        (None, Some(h)) => Dimensions::new(scale(h, source.width, source.height), h),
        (None, None) => Dimensions::new(
            default_width,
            scale(default_width, source.height, source.width),
        ),
    };

    if target.width == 0 || target.height == 0 {
        return Err(Error::InvalidSpec(format!(
            "Target dimensions {}x{} are not positive",
            target.width, target.height
        )));
    }
    Ok(target)
}

/// Whether the width ratio is the smaller of the two scale factors
/// (`tw/sw <= th/sh`), compared without floating point.
fn width_ratio_is_smaller(source: Dimensions, target: Dimensions) -> bool {
    target.width as u64 * source.height as u64 <= target.height as u64 * source.width as u64
}

fn scale_by_width(source: Dimensions, width: u32) -> Dimensions {
    Dimensions::new(width, scale(source.height, width, source.width))
}

fn scale_by_height(source: Dimensions, height: u32) -> Dimensions {
    Dimensions::new(scale(source.width, height, source.height), height)
}

/// Plan a resize of `source` into `target` under `fit`, never enlarging.
///
/// The box is first clamped to the source size, so every dimension in the
/// returned plan is at most the source's.
pub fn plan_resize(source: Dimensions, target: Dimensions, fit: FitMode) -> ResizePlan {
    let bounded = target.clamp_to(source);

    let inside = if width_ratio_is_smaller(source, bounded) {
        scale_by_width(source, bounded.width)
    } else {
        scale_by_height(source, bounded.height)
    };
    let outside = if width_ratio_is_smaller(source, bounded) {
        scale_by_height(source, bounded.height)
    } else {
        scale_by_width(source, bounded.width)
    };

    match fit {
        FitMode::Inside => ResizePlan {
            resize_to: inside,
            output: inside,
        },
        FitMode::Outside => ResizePlan {
            resize_to: outside,
            output: outside,
        },
        FitMode::Cover => ResizePlan {
            resize_to: outside,
            output: bounded,
        },
        FitMode::Contain => ResizePlan {
            resize_to: inside,
            output: bounded,
        },
        FitMode::Fill => ResizePlan {
            resize_to: bounded,
            output: bounded,
        },
    }
}
