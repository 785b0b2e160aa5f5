//! Image transcoding: resize and re-encode
//!
//! Decodes source bytes, applies the aspect-ratio-preserving resize policy
//! and re-encodes to a web-friendly format at the requested quality.

pub mod calculations;
pub mod mime;
pub mod mock;
pub mod processor;

pub use calculations::{Dimensions, ResizePlan};
pub use mock::MockTranscoder;
pub use processor::ImageTranscoder;

use crate::models::{ResizeSpec, TranscodeResult};
use crate::Result;
use async_trait::async_trait;

/// Metadata read from a decoded source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceImage {
    pub width: u32,
    pub height: u32,
    pub format: ::image::ImageFormat,
    pub byte_length: usize,
}

#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn transform(&self, image_data: &[u8], spec: &ResizeSpec) -> Result<TranscodeResult>;
}
