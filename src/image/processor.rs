use super::calculations::{plan_resize, resolve_target, Dimensions, ResizePlan};
use super::{SourceImage, Transcoder};
use crate::models::{
    compression_ratio_percent, Config, FitMode, ImageKind, ResizeSpec, TranscodeResult,
    DEFAULT_WIDTH,
};
use crate::{Error, Result};
use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, RgbaImage};
use std::io::Cursor;
use tracing::{debug, info, warn};

/// Transcoder backed by the `image` crate.
pub struct ImageTranscoder {
    default_width: u32,
}

impl ImageTranscoder {
    pub fn new(config: &Config) -> Self {
        Self::with_default_width(config.default_width)
    }

    pub fn with_default_width(default_width: u32) -> Self {
        Self { default_width }
    }

    /// Decode `image_data` and report what it is.
    pub fn inspect(image_data: &[u8]) -> Result<SourceImage> {
        decode(image_data).map(|(source, _)| source)
    }

    fn transform_sync(
        default_width: u32,
        image_data: &[u8],
        spec: &ResizeSpec,
    ) -> Result<TranscodeResult> {
        spec.validate()?;

        let (source, image) = decode(image_data)?;
        let source_dims = Dimensions::new(source.width, source.height);
        debug!(
            "Original dimensions: {}x{}, Format: {:?}",
            source.width, source.height, source.format
        );

        let target = resolve_target(source_dims, spec.width, spec.height, default_width)?;
        let plan = plan_resize(source_dims, target, spec.fit);
        let resolved_format = resolve_output_kind(source.format, spec);

        let output = apply_plan(image, &plan, spec.fit);
        // validate() guarantees 1..=100
        let quality = spec.quality as u8;
        let bytes = encode(&output, resolved_format, quality)?;

        let new_byte_length = bytes.len();
        info!(
            "Resized to: {}x{} ({}), Original size: {} bytes, New size: {} bytes",
            plan.output.width,
            plan.output.height,
            resolved_format,
            source.byte_length,
            new_byte_length
        );

        Ok(TranscodeResult {
            bytes,
            source_format: format_name(source.format),
            resolved_format,
            width: plan.output.width,
            height: plan.output.height,
            original_byte_length: source.byte_length,
            new_byte_length,
            compression_ratio_percent: compression_ratio_percent(
                source.byte_length,
                new_byte_length,
            ),
        })
    }
}

impl Default for ImageTranscoder {
    fn default() -> Self {
        Self::with_default_width(DEFAULT_WIDTH)
    }
}

fn decode(image_data: &[u8]) -> Result<(SourceImage, DynamicImage)> {
    let format = image::guess_format(image_data)
        .map_err(|e| Error::Decode(format!("Unrecognized image data: {}", e)))?;
    let image = image::load_from_memory_with_format(image_data, format)
        .map_err(|e| Error::Decode(format!("Failed to decode {:?} image: {}", format, e)))?;

    let source = SourceImage {
        width: image.width(),
        height: image.height(),
        format,
        byte_length: image_data.len(),
    };
    Ok((source, image))
}

fn format_name(format: ImageFormat) -> String {
    format
        .extensions_str()
        .first()
        .map(|ext| ext.to_string())
        .unwrap_or_else(|| format!("{:?}", format).to_ascii_lowercase())
}

fn kind_of(format: ImageFormat) -> Option<ImageKind> {
    match format {
        ImageFormat::Jpeg => Some(ImageKind::Jpeg),
        ImageFormat::Png => Some(ImageKind::Png),
        ImageFormat::WebP => Some(ImageKind::Webp),
        ImageFormat::Tiff => Some(ImageKind::Tiff),
        ImageFormat::Gif => Some(ImageKind::Gif),
        _ => None,
    }
}

/// Explicit output format wins; otherwise keep the source container, and
/// fall back to JPEG for containers without a known content type.
fn resolve_output_kind(source: ImageFormat, spec: &ResizeSpec) -> ImageKind {
    if let Some(format) = spec.output_format {
        return format.into();
    }
    match kind_of(source) {
        Some(kind) => kind,
        None => {
            warn!(
                "Source format {:?} has no dedicated encoder policy, encoding as jpeg",
                source
            );
            ImageKind::Jpeg
        }
    }
}

fn apply_plan(image: DynamicImage, plan: &ResizePlan, fit: FitMode) -> DynamicImage {
    let unchanged =
        image.width() == plan.resize_to.width && image.height() == plan.resize_to.height;
    let resized = if unchanged {
        image
    } else {
        image.resize_exact(
            plan.resize_to.width,
            plan.resize_to.height,
            FilterType::Lanczos3,
        )
    };

    if plan.output == plan.resize_to {
        return resized;
    }

    let (x, y) = plan.offset();
    match fit {
        FitMode::Cover => resized.crop_imm(x, y, plan.output.width, plan.output.height),
        FitMode::Contain => {
            let mut canvas = RgbaImage::new(plan.output.width, plan.output.height);
            image::imageops::overlay(&mut canvas, &resized.to_rgba8(), x as i64, y as i64);
            DynamicImage::ImageRgba8(canvas)
        }
        _ => resized,
    }
}

fn png_compression(quality: u8) -> CompressionType {
    // PNG is lossless; quality only trades encode time for size.
    if quality <= 50 {
        CompressionType::Best
    } else {
        CompressionType::Default
    }
}

fn encode(image: &DynamicImage, kind: ImageKind, quality: u8) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();

    let result = match kind {
        ImageKind::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
            DynamicImage::ImageRgb8(image.to_rgb8()).write_with_encoder(encoder)
        }
        ImageKind::Png => {
            let encoder = PngEncoder::new_with_quality(
                &mut buffer,
                png_compression(quality),
                PngFilter::Adaptive,
            );
            image.write_with_encoder(encoder)
        }
        ImageKind::Webp => return encode_webp(image, quality),
        ImageKind::Tiff => image.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Tiff),
        ImageKind::Gif => DynamicImage::ImageRgba8(image.to_rgba8())
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Gif),
    };

    result.map_err(|e| Error::Encode(format!("Failed to encode {}: {}", kind, e)))?;
    Ok(buffer)
}

/// Lossy WebP through libwebp; the `image` crate only writes lossless WebP.
fn encode_webp(image: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let pixels = if image.color().has_alpha() {
        DynamicImage::ImageRgba8(image.to_rgba8())
    } else {
        DynamicImage::ImageRgb8(image.to_rgb8())
    };

    let encoder = webp::Encoder::from_image(&pixels)
        .map_err(|e| Error::Encode(format!("Failed to encode webp: {}", e)))?;
    Ok(encoder.encode(f32::from(quality)).to_vec())
}

#[async_trait]
impl Transcoder for ImageTranscoder {
    async fn transform(&self, image_data: &[u8], spec: &ResizeSpec) -> Result<TranscodeResult> {
        let default_width = self.default_width;
        let image_data = image_data.to_vec();
        let spec = spec.clone();

        tokio::task::spawn_blocking(move || Self::transform_sync(default_width, &image_data, &spec))
            .await
            .map_err(|e| Error::Invariant(format!("Transcode task join error: {}", e)))?
    }
}
