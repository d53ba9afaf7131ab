use super::dimensions::{resample_filter, target_dimensions};
use super::mime::RasterFormat;
use super::stats::CompressionStats;
use super::ImageService;
use crate::models::{Config, Dimensions, ProcessingRequest, ProcessingResult, Strategy};
use crate::{Error, Result};
use async_trait::async_trait;
use image::codecs::bmp::BmpEncoder;
use image::codecs::gif::GifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::{ColorType, DynamicImage, ExtendedColorType};
use std::borrow::Cow;
use std::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct ResizerConfig {
    pub max_file_size: u64,
    pub allowed_formats: Vec<RasterFormat>,
}

impl ResizerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_file_size: config.max_file_size,
            ..Self::default()
        }
    }

    fn allows(&self, mime_type: &str) -> Option<RasterFormat> {
        RasterFormat::from_mime(mime_type).filter(|f| self.allowed_formats.contains(f))
    }
}

impl Default for ResizerConfig {
    fn default() -> Self {
        Self {
            max_file_size: 20 * 1024 * 1024,
            allowed_formats: RasterFormat::ALL.to_vec(),
        }
    }
}

/// Decodes, resizes and re-encodes one image per call.
///
/// Each call works on its own decoded buffer inside a blocking task, so a
/// single instance can serve concurrent callers. The only shared state is the
/// compression counter.
pub struct ImageResizer {
    config: ResizerConfig,
    stats: Mutex<CompressionStats>,
}

impl ImageResizer {
    pub fn new(config: ResizerConfig) -> Self {
        Self {
            config,
            stats: Mutex::new(CompressionStats::new()),
        }
    }

    pub fn config(&self) -> &ResizerConfig {
        &self.config
    }

    /// Reject the request before any decoding happens.
    fn check_request(&self, request: &ProcessingRequest) -> Result<(RasterFormat, RasterFormat)> {
        let source = self
            .config
            .allows(&request.mime_type)
            .ok_or_else(|| Error::UnsupportedFormat(request.mime_type.clone()))?;

        let target = match request.target_mime_type.as_deref() {
            Some(mime_type) => self
                .config
                .allows(mime_type)
                .ok_or_else(|| Error::UnsupportedFormat(mime_type.to_string()))?,
            None => source,
        };

        let size = request.original_size();
        if size > self.config.max_file_size {
            return Err(Error::SizeLimitExceeded {
                size,
                limit: self.config.max_file_size,
            });
        }

        if request.max_dimension == 0 {
            return Err(Error::InvalidRequest(
                "max_dimension must be positive".to_string(),
            ));
        }
        if request.quality_level.is_nan() {
            return Err(Error::InvalidRequest(
                "quality_level must be a number".to_string(),
            ));
        }

        Ok((source, target))
    }

    fn resize_sync(
        request: ProcessingRequest,
        source: RasterFormat,
        target: RasterFormat,
    ) -> Result<ProcessingResult> {
        let original_size = request.original_size();
        let img = image::load_from_memory_with_format(&request.source_bytes, source.image_format())
            .map_err(|e| Error::Decode(e.to_string()))?;

        let source_dims = Dimensions::new(img.width(), img.height());
        let target_dims = target_dimensions(source_dims, request.strategy, request.max_dimension);
        let img = if target_dims == source_dims {
            img
        } else {
            img.resize_exact(
                target_dims.width,
                target_dims.height,
                resample_filter(request.strategy),
            )
        };

        let quality = request.quality_level.clamp(0.0, 1.0);
        let encoded_bytes = encode(&img, target, quality, request.strategy)?;
        let encoded_size = encoded_bytes.len() as u64;

        debug!(
            "Resized {} -> {} ({} -> {}, {} -> {} bytes)",
            source.mime_type(),
            target.mime_type(),
            source_dims,
            target_dims,
            original_size,
            encoded_size
        );

        Ok(ProcessingResult {
            encoded_bytes,
            original_size,
            encoded_size,
            mime_type: target.mime_type().to_string(),
            dimensions: target_dims,
        })
    }
}

impl Default for ImageResizer {
    fn default() -> Self {
        Self::new(ResizerConfig::default())
    }
}

/// Convert to a color type every 8-bit encoder accepts.
fn eight_bit(img: &DynamicImage) -> Cow<'_, DynamicImage> {
    match img.color() {
        ColorType::L8 | ColorType::La8 | ColorType::Rgb8 | ColorType::Rgba8 => Cow::Borrowed(img),
        _ => Cow::Owned(DynamicImage::ImageRgba8(img.to_rgba8())),
    }
}

fn encode(
    img: &DynamicImage,
    format: RasterFormat,
    quality: f32,
    strategy: Strategy,
) -> Result<Vec<u8>> {
    let mut buf = Vec::new();

    let written = match format {
        RasterFormat::Jpeg => {
            let q = ((quality * 100.0).round() as u8).clamp(1, 100);
            let encoder = JpegEncoder::new_with_quality(&mut buf, q);
            // JPEG has no alpha channel
            DynamicImage::ImageRgb8(img.to_rgb8()).write_with_encoder(encoder)
        }
        RasterFormat::Png => {
            let compression = match strategy {
                Strategy::Speed => CompressionType::Fast,
                Strategy::Balanced => CompressionType::Default,
                Strategy::Quality => CompressionType::Best,
            };
            let encoder = PngEncoder::new_with_quality(&mut buf, compression, PngFilter::Adaptive);
            eight_bit(img).write_with_encoder(encoder)
        }
        RasterFormat::WebP => {
            let q = (quality * 100.0).clamp(1.0, 100.0);
            let encoded = if img.color().has_alpha() {
                let rgba = img.to_rgba8();
                webp::Encoder::from_rgba(rgba.as_raw(), rgba.width(), rgba.height())
                    .encode_simple(false, q)
            } else {
                let rgb = img.to_rgb8();
                webp::Encoder::from_rgb(rgb.as_raw(), rgb.width(), rgb.height())
                    .encode_simple(false, q)
            }
            .map_err(|e| Error::Encode(format!("WebP encoding failed: {:?}", e)))?;
            buf.extend_from_slice(&encoded);
            Ok(())
        }
        RasterFormat::Gif => {
            let speed = 30 - (quality * 29.0).round() as i32;
            let rgba = img.to_rgba8();
            let mut encoder = GifEncoder::new_with_speed(&mut buf, speed);
            encoder.encode(
                rgba.as_raw(),
                rgba.width(),
                rgba.height(),
                ExtendedColorType::Rgba8,
            )
        }
        RasterFormat::Bmp => {
            let encoder = BmpEncoder::new(&mut buf);
            eight_bit(img).write_with_encoder(encoder)
        }
    };

    written.map_err(|e| Error::Encode(e.to_string()))?;
    Ok(buf)
}

#[async_trait]
impl ImageService for ImageResizer {
    fn validate(&self, request: &ProcessingRequest) -> Result<()> {
        self.check_request(request).map(|_| ())
    }

    async fn resize(&self, request: ProcessingRequest) -> Result<ProcessingResult> {
        let (source, target) = self.check_request(&request)?;
        let strategy = request.strategy;

        let result = tokio::task::spawn_blocking(move || Self::resize_sync(request, source, target))
            .await
            .map_err(|e| Error::Invariant(format!("Resize task join error: {}", e)))??;

        let stats = {
            let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
            stats.record(result.original_size, result.encoded_size);
            *stats
        };

        info!(
            "[{}] {} bytes -> {} bytes ({:.1}% saved, running average {:.1}%)",
            strategy,
            result.original_size,
            result.encoded_size,
            result.reduction_percent(),
            stats.average_reduction
        );

        Ok(result)
    }

    fn compression_stats(&self) -> CompressionStats {
        *self.stats.lock().unwrap_or_else(|e| e.into_inner())
    }
}
