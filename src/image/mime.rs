//! Raster MIME allow-list and format lookups.

use image::ImageFormat;

/// Raster formats the resizer can both decode and re-encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RasterFormat {
    Jpeg,
    Png,
    WebP,
    Gif,
    Bmp,
}

impl RasterFormat {
    pub const ALL: [RasterFormat; 5] = [
        RasterFormat::Jpeg,
        RasterFormat::Png,
        RasterFormat::WebP,
        RasterFormat::Gif,
        RasterFormat::Bmp,
    ];

    /// Look up a MIME type, ignoring case and parameters (`image/png; q=1`).
    pub fn from_mime(mime_type: &str) -> Option<Self> {
        let essence = essence(mime_type);
        match essence.as_str() {
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(RasterFormat::Jpeg),
            "image/png" => Some(RasterFormat::Png),
            "image/webp" => Some(RasterFormat::WebP),
            "image/gif" => Some(RasterFormat::Gif),
            "image/bmp" | "image/x-ms-bmp" => Some(RasterFormat::Bmp),
            _ => None,
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            RasterFormat::Jpeg => "image/jpeg",
            RasterFormat::Png => "image/png",
            RasterFormat::WebP => "image/webp",
            RasterFormat::Gif => "image/gif",
            RasterFormat::Bmp => "image/bmp",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            RasterFormat::Jpeg => "jpg",
            RasterFormat::Png => "png",
            RasterFormat::WebP => "webp",
            RasterFormat::Gif => "gif",
            RasterFormat::Bmp => "bmp",
        }
    }

    pub fn image_format(&self) -> ImageFormat {
        match self {
            RasterFormat::Jpeg => ImageFormat::Jpeg,
            RasterFormat::Png => ImageFormat::Png,
            RasterFormat::WebP => ImageFormat::WebP,
            RasterFormat::Gif => ImageFormat::Gif,
            RasterFormat::Bmp => ImageFormat::Bmp,
        }
    }
}

/// Lowercased MIME type without parameters.
pub fn essence(mime_type: &str) -> String {
    mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Identify a raster image from its leading bytes.
pub fn sniff_image_mime(bytes: &[u8]) -> Option<&'static str> {
    match bytes {
        [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
        [0x89, 0x50, 0x4E, 0x47, ..] => Some("image/png"),
        [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x57, 0x45, 0x42, 0x50, ..] => Some("image/webp"),
        [0x47, 0x49, 0x46, 0x38, ..] => Some("image/gif"),
        [0x42, 0x4D, ..] => Some("image/bmp"),
        _ => {
            tracing::warn!(
                "Unrecognized image format (first 4 bytes: {:02X?})",
                &bytes[..bytes.len().min(4)]
            );
            None
        }
    }
}
