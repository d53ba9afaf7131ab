//! Data models and structures
//!
//! Defines the request/result types exchanged with the resizer, the file
//! object handed over by external pages, upload receipts, and process
//! configuration.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Size/quality tradeoff policy for a resize.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Speed,
    #[default]
    #[serde(alias = "smart")]
    Balanced,
    Quality,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Speed => "speed",
            Strategy::Balanced => "balanced",
            Strategy::Quality => "quality",
        }
    }
}

impl FromStr for Strategy {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "speed" => Ok(Strategy::Speed),
            "balanced" | "smart" => Ok(Strategy::Balanced),
            "quality" => Ok(Strategy::Quality),
            other => Err(crate::Error::InvalidRequest(format!(
                "Unknown strategy '{}'. Expected speed, balanced or quality",
                other
            ))),
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl std::fmt::Display for Dimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A single resize invocation. Consumed by the call.
#[derive(Debug, Clone)]
pub struct ProcessingRequest {
    pub source_bytes: Vec<u8>,
    pub mime_type: String,
    pub strategy: Strategy,
    pub max_dimension: u32,
    /// 0.0..=1.0, clamped by the resizer.
    pub quality_level: f32,
    /// Re-encode into this type instead of the source type.
    pub target_mime_type: Option<String>,
}

impl ProcessingRequest {
    pub fn new(source_bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            source_bytes,
            mime_type: mime_type.into(),
            strategy: Strategy::default(),
            max_dimension: 2048,
            quality_level: 0.85,
            target_mime_type: None,
        }
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_max_dimension(mut self, max_dimension: u32) -> Self {
        self.max_dimension = max_dimension;
        self
    }

    pub fn with_quality(mut self, quality_level: f32) -> Self {
        self.quality_level = quality_level;
        self
    }

    pub fn with_target_mime_type(mut self, target: Option<String>) -> Self {
        self.target_mime_type = target;
        self
    }

    pub fn original_size(&self) -> u64 {
        self.source_bytes.len() as u64
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingResult {
    pub encoded_bytes: Vec<u8>,
    pub original_size: u64,
    pub encoded_size: u64,
    pub mime_type: String,
    pub dimensions: Dimensions,
}

impl ProcessingResult {
    /// Percentage saved relative to the source; negative when the output grew.
    pub fn reduction_percent(&self) -> f64 {
        if self.original_size == 0 {
            return 0.0;
        }
        (self.original_size as f64 - self.encoded_size as f64) * 100.0 / self.original_size as f64
    }
}

/// A file handed over by an external page.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFile {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub original_name: String,
}

impl SourceFile {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>, original_name: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
            original_name: original_name.into(),
        }
    }

    pub fn byte_length(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Parse a `data:<mime>;base64,<payload>` URL.
    pub fn from_data_url(data_url: &str, original_name: impl Into<String>) -> crate::Result<Self> {
        let rest = data_url.trim().strip_prefix("data:").ok_or_else(|| {
            crate::Error::InvalidRequest("Data URL must start with 'data:'".to_string())
        })?;
        let (header, payload) = rest.split_once(',').ok_or_else(|| {
            crate::Error::InvalidRequest("Data URL is missing the ',' separator".to_string())
        })?;
        let mime_type = header.strip_suffix(";base64").ok_or_else(|| {
            crate::Error::InvalidRequest("Only base64 data URLs are supported".to_string())
        })?;
        if mime_type.is_empty() {
            return Err(crate::Error::InvalidRequest(
                "Data URL has no MIME type".to_string(),
            ));
        }

        let bytes = STANDARD.decode(payload.trim())?;
        Ok(Self::new(bytes, mime_type, original_name))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub url: String,
    pub original_name: String,
    pub mime_type: String,
    pub original_size: u64,
    pub stored_size: u64,
    pub optimized: bool,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Local,
    S3,
}

// Configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub max_file_size: u64,
    pub max_document_size: u64,
    pub max_dimension: u32,
    pub image_quality: f32,
    pub strategy: Strategy,
    pub output_format: Option<String>,
    pub optimize_images: bool,
    pub worker_count: usize,
    pub cache_capacity: usize,
    pub resize_timeout: Option<Duration>,
    pub upload_retries: usize,
    pub upload_retry_interval: Duration,
    pub storage_backend: StorageBackend,
    pub storage_root: String,
    pub storage_url_prefix: String,
    pub storage_access_key_id: Option<String>,
    pub storage_secret_access_key: Option<String>,
    pub storage_endpoint: String,
    pub storage_bucket: String,
    pub storage_base_url: String,
    pub display_name: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_file_size: 20 * 1024 * 1024,
            max_document_size: 1024 * 1024,
            max_dimension: 2048,
            image_quality: 0.85,
            strategy: Strategy::Balanced,
            output_format: None,
            optimize_images: true,
            worker_count: 2,
            cache_capacity: 32,
            resize_timeout: None,
            upload_retries: 3,
            upload_retry_interval: Duration::from_millis(500),
            storage_backend: StorageBackend::Local,
            storage_root: "user/images".to_string(),
            storage_url_prefix: "/user/images".to_string(),
            storage_access_key_id: None,
            storage_secret_access_key: None,
            storage_endpoint: "https://nyc3.digitaloceanspaces.com".to_string(),
            storage_bucket: "uploads".to_string(),
            storage_base_url: "https://cdn.example.com".to_string(),
            display_name: None,
        }
    }
}

fn parse_var<T: FromStr>(key: &str, raw: &str) -> crate::Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| crate::Error::Config(format!("{} has an invalid value: '{}'", key, raw)))
}

fn parse_bool(key: &str, raw: &str) -> crate::Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(crate::Error::Config(format!(
            "{} has an invalid value: '{}'",
            key, raw
        ))),
    }
}

impl Config {
    pub fn from_env() -> crate::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup (environment, map, ...).
    pub fn from_lookup<F>(lookup: F) -> crate::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let storage_backend = match get("STORAGE_BACKEND").as_deref().map(str::trim) {
            None | Some("local") => StorageBackend::Local,
            Some("s3") => StorageBackend::S3,
            Some(other) => {
                return Err(crate::Error::Config(format!(
                    "STORAGE_BACKEND must be 'local' or 's3', got '{}'",
                    other
                )))
            }
        };

        let image_quality = match get("IMAGE_QUALITY") {
            Some(raw) => parse_var::<f32>("IMAGE_QUALITY", &raw)?,
            None => defaults.image_quality,
        };
        if !(0.0..=1.0).contains(&image_quality) {
            return Err(crate::Error::Config(format!(
                "IMAGE_QUALITY must be within 0..=1, got {}",
                image_quality
            )));
        }

        let max_dimension = match get("MAX_DIMENSION") {
            Some(raw) => parse_var::<u32>("MAX_DIMENSION", &raw)?,
            None => defaults.max_dimension,
        };
        if max_dimension == 0 {
            return Err(crate::Error::Config(
                "MAX_DIMENSION must be positive".to_string(),
            ));
        }

        let config = Self {
            max_file_size: match get("MAX_FILE_SIZE") {
                Some(raw) => parse_var("MAX_FILE_SIZE", &raw)?,
                None => defaults.max_file_size,
            },
            max_document_size: match get("MAX_DOCUMENT_SIZE") {
                Some(raw) => parse_var("MAX_DOCUMENT_SIZE", &raw)?,
                None => defaults.max_document_size,
            },
            max_dimension,
            image_quality,
            strategy: match get("RESIZE_STRATEGY") {
                Some(raw) => raw
                    .parse::<Strategy>()
                    .map_err(|e: crate::Error| crate::Error::Config(e.to_string()))?,
                None => defaults.strategy,
            },
            output_format: get("OUTPUT_FORMAT"),
            optimize_images: match get("OPTIMIZE_IMAGES") {
                Some(raw) => parse_bool("OPTIMIZE_IMAGES", &raw)?,
                None => defaults.optimize_images,
            },
            worker_count: match get("WORKER_COUNT") {
                Some(raw) => parse_var::<usize>("WORKER_COUNT", &raw)?.max(1),
                None => defaults.worker_count,
            },
            cache_capacity: match get("CACHE_CAPACITY") {
                Some(raw) => parse_var("CACHE_CAPACITY", &raw)?,
                None => defaults.cache_capacity,
            },
            resize_timeout: match get("RESIZE_TIMEOUT_SECS") {
                Some(raw) => Some(Duration::from_secs(parse_var("RESIZE_TIMEOUT_SECS", &raw)?)),
                None => None,
            },
            upload_retries: match get("UPLOAD_RETRIES") {
                Some(raw) => parse_var("UPLOAD_RETRIES", &raw)?,
                None => defaults.upload_retries,
            },
            upload_retry_interval: match get("UPLOAD_RETRY_INTERVAL_MS") {
                Some(raw) => Duration::from_millis(parse_var("UPLOAD_RETRY_INTERVAL_MS", &raw)?),
                None => defaults.upload_retry_interval,
            },
            storage_backend,
            storage_root: get("STORAGE_ROOT").unwrap_or(defaults.storage_root),
            storage_url_prefix: get("STORAGE_URL_PREFIX").unwrap_or(defaults.storage_url_prefix),
            storage_access_key_id: get("STORAGE_ACCESS_KEY_ID"),
            storage_secret_access_key: get("STORAGE_SECRET_ACCESS_KEY"),
            storage_endpoint: get("STORAGE_ENDPOINT").unwrap_or(defaults.storage_endpoint),
            storage_bucket: get("STORAGE_BUCKET").unwrap_or(defaults.storage_bucket),
            storage_base_url: get("STORAGE_BASE_URL").unwrap_or(defaults.storage_base_url),
            display_name: get("DISPLAY_NAME"),
        };

        if config.storage_backend == StorageBackend::S3 {
            if config.storage_access_key_id.is_none() {
                return Err(crate::Error::Config(
                    "STORAGE_ACCESS_KEY_ID not set".to_string(),
                ));
            }
            if config.storage_secret_access_key.is_none() {
                return Err(crate::Error::Config(
                    "STORAGE_SECRET_ACCESS_KEY not set".to_string(),
                ));
            }
        }

        Ok(config)
    }
}
