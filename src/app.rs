//! Upload orchestration: validate, optimize, persist.

use crate::context::{path_hint, ContextProvider, StaticContext};
use crate::image::mime::essence;
use crate::image::{
    CompressionStats, ImageResizer, ImageService, PoolConfig, RasterFormat, ResizePool,
    ResizerConfig,
};
use crate::models::{
    Config, ProcessingRequest, SourceFile, StorageBackend, Strategy, UploadReceipt,
};
use crate::storage::{LocalStorage, S3Settings, S3Storage, StorageService};
use crate::{Error, Result};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_retry::{strategy::FixedInterval, Retry};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Text documents accepted as-is, with the extension they are stored under.
const DOCUMENT_TYPES: &[(&str, &str)] = &[
    ("text/plain", "txt"),
    ("text/markdown", "md"),
    ("text/csv", "csv"),
    ("application/json", "json"),
];

#[derive(Debug, Clone)]
pub struct BridgeSettings {
    pub optimize_images: bool,
    pub strategy: Strategy,
    pub max_dimension: u32,
    pub quality: f32,
    /// Re-encode every image into this MIME type.
    pub output_format: Option<String>,
    pub max_file_size: u64,
    pub max_document_size: u64,
    pub upload_retries: usize,
    pub upload_retry_interval: Duration,
    pub pool: PoolConfig,
}

impl BridgeSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            optimize_images: config.optimize_images,
            strategy: config.strategy,
            max_dimension: config.max_dimension,
            quality: config.image_quality,
            output_format: config.output_format.clone(),
            max_file_size: config.max_file_size,
            max_document_size: config.max_document_size,
            upload_retries: config.upload_retries,
            upload_retry_interval: config.upload_retry_interval,
            pool: PoolConfig::from_config(config),
        }
    }
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Injectable service bundle used to construct [`UploadBridge`].
pub struct BridgeServices {
    pub image: Arc<dyn ImageService>,
    pub storage: Box<dyn StorageService>,
    pub context: Box<dyn ContextProvider>,
}

/// Accepts files from external pages and hands back a retrievable URL.
pub struct UploadBridge {
    pool: ResizePool,
    storage: Box<dyn StorageService>,
    context: Box<dyn ContextProvider>,
    settings: BridgeSettings,
}

impl UploadBridge {
    /// Build a bridge from concrete service dependencies.
    ///
    /// This is primarily useful for tests and embedders that bring their own
    /// storage or resizer.
    pub fn with_services(services: BridgeServices, settings: BridgeSettings) -> Self {
        Self {
            pool: ResizePool::new(services.image, settings.pool.clone()),
            storage: services.storage,
            context: services.context,
            settings,
        }
    }

    /// Construct a bridge from process configuration (`Config::from_env`).
    pub async fn from_config(config: &Config) -> Result<Self> {
        let image: Arc<dyn ImageService> =
            Arc::new(ImageResizer::new(ResizerConfig::from_config(config)));

        let storage: Box<dyn StorageService> = match config.storage_backend {
            StorageBackend::Local => {
                info!("Storing uploads under {}", config.storage_root);
                Box::new(LocalStorage::new(
                    &config.storage_root,
                    config.storage_url_prefix.clone(),
                ))
            }
            StorageBackend::S3 => {
                Box::new(S3Storage::new(S3Settings::from_config(config)?).await?)
            }
        };

        let context = Box::new(StaticContext::new(config.display_name.clone()));

        Ok(Self::with_services(
            BridgeServices {
                image,
                storage,
                context,
            },
            BridgeSettings::from_config(config),
        ))
    }

    /// Route a file to the image or document path by its MIME type.
    pub async fn upload(&self, file: SourceFile) -> Result<UploadReceipt> {
        if RasterFormat::from_mime(&file.mime_type).is_some() {
            self.upload_image(file).await
        } else {
            self.upload_document(file).await
        }
    }

    pub async fn upload_image(&self, file: SourceFile) -> Result<UploadReceipt> {
        let byte_length = file.byte_length();
        let SourceFile {
            bytes,
            mime_type,
            original_name,
        } = file;

        let format = RasterFormat::from_mime(&mime_type)
            .ok_or_else(|| Error::UnsupportedFormat(mime_type.clone()))?;
        if byte_length > self.settings.max_file_size {
            return Err(Error::SizeLimitExceeded {
                size: byte_length,
                limit: self.settings.max_file_size,
            });
        }

        info!(
            "Uploading image '{}' ({} bytes, {})",
            original_name, byte_length, mime_type
        );

        let (stored, stored_mime, optimized) = if self.settings.optimize_images {
            let request = ProcessingRequest {
                source_bytes: bytes,
                mime_type,
                strategy: self.settings.strategy,
                max_dimension: self.settings.max_dimension,
                quality_level: self.settings.quality,
                target_mime_type: self.settings.output_format.clone(),
            };
            let result = self.pool.process(request).await.map_err(|e| {
                error!("Failed to optimize '{}': {}", original_name, e);
                e
            })?;
            (result.encoded_bytes, result.mime_type, true)
        } else {
            (bytes, format.mime_type().to_string(), false)
        };

        let extension = RasterFormat::from_mime(&stored_mime)
            .unwrap_or(format)
            .extension();
        let url = self.persist(&stored, extension).await?;

        Ok(UploadReceipt {
            url,
            original_name,
            mime_type: stored_mime,
            original_size: byte_length,
            stored_size: stored.len() as u64,
            optimized,
            uploaded_at: Utc::now(),
        })
    }

    pub async fn upload_document(&self, file: SourceFile) -> Result<UploadReceipt> {
        let essence = essence(&file.mime_type);
        let extension = DOCUMENT_TYPES
            .iter()
            .find(|(mime, _)| *mime == essence)
            .map(|(_, ext)| *ext)
            .ok_or_else(|| Error::UnsupportedFormat(file.mime_type.clone()))?;

        let byte_length = file.byte_length();
        if byte_length > self.settings.max_document_size {
            return Err(Error::SizeLimitExceeded {
                size: byte_length,
                limit: self.settings.max_document_size,
            });
        }
        std::str::from_utf8(&file.bytes)
            .map_err(|e| Error::Decode(format!("Document is not valid UTF-8: {}", e)))?;

        info!(
            "Uploading document '{}' ({} bytes, {})",
            file.original_name, byte_length, essence
        );
        let url = self.persist(&file.bytes, extension).await?;

        Ok(UploadReceipt {
            url,
            original_name: file.original_name,
            mime_type: essence,
            original_size: byte_length,
            stored_size: byte_length,
            optimized: false,
            uploaded_at: Utc::now(),
        })
    }

    pub fn compression_stats(&self) -> CompressionStats {
        self.pool.service().compression_stats()
    }

    async fn persist(&self, data: &[u8], extension: &str) -> Result<String> {
        let hint = path_hint(self.context.display_name().as_deref());
        let unique_id = Uuid::new_v4().to_string();
        let retry_strategy =
            FixedInterval::new(self.settings.upload_retry_interval).take(self.settings.upload_retries);

        let storage = &self.storage;
        let hint_ref = hint.as_str();
        let id_ref = unique_id.as_str();

        let url = Retry::spawn(retry_strategy, move || async move {
            match storage.save_file(data, hint_ref, id_ref, extension).await {
                Ok(url) => Ok(url),
                Err(e) => {
                    warn!("Storage attempt failed: {}. Will retry...", e);
                    Err(e)
                }
            }
        })
        .await
        .map_err(|e| {
            error!("Failed to store upload after retries: {}", e);
            e
        })?;

        info!("Stored {} bytes at {}", data.len(), url);
        Ok(url)
    }
}
