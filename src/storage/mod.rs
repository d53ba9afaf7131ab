//! Storage backends for optimized uploads
//!
//! Persists encoded bytes under a destination path hint and returns the URL
//! the host can serve them from. Backends: local filesystem, S3-compatible
//! object storage, and an in-memory mock.

pub mod client;
pub mod local;
pub mod mock;

pub use client::{S3Settings, S3Storage};
pub use local::LocalStorage;
pub use mock::MockStorage;

use crate::{Error, Result};
use async_trait::async_trait;

#[async_trait]
pub trait StorageService: Send + Sync {
    /// Store `data` as `<path_hint>/<unique_id>.<extension>` and return its URL.
    async fn save_file(
        &self,
        data: &[u8],
        path_hint: &str,
        unique_id: &str,
        extension: &str,
    ) -> Result<String>;
}

/// Relative object key, validated so no component can escape its folder.
pub fn object_key(path_hint: &str, unique_id: &str, extension: &str) -> Result<String> {
    for (label, part) in [
        ("path hint", path_hint),
        ("unique id", unique_id),
        ("extension", extension),
    ] {
        if part.contains(['/', '\\']) || part.contains("..") {
            return Err(Error::Storage(format!("Invalid {}: '{}'", label, part)));
        }
    }
    if unique_id.is_empty() || extension.is_empty() {
        return Err(Error::Storage(
            "Unique id and extension must not be empty".to_string(),
        ));
    }

    let file_name = format!("{}.{}", unique_id, extension);
    if path_hint.is_empty() {
        Ok(file_name)
    } else {
        Ok(format!("{}/{}", path_hint, file_name))
    }
}

pub fn content_type_for_extension(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "txt" => "text/plain",
        "md" => "text/markdown",
        "csv" => "text/csv",
        "json" => "application/json",
        _ => "application/octet-stream",
    }
}
