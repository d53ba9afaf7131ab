//! Image resizing and re-encoding
//!
//! Shrinks incoming raster images to a bounded size according to a named
//! strategy and re-encodes them at a quality level before they are stored.

pub mod dimensions;
pub mod mime;
pub mod mock;
pub mod pool;
pub mod processor;
pub mod stats;

pub use mime::RasterFormat;
pub use mock::MockImageResizer;
pub use pool::{PoolConfig, ResizePool};
pub use processor::{ImageResizer, ResizerConfig};
pub use stats::CompressionStats;

use crate::models::{ProcessingRequest, ProcessingResult};
use crate::Result;
use async_trait::async_trait;

#[async_trait]
pub trait ImageService: Send + Sync {
    /// Reject a request without touching its pixels.
    fn validate(&self, _request: &ProcessingRequest) -> Result<()> {
        Ok(())
    }

    async fn resize(&self, request: ProcessingRequest) -> Result<ProcessingResult>;
    fn compression_stats(&self) -> CompressionStats;
}
