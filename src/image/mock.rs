use super::stats::CompressionStats;
use super::ImageService;
use crate::models::{Dimensions, ProcessingRequest, ProcessingResult};
use crate::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Resizer stand-in that halves the payload without decoding it.
#[derive(Clone)]
pub struct MockImageResizer {
    call_count: Arc<Mutex<usize>>,
    should_fail: Arc<Mutex<bool>>,
    delay: Option<Duration>,
    dimensions: Dimensions,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    stats: Arc<Mutex<CompressionStats>>,
}

impl MockImageResizer {
    pub fn new() -> Self {
        Self {
            call_count: Arc::new(Mutex::new(0)),
            should_fail: Arc::new(Mutex::new(false)),
            delay: None,
            dimensions: Dimensions::new(1, 1),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
            stats: Arc::new(Mutex::new(CompressionStats::new())),
        }
    }

    pub fn with_failure(self, should_fail: bool) -> Self {
        *self.should_fail.lock().unwrap() = should_fail;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_dimensions(mut self, dimensions: Dimensions) -> Self {
        self.dimensions = dimensions;
        self
    }

    pub fn get_call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }

    /// Highest number of resizes that were running at the same time.
    pub fn get_max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Default for MockImageResizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageService for MockImageResizer {
    async fn resize(&self, request: ProcessingRequest) -> Result<ProcessingResult> {
        *self.call_count.lock().unwrap() += 1;

        if *self.should_fail.lock().unwrap() {
            return Err(crate::Error::Decode("Mock failure".to_string()));
        }

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let original_size = request.original_size();
        let encoded_bytes = request.source_bytes[..request.source_bytes.len() / 2].to_vec();
        let encoded_size = encoded_bytes.len() as u64;
        self.stats
            .lock()
            .unwrap()
            .record(original_size, encoded_size);

        Ok(ProcessingResult {
            encoded_bytes,
            original_size,
            encoded_size,
            mime_type: request.target_mime_type.unwrap_or(request.mime_type),
            dimensions: self.dimensions,
        })
    }

    fn compression_stats(&self) -> CompressionStats {
        *self.stats.lock().unwrap()
    }
}
