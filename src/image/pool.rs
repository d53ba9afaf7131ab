//! Bounded worker pool with a content-addressed result cache.
//!
//! A resize holds a semaphore permit for its whole duration; the permit is
//! released when the task finishes or fails. Identical requests (same bytes,
//! MIME type, strategy, bound, quality and target) are served from the cache.

use super::ImageService;
use crate::models::{Config, ProcessingRequest, ProcessingResult};
use crate::{Error, Result};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

const DEFAULT_WORKERS: usize = 2;
const DEFAULT_CACHE_CAPACITY: usize = 32;

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub workers: usize,
    /// 0 disables caching.
    pub cache_capacity: usize,
    pub task_timeout: Option<Duration>,
}

impl PoolConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            workers: config.worker_count.max(1),
            cache_capacity: config.cache_capacity,
            task_timeout: config.resize_timeout,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            task_timeout: None,
        }
    }
}

/// FIFO-evicting map of finished results.
struct ResultCache {
    capacity: usize,
    entries: HashMap<String, ProcessingResult>,
    order: VecDeque<String>,
}

impl ResultCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn get(&self, key: &str) -> Option<ProcessingResult> {
        self.entries.get(key).cloned()
    }

    fn insert(&mut self, key: String, result: ProcessingResult) {
        if self.capacity == 0 || self.entries.contains_key(&key) {
            return;
        }
        while self.entries.len() >= self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, result);
    }
}

fn hash_field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

/// Every variable-length field is length-prefixed so no two requests share a key.
fn cache_key(request: &ProcessingRequest) -> String {
    let mut hasher = Sha256::new();
    hash_field(&mut hasher, &request.source_bytes);
    hash_field(&mut hasher, request.mime_type.as_bytes());
    hash_field(&mut hasher, request.strategy.as_str().as_bytes());
    hasher.update(request.max_dimension.to_le_bytes());
    hasher.update(request.quality_level.to_bits().to_le_bytes());
    match &request.target_mime_type {
        Some(target) => {
            hasher.update([1u8]);
            hash_field(&mut hasher, target.as_bytes());
        }
        None => hasher.update([0u8]),
    }
    format!("{:x}", hasher.finalize())
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Clone)]
pub struct ResizePool {
    service: Arc<dyn ImageService>,
    semaphore: Arc<Semaphore>,
    cache: Arc<Mutex<ResultCache>>,
    active_workers: Arc<AtomicUsize>,
    cache_hits: Arc<AtomicU64>,
    config: PoolConfig,
}

impl ResizePool {
    pub fn new(service: Arc<dyn ImageService>, config: PoolConfig) -> Self {
        let workers = config.workers.max(1);
        Self {
            service,
            semaphore: Arc::new(Semaphore::new(workers)),
            cache: Arc::new(Mutex::new(ResultCache::new(config.cache_capacity))),
            active_workers: Arc::new(AtomicUsize::new(0)),
            cache_hits: Arc::new(AtomicU64::new(0)),
            config: PoolConfig { workers, ..config },
        }
    }

    pub fn service(&self) -> &Arc<dyn ImageService> {
        &self.service
    }

    pub async fn process(&self, request: ProcessingRequest) -> Result<ProcessingResult> {
        // Rejections must not be masked by a cached success
        self.service.validate(&request)?;
        let key = (self.config.cache_capacity > 0).then(|| cache_key(&request));

        if let Some(key) = &key {
            let cached = self.lock_cache().get(key);
            if let Some(result) = cached {
                self.cache_hits.fetch_add(1, Ordering::SeqCst);
                debug!("Cache hit for {}", &key[..12]);
                return Ok(result);
            }
        }

        let _permit = self.semaphore.acquire().await.map_err(|e| {
            warn!("Failed to acquire semaphore: {}", e);
            Error::Invariant(format!("Failed to acquire worker: {}", e))
        })?;
        let active = self.active_workers.fetch_add(1, Ordering::SeqCst) + 1;
        let _active = ActiveGuard(&self.active_workers);
        debug!(
            "Worker started - Active: {}/{}, Available permits: {}",
            active,
            self.config.workers,
            self.semaphore.available_permits()
        );

        let result = match self.config.task_timeout {
            Some(limit) => tokio::time::timeout(limit, self.service.resize(request))
                .await
                .map_err(|_| {
                    warn!("Resize exceeded {:?}", limit);
                    Error::Timeout(limit)
                })?,
            None => self.service.resize(request).await,
        }?;

        if let Some(key) = key {
            self.lock_cache().insert(key, result.clone());
        }

        Ok(result)
    }

    /// Run every request concurrently up to the worker bound. Results keep
    /// the input order.
    pub async fn process_batch(
        &self,
        requests: Vec<ProcessingRequest>,
    ) -> Vec<Result<ProcessingResult>> {
        debug!("Processing batch of {} requests", requests.len());

        let handles: Vec<_> = requests
            .into_iter()
            .map(|request| {
                let pool = self.clone();
                tokio::spawn(async move { pool.process(request).await })
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            results.push(match handle.await {
                Ok(result) => result,
                Err(e) => Err(Error::Invariant(format!("Resize task join error: {}", e))),
            });
        }
        results
    }

    pub fn active_workers(&self) -> usize {
        self.active_workers.load(Ordering::SeqCst)
    }

    pub fn cache_len(&self) -> usize {
        self.lock_cache().entries.len()
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::SeqCst)
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, ResultCache> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{ImageResizer, MockImageResizer, ResizerConfig};
    use crate::models::Strategy;
    use image::{DynamicImage, ImageFormat, RgbImage};

    fn pool_with(mock: &MockImageResizer, config: PoolConfig) -> ResizePool {
        ResizePool::new(Arc::new(mock.clone()), config)
    }

    fn request(byte: u8) -> ProcessingRequest {
        ProcessingRequest::new(vec![byte; 10], "image/png")
    }

    #[tokio::test]
    async fn test_identical_requests_hit_cache() {
        let mock = MockImageResizer::new();
        let pool = pool_with(&mock, PoolConfig::default());

        let first = pool.process(request(1)).await.unwrap();
        let second = pool.process(request(1)).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(mock.get_call_count(), 1);
        assert_eq!(pool.cache_hits(), 1);
        assert_eq!(pool.cache_len(), 1);
    }

    #[tokio::test]
    async fn test_parameters_are_part_of_cache_key() {
        let mock = MockImageResizer::new();
        let pool = pool_with(&mock, PoolConfig::default());

        pool.process(request(1)).await.unwrap();
        pool.process(request(1).with_strategy(Strategy::Speed))
            .await
            .unwrap();
        pool.process(request(1).with_max_dimension(512)).await.unwrap();
        pool.process(request(1).with_quality(0.5)).await.unwrap();

        assert_eq!(mock.get_call_count(), 4);
        assert_eq!(pool.cache_hits(), 0);
    }

    #[tokio::test]
    async fn test_zero_capacity_disables_cache() {
        let mock = MockImageResizer::new();
        let pool = pool_with(
            &mock,
            PoolConfig {
                cache_capacity: 0,
                ..PoolConfig::default()
            },
        );

        pool.process(request(1)).await.unwrap();
        pool.process(request(1)).await.unwrap();

        assert_eq!(mock.get_call_count(), 2);
        assert_eq!(pool.cache_len(), 0);
    }

    #[tokio::test]
    async fn test_oldest_entry_is_evicted() {
        let mock = MockImageResizer::new();
        let pool = pool_with(
            &mock,
            PoolConfig {
                cache_capacity: 1,
                ..PoolConfig::default()
            },
        );

        pool.process(request(1)).await.unwrap();
        pool.process(request(2)).await.unwrap();
        pool.process(request(1)).await.unwrap();

        assert_eq!(mock.get_call_count(), 3);
        assert_eq!(pool.cache_len(), 1);
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let mock = MockImageResizer::new().with_failure(true);
        let pool = pool_with(&mock, PoolConfig::default());

        assert!(pool.process(request(1)).await.is_err());
        assert!(pool.process(request(1)).await.is_err());

        assert_eq!(mock.get_call_count(), 2);
        assert_eq!(pool.cache_len(), 0);
        assert_eq!(pool.active_workers(), 0);
    }

    #[tokio::test]
    async fn test_batch_respects_worker_bound_and_order() {
        let mock = MockImageResizer::new().with_delay(Duration::from_millis(30));
        let pool = pool_with(
            &mock,
            PoolConfig {
                workers: 2,
                cache_capacity: 0,
                task_timeout: None,
            },
        );

        let requests = (0..6).map(request).collect();
        let results = pool.process_batch(requests).await;

        assert_eq!(results.len(), 6);
        for (i, result) in results.into_iter().enumerate() {
            assert_eq!(result.unwrap().encoded_bytes, vec![i as u8; 5]);
        }
        assert!(mock.get_max_in_flight() <= 2);
        assert_eq!(mock.get_call_count(), 6);
        assert_eq!(pool.active_workers(), 0);
    }

    #[tokio::test]
    async fn test_slow_resize_times_out() {
        let mock = MockImageResizer::new().with_delay(Duration::from_millis(500));
        let pool = pool_with(
            &mock,
            PoolConfig {
                task_timeout: Some(Duration::from_millis(20)),
                ..PoolConfig::default()
            },
        );

        let err = pool.process(request(1)).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
        assert_eq!(pool.active_workers(), 0);
    }

    fn png_bytes() -> Vec<u8> {
        let img = RgbImage::from_fn(16, 8, |x, y| image::Rgb([x as u8 * 10, y as u8 * 20, 90]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn resizer_pool() -> ResizePool {
        ResizePool::new(Arc::new(ImageResizer::default()), PoolConfig::default())
    }

    #[test]
    fn test_cache_key_separates_fields() {
        let png = png_bytes();
        let base = ProcessingRequest::new(png.clone(), "image/png");

        let mut shifted_bytes = png.clone();
        shifted_bytes.push(b'i');
        let shifted = ProcessingRequest::new(shifted_bytes, "mage/png");
        let empty_target = base.clone().with_target_mime_type(Some(String::new()));

        assert_ne!(cache_key(&base), cache_key(&shifted));
        assert_ne!(cache_key(&base), cache_key(&empty_target));
        assert_eq!(cache_key(&base), cache_key(&base.clone()));
    }

    #[tokio::test]
    async fn test_warm_cache_still_rejects_unsupported_target() {
        let pool = resizer_pool();
        let png = png_bytes();

        pool.process(ProcessingRequest::new(png.clone(), "image/png"))
            .await
            .unwrap();
        let err = pool
            .process(
                ProcessingRequest::new(png, "image/png")
                    .with_target_mime_type(Some(String::new())),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::UnsupportedFormat(_)));
        assert_eq!(pool.cache_hits(), 0);
    }

    #[tokio::test]
    async fn test_warm_cache_still_rejects_unsupported_mime() {
        let pool = resizer_pool();
        let png = png_bytes();

        pool.process(ProcessingRequest::new(png.clone(), "image/png"))
            .await
            .unwrap();

        let mut shifted = png.clone();
        shifted.push(b'i');
        let err = pool
            .process(ProcessingRequest::new(shifted, "mage/png"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));

        let err = pool
            .process(ProcessingRequest::new(png, "image/svg+xml"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
        assert_eq!(pool.cache_len(), 1);
    }

    #[tokio::test]
    async fn test_warm_cache_still_enforces_size_limit() {
        let png = png_bytes();
        let pool = ResizePool::new(
            Arc::new(ImageResizer::new(ResizerConfig {
                max_file_size: png.len() as u64,
                ..ResizerConfig::default()
            })),
            PoolConfig::default(),
        );

        pool.process(ProcessingRequest::new(png.clone(), "image/png"))
            .await
            .unwrap();
        let hit = pool
            .process(ProcessingRequest::new(png.clone(), "image/png"))
            .await
            .unwrap();
        assert_eq!(hit.mime_type, "image/png");
        assert_eq!(pool.cache_hits(), 1);

        let mut bigger = png;
        bigger.push(0);
        let err = pool
            .process(ProcessingRequest::new(bigger, "image/png"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SizeLimitExceeded { .. }));
    }
}
