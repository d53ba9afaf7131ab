use super::{object_key, StorageService};
use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub struct MockStorage {
    files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    base_url: String,
    save_count: Arc<Mutex<usize>>,
    failures_left: Arc<Mutex<usize>>,
}

impl MockStorage {
    pub fn new() -> Self {
        Self {
            files: Arc::new(Mutex::new(HashMap::new())),
            base_url: "https://mock-storage.example.com".to_string(),
            save_count: Arc::new(Mutex::new(0)),
            failures_left: Arc::new(Mutex::new(0)),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    /// Fail the next `count` saves before succeeding.
    pub fn with_failures(self, count: usize) -> Self {
        *self.failures_left.lock().unwrap() = count;
        self
    }

    pub fn get_save_count(&self) -> usize {
        *self.save_count.lock().unwrap()
    }

    pub fn get_files(&self) -> HashMap<String, Vec<u8>> {
        self.files.lock().unwrap().clone()
    }
}

impl Default for MockStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageService for MockStorage {
    async fn save_file(
        &self,
        data: &[u8],
        path_hint: &str,
        unique_id: &str,
        extension: &str,
    ) -> Result<String> {
        *self.save_count.lock().unwrap() += 1;

        {
            let mut failures_left = self.failures_left.lock().unwrap();
            if *failures_left > 0 {
                *failures_left -= 1;
                return Err(crate::Error::Storage("Mock failure".to_string()));
            }
        }

        let key = object_key(path_hint, unique_id, extension)?;
        self.files.lock().unwrap().insert(key.clone(), data.to_vec());
        Ok(format!("{}/{}", self.base_url, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_storage_save() {
        let storage = MockStorage::new();

        let url = storage
            .save_file(b"data", "Alice", "id1", "png")
            .await
            .unwrap();

        assert_eq!(url, "https://mock-storage.example.com/Alice/id1.png");
        assert_eq!(storage.get_save_count(), 1);
        assert_eq!(storage.get_files().get("Alice/id1.png").unwrap(), b"data");
    }

    #[tokio::test]
    async fn test_mock_storage_with_custom_base_url() {
        let storage = MockStorage::new().with_base_url("https://custom.test".to_string());

        let url = storage.save_file(b"x", "", "id", "txt").await.unwrap();
        assert_eq!(url, "https://custom.test/id.txt");
    }

    #[tokio::test]
    async fn test_mock_storage_failures_then_success() {
        let storage = MockStorage::new().with_failures(2);

        assert!(storage.save_file(b"x", "", "id", "txt").await.is_err());
        assert!(storage.save_file(b"x", "", "id", "txt").await.is_err());
        assert!(storage.save_file(b"x", "", "id", "txt").await.is_ok());
        assert_eq!(storage.get_save_count(), 3);
    }
}
