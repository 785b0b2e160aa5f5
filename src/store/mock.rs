use super::{is_supported_image_key, ObjectMetadata, ObjectStore, ObjectSummary};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub content_type: String,
}

/// In-memory bucket. Keys list in lexicographic order, as S3 does.
#[derive(Clone)]
pub struct MockObjectStore {
    objects: Arc<Mutex<BTreeMap<String, StoredObject>>>,
    failing_gets: Arc<Mutex<HashSet<String>>>,
    failing_puts: Arc<Mutex<HashSet<String>>>,
    fail_list: Arc<Mutex<bool>>,
    get_count: Arc<Mutex<usize>>,
    put_log: Arc<Mutex<Vec<String>>>,
}

impl MockObjectStore {
    pub fn new() -> Self {
        Self {
            objects: Arc::new(Mutex::new(BTreeMap::new())),
            failing_gets: Arc::new(Mutex::new(HashSet::new())),
            failing_puts: Arc::new(Mutex::new(HashSet::new())),
            fail_list: Arc::new(Mutex::new(false)),
            get_count: Arc::new(Mutex::new(0)),
            put_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_object(self, key: &str, data: Vec<u8>, content_type: &str) -> Self {
        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: content_type.to_string(),
            },
        );
        self
    }

    /// Make `get` fail for `key` with a store error.
    pub fn with_get_failure(self, key: &str) -> Self {
        self.failing_gets.lock().unwrap().insert(key.to_string());
        self
    }

    /// Make `put` fail for `key`, simulating a network error.
    pub fn with_put_failure(self, key: &str) -> Self {
        self.failing_puts.lock().unwrap().insert(key.to_string());
        self
    }

    pub fn with_list_failure(self) -> Self {
        *self.fail_list.lock().unwrap() = true;
        self
    }

    pub fn get_object(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn get_get_count(&self) -> usize {
        *self.get_count.lock().unwrap()
    }

    /// Keys of successful puts, in order.
    pub fn get_put_log(&self) -> Vec<String> {
        self.put_log.lock().unwrap().clone()
    }
}

impl Default for MockObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for MockObjectStore {
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectSummary>> {
        if *self.fail_list.lock().unwrap() {
            return Err(Error::store(prefix, "Mock list failure"));
        }

        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|(key, _)| key.starts_with(prefix) && is_supported_image_key(key))
            .map(|(key, object)| ObjectSummary {
                key: key.clone(),
                size_bytes: object.data.len() as i64,
            })
            .collect())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        *self.get_count.lock().unwrap() += 1;

        if self.failing_gets.lock().unwrap().contains(key) {
            return Err(Error::store(key, "Mock download failure"));
        }
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map(|object| object.data.clone())
            .ok_or_else(|| Error::NotFound(key.to_string()))
    }

    async fn head(&self, key: &str) -> Result<ObjectMetadata> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map(|object| ObjectMetadata {
                content_type: Some(object.content_type.clone()),
                content_length: object.data.len() as i64,
            })
            .ok_or_else(|| Error::NotFound(key.to_string()))
    }

    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<()> {
        if self.failing_puts.lock().unwrap().contains(key) {
            return Err(Error::store(key, "Mock network error"));
        }

        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                data: data.to_vec(),
                content_type: content_type.to_string(),
            },
        );
        self.put_log.lock().unwrap().push(key.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_store_put_and_get() {
        let store = MockObjectStore::new();

        store.put("a.jpg", b"bytes", "image/jpeg").await.unwrap();

        assert_eq!(store.get("a.jpg").await.unwrap(), b"bytes");
        let head = store.head("a.jpg").await.unwrap();
        assert_eq!(head.content_type.as_deref(), Some("image/jpeg"));
        assert_eq!(head.content_length, 5);
        assert_eq!(store.get_put_log(), vec!["a.jpg".to_string()]);
        assert_eq!(store.get_get_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_store_list_filters_prefix_and_extension() {
        let store = MockObjectStore::new()
            .with_object("photos/b.png", vec![1], "image/png")
            .with_object("photos/a.jpg", vec![1, 2], "image/jpeg")
            .with_object("photos/readme.txt", vec![1], "text/plain")
            .with_object("other/c.jpg", vec![1], "image/jpeg");

        let listed = store.list("photos/").await.unwrap();
        let keys: Vec<&str> = listed.iter().map(|o| o.key.as_str()).collect();

        assert_eq!(keys, vec!["photos/a.jpg", "photos/b.png"]);
        assert_eq!(listed[0].size_bytes, 2);
    }

    #[tokio::test]
    async fn test_mock_store_missing_object() {
        let store = MockObjectStore::new();

        assert!(matches!(
            store.get("missing.jpg").await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            store.head("missing.jpg").await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_mock_store_injected_failures() {
        let store = MockObjectStore::new()
            .with_object("a.jpg", vec![1], "image/jpeg")
            .with_get_failure("a.jpg")
            .with_put_failure("b.jpg");

        assert!(store.get("a.jpg").await.is_err());
        assert!(store.put("b.jpg", b"x", "image/jpeg").await.is_err());
        assert!(store.get_object("b.jpg").is_none());
        assert!(store.get_put_log().is_empty());

        let failing_list = MockObjectStore::new().with_list_failure();
        assert!(failing_list.list("").await.is_err());
    }
}
