//! Object store trait and in-memory implementation for testing
//! and development.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Key not found: {0}")]
    NotFound(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Invalid key format: {0}")]
    InvalidKey(String),
}

/// Headers attached to an object when it is written or copied
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutOptions {
    pub content_type: Option<String>,
    pub cache_control: Option<String>,
}

impl PutOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn cache_control(mut self, cache_control: impl Into<String>) -> Self {
        self.cache_control = Some(cache_control.into());
        self
    }
}

/// Result of a `head` request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub key: String,
    pub size: u64,
    pub content_type: Option<String>,
    pub cache_control: Option<String>,
}

/// Result of a prefix listing.
///
/// With a delimiter, keys that contain it after the prefix are folded into
/// `common_prefixes` (each ending in the delimiter) instead of `keys`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    pub keys: Vec<String>,
    pub common_prefixes: Vec<String>,
}

/// Abstraction for S3-like object storage backends
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store data at the given key, replacing any previous object
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        options: PutOptions,
    ) -> Result<(), StorageError>;

    /// Retrieve data by key
    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes, StorageError>;

    /// Object metadata, `None` if the key does not exist
    async fn head(&self, bucket: &str, key: &str) -> Result<Option<ObjectMeta>, StorageError>;

    /// Check if key exists
    async fn exists(&self, bucket: &str, key: &str) -> Result<bool, StorageError> {
        Ok(self.head(bucket, key).await?.is_some())
    }

    /// List every key starting with `prefix`, grouped by `delimiter` if given
    async fn list(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: Option<&str>,
    ) -> Result<Listing, StorageError>;

    /// Server-side copy. Headers of the destination are replaced by `options`.
    async fn copy(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
        options: PutOptions,
    ) -> Result<(), StorageError>;

    /// Delete data by key. Deleting a missing key is not an error.
    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError>;
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    content_type: Option<String>,
    cache_control: Option<String>,
}

type Buckets = HashMap<String, BTreeMap<String, StoredObject>>;

/// In-memory storage implementation for testing
#[derive(Debug, Default)]
pub struct MemoryStorage {
    buckets: Mutex<Buckets>,
    failing_writes: Mutex<Vec<String>>,
    yielding: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sorted keys of one bucket (useful for testing)
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.buckets
            .lock()
            .map(|buckets| {
                buckets
                    .get(bucket)
                    .map(|objects| objects.keys().cloned().collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    /// Make every put or copy whose destination key contains `pattern` fail
    pub fn fail_writes_matching(&self, pattern: impl Into<String>) {
        if let Ok(mut failing) = self.failing_writes.lock() {
            failing.push(pattern.into());
        }
    }

    /// Remove all injected failures
    pub fn clear_failures(&self) {
        if let Ok(mut failing) = self.failing_writes.lock() {
            failing.clear();
        }
    }

    /// Yield to the scheduler before every operation so concurrent callers
    /// interleave the way they would against a remote store
    pub fn interleave_operations(&self) {
        self.yielding.store(true, Ordering::Relaxed);
    }

    async fn pause(&self) {
        if self.yielding.load(Ordering::Relaxed) {
            tokio::task::yield_now().await;
        }
    }

    /// Number of objects across all buckets
    pub fn len(&self) -> usize {
        self.buckets
            .lock()
            .map(|buckets| buckets.values().map(BTreeMap::len).sum())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Buckets>, StorageError> {
        self.buckets
            .lock()
            .map_err(|_| StorageError::Backend("Lock poisoned".into()))
    }

    fn check_write(&self, key: &str) -> Result<(), StorageError> {
        if key.is_empty() {
            return Err(StorageError::InvalidKey("key cannot be empty".into()));
        }
        let failing = self
            .failing_writes
            .lock()
            .map_err(|_| StorageError::Backend("Lock poisoned".into()))?;
        if failing.iter().any(|pattern| key.contains(pattern.as_str())) {
            return Err(StorageError::Backend(format!("injected write failure: {key}")));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryStorage {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        options: PutOptions,
    ) -> Result<(), StorageError> {
        self.pause().await;
        self.check_write(key)?;
        let mut buckets = self.lock()?;
        buckets.entry(bucket.to_string()).or_default().insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: options.content_type,
                cache_control: options.cache_control,
            },
        );
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes, StorageError> {
        self.pause().await;
        let buckets = self.lock()?;
        buckets
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .map(|object| object.data.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn head(&self, bucket: &str, key: &str) -> Result<Option<ObjectMeta>, StorageError> {
        self.pause().await;
        let buckets = self.lock()?;
        Ok(buckets
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .map(|object| ObjectMeta {
                key: key.to_string(),
                size: object.data.len() as u64,
                content_type: object.content_type.clone(),
                cache_control: object.cache_control.clone(),
            }))
    }

    async fn list(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: Option<&str>,
    ) -> Result<Listing, StorageError> {
        self.pause().await;
        let buckets = self.lock()?;
        let Some(objects) = buckets.get(bucket) else {
            return Ok(Listing::default());
        };

        let mut keys = Vec::new();
        let mut common_prefixes = BTreeSet::new();
        for key in objects
            .range(prefix.to_string()..)
            .map(|(key, _)| key)
            .take_while(|key| key.starts_with(prefix))
        {
            let rest = &key[prefix.len()..];
            match delimiter.filter(|d| !d.is_empty()).and_then(|d| {
                rest.find(d).map(|idx| idx + d.len())
            }) {
                Some(end) => {
                    common_prefixes.insert(format!("{prefix}{}", &rest[..end]));
                }
                None => keys.push(key.clone()),
            }
        }

        Ok(Listing {
            keys,
            common_prefixes: common_prefixes.into_iter().collect(),
        })
    }

    async fn copy(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
        options: PutOptions,
    ) -> Result<(), StorageError> {
        self.pause().await;
        self.check_write(dst_key)?;
        let mut buckets = self.lock()?;
        let source = buckets
            .get(src_bucket)
            .and_then(|objects| objects.get(src_key))
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("{src_bucket}/{src_key}")))?;

        buckets.entry(dst_bucket.to_string()).or_default().insert(
            dst_key.to_string(),
            StoredObject {
                data: source.data,
                content_type: options.content_type.or(source.content_type),
                cache_control: options.cache_control,
            },
        );
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        self.pause().await;
        let mut buckets = self.lock()?;
        if let Some(objects) = buckets.get_mut(bucket) {
            objects.remove(key);
        }
        Ok(())
    }
}
