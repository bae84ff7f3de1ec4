//! In-memory object store fake.
//!
//! Records per-key data, content type, and access tier so tests can assert
//! the tier policy, and supports injected put failures for partial-failure
//! scenarios.

use async_trait::async_trait;
use bytes::Bytes;
use shoebox_core::Tier;
use shoebox_storage::{ObjectMeta, ObjectStore, PutOptions, StorageError, StorageResult};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Clone)]
pub struct StoredObject {
    pub data: Bytes,
    pub content_type: String,
    pub tier: Tier,
}

#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<String, StoredObject>>,
    fail_puts: Mutex<HashSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent puts to `key` fail with a transport error.
    pub fn fail_put(&self, key: &str) {
        self.fail_puts.lock().unwrap().insert(key.to_string());
    }

    pub fn clear_failures(&self) {
        self.fail_puts.lock().unwrap().clear();
    }

    pub fn tier_of(&self, key: &str) -> Option<Tier> {
        self.objects.lock().unwrap().get(key).map(|o| o.tier)
    }

    pub fn content_type_of(&self, key: &str) -> Option<String> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map(|o| o.content_type.clone())
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Overwrite the recorded tier, bypassing put. For seeding tier-drift
    /// scenarios.
    pub fn force_tier(&self, key: &str, tier: Tier) {
        if let Some(obj) = self.objects.lock().unwrap().get_mut(key) {
            obj.tier = tier;
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.objects.lock().unwrap().contains_key(key))
    }

    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        let objects = self.objects.lock().unwrap();
        let obj = objects
            .get(key)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;
        Ok(ObjectMeta {
            size: obj.data.len() as u64,
            last_modified: None,
            content_type: Some(obj.content_type.clone()),
        })
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map(|o| o.data.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn put(&self, key: &str, data: Bytes, opts: PutOptions) -> StorageResult<()> {
        if self.fail_puts.lock().unwrap().contains(key) {
            return Err(StorageError::S3(
                format!("injected failure for {key}").into(),
            ));
        }
        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: opts.content_type.to_string(),
                tier: opts.tier,
            },
        );
        Ok(())
    }

    async fn set_tier(&self, key: &str, tier: Tier) -> StorageResult<()> {
        let mut objects = self.objects.lock().unwrap();
        let obj = objects
            .get_mut(key)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;
        obj.tier = tier;
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.objects
            .lock()
            .unwrap()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn signed_url(&self, key: &str, expiry: Duration) -> StorageResult<String> {
        if !self.objects.lock().unwrap().contains_key(key) {
            return Err(StorageError::NotFound(key.to_string()));
        }
        Ok(format!("memory://{key}?expires={}", expiry.as_secs()))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
