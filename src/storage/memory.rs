//! 内存对象存储 - 用于测试和演练

use super::{RemoteObject, Storage};
use crate::core::hash_index::hash_bytes;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

#[derive(Default)]
struct MemoryState {
    buckets: HashMap<String, BTreeMap<String, Vec<u8>>>,
    put_calls: Vec<String>,
    delete_calls: Vec<Vec<String>>,
    failing_puts: HashSet<String>,
}

/// 线程安全的内存存储，记录每次上传和删除调用
#[derive(Default)]
pub struct MemoryStorage {
    state: Mutex<MemoryState>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建带有一个空 bucket 的存储
    pub fn with_bucket(bucket: &str) -> Self {
        let storage = Self::new();
        storage.create_bucket(bucket);
        storage
    }

    pub fn create_bucket(&self, bucket: &str) {
        self.lock().buckets.entry(bucket.to_string()).or_default();
    }

    /// 直接写入对象（不计入调用记录）
    pub fn insert(&self, bucket: &str, key: &str, data: &[u8]) {
        self.lock()
            .buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), data.to_vec());
    }

    pub fn get(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.lock().buckets.get(bucket)?.get(key).cloned()
    }

    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.lock()
            .buckets
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// 让指定键的上传失败
    pub fn fail_put(&self, key: &str) {
        self.lock().failing_puts.insert(key.to_string());
    }

    /// 已发起的上传（按调用顺序）
    pub fn put_calls(&self) -> Vec<String> {
        self.lock().put_calls.clone()
    }

    /// 已发起的批量删除（每次调用的键列表）
    pub fn delete_calls(&self) -> Vec<Vec<String>> {
        self.lock().delete_calls.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        // 锁中毒只会发生在测试 panic 之后，继续使用内部数据
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn list_objects(&self, bucket: &str) -> Result<Vec<RemoteObject>> {
        let state = self.lock();
        let objects = state
            .buckets
            .get(bucket)
            .ok_or_else(|| anyhow!("NoSuchBucket: {}", bucket))?;

        Ok(objects
            .iter()
            .map(|(key, data)| RemoteObject {
                key: key.clone(),
                etag: Some(format!("\"{}\"", hash_bytes(data))),
            })
            .collect())
    }

    async fn put_object(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<()> {
        let mut state = self.lock();
        state.put_calls.push(key.to_string());

        if state.failing_puts.contains(key) {
            return Err(anyhow!("injected failure for {}", key));
        }

        state
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| anyhow!("NoSuchBucket: {}", bucket))?
            .insert(key.to_string(), data);
        Ok(())
    }

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<Vec<String>> {
        let mut state = self.lock();
        state.delete_calls.push(keys.to_vec());

        let objects = state
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| anyhow!("NoSuchBucket: {}", bucket))?;

        for key in keys {
            objects.remove(key);
        }
        Ok(keys.to_vec())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
