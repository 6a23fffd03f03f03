use super::{RemoteObject, Storage};
use crate::core::hash_index;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::fs;

/// 上传中的临时文件名前缀/后缀，列表时会被忽略
const PART_PREFIX: &str = ".bucketsync-";
const PART_SUFFIX: &str = ".part";

/// 是否为尚未完成的上传临时文件
fn is_partial_upload(key: &str) -> bool {
    let name = key.rsplit('/').next().unwrap_or(key);
    name.starts_with(PART_PREFIX) && name.ends_with(PART_SUFFIX)
}

/// 本地目录模拟的对象存储：每个 bucket 是 base_path 下的一个子目录
pub struct LocalStorage {
    base_path: PathBuf,
    name: String,
}

impl LocalStorage {
    pub fn new(path: &str) -> Self {
        Self {
            base_path: PathBuf::from(path),
            name: format!("local:{}", path),
        }
    }

    /// 获取 bucket 目录，不存在时报错
    async fn bucket_dir(&self, bucket: &str) -> Result<PathBuf> {
        if bucket.is_empty() || bucket.contains(['/', '\\']) || bucket == ".." {
            return Err(anyhow!("Invalid bucket name: {:?}", bucket));
        }

        let dir = self.base_path.join(bucket);
        match fs::metadata(&dir).await {
            Ok(meta) if meta.is_dir() => Ok(dir),
            _ => Err(anyhow!("NoSuchBucket: {}", dir.display())),
        }
    }

    fn resolve_key(bucket_dir: &Path, key: &str) -> Result<PathBuf> {
        let key = key.trim_start_matches('/');
        if key.is_empty() || key.split('/').any(|part| part == "..") {
            return Err(anyhow!("Invalid object key: {:?}", key));
        }
        Ok(bucket_dir.join(key))
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn list_objects(&self, bucket: &str) -> Result<Vec<RemoteObject>> {
        let dir = self.bucket_dir(bucket).await?;

        // 使用 spawn_blocking 避免阻塞 async runtime
        let entries = tokio::task::spawn_blocking(move || hash_index::hash_directory(&dir))
            .await??;

        Ok(entries
            .into_iter()
            .filter(|entry| !is_partial_upload(&entry.relative_path))
            .map(|entry| RemoteObject {
                key: entry.relative_path,
                etag: Some(format!("\"{}\"", entry.content_hash)),
            })
            .collect())
    }

    async fn put_object(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<()> {
        let full_path = Self::resolve_key(&self.bucket_dir(bucket).await?, key)?;

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // 在目标目录下写入唯一命名的临时文件，然后原子重命名，不会覆盖同名的其它对象
        let parent = full_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut temp = tempfile::Builder::new()
                .prefix(PART_PREFIX)
                .suffix(PART_SUFFIX)
                .tempfile_in(&parent)
                .with_context(|| format!("create temp file in {}", parent.display()))?;
            temp.write_all(&data)?;
            temp.persist(&full_path)
                .with_context(|| format!("write {}", full_path.display()))?;
            Ok(())
        })
        .await??;

        Ok(())
    }

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<Vec<String>> {
        let dir = self.bucket_dir(bucket).await?;
        let mut deleted = Vec::with_capacity(keys.len());

        for key in keys {
            let full_path = Self::resolve_key(&dir, key)?;
            match fs::remove_file(&full_path).await {
                Ok(()) => {}
                // 与 S3 一致：删除不存在的对象视为成功
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e).with_context(|| format!("delete {}", full_path.display()))
                }
            }
            deleted.push(key.clone());
        }

        Ok(deleted)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
