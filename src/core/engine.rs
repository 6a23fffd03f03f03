use crate::core::diff::{self, DeletionRequest};
use crate::core::hash_index;
use crate::error::{Result, SyncError};
use crate::storage::{FileEntry, Storage};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// 同步配置
#[derive(Debug, Clone, Default)]
pub struct SyncConfig {
    /// 同步时是否删除本地已不存在的远程对象
    pub delete_removed: bool,
    /// 只计算差异，不修改远程
    pub dry_run: bool,
}

/// 差异计划（演练结果）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPlan {
    pub uploads: Vec<FileEntry>,
    pub deletions: DeletionRequest,
}

/// 同步报告
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub bucket: String,
    pub local_path: PathBuf,
    pub start_time: i64,
    pub end_time: i64,
    pub dry_run: bool,
    pub uploaded: Vec<FileEntry>,
    pub deleted: Vec<String>,
    /// 毫秒
    pub duration: u64,
}

/// 同步引擎：组合哈希索引、差异计算和存储客户端
pub struct SyncEngine {
    storage: Arc<dyn Storage>,
    config: SyncConfig,
}

impl SyncEngine {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            config: SyncConfig::default(),
        }
    }

    pub fn with_config(storage: Arc<dyn Storage>, config: SyncConfig) -> Self {
        Self { storage, config }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// 只上传新增或内容变化的文件
    ///
    /// 按本地索引顺序逐个上传，遇到第一个错误立即返回 [`SyncError::Upload`]，
    /// 其中带有已上传的条目（不会回滚）。
    pub async fn upload_changed(&self, bucket: &str, local_path: &Path) -> Result<Vec<FileEntry>> {
        let local = build_local_index(local_path).await?;
        let remote = self.remote_listing(bucket).await?;
        let uploads = diff::compute_uploads(&local, &remote);

        info!(
            "{} 个本地文件, {} 个远程对象, {} 个需要上传",
            local.len(),
            remote.len(),
            uploads.len()
        );

        let root = upload_root(local_path);
        let total = uploads.len();
        let mut uploaded = Vec::with_capacity(total);
        for entry in uploads {
            if let Err(e) = self.upload_entry(bucket, &root, &entry.relative_path).await {
                error!("上传失败，已完成 {}/{}: {}", uploaded.len(), total, e);
                return Err(SyncError::upload_aborted(uploaded, total, e));
            }
            uploaded.push(entry);
        }

        Ok(uploaded)
    }

    /// 删除远程存在但本地已不存在的对象
    ///
    /// 删除集合为空时不会调用存储接口。
    pub async fn delete_removed(&self, bucket: &str, local_path: &Path) -> Result<Vec<String>> {
        let remote = self.remote_names(bucket).await?;
        let local = list_local_names(local_path).await?;
        let request = diff::compute_deletions(Some(&local), Some(&remote));

        if request.is_empty() {
            debug!("没有需要删除的远程对象: {}", bucket);
            return Ok(Vec::new());
        }

        self.delete_objects(bucket, &request).await
    }

    /// 无条件上传所有本地文件
    pub async fn upload_all(&self, bucket: &str, local_path: &Path) -> Result<Vec<String>> {
        let keys = list_local_names(local_path).await?;
        let root = upload_root(local_path);

        for key in &keys {
            self.upload_entry(bucket, &root, key).await?;
        }

        info!("已上传 {} 个文件到 {}", keys.len(), bucket);
        Ok(keys)
    }

    /// 获取远程 (路径, 哈希) 列表
    pub async fn remote_listing(&self, bucket: &str) -> Result<Vec<FileEntry>> {
        let objects = self.list(bucket).await?;
        Ok(diff::remote_listing(&objects))
    }

    /// 获取远程对象名称
    pub async fn remote_names(&self, bucket: &str) -> Result<Vec<String>> {
        let objects = self.list(bucket).await?;
        Ok(diff::remote_names(&objects))
    }

    /// 发起一次批量删除，返回服务端确认删除的键
    pub async fn delete_objects(&self, bucket: &str, request: &DeletionRequest) -> Result<Vec<String>> {
        let keys = request.keys();
        info!("批量删除 {} 个对象: {}", keys.len(), bucket);

        let deleted = self
            .storage
            .delete_objects(bucket, &keys)
            .await
            .map_err(|e| SyncError::remote("delete", e))?;

        debug!("已删除: {:?}", deleted);
        Ok(deleted)
    }

    /// 计算差异计划，不修改远程
    pub async fn plan(&self, bucket: &str, local_path: &Path) -> Result<SyncPlan> {
        let local = build_local_index(local_path).await?;
        let objects = self.list(bucket).await?;

        let uploads = diff::compute_uploads(&local, &diff::remote_listing(&objects));
        let local_names: Vec<&str> = local.iter().map(|e| e.relative_path.as_str()).collect();
        let deletions = diff::compute_deletions(Some(local_names), Some(diff::remote_names(&objects)));

        Ok(SyncPlan { uploads, deletions })
    }

    /// 完整同步：上传变化的文件，并按配置删除多余的远程对象
    pub async fn sync(&self, bucket: &str, local_path: &Path) -> Result<SyncReport> {
        let start_time = chrono::Utc::now().timestamp();
        let started = Instant::now();

        info!(
            "开始同步: {} -> {} ({})",
            local_path.display(),
            bucket,
            self.storage.name()
        );

        let (uploaded, deleted) = if self.config.dry_run {
            let plan = self.plan(bucket, local_path).await?;
            let deleted = if self.config.delete_removed {
                plan.deletions.keys()
            } else {
                Vec::new()
            };
            (plan.uploads, deleted)
        } else {
            let uploaded = self.upload_changed(bucket, local_path).await?;
            let deleted = if self.config.delete_removed {
                self.delete_removed(bucket, local_path).await?
            } else {
                Vec::new()
            };
            (uploaded, deleted)
        };

        let report = SyncReport {
            bucket: bucket.to_string(),
            local_path: local_path.to_path_buf(),
            start_time,
            end_time: chrono::Utc::now().timestamp(),
            dry_run: self.config.dry_run,
            uploaded,
            deleted,
            duration: started.elapsed().as_millis() as u64,
        };

        info!(
            "同步完成: 上传 {} 个, 删除 {} 个, 耗时 {}ms{}",
            report.uploaded.len(),
            report.deleted.len(),
            report.duration,
            if report.dry_run { " (演练)" } else { "" }
        );

        Ok(report)
    }

    async fn list(&self, bucket: &str) -> Result<Vec<crate::storage::RemoteObject>> {
        self.storage
            .list_objects(bucket)
            .await
            .map_err(|e| SyncError::remote("list", e))
    }

    /// 读取并上传单个文件，文件句柄在读取完成后立即释放
    async fn upload_entry(&self, bucket: &str, root: &Path, key: &str) -> Result<()> {
        let path = root.join(key);
        let data = tokio::fs::read(&path)
            .await
            .map_err(|e| SyncError::io(&path, e))?;

        debug!("上传: {} ({} 字节)", key, data.len());
        self.storage
            .put_object(bucket, key, data)
            .await
            .map_err(|e| SyncError::remote("put", e))
    }
}

/// 上传时键对应的根目录：目录本身，或单个文件所在的目录
fn upload_root(local_path: &Path) -> PathBuf {
    if local_path.is_dir() {
        local_path.to_path_buf()
    } else {
        local_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }
}

async fn build_local_index(local_path: &Path) -> Result<Vec<FileEntry>> {
    let path = local_path.to_path_buf();
    tokio::task::spawn_blocking(move || hash_index::build_local_index(&path))
        .await
        .map_err(|e| SyncError::io(local_path, std::io::Error::other(e)))?
}

async fn list_local_names(local_path: &Path) -> Result<Vec<String>> {
    let path = local_path.to_path_buf();
    tokio::task::spawn_blocking(move || hash_index::list_files(&path, false))
        .await
        .map_err(|e| SyncError::io(local_path, std::io::Error::other(e)))?
}
