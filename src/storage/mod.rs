pub mod local;
pub mod memory;
pub mod s3;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use local::LocalStorage;
pub use memory::MemoryStorage;
pub use s3::S3Storage;

// ============ 公共常量 ============

/// 非 IO 操作超时（秒）- list, delete 等
pub const OP_TIMEOUT_SECS: u64 = 60;
/// IO 操作超时（秒）- 上传
pub const IO_TIMEOUT_SECS: u64 = 300;

/// 文件条目：相对路径 + 内容哈希
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub relative_path: String,
    pub content_hash: String,
}

/// 远程对象（未经处理的列表项）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteObject {
    pub key: String,
    /// 服务端返回的原始 ETag（通常带引号）
    pub etag: Option<String>,
}

/// 对象存储抽象接口
#[async_trait]
pub trait Storage: Send + Sync {
    /// 列出存储桶中的所有对象
    async fn list_objects(&self, bucket: &str) -> Result<Vec<RemoteObject>>;

    /// 上传单个对象
    async fn put_object(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<()>;

    /// 批量删除对象，返回服务端确认删除的键
    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<Vec<String>>;

    /// 获取存储名称（用于日志）
    fn name(&self) -> &str;
}

/// 根据配置创建存储实例
pub fn create_storage(config: &crate::config::StorageConfig) -> crate::error::Result<Arc<dyn Storage>> {
    match config.typ {
        crate::config::StorageType::Local => {
            let path = config.path.as_ref().ok_or_else(|| {
                crate::error::SyncError::Configuration("Local storage requires path".to_string())
            })?;
            tracing::info!("初始化本地存储: {}", path);
            Ok(Arc::new(LocalStorage::new(path)) as Arc<dyn Storage>)
        }
        crate::config::StorageType::S3 => {
            tracing::info!(
                "初始化S3存储: region={:?}, endpoint={:?}",
                config.region,
                config.endpoint
            );
            Ok(Arc::new(S3Storage::new(config)?) as Arc<dyn Storage>)
        }
    }
}
