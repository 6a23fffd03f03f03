use super::{RemoteObject, Storage, IO_TIMEOUT_SECS, OP_TIMEOUT_SECS};
use crate::config::{Credentials, ResolvedKeys, StorageConfig};
use crate::error::SyncError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use opendal::{layers::TimeoutLayer, Metadata, Metakey, Operator};
use std::time::Duration;
use tracing::debug;

/// 未配置 region 时使用的默认值
const DEFAULT_REGION: &str = "us-east-1";

pub struct S3Storage {
    region: String,
    credentials: Credentials,
    endpoint: Option<String>,
    prefix: Option<String>,
}

impl S3Storage {
    /// 创建 S3 客户端，凭证无效时在任何网络请求前返回配置错误
    pub fn new(config: &StorageConfig) -> crate::error::Result<Self> {
        let credentials = config.credentials()?;

        let storage = Self {
            region: config
                .region
                .clone()
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
            credentials,
            endpoint: config.endpoint.clone(),
            prefix: config
                .prefix
                .as_deref()
                .map(|p| p.trim_matches('/').to_string())
                .filter(|p| !p.is_empty()),
        };

        // 提前校验构建参数（不会发起请求）
        storage
            .build_operator("bucketsync-config-check", &ResolvedKeys::default())
            .map_err(|e| SyncError::Configuration(format!("{:#}", e)))?;

        Ok(storage)
    }

    /// 对象位置，用于日志和错误信息：`s3://bucket/prefix`
    fn location(&self, bucket: &str) -> String {
        match self.prefix {
            Some(ref p) => format!("s3://{}/{}", bucket, p),
            None => format!("s3://{}", bucket),
        }
    }

    /// 解析凭证并为指定 bucket 构建 operator
    ///
    /// profile 凭证每次调用时重新加载。
    async fn operator(&self, bucket: &str) -> Result<Operator> {
        let keys = self.credentials.resolve().await?;
        debug!("使用 {}", self.location(bucket));
        self.build_operator(bucket, &keys)
    }

    fn build_operator(&self, bucket: &str, keys: &ResolvedKeys) -> Result<Operator> {
        use opendal::services::S3;

        let mut builder = S3::default()
            .bucket(bucket)
            .region(&self.region)
            .access_key_id(&keys.access_key)
            .secret_access_key(&keys.secret_key)
            .disable_config_load();

        if let Some(ref token) = keys.session_token {
            builder = builder.session_token(token);
        }

        if let Some(ref ep) = self.endpoint {
            builder = builder.endpoint(ep);
        }

        if let Some(ref p) = self.prefix {
            builder = builder.root(p);
        }

        // 添加超时层
        let operator = Operator::new(builder)?
            .layer(
                TimeoutLayer::default()
                    .with_timeout(Duration::from_secs(OP_TIMEOUT_SECS))
                    .with_io_timeout(Duration::from_secs(IO_TIMEOUT_SECS)),
            )
            .finish();

        Ok(operator)
    }
}

/// 将列表项转换为远程对象，跳过根目录和目录占位对象
///
/// ETag 保留原始引号，由差异计算统一处理。
fn to_remote_object(path: &str, meta: &Metadata) -> Option<RemoteObject> {
    let key = path.trim_start_matches('/');
    if key.is_empty() || meta.is_dir() {
        return None;
    }

    Some(RemoteObject {
        key: key.to_string(),
        etag: meta.etag().map(str::to_string),
    })
}

#[async_trait]
impl Storage for S3Storage {
    async fn list_objects(&self, bucket: &str) -> Result<Vec<RemoteObject>> {
        let mut objects = Vec::new();

        let mut lister = self
            .operator(bucket)
            .await?
            .lister_with("")
            .recursive(true)
            .metakey(Metakey::Mode | Metakey::Etag)
            .await
            .with_context(|| format!("list {}", self.location(bucket)))?;

        while let Some(entry) = lister.try_next().await? {
            if let Some(object) = to_remote_object(entry.path(), entry.metadata()) {
                objects.push(object);
            }
        }

        Ok(objects)
    }

    async fn put_object(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<()> {
        self.operator(bucket)
            .await?
            .write(key, data)
            .await
            .with_context(|| format!("put {}/{}", self.location(bucket), key))?;
        Ok(())
    }

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<Vec<String>> {
        // 批量删除要么整体成功，要么整体失败
        self.operator(bucket)
            .await?
            .remove(keys.to_vec())
            .await
            .with_context(|| format!("delete {} objects from {}", keys.len(), self.location(bucket)))?;
        Ok(keys.to_vec())
    }

    fn name(&self) -> &str {
        "s3"
    }
}
