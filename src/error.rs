//! 同步错误类型

use crate::storage::FileEntry;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// 同步过程中可能出现的错误
#[derive(Error, Debug)]
pub enum SyncError {
    /// 凭证或存储配置无效，在发起任何网络请求之前返回
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// 本地文件无法读取（哈希或上传时）
    #[error("I/O error for {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 远程存储拒绝了 list/put/delete 请求
    #[error("Remote {operation} failed: {message}")]
    Remote { operation: String, message: String },

    /// 批量上传中断：`uploaded` 是中断前已成功上传（不会回滚）的条目
    #[error("Upload aborted after {} of {total} files: {source}", .uploaded.len())]
    Upload {
        uploaded: Vec<FileEntry>,
        total: usize,
        #[source]
        source: Box<SyncError>,
    },
}

impl SyncError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        SyncError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// 包装存储适配器返回的错误，保留完整的错误链
    pub fn remote(operation: &str, err: anyhow::Error) -> Self {
        SyncError::Remote {
            operation: operation.to_string(),
            message: format!("{:#}", err),
        }
    }

    /// 上传中断时包装底层错误和已完成的条目
    pub fn upload_aborted(uploaded: Vec<FileEntry>, total: usize, source: SyncError) -> Self {
        SyncError::Upload {
            uploaded,
            total,
            source: Box::new(source),
        }
    }

    /// 上传中断前已完成的条目；其它错误返回 `None`
    pub fn uploaded(&self) -> Option<&[FileEntry]> {
        match self {
            SyncError::Upload { uploaded, .. } => Some(uploaded),
            _ => None,
        }
    }

    /// 去掉上传中断的包装，返回实际失败原因
    pub fn root_cause(&self) -> &SyncError {
        match self {
            SyncError::Upload { source, .. } => source.root_cause(),
            other => other,
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self.root_cause(), SyncError::Configuration(_))
    }

    pub fn is_io(&self) -> bool {
        matches!(self.root_cause(), SyncError::Io { .. })
    }

    pub fn is_remote(&self) -> bool {
        matches!(self.root_cause(), SyncError::Remote { .. })
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
