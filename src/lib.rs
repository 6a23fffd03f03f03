pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod storage;

pub use config::{Credentials, StorageConfig, StorageType};
pub use crate::core::{DeletionRequest, SyncConfig, SyncEngine, SyncPlan, SyncReport};
pub use error::SyncError;
pub use storage::{create_storage, FileEntry, RemoteObject, Storage};

// 为了兼容性，添加 dirs 依赖
pub mod dirs {
    use std::path::PathBuf;

    pub fn config_dir() -> Option<PathBuf> {
        if cfg!(target_os = "windows") {
            std::env::var("APPDATA").ok().map(PathBuf::from)
        } else if cfg!(target_os = "macos") {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join("Library").join("Application Support"))
        } else {
            // Linux
            std::env::var("XDG_CONFIG_HOME")
                .ok()
                .map(PathBuf::from)
                .or_else(|| {
                    std::env::var("HOME")
                        .ok()
                        .map(|h| PathBuf::from(h).join(".config"))
                })
        }
    }
}
