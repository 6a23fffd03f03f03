//! 应用配置模块

use crate::error::{Result, SyncError};
use aws_config::profile::ProfileFileCredentialsProvider;
use aws_credential_types::provider::ProvideCredentials;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// 存储类型
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    Local,
    #[default]
    S3,
}

/// 存储配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    #[serde(rename = "type", default)]
    pub typ: StorageType,
    /// 本地存储的根目录（每个 bucket 是其中的一个子目录）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    /// 共享凭证文件中的 profile 名称
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
}

/// 凭证来源
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    /// 共享凭证文件中的命名 profile
    Profile(String),
    /// 显式的 access/secret key
    Static {
        access_key: String,
        secret_key: String,
    },
}

impl StorageConfig {
    /// 从配置文件加载存储配置
    pub fn load(config_dir: &Path) -> Option<Self> {
        read_config(config_dir)
            .get("storage")
            .and_then(|v| serde_json::from_value::<StorageConfig>(v.clone()).ok())
    }

    /// 保存存储配置
    pub fn save(&self, config_dir: &Path) -> io::Result<()> {
        let value = serde_json::to_value(self).map_err(io::Error::other)?;
        write_config_key(config_dir, "storage", value)
    }

    /// 校验凭证：需要 profile，或者同时提供 access key 和 secret key
    pub fn credentials(&self) -> Result<Credentials> {
        if let Some(profile) = self.profile.as_deref().filter(|p| !p.is_empty()) {
            return Ok(Credentials::Profile(profile.to_string()));
        }

        match (
            self.access_key.as_deref().filter(|k| !k.is_empty()),
            self.secret_key.as_deref().filter(|k| !k.is_empty()),
        ) {
            (Some(access_key), Some(secret_key)) => Ok(Credentials::Static {
                access_key: access_key.to_string(),
                secret_key: secret_key.to_string(),
            }),
            _ => Err(SyncError::Configuration(
                "Invalid \"secret_key\" or \"access_key\": provide a profile or both keys"
                    .to_string(),
            )),
        }
    }
}

/// 解析后的密钥
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedKeys {
    pub access_key: String,
    pub secret_key: String,
    /// 临时凭证（例如 profile 中配置的 aws_session_token）
    pub session_token: Option<String>,
}

impl Credentials {
    /// 解析为实际使用的密钥
    ///
    /// profile 通过 aws-config 的共享配置加载，遵循 `AWS_SHARED_CREDENTIALS_FILE`
    /// 和 `AWS_CONFIG_FILE`。
    pub async fn resolve(&self) -> Result<ResolvedKeys> {
        match self {
            Credentials::Static {
                access_key,
                secret_key,
            } => Ok(ResolvedKeys {
                access_key: access_key.clone(),
                secret_key: secret_key.clone(),
                session_token: None,
            }),
            Credentials::Profile(name) => {
                let provider = ProfileFileCredentialsProvider::builder()
                    .profile_name(name)
                    .build();
                let creds = provider.provide_credentials().await.map_err(|e| {
                    SyncError::Configuration(format!(
                        "Cannot load credentials for profile '{}': {:#}",
                        name,
                        anyhow::Error::from(e)
                    ))
                })?;
                tracing::debug!("已从 profile 加载凭证: {}", name);

                Ok(ResolvedKeys {
                    access_key: creds.access_key_id().to_string(),
                    secret_key: creds.secret_access_key().to_string(),
                    session_token: creds.session_token().map(str::to_string),
                })
            }
        }
    }
}

/// 获取配置目录（支持 data_path 自定义）
pub fn get_config_dir() -> PathBuf {
    let default_config_dir = crate::dirs::config_dir()
        .map(|p| p.join("bucketsync"))
        .unwrap_or_else(|| PathBuf::from(".bucketsync"));

    read_config(&default_config_dir)
        .get("data_path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from)
        .filter(|p| p.is_dir())
        .inspect(|p| tracing::debug!("使用自定义数据路径: {:?}", p))
        .unwrap_or(default_config_dir)
}

/// 读取 config.json，不存在或损坏时返回空对象
pub(crate) fn read_config(config_dir: &Path) -> serde_json::Value {
    fs::read_to_string(config_dir.join("config.json"))
        .ok()
        .and_then(|content| serde_json::from_str(&content).ok())
        .unwrap_or_else(|| serde_json::json!({}))
}

/// 更新 config.json 中的单个键，保留其它配置
pub(crate) fn write_config_key(
    config_dir: &Path,
    key: &str,
    value: serde_json::Value,
) -> io::Result<()> {
    fs::create_dir_all(config_dir)?;

    let mut config = read_config(config_dir);
    if !config.is_object() {
        config = serde_json::json!({});
    }
    config[key] = value;

    let content = serde_json::to_string_pretty(&config).map_err(io::Error::other)?;
    fs::write(config_dir.join("config.json"), content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_credentials_profile_wins() {
        let config = StorageConfig {
            profile: Some("test".to_string()),
            access_key: Some("ignored".to_string()),
            ..Default::default()
        };
        assert_eq!(
            config.credentials().unwrap(),
            Credentials::Profile("test".to_string())
        );
    }

    #[tokio::test]
    async fn test_credentials_need_both_keys() {
        let only_access = StorageConfig {
            access_key: Some("AKID".to_string()),
            ..Default::default()
        };
        assert!(only_access.credentials().unwrap_err().is_configuration());

        let only_secret = StorageConfig {
            secret_key: Some("secret".to_string()),
            ..Default::default()
        };
        assert!(only_secret.credentials().unwrap_err().is_configuration());

        assert!(StorageConfig::default()
            .credentials()
            .unwrap_err()
            .is_configuration());

        let both = StorageConfig {
            access_key: Some("AKID".to_string()),
            secret_key: Some("secret".to_string()),
            ..Default::default()
        };
        let keys = both.credentials().unwrap().resolve().await.unwrap();
        assert_eq!(keys.access_key, "AKID");
        assert_eq!(keys.secret_key, "secret");
        assert_eq!(keys.session_token, None);
    }

    #[tokio::test]
    async fn test_profile_resolved_from_shared_files() {
        let dir = TempDir::new().unwrap();
        let credentials = dir.path().join("credentials");
        let config = dir.path().join("config");
        std::fs::write(
            &credentials,
            "\
[default]
aws_access_key_id = DEFAULTKEY
aws_secret_access_key = defaultsecret

# comment
[test]
aws_access_key_id=TESTKEY
aws_secret_access_key=testsecret
aws_session_token=testtoken
",
        )
        .unwrap();
        std::fs::write(&config, "[profile test]\nregion = us-east-1\n").unwrap();

        // 只有这个测试修改这两个环境变量
        std::env::set_var("AWS_SHARED_CREDENTIALS_FILE", &credentials);
        std::env::set_var("AWS_CONFIG_FILE", &config);

        let keys = Credentials::Profile("test".to_string())
            .resolve()
            .await
            .unwrap();
        assert_eq!(keys.access_key, "TESTKEY");
        assert_eq!(keys.secret_key, "testsecret");
        assert_eq!(keys.session_token.as_deref(), Some("testtoken"));

        let keys = Credentials::Profile("default".to_string())
            .resolve()
            .await
            .unwrap();
        assert_eq!(keys.access_key, "DEFAULTKEY");

        let err = Credentials::Profile("missing".to_string())
            .resolve()
            .await
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_storage_config_roundtrip_keeps_other_keys() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("config.json"),
            r#"{"log": {"level": "debug"}}"#,
        )
        .unwrap();

        let config = StorageConfig {
            typ: StorageType::Local,
            path: Some("/srv/buckets".to_string()),
            ..Default::default()
        };
        config.save(dir.path()).unwrap();

        let loaded = StorageConfig::load(dir.path()).unwrap();
        assert_eq!(loaded.typ, StorageType::Local);
        assert_eq!(loaded.path.as_deref(), Some("/srv/buckets"));
        assert_eq!(read_config(dir.path())["log"]["level"], "debug");
    }

    #[test]
    fn test_storage_config_camel_case() {
        let config: StorageConfig = serde_json::from_str(
            r#"{"type": "s3", "region": "eu-west-1", "accessKey": "A", "secretKey": "S"}"#,
        )
        .unwrap();
        assert_eq!(config.typ, StorageType::S3);
        assert_eq!(config.access_key.as_deref(), Some("A"));
        assert_eq!(config.secret_key.as_deref(), Some("S"));
    }

    #[test]
    fn test_load_missing_config() {
        let dir = TempDir::new().unwrap();
        assert!(StorageConfig::load(dir.path()).is_none());
    }
}
