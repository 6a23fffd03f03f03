//! 内容哈希索引 - 计算单个文件和整个目录树的 MD5

use crate::error::{Result, SyncError};
use crate::storage::FileEntry;
use std::fs::File;
use std::io::Read;
use std::path::{Component, Path};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

/// 读取文件时的分块大小
const HASH_CHUNK_SIZE: usize = 64 * 1024;

/// 计算文件的 MD5（分块读取，不会一次加载整个文件）
pub fn hash_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| SyncError::io(path, e))?;
    let mut context = md5::Context::new();
    let mut buffer = vec![0u8; HASH_CHUNK_SIZE];

    loop {
        let n = file.read(&mut buffer).map_err(|e| SyncError::io(path, e))?;
        if n == 0 {
            break;
        }
        context.consume(&buffer[..n]);
    }

    Ok(format!("{:x}", context.compute()))
}

/// 计算内存数据的 MD5
pub fn hash_bytes(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

/// 递归计算目录下所有文件的哈希
pub fn hash_directory(root: &Path) -> Result<Vec<FileEntry>> {
    let mut entries = Vec::new();

    for entry in walk_files(root)? {
        let relative_path = relative_key(root, entry.path())?;
        let content_hash = hash_file(entry.path())?;
        entries.push(FileEntry {
            relative_path,
            content_hash,
        });
    }

    debug!("已索引 {} 个文件: {}", entries.len(), root.display());
    Ok(entries)
}

/// 构建本地索引：单个文件以文件名为键，目录则递归索引
pub fn build_local_index(path: &Path) -> Result<Vec<FileEntry>> {
    let metadata = std::fs::metadata(path).map_err(|e| SyncError::io(path, e))?;
    if metadata.is_dir() {
        return hash_directory(path);
    }

    Ok(vec![FileEntry {
        relative_path: base_name(path)?,
        content_hash: hash_file(path)?,
    }])
}

/// 列出所有文件（不计算哈希）
///
/// `full_path` 为 true 时返回与 `root` 拼接后的路径，否则返回相对路径。
pub fn list_files(root: &Path, full_path: bool) -> Result<Vec<String>> {
    let metadata = std::fs::metadata(root).map_err(|e| SyncError::io(root, e))?;
    if !metadata.is_dir() {
        return if full_path {
            Ok(vec![path_to_string(root)?])
        } else {
            Ok(vec![base_name(root)?])
        };
    }

    walk_files(root)?
        .iter()
        .map(|entry| {
            if full_path {
                path_to_string(entry.path())
            } else {
                relative_key(root, entry.path())
            }
        })
        .collect()
}

/// 遍历目录，只返回普通文件
///
/// 指向文件的符号链接会被跟随，指向目录的符号链接会被跳过（避免循环）。
fn walk_files(root: &Path) -> Result<Vec<DirEntry>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            let source = e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("directory walk failed"));
            SyncError::io(path, source)
        })?;

        let file_type = entry.file_type();
        if file_type.is_file() {
            files.push(entry);
        } else if file_type.is_symlink() {
            match std::fs::metadata(entry.path()) {
                Ok(target) if target.is_file() => files.push(entry),
                Ok(_) => debug!("跳过目录符号链接: {}", entry.path().display()),
                // 悬空链接
                Err(e) => debug!("跳过无效符号链接: {} ({})", entry.path().display(), e),
            }
        }
    }

    Ok(files)
}

/// 计算相对于根目录的键，统一使用 `/` 分隔
fn relative_key(root: &Path, path: &Path) -> Result<String> {
    let relative = path
        .strip_prefix(root)
        .map_err(|e| SyncError::io(path, std::io::Error::other(e)))?;

    let mut parts = Vec::new();
    for component in relative.components() {
        if let Component::Normal(part) = component {
            parts.push(part.to_str().ok_or_else(|| invalid_name(path))?);
        }
    }

    Ok(parts.join("/"))
}

fn base_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| invalid_name(path))
}

fn path_to_string(path: &Path) -> Result<String> {
    path.to_str()
        .map(|p| p.replace('\\', "/"))
        .ok_or_else(|| invalid_name(path))
}

fn invalid_name(path: &Path) -> SyncError {
    SyncError::io(
        path,
        std::io::Error::new(std::io::ErrorKind::InvalidData, "file name is not valid UTF-8"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const FOO_MD5: &str = "acbd18db4cc2f85cedef654fccc4a4d8";

    fn fixture() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("test1"), "foo").unwrap();
        fs::create_dir_all(dir.path().join("nested/deep")).unwrap();
        fs::write(dir.path().join("nested/a.txt"), "a").unwrap();
        fs::write(dir.path().join("nested/deep/b.txt"), "").unwrap();
        dir
    }

    #[test]
    fn test_hash_file_md5() {
        let dir = fixture();
        assert_eq!(hash_file(&dir.path().join("test1")).unwrap(), FOO_MD5);
        assert_eq!(hash_bytes(b"foo"), FOO_MD5);
        assert_eq!(
            hash_file(&dir.path().join("nested/deep/b.txt")).unwrap(),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
    }

    #[test]
    fn test_hash_file_larger_than_chunk() {
        let dir = TempDir::new().unwrap();
        let data: Vec<u8> = (0..(HASH_CHUNK_SIZE * 3 + 17)).map(|i| (i % 251) as u8).collect();
        let path = dir.path().join("big.bin");
        fs::write(&path, &data).unwrap();

        assert_eq!(hash_file(&path).unwrap(), hash_bytes(&data));
    }

    #[test]
    fn test_hash_file_missing_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = hash_file(&dir.path().join("nope")).unwrap_err();
        assert!(err.is_io());
    }

    #[test]
    fn test_hash_directory_relative_posix_paths() {
        let dir = fixture();
        let entries = hash_directory(dir.path()).unwrap();
        let paths: Vec<_> = entries.iter().map(|e| e.relative_path.as_str()).collect();

        assert_eq!(paths, vec!["nested/a.txt", "nested/deep/b.txt", "test1"]);
        assert_eq!(entries[2].content_hash, FOO_MD5);
    }

    #[test]
    fn test_build_local_index_single_file() {
        let dir = fixture();
        let entries = build_local_index(&dir.path().join("nested/a.txt")).unwrap();

        assert_eq!(
            entries,
            vec![FileEntry {
                relative_path: "a.txt".to_string(),
                content_hash: hash_bytes(b"a"),
            }]
        );
    }

    #[test]
    fn test_build_local_index_missing_root() {
        let dir = TempDir::new().unwrap();
        assert!(build_local_index(&dir.path().join("gone")).unwrap_err().is_io());
        assert!(list_files(&dir.path().join("gone"), false).unwrap_err().is_io());
    }

    #[test]
    fn test_list_files_relative_and_full() {
        let dir = fixture();
        let relative = list_files(dir.path(), false).unwrap();
        assert_eq!(relative, vec!["nested/a.txt", "nested/deep/b.txt", "test1"]);

        let full = list_files(dir.path(), true).unwrap();
        assert_eq!(full.len(), 3);
        assert!(full[2].ends_with("/test1"));
        assert!(full.iter().all(|p| Path::new(p).is_file()));
    }

    #[test]
    fn test_list_files_single_file() {
        let dir = fixture();
        let file = dir.path().join("test1");
        assert_eq!(list_files(&file, false).unwrap(), vec!["test1"]);
    }

    #[test]
    fn test_empty_directory() {
        let dir = TempDir::new().unwrap();
        assert!(hash_directory(dir.path()).unwrap().is_empty());
        assert!(list_files(dir.path(), false).unwrap().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_policy() {
        let dir = fixture();
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("linked.txt"), "foo").unwrap();
        std::os::unix::fs::symlink(outside.path().join("linked.txt"), dir.path().join("link"))
            .unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("dirlink")).unwrap();

        let entries = hash_directory(dir.path()).unwrap();
        let link = entries.iter().find(|e| e.relative_path == "link").unwrap();
        assert_eq!(link.content_hash, FOO_MD5);
        assert!(!entries.iter().any(|e| e.relative_path.starts_with("dirlink")));
    }
}
