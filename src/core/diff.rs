//! 差异计算 - 纯函数，比较本地索引与远程列表

use crate::storage::{FileEntry, RemoteObject};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// 待删除对象的标识
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectIdentifier {
    #[serde(rename = "Key")]
    pub key: String,
}

/// 批量删除请求，序列化为 `{"Objects": [{"Key": ...}]}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionRequest {
    #[serde(rename = "Objects")]
    pub objects: Vec<ObjectIdentifier>,
}

impl DeletionRequest {
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.iter().map(|o| o.key.clone()).collect()
    }
}

/// 计算需要从远程删除的对象：远程存在但本地不存在的路径
///
/// 两侧都按集合处理（去重、与顺序无关），`None` 视为空集合。
/// 结果按远程列表中首次出现的顺序排列。
pub fn compute_deletions<L, R>(local: Option<L>, remote: Option<R>) -> DeletionRequest
where
    L: IntoIterator,
    L::Item: AsRef<str>,
    R: IntoIterator,
    R::Item: AsRef<str>,
{
    let local: HashSet<String> = local
        .into_iter()
        .flatten()
        .map(|n| n.as_ref().to_string())
        .collect();
    let mut seen = HashSet::new();
    let mut objects = Vec::new();

    for name in remote.into_iter().flatten() {
        let name = name.as_ref();
        if local.contains(name) || !seen.insert(name.to_string()) {
            continue;
        }
        objects.push(ObjectIdentifier {
            key: name.to_string(),
        });
    }

    DeletionRequest { objects }
}

/// 计算需要上传的文件：本地 (路径, 哈希) 对在远程列表中不存在的条目
///
/// 新文件和内容变化的文件都会被选中，结果保持本地索引顺序。
pub fn compute_uploads(local: &[FileEntry], remote: &[FileEntry]) -> Vec<FileEntry> {
    let remote: HashSet<(&str, &str)> = remote
        .iter()
        .map(|e| (e.relative_path.as_str(), e.content_hash.as_str()))
        .collect();

    local
        .iter()
        .filter(|e| !remote.contains(&(e.relative_path.as_str(), e.content_hash.as_str())))
        .cloned()
        .collect()
}

/// 去掉 ETag 首尾各一个字符（服务端返回的引号）
pub fn strip_etag(raw: &str) -> String {
    let mut chars = raw.chars();
    chars.next();
    chars.next_back();
    chars.as_str().to_string()
}

/// 将远程对象列表转换为 (路径, 哈希) 列表
pub fn remote_listing(objects: &[RemoteObject]) -> Vec<FileEntry> {
    objects
        .iter()
        .map(|o| FileEntry {
            relative_path: o.key.clone(),
            content_hash: o.etag.as_deref().map(strip_etag).unwrap_or_default(),
        })
        .collect()
}

pub fn remote_names(objects: &[RemoteObject]) -> Vec<String> {
    objects.iter().map(|o| o.key.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn entry(path: &str, hash: &str) -> FileEntry {
        FileEntry {
            relative_path: path.to_string(),
            content_hash: hash.to_string(),
        }
    }

    fn keys(request: &DeletionRequest) -> Vec<&str> {
        request.objects.iter().map(|o| o.key.as_str()).collect()
    }

    #[test]
    fn test_should_delete_one_file() {
        let removed = compute_deletions(Some(["file1"]), Some(["file1", "file2"]));
        assert_eq!(keys(&removed), vec!["file2"]);
    }

    #[test]
    fn test_should_delete_file_with_extension() {
        let removed = compute_deletions(
            Some(["file1.exe", "files2.exe"]),
            Some(["file1.exe", "files2.exe", "program 2231.exe"]),
        );
        assert_eq!(keys(&removed), vec!["program 2231.exe"]);
    }

    #[test]
    fn test_should_not_delete_any_file() {
        let removed = compute_deletions(
            Some(["file1.exe", "files2.exe"]),
            Some(["file1.exe", "files2.exe"]),
        );
        assert_eq!(removed, DeletionRequest::default());
    }

    #[test]
    fn test_empty_lists() {
        let empty: Vec<String> = Vec::new();
        assert_eq!(
            compute_deletions(Some(&empty), Some(&empty)),
            DeletionRequest::default()
        );
    }

    #[test]
    fn test_none_inputs_are_empty_sets() {
        let none: Option<Vec<&str>> = None;
        assert_eq!(
            compute_deletions(none.clone(), none.clone()),
            DeletionRequest::default()
        );
        assert!(compute_deletions(Some(vec!["test"]), none.clone()).is_empty());

        let removed = compute_deletions(none, Some(vec!["test"]));
        assert_eq!(removed.keys(), vec!["test".to_string()]);
    }

    #[test]
    fn test_set_and_array_inputs() {
        // 本地有、远程为空集合
        let removed = compute_deletions(Some(BTreeSet::from(["test"])), Some(HashSet::<&str>::new()));
        assert!(removed.is_empty());

        // 本地为空数组、远程为集合
        let removed = compute_deletions(Some([] as [&str; 0]), Some(HashSet::from(["test"])));
        assert_eq!(keys(&removed), vec!["test"]);

        let removed = compute_deletions(Some(["test"]), Some([] as [&str; 0]));
        assert!(removed.is_empty());
    }

    #[test]
    fn test_deletions_are_deduplicated() {
        let removed = compute_deletions(Some(["a"]), Some(["b", "a", "b", "c"]));
        assert_eq!(keys(&removed), vec!["b", "c"]);
    }

    #[test]
    fn test_deletion_request_wire_shape() {
        let removed = compute_deletions(Some(Vec::<&str>::new()), Some(vec!["test".to_string()]));
        let json = serde_json::to_value(&removed).unwrap();
        assert_eq!(json, serde_json::json!({"Objects": [{"Key": "test"}]}));

        let empty = serde_json::to_value(DeletionRequest::default()).unwrap();
        assert_eq!(empty, serde_json::json!({"Objects": []}));
    }

    #[test]
    fn test_uploads_skip_identical_entries() {
        let local = vec![entry("test1", "acbd18db4cc2f85cedef654fccc4a4d8")];
        let remote = remote_listing(&[RemoteObject {
            key: "test1".to_string(),
            etag: Some("\"acbd18db4cc2f85cedef654fccc4a4d8\"".to_string()),
        }]);

        assert!(compute_uploads(&local, &remote).is_empty());
    }

    #[test]
    fn test_uploads_new_and_changed() {
        let local = vec![entry("a", "hashA"), entry("b", "hashB"), entry("d", "hashD")];
        let remote = vec![entry("a", "hashA"), entry("b", "hashOld"), entry("c", "hashC")];

        let uploads = compute_uploads(&local, &remote);
        assert_eq!(uploads, vec![entry("b", "hashB"), entry("d", "hashD")]);
    }

    #[test]
    fn test_uploads_match_on_path_and_hash() {
        // 内容相同但路径不同，仍需上传
        let local = vec![entry("copy.txt", "same")];
        let remote = vec![entry("orig.txt", "same")];
        assert_eq!(compute_uploads(&local, &remote), local);
    }

    #[test]
    fn test_hash_comparison_is_case_sensitive() {
        let local = vec![entry("a", "abcdef")];
        let remote = vec![entry("a", "ABCDEF")];
        assert_eq!(compute_uploads(&local, &remote).len(), 1);
    }

    #[test]
    fn test_strip_etag() {
        assert_eq!(strip_etag("\"abc\""), "abc");
        assert_eq!(strip_etag("xabcx"), "abc");
        assert_eq!(strip_etag("\""), "");
        assert_eq!(strip_etag(""), "");
    }

    #[test]
    fn test_remote_listing_without_etag() {
        let objects = vec![RemoteObject {
            key: "dir/file".to_string(),
            etag: None,
        }];
        assert_eq!(remote_listing(&objects), vec![entry("dir/file", "")]);
        assert_eq!(remote_names(&objects), vec!["dir/file".to_string()]);
    }
}
