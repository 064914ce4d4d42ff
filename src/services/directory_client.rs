//! Storage client over a plain directory tree.
//!
//! Each subdirectory of the root is a bucket and each file below it is an
//! object whose key is its relative path with `/` separators. Checksums are
//! the MD5 digest of the file contents.

use crate::{
    models::listing::{ListObjectsParams, ListObjectsResult, ListedObject},
    services::{
        catalog_client::ensure_bucket_name_safe,
        storage_client::{MAX_PAGE_SIZE, StorageClient, StorageError, StorageResult},
    },
};
use async_trait::async_trait;
use md5::Context;
use std::{
    collections::VecDeque,
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tokio::{fs, io::AsyncReadExt};
use tracing::{debug, warn};

const MAX_OBJECT_KEY_LEN: usize = 1024;
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Prefix of in-flight upload files, which are not objects yet.
const TEMP_FILE_PREFIX: &str = ".tmp-";

#[derive(Clone, Debug)]
pub struct DirectoryClient {
    /// Directory whose children are buckets.
    pub base_path: PathBuf,
}

/// A directory child waiting to be visited by the listing walk.
#[derive(Debug)]
struct WalkEntry {
    /// Object key for files, key prefix ending in `/` for directories.
    key: String,
    path: PathBuf,
    is_dir: bool,
}

impl DirectoryClient {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn bucket_root(&self, bucket: &str) -> StorageResult<PathBuf> {
        ensure_bucket_name_safe(bucket)?;
        Ok(self.base_path.join(bucket))
    }

    /// Read one directory, returning its children in key order.
    ///
    /// Directories sort by `name/`, which puts every key below them exactly
    /// where a flat sort of full keys would. Children that cannot become
    /// object keys are skipped with a warning.
    async fn read_sorted(dir: &Path, key_prefix: &str) -> StorageResult<VecDeque<WalkEntry>> {
        let mut children = Vec::new();
        let mut entries = fs::read_dir(dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                warn!("skipping {}: name is not valid UTF-8", path.to_string_lossy());
                continue;
            };

            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                children.push(WalkEntry {
                    key: format!("{key_prefix}{name}/"),
                    path,
                    is_dir: true,
                });
                continue;
            }
            if !file_type.is_file() || name.starts_with(TEMP_FILE_PREFIX) {
                continue;
            }

            let key = format!("{key_prefix}{name}");
            if let Err(err) = ensure_key_safe(&key) {
                warn!("skipping {}: {}", path.to_string_lossy(), err);
                continue;
            }
            children.push(WalkEntry {
                key,
                path,
                is_dir: false,
            });
        }

        children.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(children.into())
    }

    /// Walk the bucket in key order and collect up to `limit` keys that
    /// match the prefix and sort after the token.
    ///
    /// Subtrees that cannot hold a wanted key are never read, and the walk
    /// stops as soon as `limit` keys are found.
    async fn scan_keys(
        root: &Path,
        params: &ListObjectsParams,
        limit: usize,
    ) -> StorageResult<Vec<String>> {
        let prefix = params.prefix.as_deref();
        let token = params.continuation_token.as_deref();

        let mut keys = Vec::new();
        let mut stack = vec![Self::read_sorted(root, "").await?];

        while let Some(frame) = stack.last_mut() {
            let Some(entry) = frame.pop_front() else {
                stack.pop();
                continue;
            };

            if entry.is_dir {
                if !subtree_may_match(&entry.key, prefix, token) {
                    continue;
                }
                match Self::read_sorted(&entry.path, &entry.key).await {
                    Ok(children) => stack.push(children),
                    Err(StorageError::Io(err)) if err.kind() == ErrorKind::NotFound => {
                        debug!("{} vanished during listing", entry.path.to_string_lossy());
                    }
                    Err(err) => return Err(err),
                }
                continue;
            }

            if key_matches(&entry.key, prefix, token) {
                keys.push(entry.key);
                if keys.len() >= limit {
                    break;
                }
            }
        }

        Ok(keys)
    }
}

#[async_trait]
impl StorageClient for DirectoryClient {
    async fn ensure_bucket(&self, bucket: &str) -> StorageResult<()> {
        let root = self.bucket_root(bucket)?;
        match fs::metadata(&root).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(StorageError::BucketNotFound(bucket.to_string())),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(StorageError::BucketNotFound(bucket.to_string()))
            }
            Err(err) => Err(StorageError::Io(err)),
        }
    }

    /// List one page of keys. The continuation token is the last key
    /// returned, so each page resumes the walk just after it.
    async fn list_objects(
        &self,
        bucket: &str,
        params: &ListObjectsParams,
    ) -> StorageResult<ListObjectsResult> {
        let root = self.bucket_root(bucket)?;
        let max_keys = params.max_keys.clamp(1, MAX_PAGE_SIZE);

        let mut page = Self::scan_keys(&root, params, max_keys + 1)
            .await
            .map_err(|err| match err {
                StorageError::Io(io) if io.kind() == ErrorKind::NotFound => {
                    StorageError::BucketNotFound(bucket.to_string())
                }
                other => other,
            })?;

        let is_truncated = page.len() > max_keys;
        page.truncate(max_keys);
        let next_continuation_token = if is_truncated {
            page.last().cloned()
        } else {
            None
        };

        debug!(
            "directory listed {} objects in bucket {} (truncated: {})",
            page.len(),
            bucket,
            is_truncated
        );

        Ok(ListObjectsResult {
            objects: page.into_iter().map(ListedObject::deferred).collect(),
            is_truncated,
            next_continuation_token,
        })
    }

    /// Stream the file through MD5 and return the lowercase hex digest.
    async fn checksum(&self, bucket: &str, key: &str) -> StorageResult<Option<String>> {
        ensure_key_safe(key)?;
        let path = self.bucket_root(bucket)?.join(key);

        let mut file = fs::File::open(&path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                StorageError::ObjectNotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                }
            } else {
                StorageError::Io(err)
            }
        })?;

        let mut digest = Context::new();
        let mut buf = vec![0u8; READ_CHUNK_SIZE];
        loop {
            let read = file.read(&mut buf).await?;
            if read == 0 {
                break;
            }
            digest.consume(&buf[..read]);
        }

        Ok(Some(format!("{:x}", digest.compute())))
    }
}

/// Whether a key found by the walk belongs on the page.
fn key_matches(key: &str, prefix: Option<&str>, token: Option<&str>) -> bool {
    prefix.is_none_or(|prefix| key.starts_with(prefix)) && token.is_none_or(|token| key > token)
}

/// Whether any key below `dir_prefix` (which ends in `/`) can match.
///
/// With a token, a subtree sorting before it is skipped unless the token
/// itself lies inside that subtree.
fn subtree_may_match(dir_prefix: &str, prefix: Option<&str>, token: Option<&str>) -> bool {
    let prefix_ok = prefix.is_none_or(|prefix| {
        dir_prefix.starts_with(prefix) || prefix.starts_with(dir_prefix)
    });
    let token_ok = token.is_none_or(|token| dir_prefix > token || token.starts_with(dir_prefix));
    prefix_ok && token_ok
}

/// Basic key validation to avoid trivial path traversal vectors.
///
/// Rejects empty or oversized keys, absolute keys, keys with an empty, `.`
/// or `..` path segment, and keys carrying NUL bytes or backslashes.
fn ensure_key_safe(key: &str) -> StorageResult<()> {
    let invalid = || StorageError::InvalidObjectKey(key.to_string());
    if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
        return Err(invalid());
    }
    if key
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(invalid());
    }
    if key.bytes().any(|b| b == b'\\' || b == b'\0') {
        return Err(invalid());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsafe_keys_are_rejected() {
        for key in ["some-path/some-file", "release..tgz", "a/..b/c..", "tab\tkey"] {
            assert!(ensure_key_safe(key).is_ok(), "{key:?} should be accepted");
        }
        for key in ["", "/abs", "a/../b", "..", "a/./b", "a//b", "back\\slash", "nul\0"] {
            assert!(ensure_key_safe(key).is_err(), "{key:?} should be rejected");
        }
        assert!(ensure_key_safe(&"k".repeat(MAX_OBJECT_KEY_LEN + 1)).is_err());
    }

    #[test]
    fn subtrees_before_the_token_are_pruned() {
        assert!(subtree_may_match("a/", None, None));
        assert!(!subtree_may_match("a/", None, Some("b")));
        assert!(subtree_may_match("a/", None, Some("a/x")));
        assert!(subtree_may_match("c/", None, Some("b")));
        // "a-c" sorts before "a/" because '-' < '/'.
        assert!(subtree_may_match("a/", None, Some("a-c")));
    }

    #[test]
    fn subtrees_outside_the_prefix_are_pruned() {
        assert!(subtree_may_match("logs/", Some("logs/2024"), None));
        assert!(subtree_may_match("logs/2024/", Some("logs/"), None));
        assert!(!subtree_may_match("images/", Some("logs/"), None));
    }

    #[test]
    fn keys_match_prefix_and_token() {
        assert!(key_matches("a/1", Some("a/"), None));
        assert!(!key_matches("b/1", Some("a/"), None));
        assert!(!key_matches("a/1", None, Some("a/1")));
        assert!(key_matches("a/2", None, Some("a/1")));
    }
}
