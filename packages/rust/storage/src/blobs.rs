//! Filesystem blob store with two buckets.
//!
//! Layout under the blob root:
//!
//! ```text
//! <root>/files/<key>            uploaded auxiliary inputs
//! <root>/files/<key>.meta.json
//! <root>/reports/<key>          generated workbooks
//! <root>/reports/<key>.meta.json
//! ```
//!
//! Blobs are written to a temp file and renamed into place, so a reader never
//! observes a half-written object.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

use sellerreport_shared::{ReportError, Result};

/// Content type of generated workbooks.
pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Blob namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    /// Uploaded auxiliary inputs (cost sheets), content-addressed.
    Files,
    /// Generated report workbooks, keyed by job id.
    Reports,
}

impl Bucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Files => "files",
            Self::Reports => "reports",
        }
    }
}

/// Sidecar metadata stored next to every blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobMeta {
    pub content_type: String,
    pub size: u64,
    pub sha256: String,
    pub stored_at: String,
}

/// Blob store rooted at a directory.
#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store `bytes` under `key`, replacing any previous blob.
    #[instrument(skip(self, bytes), fields(bucket = bucket.as_str(), size = bytes.len()))]
    pub fn put(&self, bucket: Bucket, key: &str, bytes: &[u8], content_type: &str) -> Result<BlobMeta> {
        let path = self.blob_path(bucket, key)?;
        let dir = self.root.join(bucket.as_str());
        std::fs::create_dir_all(&dir).map_err(|e| ReportError::io(&dir, e))?;

        let meta = BlobMeta {
            content_type: content_type.to_string(),
            size: bytes.len() as u64,
            sha256: content_hash(bytes),
            stored_at: Utc::now().to_rfc3339(),
        };
        let meta_json = serde_json::to_vec_pretty(&meta)
            .map_err(|e| ReportError::Storage(format!("blob meta encode: {e}")))?;

        write_atomic(&dir, &meta_path(&path), &meta_json)?;
        write_atomic(&dir, &path, bytes)?;

        debug!(key, sha256 = %meta.sha256, "stored blob");
        Ok(meta)
    }

    /// Store `bytes` under their SHA-256 digest. Returns the key.
    pub fn put_content_addressed(
        &self,
        bucket: Bucket,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<String> {
        let key = content_hash(bytes);
        if self.blob_path(bucket, &key)?.exists() {
            debug!(key, "blob already present");
            return Ok(key);
        }
        self.put(bucket, &key, bytes, content_type)?;
        Ok(key)
    }

    /// Read a blob. A missing blob is `Ok(None)`.
    pub fn get(&self, bucket: Bucket, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.blob_path(bucket, key)?;
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ReportError::io(&path, e)),
        }
    }

    /// Read a blob's sidecar metadata.
    pub fn meta(&self, bucket: Bucket, key: &str) -> Result<Option<BlobMeta>> {
        let path = meta_path(&self.blob_path(bucket, key)?);
        let raw = match std::fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ReportError::io(&path, e)),
        };
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|e| ReportError::Storage(format!("corrupt blob meta {}: {e}", path.display())))
    }

    fn blob_path(&self, bucket: Bucket, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && !key.starts_with('.')
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(ReportError::validation(format!("invalid blob key '{key}'")));
        }
        Ok(self.root.join(bucket.as_str()).join(key))
    }
}

/// Hex SHA-256 of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn meta_path(blob: &Path) -> PathBuf {
    let mut name = blob.file_name().unwrap_or_default().to_os_string();
    name.push(".meta.json");
    blob.with_file_name(name)
}

fn write_atomic(dir: &Path, target: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = target.file_name().unwrap_or_default().to_string_lossy();
    let temp = dir.join(format!(".{file_name}.{}.tmp", uuid::Uuid::now_v7()));
    std::fs::write(&temp, bytes).map_err(|e| ReportError::io(&temp, e))?;
    std::fs::rename(&temp, target).map_err(|e| ReportError::io(target, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> BlobStore {
        BlobStore::new(std::env::temp_dir().join(format!("sr_blobs_{}", uuid::Uuid::now_v7())))
    }

    #[test]
    fn put_then_get() {
        let store = temp_store();
        let meta = store
            .put(Bucket::Reports, "job-1.xlsx", b"workbook", XLSX_CONTENT_TYPE)
            .expect("put");
        assert_eq!(meta.size, 8);
        assert_eq!(meta.content_type, XLSX_CONTENT_TYPE);

        let bytes = store.get(Bucket::Reports, "job-1.xlsx").unwrap();
        assert_eq!(bytes.as_deref(), Some(&b"workbook"[..]));
        let stored_meta = store.meta(Bucket::Reports, "job-1.xlsx").unwrap();
        assert_eq!(stored_meta, Some(meta));
    }

    #[test]
    fn missing_blob_is_none() {
        let store = temp_store();
        assert!(store.get(Bucket::Files, "absent").unwrap().is_none());
        assert!(store.meta(Bucket::Files, "absent").unwrap().is_none());
    }

    #[test]
    fn buckets_are_separate() {
        let store = temp_store();
        store.put(Bucket::Files, "same", b"a", "text/plain").unwrap();
        assert!(store.get(Bucket::Reports, "same").unwrap().is_none());
    }

    #[test]
    fn content_addressed_key_is_digest() {
        let store = temp_store();
        let key = store
            .put_content_addressed(Bucket::Files, b"cost sheet", XLSX_CONTENT_TYPE)
            .unwrap();
        assert_eq!(key, content_hash(b"cost sheet"));
        assert_eq!(key.len(), 64);

        let again = store
            .put_content_addressed(Bucket::Files, b"cost sheet", XLSX_CONTENT_TYPE)
            .unwrap();
        assert_eq!(key, again);
    }

    #[test]
    fn overwrite_replaces_content() {
        let store = temp_store();
        store.put(Bucket::Reports, "k", b"first", "text/plain").unwrap();
        store.put(Bucket::Reports, "k", b"second", "text/plain").unwrap();
        assert_eq!(store.get(Bucket::Reports, "k").unwrap().unwrap(), b"second");
    }

    #[test]
    fn path_like_keys_are_rejected() {
        let store = temp_store();
        assert!(store.get(Bucket::Files, "../escape").is_err());
        assert!(store.put(Bucket::Files, "a/b", b"x", "text/plain").is_err());
        assert!(store.get(Bucket::Files, "").is_err());
    }
}
