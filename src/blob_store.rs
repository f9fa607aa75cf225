//! Content-addressed storage for uploaded papers.
//!
//! Keys are `sha256:<base64url digest>`; writing the same bytes twice yields the
//! same key and one file on disk.

use std::io::Write;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use sha2::{Digest, Sha256};

const KEY_PREFIX: &str = "sha256:";

#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Blob not found: {0}")]
    NotFound(String),
    #[error("Malformed blob key: {0}")]
    InvalidKey(String),
}

/// Opaque blob storage reachable by key.
pub trait DocumentStore: Send + Sync {
    fn put(&self, bytes: &[u8]) -> Result<String, BlobError>;
    fn get(&self, key: &str) -> Result<Vec<u8>, BlobError>;
    fn exists(&self, key: &str) -> bool;
}

pub fn blob_key(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    format!("{KEY_PREFIX}{}", URL_SAFE_NO_PAD.encode(digest))
}

/// Filesystem store: one file per blob, fanned out by the first two digest characters.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn open(root: &Path) -> Result<Self, BlobError> {
        std::fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, BlobError> {
        let digest = key
            .strip_prefix(KEY_PREFIX)
            .filter(|d| d.len() > 2 && d.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'))
            .ok_or_else(|| BlobError::InvalidKey(key.to_string()))?;
        Ok(self.root.join(&digest[..2]).join(digest))
    }
}

impl DocumentStore for FsBlobStore {
    fn put(&self, bytes: &[u8]) -> Result<String, BlobError> {
        let key = blob_key(bytes);
        let path = self.path_for(&key)?;
        if path.exists() {
            return Ok(key);
        }
        let dir = path
            .parent()
            .ok_or_else(|| BlobError::InvalidKey(key.clone()))?;
        std::fs::create_dir_all(dir)?;

        // Write to a temp file in the same directory, then rename into place.
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(bytes)?;
        tmp.persist(&path).map_err(|e| BlobError::Io(e.error))?;

        tracing::debug!(key = %key, size = bytes.len(), "Blob stored");
        Ok(key)
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, BlobError> {
        let path = self.path_for(key)?;
        match std::fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BlobError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn exists(&self, key: &str) -> bool {
        self.path_for(key).map(|p| p.exists()).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_is_content_addressed() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::open(dir.path()).unwrap();

        let a = store.put(b"%PDF-1.4 same bytes").unwrap();
        let b = store.put(b"%PDF-1.4 same bytes").unwrap();
        let c = store.put(b"%PDF-1.4 other bytes").unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("sha256:"));
        assert_eq!(store.get(&a).unwrap(), b"%PDF-1.4 same bytes");
    }

    #[test]
    fn missing_blob_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::open(dir.path()).unwrap();
        let key = blob_key(b"never stored");
        assert!(!store.exists(&key));
        assert!(matches!(store.get(&key), Err(BlobError::NotFound(_))));
    }

    #[test]
    fn traversal_keys_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.get("sha256:../../etc/passwd"),
            Err(BlobError::InvalidKey(_))
        ));
        assert!(matches!(store.get("md5:abc"), Err(BlobError::InvalidKey(_))));
    }
}
