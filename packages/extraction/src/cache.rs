//! Upload cache: content-addressed map of local files to remote handles.
//!
//! Uploading a guideline page to the Files API returns a URI that stays
//! valid until the underlying content changes. The cache keys each input
//! path to the SHA-256 of its bytes plus the URI obtained on upload; a
//! hash mismatch on lookup forces a re-upload.
//!
//! The whole cache is a single JSON file, load-modify-stored on every
//! write. Concurrent processes can lose updates (last writer wins); the
//! toolkit assumes single-process access.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::Result;

const HASH_BLOCK_SIZE: usize = 4096;

/// One cached upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Remote handle returned by the upload step
    pub file_uri: String,

    /// SHA-256 hex digest of the file bytes at upload time
    pub file_hash: String,

    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    #[serde(default)]
    files: BTreeMap<String, CacheEntry>,

    #[serde(default)]
    last_updated: Option<DateTime<Utc>>,
}

/// Persistent upload cache backed by a single JSON file.
#[derive(Debug, Clone)]
pub struct UploadCache {
    path: PathBuf,
}

impl UploadCache {
    /// Create a cache handle for the given file path.
    ///
    /// The file is created lazily on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Return the cached remote URI for `input` only if the file's
    /// current content hash matches the one stored at upload time.
    pub fn cached_uri(&self, input: &Path) -> Result<Option<String>> {
        let cache = self.load()?;
        let key = input.to_string_lossy().to_string();

        let Some(entry) = cache.files.get(&key) else {
            return Ok(None);
        };

        let current_hash = hash_file(input)?;
        if entry.file_hash == current_hash {
            debug!(input = %input.display(), "Upload cache hit");
            Ok(Some(entry.file_uri.clone()))
        } else {
            // Content changed since upload; force re-upload
            debug!(input = %input.display(), "Upload cache stale (hash mismatch)");
            Ok(None)
        }
    }

    /// Record the remote URI obtained for `input`, overwriting any prior
    /// entry for that path.
    pub fn record_uri(&self, input: &Path, uri: &str) -> Result<()> {
        let mut cache = self.load()?;
        let key = input.to_string_lossy().to_string();

        cache.files.insert(
            key,
            CacheEntry {
                file_uri: uri.to_string(),
                file_hash: hash_file(input)?,
                uploaded_at: Utc::now(),
            },
        );
        self.store(&mut cache)
    }

    /// Number of cached uploads.
    pub fn len(&self) -> Result<usize> {
        Ok(self.load()?.files.len())
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.load()?.files.is_empty())
    }

    fn load(&self) -> Result<CacheFile> {
        if !self.path.exists() {
            return Ok(CacheFile::default());
        }
        let content = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn store(&self, cache: &mut CacheFile) -> Result<()> {
        cache.last_updated = Some(Utc::now());
        let content = serde_json::to_string_pretty(cache)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

/// SHA-256 hex digest of a file, read in fixed-size blocks so files of
/// any size hash in constant memory.
pub fn hash_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut block = [0u8; HASH_BLOCK_SIZE];

    loop {
        let read = file.read(&mut block)?;
        if read == 0 {
            break;
        }
        hasher.update(&block[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}
