//! Persistence for the extraction index.
//!
//! All mutation of the ledger goes through [`ExtractionIndex`] methods;
//! this store only loads and saves the file, keeping the single-writer
//! invariant auditable. Store I/O errors are fatal for a run — a ledger
//! that cannot be read or written must not be silently ignored.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::debug;

use crate::error::Result;
use crate::types::index::ExtractionIndex;

/// File-backed store for the extraction index.
#[derive(Debug, Clone)]
pub struct IndexStore {
    path: PathBuf,
}

impl IndexStore {
    /// Create a store handle for the given index file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the index file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted index, or synthesize an empty one if the file
    /// does not exist yet.
    pub fn load(&self) -> Result<ExtractionIndex> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "No index file, starting empty");
            return Ok(ExtractionIndex::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Stamp `last_updated` and overwrite the index file.
    ///
    /// Write-then-fsync: sufficient for crash-safe resume between items,
    /// no stronger atomicity is needed for the single-writer ledger.
    pub fn save(&self, index: &mut ExtractionIndex) -> Result<()> {
        index.last_updated = Some(Utc::now());

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let content = serde_json::to_string_pretty(index)?;
        let mut file = File::create(&self.path)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        Ok(())
    }
}
