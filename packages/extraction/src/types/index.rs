//! Extraction index: the persisted status ledger for batch runs.
//!
//! The index is keyed by input filename and records the terminal outcome
//! of every attempted item. It is what makes re-runs idempotent: a
//! `success` entry means "already done", a `failed` entry is retried on
//! the next normal run (or selected exclusively in retry-failed mode).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Schema version written into every index file.
pub const INDEX_VERSION: &str = "1.0";

/// Outcome of one attempted input, tagged by `status` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IndexEntry {
    /// Extraction succeeded and the output artifact was written.
    Success {
        /// Number of extracted nodes
        nodes: usize,
        /// Self-reported extraction confidence
        confidence: f64,
        processed_at: DateTime<Utc>,
        /// Path of the written output artifact
        output_file: String,
    },

    /// Extraction raised; the error message is kept for diagnosis.
    Failed {
        error: String,
        failed_at: DateTime<Utc>,
    },
}

impl IndexEntry {
    /// Whether this entry records a successful extraction.
    pub fn is_success(&self) -> bool {
        matches!(self, IndexEntry::Success { .. })
    }
}

/// Running counters kept alongside the entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    /// Count of discovered input files at the last scan
    pub total: usize,
    /// Count of entries with success status
    pub processed: usize,
    /// Count of entries with failed status
    pub failed: usize,
}

/// The persisted ledger of extraction outcomes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionIndex {
    pub version: String,
    pub created: DateTime<Utc>,

    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,

    /// Filename → outcome. BTreeMap keeps the file diff-stable.
    #[serde(default)]
    pub entries: BTreeMap<String, IndexEntry>,

    #[serde(default)]
    pub statistics: Statistics,
}

impl Default for ExtractionIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractionIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self {
            version: INDEX_VERSION.to_string(),
            created: Utc::now(),
            last_updated: None,
            entries: BTreeMap::new(),
            statistics: Statistics::default(),
        }
    }

    /// Record the number of inputs discovered at scan time.
    ///
    /// `total` never drops below the number of indexed entries, so
    /// `processed + failed <= total` holds even when previously indexed
    /// files have disappeared from the input directory.
    pub fn rescan(&mut self, discovered: usize) {
        self.statistics.total = discovered.max(self.entries.len());
    }

    /// Overwrite the entry for `filename` with a fresh success record.
    pub fn record_success(
        &mut self,
        filename: &str,
        nodes: usize,
        confidence: f64,
        output_file: &str,
    ) {
        self.entries.insert(
            filename.to_string(),
            IndexEntry::Success {
                nodes,
                confidence,
                processed_at: Utc::now(),
                output_file: output_file.to_string(),
            },
        );
        self.refresh_statistics();
    }

    /// Overwrite the entry for `filename` with a fresh failure record.
    pub fn record_failure(&mut self, filename: &str, error: &str) {
        self.entries.insert(
            filename.to_string(),
            IndexEntry::Failed {
                error: error.to_string(),
                failed_at: Utc::now(),
            },
        );
        self.refresh_statistics();
    }

    /// Whether `filename` is already done (entry with success status).
    pub fn is_done(&self, filename: &str) -> bool {
        self.entries.get(filename).is_some_and(IndexEntry::is_success)
    }

    /// Look up the entry for a filename.
    pub fn entry(&self, filename: &str) -> Option<&IndexEntry> {
        self.entries.get(filename)
    }

    /// Filenames whose last attempt failed.
    pub fn failed_files(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, e)| !e.is_success())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Recompute processed/failed from the entries; entries overwrite
    /// each other per filename, so recounting keeps the counters exact.
    fn refresh_statistics(&mut self) {
        let processed = self.entries.values().filter(|e| e.is_success()).count();
        self.statistics.processed = processed;
        self.statistics.failed = self.entries.len() - processed;
        if self.statistics.total < self.entries.len() {
            self.statistics.total = self.entries.len();
        }
    }
}
