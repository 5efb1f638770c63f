//! Extraction toolkit for oncology decision-support data.
//!
//! Turns NCCN guideline page images into structured decision-tree JSON
//! through a vision model, and ClinicalTrials.gov records into an
//! annotated CSV through the batch API. Batch runs are resumable: an
//! upload cache avoids re-uploading unchanged images and a persisted
//! index makes re-runs skip completed work.

pub mod cache;
pub mod clean;
pub mod error;
pub mod gemini;
pub mod index;
pub mod keywords;
pub mod pipeline;
pub mod prompts;
pub mod testing;
pub mod traits;
pub mod types;

pub use cache::UploadCache;
pub use error::{ExtractionError, Result};
pub use gemini::GeminiDagExtractor;
pub use index::IndexStore;
pub use pipeline::{
    extract_single, run_batch, run_trial_batch, BatchConfig, BatchMode, BatchReport,
    TrialBatchConfig, TrialTableReport,
};
pub use traits::DagExtractor;
pub use types::dag::DagOutput;
pub use types::index::ExtractionIndex;
