//! Batch pipelines: image extraction and trial tabulation.

pub mod batch;
pub mod trials;

pub use batch::{extract_single, run_batch, BatchConfig, BatchMode, BatchReport};
pub use trials::{run_trial_batch, TrialBatchConfig, TrialTableReport};
