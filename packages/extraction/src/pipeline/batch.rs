//! Idempotent batch orchestration over a directory of guideline images.
//!
//! Items move `Pending → {Success, Failed}`; there is no retry state.
//! Retries happen only through an explicit re-run with a different mode.
//! One failing item never aborts the batch: its error is recorded in the
//! index and the run continues. Index I/O errors do abort — a ledger that
//! cannot be persisted makes the run unresumable.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::Result;
use crate::index::IndexStore;
use crate::traits::DagExtractor;
use crate::types::dag::DagOutput;
use crate::types::index::IndexEntry;

/// Selection policy for a batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchMode {
    /// Skip inputs whose index entry is Success; attempt all others.
    #[default]
    Normal,

    /// Attempt every input regardless of prior status. The upload cache
    /// is still consulted independently.
    Force,

    /// Attempt only inputs whose index entry is Failed; inputs with no
    /// entry or a Success entry are skipped.
    RetryFailedOnly,
}

impl BatchMode {
    /// Whether an input with the given index entry should be attempted.
    pub fn should_attempt(&self, entry: Option<&IndexEntry>) -> bool {
        match self {
            BatchMode::Normal => !entry.is_some_and(IndexEntry::is_success),
            BatchMode::Force => true,
            BatchMode::RetryFailedOnly => entry.is_some_and(|e| !e.is_success()),
        }
    }
}

/// Configuration for a batch run.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Directory of input images
    pub input_dir: PathBuf,

    /// Directory output artifacts are written to (created if absent)
    pub output_dir: PathBuf,

    /// Path of the extraction index file
    pub index_path: PathBuf,

    pub mode: BatchMode,
}

impl BatchConfig {
    /// Create a config with Normal mode; the index lives alongside the
    /// output directory.
    pub fn new(input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        let output_dir = output_dir.into();
        let index_path = output_dir.join("extraction_index.json");
        Self {
            input_dir: input_dir.into(),
            output_dir,
            index_path,
            mode: BatchMode::Normal,
        }
    }

    /// Set the run mode.
    pub fn with_mode(mut self, mode: BatchMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set an explicit index file path.
    pub fn with_index_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.index_path = path.into();
        self
    }
}

/// Summary of a batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Items attempted and recorded as Success in this run
    pub newly_processed: usize,

    /// Items skipped by the mode's selection policy
    pub skipped: usize,

    /// Items attempted and recorded as Failed in this run
    pub failed: usize,

    /// Input files discovered
    pub total: usize,
}

/// Extract every selected input in `config.input_dir`.
pub async fn run_batch<E: DagExtractor>(config: &BatchConfig, extractor: &E) -> Result<BatchReport> {
    std::fs::create_dir_all(&config.output_dir)?;

    let inputs = discover_inputs(&config.input_dir)?;
    let store = IndexStore::new(&config.index_path);
    let mut index = store.load()?;
    index.rescan(inputs.len());

    let mut report = BatchReport {
        total: inputs.len(),
        ..Default::default()
    };

    info!(
        total = inputs.len(),
        mode = ?config.mode,
        already_processed = index.statistics.processed,
        previously_failed = index.statistics.failed,
        output_dir = %config.output_dir.display(),
        "Starting batch extraction"
    );

    for (position, input) in inputs.iter().enumerate() {
        let filename = input
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();

        if !config.mode.should_attempt(index.entry(&filename)) {
            report.skipped += 1;
            info!(
                item = format!("{}/{}", position + 1, inputs.len()),
                file = %filename,
                "Skipping (selection policy)"
            );
            continue;
        }

        info!(
            item = format!("{}/{}", position + 1, inputs.len()),
            file = %filename,
            "Extracting"
        );

        match process_one(input, &config.output_dir, extractor).await {
            Ok((output_path, dag)) => {
                if dag.is_low_confidence() {
                    warn!(
                        file = %filename,
                        confidence = dag.extraction_confidence,
                        "Low extraction confidence, consider manual review"
                    );
                }
                index.record_success(
                    &filename,
                    dag.node_count(),
                    dag.extraction_confidence,
                    &output_path.to_string_lossy(),
                );
                report.newly_processed += 1;
            }
            Err(e) => {
                warn!(file = %filename, error = %e, "Extraction failed");
                index.record_failure(&filename, &e.to_string());
                report.failed += 1;
            }
        }

        // Persist after every item: a crash loses at most the in-flight item
        store.save(&mut index)?;
    }

    store.save(&mut index)?;

    info!(
        newly_processed = report.newly_processed,
        skipped = report.skipped,
        failed = report.failed,
        total = report.total,
        index = %config.index_path.display(),
        "Batch extraction complete"
    );

    Ok(report)
}

/// Extract a single image and write its artifact next to the input (or
/// into `output_dir` when given). Used by the one-shot CLI verb; does
/// not touch the index.
pub async fn extract_single<E: DagExtractor>(
    image: &Path,
    output_dir: Option<&Path>,
    extractor: &E,
) -> Result<(PathBuf, DagOutput)> {
    if !image.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("image not found: {}", image.display()),
        )
        .into());
    }

    let target_dir = match output_dir {
        Some(dir) => dir.to_path_buf(),
        None => image.parent().unwrap_or_else(|| Path::new(".")).to_path_buf(),
    };

    process_one(image, &target_dir, extractor).await
}

async fn process_one<E: DagExtractor>(
    input: &Path,
    output_dir: &Path,
    extractor: &E,
) -> Result<(PathBuf, DagOutput)> {
    let dag = extractor.extract(input).await?;
    let output_path = output_path_for(input, output_dir);
    std::fs::write(&output_path, serde_json::to_string_pretty(&dag)?)?;
    info!(output = %output_path.display(), nodes = dag.node_count(), "Saved DAG output");
    Ok((output_path, dag))
}

/// Output artifact path: input stem with the `.dag.json` suffix.
fn output_path_for(input: &Path, output_dir: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    output_dir.join(format!("{}.dag.json", stem))
}

/// Sorted image files in `dir`.
fn discover_inputs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut inputs: Vec<PathBuf> = std::fs::read_dir(dir)?
        .collect::<std::io::Result<Vec<_>>>()?
        .into_iter()
        .map(|entry| entry.path())
        .filter(|path| is_image_file(path))
        .collect();
    inputs.sort();
    Ok(inputs)
}

fn is_image_file(path: &Path) -> bool {
    path.is_file()
        && matches!(
            path.extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_ascii_lowercase())
                .as_deref(),
            Some("jpg") | Some("jpeg") | Some("png")
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_dag, MockExtractor};
    use crate::types::index::ExtractionIndex;
    use tempfile::TempDir;

    fn setup(images: &[&str]) -> (TempDir, BatchConfig) {
        let dir = TempDir::new().unwrap();
        let input_dir = dir.path().join("images");
        std::fs::create_dir_all(&input_dir).unwrap();
        for name in images {
            std::fs::write(input_dir.join(name), b"fake image bytes").unwrap();
        }
        let config = BatchConfig::new(&input_dir, dir.path().join("json"));
        (dir, config)
    }

    fn load_index(config: &BatchConfig) -> ExtractionIndex {
        IndexStore::new(&config.index_path).load().unwrap()
    }

    #[tokio::test]
    async fn test_normal_run_processes_all_then_skips_all() {
        let (_dir, config) = setup(&["p1.jpg", "p2.jpg"]);
        let mock = MockExtractor::new();

        let first = run_batch(&config, &mock).await.unwrap();
        assert_eq!(first.newly_processed, 2);
        assert_eq!(first.skipped, 0);
        assert_eq!(first.failed, 0);

        // Idempotence: second run with no input changes does no work
        let second = run_batch(&config, &mock).await.unwrap();
        assert_eq!(second.newly_processed, 0);
        assert_eq!(second.skipped, 2);
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_partial_failure_isolation() {
        let (_dir, config) = setup(&["a.jpg", "b.jpg", "c.jpg"]);
        let mock = MockExtractor::new().with_malformed("b.jpg", "truncated JSON");

        let report = run_batch(&config, &mock).await.unwrap();
        assert_eq!(report.newly_processed, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.total, 3);

        let index = load_index(&config);
        assert!(index.is_done("a.jpg"));
        assert!(index.is_done("c.jpg"));
        assert!(!index.is_done("b.jpg"));
        assert_eq!(index.failed_files(), vec!["b.jpg"]);
    }

    #[tokio::test]
    async fn test_retry_failed_only_scope() {
        let (_dir, config) = setup(&["a.jpg", "b.jpg", "c.jpg"]);

        // Seed: a.jpg succeeds, b.jpg fails, c.jpg has no entry
        let store = IndexStore::new(&config.index_path);
        let mut index = store.load().unwrap();
        index.record_success("a.jpg", 3, 0.9, "a.dag.json");
        index.record_failure("b.jpg", "quota");
        store.save(&mut index).unwrap();

        let mock = MockExtractor::new();
        let config = config.with_mode(BatchMode::RetryFailedOnly);
        let report = run_batch(&config, &mock).await.unwrap();

        // Exactly {b.jpg} attempted
        assert_eq!(mock.calls(), vec!["b.jpg"]);
        assert_eq!(report.newly_processed, 1);
        assert_eq!(report.skipped, 2);
    }

    #[tokio::test]
    async fn test_force_attempts_everything() {
        let (_dir, config) = setup(&["a.jpg", "b.jpg", "c.jpg"]);

        let store = IndexStore::new(&config.index_path);
        let mut index = store.load().unwrap();
        index.record_success("a.jpg", 3, 0.9, "a.dag.json");
        index.record_failure("b.jpg", "quota");
        store.save(&mut index).unwrap();

        let mock = MockExtractor::new();
        let config = config.with_mode(BatchMode::Force);
        let report = run_batch(&config, &mock).await.unwrap();

        assert_eq!(mock.calls(), vec!["a.jpg", "b.jpg", "c.jpg"]);
        assert_eq!(report.newly_processed, 3);
        assert_eq!(report.skipped, 0);
    }

    #[tokio::test]
    async fn test_end_to_end_index_state_and_summary() {
        let (_dir, config) = setup(&["p1.jpg", "p2.jpg"]);
        let mock = MockExtractor::new()
            .with_output("p1.jpg", sample_dag(7, 0.92))
            .with_malformed("p2.jpg", "response not schema-conformant");

        let report = run_batch(&config, &mock).await.unwrap();
        assert_eq!(report.newly_processed, 1);
        assert_eq!(report.skipped, 0);
        assert_eq!(report.failed, 1);

        let index = load_index(&config);
        match index.entry("p1.jpg").unwrap() {
            IndexEntry::Success { nodes, confidence, .. } => {
                assert_eq!(*nodes, 7);
                assert!((confidence - 0.92).abs() < f64::EPSILON);
            }
            other => panic!("expected success entry, got {:?}", other),
        }
        match index.entry("p2.jpg").unwrap() {
            IndexEntry::Failed { error, .. } => {
                assert!(error.contains("not schema-conformant"));
            }
            other => panic!("expected failed entry, got {:?}", other),
        }

        // Output artifact exists for the success only
        assert!(config.output_dir.join("p1.dag.json").exists());
        assert!(!config.output_dir.join("p2.dag.json").exists());
    }

    #[tokio::test]
    async fn test_output_artifact_round_trips() {
        let (_dir, config) = setup(&["p1.jpg"]);
        let dag = sample_dag(4, 0.88);
        let mock = MockExtractor::new().with_output("p1.jpg", dag.clone());

        run_batch(&config, &mock).await.unwrap();

        let written = std::fs::read_to_string(config.output_dir.join("p1.dag.json")).unwrap();
        let reloaded: DagOutput = serde_json::from_str(&written).unwrap();
        assert_eq!(reloaded, dag);
    }

    #[tokio::test]
    async fn test_extract_single_writes_next_to_input() {
        let dir = TempDir::new().unwrap();
        let image = dir.path().join("page.jpg");
        std::fs::write(&image, b"bytes").unwrap();

        let mock = MockExtractor::new();
        let (output, dag) = extract_single(&image, None, &mock).await.unwrap();
        assert_eq!(output, dir.path().join("page.dag.json"));
        assert!(output.exists());
        assert_eq!(dag.node_count(), 3);
    }

    #[tokio::test]
    async fn test_extract_single_missing_input() {
        let mock = MockExtractor::new();
        let err = extract_single(Path::new("/nonexistent/p.jpg"), None, &mock)
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::ExtractionError::Io(_)));
    }

    #[test]
    fn test_mode_selection_table() {
        let success = IndexEntry::Success {
            nodes: 1,
            confidence: 0.9,
            processed_at: chrono::Utc::now(),
            output_file: "x".into(),
        };
        let failed = IndexEntry::Failed {
            error: "e".into(),
            failed_at: chrono::Utc::now(),
        };

        assert!(!BatchMode::Normal.should_attempt(Some(&success)));
        assert!(BatchMode::Normal.should_attempt(Some(&failed)));
        assert!(BatchMode::Normal.should_attempt(None));

        assert!(BatchMode::Force.should_attempt(Some(&success)));
        assert!(BatchMode::Force.should_attempt(Some(&failed)));
        assert!(BatchMode::Force.should_attempt(None));

        assert!(!BatchMode::RetryFailedOnly.should_attempt(Some(&success)));
        assert!(BatchMode::RetryFailedOnly.should_attempt(Some(&failed)));
        assert!(!BatchMode::RetryFailedOnly.should_attempt(None));
    }
}
