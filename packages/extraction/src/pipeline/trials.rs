//! Trial tabulation through the asynchronous batch API.
//!
//! A run turns a directory of ClinicalTrials.gov JSON records into CSV
//! rows: prune each record, pack the annotation requests into JSONL jobs
//! of bounded size, submit, poll until terminal (or timeout, or operator
//! cancellation), then demultiplex the per-line results back to trials by
//! request key. Jobs can take hours; a cancelled poll can be resumed
//! later against the same job name.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use gemini_client::{
    decode_result_jsonl, encode_jsonl, strip_code_fences, BatchJob, BatchRequestLine,
    BatchResultLine, GeminiClient, GenerateContentRequest, JobState, Part,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{ExtractionError, Result};
use crate::prompts::TRIAL_ANNOTATION_PROMPT;
use crate::types::trial::{PrunedTrial, TrialAnnotation, TrialRow};

/// Keep each job comfortably under the per-batch token ceiling.
pub const DEFAULT_BATCH_SIZE: usize = 200;

/// Identity carried alongside each request key for result demux.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialMeta {
    pub nct_id: String,
    pub official_title: String,
}

/// Configuration for a trial tabulation run.
#[derive(Debug, Clone)]
pub struct TrialBatchConfig {
    /// Model identifier for the batch jobs
    pub model: String,

    /// Requests per job
    pub batch_size: usize,

    /// Interval between job status polls
    pub poll_interval: Duration,

    /// Total wait budget per job; on expiry the job is returned in its
    /// last observed state, not treated as failed
    pub max_wait: Duration,
}

impl TrialBatchConfig {
    /// Defaults: 200 requests per job, 30 s polls, 24 h wait budget.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            batch_size: DEFAULT_BATCH_SIZE,
            poll_interval: Duration::from_secs(30),
            max_wait: Duration::from_secs(24 * 60 * 60),
        }
    }

    /// Set requests per job.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Set the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the total wait budget per job.
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }
}

/// Summary of a tabulation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrialTableReport {
    /// Requests submitted across all jobs
    pub submitted: usize,

    /// Rows written to the CSV
    pub succeeded: usize,

    /// Results that errored or failed to decode
    pub failed: usize,

    /// Jobs that did not reach the succeeded state
    pub incomplete_jobs: usize,
}

/// Build per-job request chunks and the key → trial identity map from a
/// set of trial record files.
///
/// Unreadable or invalid records are logged and skipped; they do not
/// abort the build.
pub fn build_requests(
    trial_files: &[PathBuf],
    batch_size: usize,
) -> (Vec<Vec<BatchRequestLine>>, HashMap<String, TrialMeta>) {
    let mut metadata = HashMap::new();
    let mut lines = Vec::new();

    for path in trial_files {
        let pruned = match load_and_prune(path) {
            Ok(pruned) => pruned,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Skipping unloadable trial record");
                continue;
            }
        };

        let key = format!("request-{}", pruned.nct_id());
        metadata.insert(
            key.clone(),
            TrialMeta {
                nct_id: pruned.nct_id().to_string(),
                official_title: pruned.official_title().to_string(),
            },
        );

        // The prompt contract appends the pruned record after the template
        let payload = match serde_json::to_string_pretty(&pruned) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Skipping unserializable trial record");
                continue;
            }
        };
        let prompt = format!("{}\n{}", TRIAL_ANNOTATION_PROMPT, payload);

        lines.push(BatchRequestLine {
            key,
            request: GenerateContentRequest::new(vec![Part::text(prompt)]),
        });
    }

    let chunks = lines
        .chunks(batch_size.max(1))
        .map(|chunk| chunk.to_vec())
        .collect();

    (chunks, metadata)
}

fn load_and_prune(path: &Path) -> Result<PrunedTrial> {
    let content = std::fs::read_to_string(path)?;
    let record: serde_json::Value = serde_json::from_str(&content)?;
    PrunedTrial::from_record(&record)
}

/// Poll a job by name until it reaches a terminal state.
///
/// Returns the job in its last observed state when the wait budget is
/// exhausted or `cancel` fires; the caller may resume later by polling
/// the same name again.
pub async fn poll_batch(
    client: &GeminiClient,
    job_name: &str,
    poll_interval: Duration,
    max_wait: Duration,
    cancel: &CancellationToken,
) -> Result<BatchJob> {
    let start = std::time::Instant::now();
    let mut job = client.get_batch(job_name).await?;

    loop {
        if job.state.is_terminal() {
            return Ok(job);
        }

        if let Some(stats) = &job.batch_stats {
            info!(
                job = job_name,
                state = ?job.state,
                done = stats.succeeded_request_count + stats.failed_request_count,
                total = stats.total_request_count,
                "Batch job progress"
            );
        } else {
            info!(job = job_name, state = ?job.state, "Batch job progress");
        }

        if start.elapsed() >= max_wait {
            warn!(job = job_name, state = ?job.state, "Poll budget exhausted, returning last observed state");
            return Ok(job);
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                info!(job = job_name, "Polling cancelled; re-poll the same job name to resume");
                return Ok(job);
            }
            _ = tokio::time::sleep(poll_interval) => {}
        }

        job = client.get_batch(job_name).await?;
    }
}

/// Decode one result line into a table row using the key → identity map.
pub fn decode_row(
    line: &BatchResultLine,
    metadata: &HashMap<String, TrialMeta>,
) -> Result<TrialRow> {
    let meta = metadata
        .get(&line.key)
        .ok_or_else(|| ExtractionError::MalformedResponse(format!("unknown key: {}", line.key)))?;

    if let Some(error) = &line.error {
        return Err(ExtractionError::MalformedResponse(format!(
            "{}: API error: {}",
            meta.nct_id, error
        )));
    }

    let text = line
        .response
        .as_ref()
        .and_then(|r| r.text())
        .ok_or_else(|| {
            ExtractionError::MalformedResponse(format!("{}: no text in response", meta.nct_id))
        })?;

    let annotation: TrialAnnotation = serde_json::from_str(strip_code_fences(&text))
        .map_err(|e| ExtractionError::MalformedResponse(format!("{}: {}", meta.nct_id, e)))?;

    Ok(TrialRow {
        nct_id: meta.nct_id.clone(),
        official_title: meta.official_title.clone(),
        annotation,
    })
}

const CSV_HEADER: [&str; 7] = [
    "NCT_ID",
    "Official Title",
    "Experimental Drugs",
    "Biomarkers",
    "Primary Outcomes",
    "Efficacy Status",
    "Reasoning",
];

/// Append rows to the output CSV, writing the header when the file is new.
pub fn append_rows(output_csv: &Path, rows: &[TrialRow]) -> Result<()> {
    let is_new = !output_csv.exists();

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(output_csv)?;
    let mut writer = csv::WriterBuilder::new().from_writer(file);

    if is_new {
        writer.write_record(CSV_HEADER)?;
    }

    for row in rows {
        writer.write_record([
            row.nct_id.as_str(),
            row.official_title.as_str(),
            &row.annotation.experimental_drugs.join("; "),
            &row.annotation.biomarkers.join("; "),
            row.annotation.primary_outcomes_summary.as_str(),
            row.annotation.efficacy_status.as_str(),
            row.annotation.reasoning.as_str(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

/// Run the full tabulation: build, submit, poll, demux, append.
pub async fn run_trial_batch(
    client: &GeminiClient,
    config: &TrialBatchConfig,
    trial_dir: &Path,
    output_csv: &Path,
    cancel: &CancellationToken,
) -> Result<TrialTableReport> {
    let mut trial_files: Vec<PathBuf> = std::fs::read_dir(trial_dir)?
        .collect::<std::io::Result<Vec<_>>>()?
        .into_iter()
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("json")
        })
        .collect();
    trial_files.sort();

    info!(count = trial_files.len(), dir = %trial_dir.display(), "Found trial records");

    let (chunks, metadata) = build_requests(&trial_files, config.batch_size);
    let mut report = TrialTableReport::default();

    for (chunk_index, chunk) in chunks.iter().enumerate() {
        // A remote job outlives this process; once the operator cancels,
        // nothing new may be submitted
        if cancel.is_cancelled() {
            warn!(
                remaining_jobs = chunks.len() - chunk_index,
                "Cancelled; skipping remaining batch job submissions"
            );
            break;
        }

        let display_name = format!("trial-extraction-batch-{}", chunk_index + 1);
        info!(
            job = %display_name,
            requests = chunk.len(),
            "Submitting batch job"
        );

        let jsonl = encode_jsonl(chunk).map_err(ExtractionError::Upstream)?;
        let input_file = client
            .upload_bytes(
                jsonl.into_bytes(),
                "application/jsonl",
                &format!("{}.jsonl", display_name),
            )
            .await?;

        let job = client
            .create_batch(&config.model, &input_file.name, &display_name)
            .await?;
        report.submitted += chunk.len();

        let job = poll_batch(
            client,
            &job.name,
            config.poll_interval,
            config.max_wait,
            cancel,
        )
        .await?;

        if job.state != JobState::Succeeded {
            warn!(job = %job.name, state = ?job.state, "Job did not succeed; skipping result retrieval");
            report.incomplete_jobs += 1;
            if cancel.is_cancelled() {
                break;
            }
            continue;
        }

        let Some(dest) = &job.dest else {
            warn!(job = %job.name, "Succeeded job has no result file");
            report.incomplete_jobs += 1;
            continue;
        };

        let results_text = client.download_file(&dest.file_name).await?;
        let lines = decode_result_jsonl(&results_text).map_err(ExtractionError::Upstream)?;

        let mut rows = Vec::new();
        for line in &lines {
            match decode_row(line, &metadata) {
                Ok(row) => rows.push(row),
                Err(e) => {
                    warn!(key = %line.key, error = %e, "Dropping undecodable result");
                    report.failed += 1;
                }
            }
        }

        append_rows(output_csv, &rows)?;
        report.succeeded += rows.len();
        info!(job = %job.name, rows = rows.len(), "Batch job results appended");
    }

    info!(
        submitted = report.submitted,
        succeeded = report.succeeded,
        failed = report.failed,
        incomplete_jobs = report.incomplete_jobs,
        output = %output_csv.display(),
        "Trial tabulation complete"
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::trial::EfficacyStatus;
    use gemini_client::GenerateContentResponse;
    use serde_json::json;
    use tempfile::TempDir;

    fn write_trial(dir: &TempDir, nct_id: &str) -> PathBuf {
        let record = json!({
            "protocolSection": {
                "identificationModule": {
                    "nctId": nct_id,
                    "officialTitle": format!("Study {}", nct_id)
                },
                "eligibilityModule": {"eligibilityCriteria": "EGFR+"}
            }
        });
        let path = dir.path().join(format!("{}.json", nct_id));
        std::fs::write(&path, record.to_string()).unwrap();
        path
    }

    fn annotated_response(text: &str) -> GenerateContentResponse {
        serde_json::from_value(json!({
            "candidates": [{"content": {"parts": [{"text": text}]}}]
        }))
        .unwrap()
    }

    #[test]
    fn test_build_requests_chunks_and_metadata() {
        let dir = TempDir::new().unwrap();
        let files: Vec<PathBuf> = (0..5)
            .map(|i| write_trial(&dir, &format!("NCT000{}", i)))
            .collect();

        let (chunks, metadata) = build_requests(&files, 2);
        assert_eq!(chunks.len(), 3); // 2 + 2 + 1
        assert_eq!(metadata.len(), 5);

        let meta = &metadata["request-NCT0001"];
        assert_eq!(meta.nct_id, "NCT0001");
        assert_eq!(meta.official_title, "Study NCT0001");

        // Prompt carries the template and the pruned record
        let first = &chunks[0][0];
        let prompt = first.request.contents[0].parts[0].text.as_deref().unwrap();
        assert!(prompt.contains("expert oncologist"));
        assert!(prompt.contains("NCT0000"));
    }

    #[test]
    fn test_build_requests_skips_bad_files() {
        let dir = TempDir::new().unwrap();
        let good = write_trial(&dir, "NCT0001");
        let bad = dir.path().join("broken.json");
        std::fs::write(&bad, "{nope").unwrap();

        let (chunks, metadata) = build_requests(&[bad, good], 10);
        assert_eq!(metadata.len(), 1);
        assert_eq!(chunks.iter().map(Vec::len).sum::<usize>(), 1);
    }

    #[test]
    fn test_decode_row_happy_path_with_fences() {
        let mut metadata = HashMap::new();
        metadata.insert(
            "request-NCT0001".to_string(),
            TrialMeta {
                nct_id: "NCT0001".to_string(),
                official_title: "Study".to_string(),
            },
        );

        let line = BatchResultLine {
            key: "request-NCT0001".to_string(),
            response: Some(annotated_response(
                "```json\n{\"experimental_drugs\": [\"Osimertinib\"], \"biomarkers\": [\"EGFR\"], \"primary_outcomes_summary\": \"PFS met\", \"efficacy_status\": \"POSITIVE\", \"reasoning\": \"p<0.001\"}\n```",
            )),
            error: None,
        };

        let row = decode_row(&line, &metadata).unwrap();
        assert_eq!(row.nct_id, "NCT0001");
        assert_eq!(row.annotation.efficacy_status, EfficacyStatus::Positive);
        assert_eq!(row.annotation.experimental_drugs, vec!["Osimertinib"]);
    }

    #[test]
    fn test_decode_row_error_paths() {
        let mut metadata = HashMap::new();
        metadata.insert(
            "request-NCT0001".to_string(),
            TrialMeta {
                nct_id: "NCT0001".to_string(),
                official_title: "Study".to_string(),
            },
        );

        // API-level error for the request
        let line = BatchResultLine {
            key: "request-NCT0001".to_string(),
            response: None,
            error: Some(json!({"code": 429})),
        };
        assert!(decode_row(&line, &metadata).is_err());

        // Unknown key
        let line = BatchResultLine {
            key: "request-NCT9999".to_string(),
            response: Some(annotated_response("{}")),
            error: None,
        };
        assert!(decode_row(&line, &metadata).is_err());

        // Text not matching the annotation schema
        let line = BatchResultLine {
            key: "request-NCT0001".to_string(),
            response: Some(annotated_response("{\"unexpected\": true}")),
            error: None,
        };
        assert!(matches!(
            decode_row(&line, &metadata),
            Err(ExtractionError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_cancelled_run_submits_no_jobs() {
        let dir = TempDir::new().unwrap();
        write_trial(&dir, "NCT0001");
        write_trial(&dir, "NCT0002");

        // Unroutable endpoint: any submission attempt would error the run
        let client = GeminiClient::new("test-key").with_base_url("http://127.0.0.1:1");
        let config = TrialBatchConfig::new("gemini-2.5-pro").with_batch_size(1);
        let output_csv = dir.path().join("trial_extractions.csv");

        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = run_trial_batch(&client, &config, dir.path(), &output_csv, &cancel)
            .await
            .unwrap();
        assert_eq!(report.submitted, 0);
        assert_eq!(report.succeeded, 0);
        assert!(!output_csv.exists());
    }

    #[test]
    fn test_append_rows_writes_header_once() {
        let dir = TempDir::new().unwrap();
        let csv_path = dir.path().join("trial_extractions.csv");

        let row = TrialRow {
            nct_id: "NCT0001".to_string(),
            official_title: "Study".to_string(),
            annotation: TrialAnnotation {
                experimental_drugs: vec!["Osimertinib".to_string(), "Gefitinib".to_string()],
                biomarkers: vec!["EGFR".to_string()],
                primary_outcomes_summary: "PFS met".to_string(),
                efficacy_status: EfficacyStatus::Positive,
                reasoning: "p<0.001".to_string(),
            },
        };

        append_rows(&csv_path, std::slice::from_ref(&row)).unwrap();
        append_rows(&csv_path, std::slice::from_ref(&row)).unwrap();

        let content = std::fs::read_to_string(&csv_path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3); // header + two rows
        assert!(lines[0].starts_with("NCT_ID,"));
        assert!(lines[1].contains("Osimertinib; Gefitinib"));
        assert!(lines[1].contains("POSITIVE"));
    }
}
