//! Batch API: submit a JSONL file of requests as one asynchronous job.
//!
//! A job progresses through non-terminal states (pending, running) until
//! it succeeds, fails, is cancelled, or expires. Callers poll [`GeminiClient::get_batch`]
//! with the job name; jobs survive process restarts, so a caller may stop
//! polling and resume later with the same name.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{GeminiError, Result};
use crate::types::{GenerateContentRequest, GenerateContentResponse};
use crate::GeminiClient;

/// One request line in a batch input file.
///
/// The `key` is caller-assigned and unique within the job; results carry
/// it back so they can be matched to inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequestLine {
    pub key: String,
    pub request: GenerateContentRequest,
}

/// One result line in a batch output file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResultLine {
    #[serde(default)]
    pub key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<GenerateContentResponse>,

    /// Present instead of `response` when the request itself failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<serde_json::Value>,
}

/// State of a batch job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    #[serde(rename = "JOB_STATE_PENDING")]
    Pending,
    #[serde(rename = "JOB_STATE_RUNNING")]
    Running,
    #[serde(rename = "JOB_STATE_SUCCEEDED")]
    Succeeded,
    #[serde(rename = "JOB_STATE_FAILED")]
    Failed,
    #[serde(rename = "JOB_STATE_CANCELLED")]
    Cancelled,
    #[serde(rename = "JOB_STATE_EXPIRED")]
    Expired,
    #[serde(other)]
    Unspecified,
}

impl JobState {
    /// Whether the job has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::Cancelled | JobState::Expired
        )
    }
}

impl Default for JobState {
    fn default() -> Self {
        JobState::Pending
    }
}

/// Progress counters reported by the service while a job runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStats {
    #[serde(default)]
    pub total_request_count: u64,
    #[serde(default)]
    pub succeeded_request_count: u64,
    #[serde(default)]
    pub failed_request_count: u64,
}

/// Output location of a completed job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchDest {
    pub file_name: String,
}

/// A batch job resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchJob {
    /// Resource name, e.g. `batches/xyz789`
    pub name: String,

    #[serde(default)]
    pub state: JobState,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_stats: Option<BatchStats>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest: Option<BatchDest>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateBatchBody<'a> {
    batch: CreateBatchConfig<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateBatchConfig<'a> {
    display_name: &'a str,
    input_config: InputConfig<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InputConfig<'a> {
    file_name: &'a str,
}

/// Encode request lines as JSONL (one JSON object per line).
pub fn encode_jsonl(lines: &[BatchRequestLine]) -> Result<String> {
    let mut out = String::new();
    for line in lines {
        out.push_str(&serde_json::to_string(line).map_err(|e| GeminiError::Parse(e.to_string()))?);
        out.push('\n');
    }
    Ok(out)
}

/// Decode a JSONL result file, skipping blank lines.
pub fn decode_result_jsonl(text: &str) -> Result<Vec<BatchResultLine>> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str(line)
                .map_err(|e| GeminiError::Parse(format!("bad result line: {}", e)))
        })
        .collect()
}

impl GeminiClient {
    /// Create a batch job over a previously uploaded JSONL input file.
    pub async fn create_batch(
        &self,
        model: &str,
        input_file_name: &str,
        display_name: &str,
    ) -> Result<BatchJob> {
        debug!(model, input_file_name, display_name, "Creating batch job");

        let body = CreateBatchBody {
            batch: CreateBatchConfig {
                display_name,
                input_config: InputConfig {
                    file_name: input_file_name,
                },
            },
        };

        let response = self
            .http_client()
            .post(format!(
                "{}/v1beta/models/{}:batchGenerateContent",
                self.base_url(),
                model
            ))
            .header("x-goog-api-key", self.api_key())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Batch creation request failed");
                GeminiError::Network(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(status = %status, error = %error_text, "Batch creation rejected");
            return Err(GeminiError::Api(format!(
                "batch creation failed: {}",
                error_text
            )));
        }

        let job: BatchJob = response
            .json()
            .await
            .map_err(|e| GeminiError::Parse(e.to_string()))?;

        debug!(name = %job.name, "Batch job created");
        Ok(job)
    }

    /// Fetch the current state of a batch job by resource name.
    pub async fn get_batch(&self, name: &str) -> Result<BatchJob> {
        let response = self
            .http_client()
            .get(format!("{}/v1beta/{}", self.base_url(), name))
            .header("x-goog-api-key", self.api_key())
            .send()
            .await
            .map_err(|e| GeminiError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(GeminiError::Api(format!(
                "batch lookup failed: {}",
                error_text
            )));
        }

        response
            .json()
            .await
            .map_err(|e| GeminiError::Parse(e.to_string()))
    }
}
