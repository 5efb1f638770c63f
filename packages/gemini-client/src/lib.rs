//! Pure Gemini REST API client
//!
//! A clean, minimal client for the Gemini API with no domain-specific logic.
//! Supports content generation (including vision inputs via the Files API),
//! JSON-mode structured output, and asynchronous batch jobs.
//!
//! # Example
//!
//! ```rust,ignore
//! use gemini_client::{GeminiClient, GenerateContentRequest, Part};
//!
//! let client = GeminiClient::from_env()?;
//!
//! // Upload an image once, reference it by URI afterwards
//! let handle = client.upload_file(Path::new("page.jpg")).await?;
//!
//! let request = GenerateContentRequest::new(vec![
//!     Part::text("Describe this flowchart"),
//!     Part::file(&handle.uri, "image/jpeg"),
//! ])
//! .with_json_output();
//!
//! let response = client.generate_content("gemini-2.5-pro", &request).await?;
//! println!("{}", response.text().unwrap_or_default());
//! ```

pub mod batch;
pub mod error;
pub mod files;
pub mod types;

pub use batch::{
    decode_result_jsonl, encode_jsonl, BatchDest, BatchJob, BatchRequestLine, BatchResultLine,
    BatchStats, JobState,
};
pub use error::{GeminiError, Result};
pub use files::{mime_type_for, FileHandle};
pub use types::{
    Candidate, CandidateContent, Content, FileData, GenerateContentRequest,
    GenerateContentResponse, GenerationConfig, Part, SafetySetting,
};

use reqwest::Client;
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Pure Gemini API client.
#[derive(Clone)]
pub struct GeminiClient {
    http_client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    /// Create a new client with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http_client: Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Create from environment variable `GEMINI_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| GeminiError::Config("GEMINI_API_KEY not set".into()))?;
        Ok(Self::new(api_key))
    }

    /// Set a custom base URL (for proxies and test servers).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub(crate) fn http_client(&self) -> &Client {
        &self.http_client
    }

    /// Get the API key.
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Generate content from the given request.
    pub async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse> {
        let start = std::time::Instant::now();

        let response = self
            .http_client
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                self.base_url, model
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Gemini request failed");
                GeminiError::Network(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(status = %status, error = %error_text, "Gemini API error");
            return Err(GeminiError::Api(format!("Gemini API error: {}", error_text)));
        }

        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| GeminiError::Parse(e.to_string()))?;

        debug!(
            model,
            duration_ms = start.elapsed().as_millis(),
            "Gemini generate_content"
        );

        Ok(body)
    }
}

/// Strip a surrounding markdown code fence from model text, if present.
///
/// Batch-mode responses sometimes wrap JSON in ```json fences even when
/// asked for plain output.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();

    if let Some(rest) = trimmed.strip_prefix("```json") {
        if let Some(inner) = rest.split("```").next() {
            return inner.trim();
        }
    }
    if let Some(rest) = trimmed.strip_prefix("```") {
        if let Some(inner) = rest.split("```").next() {
            return inner.trim();
        }
    }

    trimmed
}
