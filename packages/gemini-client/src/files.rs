//! Files API: upload local files and download result files.
//!
//! Uploaded files are referenced by URI in generateContent requests and
//! by name when used as batch job inputs. Handles are reusable until the
//! underlying content changes (the caller is responsible for cache
//! invalidation, see the extraction crate's upload cache).

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{GeminiError, Result};
use crate::GeminiClient;

/// Handle to a file stored by the Files API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileHandle {
    /// Resource name, e.g. `files/abc123`
    pub name: String,

    /// URI usable in generation requests
    pub uri: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: FileHandle,
}

/// Guess the MIME type for a path from its extension.
///
/// Unknown extensions fall back to `image/jpeg`, matching the upload
/// behavior for guideline page scans.
pub fn mime_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("jsonl") => "application/jsonl",
        Some("json") => "application/json",
        _ => "image/jpeg",
    }
}

impl GeminiClient {
    /// Upload a local file, returning its handle.
    pub async fn upload_file(&self, path: &Path) -> Result<FileHandle> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| GeminiError::Io(format!("{}: {}", path.display(), e)))?;
        let mime_type = mime_type_for(path);
        let display_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();

        self.upload_bytes(bytes, mime_type, &display_name).await
    }

    /// Upload raw bytes with an explicit MIME type.
    pub async fn upload_bytes(
        &self,
        bytes: Vec<u8>,
        mime_type: &str,
        display_name: &str,
    ) -> Result<FileHandle> {
        debug!(display_name, mime_type, size = bytes.len(), "Uploading file");

        let response = self
            .http_client()
            .post(format!("{}/upload/v1beta/files", self.base_url()))
            .header("x-goog-api-key", self.api_key())
            .header("X-Goog-Upload-Protocol", "raw")
            .header("X-Goog-File-Name", display_name)
            .header("Content-Type", mime_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "File upload request failed");
                GeminiError::Network(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(status = %status, error = %error_text, "File upload rejected");
            return Err(GeminiError::Api(format!(
                "file upload failed: {}",
                error_text
            )));
        }

        let upload: UploadResponse = response
            .json()
            .await
            .map_err(|e| GeminiError::Parse(e.to_string()))?;

        debug!(name = %upload.file.name, uri = %upload.file.uri, "File uploaded");
        Ok(upload.file)
    }

    /// Download a stored file's content as text (e.g. batch result JSONL).
    pub async fn download_file(&self, name: &str) -> Result<String> {
        let response = self
            .http_client()
            .get(format!("{}/v1beta/{}:download?alt=media", self.base_url(), name))
            .header("x-goog-api-key", self.api_key())
            .send()
            .await
            .map_err(|e| GeminiError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(GeminiError::Api(format!(
                "file download failed: {}",
                error_text
            )));
        }

        response
            .text()
            .await
            .map_err(|e| GeminiError::Network(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_mime_type_for() {
        assert_eq!(mime_type_for(&PathBuf::from("page.JPG")), "image/jpeg");
        assert_eq!(mime_type_for(&PathBuf::from("page.png")), "image/png");
        assert_eq!(
            mime_type_for(&PathBuf::from("batch_1.jsonl")),
            "application/jsonl"
        );
        assert_eq!(mime_type_for(&PathBuf::from("no_extension")), "image/jpeg");
    }
}
