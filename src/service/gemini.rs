//! Gemini REST implementation of [`ExtractionService`].
//!
//! Endpoints used (all under `{api_base_url}`):
//!
//! | Operation | Method | Path |
//! |-----------|--------|------|
//! | upload (start)   | POST   | `/upload/v1beta/files` (resumable protocol) |
//! | upload (bytes)   | POST   | URL from the `x-goog-upload-url` header |
//! | file state       | GET    | `/v1beta/{name}` |
//! | extract          | POST   | `/v1beta/models/{model}:generateContent` |
//! | delete           | DELETE | `/v1beta/{name}` |
//!
//! The key travels in the `x-goog-api-key` header, never in the URL.

use super::{DocumentPart, ExtractionRequest, ExtractionService, FileHandle, RawResponse, PDF_MIME};
use crate::config::ProcessorConfig;
use crate::error::{ConfigError, ServiceError};
use crate::output::TokenUsage;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Client for the Gemini `generateContent` and Files APIs.
pub struct GeminiService {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    timeout_secs: u64,
    poll_interval: Duration,
    max_polls: u32,
}

// Manual impl so the API key never appears in debug output.
impl std::fmt::Debug for GeminiService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiService")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .field("poll_interval", &self.poll_interval)
            .field("max_polls", &self.max_polls)
            .finish_non_exhaustive()
    }
}

impl GeminiService {
    /// Build a client from the run configuration.
    ///
    /// Fails with [`ConfigError::MissingCredential`] when no key is set.
    pub fn new(config: &ProcessorConfig) -> Result<Self, ConfigError> {
        let api_key = config.require_api_key()?.to_string();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.api_timeout_secs))
            .build()
            .map_err(|e| ConfigError::InvalidConfig(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            base_url: config.api_base_url.clone(),
            model: config.model.clone(),
            timeout_secs: config.api_timeout_secs,
            poll_interval: Duration::from_millis(config.upload_poll_interval_ms),
            max_polls: config.upload_max_polls,
        })
    }

    fn err(&self, e: reqwest::Error) -> ServiceError {
        ServiceError::from_reqwest(e, self.timeout_secs)
    }

    /// Turn a non-success response into a [`ServiceError`].
    async fn check(&self, response: reqwest::Response) -> Result<reqwest::Response, ServiceError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ServiceError::from_status(status.as_u16(), &body))
    }

    async fn get_file(&self, name: &str) -> Result<RemoteFile, ServiceError> {
        let response = self
            .client
            .get(format!("{}/v1beta/{}", self.base_url, name))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(|e| self.err(e))?;
        self.check(response)
            .await?
            .json::<RemoteFile>()
            .await
            .map_err(|e| self.err(e))
    }

    async fn delete_file(&self, name: &str) -> Result<(), ServiceError> {
        let response = self
            .client
            .delete(format!("{}/v1beta/{}", self.base_url, name))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(|e| self.err(e))?;
        self.check(response).await?;
        debug!("Deleted {}", name);
        Ok(())
    }

    /// Poll until the file leaves the PROCESSING state.
    async fn wait_until_active(&self, mut file: RemoteFile) -> Result<RemoteFile, ServiceError> {
        let mut polls = 0;
        while file.state.as_deref() == Some("PROCESSING") {
            if polls >= self.max_polls {
                return Err(ServiceError::UploadFailed(format!(
                    "{} still processing after {} checks",
                    file.name, polls
                )));
            }
            sleep(self.poll_interval).await;
            polls += 1;
            file = self.get_file(&file.name).await?;
        }
        if file.state.as_deref() == Some("FAILED") {
            return Err(ServiceError::UploadFailed(format!(
                "service reported {} as FAILED",
                file.name
            )));
        }
        Ok(file)
    }
}

#[async_trait]
impl ExtractionService for GeminiService {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn upload(&self, display_name: &str, bytes: Vec<u8>) -> Result<FileHandle, ServiceError> {
        info!("Uploading {} ({} bytes) to the Files API", display_name, bytes.len());

        // ── Start a resumable session ────────────────────────────────────
        let start = self
            .client
            .post(format!("{}/upload/v1beta/files", self.base_url))
            .header(API_KEY_HEADER, &self.api_key)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", bytes.len().to_string())
            .header("X-Goog-Upload-Header-Content-Type", PDF_MIME)
            .json(&json!({ "file": { "display_name": display_name } }))
            .send()
            .await
            .map_err(|e| self.err(e))?;
        let start = self.check(start).await?;

        let upload_url = start
            .headers()
            .get("x-goog-upload-url")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| ServiceError::UploadFailed("no x-goog-upload-url header".into()))?;

        // ── Send the bytes and finalise ──────────────────────────────────
        let response = self
            .client
            .post(&upload_url)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(bytes)
            .send()
            .await
            .map_err(|e| self.err(e))?;
        let uploaded: UploadResponse = self
            .check(response)
            .await?
            .json()
            .await
            .map_err(|e| self.err(e))?;

        let name = uploaded.file.name.clone();
        let handle = match self
            .wait_until_active(uploaded.file)
            .await
            .and_then(RemoteFile::into_handle)
        {
            Ok(handle) => handle,
            Err(e) => {
                if let Err(cleanup) = self.delete_file(&name).await {
                    warn!("Could not delete unusable upload {}: {}", name, cleanup);
                }
                return Err(e);
            }
        };
        info!("Uploaded as {}", handle.name);
        Ok(handle)
    }

    async fn extract(&self, request: &ExtractionRequest) -> Result<RawResponse, ServiceError> {
        let body = request_body(request);
        let response = self
            .client
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                self.base_url, self.model
            ))
            .header(API_KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.err(e))?;
        let parsed: GenerateResponse = self
            .check(response)
            .await?
            .json()
            .await
            .map_err(|e| self.err(e))?;
        parsed.into_raw()
    }

    async fn delete(&self, handle: &FileHandle) -> Result<(), ServiceError> {
        self.delete_file(&handle.name).await
    }
}

// ── Wire format ──────────────────────────────────────────────────────────

/// JSON body of a `generateContent` call.
fn request_body(request: &ExtractionRequest) -> Value {
    let document = match &request.document {
        DocumentPart::Inline { mime_type, data } => {
            json!({ "inlineData": { "mimeType": mime_type, "data": data } })
        }
        DocumentPart::Hosted(handle) => {
            json!({ "fileData": { "mimeType": handle.mime_type, "fileUri": handle.uri } })
        }
    };
    json!({
        "contents": [{
            "role": "user",
            "parts": [document, { "text": request.prompt }]
        }],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": request.schema,
            "temperature": request.temperature
        }
    })
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: RemoteFile,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteFile {
    name: String,
    #[serde(default)]
    uri: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    state: Option<String>,
}

impl RemoteFile {
    fn into_handle(self) -> Result<FileHandle, ServiceError> {
        let uri = self
            .uri
            .filter(|u| !u.is_empty())
            .ok_or_else(|| ServiceError::UploadFailed(format!("{} has no URI", self.name)))?;
        Ok(FileHandle {
            name: self.name,
            uri,
            mime_type: self.mime_type.unwrap_or_else(|| PDF_MIME.to_string()),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

impl GenerateResponse {
    fn into_raw(self) -> Result<RawResponse, ServiceError> {
        if let Some(reason) = self.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(ServiceError::Blocked(reason));
        }
        let candidate = self
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::Blocked("no candidates returned".into()))?;

        let finish_reason = candidate.finish_reason.unwrap_or_default();
        match finish_reason.as_str() {
            "SAFETY" | "RECITATION" | "PROHIBITED_CONTENT" => {
                return Err(ServiceError::Blocked(finish_reason));
            }
            "MAX_TOKENS" => {
                return Err(ServiceError::MalformedResponse(
                    "output truncated at the token limit".into(),
                ));
            }
            _ => {}
        }

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(ServiceError::MalformedResponse("empty response text".into()));
        }

        let usage = self
            .usage_metadata
            .map(|u| TokenUsage {
                input_tokens: u.prompt_token_count,
                output_tokens: u.candidates_token_count,
            })
            .unwrap_or_default();
        Ok(RawResponse { text, usage })
    }
}
