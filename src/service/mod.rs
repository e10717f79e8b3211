//! The extraction service as a capability.
//!
//! The pipeline only needs three things from the hosted model: store a file
//! and get a handle back, run an extraction over inline bytes or a handle,
//! and release a handle. [`ExtractionService`] names exactly those, so the
//! extractor and orchestrator can be driven by a deterministic fake in tests
//! and by [`gemini::GeminiService`] in production.

pub mod gemini;

use crate::error::ServiceError;
use crate::output::TokenUsage;
use async_trait::async_trait;
use serde_json::Value;

pub use gemini::GeminiService;

/// MIME type of every document we send.
pub const PDF_MIME: &str = "application/pdf";

/// A file stored by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHandle {
    /// Resource name used for lookups and deletion, e.g. `files/abc123`.
    pub name: String,
    /// URI used to reference the file in an extraction request.
    pub uri: String,
    pub mime_type: String,
}

/// The document part of an extraction request.
#[derive(Debug, Clone)]
pub enum DocumentPart {
    /// Base64-encoded bytes embedded in the request body.
    Inline { mime_type: String, data: String },
    /// Reference to a previously uploaded file.
    Hosted(FileHandle),
}

/// Everything the service needs for one extraction call.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub document: DocumentPart,
    pub prompt: String,
    pub schema: Value,
    pub temperature: f32,
}

/// Raw text of a successful call plus usage.
#[derive(Debug, Clone, Default)]
pub struct RawResponse {
    pub text: String,
    pub usage: TokenUsage,
}

/// Capability interface over the hosted extraction model.
#[async_trait]
pub trait ExtractionService: Send + Sync {
    /// Provider name for logs.
    fn name(&self) -> &str;

    /// Store `bytes` and return a handle once the file is usable.
    async fn upload(&self, display_name: &str, bytes: Vec<u8>) -> Result<FileHandle, ServiceError>;

    /// Run one extraction call.
    async fn extract(&self, request: &ExtractionRequest) -> Result<RawResponse, ServiceError>;

    /// Release a stored file.
    async fn delete(&self, handle: &FileHandle) -> Result<(), ServiceError>;
}
