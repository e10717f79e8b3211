//! Extractor: one PDF in, one [`ExtractionResult`] (or terminal error) out.
//!
//! ## Retry state machine
//!
//! ```text
//! Attempt(n) ──ok──────────────────────────▶ Success
//!     │
//!     ├─ transient error, n < max ─▶ Retry ─(backoff)─▶ Attempt(n+1)
//!     ├─ transient error, n = max ─▶ Exhausted
//!     └─ permanent error ─────────▶ Permanent
//! ```
//!
//! A response that does not parse, or parses but breaks the service
//! contract (see [`ExtractionResult::check_contract`]), counts as a
//! transient failure. In hosted mode the file is uploaded once and the
//! handle reused across attempts; a failed upload is itself a failed
//! attempt. The handle is deleted when the loop ends, and a failed delete
//! is only logged.

use crate::config::ProcessorConfig;
use crate::error::{ExtractionError, ServiceError};
use crate::output::ExtractionResult;
use crate::pipeline::discover::DiscoveredPdf;
use crate::pipeline::upload::{format_size, inline_part, select_upload_mode, UploadMode};
use crate::prompts::{extraction_prompt, response_schema};
use crate::service::{DocumentPart, ExtractionRequest, ExtractionService, FileHandle};
use std::time::Instant;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// What the loop does after an attempt.
#[derive(Debug)]
pub enum Step {
    Success(ExtractionResult),
    Retry(ServiceError),
    Exhausted(ServiceError),
    Permanent(ServiceError),
}

/// Transition out of `Attempt(attempt)` given its outcome.
pub fn next_step(
    attempt: u32,
    max_attempts: u32,
    outcome: Result<ExtractionResult, ServiceError>,
) -> Step {
    match outcome {
        Ok(result) => Step::Success(result),
        Err(e) if !e.is_transient() => Step::Permanent(e),
        Err(e) if attempt >= max_attempts => Step::Exhausted(e),
        Err(e) => Step::Retry(e),
    }
}

/// A successful extraction and the number of attempts it took.
#[derive(Debug)]
pub struct Extraction {
    pub result: ExtractionResult,
    pub attempts: u32,
    pub mode: UploadMode,
}

/// Extract one document through `service`.
pub async fn extract(
    service: &dyn ExtractionService,
    doc: &DiscoveredPdf,
    config: &ProcessorConfig,
) -> Result<Extraction, ExtractionError> {
    let bytes = read_pdf(doc).await?;
    let size = bytes.len() as u64;
    let mode = select_upload_mode(size, config.inline_threshold_bytes);
    info!(
        "{}: upload mode {} ({} vs threshold {})",
        doc.id,
        mode,
        format_size(size),
        format_size(config.inline_threshold_bytes)
    );

    let prompt = extraction_prompt(doc.index);
    let schema = response_schema();
    let inline = match mode {
        UploadMode::Inline => Some(inline_part(&bytes)),
        UploadMode::HostedReference => None,
    };

    let mut handle: Option<FileHandle> = None;
    let mut attempt = 1;
    let start = Instant::now();

    let outcome = loop {
        debug!("{}: attempt {}/{}", doc.id, attempt, config.max_attempts);

        let result = attempt_once(
            service,
            doc,
            &bytes,
            inline.as_ref(),
            &mut handle,
            &prompt,
            &schema,
            config,
        )
        .await;

        match next_step(attempt, config.max_attempts, result) {
            Step::Success(result) => {
                info!(
                    "{}: extracted in {} attempt(s), {:?} ({} tokens in / {} out)",
                    doc.id,
                    attempt,
                    start.elapsed(),
                    result.usage.input_tokens,
                    result.usage.output_tokens
                );
                break Ok(Extraction {
                    result,
                    attempts: attempt,
                    mode,
                });
            }
            Step::Retry(e) => {
                let delay = config.backoff_delay(attempt);
                warn!(
                    "{}: attempt {}/{} failed: {}; retrying in {:?}",
                    doc.id, attempt, config.max_attempts, e, delay
                );
                sleep(delay).await;
                attempt += 1;
            }
            Step::Exhausted(last) => {
                warn!(
                    "{}: attempt {}/{} failed: {}",
                    doc.id, attempt, config.max_attempts, last
                );
                break Err(ExtractionError::Exhausted {
                    attempts: attempt,
                    last,
                });
            }
            Step::Permanent(cause) => {
                warn!(
                    "{}: attempt {}/{} failed permanently: {}",
                    doc.id, attempt, config.max_attempts, cause
                );
                break Err(ExtractionError::Permanent { attempt, cause });
            }
        }
    };

    if let Some(h) = handle {
        if let Err(e) = service.delete(&h).await {
            warn!("{}: could not delete hosted file {}: {}", doc.id, h.name, e);
        }
    }

    outcome
}

#[allow(clippy::too_many_arguments)]
async fn attempt_once(
    service: &dyn ExtractionService,
    doc: &DiscoveredPdf,
    bytes: &[u8],
    inline: Option<&DocumentPart>,
    handle: &mut Option<FileHandle>,
    prompt: &str,
    schema: &serde_json::Value,
    config: &ProcessorConfig,
) -> Result<ExtractionResult, ServiceError> {
    let document = match inline {
        Some(part) => part.clone(),
        None => {
            if handle.is_none() {
                *handle = Some(service.upload(&doc.file_name, bytes.to_vec()).await?);
            }
            match handle {
                Some(h) => DocumentPart::Hosted(h.clone()),
                None => return Err(ServiceError::UploadFailed("no file handle".into())),
            }
        }
    };

    let request = ExtractionRequest {
        document,
        prompt: prompt.to_string(),
        schema: schema.clone(),
        temperature: config.temperature,
    };
    let raw = service.extract(&request).await?;
    let mut result = ExtractionResult::parse(&raw.text)?;
    result.check_contract()?;
    result.usage = raw.usage;
    Ok(result)
}

/// Read the whole file, rejecting empty files and non-PDFs.
async fn read_pdf(doc: &DiscoveredPdf) -> Result<Vec<u8>, ExtractionError> {
    let bytes = tokio::fs::read(&doc.path)
        .await
        .map_err(|source| ExtractionError::Unreadable {
            path: doc.path.clone(),
            source,
        })?;
    if bytes.is_empty() {
        return Err(ExtractionError::NotAPdf {
            path: doc.path.clone(),
            reason: "file is empty".into(),
        });
    }
    if !bytes.starts_with(b"%PDF") {
        let head: Vec<u8> = bytes.iter().take(4).copied().collect();
        return Err(ExtractionError::NotAPdf {
            path: doc.path.clone(),
            reason: format!("first bytes {head:?}"),
        });
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::RawResponse;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;
    use tokio_test::{assert_err, assert_ok};

    const GOOD: &str = r#"{"title":"الحوالة","text":"نص","sections":[],"keywords":[],"aliases":[],"pages":["1"]}"#;

    /// Replays scripted responses and counts calls.
    #[derive(Default)]
    struct Scripted {
        responses: Mutex<VecDeque<Result<String, ServiceError>>>,
        extract_calls: AtomicU32,
        upload_calls: AtomicU32,
        /// Uploads that fail before one succeeds.
        upload_failures: AtomicU32,
        delete_calls: AtomicU32,
        fail_delete: bool,
        last_document_hosted: Mutex<Option<bool>>,
    }

    impl Scripted {
        fn new(responses: Vec<Result<String, ServiceError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl ExtractionService for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn upload(&self, _name: &str, _bytes: Vec<u8>) -> Result<FileHandle, ServiceError> {
            self.upload_calls.fetch_add(1, Ordering::SeqCst);
            if self
                .upload_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(ServiceError::UploadFailed("files/test is FAILED".into()));
            }
            Ok(FileHandle {
                name: "files/test".into(),
                uri: "https://example.test/files/test".into(),
                mime_type: "application/pdf".into(),
            })
        }

        async fn extract(&self, request: &ExtractionRequest) -> Result<RawResponse, ServiceError> {
            self.extract_calls.fetch_add(1, Ordering::SeqCst);
            *self.last_document_hosted.lock().unwrap() =
                Some(matches!(request.document, DocumentPart::Hosted(_)));
            let next = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ServiceError::Transport("script exhausted".into())));
            next.map(|text| RawResponse {
                text,
                ..Default::default()
            })
        }

        async fn delete(&self, _handle: &FileHandle) -> Result<(), ServiceError> {
            self.delete_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_delete {
                Err(ServiceError::Status {
                    status: 500,
                    detail: "nope".into(),
                })
            } else {
                Ok(())
            }
        }
    }

    fn fixture(size: usize) -> (TempDir, DiscoveredPdf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("معيار (4) المشاركة.pdf");
        let mut bytes = b"%PDF-1.4\n".to_vec();
        bytes.resize(size.max(bytes.len()), b' ');
        std::fs::write(&path, &bytes).unwrap();
        let doc = DiscoveredPdf {
            index: 4,
            id: "SS04".into(),
            path,
            file_name: "معيار (4) المشاركة.pdf".into(),
            size_bytes: bytes.len() as u64,
        };
        (dir, doc)
    }

    fn config(max_attempts: u32, threshold: u64) -> ProcessorConfig {
        ProcessorConfig::builder()
            .max_attempts(max_attempts)
            .retry_delay_ms(0)
            .inline_threshold_bytes(threshold)
            .build()
            .unwrap()
    }

    fn transient() -> Result<String, ServiceError> {
        Err(ServiceError::Transport("connection reset".into()))
    }

    #[test]
    fn next_step_transitions() {
        let e = || ServiceError::RateLimited;
        assert!(matches!(next_step(1, 3, Err(e())), Step::Retry(_)));
        assert!(matches!(next_step(3, 3, Err(e())), Step::Exhausted(_)));
        assert!(matches!(
            next_step(1, 3, Err(ServiceError::from_status(401, ""))),
            Step::Permanent(_)
        ));
        let ok = ExtractionResult::parse(GOOD).unwrap();
        assert!(matches!(next_step(3, 3, Ok(ok)), Step::Success(_)));
    }

    #[tokio::test]
    async fn succeeds_first_time_inline() {
        let (_dir, doc) = fixture(100);
        let svc = Scripted::new(vec![Ok(GOOD.into())]);
        let out = assert_ok!(extract(&svc, &doc, &config(3, 1024)).await);
        assert_eq!(out.attempts, 1);
        assert_eq!(out.mode, UploadMode::Inline);
        assert_eq!(out.result.title, "الحوالة");
        assert_eq!(svc.upload_calls.load(Ordering::SeqCst), 0);
        assert_eq!(*svc.last_document_hosted.lock().unwrap(), Some(false));
    }

    #[tokio::test]
    async fn retries_exactly_max_attempts_then_gives_up() {
        let (_dir, doc) = fixture(100);
        let svc = Scripted::new(vec![transient(), transient(), transient(), Ok(GOOD.into())]);
        let err = assert_err!(extract(&svc, &doc, &config(3, 1024)).await);
        assert!(matches!(err, ExtractionError::Exhausted { attempts: 3, .. }));
        assert_eq!(svc.extract_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn recovers_after_malformed_response() {
        let (_dir, doc) = fixture(100);
        let svc = Scripted::new(vec![
            Ok("not json".into()),
            Ok(r#"{"title":"t","text":"x","sections":[],"keywords":[],"aliases":[],"pages":[]}"#.into()),
            Ok(GOOD.into()),
        ]);
        let out = assert_ok!(extract(&svc, &doc, &config(3, 1024)).await);
        assert_eq!(out.attempts, 3);
    }

    #[tokio::test]
    async fn permanent_error_stops_immediately() {
        let (_dir, doc) = fixture(100);
        let svc = Scripted::new(vec![
            Err(ServiceError::from_status(403, "key revoked")),
            Ok(GOOD.into()),
        ]);
        let err = assert_err!(extract(&svc, &doc, &config(3, 1024)).await);
        assert!(matches!(err, ExtractionError::Permanent { attempt: 1, .. }));
        assert_eq!(svc.extract_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn hosted_mode_uploads_once_and_cleans_up() {
        let (_dir, doc) = fixture(2048);
        let svc = Scripted::new(vec![transient(), Ok(GOOD.into())]);
        let out = assert_ok!(extract(&svc, &doc, &config(3, 1024)).await);
        assert_eq!(out.mode, UploadMode::HostedReference);
        assert_eq!(svc.upload_calls.load(Ordering::SeqCst), 1);
        assert_eq!(svc.extract_calls.load(Ordering::SeqCst), 2);
        assert_eq!(svc.delete_calls.load(Ordering::SeqCst), 1);
        assert_eq!(*svc.last_document_hosted.lock().unwrap(), Some(true));
    }

    #[tokio::test]
    async fn failed_upload_is_retried_as_an_attempt() {
        let (_dir, doc) = fixture(2048);
        let svc = Scripted {
            upload_failures: AtomicU32::new(1),
            ..Scripted::new(vec![Ok(GOOD.into())])
        };
        let out = assert_ok!(extract(&svc, &doc, &config(3, 1024)).await);
        assert_eq!(out.attempts, 2);
        assert_eq!(svc.upload_calls.load(Ordering::SeqCst), 2);
        assert_eq!(svc.extract_calls.load(Ordering::SeqCst), 1);
        assert_eq!(svc.delete_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_cleanup_is_not_fatal() {
        let (_dir, doc) = fixture(2048);
        let svc = Scripted {
            fail_delete: true,
            ..Scripted::new(vec![Ok(GOOD.into())])
        };
        assert_ok!(extract(&svc, &doc, &config(3, 1024)).await);
        assert_eq!(svc.delete_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn non_pdf_is_rejected_without_calling_the_service() {
        let (_dir, mut doc) = fixture(10);
        let path = doc.path.with_file_name("fake.pdf");
        std::fs::write(&path, b"<html>").unwrap();
        doc.path = path;
        let svc = Scripted::new(vec![Ok(GOOD.into())]);
        let err = assert_err!(extract(&svc, &doc, &config(3, 1024)).await);
        assert!(matches!(err, ExtractionError::NotAPdf { .. }));
        assert_eq!(svc.extract_calls.load(Ordering::SeqCst), 0);
    }
}
