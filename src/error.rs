//! Error types for the aaoifi-pdf2json library.
//!
//! Errors are split by blast radius:
//!
//! * [`ConfigError`] is **fatal**: the run cannot start (missing credential,
//!   missing input directory, invalid settings). Nothing is processed.
//!
//! * [`InputDiscoveryError`], [`ExtractionError`], [`BuildError`] and
//!   [`WriteError`] are **per-document**: the orchestrator logs them, records
//!   them in the run summary, and moves on to the next document. They are
//!   gathered under [`DocumentError`].
//!
//! * [`ServiceError`] is the failure of a single call to the extraction
//!   service. The retry loop in [`crate::pipeline::extract`] decides from
//!   [`ServiceError::is_transient`] whether another attempt is made.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

// ── Fatal ────────────────────────────────────────────────────────────────

/// Startup errors. Abort the run before any document is processed.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The API credential environment variable is unset or blank.
    #[error("API credential is not set.\nExport {var}=<your key> and run again.")]
    MissingCredential { var: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The input directory does not exist or is not a directory.
    #[error("Input directory not found: '{path}'")]
    InputDirMissing { path: PathBuf },

    /// The input directory exists but could not be listed.
    #[error("Cannot read input directory '{path}': {source}")]
    InputDirUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An output or log directory could not be created.
    #[error("Cannot create directory '{path}': {source}")]
    DirectoryCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// ── Service call ─────────────────────────────────────────────────────────

/// Failure of one call to the extraction service.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    /// Connection reset, DNS failure, TLS error, etc.
    #[error("transport error: {0}")]
    Transport(String),

    /// The request did not complete within the configured timeout.
    #[error("request timed out after {secs}s")]
    Timeout { secs: u64 },

    /// HTTP 429.
    #[error("rate limited by the service (HTTP 429)")]
    RateLimited,

    /// HTTP 401/403. Retrying will not help.
    #[error("authentication rejected (HTTP {status}): {detail}")]
    Auth { status: u16, detail: String },

    /// Any other non-success HTTP status.
    #[error("HTTP {status}: {detail}")]
    Status { status: u16, detail: String },

    /// The response body was not the JSON we asked for.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The response parsed, but a declared field is missing or empty.
    #[error("response violates schema: {0}")]
    SchemaViolation(String),

    /// Hosted upload did not reach the ACTIVE state.
    #[error("file upload failed: {0}")]
    UploadFailed(String),

    /// The service refused to answer (safety block, empty candidates).
    #[error("response blocked: {0}")]
    Blocked(String),
}

impl ServiceError {
    /// Whether another attempt may succeed.
    ///
    /// Network trouble, timeouts, throttling, server errors and bad response
    /// bodies are transient. Auth failures and other 4xx statuses are not.
    pub fn is_transient(&self) -> bool {
        match self {
            ServiceError::Auth { .. } => false,
            ServiceError::Status { status, .. } => *status >= 500 || *status == 408,
            _ => true,
        }
    }

    /// Map a `reqwest` error, preserving the timeout distinction.
    pub fn from_reqwest(err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            ServiceError::Timeout { secs: timeout_secs }
        } else if err.is_decode() {
            ServiceError::MalformedResponse(err.to_string())
        } else {
            ServiceError::Transport(err.to_string())
        }
    }

    /// Map a non-success HTTP status and its body.
    pub fn from_status(status: u16, body: &str) -> Self {
        let detail = truncate(body.trim(), 300);
        match status {
            401 | 403 => ServiceError::Auth { status, detail },
            429 => ServiceError::RateLimited,
            _ => ServiceError::Status { status, detail },
        }
    }
}

// ── Per-document ─────────────────────────────────────────────────────────

/// A PDF in the input directory that cannot be assigned an ID.
#[derive(Debug, Clone, Error)]
pub enum InputDiscoveryError {
    /// No standard number could be read from the filename.
    #[error("no standard number in filename '{file_name}'")]
    NoIndex { file_name: String },

    /// Another file already claimed this standard number.
    #[error("'{file_name}' repeats standard number {index} (already taken by '{first}')")]
    DuplicateIndex {
        file_name: String,
        index: u32,
        first: String,
    },
}

impl InputDiscoveryError {
    pub fn file_name(&self) -> &str {
        match self {
            InputDiscoveryError::NoIndex { file_name }
            | InputDiscoveryError::DuplicateIndex { file_name, .. } => file_name,
        }
    }
}

/// Terminal failure of the extractor for one document.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The PDF could not be read from disk.
    #[error("cannot read '{path}': {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is empty or lacks the `%PDF` magic bytes.
    #[error("'{path}' is not a PDF ({reason})")]
    NotAPdf { path: PathBuf, reason: String },

    /// Every attempt failed with a transient error.
    #[error("all {attempts} attempts failed; last error: {last}")]
    Exhausted { attempts: u32, last: ServiceError },

    /// An attempt failed with an error that retrying cannot fix.
    #[error("attempt {attempt} failed permanently: {cause}")]
    Permanent { attempt: u32, cause: ServiceError },
}

/// One constraint a built record violated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    InvalidId(String),
    EmptyTitle,
    EmptyText,
    EmptySectionId { position: usize },
    DuplicateSectionId { sec_id: String },
    NoPages,
    PagesOutOfOrder { previous: String, next: String },
    PageCountMismatch { extracted: usize, physical: usize },
}

impl Violation {
    /// Name of the record field the violation concerns.
    pub fn field(&self) -> &'static str {
        match self {
            Violation::InvalidId(_) => "id",
            Violation::EmptyTitle => "title",
            Violation::EmptyText => "text",
            Violation::EmptySectionId { .. } | Violation::DuplicateSectionId { .. } => "sections",
            Violation::NoPages
            | Violation::PagesOutOfOrder { .. }
            | Violation::PageCountMismatch { .. } => "pages",
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::InvalidId(id) => write!(f, "id '{id}' is not a valid standard id"),
            Violation::EmptyTitle => write!(f, "title is empty"),
            Violation::EmptyText => write!(f, "text is empty"),
            Violation::EmptySectionId { position } => {
                write!(f, "sections[{position}] has an empty sec_id")
            }
            Violation::DuplicateSectionId { sec_id } => {
                write!(f, "sec_id '{sec_id}' appears more than once")
            }
            Violation::NoPages => write!(f, "pages is empty"),
            Violation::PagesOutOfOrder { previous, next } => {
                write!(f, "page '{next}' follows '{previous}'")
            }
            Violation::PageCountMismatch {
                extracted,
                physical,
            } => write!(
                f,
                "{extracted} pages extracted but the PDF has {physical}"
            ),
        }
    }
}

/// A structurally valid extraction that failed content validation.
#[derive(Debug, Clone)]
pub struct BuildError {
    pub id: String,
    pub violations: Vec<Violation>,
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} violation(s): {}",
            self.id,
            self.violations.len(),
            join_violations(&self.violations)
        )
    }
}

impl std::error::Error for BuildError {}

impl BuildError {
    /// Whether any violation concerns `field`.
    pub fn mentions(&self, field: &str) -> bool {
        self.violations.iter().any(|v| v.field() == field)
    }
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Output file could not be written.
#[derive(Debug, Error)]
#[error("failed to write '{path}': {source}")]
pub struct WriteError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Short label for an error kind, used in logs and the run summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum ErrorKind {
    InputDiscoveryError,
    ExtractionError,
    BuildError,
    WriteError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::InputDiscoveryError => "InputDiscoveryError",
            ErrorKind::ExtractionError => "ExtractionError",
            ErrorKind::BuildError => "BuildError",
            ErrorKind::WriteError => "WriteError",
        };
        f.write_str(s)
    }
}

/// Any error that ends processing of a single document.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error(transparent)]
    Discovery(#[from] InputDiscoveryError),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error(transparent)]
    Write(#[from] WriteError),
}

impl DocumentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DocumentError::Discovery(_) => ErrorKind::InputDiscoveryError,
            DocumentError::Extraction(_) => ErrorKind::ExtractionError,
            DocumentError::Build(_) => ErrorKind::BuildError,
            DocumentError::Write(_) => ErrorKind::WriteError,
        }
    }
}

/// Truncate on a char boundary, appending an ellipsis when cut.
pub(crate) fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        let cut: String = s.chars().take(max_chars).collect();
        format!("{cut}\u{2026}")
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_credential_names_variable() {
        let e = ConfigError::MissingCredential {
            var: "GEMINI_API_KEY".into(),
        };
        assert!(e.to_string().contains("GEMINI_API_KEY"));
    }

    #[test]
    fn status_mapping() {
        assert!(matches!(
            ServiceError::from_status(401, "bad key"),
            ServiceError::Auth { status: 401, .. }
        ));
        assert!(matches!(
            ServiceError::from_status(429, ""),
            ServiceError::RateLimited
        ));
        assert!(matches!(
            ServiceError::from_status(503, "overloaded"),
            ServiceError::Status { status: 503, .. }
        ));
    }

    #[test]
    fn transient_classification() {
        assert!(ServiceError::Transport("reset".into()).is_transient());
        assert!(ServiceError::Timeout { secs: 60 }.is_transient());
        assert!(ServiceError::RateLimited.is_transient());
        assert!(ServiceError::MalformedResponse("eof".into()).is_transient());
        assert!(ServiceError::SchemaViolation("pages".into()).is_transient());
        assert!(ServiceError::from_status(500, "").is_transient());
        assert!(!ServiceError::from_status(400, "bad request").is_transient());
        assert!(!ServiceError::from_status(403, "denied").is_transient());
    }

    #[test]
    fn build_error_lists_every_violation() {
        let e = BuildError {
            id: "SS05".into(),
            violations: vec![Violation::EmptyTitle, Violation::EmptyText],
        };
        let msg = e.to_string();
        assert!(msg.starts_with("SS05: 2 violation(s)"), "got: {msg}");
        assert!(msg.contains("title is empty"));
        assert!(msg.contains("text is empty"));
        assert!(e.mentions("title"));
        assert!(e.mentions("text"));
        assert!(!e.mentions("pages"));
    }

    #[test]
    fn document_error_kind() {
        let e: DocumentError = InputDiscoveryError::NoIndex {
            file_name: "readme.pdf".into(),
        }
        .into();
        assert_eq!(e.kind(), ErrorKind::InputDiscoveryError);
        assert_eq!(e.kind().to_string(), "InputDiscoveryError");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let s = "معيار".repeat(100);
        let t = truncate(&s, 10);
        assert_eq!(t.chars().count(), 11);
        assert!(t.ends_with('\u{2026}'));
        assert_eq!(truncate("short", 10), "short");
    }
}
