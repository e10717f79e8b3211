//! Batch orchestrator.
//!
//! Discovers the input PDFs and drives each one through
//! extract → build → write, strictly one document at a time. Every
//! per-document error is caught here, logged, recorded in the
//! [`RunSummary`] and the loop moves on; only a [`ConfigError`] ends the
//! run early.
//!
//! ## Document states
//!
//! ```text
//! Pending ─▶ Extracting ─▶ Building ─▶ Writing ─▶ Done
//!                │             │          │
//!                └─────────────┴──────────┴─────▶ Failed
//! ```
//!
//! Transitions only move forward; `Done` and `Failed` are terminal.

use crate::checkpoint::Checkpoint;
use crate::config::ProcessorConfig;
use crate::error::{ConfigError, DocumentError};
use crate::index;
use crate::output::{CompletedDocument, FailedDocument, RunSummary, SkippedDocument};
use crate::pipeline::build::{build, BuildContext};
use crate::pipeline::discover::{discover, DiscoveredPdf};
use crate::pipeline::extract::extract;
use crate::pipeline::inspect::page_count;
use crate::pipeline::upload::{format_size, select_upload_mode, UploadMode};
use crate::pipeline::write::write_json;
use crate::progress::ProgressCallback;
use crate::service::ExtractionService;
use std::fmt;
use std::time::Instant;
use tracing::{debug, error, info, warn};

// ── Per-document state machine ───────────────────────────────────────────

/// Where a document is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentState {
    Pending,
    Extracting,
    Building,
    Writing,
    Done,
    Failed,
}

impl DocumentState {
    /// Whether `self → next` is a legal transition.
    pub fn can_advance_to(self, next: DocumentState) -> bool {
        use DocumentState::*;
        matches!(
            (self, next),
            (Pending, Extracting)
                | (Extracting, Building)
                | (Building, Writing)
                | (Writing, Done)
                | (Extracting | Building | Writing, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, DocumentState::Done | DocumentState::Failed)
    }
}

impl fmt::Display for DocumentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Tracks one document's state and logs every transition.
#[derive(Debug)]
struct Tracker<'a> {
    id: &'a str,
    state: DocumentState,
}

impl<'a> Tracker<'a> {
    fn new(id: &'a str) -> Self {
        Self {
            id,
            state: DocumentState::Pending,
        }
    }

    fn advance(&mut self, next: DocumentState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "{}: illegal transition {} → {}",
            self.id,
            self.state,
            next
        );
        debug!("{}: {} → {}", self.id, self.state, next);
        self.state = next;
    }
}

// ── Run ──────────────────────────────────────────────────────────────────

/// Process every discovered standard and return the run summary.
///
/// # Errors
/// Returns `Err(ConfigError)` only when the run cannot start: the input
/// directory is missing or unreadable, or an output directory cannot be
/// created. Per-document failures are reported in the summary.
pub async fn run(
    config: &ProcessorConfig,
    service: &dyn ExtractionService,
    progress: Option<&ProgressCallback>,
) -> Result<RunSummary, ConfigError> {
    let start = Instant::now();
    info!(
        "Processing {} → {} with {}",
        config.input_dir.display(),
        config.output_dir.display(),
        service.name()
    );

    config.ensure_dirs()?;
    let discovery = discover(config)?;

    let mut summary = RunSummary {
        discovered: discovery.documents.len(),
        ..Default::default()
    };
    for rejected in &discovery.rejected {
        let err = DocumentError::from(rejected.clone());
        summary.skipped.push(SkippedDocument {
            id: None,
            file_name: rejected.file_name().to_string(),
            reason: format!("{}: {}", err.kind(), err),
        });
    }

    let mut checkpoint = Checkpoint::load(&config.progress_file);
    let total = discovery.documents.len();
    if let Some(cb) = progress {
        cb.on_run_start(total);
    }

    for (i, doc) in discovery.documents.iter().enumerate() {
        let position = i + 1;

        if config.resume && already_processed(config, &checkpoint, doc) {
            info!("[{}/{}] {}: already processed, skipping", position, total, doc.id);
            summary.resumed.push(doc.id.clone());
            summary.skipped.push(SkippedDocument {
                id: Some(doc.id.clone()),
                file_name: doc.file_name.clone(),
                reason: "already processed".into(),
            });
            if let Some(cb) = progress {
                cb.on_document_skipped(&doc.id, position, total);
            }
            continue;
        }

        info!("[{}/{}] {}: {}", position, total, doc.id, doc.file_name);
        if let Some(cb) = progress {
            cb.on_document_start(&doc.id, &doc.file_name, position, total);
        }

        match process_document(service, doc, config).await {
            Ok(done) => {
                if let Err(e) = checkpoint.mark_completed(doc.index).await {
                    warn!("{}: could not update progress file: {}", doc.id, e);
                }
                summary.total_input_tokens += done.usage.input_tokens;
                summary.total_output_tokens += done.usage.output_tokens;
                if let Some(cb) = progress {
                    cb.on_document_complete(&doc.id, position, total);
                }
                summary.succeeded.push(done);
            }
            Err(e) => {
                let kind = e.kind();
                error!("{}: {} - {}", doc.id, kind, e);
                if let Some(cb) = progress {
                    cb.on_document_error(&doc.id, position, total, kind, &e.to_string());
                }
                summary.failed.push(FailedDocument {
                    id: Some(doc.id.clone()),
                    file_name: doc.file_name.clone(),
                    kind,
                    message: e.to_string(),
                });
            }
        }
    }

    if config.write_index && !discovery.documents.is_empty() {
        if let Err(e) = index::write_index(config).await {
            warn!("Could not write standards index: {}", e);
        }
    }

    summary.total_duration_ms = start.elapsed().as_millis() as u64;
    log_summary(&summary);
    if let Some(cb) = progress {
        cb.on_run_complete(&summary);
    }
    Ok(summary)
}

fn already_processed(config: &ProcessorConfig, checkpoint: &Checkpoint, doc: &DiscoveredPdf) -> bool {
    checkpoint.contains(doc.index) && config.output_path(&doc.id).is_file()
}

/// Drive one document from `Pending` to a terminal state.
async fn process_document(
    service: &dyn ExtractionService,
    doc: &DiscoveredPdf,
    config: &ProcessorConfig,
) -> Result<CompletedDocument, DocumentError> {
    let doc_start = Instant::now();
    let mut tracker = Tracker::new(&doc.id);

    let outcome = run_stages(service, doc, config, &mut tracker).await;
    match &outcome {
        Ok(done) => {
            tracker.advance(DocumentState::Done);
            info!(
                "{}: done in {:?} ({} attempt(s))",
                doc.id,
                doc_start.elapsed(),
                done.attempts
            );
        }
        Err(_) => tracker.advance(DocumentState::Failed),
    }
    outcome
}

async fn run_stages(
    service: &dyn ExtractionService,
    doc: &DiscoveredPdf,
    config: &ProcessorConfig,
    tracker: &mut Tracker<'_>,
) -> Result<CompletedDocument, DocumentError> {
    tracker.advance(DocumentState::Extracting);
    let extraction = extract(service, doc, config).await?;

    tracker.advance(DocumentState::Building);
    let ctx = BuildContext {
        id_prefix: &config.id_prefix,
        physical_pages: page_count(&doc.path).await,
        page_count_policy: config.page_count_policy,
    };
    let usage = extraction.result.usage;
    let record = build(extraction.result, &doc.id, &ctx)?;

    tracker.advance(DocumentState::Writing);
    write_json(&record, &config.output_path(&record.id)).await?;

    Ok(CompletedDocument {
        id: doc.id.clone(),
        file_name: doc.file_name.clone(),
        attempts: extraction.attempts,
        usage,
    })
}

/// Log the end-of-run summary, one line per failure.
pub fn log_summary(summary: &RunSummary) {
    info!(
        "Run complete: {} succeeded, {} skipped, {} failed of {} discovered ({}ms)",
        summary.succeeded.len(),
        summary.skipped.len(),
        summary.failed.len(),
        summary.discovered,
        summary.total_duration_ms
    );
    if summary.total_input_tokens + summary.total_output_tokens > 0 {
        info!(
            "Tokens: {} in / {} out",
            summary.total_input_tokens, summary.total_output_tokens
        );
    }
    for f in &summary.failed {
        warn!(
            "Failed: {} ({}) - {}",
            f.id.as_deref().unwrap_or("-"),
            f.file_name,
            f.kind
        );
    }
}

// ── Dry run ──────────────────────────────────────────────────────────────

/// One line of the dry-run plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedDocument {
    pub index: u32,
    pub id: String,
    pub file_name: String,
    pub size_bytes: u64,
    pub mode: UploadMode,
    /// Would be skipped under `--resume`.
    pub already_processed: bool,
}

/// What a run would do, without touching the service or writing anything.
pub fn plan(
    config: &ProcessorConfig,
) -> Result<(Vec<PlannedDocument>, Vec<SkippedDocument>), ConfigError> {
    let discovery = discover(config)?;
    let checkpoint = Checkpoint::load(&config.progress_file);

    let planned = discovery
        .documents
        .iter()
        .map(|doc| {
            let mode = select_upload_mode(doc.size_bytes, config.inline_threshold_bytes);
            debug!("plan: {} {} {}", doc.id, format_size(doc.size_bytes), mode);
            PlannedDocument {
                index: doc.index,
                id: doc.id.clone(),
                file_name: doc.file_name.clone(),
                size_bytes: doc.size_bytes,
                mode,
                already_processed: already_processed(config, &checkpoint, doc),
            }
        })
        .collect();

    let skipped = discovery
        .rejected
        .iter()
        .map(|e| SkippedDocument {
            id: None,
            file_name: e.file_name().to_string(),
            reason: e.to_string(),
        })
        .collect();

    Ok((planned, skipped))
}
