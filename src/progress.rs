//! Progress-callback trait for per-document batch events.
//!
//! Pass an [`Arc<dyn BatchProgressCallback>`] to [`crate::run::run`] to
//! receive events as each standard moves through the pipeline. The binary
//! uses it to drive a terminal progress bar; tests use it to observe order.
//!
//! # Example
//!
//! ```rust
//! use aaoifi_pdf2json::BatchProgressCallback;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct Counter(AtomicUsize);
//!
//! impl BatchProgressCallback for Counter {
//!     fn on_document_complete(&self, id: &str, _position: usize, _total: usize) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{id} done");
//!     }
//! }
//! ```

use crate::error::ErrorKind;
use crate::output::RunSummary;
use std::sync::Arc;

/// Called by the orchestrator as it processes each document.
///
/// Documents are processed one at a time, so events arrive in order. All
/// methods default to no-ops.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once, after discovery, with the number of documents to attempt.
    fn on_run_start(&self, total_documents: usize) {
        let _ = total_documents;
    }

    /// Called before extraction of a document starts.
    ///
    /// # Arguments
    /// * `id`       : assigned ID, e.g. `SS07`
    /// * `file_name`: source filename
    /// * `position` : 1-based position in this run
    /// * `total`    : documents in this run
    fn on_document_start(&self, id: &str, file_name: &str, position: usize, total: usize) {
        let _ = (id, file_name, position, total);
    }

    /// Called after `<id>.json` has been written.
    fn on_document_complete(&self, id: &str, position: usize, total: usize) {
        let _ = (id, position, total);
    }

    /// Called when a document ends in `Failed`.
    fn on_document_error(&self, id: &str, position: usize, total: usize, kind: ErrorKind, error: &str) {
        let _ = (id, position, total, kind, error);
    }

    /// Called for a document skipped without an attempt (resume).
    fn on_document_skipped(&self, id: &str, position: usize, total: usize) {
        let _ = (id, position, total);
    }

    /// Called once after every document has been handled.
    fn on_run_complete(&self, summary: &RunSummary) {
        let _ = summary;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Shared callback handle.
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl BatchProgressCallback for Recorder {
        fn on_run_start(&self, total: usize) {
            self.events.lock().unwrap().push(format!("start {total}"));
        }

        fn on_document_complete(&self, id: &str, position: usize, total: usize) {
            self.events
                .lock()
                .unwrap()
                .push(format!("{id} {position}/{total}"));
        }

        fn on_document_error(&self, id: &str, _p: usize, _t: usize, kind: ErrorKind, _e: &str) {
            self.events.lock().unwrap().push(format!("{id} {kind}"));
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_run_start(61);
        cb.on_document_start("SS01", "معيار (1).pdf", 1, 61);
        cb.on_document_complete("SS01", 1, 61);
        cb.on_document_error("SS02", 2, 61, ErrorKind::BuildError, "title is empty");
        cb.on_document_skipped("SS03", 3, 61);
        cb.on_run_complete(&RunSummary::default());
    }

    #[test]
    fn overridden_methods_receive_events() {
        let rec = Arc::new(Recorder::default());
        let cb: ProgressCallback = rec.clone();
        cb.on_run_start(2);
        cb.on_document_start("SS01", "a.pdf", 1, 2);
        cb.on_document_complete("SS01", 1, 2);
        cb.on_document_error("SS02", 2, 2, ErrorKind::ExtractionError, "timeout");
        assert_eq!(
            *rec.events.lock().unwrap(),
            vec!["start 2", "SS01 1/2", "SS02 ExtractionError"]
        );
    }
}
