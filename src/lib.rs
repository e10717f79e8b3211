//! # aaoifi-pdf2json
//!
//! Convert the AAOIFI Sharia standards PDFs to database-ready JSON using a
//! hosted language model.
//!
//! Each PDF is sent whole to the service together with an extraction
//! prompt and a response schema. The structured answer is validated,
//! normalised and written as one `<id>.json` per standard (`SS01.json` …
//! `SS61.json`).
//!
//! ## Pipeline Overview
//!
//! ```text
//! input dir
//!  │
//!  ├─ 1. Discover  parse the standard number from each filename, order, assign IDs
//!  ├─ 2. Upload    inline bytes (≤ threshold) or hosted file reference
//!  ├─ 3. Extract   prompt + schema → service, bounded retry with backoff
//!  ├─ 4. Build     validate + normalise into a StandardRecord
//!  └─ 5. Write     atomic <id>.json, progress file, standards index
//! ```
//!
//! Documents are processed one at a time. A failure on one document is
//! logged and recorded in the [`RunSummary`]; the run continues with the
//! next.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use aaoifi_pdf2json::{run, GeminiService, ProcessorConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ProcessorConfig::builder()
//!         .api_key(std::env::var("GEMINI_API_KEY")?)
//!         .build()?;
//!     let service = GeminiService::new(&config)?;
//!     let summary = run(&config, &service, None).await?;
//!     eprintln!("{} done, {} failed", summary.done(), summary.failed.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2json` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod index;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod run;
pub mod service;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    BackoffPolicy, PageCountPolicy, ProcessorConfig, ProcessorConfigBuilder, API_KEY_VAR,
    DEFAULT_ID_PREFIX, DEFAULT_MODEL,
};
pub use error::{
    BuildError, ConfigError, DocumentError, ErrorKind, ExtractionError, InputDiscoveryError,
    ServiceError, Violation, WriteError,
};
pub use index::{IndexEntry, StandardsIndex};
pub use output::{ExtractionResult, RunSummary, Section, StandardRecord};
pub use pipeline::upload::{select_upload_mode, UploadMode};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use run::{plan, run, DocumentState, PlannedDocument};
pub use service::{ExtractionService, GeminiService};
