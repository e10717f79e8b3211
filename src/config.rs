//! Configuration for a batch conversion run.
//!
//! Every knob lives in [`ProcessorConfig`], built once at startup through
//! [`ProcessorConfigBuilder`] and then passed by reference to each pipeline
//! stage. Nothing reads the environment after startup; the binary maps
//! environment variables and flags onto the builder.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the environment variable holding the service credential.
pub const API_KEY_VAR: &str = "GEMINI_API_KEY";

/// Default output ID prefix.
pub const DEFAULT_ID_PREFIX: &str = "SS";

/// Default Gemini model.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Default REST endpoint of the Generative Language API.
pub const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com";

const MIB: u64 = 1024 * 1024;

/// Configuration for a batch conversion run.
///
/// # Example
/// ```rust
/// use aaoifi_pdf2json::ProcessorConfig;
///
/// let config = ProcessorConfig::builder()
///     .input_dir("pdfs")
///     .max_attempts(5)
///     .api_key("test-key")
///     .build()
///     .unwrap();
/// assert_eq!(config.format_id(7), "SS07");
/// ```
#[derive(Clone)]
pub struct ProcessorConfig {
    /// Directory holding the source PDFs. Default: `AAOIFI_Standards_Complete`.
    pub input_dir: PathBuf,

    /// Directory receiving `<id>.json` files. Default: `json_standards`.
    pub output_dir: PathBuf,

    /// Directory receiving per-run log files. Default: `logs`.
    pub log_dir: PathBuf,

    /// Completed-standards checkpoint. Default: `processing_progress.json`.
    pub progress_file: PathBuf,

    /// Combined id/title/keywords/aliases index. Default: `standards_index.json`.
    pub index_file: PathBuf,

    /// Number of standards expected in the input directory. Default: 61.
    pub expected_count: u32,

    /// Prefix of every output ID. Default: `SS`.
    pub id_prefix: String,

    /// Files up to and including this size are sent inline. Default: 10 MiB.
    ///
    /// Larger files go through the hosted Files API first.
    pub inline_threshold_bytes: u64,

    /// Total extraction attempts per document, first call included. Default: 3.
    pub max_attempts: u32,

    /// Delay schedule between attempts. Default: linear, 5 s per attempt.
    pub backoff: BackoffPolicy,

    /// Base delay fed into [`BackoffPolicy`]. Default: 5000 ms.
    pub retry_delay_ms: u64,

    /// Gemini model identifier. Default: `gemini-2.5-flash`.
    pub model: String,

    /// REST endpoint; overridable for proxies. Default: Google's public endpoint.
    pub api_base_url: String,

    /// Service credential. Required only when documents are actually extracted.
    pub api_key: Option<String>,

    /// Per-request timeout in seconds. Default: 600.
    ///
    /// A whole standard is extracted in one call, so this is far above
    /// the usual per-page budget.
    pub api_timeout_secs: u64,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Interval between state checks of a hosted upload. Default: 2000 ms.
    pub upload_poll_interval_ms: u64,

    /// Number of state checks before a hosted upload is abandoned. Default: 60.
    pub upload_max_polls: u32,

    /// What to do when extracted and physical page counts disagree.
    pub page_count_policy: PageCountPolicy,

    /// Minimum completed documents for a successful exit. Default: 1.
    pub min_success: usize,

    /// Skip standards already recorded in the progress file. Default: false.
    pub resume: bool,

    /// Rewrite the standards index after the run. Default: true.
    pub write_index: bool,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("AAOIFI_Standards_Complete"),
            output_dir: PathBuf::from("json_standards"),
            log_dir: PathBuf::from("logs"),
            progress_file: PathBuf::from("processing_progress.json"),
            index_file: PathBuf::from("standards_index.json"),
            expected_count: 61,
            id_prefix: DEFAULT_ID_PREFIX.to_string(),
            inline_threshold_bytes: 10 * MIB,
            max_attempts: 3,
            backoff: BackoffPolicy::default(),
            retry_delay_ms: 5000,
            model: DEFAULT_MODEL.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_key: None,
            api_timeout_secs: 600,
            temperature: 0.1,
            upload_poll_interval_ms: 2000,
            upload_max_polls: 60,
            page_count_policy: PageCountPolicy::default(),
            min_success: 1,
            resume: false,
            write_index: true,
        }
    }
}

impl fmt::Debug for ProcessorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorConfig")
            .field("input_dir", &self.input_dir)
            .field("output_dir", &self.output_dir)
            .field("log_dir", &self.log_dir)
            .field("expected_count", &self.expected_count)
            .field("inline_threshold_bytes", &self.inline_threshold_bytes)
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("page_count_policy", &self.page_count_policy)
            .field("resume", &self.resume)
            .finish()
    }
}

impl ProcessorConfig {
    /// Create a new builder for `ProcessorConfig`.
    pub fn builder() -> ProcessorConfigBuilder {
        ProcessorConfigBuilder {
            config: Self::default(),
        }
    }

    /// The credential, or [`ConfigError::MissingCredential`] if absent/blank.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        match self.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => Ok(key),
            _ => Err(ConfigError::MissingCredential {
                var: API_KEY_VAR.to_string(),
            }),
        }
    }

    /// Output ID for an embedded standard number: `SS` + two-digit index.
    pub fn format_id(&self, index: u32) -> String {
        format!("{}{:02}", self.id_prefix, index)
    }

    /// Path of the JSON file for `id`.
    pub fn output_path(&self, id: &str) -> PathBuf {
        self.output_dir.join(format!("{id}.json"))
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.backoff.delay(self.retry_delay_ms, attempt)
    }

    /// Create output and log directories if missing.
    pub fn ensure_dirs(&self) -> Result<(), ConfigError> {
        for dir in [&self.output_dir, &self.log_dir] {
            create_dir(dir)?;
        }
        Ok(())
    }
}

fn create_dir(path: &Path) -> Result<(), ConfigError> {
    std::fs::create_dir_all(path).map_err(|source| ConfigError::DirectoryCreate {
        path: path.to_path_buf(),
        source,
    })
}

/// Builder for [`ProcessorConfig`].
#[derive(Debug)]
pub struct ProcessorConfigBuilder {
    config: ProcessorConfig,
}

impl ProcessorConfigBuilder {
    pub fn input_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.input_dir = dir.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.log_dir = dir.into();
        self
    }

    pub fn progress_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.progress_file = path.into();
        self
    }

    pub fn index_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.index_file = path.into();
        self
    }

    pub fn expected_count(mut self, n: u32) -> Self {
        self.config.expected_count = n;
        self
    }

    pub fn id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.id_prefix = prefix.into();
        self
    }

    pub fn inline_threshold_bytes(mut self, bytes: u64) -> Self {
        self.config.inline_threshold_bytes = bytes;
        self
    }

    pub fn inline_threshold_mb(mut self, mb: u64) -> Self {
        self.config.inline_threshold_bytes = mb.saturating_mul(MIB);
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n;
        self
    }

    pub fn backoff(mut self, policy: BackoffPolicy) -> Self {
        self.config.backoff = policy;
        self
    }

    pub fn retry_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry_delay_ms = ms;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs.max(1);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn upload_poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.upload_poll_interval_ms = ms;
        self
    }

    pub fn upload_max_polls(mut self, n: u32) -> Self {
        self.config.upload_max_polls = n.max(1);
        self
    }

    pub fn page_count_policy(mut self, policy: PageCountPolicy) -> Self {
        self.config.page_count_policy = policy;
        self
    }

    pub fn min_success(mut self, n: usize) -> Self {
        self.config.min_success = n;
        self
    }

    pub fn resume(mut self, v: bool) -> Self {
        self.config.resume = v;
        self
    }

    pub fn write_index(mut self, v: bool) -> Self {
        self.config.write_index = v;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ProcessorConfig, ConfigError> {
        let c = &self.config;
        if c.max_attempts == 0 {
            return Err(ConfigError::InvalidConfig(
                "max attempts must be ≥ 1".into(),
            ));
        }
        if c.inline_threshold_bytes == 0 {
            return Err(ConfigError::InvalidConfig(
                "inline threshold must be > 0 bytes".into(),
            ));
        }
        if c.expected_count == 0 {
            return Err(ConfigError::InvalidConfig(
                "expected document count must be ≥ 1".into(),
            ));
        }
        if c.id_prefix.trim().is_empty() {
            return Err(ConfigError::InvalidConfig("ID prefix is empty".into()));
        }
        if c.model.trim().is_empty() {
            return Err(ConfigError::InvalidConfig("model is empty".into()));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Delay schedule between extraction attempts.
///
/// `attempt` is the 1-based number of the attempt that just failed:
///
/// | Policy | after 1 | after 2 | after 3 |
/// |--------|---------|---------|---------|
/// | Fixed  | d       | d       | d       |
/// | Linear | d       | 2d      | 3d      |
/// | Exponential | d  | 2d      | 4d      |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffPolicy {
    Fixed,
    #[default]
    Linear,
    Exponential,
}

impl BackoffPolicy {
    pub fn delay(&self, base_ms: u64, attempt: u32) -> Duration {
        let n = attempt.max(1);
        let ms = match self {
            BackoffPolicy::Fixed => base_ms,
            BackoffPolicy::Linear => base_ms.saturating_mul(n as u64),
            BackoffPolicy::Exponential => {
                base_ms.saturating_mul(2u64.saturating_pow(n.saturating_sub(1)))
            }
        };
        Duration::from_millis(ms)
    }
}

/// How the builder treats a page list whose length disagrees with the
/// PDF's physical page count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageCountPolicy {
    /// Reject the record with a `BuildError`. (default)
    #[default]
    Reject,
    /// Log a warning and keep the record.
    Warn,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_original_tool() {
        let c = ProcessorConfig::default();
        assert_eq!(c.expected_count, 61);
        assert_eq!(c.id_prefix, "SS");
        assert_eq!(c.inline_threshold_bytes, 10 * 1024 * 1024);
        assert_eq!(c.max_attempts, 3);
        assert_eq!(c.model, "gemini-2.5-flash");
        assert_eq!(c.output_dir, PathBuf::from("json_standards"));
    }

    #[test]
    fn build_rejects_zero_attempts() {
        let err = ProcessorConfig::builder().max_attempts(0).build();
        assert!(matches!(err, Err(ConfigError::InvalidConfig(_))));
    }

    #[test]
    fn build_rejects_zero_threshold() {
        let err = ProcessorConfig::builder().inline_threshold_bytes(0).build();
        assert!(matches!(err, Err(ConfigError::InvalidConfig(_))));
    }

    #[test]
    fn require_api_key_fails_fast_when_missing_or_blank() {
        let c = ProcessorConfig::default();
        assert!(matches!(
            c.require_api_key(),
            Err(ConfigError::MissingCredential { .. })
        ));

        let c = ProcessorConfig::builder().api_key("   ").build().unwrap();
        assert!(c.require_api_key().is_err());

        let c = ProcessorConfig::builder().api_key("k-123").build().unwrap();
        assert_eq!(c.require_api_key().unwrap(), "k-123");
    }

    #[test]
    fn debug_redacts_api_key() {
        let c = ProcessorConfig::builder()
            .api_key("super-secret")
            .build()
            .unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("super-secret"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn format_id_is_zero_padded() {
        let c = ProcessorConfig::default();
        assert_eq!(c.format_id(1), "SS01");
        assert_eq!(c.format_id(61), "SS61");
        assert_eq!(c.output_path("SS09"), PathBuf::from("json_standards/SS09.json"));
    }

    #[test]
    fn backoff_schedules() {
        let ms = |d: Duration| d.as_millis() as u64;
        assert_eq!(ms(BackoffPolicy::Fixed.delay(100, 3)), 100);
        assert_eq!(ms(BackoffPolicy::Linear.delay(100, 1)), 100);
        assert_eq!(ms(BackoffPolicy::Linear.delay(100, 3)), 300);
        assert_eq!(ms(BackoffPolicy::Exponential.delay(100, 1)), 100);
        assert_eq!(ms(BackoffPolicy::Exponential.delay(100, 4)), 800);
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let c = ProcessorConfig::builder()
            .api_base_url("http://localhost:8080/")
            .build()
            .unwrap();
        assert_eq!(c.api_base_url, "http://localhost:8080");
    }
}
