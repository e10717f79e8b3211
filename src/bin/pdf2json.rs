//! CLI binary for aaoifi-pdf2json.
//!
//! A thin shim over the library crate that maps CLI flags (all of which
//! can come from the environment) to `ProcessorConfig`, runs the batch and
//! prints the summary.

use aaoifi_pdf2json::config::DEFAULT_API_BASE_URL;
use aaoifi_pdf2json::index::write_index;
use aaoifi_pdf2json::pipeline::upload::format_size;
use aaoifi_pdf2json::{
    plan, run, BackoffPolicy, BatchProgressCallback, ErrorKind, GeminiService, PageCountPolicy,
    ProcessorConfig, ProgressCallback, RunSummary, UploadMode, DEFAULT_MODEL,
};
use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{error, info};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

fn shorten(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        let cut: String = s.chars().take(max_chars - 1).collect();
        format!("{cut}\u{2026}")
    } else {
        s.to_string()
    }
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar over the batch plus a log line per
/// finished document.
struct CliProgressCallback {
    bar: ProgressBar,
    started: Mutex<Option<Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>2}/{len} standards  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Converting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            started: Mutex::new(None),
        })
    }

    fn elapsed(&self) -> String {
        let secs = self
            .started
            .lock()
            .ok()
            .and_then(|mut s| s.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        dim(&format!("{secs:.1}s"))
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_documents: usize) {
        self.bar.set_length(total_documents as u64);
        self.bar.reset_eta();
    }

    fn on_document_start(&self, id: &str, file_name: &str, _position: usize, _total: usize) {
        if let Ok(mut s) = self.started.lock() {
            *s = Some(Instant::now());
        }
        self.bar
            .set_message(format!("{id} {}", dim(&shorten(file_name, 40))));
    }

    fn on_document_complete(&self, id: &str, position: usize, total: usize) {
        self.bar.println(format!(
            "  {} {:>2}/{:<2}  {}  {}",
            green("✓"),
            position,
            total,
            id,
            self.elapsed()
        ));
        self.bar.inc(1);
    }

    fn on_document_error(&self, id: &str, position: usize, total: usize, kind: ErrorKind, error: &str) {
        self.bar.println(format!(
            "  {} {:>2}/{:<2}  {}  {}  {}  {}",
            red("✗"),
            position,
            total,
            id,
            red(&kind.to_string()),
            shorten(error, 80),
            self.elapsed()
        ));
        self.bar.inc(1);
    }

    fn on_document_skipped(&self, id: &str, position: usize, total: usize) {
        self.bar.println(format!(
            "  {} {:>2}/{:<2}  {}  {}",
            dim("↷"),
            position,
            total,
            id,
            dim("already processed")
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, _summary: &RunSummary) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert every standard in ./AAOIFI_Standards_Complete to ./json_standards
  export GEMINI_API_KEY=...
  pdf2json

  # Continue an interrupted run, skipping standards already written
  pdf2json --resume

  # Show what would be processed (no API key needed)
  pdf2json --dry-run

  # Rebuild standards_index.json from existing output (no API key needed)
  pdf2json --index-only

INPUT NAMING:
  Each PDF name must carry its standard number, e.g.
    معيار (1) المتاجرة في العملات.pdf
    معيار (12) الشركة (المشاركة) والشركات الحديثة.pdf
  Eastern Arabic-Indic digits and the forms معيار-12, المعيار-الشرعي-رقم-12,
  رقم-12 are also recognised. The number decides the ID: (7) → SS07.

EXIT STATUS:
  0  at least --min-success standards are done (written now or by an earlier run)
  1  no PDFs found, or fewer than --min-success standards done
  2  invalid configuration (e.g. GEMINI_API_KEY not set)

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key (required unless --dry-run / --index-only)
  GEMINI_MODEL            Override model ID
  RUST_LOG                Override log filter (e.g. aaoifi_pdf2json=debug)
  PDF2JSON_*              Every other flag, see --help
"#;

/// Convert AAOIFI Sharia standards PDFs to JSON using Google Gemini.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2json",
    version,
    about = "Convert AAOIFI Sharia standards PDFs to database-ready JSON using Google Gemini",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Directory holding the standards PDFs.
    #[arg(long, env = "PDF2JSON_INPUT_DIR", default_value = "AAOIFI_Standards_Complete")]
    input_dir: PathBuf,

    /// Directory for the SSxx.json files.
    #[arg(short, long, env = "PDF2JSON_OUTPUT_DIR", default_value = "json_standards")]
    output_dir: PathBuf,

    /// Directory for per-run log files.
    #[arg(long, env = "PDF2JSON_LOG_DIR", default_value = "logs")]
    log_dir: PathBuf,

    /// Progress file used by --resume.
    #[arg(long, env = "PDF2JSON_PROGRESS_FILE", default_value = "processing_progress.json")]
    progress_file: PathBuf,

    /// Standards index written after the run.
    #[arg(long, env = "PDF2JSON_INDEX_FILE", default_value = "standards_index.json")]
    index_file: PathBuf,

    /// Number of standards expected in the input directory.
    #[arg(long, env = "PDF2JSON_EXPECTED_COUNT", default_value_t = 61)]
    expected_count: u32,

    /// Output ID prefix.
    #[arg(long, env = "PDF2JSON_ID_PREFIX", default_value = "SS")]
    id_prefix: String,

    /// Files up to this size (MiB) are sent inline, larger ones are uploaded first.
    #[arg(long, env = "PDF2JSON_INLINE_THRESHOLD_MB", default_value_t = 10)]
    inline_threshold_mb: u64,

    /// Total extraction attempts per standard.
    #[arg(long, env = "PDF2JSON_MAX_ATTEMPTS", default_value_t = 3,
          value_parser = clap::value_parser!(u32).range(1..))]
    max_attempts: u32,

    /// Delay growth between attempts.
    #[arg(long, env = "PDF2JSON_BACKOFF", value_enum, default_value = "linear")]
    backoff: BackoffArg,

    /// Base delay between attempts in milliseconds.
    #[arg(long, env = "PDF2JSON_RETRY_DELAY_MS", default_value_t = 5000)]
    retry_delay_ms: u64,

    /// Gemini model ID.
    #[arg(long, env = "GEMINI_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Gemini API key.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Gemini API base URL.
    #[arg(long, env = "PDF2JSON_API_BASE_URL", default_value = DEFAULT_API_BASE_URL)]
    api_base_url: String,

    /// Per-request timeout in seconds.
    #[arg(long, env = "PDF2JSON_API_TIMEOUT", default_value_t = 600)]
    api_timeout: u64,

    /// Sampling temperature (0.0–2.0).
    #[arg(long, env = "PDF2JSON_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// What to do when extracted pages disagree with the PDF's page count.
    #[arg(long, env = "PDF2JSON_PAGE_COUNT_POLICY", value_enum, default_value = "reject")]
    page_count_policy: PageCountArg,

    /// Minimum standards done for a zero exit status.
    #[arg(long, env = "PDF2JSON_MIN_SUCCESS", default_value_t = 1)]
    min_success: usize,

    /// Skip standards already recorded in the progress file with output present.
    #[arg(long, env = "PDF2JSON_RESUME")]
    resume: bool,

    /// List the processing plan and exit.
    #[arg(long)]
    dry_run: bool,

    /// Only rebuild the standards index from existing output.
    #[arg(long, conflicts_with = "dry_run")]
    index_only: bool,

    /// Do not write the standards index after the run.
    #[arg(long, env = "PDF2JSON_NO_INDEX")]
    no_index: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDF2JSON_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2JSON_VERBOSE")]
    verbose: bool,

    /// Suppress all terminal output except errors.
    #[arg(short, long, env = "PDF2JSON_QUIET", conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum BackoffArg {
    Fixed,
    Linear,
    Exponential,
}

impl From<BackoffArg> for BackoffPolicy {
    fn from(v: BackoffArg) -> Self {
        match v {
            BackoffArg::Fixed => BackoffPolicy::Fixed,
            BackoffArg::Linear => BackoffPolicy::Linear,
            BackoffArg::Exponential => BackoffPolicy::Exponential,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum PageCountArg {
    Reject,
    Warn,
}

impl From<PageCountArg> for PageCountPolicy {
    fn from(v: PageCountArg) -> Self {
        match v {
            PageCountArg::Reject => PageCountPolicy::Reject,
            PageCountArg::Warn => PageCountPolicy::Warn,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run_cli(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("{} {:#}", red("error:"), e);
            ExitCode::from(2)
        }
    }
}

async fn run_cli(cli: Cli) -> Result<ExitCode> {
    let show_progress = !cli.quiet && !cli.no_progress && !cli.dry_run && !cli.index_only;
    let log_path = init_logging(&cli, show_progress);
    if let Some(ref p) = log_path {
        info!("Log file: {}", p.display());
    }

    let config = build_config(&cli).context("Invalid configuration")?;

    // ── Index-only mode ──────────────────────────────────────────────────
    if cli.index_only {
        let index = write_index(&config)
            .await
            .context("Failed to write standards index")?;
        if !cli.quiet {
            eprintln!(
                "{} {} standards indexed  →  {}",
                green("✔"),
                bold(&index.total_standards.to_string()),
                config.index_file.display()
            );
        }
        return Ok(ExitCode::SUCCESS);
    }

    // ── Dry run ──────────────────────────────────────────────────────────
    if cli.dry_run {
        let (planned, skipped) = plan(&config).context("Failed to scan input directory")?;
        if planned.is_empty() {
            print_naming_hint(&config.input_dir, config.expected_count);
            return Ok(ExitCode::from(1));
        }
        println!("{:>3}  {:<5}  {:>10}  {:<17}  File", "#", "ID", "Size", "Upload");
        for p in &planned {
            let mode = match p.mode {
                UploadMode::Inline => "inline".to_string(),
                UploadMode::HostedReference => "hosted reference".to_string(),
            };
            let note = if p.already_processed { dim("  (done)") } else { String::new() };
            println!(
                "{:>3}  {:<5}  {:>10}  {:<17}  {}{}",
                p.index,
                p.id,
                format_size(p.size_bytes),
                mode,
                p.file_name,
                note
            );
        }
        for s in &skipped {
            println!("{}  {}  {}", yellow("skip"), s.file_name, dim(&s.reason));
        }
        println!(
            "\n{} to process, {} skipped, {} expected",
            planned.len(),
            skipped.len(),
            config.expected_count
        );
        return Ok(ExitCode::SUCCESS);
    }

    // ── Full run ─────────────────────────────────────────────────────────
    let service = GeminiService::new(&config).context("Cannot start")?;

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };

    let summary = run(&config, &service, progress_cb.as_ref())
        .await
        .context("Run aborted")?;

    if summary.discovered == 0 && summary.skipped.is_empty() {
        print_naming_hint(&config.input_dir, config.expected_count);
        return Ok(ExitCode::from(1));
    }

    if !cli.quiet {
        print_summary(&summary, &config, log_path.as_deref());
    }

    if summary.discovered == 0 || summary.done() < config.min_success {
        Ok(ExitCode::from(1))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

/// Map CLI args to `ProcessorConfig`.
fn build_config(cli: &Cli) -> Result<ProcessorConfig> {
    let mut builder = ProcessorConfig::builder()
        .input_dir(&cli.input_dir)
        .output_dir(&cli.output_dir)
        .log_dir(&cli.log_dir)
        .progress_file(&cli.progress_file)
        .index_file(&cli.index_file)
        .expected_count(cli.expected_count)
        .id_prefix(&cli.id_prefix)
        .inline_threshold_mb(cli.inline_threshold_mb)
        .max_attempts(cli.max_attempts)
        .backoff(cli.backoff.clone().into())
        .retry_delay_ms(cli.retry_delay_ms)
        .model(&cli.model)
        .api_base_url(&cli.api_base_url)
        .api_timeout_secs(cli.api_timeout)
        .temperature(cli.temperature)
        .page_count_policy(cli.page_count_policy.clone().into())
        .min_success(cli.min_success)
        .resume(cli.resume)
        .write_index(!cli.no_index);

    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key);
    }

    Ok(builder.build()?)
}

/// Install the stderr layer and, when the log directory is writable, a
/// plain-text file layer at `<log_dir>/processing_<timestamp>.log`.
fn init_logging(cli: &Cli, show_progress: bool) -> Option<PathBuf> {
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // The bar gives all the feedback that matters; keep stderr for errors.
    let stderr_level = if cli.quiet || show_progress {
        LevelFilter::ERROR
    } else {
        LevelFilter::TRACE
    };
    let stderr_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_filter(stderr_level);

    let log_path = cli.log_dir.join(format!(
        "processing_{}.log",
        Local::now().format("%Y%m%d_%H%M%S")
    ));
    let file = std::fs::create_dir_all(&cli.log_dir).and_then(|_| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
    });
    let (file_layer, log_path) = match file {
        Ok(f) => (
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(f))),
            Some(log_path),
        ),
        Err(e) => {
            eprintln!(
                "{} cannot open log file {}: {}",
                yellow("warning:"),
                log_path.display(),
                e
            );
            (None, None)
        }
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    log_path
}

fn print_naming_hint(input_dir: &Path, expected: u32) {
    eprintln!(
        "{} no numbered PDF files found in {}",
        red("✘"),
        bold(&input_dir.display().to_string())
    );
    eprintln!("  Expected names like:");
    eprintln!("    معيار (1) ….pdf");
    eprintln!("    معيار (2) ….pdf");
    eprintln!("    …");
    eprintln!("    معيار ({expected}) ….pdf");
}

fn print_summary(summary: &RunSummary, config: &ProcessorConfig, log_path: Option<&Path>) {
    let rule = "═".repeat(60);
    eprintln!("\n{}", cyan(&rule));
    eprintln!("{}", bold("ملخص المعالجة - Processing Summary"));
    eprintln!("{}", cyan(&rule));
    eprintln!("  Discovered:   {}", summary.discovered);
    eprintln!("  {}    {}", green("Succeeded:"), summary.succeeded.len());
    if !summary.resumed.is_empty() {
        eprintln!("  Resumed:      {}", summary.resumed.len());
    }
    eprintln!("  {}      {}", yellow("Skipped:"), summary.skipped.len());
    eprintln!("  {}       {}", red("Failed:"), summary.failed.len());
    eprintln!(
        "  Tokens:       {} in  /  {} out",
        dim(&summary.total_input_tokens.to_string()),
        dim(&summary.total_output_tokens.to_string())
    );
    eprintln!(
        "  Duration:     {:.1}s",
        summary.total_duration_ms as f64 / 1000.0
    );

    if !summary.failed.is_empty() {
        eprintln!("\n  {}", bold("Failures:"));
        for f in &summary.failed {
            eprintln!(
                "    {} {:<5} {:<20} {}",
                red("✗"),
                f.id.as_deref().unwrap_or("-"),
                f.kind.to_string(),
                shorten(&f.file_name, 50)
            );
            eprintln!("          {}", dim(&shorten(&f.message, 100)));
        }
    }
    let discovery_skips: Vec<_> = summary.skipped.iter().filter(|s| s.id.is_none()).collect();
    if !discovery_skips.is_empty() {
        eprintln!("\n  {}", bold("Skipped files:"));
        for s in discovery_skips {
            eprintln!("    {} {}", yellow("↷"), s.file_name);
            eprintln!("          {}", dim(&s.reason));
        }
    }

    eprintln!("\n  Output:       {}", config.output_dir.display());
    if let Some(p) = log_path {
        eprintln!("  Log file:     {}", p.display());
    }
    eprintln!("{}", cyan(&rule));
}
