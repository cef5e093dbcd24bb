//! CLI binary for summons-extract.
//!
//! A thin shim over the library crate: maps flags onto `ExtractionConfig`,
//! submits jobs through the `Dispatcher` and reports how they ended.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use summons_extract::{
    Dispatcher, ExtractionConfig, FileStatusStore, JobId, JobProgressCallback, JobRecord,
    JobState, JobStatusStore, MemoryStatusStore, Provider,
};
use tracing_subscriber::EnvFilter;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// One bar for all jobs: its length grows by each document's page count as
/// rendering finishes, and a job that stops early credits its unread pages.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>4}/{len} pages  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(style);
        bar.set_prefix("Scanning");
        bar.set_message("rendering…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self { bar })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl JobProgressCallback for CliProgressCallback {
    fn on_job_start(&self, _job: &JobId, total_pages: usize) {
        self.bar.inc_length(total_pages as u64);
        self.bar.set_message("OCR…");
    }

    fn on_page_transcribed(&self, _job: &JobId, _page_num: usize, _total_pages: usize) {
        self.bar.inc(1);
    }

    fn on_chunk_classified(&self, _job: &JobId, chunk_index: usize, found: bool) {
        self.bar.set_message(if found {
            "summons found, extracting…".to_string()
        } else {
            format!("chunk {} classified", chunk_index + 1)
        });
    }

    fn on_job_finished(&self, record: &JobRecord) {
        let unread = record.pages_total.saturating_sub(record.pages_transcribed);
        self.bar.inc(unread as u64);
        self.bar.println(format!("  {}", outcome_line(record)));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract the summons next to the source file (filing-<job id>-summons.pdf)
  summons extract filing.pdf

  # Use Anthropic and write into ./out
  summons extract --provider anthropic -o out filing.pdf

  # From a URL
  summons extract https://court.example/docket/123/filing.pdf -o out

  # Every PDF in a directory, four at a time
  summons batch ./inbox ./summonses --workers 4

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY      OpenAI API key
  ANTHROPIC_API_KEY   Anthropic API key
  TESSERACT_CMD       tesseract executable (default: tesseract on PATH)
  PDFIUM_LIB_PATH     Directory containing libpdfium
  RUST_LOG            Log filter, overrides --verbose / --quiet
"#;

/// Extract the summons pages from scanned legal filings.
#[derive(Parser, Debug)]
#[command(
    name = "summons",
    version,
    about = "Extract the summons pages from scanned legal filings",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process one PDF (local path or HTTP/HTTPS URL).
    Extract {
        /// Local PDF file path or HTTP/HTTPS URL.
        input: String,

        /// Directory for the extracted PDF. Default: next to the source.
        #[arg(short, long, env = "SUMMONS_OUTPUT_DIR")]
        output: Option<PathBuf>,

        #[command(flatten)]
        opts: RunOpts,
    },
    /// Process every `*.pdf` in a directory.
    Batch {
        /// Directory containing the filings.
        input_dir: PathBuf,

        /// Directory for the extracted PDFs.
        output_dir: PathBuf,

        #[command(flatten)]
        opts: RunOpts,
    },
}

#[derive(Args, Debug)]
struct RunOpts {
    /// Classifier provider: openai or anthropic.
    #[arg(long, env = "SUMMONS_PROVIDER", default_value = "openai")]
    provider: String,

    /// Model ID for the chosen provider.
    #[arg(long, env = "SUMMONS_MODEL")]
    model: Option<String>,

    /// Pages transcribed before each classification.
    #[arg(long, env = "SUMMONS_CHUNK_SIZE", default_value_t = 20)]
    chunk_size: usize,

    /// Jobs processed concurrently.
    #[arg(short, long, env = "SUMMONS_WORKERS", default_value_t = 4)]
    workers: usize,

    /// Rendering DPI for OCR (72–400).
    #[arg(long, env = "SUMMONS_DPI", default_value_t = 200,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// tesseract executable.
    #[arg(long, env = "TESSERACT_CMD", default_value = "tesseract")]
    tesseract: String,

    /// tesseract language pack(s), e.g. eng or eng+spa.
    #[arg(long, env = "SUMMONS_OCR_LANG", default_value = "eng")]
    ocr_language: String,

    /// PDF user password for encrypted filings.
    #[arg(long, env = "SUMMONS_PASSWORD")]
    password: Option<String>,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "SUMMONS_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Retries per classifier call on transport failure.
    #[arg(long, env = "SUMMONS_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Per-call classifier timeout in seconds.
    #[arg(long, env = "SUMMONS_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "SUMMONS_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Keep job status as JSON files in this directory.
    #[arg(long, env = "SUMMONS_STATUS_DIR")]
    status_dir: Option<PathBuf>,

    /// Print final job records as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "SUMMONS_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "SUMMONS_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "SUMMONS_QUIET")]
    quiet: bool,
}

impl RunOpts {
    fn show_progress(&self) -> bool {
        !self.quiet && !self.no_progress && !self.json
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let opts = match &cli.command {
        Command::Extract { opts, .. } | Command::Batch { opts, .. } => opts,
    };

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level lifecycle logs.
    let filter = if opts.verbose {
        "debug"
    } else if opts.quiet || opts.show_progress() {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Extract {
            input,
            output,
            opts,
        } => run_extract(&input, output, &opts).await,
        Command::Batch {
            input_dir,
            output_dir,
            opts,
        } => run_batch(&input_dir, output_dir, &opts).await,
    }
}

async fn run_extract(input: &str, output: Option<PathBuf>, opts: &RunOpts) -> Result<ExitCode> {
    let progress = opts.show_progress().then(CliProgressCallback::new);
    let dispatcher = build_dispatcher(opts, output, progress.clone()).await?;

    let id = dispatcher
        .submit_input(input, &opts.provider)
        .await
        .with_context(|| format!("Cannot submit '{input}'"))?;
    let record = dispatcher
        .wait(&id, POLL_INTERVAL)
        .await
        .context("Lost track of job")?;
    dispatcher.drain().await;

    if let Some(cb) = &progress {
        cb.finish();
    }
    if opts.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&record).context("Failed to serialise job record")?
        );
    } else if !opts.quiet && progress.is_none() {
        eprintln!("{}", outcome_line(&record));
    }

    Ok(exit_code(&[record]))
}

async fn run_batch(input_dir: &Path, output_dir: PathBuf, opts: &RunOpts) -> Result<ExitCode> {
    let documents = list_pdfs(input_dir)?;
    if documents.is_empty() {
        if !opts.quiet {
            eprintln!("No PDF files in {}", input_dir.display());
        }
        return Ok(ExitCode::SUCCESS);
    }

    let progress = opts.show_progress().then(CliProgressCallback::new);
    let dispatcher = build_dispatcher(opts, Some(output_dir), progress.clone()).await?;

    let mut ids = Vec::with_capacity(documents.len());
    let mut rejected = 0usize;
    for doc in &documents {
        match dispatcher.submit(doc, &opts.provider).await {
            Ok(id) => ids.push(id),
            Err(e) => {
                rejected += 1;
                eprintln!("  {} {}  {}", red("✗"), doc.display(), red(&e.to_string()));
            }
        }
    }

    dispatcher.drain().await;
    if let Some(cb) = &progress {
        cb.finish();
    }

    let mut records = Vec::with_capacity(ids.len());
    for id in &ids {
        records.push(dispatcher.status(id).await.context("Cannot read job status")?);
    }

    if opts.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&records).context("Failed to serialise job records")?
        );
    } else if !opts.quiet {
        if progress.is_none() {
            for record in &records {
                eprintln!("  {}", outcome_line(record));
            }
        }
        let found = records
            .iter()
            .filter(|r| r.state == JobState::Completed)
            .count();
        let failed = records.iter().filter(|r| r.state == JobState::Failed).count();
        eprintln!(
            "{} {} files  {} extracted  {} not found  {} failed  {} rejected",
            if failed + rejected == 0 {
                green("✔")
            } else {
                yellow("⚠")
            },
            bold(&documents.len().to_string()),
            found,
            records.len() - found - failed,
            failed,
            rejected,
        );
    }

    let code = exit_code(&records);
    if rejected > 0 {
        return Ok(ExitCode::FAILURE);
    }
    Ok(code)
}

/// Map CLI args to `ExtractionConfig` and a store.
async fn build_dispatcher(
    opts: &RunOpts,
    output_dir: Option<PathBuf>,
    progress: Option<Arc<CliProgressCallback>>,
) -> Result<Dispatcher> {
    let provider: Provider = opts.provider.parse()?;

    let mut builder = ExtractionConfig::builder()
        .chunk_size(opts.chunk_size)
        .workers(opts.workers)
        .dpi(opts.dpi)
        .tesseract_cmd(&opts.tesseract)
        .ocr_language(&opts.ocr_language)
        .max_retries(opts.max_retries)
        .api_timeout_secs(opts.api_timeout)
        .download_timeout_secs(opts.download_timeout);

    if let Some(model) = &opts.model {
        builder = match provider {
            Provider::OpenAi => builder.openai_model(model),
            Provider::Anthropic => builder.anthropic_model(model),
        };
    }
    if let Some(pwd) = &opts.password {
        builder = builder.password(pwd);
    }
    if let Some(path) = &opts.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(dir) = output_dir {
        builder = builder.output_dir(dir);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    let config = builder.build().context("Invalid configuration")?;

    let store: Arc<dyn JobStatusStore> = match &opts.status_dir {
        Some(dir) => Arc::new(
            FileStatusStore::open(dir)
                .await
                .with_context(|| format!("Cannot open status directory {:?}", dir))?,
        ),
        None => Arc::new(MemoryStatusStore::new()),
    };

    Ok(Dispatcher::new(config, store))
}

/// `*.pdf` files directly inside `dir`, sorted by name.
fn list_pdfs(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("Cannot read directory {:?}", dir))?;
    let mut pdfs: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
        })
        .collect();
    pdfs.sort();
    Ok(pdfs)
}

fn outcome_line(record: &JobRecord) -> String {
    let name = record
        .source_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| record.id.to_string());
    match record.state {
        JobState::Completed => format!(
            "{} {}  →  {}",
            green("✓"),
            name,
            bold(
                &record
                    .result_path
                    .as_deref()
                    .unwrap_or(record.output_path.as_path())
                    .display()
                    .to_string()
            )
        ),
        JobState::CompletedNotFound => format!(
            "{} {}  {}",
            yellow("∅"),
            name,
            dim(&format!("no summons in {} pages", record.pages_total))
        ),
        JobState::Failed => format!(
            "{} {}  {}",
            red("✗"),
            name,
            red(record.error.as_deref().unwrap_or(&record.message))
        ),
        _ => format!("{} {}  {}", dim("…"), name, record.message),
    }
}

/// 1 when any job failed, 0 otherwise ("not found" is a success).
fn exit_code(records: &[JobRecord]) -> ExitCode {
    if records.iter().any(|r| r.state == JobState::Failed) {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
