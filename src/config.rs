//! Configuration types for summons extraction.
//!
//! Every knob of the dispatcher and the chunked pipeline lives in
//! [`ExtractionConfig`], built via its [`ExtractionConfigBuilder`]. One
//! struct is shared (cloned) across all worker tasks, so a job always runs
//! with the settings that were in force when the dispatcher was created.

use crate::error::SummonsError;
use crate::progress::{JobProgressCallback, NoopProgressCallback, ProgressCallback};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

/// Configuration for the extraction pipeline and its worker pool.
///
/// # Example
/// ```rust
/// use summons_extract::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .chunk_size(10)
///     .workers(2)
///     .openai_model("gpt-4.1-mini")
///     .build()
///     .unwrap();
/// assert_eq!(config.chunk_size, 10);
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Pages transcribed before each classification attempt. Default: 20.
    ///
    /// Smaller chunks stop earlier on documents whose summons sits near the
    /// front, at the cost of more classifier calls (each of which re-sends
    /// every page transcribed so far).
    pub chunk_size: usize,

    /// Maximum number of jobs processed concurrently. Default: 4.
    pub workers: usize,

    /// Rendering DPI used when rasterising pages for OCR. Range: 72–400. Default: 200.
    ///
    /// Tesseract accuracy drops sharply below ~150 DPI on scanned court
    /// filings; 200 keeps fine print legible without huge bitmaps.
    pub dpi: u32,

    /// Maximum rendered image dimension (width or height) in pixels. Default: 2500.
    pub max_rendered_pixels: u32,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Tesseract executable name or absolute path. Default: `tesseract`.
    pub tesseract_cmd: String,

    /// Tesseract language pack(s), e.g. `eng` or `eng+spa`. Default: `eng`.
    pub ocr_language: String,

    /// Tesseract `--oem` value. Default: 3 (default engine).
    pub ocr_engine_mode: u8,

    /// Tesseract `--psm` value. Default: 3 (fully automatic page segmentation).
    pub ocr_page_segmentation: u8,

    /// Model used when the job's provider is [`Provider::OpenAi`].
    pub openai_model: String,

    /// Model used when the job's provider is [`Provider::Anthropic`].
    pub anthropic_model: String,

    /// Sampling temperature for classification. Default: 0.0.
    pub temperature: f32,

    /// Maximum completion tokens per classification call. Default: 4096.
    pub max_tokens: usize,

    /// Retries on a classifier transport failure. Default: 3.
    ///
    /// Malformed responses are never retried; they already count as
    /// "nothing found in this chunk".
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-classifier-call timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Custom system prompt. If None, uses [`crate::prompts::DEFAULT_SYSTEM_PROMPT`].
    pub system_prompt: Option<String>,

    /// Directory for extracted PDFs. If None, output lands next to the source.
    pub output_dir: Option<PathBuf>,

    /// Directory where uploaded buffers and downloads are persisted.
    /// If None, the system temp directory is used.
    pub work_dir: Option<PathBuf>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Receives per-page and per-chunk events for every job.
    pub progress_callback: ProgressCallback,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            chunk_size: 20,
            workers: 4,
            dpi: 200,
            max_rendered_pixels: 2500,
            password: None,
            tesseract_cmd: "tesseract".to_string(),
            ocr_language: "eng".to_string(),
            ocr_engine_mode: 3,
            ocr_page_segmentation: 3,
            openai_model: Provider::OpenAi.default_model().to_string(),
            anthropic_model: Provider::Anthropic.default_model().to_string(),
            temperature: 0.0,
            max_tokens: 4096,
            max_retries: 3,
            retry_backoff_ms: 500,
            api_timeout_secs: 120,
            system_prompt: None,
            output_dir: None,
            work_dir: None,
            download_timeout_secs: 120,
            progress_callback: Arc::new(NoopProgressCallback),
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("chunk_size", &self.chunk_size)
            .field("workers", &self.workers)
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("tesseract_cmd", &self.tesseract_cmd)
            .field("ocr_language", &self.ocr_language)
            .field("openai_model", &self.openai_model)
            .field("anthropic_model", &self.anthropic_model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("output_dir", &self.output_dir)
            .field("work_dir", &self.work_dir)
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Model identifier configured for `provider`.
    pub fn model_for(&self, provider: Provider) -> &str {
        match provider {
            Provider::OpenAi => &self.openai_model,
            Provider::Anthropic => &self.anthropic_model,
        }
    }
}

/// Builder for [`ExtractionConfig`].
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl fmt::Debug for ExtractionConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl ExtractionConfigBuilder {
    pub fn chunk_size(mut self, n: usize) -> Self {
        self.config.chunk_size = n;
        self
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.config.workers = n;
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn tesseract_cmd(mut self, cmd: impl Into<String>) -> Self {
        self.config.tesseract_cmd = cmd.into();
        self
    }

    pub fn ocr_language(mut self, lang: impl Into<String>) -> Self {
        self.config.ocr_language = lang.into();
        self
    }

    pub fn openai_model(mut self, model: impl Into<String>) -> Self {
        self.config.openai_model = model.into();
        self
    }

    pub fn anthropic_model(mut self, model: impl Into<String>) -> Self {
        self.config.anthropic_model = model.into();
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = Some(dir.into());
        self
    }

    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.work_dir = Some(dir.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: Arc<dyn JobProgressCallback>) -> Self {
        self.config.progress_callback = cb;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, SummonsError> {
        let c = &self.config;
        if c.chunk_size == 0 {
            return Err(SummonsError::InvalidConfig(
                "chunk size must be ≥ 1".into(),
            ));
        }
        if c.workers == 0 {
            return Err(SummonsError::InvalidConfig("workers must be ≥ 1".into()));
        }
        if c.tesseract_cmd.trim().is_empty() {
            return Err(SummonsError::InvalidConfig(
                "tesseract command must not be empty".into(),
            ));
        }
        if c.openai_model.is_empty() || c.anthropic_model.is_empty() {
            return Err(SummonsError::InvalidConfig(
                "model identifiers must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Which classification backend a job uses. Fixed for the job's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// OpenAI chat completions.
    OpenAi,
    /// Anthropic messages API.
    Anthropic,
}

impl Provider {
    /// Every supported provider, in display order.
    pub const ALL: [Provider; 2] = [Provider::OpenAi, Provider::Anthropic];

    /// Name understood by `edgequake_llm::ProviderFactory`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::OpenAi => "gpt-4.1-nano",
            Provider::Anthropic => "claude-3-5-haiku-latest",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = SummonsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" | "gpt" => Ok(Provider::OpenAi),
            "anthropic" | "claude" => Ok(Provider::Anthropic),
            other => Err(SummonsError::UnsupportedProvider {
                name: other.to_string(),
            }),
        }
    }
}
