//! Error types for the summons-extract library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`SummonsError`] is **fatal**: the submission is rejected outright (bad
//!   file, unknown provider) or a running job cannot continue (corrupt PDF,
//!   OCR crash, classifier unreachable). Submission errors are returned
//!   synchronously from [`crate::dispatch::Dispatcher`]; run-time errors are
//!   caught by the pipeline and recorded as a `Failed` job.
//!
//! * [`ClassifierError`] is raised by the range classifier. Whether it is
//!   fatal depends on the variant: a transport failure ends the job, a
//!   malformed response only means "no match in this chunk".

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the summons-extract library.
#[derive(Debug, Error)]
pub enum SummonsError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// The requested classifier provider is not one we know about.
    #[error("Unsupported provider '{name}' (expected one of: openai, anthropic)")]
    UnsupportedProvider { name: String },

    // ── Conversion errors ─────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Install libpdfium or set PDFIUM_LIB_PATH to the directory that contains it."
    )]
    PdfiumBindingFailed(String),

    // ── Transcription errors ──────────────────────────────────────────────
    /// OCR failed on a page; the job cannot continue without its text.
    #[error("OCR failed on page {page}: {detail}")]
    TranscriptionFailed { page: usize, detail: String },

    // ── Classification errors ─────────────────────────────────────────────
    /// The classification backend could not be reached or refused the call.
    #[error("Classifier '{provider}' unavailable: {detail}")]
    ClassifierTransport { provider: String, detail: String },

    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Extraction errors ─────────────────────────────────────────────────
    /// A range was found but the output PDF could not be produced.
    #[error("Failed to extract pages {start}-{end} into '{path}': {detail}")]
    ExtractionFailed {
        path: PathBuf,
        start: usize,
        end: usize,
        detail: String,
    },

    // ── Store / result errors ─────────────────────────────────────────────
    /// The job status store rejected a read or write.
    #[error("Job status store error: {0}")]
    StoreFailed(String),

    /// A result file was requested but does not exist.
    #[error("Result file not found: '{path}'")]
    ResultNotFound { path: PathBuf },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SummonsError {
    /// True for errors that reject a submission before any job exists.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            SummonsError::FileNotFound { .. }
                | SummonsError::PermissionDenied { .. }
                | SummonsError::InvalidInput { .. }
                | SummonsError::DownloadFailed { .. }
                | SummonsError::DownloadTimeout { .. }
                | SummonsError::NotAPdf { .. }
                | SummonsError::UnsupportedProvider { .. }
        )
    }
}

/// Errors raised by the page-range classifier.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClassifierError {
    /// The backend could not run the classification at all (HTTP error,
    /// connection refused, timeout, missing credentials).
    #[error("{provider} backend unavailable: {detail}")]
    Transport { provider: String, detail: String },

    /// The backend answered, but not with a usable page range.
    #[error("malformed classifier response: {detail}")]
    MalformedResponse { detail: String },

    /// No backend is registered for the requested provider.
    #[error("no classifier backend registered for provider '{provider}'")]
    UnsupportedProvider { provider: String },
}

impl From<ClassifierError> for SummonsError {
    fn from(err: ClassifierError) -> Self {
        match err {
            ClassifierError::Transport { provider, detail } => {
                SummonsError::ClassifierTransport { provider, detail }
            }
            ClassifierError::UnsupportedProvider { provider } => {
                SummonsError::ProviderNotConfigured {
                    provider,
                    hint: "No classifier backend is registered for it.".to_string(),
                }
            }
            ClassifierError::MalformedResponse { detail } => SummonsError::Internal(format!(
                "malformed classifier response escaped the pipeline: {detail}"
            )),
        }
    }
}
