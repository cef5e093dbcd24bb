//! # summons-extract
//!
//! Find the summons inside a scanned legal filing and write those pages to a
//! standalone PDF.
//!
//! Court filings arrive as one long scan: a civil cover sheet, the summons,
//! the complaint, exhibits. Only the summons is needed downstream, and its
//! position varies from filing to filing. This crate OCRs the document in
//! chunks and asks an LLM after each chunk whether the summons has been seen
//! yet, so a summons on page 3 of a 300-page filing is found after 20 pages
//! of OCR instead of 300.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input     validate a local file, an upload buffer, or download a URL
//!  ├─ 2. Render    rasterise pages via pdfium (CPU-bound, spawn_blocking)
//!  ├─ 3. OCR       tesseract, one page at a time, `chunk_size` pages per chunk
//!  ├─ 4. Classify  LLM reads every page so far → start/end page or nothing
//!  └─ 5. Extract   lopdf copies the range into `<stem>-<id>-summons.pdf`
//! ```
//!
//! Jobs run on a bounded worker pool; their state lives in a
//! [`JobStatusStore`] that callers poll.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use summons_extract::{Dispatcher, ExtractionConfig, JobState, MemoryStatusStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Classifier credentials come from OPENAI_API_KEY / ANTHROPIC_API_KEY.
//!     let config = ExtractionConfig::default();
//!     let dispatcher = Dispatcher::new(config, Arc::new(MemoryStatusStore::new()));
//!
//!     let id = dispatcher.submit("filing.pdf", "openai").await?;
//!     let record = dispatcher.wait(&id, Duration::from_millis(500)).await?;
//!     match record.state {
//!         JobState::Completed => println!("summons at {:?}", record.result_path),
//!         JobState::CompletedNotFound => println!("no summons"),
//!         _ => eprintln!("failed: {}", record.message),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `summons` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! ## External Tools
//!
//! * **pdfium**: system library, or a directory given in `PDFIUM_LIB_PATH`.
//! * **tesseract**: on `PATH`, or set [`ExtractionConfig::tesseract_cmd`].

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod dispatch;
pub mod error;
pub mod job;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod runner;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder, Provider};
pub use dispatch::Dispatcher;
pub use error::{ClassifierError, SummonsError};
pub use job::{JobId, JobRecord, JobState, PageRange, PageRecord};
pub use pipeline::classify::{ClassifierBackend, LlmBackend, RangeClassifier};
pub use pipeline::extract::{LopdfExtractor, PageExtractor};
pub use pipeline::ocr::{PageTranscriber, TesseractTranscriber};
pub use pipeline::render::{ImageSource, PdfiumImageSource};
pub use progress::{JobProgressCallback, NoopProgressCallback, ProgressCallback};
pub use runner::ChunkedPipeline;
pub use store::{FileStatusStore, JobStatusStore, MemoryStatusStore};
