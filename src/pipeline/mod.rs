//! Pipeline stages for summons extraction.
//!
//! Each submodule implements exactly one capability behind a trait, so the
//! orchestrator in [`crate::runner`] never touches pdfium, tesseract or an
//! LLM SDK directly and tests can swap any stage for a stub.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ ocr ──▶ postprocess ──▶ classify ──▶ extract
//! (path/URL) (pdfium) (tesseract) (cleanup)    (LLM)       (lopdf)
//! ```
//!
//! 1. [`input`] validates a local file or downloads a URL
//! 2. [`render`] rasterises every page; runs in `spawn_blocking` because
//!    pdfium is not async-safe
//! 3. [`ocr`] runs one tesseract child process per page
//! 4. [`postprocess`] does deterministic OCR text cleanup
//! 5. [`classify`] asks the job's provider which pages hold the summons;
//!    the only stage with network I/O
//! 6. [`extract`] copies the chosen pages into a new PDF

pub mod classify;
pub mod extract;
pub mod input;
pub mod ocr;
pub mod postprocess;
pub mod render;
