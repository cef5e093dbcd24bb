//! OCR: turn one rendered page into text with the `tesseract` binary.
//!
//! Each page is PNG-encoded into a temp file and handed to a tesseract child
//! process that prints the recognised text to stdout. PNG is lossless; JPEG
//! artefacts around glyph edges measurably hurt recognition on scans.

use crate::config::ExtractionConfig;
use crate::error::SummonsError;
use async_trait::async_trait;
use image::{DynamicImage, ImageFormat};
use std::io::ErrorKind;
use tokio::process::Command;
use tracing::debug;

/// Converts a page image into text.
#[async_trait]
pub trait PageTranscriber: Send + Sync {
    /// `page_index` is zero-based and only used for error reporting.
    async fn transcribe(&self, page_index: usize, image: &DynamicImage)
        -> Result<String, SummonsError>;
}

/// Production [`PageTranscriber`] that shells out to tesseract.
#[derive(Debug, Clone)]
pub struct TesseractTranscriber {
    cmd: String,
    language: String,
    engine_mode: u8,
    page_segmentation: u8,
}

impl TesseractTranscriber {
    pub fn new(config: &ExtractionConfig) -> Self {
        Self {
            cmd: config.tesseract_cmd.clone(),
            language: config.ocr_language.clone(),
            engine_mode: config.ocr_engine_mode,
            page_segmentation: config.ocr_page_segmentation,
        }
    }

    /// Arguments after the input image path.
    fn args(&self) -> Vec<String> {
        vec![
            "stdout".to_string(),
            "-l".to_string(),
            self.language.clone(),
            "--oem".to_string(),
            self.engine_mode.to_string(),
            "--psm".to_string(),
            self.page_segmentation.to_string(),
        ]
    }
}

#[async_trait]
impl PageTranscriber for TesseractTranscriber {
    async fn transcribe(
        &self,
        page_index: usize,
        image: &DynamicImage,
    ) -> Result<String, SummonsError> {
        let page = page_index + 1;
        let fail = |detail: String| SummonsError::TranscriptionFailed { page, detail };

        // PNG encoding is CPU-bound; keep it off the async workers.
        let img = image.clone();
        let png = tokio::task::spawn_blocking(move || -> Result<_, String> {
            let file = tempfile::Builder::new()
                .prefix("summons-page-")
                .suffix(".png")
                .tempfile()
                .map_err(|e| format!("temp file: {e}"))?;
            img.save_with_format(file.path(), ImageFormat::Png)
                .map_err(|e| format!("PNG encoding: {e}"))?;
            Ok(file.into_temp_path())
        })
        .await
        .map_err(|e| SummonsError::Internal(format!("OCR encode task panicked: {}", e)))?
        .map_err(fail)?;

        let output = Command::new(&self.cmd)
            .arg(&*png)
            .args(self.args())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == ErrorKind::NotFound {
                    fail(format!(
                        "'{}' not found; install tesseract or set TESSERACT_CMD",
                        self.cmd
                    ))
                } else {
                    fail(format!("cannot run '{}': {e}", self.cmd))
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(fail(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!("OCR page {} → {} chars", page, text.len());
        Ok(text)
    }
}
