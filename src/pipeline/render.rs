//! PDF rasterisation: render every page to a `DynamicImage` via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which uses thread-local
//! state internally and is not safe to call from async contexts.
//! `tokio::task::spawn_blocking` moves the work onto the blocking pool so the
//! worker tasks of other jobs keep running while one document renders.

use crate::config::ExtractionConfig;
use crate::error::SummonsError;
use async_trait::async_trait;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Converts a PDF into its ordered page images.
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Render all pages, in document order.
    async fn render(&self, pdf_path: &Path) -> Result<Vec<DynamicImage>, SummonsError>;
}

/// Production [`ImageSource`] backed by pdfium.
#[derive(Debug, Clone)]
pub struct PdfiumImageSource {
    dpi: u32,
    max_pixels: u32,
    password: Option<String>,
    library_path: Option<PathBuf>,
}

impl PdfiumImageSource {
    pub fn new(config: &ExtractionConfig) -> Self {
        Self {
            dpi: config.dpi,
            max_pixels: config.max_rendered_pixels,
            password: config.password.clone(),
            library_path: std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from),
        }
    }
}

#[async_trait]
impl ImageSource for PdfiumImageSource {
    async fn render(&self, pdf_path: &Path) -> Result<Vec<DynamicImage>, SummonsError> {
        let path = pdf_path.to_path_buf();
        let dpi = self.dpi;
        let max_pixels = self.max_pixels;
        let password = self.password.clone();
        let library_path = self.library_path.clone();

        tokio::task::spawn_blocking(move || {
            let pdfium = bind_pdfium(library_path.as_deref())?;
            render_pages_blocking(&pdfium, &path, dpi, max_pixels, password.as_deref())
        })
        .await
        .map_err(|e| SummonsError::Internal(format!("Render task panicked: {}", e)))?
    }
}

/// Bind to the pdfium library, preferring an explicit directory.
fn bind_pdfium(library_dir: Option<&Path>) -> Result<Pdfium, SummonsError> {
    let bindings = match library_dir {
        Some(dir) => {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir))
        }
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| SummonsError::PdfiumBindingFailed(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}

/// Blocking implementation of page rendering.
fn render_pages_blocking(
    pdfium: &Pdfium,
    pdf_path: &Path,
    dpi: u32,
    max_pixels: u32,
    password: Option<&str>,
) -> Result<Vec<DynamicImage>, SummonsError> {
    let document = pdfium
        .load_pdf_from_file(pdf_path, password)
        .map_err(|e| classify_load_error(pdf_path, password, format!("{:?}", e)))?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("PDF loaded: {} pages", total_pages);

    // PDF user space is 72 units per inch.
    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(dpi as f32 / 72.0)
        .set_maximum_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let mut images = Vec::with_capacity(total_pages);
    for (idx, page) in pages.iter().enumerate() {
        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            SummonsError::RasterisationFailed {
                page: idx + 1,
                detail: format!("{:?}", e),
            }
        })?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );
        images.push(image);
    }

    Ok(images)
}

/// Map a pdfium load failure onto the most helpful error variant.
fn classify_load_error(pdf_path: &Path, password: Option<&str>, detail: String) -> SummonsError {
    if detail.contains("Password") || detail.contains("password") {
        if password.is_some() {
            SummonsError::WrongPassword {
                path: pdf_path.to_path_buf(),
            }
        } else {
            SummonsError::PasswordRequired {
                path: pdf_path.to_path_buf(),
            }
        }
    } else {
        SummonsError::CorruptPdf {
            path: pdf_path.to_path_buf(),
            detail,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_errors_are_distinguished() {
        let p = Path::new("/tmp/locked.pdf");
        assert!(matches!(
            classify_load_error(p, None, "PdfiumLibraryInternalError(PasswordError)".into()),
            SummonsError::PasswordRequired { .. }
        ));
        assert!(matches!(
            classify_load_error(p, Some("x"), "PasswordError".into()),
            SummonsError::WrongPassword { .. }
        ));
        assert!(matches!(
            classify_load_error(p, None, "FormatError".into()),
            SummonsError::CorruptPdf { .. }
        ));
    }

    #[test]
    fn source_takes_limits_from_config() {
        let config = ExtractionConfig::builder()
            .dpi(150)
            .max_rendered_pixels(1800)
            .password("secret")
            .build()
            .unwrap();
        let source = PdfiumImageSource::new(&config);
        assert_eq!(source.dpi, 150);
        assert_eq!(source.max_pixels, 1800);
        assert_eq!(source.password.as_deref(), Some("secret"));
    }
}
