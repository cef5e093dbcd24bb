//! Page extraction: write the summons pages to a standalone PDF.
//!
//! The source document is loaded with `lopdf`, every page outside the range
//! is deleted and unreferenced objects are pruned. Fonts and images shared
//! with the kept pages survive untouched, so the output renders exactly like
//! the original pages.
//!
//! The file is written to `<output>.tmp` and renamed into place, so a
//! poller that sees `Completed` never opens a half-written PDF.

use crate::error::SummonsError;
use crate::job::PageRange;
use async_trait::async_trait;
use lopdf::Document;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Copies a contiguous page range of a PDF into a new file.
#[async_trait]
pub trait PageExtractor: Send + Sync {
    /// Extract `range` (zero-based, inclusive) from `source` into `output`.
    /// Returns the path actually written.
    async fn extract(
        &self,
        source: &Path,
        range: PageRange,
        output: &Path,
    ) -> Result<PathBuf, SummonsError>;
}

/// Production [`PageExtractor`] built on `lopdf`.
#[derive(Debug, Clone, Default)]
pub struct LopdfExtractor;

impl LopdfExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PageExtractor for LopdfExtractor {
    async fn extract(
        &self,
        source: &Path,
        range: PageRange,
        output: &Path,
    ) -> Result<PathBuf, SummonsError> {
        let source = source.to_path_buf();
        let output = output.to_path_buf();

        tokio::task::spawn_blocking(move || extract_blocking(&source, range, &output))
            .await
            .map_err(|e| SummonsError::Internal(format!("Extract task panicked: {}", e)))?
    }
}

fn extract_blocking(
    source: &Path,
    range: PageRange,
    output: &Path,
) -> Result<PathBuf, SummonsError> {
    let fail = |detail: String| SummonsError::ExtractionFailed {
        path: output.to_path_buf(),
        start: range.start() + 1,
        end: range.end() + 1,
        detail,
    };

    let mut doc = Document::load(source).map_err(|e| fail(format!("cannot load source: {e}")))?;
    let total = doc.get_pages().len();
    if range.end() >= total {
        return Err(fail(format!("document has only {total} pages")));
    }

    // lopdf numbers pages from 1.
    let drop: Vec<u32> = (0..total)
        .filter(|idx| !range.contains(*idx))
        .map(|idx| idx as u32 + 1)
        .collect();
    if !drop.is_empty() {
        doc.delete_pages(&drop);
        let pruned = doc.prune_objects();
        debug!("Dropped {} pages, pruned {} objects", drop.len(), pruned.len());
    }

    let kept = doc.get_pages().len();
    if kept != range.len() {
        return Err(fail(format!(
            "expected {} pages after extraction, found {kept}",
            range.len()
        )));
    }

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| fail(format!("cannot create {}: {e}", parent.display())))?;
    }

    let tmp = tmp_path(output);
    doc.save(&tmp)
        .map_err(|e| fail(format!("cannot write {}: {e}", tmp.display())))?;
    std::fs::rename(&tmp, output).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        fail(format!("cannot move output into place: {e}"))
    })?;

    info!("Extracted {} → {}", range, output.display());
    Ok(output.to_path_buf())
}

fn tmp_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Object, Stream};

    /// Build a text-only PDF whose page N shows the string `page-N`.
    fn synthetic_pdf(path: &Path, count: u32) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for n in 1..=count {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 24.into()]),
                    Operation::new("Td", vec![72.into(), 720.into()]),
                    Operation::new("Tj", vec![Object::string_literal(format!("page-{n}"))]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count as i64,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(path).unwrap();
    }

    fn page_texts(path: &Path) -> Vec<String> {
        let doc = Document::load(path).unwrap();
        doc.get_pages()
            .values()
            .map(|id| String::from_utf8_lossy(&doc.get_page_content(*id).unwrap()).into_owned())
            .collect()
    }

    #[tokio::test]
    async fn keeps_only_the_requested_pages_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("case.pdf");
        let out = dir.path().join("out").join("case-summons.pdf");
        synthetic_pdf(&src, 6);

        let written = LopdfExtractor::new()
            .extract(&src, PageRange::new(1, 3).unwrap(), &out)
            .await
            .unwrap();

        assert_eq!(written, out);
        assert!(!tmp_path(&out).exists());
        let texts = page_texts(&out);
        assert_eq!(texts.len(), 3);
        for (text, n) in texts.iter().zip(2..=4) {
            assert!(text.contains(&format!("page-{n}")), "got {text}");
        }
    }

    #[tokio::test]
    async fn single_page_range() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("case.pdf");
        let out = dir.path().join("one.pdf");
        synthetic_pdf(&src, 3);

        LopdfExtractor::new()
            .extract(&src, PageRange::new(2, 2).unwrap(), &out)
            .await
            .unwrap();
        let texts = page_texts(&out);
        assert_eq!(texts.len(), 1);
        assert!(texts[0].contains("page-3"));
    }

    #[tokio::test]
    async fn range_past_end_fails_without_output() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("case.pdf");
        let out = dir.path().join("bad.pdf");
        synthetic_pdf(&src, 2);

        let err = LopdfExtractor::new()
            .extract(&src, PageRange::new(1, 4).unwrap(), &out)
            .await
            .unwrap_err();
        match err {
            SummonsError::ExtractionFailed { start, end, .. } => assert_eq!((start, end), (2, 5)),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!out.exists());
    }

    #[test]
    fn tmp_path_appends_suffix() {
        assert_eq!(
            tmp_path(Path::new("/x/a-summons.pdf")),
            PathBuf::from("/x/a-summons.pdf.tmp")
        );
    }
}
