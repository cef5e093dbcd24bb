//! Input resolution: turn a user-supplied path, URL or upload buffer into a
//! validated local PDF that a queued job can open later.
//!
//! Unlike a one-shot conversion, a submitted job may sit in the worker queue
//! for a while, so downloads and uploads are written into the work directory
//! and kept rather than living in a `TempDir` that drops with the caller.
//! Every path returned here has passed the `%PDF` magic check.

use crate::error::SummonsError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::Builder;
use tracing::{debug, info};

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Directory for downloaded and uploaded documents.
pub fn default_work_dir() -> PathBuf {
    std::env::temp_dir().join("summons-extract")
}

/// Resolve a path or URL to a local PDF.
pub async fn resolve_input(
    input: &str,
    work_dir: &Path,
    timeout_secs: u64,
) -> Result<PathBuf, SummonsError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(SummonsError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, work_dir, timeout_secs).await
    } else {
        validate_local(Path::new(input))
    }
}

/// Validate a local file: it must exist, be readable and start with `%PDF`.
pub fn validate_local(path: &Path) -> Result<PathBuf, SummonsError> {
    if !path.is_file() {
        return Err(SummonsError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let mut file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(SummonsError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(_) => {
            return Err(SummonsError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
    };

    let mut head = Vec::with_capacity(4);
    file.by_ref()
        .take(4)
        .read_to_end(&mut head)
        .map_err(|_| SummonsError::PermissionDenied {
            path: path.to_path_buf(),
        })?;
    check_magic(path, &head)?;

    debug!("Resolved local PDF: {}", path.display());
    Ok(path.to_path_buf())
}

/// Persist an uploaded buffer into `work_dir` and return its path.
///
/// The file keeps a random prefix so two uploads with the same name never
/// collide.
pub async fn persist_bytes(
    bytes: &[u8],
    file_name: &str,
    work_dir: &Path,
) -> Result<PathBuf, SummonsError> {
    let stem = sanitise_stem(file_name);
    check_magic(Path::new(file_name), bytes)?;

    tokio::fs::create_dir_all(work_dir)
        .await
        .map_err(|e| SummonsError::Internal(format!("cannot create work dir: {e}")))?;

    let dir = work_dir.to_path_buf();
    let data = bytes.to_vec();
    let path = tokio::task::spawn_blocking(move || -> Result<PathBuf, SummonsError> {
        let mut file = Builder::new()
            .prefix(&format!("{stem}-"))
            .suffix(".pdf")
            .tempfile_in(&dir)
            .map_err(|e| SummonsError::Internal(format!("cannot create upload file: {e}")))?;
        std::io::Write::write_all(&mut file, &data)
            .map_err(|e| SummonsError::Internal(format!("cannot write upload: {e}")))?;
        let (_, path) = file
            .keep()
            .map_err(|e| SummonsError::Internal(format!("cannot keep upload: {e}")))?;
        Ok(path)
    })
    .await
    .map_err(|e| SummonsError::Internal(format!("Upload task panicked: {}", e)))??;

    info!("Stored upload '{}' at {}", file_name, path.display());
    Ok(path)
}

/// Download a URL into `work_dir` and return the path.
async fn download_url(
    url: &str,
    work_dir: &Path,
    timeout_secs: u64,
) -> Result<PathBuf, SummonsError> {
    info!("Downloading PDF from: {}", url);

    let failed = |reason: String| SummonsError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            SummonsError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;
    persist_bytes(&bytes, &filename_from_url(url), work_dir).await
}

/// Last path segment of the URL, or `downloaded.pdf`.
fn filename_from_url(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|last| !last.is_empty() && last.contains('.'))
        .unwrap_or_else(|| "downloaded.pdf".to_string())
}

fn check_magic(path: &Path, head: &[u8]) -> Result<(), SummonsError> {
    if head.starts_with(PDF_MAGIC) {
        return Ok(());
    }
    let mut magic = [0u8; 4];
    let n = head.len().min(4);
    magic[..n].copy_from_slice(&head[..n]);
    Err(SummonsError::NotAPdf {
        path: path.to_path_buf(),
        magic,
    })
}

/// File stem reduced to characters safe in any file system.
fn sanitise_stem(file_name: &str) -> String {
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("upload");
    let clean: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if clean.is_empty() {
        "upload".to_string()
    } else {
        clean
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn local_validation() {
        let dir = tempfile::tempdir().unwrap();

        let missing = dir.path().join("missing.pdf");
        assert!(matches!(
            validate_local(&missing),
            Err(SummonsError::FileNotFound { .. })
        ));

        let text = dir.path().join("notes.pdf");
        std::fs::write(&text, b"hello world").unwrap();
        match validate_local(&text) {
            Err(SummonsError::NotAPdf { magic, .. }) => assert_eq!(&magic, b"hell"),
            other => panic!("unexpected: {other:?}"),
        }

        let tiny = dir.path().join("tiny.pdf");
        std::fs::write(&tiny, b"%P").unwrap();
        assert!(matches!(
            validate_local(&tiny),
            Err(SummonsError::NotAPdf { .. })
        ));

        let pdf = dir.path().join("ok.pdf");
        std::fs::write(&pdf, b"%PDF-1.7\n").unwrap();
        assert_eq!(validate_local(&pdf).unwrap(), pdf);
    }

    #[test]
    fn directory_is_not_a_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            validate_local(dir.path()),
            Err(SummonsError::FileNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn uploads_are_kept_with_unique_names() {
        let dir = tempfile::tempdir().unwrap();
        let a = persist_bytes(b"%PDF-1.4 a", "Case 12.pdf", dir.path())
            .await
            .unwrap();
        let b = persist_bytes(b"%PDF-1.4 b", "Case 12.pdf", dir.path())
            .await
            .unwrap();
        assert_ne!(a, b);
        assert!(a.file_name().unwrap().to_str().unwrap().starts_with("Case_12-"));
        assert_eq!(std::fs::read(&a).unwrap(), b"%PDF-1.4 a");
    }

    #[tokio::test]
    async fn upload_that_is_not_a_pdf_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = persist_bytes(b"GIF89a", "x.pdf", dir.path()).await.unwrap_err();
        assert!(matches!(err, SummonsError::NotAPdf { .. }));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn blank_input_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_input("  ", dir.path(), 5).await.unwrap_err();
        assert!(matches!(err, SummonsError::InvalidInput { .. }));
    }

    #[test]
    fn filename_from_url_falls_back() {
        assert_eq!(
            filename_from_url("https://court.example/files/complaint.pdf"),
            "complaint.pdf"
        );
        assert_eq!(filename_from_url("https://court.example/"), "downloaded.pdf");
    }
}
