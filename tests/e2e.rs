//! End-to-end tests against the real stages: pdfium, tesseract and live LLM
//! calls.
//!
//! They are gated behind the `E2E_ENABLED` environment variable so they do
//! not run in CI unless explicitly requested. Filings go in `./test_cases/`.
//!
//! Run with:
//!   E2E_ENABLED=1 OPENAI_API_KEY=sk-... cargo test --test e2e -- --nocapture
//!
//! To restrict to a specific test:
//!   E2E_ENABLED=1 cargo test --test e2e ocr_ -- --nocapture

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use summons_extract::{
    Dispatcher, ExtractionConfig, ImageSource, JobState, MemoryStatusStore, PageTranscriber,
    PdfiumImageSource, Provider, TesseractTranscriber,
};

// ── Test helpers ─────────────────────────────────────────────────────────────

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

fn output_dir() -> PathBuf {
    let d = test_cases_dir().join("output");
    std::fs::create_dir_all(&d).ok();
    d
}

/// Skip this test if E2E_ENABLED is not set *or* no PDF file at `path`.
macro_rules! e2e_skip_unless_ready {
    ($path:expr) => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        let p: PathBuf = $path;
        if !p.exists() {
            println!("SKIP: test file not found: {}", p.display());
            return;
        }
        p
    }};
}

fn has_key(var: &str) -> bool {
    std::env::var(var).map(|v| !v.is_empty()).unwrap_or(false)
}

// ── Stage checks ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn ocr_reads_a_rendered_page() {
    let pdf = e2e_skip_unless_ready!(test_cases_dir().join("summons_sample.pdf"));
    let config = ExtractionConfig::default();

    let images = PdfiumImageSource::new(&config)
        .render(&pdf)
        .await
        .expect("render");
    assert!(!images.is_empty());

    let text = TesseractTranscriber::new(&config)
        .transcribe(0, &images[0])
        .await
        .expect("tesseract");
    println!("page 1 OCR ({} chars):\n{}", text.len(), text);
    assert!(!text.trim().is_empty(), "OCR produced no text");
}

// ── Full jobs ────────────────────────────────────────────────────────────────

async fn run_job(provider: Provider, pdf: PathBuf) {
    let config = ExtractionConfig::builder()
        .output_dir(output_dir())
        .build()
        .unwrap();
    let dispatcher = Dispatcher::new(config, Arc::new(MemoryStatusStore::new()));

    let id = dispatcher
        .submit(&pdf, provider.as_str())
        .await
        .expect("submission accepted");
    let record = dispatcher
        .wait(&id, Duration::from_millis(500))
        .await
        .expect("status readable");

    println!("{}", serde_json::to_string_pretty(&record).unwrap());
    assert_eq!(record.state, JobState::Completed, "{}", record.message);
    let result = record.result_path.expect("result path");
    let bytes = dispatcher.read_result(&result).await.unwrap();
    assert!(bytes.starts_with(b"%PDF"));
    let pages = lopdf::Document::load_mem(&bytes).unwrap().get_pages().len();
    assert!(pages >= 1 && pages <= record.pages_total);
}

#[tokio::test]
async fn openai_finds_the_summons() {
    let pdf = e2e_skip_unless_ready!(test_cases_dir().join("summons_sample.pdf"));
    if !has_key("OPENAI_API_KEY") {
        println!("SKIP: OPENAI_API_KEY not set");
        return;
    }
    run_job(Provider::OpenAi, pdf).await;
}

#[tokio::test]
async fn anthropic_finds_the_summons() {
    let pdf = e2e_skip_unless_ready!(test_cases_dir().join("summons_sample.pdf"));
    if !has_key("ANTHROPIC_API_KEY") {
        println!("SKIP: ANTHROPIC_API_KEY not set");
        return;
    }
    run_job(Provider::Anthropic, pdf).await;
}

#[tokio::test]
async fn document_without_summons_is_not_found() {
    let pdf = e2e_skip_unless_ready!(test_cases_dir().join("no_summons.pdf"));
    if !has_key("OPENAI_API_KEY") {
        println!("SKIP: OPENAI_API_KEY not set");
        return;
    }

    let dispatcher = Dispatcher::new(
        ExtractionConfig::default(),
        Arc::new(MemoryStatusStore::new()),
    );
    let id = dispatcher.submit(&pdf, "openai").await.unwrap();
    let record = dispatcher
        .wait(&id, Duration::from_millis(500))
        .await
        .unwrap();

    assert_eq!(record.state, JobState::CompletedNotFound, "{}", record.message);
    assert!(record.result_path.is_none());
}
