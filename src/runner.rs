//! The chunked pipeline: one job, start to terminal state.
//!
//! ```text
//! render all pages
//!   └─ for each chunk of `chunk_size` pages (in order)
//!        ├─ transcribe each page, append cleaned text to the job's pages
//!        ├─ classify ALL pages seen so far with the job's provider
//!        └─ range found? → extract → Completed (stop)
//! no chunk matched → CompletedNotFound
//! ```
//!
//! The classifier always sees the full accumulated text, so a summons that
//! straddles a chunk boundary is still found once its last page has been
//! transcribed. Nothing inside a job runs concurrently.
//!
//! Every fatal error ends up in the job record as `Failed`; [`ChunkedPipeline::run`]
//! itself never returns an error.

use crate::config::{ExtractionConfig, Provider};
use crate::error::{ClassifierError, SummonsError};
use crate::job::{JobRecord, JobState, PageRange, PageRecord};
use crate::pipeline::classify::RangeClassifier;
use crate::pipeline::extract::{LopdfExtractor, PageExtractor};
use crate::pipeline::ocr::{PageTranscriber, TesseractTranscriber};
use crate::pipeline::postprocess::clean_ocr_text;
use crate::pipeline::render::{ImageSource, PdfiumImageSource};
use crate::store::JobStatusStore;
use image::DynamicImage;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

pub const MSG_CONVERTING: &str = "Converting PDF to images...";
pub const MSG_EXTRACTED: &str = "Summons extracted and PDF created.";
pub const MSG_NOT_FOUND: &str = "Summons not found. PDF processing completed.";

/// Runs jobs through render → OCR → classify → extract.
pub struct ChunkedPipeline {
    config: ExtractionConfig,
    images: Arc<dyn ImageSource>,
    transcriber: Arc<dyn PageTranscriber>,
    classifier: RangeClassifier,
    extractor: Arc<dyn PageExtractor>,
    store: Arc<dyn JobStatusStore>,
}

impl ChunkedPipeline {
    /// Assemble a pipeline from explicit stages.
    ///
    /// A config built by hand rather than through the builder may carry a
    /// zero `chunk_size` or `workers`; both are raised to 1.
    pub fn new(
        mut config: ExtractionConfig,
        images: Arc<dyn ImageSource>,
        transcriber: Arc<dyn PageTranscriber>,
        classifier: RangeClassifier,
        extractor: Arc<dyn PageExtractor>,
        store: Arc<dyn JobStatusStore>,
    ) -> Self {
        if config.chunk_size == 0 || config.workers == 0 {
            warn!(
                "chunk_size={} workers={} raised to at least 1",
                config.chunk_size, config.workers
            );
            config.chunk_size = config.chunk_size.max(1);
            config.workers = config.workers.max(1);
        }
        Self {
            config,
            images,
            transcriber,
            classifier,
            extractor,
            store,
        }
    }

    /// Production stages: pdfium, tesseract, `edgequake-llm`, lopdf.
    pub fn from_config(config: ExtractionConfig, store: Arc<dyn JobStatusStore>) -> Self {
        let images = Arc::new(PdfiumImageSource::new(&config));
        let transcriber = Arc::new(TesseractTranscriber::new(&config));
        let classifier = RangeClassifier::from_config(&config);
        Self::new(
            config,
            images,
            transcriber,
            classifier,
            Arc::new(LopdfExtractor::new()),
            store,
        )
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    pub fn classifier(&self) -> &RangeClassifier {
        &self.classifier
    }

    pub fn store(&self) -> &Arc<dyn JobStatusStore> {
        &self.store
    }

    /// Drive `record` to a terminal state and return the final snapshot.
    pub async fn run(&self, mut record: JobRecord) -> JobRecord {
        let started = Instant::now();
        info!(
            "Job {} started: {} ({})",
            record.id,
            record.source_path.display(),
            record.provider.map(|p| p.as_str()).unwrap_or("no provider")
        );

        match self.process(&mut record).await {
            Ok(()) => info!(
                "Job {} finished as {} in {}ms",
                record.id,
                record.state,
                started.elapsed().as_millis()
            ),
            Err(e) => {
                error!("Job {} failed: {}", record.id, e);
                let message = e.to_string();
                record.error = Some(message.clone());
                match record.transition(JobState::Failed, 100, message) {
                    Ok(()) => self.persist(&record).await,
                    Err(t) => error!("Job {}: {}", record.id, t),
                }
            }
        }

        self.config.progress_callback.on_job_finished(&record);
        record
    }

    async fn process(&self, record: &mut JobRecord) -> Result<(), SummonsError> {
        let provider = record
            .provider
            .ok_or_else(|| SummonsError::Internal(format!("job {} has no provider", record.id)))?;

        self.advance(record, JobState::ConvertingToImages, 0, MSG_CONVERTING)
            .await?;
        let images = self.images.render(&record.source_path).await?;
        let total = images.len();
        record.pages_total = total;
        self.config.progress_callback.on_job_start(&record.id, total);

        if total == 0 {
            warn!("Job {}: document has no pages", record.id);
            return self
                .advance(record, JobState::CompletedNotFound, 100, MSG_NOT_FOUND)
                .await;
        }

        let mut pages: Vec<PageRecord> = Vec::with_capacity(total);
        for (chunk_index, chunk) in images.chunks(self.config.chunk_size).enumerate() {
            let first = chunk_index * self.config.chunk_size;
            let last = first + chunk.len() - 1;

            self.transcribe_chunk(record, chunk, first, &mut pages).await?;

            let message = format!("Processing pages {}-{}...", first + 1, last + 1);
            self.advance(
                record,
                JobState::Classifying,
                percent(pages.len(), total),
                message,
            )
            .await?;

            let found = self.classify_chunk(record, provider, &pages).await?;
            record.chunks_classified = chunk_index + 1;
            self.config
                .progress_callback
                .on_chunk_classified(&record.id, chunk_index, found.is_some());

            if let Some(range) = found {
                info!("Job {}: summons on {}", record.id, range);
                let written = self
                    .extractor
                    .extract(&record.source_path, range, &record.output_path)
                    .await?;
                record.result_path = Some(written);
                return self
                    .advance(record, JobState::Completed, 100, MSG_EXTRACTED)
                    .await;
            }

            let message = record.message.clone();
            self.advance(
                record,
                JobState::Classifying,
                percent(pages.len(), total),
                message,
            )
            .await?;
        }

        self.advance(record, JobState::CompletedNotFound, 100, MSG_NOT_FOUND)
            .await
    }

    async fn transcribe_chunk(
        &self,
        record: &mut JobRecord,
        chunk: &[DynamicImage],
        first: usize,
        pages: &mut Vec<PageRecord>,
    ) -> Result<(), SummonsError> {
        let total = record.pages_total;
        let message = format!(
            "Applying OCR to pages {}-{}...",
            first + 1,
            first + chunk.len()
        );
        self.advance(
            record,
            JobState::Transcribing,
            percent(pages.len(), total),
            message.clone(),
        )
        .await?;

        for (offset, image) in chunk.iter().enumerate() {
            let page_index = first + offset;
            let raw = self.transcriber.transcribe(page_index, image).await?;
            let text = clean_ocr_text(&raw);
            debug!(
                "Job {}: page {} → {} chars",
                record.id,
                page_index + 1,
                text.len()
            );
            pages.push(PageRecord::new(page_index, text));

            record.pages_transcribed = pages.len();
            self.config
                .progress_callback
                .on_page_transcribed(&record.id, page_index + 1, total);
            self.advance(
                record,
                JobState::Transcribing,
                percent(pages.len(), total),
                message.clone(),
            )
            .await?;
        }
        Ok(())
    }

    /// A malformed reply counts as "no match in this chunk".
    async fn classify_chunk(
        &self,
        record: &JobRecord,
        provider: Provider,
        pages: &[PageRecord],
    ) -> Result<Option<PageRange>, SummonsError> {
        match self.classifier.classify(provider, pages).await {
            Ok(found) => Ok(found),
            Err(ClassifierError::MalformedResponse { detail }) => {
                warn!(
                    "Job {}: ignoring malformed {} response: {}",
                    record.id, provider, detail
                );
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn advance(
        &self,
        record: &mut JobRecord,
        state: JobState,
        progress: u8,
        message: impl Into<String>,
    ) -> Result<(), SummonsError> {
        record.transition(state, progress, message)?;
        self.persist(record).await;
        Ok(())
    }

    /// Store failures must not kill the job; the next write retries.
    async fn persist(&self, record: &JobRecord) {
        if let Err(e) = self.store.set(record.clone()).await {
            error!("Job {}: status write failed: {}", record.id, e);
        }
    }
}

/// `floor(done * 100 / total)`; the record caps it below 100.
fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    (done.saturating_mul(100) / total).min(100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_floors() {
        assert_eq!(percent(0, 45), 0);
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(20, 45), 44);
        assert_eq!(percent(45, 45), 100);
        assert_eq!(percent(3, 0), 0);
    }
}
