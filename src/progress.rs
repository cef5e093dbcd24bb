//! Progress-callback trait for per-job pipeline events.
//!
//! The status store is what remote pollers read; callbacks are for the
//! process that owns the dispatcher (a terminal progress bar, a metrics
//! hook, a test counter). Inject an [`Arc<dyn JobProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`].
//!
//! # Example
//!
//! ```rust
//! use summons_extract::{ExtractionConfig, JobId, JobProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct PageCounter(AtomicUsize);
//!
//! impl JobProgressCallback for PageCounter {
//!     fn on_page_transcribed(&self, _job: &JobId, _page_num: usize, _total_pages: usize) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(Arc::new(PageCounter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use crate::job::{JobId, JobRecord};
use std::sync::Arc;

/// Called by the pipeline as a job advances.
///
/// Several jobs run concurrently on the worker pool, so every method may be
/// called from different tasks at the same time. Events for any single job
/// arrive in order. All methods default to no-ops.
pub trait JobProgressCallback: Send + Sync {
    /// Called once the document has been rasterised.
    ///
    /// # Arguments
    /// * `total_pages`: number of pages that will be scanned at most
    fn on_job_start(&self, job: &JobId, total_pages: usize) {
        let _ = (job, total_pages);
    }

    /// Called after each page's OCR text has been recorded.
    ///
    /// # Arguments
    /// * `page_num`   : 1-indexed page number
    /// * `total_pages`: total pages in the document
    fn on_page_transcribed(&self, job: &JobId, page_num: usize, total_pages: usize) {
        let _ = (job, page_num, total_pages);
    }

    /// Called after each classification attempt.
    ///
    /// # Arguments
    /// * `chunk_index`: zero-based chunk number
    /// * `found`      : whether this attempt produced a usable range
    fn on_chunk_classified(&self, job: &JobId, chunk_index: usize, found: bool) {
        let _ = (job, chunk_index, found);
    }

    /// Called exactly once with the terminal record.
    fn on_job_finished(&self, record: &JobRecord) {
        let _ = record;
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl JobProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn JobProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobState;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        pages: AtomicUsize,
        chunks_found: AtomicUsize,
        finished: AtomicUsize,
    }

    impl JobProgressCallback for TrackingCallback {
        fn on_page_transcribed(&self, _job: &JobId, _page_num: usize, _total_pages: usize) {
            self.pages.fetch_add(1, Ordering::SeqCst);
        }

        fn on_chunk_classified(&self, _job: &JobId, _chunk_index: usize, found: bool) {
            if found {
                self.chunks_found.fetch_add(1, Ordering::SeqCst);
            }
        }

        fn on_job_finished(&self, record: &JobRecord) {
            assert!(record.state.is_terminal());
            self.finished.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        let id = JobId::new();
        cb.on_job_start(&id, 5);
        cb.on_page_transcribed(&id, 1, 5);
        cb.on_chunk_classified(&id, 0, false);
        cb.on_job_finished(&JobRecord::placeholder(id));
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        let id = JobId::new();

        for page in 1..=3 {
            tracker.on_page_transcribed(&id, page, 3);
        }
        tracker.on_chunk_classified(&id, 0, false);
        tracker.on_chunk_classified(&id, 1, true);

        let mut record = JobRecord::placeholder(id);
        record
            .transition(JobState::Completed, 100, "done")
            .unwrap();
        tracker.on_job_finished(&record);

        assert_eq!(tracker.pages.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.chunks_found.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.finished.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: Arc<dyn JobProgressCallback> = Arc::new(NoopProgressCallback);
        cb.on_job_start(&JobId::new(), 10);
    }
}
