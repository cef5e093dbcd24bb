//! Job submission and the bounded worker pool.
//!
//! [`Dispatcher::submit`] does all validation synchronously, so a bad path,
//! a non-PDF or an unknown provider is reported to the caller and no job is
//! ever created for it. Accepted jobs get a fresh [`JobId`], an
//! `Initializing` record in the store, and one detached task on the runtime.
//! At most `workers` pipelines hold a permit at once; the rest wait on the
//! semaphore in submission order.
//!
//! Jobs outlive the dispatcher: dropping it does not stop them, and each one
//! still runs to a terminal state. A worker that panics leaves its job
//! `Failed`. [`Dispatcher::drain`] waits for every job submitted so far.

use crate::config::{ExtractionConfig, Provider};
use crate::error::SummonsError;
use crate::job::{JobId, JobRecord, JobState};
use crate::pipeline::input;
use crate::runner::ChunkedPipeline;
use crate::store::JobStatusStore;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinError;
use tracing::{error, info};

pub struct Dispatcher {
    pipeline: Arc<ChunkedPipeline>,
    store: Arc<dyn JobStatusStore>,
    permits: Arc<Semaphore>,
    in_flight: Arc<InFlight>,
}

impl Dispatcher {
    /// Dispatcher over the production pipeline stages.
    pub fn new(config: ExtractionConfig, store: Arc<dyn JobStatusStore>) -> Self {
        Self::with_pipeline(ChunkedPipeline::from_config(config, store))
    }

    /// Dispatcher over an already-assembled pipeline.
    pub fn with_pipeline(pipeline: ChunkedPipeline) -> Self {
        let workers = pipeline.config().workers;
        let store = Arc::clone(pipeline.store());
        Self {
            pipeline: Arc::new(pipeline),
            store,
            permits: Arc::new(Semaphore::new(workers)),
            in_flight: Arc::new(InFlight::default()),
        }
    }

    pub fn store(&self) -> &Arc<dyn JobStatusStore> {
        &self.store
    }

    /// Validate a local PDF and queue a job for it.
    pub async fn submit(
        &self,
        document: impl AsRef<Path>,
        provider: &str,
    ) -> Result<JobId, SummonsError> {
        let provider = self.accept_provider(provider)?;
        let source = input::validate_local(document.as_ref())?;
        self.schedule(source, provider).await
    }

    /// Like [`submit`](Self::submit), but `input` may also be an HTTP(S) URL,
    /// which is downloaded into the work directory first.
    pub async fn submit_input(&self, input: &str, provider: &str) -> Result<JobId, SummonsError> {
        let provider = self.accept_provider(provider)?;
        let config = self.pipeline.config();
        let source =
            input::resolve_input(input, &self.work_dir(), config.download_timeout_secs).await?;
        self.schedule(source, provider).await
    }

    /// Persist an uploaded buffer into the work directory and queue a job.
    pub async fn submit_bytes(
        &self,
        bytes: &[u8],
        file_name: &str,
        provider: &str,
    ) -> Result<JobId, SummonsError> {
        let provider = self.accept_provider(provider)?;
        let source = input::persist_bytes(bytes, file_name, &self.work_dir()).await?;
        self.schedule(source, provider).await
    }

    /// Latest snapshot of a job. Unknown ids read as a fresh `Initializing`
    /// record.
    pub async fn status(&self, id: &JobId) -> Result<JobRecord, SummonsError> {
        Ok(self
            .store
            .get(id)
            .await?
            .unwrap_or_else(|| JobRecord::placeholder(id.clone())))
    }

    /// Poll until the job reaches a terminal state.
    pub async fn wait(&self, id: &JobId, poll_interval: Duration) -> Result<JobRecord, SummonsError> {
        loop {
            let record = self.status(id).await?;
            if record.state.is_terminal() {
                return Ok(record);
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Wait for every job scheduled so far, including ones submitted while
    /// draining.
    pub async fn drain(&self) {
        loop {
            let idle = self.in_flight.idle.notified();
            tokio::pin!(idle);
            idle.as_mut().enable();
            if self.in_flight.jobs.load(Ordering::SeqCst) == 0 {
                return;
            }
            idle.await;
        }
    }

    /// Jobs submitted and not yet terminal.
    pub fn jobs_in_flight(&self) -> usize {
        self.in_flight.jobs.load(Ordering::SeqCst)
    }

    /// Read a finished job's output file.
    pub async fn read_result(&self, path: impl AsRef<Path>) -> Result<Vec<u8>, SummonsError> {
        let path = path.as_ref();
        tokio::fs::read(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => SummonsError::ResultNotFound {
                path: path.to_path_buf(),
            },
            std::io::ErrorKind::PermissionDenied => SummonsError::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => SummonsError::Internal(format!("cannot read {}: {e}", path.display())),
        })
    }

    fn accept_provider(&self, name: &str) -> Result<Provider, SummonsError> {
        let provider: Provider = name.parse()?;
        if !self.pipeline.classifier().supports(provider) {
            let hint = match provider {
                Provider::OpenAi => "Set OPENAI_API_KEY to use this provider.",
                Provider::Anthropic => "Set ANTHROPIC_API_KEY to use this provider.",
            };
            return Err(SummonsError::ProviderNotConfigured {
                provider: provider.to_string(),
                hint: hint.to_string(),
            });
        }
        Ok(provider)
    }

    fn work_dir(&self) -> PathBuf {
        self.pipeline
            .config()
            .work_dir
            .clone()
            .unwrap_or_else(input::default_work_dir)
    }

    async fn schedule(&self, source: PathBuf, provider: Provider) -> Result<JobId, SummonsError> {
        let id = JobId::new();
        let output = output_path_for(self.pipeline.config(), &source, &id);
        let record = JobRecord::new(id.clone(), source, output, provider);
        self.store.set(record.clone()).await?;
        info!(
            "Job {} queued: {} via {}",
            id,
            record.source_path.display(),
            provider
        );

        let guard = InFlight::enter(&self.in_flight);
        let pipeline = Arc::clone(&self.pipeline);
        let permits = Arc::clone(&self.permits);
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            let _guard = guard;
            let Ok(_permit) = permits.acquire_owned().await else {
                error!("Job {}: worker pool closed", record.id);
                return;
            };
            let queued = record.clone();
            let worker = tokio::spawn(async move {
                pipeline.run(record).await;
            });
            if let Err(e) = worker.await {
                mark_abandoned(store.as_ref(), queued, e).await;
            }
        });
        Ok(id)
    }
}

/// Count of running jobs plus a wake-up for [`Dispatcher::drain`].
#[derive(Default)]
struct InFlight {
    jobs: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    fn enter(this: &Arc<Self>) -> InFlightGuard {
        this.jobs.fetch_add(1, Ordering::SeqCst);
        InFlightGuard(Arc::clone(this))
    }
}

struct InFlightGuard(Arc<InFlight>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.0.jobs.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

/// A worker died before `ChunkedPipeline::run` could record an outcome.
/// Fail the job from its latest stored snapshot.
async fn mark_abandoned(store: &dyn JobStatusStore, queued: JobRecord, cause: JoinError) {
    let detail = if cause.is_panic() {
        "worker panicked"
    } else {
        "worker cancelled"
    };
    error!("Job {}: {}", queued.id, detail);

    let mut record = match store.get(&queued.id).await {
        Ok(Some(latest)) => latest,
        _ => queued,
    };
    if record.state.is_terminal() {
        return;
    }
    let message = SummonsError::Internal(detail.to_string()).to_string();
    record.error = Some(message.clone());
    if let Err(e) = record.transition(JobState::Failed, 100, message) {
        error!("Job {}: {}", record.id, e);
        return;
    }
    if let Err(e) = store.set(record).await {
        error!("Job status write failed: {}", e);
    }
}

/// `<output_dir or source dir>/<source stem>-<job id>-summons.pdf`
///
/// The job id keeps resubmissions of one document from sharing a result file.
pub fn output_path_for(config: &ExtractionConfig, source: &Path, id: &JobId) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    let dir = config
        .output_dir
        .clone()
        .or_else(|| source.parent().map(Path::to_path_buf))
        .unwrap_or_default();
    dir.join(format!("{stem}-{id}-summons.pdf"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_next_to_source_by_default() {
        let config = ExtractionConfig::default();
        let id = JobId::from("j1");
        assert_eq!(
            output_path_for(&config, Path::new("/cases/smith-v-jones.pdf"), &id),
            PathBuf::from("/cases/smith-v-jones-j1-summons.pdf")
        );
    }

    #[test]
    fn output_dir_overrides_source_dir() {
        let config = ExtractionConfig::builder()
            .output_dir("/out")
            .build()
            .unwrap();
        assert_eq!(
            output_path_for(&config, Path::new("/cases/a.b.pdf"), &JobId::from("j2")),
            PathBuf::from("/out/a.b-j2-summons.pdf")
        );
    }

    #[test]
    fn same_source_different_jobs_never_share_an_output() {
        let config = ExtractionConfig::default();
        let source = Path::new("/cases/case.pdf");
        assert_ne!(
            output_path_for(&config, source, &JobId::new()),
            output_path_for(&config, source, &JobId::new())
        );
    }

    #[tokio::test]
    async fn abandoned_job_is_failed_from_its_latest_snapshot() {
        let store = crate::store::MemoryStatusStore::new();
        let queued = JobRecord::new(
            JobId::from("j3"),
            PathBuf::from("/cases/a.pdf"),
            PathBuf::from("/cases/a-j3-summons.pdf"),
            Provider::OpenAi,
        );
        let mut latest = queued.clone();
        latest
            .transition(JobState::Transcribing, 40, "Applying OCR to pages 1-20...")
            .unwrap();
        store.set(latest).await.unwrap();

        let cause = tokio::spawn(async { panic!("boom") }).await.unwrap_err();
        mark_abandoned(&store, queued, cause).await;

        let record = store.get(&JobId::from("j3")).await.unwrap().unwrap();
        assert_eq!(record.state, JobState::Failed);
        assert_eq!(record.progress, 100);
        assert!(record.error.as_deref().unwrap().contains("panicked"));
    }
}
