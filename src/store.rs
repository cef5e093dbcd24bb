//! Job status store: the only state shared between worker tasks and
//! pollers.
//!
//! The pipeline writes whole [`JobRecord`] snapshots keyed by job id; readers
//! always get the most recently written snapshot. Implementations must make
//! a single record's replacement atomic; nothing is promised across jobs.
//!
//! Two implementations ship with the crate:
//!
//! * [`MemoryStatusStore`]: a `RwLock<HashMap>` for single-process use.
//! * [`FileStatusStore`]: one JSON file per job, replaced via
//!   write-to-temp + rename, so several processes on one host can share it.

use crate::error::SummonsError;
use crate::job::{JobId, JobRecord};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::debug;

/// Capability interface over a job-status backend.
#[async_trait]
pub trait JobStatusStore: Send + Sync {
    /// Latest snapshot for `id`, or `None` if nothing was ever written.
    async fn get(&self, id: &JobId) -> Result<Option<JobRecord>, SummonsError>;

    /// Replace the snapshot for `record.id`.
    async fn set(&self, record: JobRecord) -> Result<(), SummonsError>;
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStatusStore {
    records: RwLock<HashMap<JobId, JobRecord>>,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of jobs with a recorded snapshot.
    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl JobStatusStore for MemoryStatusStore {
    async fn get(&self, id: &JobId) -> Result<Option<JobRecord>, SummonsError> {
        let records = self
            .records
            .read()
            .map_err(|e| SummonsError::StoreFailed(format!("lock poisoned: {e}")))?;
        Ok(records.get(id).cloned())
    }

    async fn set(&self, record: JobRecord) -> Result<(), SummonsError> {
        let mut records = self
            .records
            .write()
            .map_err(|e| SummonsError::StoreFailed(format!("lock poisoned: {e}")))?;
        records.insert(record.id.clone(), record);
        Ok(())
    }
}

/// Directory-backed store: `<dir>/<job id>.json`.
#[derive(Debug, Clone)]
pub struct FileStatusStore {
    dir: PathBuf,
}

impl FileStatusStore {
    /// Open (and create if needed) a store rooted at `dir`.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, SummonsError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            SummonsError::StoreFailed(format!("cannot create {}: {e}", dir.display()))
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, id: &JobId) -> Result<PathBuf, SummonsError> {
        let valid = !id.as_str().is_empty()
            && id
                .as_str()
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(SummonsError::StoreFailed(format!(
                "job id '{id}' is not a valid record key"
            )));
        }
        Ok(self.dir.join(format!("{id}.json")))
    }
}

#[async_trait]
impl JobStatusStore for FileStatusStore {
    async fn get(&self, id: &JobId) -> Result<Option<JobRecord>, SummonsError> {
        let path = self.record_path(id)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(SummonsError::StoreFailed(format!(
                    "cannot read {}: {e}",
                    path.display()
                )))
            }
        };
        let record = serde_json::from_slice(&bytes).map_err(|e| {
            SummonsError::StoreFailed(format!("corrupt record {}: {e}", path.display()))
        })?;
        Ok(Some(record))
    }

    async fn set(&self, record: JobRecord) -> Result<(), SummonsError> {
        let path = self.record_path(&record.id)?;
        let json = serde_json::to_vec_pretty(&record)
            .map_err(|e| SummonsError::StoreFailed(format!("serialise record: {e}")))?;

        // Atomic replace: readers see either the old or the new file.
        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &json).await.map_err(|e| {
            SummonsError::StoreFailed(format!("cannot write {}: {e}", tmp_path.display()))
        })?;
        tokio::fs::rename(&tmp_path, &path).await.map_err(|e| {
            SummonsError::StoreFailed(format!("cannot replace {}: {e}", path.display()))
        })?;

        debug!(job = %record.id, state = %record.state, "Status record written");
        Ok(())
    }
}
