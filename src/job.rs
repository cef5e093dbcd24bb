//! Job model: identifiers, lifecycle states, status records and the page
//! types that flow between pipeline stages.

use crate::config::Provider;
use crate::error::SummonsError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// Opaque, never-reused job identifier (UUID v4 in simple hex form).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Allocate a fresh identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Lifecycle of a job.
///
/// ```text
/// Initializing → ConvertingToImages → {Transcribing → Classifying}*
///              → Completed | CompletedNotFound | Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    #[default]
    Initializing,
    ConvertingToImages,
    Transcribing,
    Classifying,
    /// A summons range was found and written to `result_path`.
    Completed,
    /// Every page was scanned and no summons was found.
    CompletedNotFound,
    /// The job could not finish looking.
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::CompletedNotFound | JobState::Failed
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Initializing => "initializing",
            JobState::ConvertingToImages => "converting_to_images",
            JobState::Transcribing => "transcribing",
            JobState::Classifying => "classifying",
            JobState::Completed => "completed",
            JobState::CompletedNotFound => "completed_not_found",
            JobState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Full snapshot of one job, as written to and read from the status store.
///
/// Every store write replaces the whole record, so a reader never sees a
/// half-updated job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub source_path: PathBuf,
    pub output_path: PathBuf,
    /// `None` only on the placeholder returned for unknown ids.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<Provider>,
    pub state: JobState,
    /// 0–100, never decreases within a run.
    pub progress: u8,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub pages_total: usize,
    #[serde(default)]
    pub pages_transcribed: usize,
    #[serde(default)]
    pub chunks_classified: usize,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    /// Initial record written by the dispatcher at submission time.
    pub fn new(id: JobId, source_path: PathBuf, output_path: PathBuf, provider: Provider) -> Self {
        Self {
            id,
            source_path,
            output_path,
            provider: Some(provider),
            state: JobState::Initializing,
            progress: 0,
            message: "Initializing...".to_string(),
            result_path: None,
            error: None,
            pages_total: 0,
            pages_transcribed: 0,
            chunks_classified: 0,
            updated_at: Utc::now(),
        }
    }

    /// What pollers see for an id the store has no record of.
    ///
    /// Deliberately indistinguishable from a job that has just been
    /// submitted.
    pub fn placeholder(id: JobId) -> Self {
        Self {
            id,
            source_path: PathBuf::new(),
            output_path: PathBuf::new(),
            provider: None,
            state: JobState::Initializing,
            progress: 0,
            message: "Initializing...".to_string(),
            result_path: None,
            error: None,
            pages_total: 0,
            pages_transcribed: 0,
            chunks_classified: 0,
            updated_at: Utc::now(),
        }
    }

    /// True once the job has finished, whatever the outcome.
    pub fn file_ready(&self) -> bool {
        self.state.is_terminal()
    }

    /// Move to `state`, reporting `progress` and `message`.
    ///
    /// Non-terminal states cap progress at 99; terminal states force 100.
    /// Progress never goes below the last reported value. Leaving a
    /// terminal state is rejected.
    pub fn transition(
        &mut self,
        state: JobState,
        progress: u8,
        message: impl Into<String>,
    ) -> Result<(), SummonsError> {
        if self.state.is_terminal() {
            return Err(SummonsError::Internal(format!(
                "job {} is already {}; refusing transition to {}",
                self.id, self.state, state
            )));
        }

        let target = if state.is_terminal() {
            100
        } else {
            progress.min(99)
        };
        self.progress = self.progress.max(target);
        self.state = state;
        self.message = message.into();
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Text transcribed from one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRecord {
    /// Zero-based page index.
    pub page_index: usize,
    pub text: String,
}

impl PageRecord {
    pub fn new(page_index: usize, text: impl Into<String>) -> Self {
        Self {
            page_index,
            text: text.into(),
        }
    }
}

/// Inclusive, zero-based page range. `start <= end` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRange {
    start: usize,
    end: usize,
}

impl PageRange {
    /// Returns `None` when `start > end`.
    pub fn new(start: usize, end: usize) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, page_index: usize) -> bool {
        (self.start..=self.end).contains(&page_index)
    }
}

impl fmt::Display for PageRange {
    /// One-based, for humans.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "page {}", self.start + 1)
        } else {
            write!(f, "pages {}-{}", self.start + 1, self.end + 1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> JobRecord {
        JobRecord::new(
            JobId::new(),
            PathBuf::from("/tmp/in.pdf"),
            PathBuf::from("/tmp/in-summons.pdf"),
            Provider::OpenAi,
        )
    }

    #[test]
    fn job_ids_are_unique() {
        let a = JobId::new();
        let b = JobId::new();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
    }

    #[test]
    fn progress_never_decreases() {
        let mut r = record();
        r.transition(JobState::Transcribing, 40, "ocr").unwrap();
        r.transition(JobState::Classifying, 10, "classify").unwrap();
        assert_eq!(r.progress, 40);
        assert_eq!(r.state, JobState::Classifying);
    }

    #[test]
    fn non_terminal_progress_is_capped() {
        let mut r = record();
        r.transition(JobState::Classifying, 100, "last chunk").unwrap();
        assert_eq!(r.progress, 99);
    }

    #[test]
    fn terminal_state_forces_full_progress_and_is_final() {
        let mut r = record();
        r.transition(JobState::CompletedNotFound, 0, "done").unwrap();
        assert_eq!(r.progress, 100);
        assert!(r.file_ready());
        let err = r.transition(JobState::Transcribing, 50, "again");
        assert!(err.is_err());
        assert_eq!(r.state, JobState::CompletedNotFound);
    }

    #[test]
    fn placeholder_looks_initializing() {
        let r = JobRecord::placeholder(JobId::from("nope"));
        assert_eq!(r.state, JobState::Initializing);
        assert_eq!(r.progress, 0);
        assert!(r.provider.is_none());
    }

    #[test]
    fn page_range_rejects_inverted_bounds() {
        assert!(PageRange::new(5, 2).is_none());
        let r = PageRange::new(2, 4).unwrap();
        assert_eq!(r.len(), 3);
        assert!(r.contains(3));
        assert!(!r.contains(5));
        assert_eq!(r.to_string(), "pages 3-5");
        assert_eq!(PageRange::new(7, 7).unwrap().to_string(), "page 8");
    }

    #[test]
    fn record_serialises_state_snake_case() {
        let mut r = record();
        r.transition(JobState::CompletedNotFound, 100, "none").unwrap();
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["state"], "completed_not_found");
        assert_eq!(json["provider"], "openai");
        assert!(json.get("result_path").is_none());
    }
}
