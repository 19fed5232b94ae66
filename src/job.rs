//! Job lifecycle
//!
//! ```text
//! Queued ──start()──▶ Running ──complete(result)──▶ Done
//!                        │
//!                        └──────fail(error)───────▶ Failed
//! ```
//!
//! Terminal states are final. Progress only moves forward and stays in `0..=100`.
//! Every transition method returns [`Error::InvalidTransition`] instead of silently
//! ignoring a call that would break those rules.

use crate::types::{AnalysisResult, JobId, UploadId};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Progress reported as soon as a job starts running
pub const STARTED_PROGRESS: u8 = 5;

/// Job execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One analysis request and its outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub upload_id: UploadId,
    pub owner: String,
    pub status: JobStatus,
    pub progress: u8,
    pub error: Option<String>,
    pub result: Option<AnalysisResult>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(id: JobId, upload_id: UploadId, owner: impl Into<String>) -> Self {
        Self {
            id,
            upload_id,
            owner: owner.into(),
            status: JobStatus::Queued,
            progress: 0,
            error: None,
            result: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    fn require(&self, expected: JobStatus, action: &str) -> Result<()> {
        if self.status == expected {
            Ok(())
        } else {
            Err(Error::invalid_transition(format!(
                "cannot {} job {} in state {}",
                action, self.id, self.status
            )))
        }
    }

    /// `Queued → Running`, progress 5
    pub fn start(&mut self) -> Result<()> {
        self.require(JobStatus::Queued, "start")?;
        self.status = JobStatus::Running;
        self.progress = self.progress.max(STARTED_PROGRESS);
        Ok(())
    }

    /// Raise progress while running. Lower values are ignored; values above 100 clamp.
    pub fn advance(&mut self, progress: u8) -> Result<()> {
        self.require(JobStatus::Running, "advance")?;
        self.progress = self.progress.max(progress.min(100));
        Ok(())
    }

    /// `Running → Done` with the final result, progress 100
    pub fn complete(&mut self, result: AnalysisResult) -> Result<()> {
        self.require(JobStatus::Running, "complete")?;
        self.status = JobStatus::Done;
        self.progress = 100;
        self.result = Some(result);
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// `Queued | Running → Failed` with the error recorded
    pub fn fail(&mut self, error: impl Into<String>) -> Result<()> {
        if self.status.is_terminal() {
            return Err(Error::invalid_transition(format!(
                "cannot fail job {} in state {}",
                self.id, self.status
            )));
        }
        self.status = JobStatus::Failed;
        self.error = Some(error.into());
        self.finished_at = Some(Utc::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> Job {
        Job::new(JobId(1), UploadId(7), "alice@example.com")
    }

    fn heuristic() -> AnalysisResult {
        AnalysisResult::Heuristic {
            summary: "Analyzed 0 lines.".to_string(),
            evidence: Vec::new(),
        }
    }

    #[test]
    fn test_happy_path() {
        let mut job = job();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.progress, 0);

        job.start().unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.progress, STARTED_PROGRESS);

        job.advance(42).unwrap();
        job.complete(heuristic()).unwrap();
        assert_eq!(job.status, JobStatus::Done);
        assert_eq!(job.progress, 100);
        assert!(job.result.is_some());
        assert!(job.finished_at.is_some());
    }

    #[test]
    fn test_progress_is_monotonic_and_bounded() {
        let mut job = job();
        job.start().unwrap();

        job.advance(50).unwrap();
        job.advance(20).unwrap();
        assert_eq!(job.progress, 50);

        job.advance(250).unwrap();
        assert_eq!(job.progress, 100);
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut done = job();
        done.start().unwrap();
        done.complete(heuristic()).unwrap();
        assert!(matches!(done.fail("late"), Err(Error::InvalidTransition(_))));
        assert!(done.advance(10).is_err());
        assert!(done.complete(heuristic()).is_err());
        assert_eq!(done.status, JobStatus::Done);
        assert!(done.error.is_none());

        let mut failed = job();
        failed.start().unwrap();
        failed.fail("Failed to read upload file: gone").unwrap();
        assert!(failed.start().is_err());
        assert!(failed.complete(heuristic()).is_err());
        assert_eq!(failed.status, JobStatus::Failed);
        assert!(failed.result.is_none());
    }

    #[test]
    fn test_queued_job_cannot_complete() {
        let mut job = job();
        assert!(job.advance(10).is_err());
        assert!(job.complete(heuristic()).is_err());
        job.fail("cancelled").unwrap();
        assert_eq!(job.status, JobStatus::Failed);
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_value(JobStatus::Done).unwrap(), "done");
        assert_eq!(JobStatus::Running.to_string(), "running");
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
    }
}
