//! Collaborator interfaces
//!
//! The orchestrator reads uploads and persists everything it produces through these
//! traits. [`crate::store`] has in-process and file-backed implementations; a
//! database-backed service supplies its own.

use crate::job::Job;
use crate::types::{EntryKey, JobId, LogEntry, RawUpload, Report, ResultEnvelope, UploadId};
use crate::Result;
use async_trait::async_trait;

/// Read access to uploaded files
#[async_trait]
pub trait UploadSource: Send + Sync {
    /// Content and declared filename of an upload
    async fn read(&self, upload_id: UploadId) -> Result<RawUpload>;

    /// Add `count` newly stored lines to the upload's parsed total
    async fn add_parsed_count(&self, _upload_id: UploadId, _count: u64) -> Result<()> {
        Ok(())
    }
}

/// Storage for ingested log lines
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Whether a line with this dedup key is already stored
    async fn exists(&self, key: &EntryKey) -> Result<bool>;

    /// Store entries. Entries whose key is already stored are skipped.
    async fn insert_batch(&self, entries: Vec<LogEntry>) -> Result<()>;
}

/// Durable per-job results
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn store(&self, envelope: &ResultEnvelope) -> Result<()>;

    async fn load(&self, job_id: JobId) -> Result<Option<ResultEnvelope>>;

    /// Store the short report written after a job completes
    async fn store_report(&self, _report: &Report) -> Result<()> {
        Ok(())
    }

    /// Report stored for a job, if this sink keeps reports
    async fn load_report(&self, _job_id: JobId) -> Result<Option<Report>> {
        Ok(None)
    }
}

/// Job state as observed by pollers
#[async_trait]
pub trait JobStatusSink: Send + Sync {
    /// Insert or overwrite the job record
    async fn save(&self, job: &Job) -> Result<()>;

    async fn load(&self, job_id: JobId) -> Result<Option<Job>>;
}
