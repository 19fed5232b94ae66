//! Collaborator implementations
//!
//! - [`MemoryStore`] keeps uploads, entries, results, reports and jobs in process
//!   memory. It implements every trait in [`crate::sink`].
//! - [`FsUploadSource`] reads registered upload files from disk.
//! - [`FileResultSink`] writes one `job-{id}.json` per job into a directory, so
//!   results survive a restart.

use crate::job::Job;
use crate::sink::{EventSink, JobStatusSink, ResultSink, UploadSource};
use crate::types::{EntryKey, JobId, LogEntry, RawUpload, Report, ResultEnvelope, UploadId};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct State {
    uploads: HashMap<UploadId, RawUpload>,
    parsed_counts: HashMap<UploadId, u64>,
    entries: Vec<LogEntry>,
    keys: HashSet<EntryKey>,
    results: HashMap<JobId, ResultEnvelope>,
    reports: Vec<Report>,
    jobs: HashMap<JobId, Job>,
}

/// In-process store for every collaborator role
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // Every mutation is a single insert, so a poisoned lock still holds consistent data
    fn state(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_upload(&self, upload_id: UploadId, upload: RawUpload) {
        self.state().uploads.insert(upload_id, upload);
    }

    pub fn parsed_count(&self, upload_id: UploadId) -> u64 {
        self.state()
            .parsed_counts
            .get(&upload_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn entry_count(&self) -> usize {
        self.state().entries.len()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.state().entries.clone()
    }

    pub fn reports(&self) -> Vec<Report> {
        self.state().reports.clone()
    }
}

#[async_trait]
impl UploadSource for MemoryStore {
    async fn read(&self, upload_id: UploadId) -> Result<RawUpload> {
        self.state()
            .uploads
            .get(&upload_id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("upload {}", upload_id)))
    }

    async fn add_parsed_count(&self, upload_id: UploadId, count: u64) -> Result<()> {
        *self.state().parsed_counts.entry(upload_id).or_insert(0) += count;
        Ok(())
    }
}

#[async_trait]
impl EventSink for MemoryStore {
    async fn exists(&self, key: &EntryKey) -> Result<bool> {
        Ok(self.state().keys.contains(key))
    }

    async fn insert_batch(&self, entries: Vec<LogEntry>) -> Result<()> {
        let mut state = self.state();
        for entry in entries {
            if state.keys.insert(entry.key()) {
                state.entries.push(entry);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ResultSink for MemoryStore {
    async fn store(&self, envelope: &ResultEnvelope) -> Result<()> {
        self.state()
            .results
            .insert(envelope.job_id, envelope.clone());
        Ok(())
    }

    async fn load(&self, job_id: JobId) -> Result<Option<ResultEnvelope>> {
        Ok(self.state().results.get(&job_id).cloned())
    }

    async fn store_report(&self, report: &Report) -> Result<()> {
        self.state().reports.push(report.clone());
        Ok(())
    }

    async fn load_report(&self, job_id: JobId) -> Result<Option<Report>> {
        let state = self.state();
        Ok(state.reports.iter().rev().find(|r| r.job_id == job_id).cloned())
    }
}

#[async_trait]
impl JobStatusSink for MemoryStore {
    async fn save(&self, job: &Job) -> Result<()> {
        self.state().jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn load(&self, job_id: JobId) -> Result<Option<Job>> {
        Ok(self.state().jobs.get(&job_id).cloned())
    }
}

/// Uploads stored as files on disk
#[derive(Debug, Default)]
pub struct FsUploadSource {
    uploads: Mutex<HashMap<UploadId, (PathBuf, String)>>,
    parsed_counts: Mutex<HashMap<UploadId, u64>>,
}

impl FsUploadSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `path` readable as `upload_id`. The declared filename defaults to the file name.
    pub fn register(&self, upload_id: UploadId, path: impl Into<PathBuf>, filename: Option<String>) {
        let path = path.into();
        let filename = filename.unwrap_or_else(|| {
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "uploaded.log".to_string())
        });
        self.uploads
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(upload_id, (path, filename));
    }

    pub fn parsed_count(&self, upload_id: UploadId) -> u64 {
        self.parsed_counts
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(&upload_id)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl UploadSource for FsUploadSource {
    async fn read(&self, upload_id: UploadId) -> Result<RawUpload> {
        let registered = self
            .uploads
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(&upload_id)
            .cloned();
        let (path, filename) =
            registered.ok_or_else(|| Error::not_found(format!("upload {}", upload_id)))?;

        let content = tokio::fs::read(&path).await?;
        Ok(RawUpload::new(filename, content))
    }

    async fn add_parsed_count(&self, upload_id: UploadId, count: u64) -> Result<()> {
        *self
            .parsed_counts
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .entry(upload_id)
            .or_insert(0) += count;
        Ok(())
    }
}

/// Results written as JSON files, one per job
#[derive(Debug, Clone)]
pub struct FileResultSink {
    dir: PathBuf,
}

impl FileResultSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `{dir}/job-{id}.json`
    pub fn path_for(&self, job_id: JobId) -> PathBuf {
        self.dir.join(format!("job-{}.json", job_id))
    }

    fn report_path_for(&self, job_id: JobId) -> PathBuf {
        self.dir.join(format!("report-{}.json", job_id))
    }

    /// Write through a temporary file so readers never see a partial document
    async fn write_json<T: serde::Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let bytes = serde_json::to_vec_pretty(value)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// A missing file reads as `None`
    async fn read_json<T: serde::de::DeserializeOwned>(&self, path: &Path) -> Result<Option<T>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }
}

#[async_trait]
impl ResultSink for FileResultSink {
    async fn store(&self, envelope: &ResultEnvelope) -> Result<()> {
        let path = self.path_for(envelope.job_id);
        self.write_json(&path, envelope).await?;
        log::debug!("stored result for job {} at {}", envelope.job_id, path.display());
        Ok(())
    }

    async fn load(&self, job_id: JobId) -> Result<Option<ResultEnvelope>> {
        self.read_json(&self.path_for(job_id)).await
    }

    async fn store_report(&self, report: &Report) -> Result<()> {
        self.write_json(&self.report_path_for(report.job_id), report)
            .await
    }

    async fn load_report(&self, job_id: JobId) -> Result<Option<Report>> {
        self.read_json(&self.report_path_for(job_id)).await
    }
}
