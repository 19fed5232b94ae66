//! Background analysis jobs
//!
//! [`JobOrchestrator::submit`] records a queued job and returns at once; a spawned
//! task drives it to `done` or `failed`. Callers poll [`JobOrchestrator::status`]
//! or await the returned [`JobHandle`].
//!
//! # Running a job
//!
//! 1. `queued → running`, progress 5
//! 2. read the upload; a read failure fails the job
//! 3. ingest up to `max_lines` non-blank lines in batches, publishing progress
//! 4. analyze the first `sample_lines` lines under `generation_timeout`; a timeout
//!    or a crashed analysis falls back to the heuristic result
//! 5. store the result envelope; a storage failure fails the job
//! 6. `running → done`, then store a short report (best effort)
//!
//! Errors escaping these steps, panics included, fail the job. A job is never left
//! `running` once its task has ended.

use crate::analyze::Analyzer;
use crate::config::JobOptions;
use crate::ingest::{IngestStats, LineIngestor};
use crate::job::Job;
use crate::sink::{EventSink, JobStatusSink, ResultSink, UploadSource};
use crate::store::MemoryStore;
use crate::types::{AnalysisResult, JobId, RawUpload, Report, ResultEnvelope, UploadId};
use crate::{Error, Result};
use chrono::Utc;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::task::JoinHandle;

/// The collaborators a job reads from and writes to
#[derive(Clone)]
pub struct Collaborators {
    pub uploads: Arc<dyn UploadSource>,
    pub events: Arc<dyn EventSink>,
    pub results: Arc<dyn ResultSink>,
    pub jobs: Arc<dyn JobStatusSink>,
}

impl Collaborators {
    /// Every role served by one [`MemoryStore`]
    pub fn in_memory(store: Arc<MemoryStore>) -> Self {
        Self {
            uploads: store.clone(),
            events: store.clone(),
            results: store.clone(),
            jobs: store,
        }
    }

    /// Replace the result sink, e.g. with a [`FileResultSink`](crate::FileResultSink)
    pub fn with_results(mut self, results: Arc<dyn ResultSink>) -> Self {
        self.results = results;
        self
    }
}

/// A submitted job
#[derive(Debug)]
pub struct JobHandle {
    id: JobId,
    task: JoinHandle<Job>,
}

impl JobHandle {
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Wait for the job to reach a terminal state
    pub async fn wait(self) -> Result<Job> {
        self.task
            .await
            .map_err(|e| Error::other(format!("job {} worker ended abnormally: {}", self.id, e)))
    }
}

struct Inner {
    collaborators: Collaborators,
    analyzer: Arc<Analyzer>,
    options: JobOptions,
    next_id: AtomicU64,
}

/// Runs analysis jobs on background tasks
#[derive(Clone)]
pub struct JobOrchestrator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for JobOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobOrchestrator")
            .field("options", &self.inner.options)
            .field("next_id", &self.inner.next_id.load(Ordering::Relaxed))
            .finish()
    }
}

impl JobOrchestrator {
    pub fn new(analyzer: Arc<Analyzer>, options: JobOptions, collaborators: Collaborators) -> Self {
        Self {
            inner: Arc::new(Inner {
                collaborators,
                analyzer,
                options,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn options(&self) -> &JobOptions {
        &self.inner.options
    }

    /// Queue a job for `upload_id` and start it in the background.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn submit(&self, upload_id: UploadId, owner: impl Into<String>) -> Result<JobHandle> {
        let id = JobId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let job = Job::new(id, upload_id, owner);
        self.inner.collaborators.jobs.save(&job).await?;

        log::info!("job {}: queued for upload {} (owner {})", id, upload_id, job.owner);

        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move { inner.execute(job).await });
        Ok(JobHandle { id, task })
    }

    /// Submit and wait for the terminal state
    pub async fn run(&self, upload_id: UploadId, owner: impl Into<String>) -> Result<Job> {
        self.submit(upload_id, owner).await?.wait().await
    }

    /// Latest recorded state of a job
    pub async fn status(&self, job_id: JobId) -> Result<Option<Job>> {
        self.inner.collaborators.jobs.load(job_id).await
    }

    /// Stored result of a finished job
    pub async fn result(&self, job_id: JobId) -> Result<Option<ResultEnvelope>> {
        self.inner.collaborators.results.load(job_id).await
    }

    /// Report written when the job finished, from whichever result sink stored it
    pub async fn report(&self, job_id: JobId) -> Result<Option<Report>> {
        self.inner.collaborators.results.load_report(job_id).await
    }
}

impl Inner {
    /// Drive `job` to a terminal state, containing panics from the pipeline
    async fn execute(self: Arc<Self>, job: Job) -> Job {
        let snapshot = job.clone();
        let worker = {
            let inner = Arc::clone(&self);
            tokio::spawn(async move { inner.run(job).await })
        };

        match worker.await {
            Ok(job) => job,
            Err(e) => {
                log::error!("job {}: worker crashed: {}", snapshot.id, e);
                let mut job = match self.collaborators.jobs.load(snapshot.id).await {
                    Ok(Some(saved)) => saved,
                    _ => snapshot,
                };
                if !job.status.is_terminal() {
                    let _ = job.fail(format!("internal error: {}", e));
                }
                self.save(&job).await;
                job
            }
        }
    }

    async fn run(&self, mut job: Job) -> Job {
        if let Err(e) = self.process(&mut job).await {
            log::error!("job {}: unexpected failure: {}", job.id, e);
            if !job.status.is_terminal() {
                let _ = job.fail(e.to_string());
            }
        }
        self.save(&job).await;

        match &job.error {
            Some(error) => log::warn!("job {}: failed: {}", job.id, error),
            None => log::info!("job {}: {} (progress {})", job.id, job.status, job.progress),
        }
        job
    }

    /// Status writes are best effort; pollers see the next successful one
    async fn save(&self, job: &Job) {
        if let Err(e) = self.collaborators.jobs.save(job).await {
            log::warn!("job {}: failed to record status: {}", job.id, e);
        }
    }

    async fn process(&self, job: &mut Job) -> Result<()> {
        job.start()?;
        self.save(job).await;
        log::info!("job {}: running (upload {}, owner {})", job.id, job.upload_id, job.owner);

        let upload = match self.collaborators.uploads.read(job.upload_id).await {
            Ok(upload) => upload,
            Err(e) => {
                log::error!("job {}: cannot read upload {}: {}", job.id, job.upload_id, e);
                job.fail(format!("Failed to read upload file: {}", e))?;
                return Ok(());
            }
        };

        let text = upload.text();
        let stats = self.ingest(job, &text).await?;
        log::info!(
            "job {}: finished parsing (unique_parsed={} approximate_errors={})",
            job.id,
            stats.unique,
            stats.errors
        );

        if let Err(e) = self
            .collaborators
            .uploads
            .add_parsed_count(job.upload_id, stats.unique as u64)
            .await
        {
            log::warn!("job {}: failed to update parsed count: {}", job.id, e);
        }

        let sample = text
            .lines()
            .take(self.options.sample_lines)
            .collect::<Vec<_>>()
            .join("\n");
        let result = self.analyze(job.id, sample, &upload).await;

        let envelope = ResultEnvelope::new(job.id, result.clone());
        if let Err(e) = self.collaborators.results.store(&envelope).await {
            log::error!("job {}: failed to save result: {}", job.id, e);
            job.fail(format!("failed to save result: {}", e))?;
            return Ok(());
        }

        job.complete(result)?;
        self.save(job).await;
        log::info!("job {}: complete ({})", job.id, envelope.result.source());

        let report = Report {
            job_id: job.id,
            owner: job.owner.clone(),
            title: format!("Report for {}", upload.filename),
            summary: format!(
                "Parsed {} unique lines from file {}.\nDetected ~{} error-like messages.",
                stats.unique, upload.filename, stats.errors
            ),
            created_at: Utc::now(),
        };
        if let Err(e) = self.collaborators.results.store_report(&report).await {
            log::warn!("job {}: failed to store report: {}", job.id, e);
        }

        Ok(())
    }

    async fn ingest(&self, job: &mut Job, text: &str) -> Result<IngestStats> {
        let mut ingestor = LineIngestor::new(
            self.collaborators.events.as_ref(),
            job.owner.clone(),
            job.upload_id,
            &self.options,
            text.lines().count(),
        );

        for line in text.lines() {
            if ingestor.is_full() {
                break;
            }
            if let Some(progress) = ingestor.push_line(line).await {
                job.advance(progress)?;
                self.save(job).await;
            }
        }

        Ok(ingestor.finish().await)
    }

    /// Analysis under the generation timeout.
    ///
    /// Runs on its own task so a panic inside it is contained; on timeout the task
    /// is aborted.
    async fn analyze(&self, job_id: JobId, sample: String, upload: &RawUpload) -> AnalysisResult {
        let analyzer = Arc::clone(&self.analyzer);
        let filename = upload.filename.clone();
        let text = sample.clone();
        let task = tokio::spawn(async move { analyzer.analyze(&text, &filename).await });
        let abort = task.abort_handle();

        match tokio::time::timeout(self.options.generation_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                log::error!("job {}: analysis crashed: {}", job_id, e);
                self.analyzer.fallback(&sample)
            }
            Err(_) => {
                abort.abort();
                log::warn!(
                    "job {}: analysis timed out after {:?}",
                    job_id,
                    self.options.generation_timeout
                );
                self.analyzer.fallback(&sample)
            }
        }
    }
}
