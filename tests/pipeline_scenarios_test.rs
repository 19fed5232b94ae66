//! End-to-end pipeline scenarios
//!
//! Backends here are in-process fakes; HTTP behaviour is covered in
//! `backend_http_test.rs`.

use async_trait::async_trait;
use log_insight::retry::RetryConfig;
use log_insight::{
    AnalysisResult, Analyzer, AnalyzerOptions, Collaborators, EntryKey, Error, EventSink,
    GenerationBackend, GenerationClient, InvocationShape, JobId, JobOptions, JobOrchestrator,
    JobStatus, LogEntry, MemoryStore, RawUpload, Report, Result, ResultEnvelope, ResultSink,
    Source, UploadId,
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

const SCENARIO_LOG: &str = "2024-01-01 10:00:00 ERROR disk full\n2024-01-01 10:00:01 INFO ok\n";

fn init_logging() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Debug)
        .try_init();
}

/// Answers every prompt with the same body, optionally after a delay
struct CannedBackend {
    body: Value,
    delay: Duration,
}

#[async_trait]
impl GenerationBackend for CannedBackend {
    fn name(&self) -> &str {
        "canned"
    }

    async fn generate(&self, _: &str, _: u32, _: InvocationShape) -> Result<Value> {
        tokio::time::sleep(self.delay).await;
        Ok(self.body.clone())
    }
}

fn analyzer_answering(body: Value, delay: Duration) -> Analyzer {
    let backend: Arc<dyn GenerationBackend> = Arc::new(CannedBackend { body, delay });
    let client = GenerationClient::new(Some(backend), 256, RetryConfig::none());
    Analyzer::with_client(AnalyzerOptions::default(), client)
}

#[tokio::test]
async fn test_heuristic_when_no_backend() {
    init_logging();

    let analyzer = Analyzer::new(AnalyzerOptions::default()).unwrap();
    assert!(!analyzer.is_generation_enabled());

    let result = analyzer.analyze(SCENARIO_LOG, "app.log").await;
    assert_eq!(result.source(), Source::HeuristicFallback);
    assert!(result.summary().contains("2 lines"));
    assert!(result.summary().contains("1 error-like"));
    assert!(result.summary().contains("0 warning-like"));
}

#[tokio::test]
async fn test_fenced_json_becomes_structured() {
    init_logging();

    let fenced = "```json\n{\"summary\":\"ok\",\"issues_found\":[],\"extra_insights\":[]}\n```";
    let analyzer = analyzer_answering(json!({ "text": fenced }), Duration::ZERO);

    let result = analyzer.analyze(SCENARIO_LOG, "app.log").await;
    assert_eq!(result.source(), Source::Genai);
    assert_eq!(result.summary(), "ok");

    let serialized = serde_json::to_value(&result).unwrap();
    assert_eq!(serialized["source"], "genai");
}

#[tokio::test]
async fn test_prose_becomes_text_only_and_is_redacted() {
    let analyzer = analyzer_answering(
        json!({ "text": "The service lost its DB. password=hunter2" }),
        Duration::ZERO,
    );

    let result = analyzer.analyze(SCENARIO_LOG, "app.log").await;
    assert_eq!(result.source(), Source::GenaiText);
    assert!(!result.summary().contains("hunter2"));
    assert!(result.summary().contains("[REDACTED]"));
}

#[tokio::test]
async fn test_structured_output_is_redacted() {
    let analyzer = analyzer_answering(
        json!({ "text": r#"{"summary":"leaked password=hunter2","issues_found":[{"title":"t","how_to_fix":"rotate","severity":"HIGH"}]}"# }),
        Duration::ZERO,
    );

    let result = analyzer.analyze(SCENARIO_LOG, "app.log").await;
    let AnalysisResult::Structured(analysis) = &result else {
        panic!("expected structured result, got {:?}", result);
    };
    assert!(!analysis.summary.contains("hunter2"));
    assert_eq!(analysis.issues.len(), 1);
    assert_eq!(result.suggestions(), vec!["t: rotate".to_string()]);
}

#[tokio::test]
async fn test_duplicate_lines_counted_once() {
    init_logging();

    let store = Arc::new(MemoryStore::new());
    store.add_upload(
        UploadId(7),
        RawUpload::new("dup.log", "ERROR same line\nERROR same line\n"),
    );

    let orchestrator = JobOrchestrator::new(
        Arc::new(Analyzer::heuristic_only(AnalyzerOptions::default())),
        JobOptions::default(),
        Collaborators::in_memory(store.clone()),
    );
    let job = orchestrator.run(UploadId(7), "ops").await.unwrap();

    assert_eq!(job.status, JobStatus::Done);
    assert_eq!(store.parsed_count(UploadId(7)), 1);
    assert_eq!(store.entry_count(), 1);

    // Both lines were processed and counted as error-like
    let report = &store.reports()[0];
    assert_eq!(
        report.summary,
        "Parsed 1 unique lines from file dup.log.\nDetected ~2 error-like messages."
    );
}

#[tokio::test]
async fn test_generation_timeout_falls_back() {
    init_logging();

    let store = Arc::new(MemoryStore::new());
    store.add_upload(UploadId(1), RawUpload::new("slow.log", SCENARIO_LOG));

    let slow = analyzer_answering(json!({ "text": "{\"summary\":\"late\"}" }), Duration::from_secs(30));
    let orchestrator = JobOrchestrator::new(
        Arc::new(slow),
        JobOptions::default().with_generation_timeout(Duration::from_millis(50)),
        Collaborators::in_memory(store.clone()),
    );

    let job = orchestrator.run(UploadId(1), "ops").await.unwrap();
    assert_eq!(job.status, JobStatus::Done);
    assert_eq!(job.progress, 100);

    let result = job.result.unwrap();
    assert_eq!(result.source(), Source::HeuristicFallback);
    assert!(result.summary().contains("1 error-like"));
}

#[tokio::test]
async fn test_sample_limits_analyzed_lines() {
    let text: String = (0..10).map(|i| format!("INFO line {}\n", i)).collect();
    let store = Arc::new(MemoryStore::new());
    store.add_upload(UploadId(1), RawUpload::new("big.log", text));

    let orchestrator = JobOrchestrator::new(
        Arc::new(Analyzer::heuristic_only(AnalyzerOptions::default())),
        JobOptions::default().with_sample_lines(3),
        Collaborators::in_memory(store.clone()),
    );

    let job = orchestrator.run(UploadId(1), "ops").await.unwrap();
    assert!(job.result.unwrap().summary().starts_with("Analyzed 3 lines."));
    assert_eq!(store.parsed_count(UploadId(1)), 10);
}

/// Backend that crashes mid-request
struct PanickingBackend;

#[async_trait]
impl GenerationBackend for PanickingBackend {
    fn name(&self) -> &str {
        "panicking"
    }

    async fn generate(&self, _: &str, _: u32, _: InvocationShape) -> Result<Value> {
        panic!("backend bug");
    }
}

#[tokio::test]
async fn test_crashed_analysis_falls_back() {
    init_logging();

    let store = Arc::new(MemoryStore::new());
    store.add_upload(UploadId(1), RawUpload::new("app.log", SCENARIO_LOG));

    let backend: Arc<dyn GenerationBackend> = Arc::new(PanickingBackend);
    let client = GenerationClient::new(Some(backend), 256, RetryConfig::none());
    let orchestrator = JobOrchestrator::new(
        Arc::new(Analyzer::with_client(AnalyzerOptions::default(), client)),
        JobOptions::default(),
        Collaborators::in_memory(store.clone()),
    );

    let job = orchestrator.run(UploadId(1), "ops").await.unwrap();
    assert_eq!(job.status, JobStatus::Done);
    assert!(job.error.is_none());

    let result = job.result.unwrap();
    assert_eq!(result.source(), Source::HeuristicFallback);
    assert!(result.summary().contains("1 error-like"));

    let stored = orchestrator.result(job.id).await.unwrap().unwrap();
    assert_eq!(stored.result, result);
}

/// Event sink that crashes when a batch is flushed
struct PanickingEvents;

#[async_trait]
impl EventSink for PanickingEvents {
    async fn exists(&self, _: &EntryKey) -> Result<bool> {
        Ok(false)
    }

    async fn insert_batch(&self, _: Vec<LogEntry>) -> Result<()> {
        panic!("storage driver bug");
    }
}

#[tokio::test]
async fn test_crashed_worker_fails_job() {
    init_logging();

    let store = Arc::new(MemoryStore::new());
    store.add_upload(UploadId(1), RawUpload::new("app.log", SCENARIO_LOG));

    let mut collaborators = Collaborators::in_memory(store.clone());
    collaborators.events = Arc::new(PanickingEvents);

    let orchestrator = JobOrchestrator::new(
        Arc::new(Analyzer::heuristic_only(AnalyzerOptions::default())),
        JobOptions::default(),
        collaborators,
    );

    let handle = orchestrator.submit(UploadId(1), "ops").await.unwrap();
    let id = handle.id();
    let job = handle.wait().await.unwrap();

    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.finished_at.is_some());
    assert!(job.error.as_deref().unwrap().starts_with("internal error:"));

    // The recorded status is terminal too, never left running
    let polled = orchestrator.status(id).await.unwrap().unwrap();
    assert_eq!(polled.status, JobStatus::Failed);
    assert_eq!(polled.error, job.error);
    assert!(orchestrator.result(id).await.unwrap().is_none());
}

/// Result sink whose writes always fail
struct BrokenResults;

#[async_trait]
impl ResultSink for BrokenResults {
    async fn store(&self, _: &ResultEnvelope) -> Result<()> {
        Err(Error::persistence("disk quota exceeded"))
    }

    async fn load(&self, _: JobId) -> Result<Option<ResultEnvelope>> {
        Ok(None)
    }

    async fn store_report(&self, _: &Report) -> Result<()> {
        Err(Error::persistence("disk quota exceeded"))
    }
}

#[tokio::test]
async fn test_result_store_failure_fails_job() {
    init_logging();

    let store = Arc::new(MemoryStore::new());
    store.add_upload(UploadId(1), RawUpload::new("app.log", SCENARIO_LOG));

    let orchestrator = JobOrchestrator::new(
        Arc::new(Analyzer::heuristic_only(AnalyzerOptions::default())),
        JobOptions::default(),
        Collaborators::in_memory(store.clone()).with_results(Arc::new(BrokenResults)),
    );

    let handle = orchestrator.submit(UploadId(1), "ops").await.unwrap();
    let id = handle.id();
    let job = handle.wait().await.unwrap();

    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.result.is_none());
    assert!(
        job.error
            .as_deref()
            .unwrap()
            .starts_with("failed to save result:")
    );

    let polled = orchestrator.status(id).await.unwrap().unwrap();
    assert_eq!(polled.status, JobStatus::Failed);
    assert!(store.reports().is_empty());
}

#[tokio::test]
async fn test_suggest_without_backend() {
    let analyzer = Analyzer::heuristic_only(AnalyzerOptions::default());

    let hints = analyzer.suggest("NullPointerException in worker").await.unwrap();
    assert_eq!(
        hints,
        vec!["Text includes error keywords; consider running full analysis on the related logs."]
    );

    let hints = analyzer.suggest("all good").await.unwrap();
    assert_eq!(hints, vec!["No obvious issues detected by lightweight analysis."]);

    assert!(matches!(
        analyzer.suggest("   ").await,
        Err(Error::InvalidInput(_))
    ));
}

#[tokio::test]
async fn test_suggest_flattens_issues() {
    let analyzer = analyzer_answering(
        json!({ "text": r#"{"summary":"s","issues_found":[{"title":"Disk full","how_to_fix":"Free space"}],"extra_insights":["Add monitoring"]}"# }),
        Duration::ZERO,
    );

    let suggestions = analyzer.suggest("ERROR disk full").await.unwrap();
    assert_eq!(suggestions, vec!["Disk full: Free space", "Add monitoring"]);
}
