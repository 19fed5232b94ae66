//! # log-insight
//!
//! Analysis pipeline for uploaded log files: secret redaction, event extraction,
//! payload sampling, a text-generation call with tolerant JSON recovery, and a
//! deterministic heuristic fallback, driven by background jobs that always end in a
//! terminal state.
//!
//! ## Overview
//!
//! ```text
//! raw upload ─▶ redact ─▶ extract events ─▶ [full text | sampled snippets]
//!            ─▶ prompt ─▶ GenerationClient ─▶ extract_json
//!            ─▶ Structured (genai) | TextOnly (genai_text) | Heuristic (heuristic_fallback)
//! ```
//!
//! Generation is optional. Without a configured backend, or when the backend fails,
//! times out or answers with nothing usable, the heuristic summary is returned instead.
//!
//! ## Analyzing text directly
//!
//! ```rust,no_run
//! use log_insight::{Analyzer, AnalyzerOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads GEMINI_API_KEY, GEMINI_MODEL, MAX_LOG_CHARS, ...
//!     let analyzer = Analyzer::new(AnalyzerOptions::from_env())?;
//!
//!     let result = analyzer
//!         .analyze("2024-01-01 10:00:00 ERROR disk full\n", "app.log")
//!         .await;
//!     println!("[{}] {}", result.source(), result.summary());
//!     Ok(())
//! }
//! ```
//!
//! ## Background jobs
//!
//! ```rust,no_run
//! use log_insight::{
//!     Analyzer, AnalyzerOptions, Collaborators, JobOptions, JobOrchestrator, MemoryStore,
//!     RawUpload, UploadId,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(MemoryStore::new());
//!     store.add_upload(UploadId(1), RawUpload::new("app.log", "ERROR boom\nINFO ok\n"));
//!
//!     let analyzer = Arc::new(Analyzer::new(AnalyzerOptions::from_env())?);
//!     let orchestrator =
//!         JobOrchestrator::new(analyzer, JobOptions::default(), Collaborators::in_memory(store));
//!
//!     let handle = orchestrator.submit(UploadId(1), "ops@example.com").await?;
//!     let job = handle.wait().await?;
//!     println!("job {} is {}", job.id, job.status);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **redact**: secret scrubbing for prompts and model output
//! - **extract**: line-to-event conversion with timestamp and level detection
//! - **sampler**: error-centred snippet windows for oversized logs
//! - **parse**: JSON object recovery from free-form model output
//! - **heuristic**: the deterministic fallback summary
//! - **backend** / **client**: remote generation and defensive text extraction
//! - **analyze**: prompt assembly and result selection
//! - **job** / **ingest** / **orchestrator**: the background job lifecycle
//! - **sink** / **store**: collaborator traits and their implementations
//! - **config** / **error** / **retry**: configuration, errors, backoff

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

/// Prompt assembly and result selection for a single text.
mod analyze;

/// Generation backends (Gemini, OpenAI-compatible) behind one trait.
mod backend;

/// Generation client that never fails: text or nothing.
mod client;

/// Backend selection, environment resolution and pipeline limits.
mod config;

/// Error types and the crate-wide `Result` alias.
mod error;

/// Timestamp and level detection, line-to-event conversion.
mod extract;

/// Deterministic summary used when generation yields nothing.
mod heuristic;

/// Line parsing, deduplication and batched inserts for jobs.
mod ingest;

/// Job record and lifecycle transitions.
mod job;

/// Background job execution.
mod orchestrator;

/// Lenient JSON recovery from model output.
mod parse;

/// Secret scrubbing.
mod redact;

/// Snippet sampling for oversized inputs.
mod sampler;

/// Collaborator traits for uploads, events, results and job status.
mod sink;

/// In-memory and file-backed collaborators.
mod store;

/// Domain and wire types.
mod types;

/// SSE parsing and streamed text aggregation.
mod utils;

// ============================================================================
// PUBLIC EXPORTS
// ============================================================================

/// Retry utilities with exponential backoff and jitter.
pub mod retry;

// --- Pipeline ---

pub use analyze::{Analyzer, PROMPT_PREFIX, select_result};
pub use extract::{EventExtractor, detect_level, find_timestamp, parse_timestamp};
pub use heuristic::{MAX_EVIDENCE_LINES, summarize};
pub use parse::{clean_json_like, extract_json};
pub use redact::{REDACTED, redact, redact_value, secret_patterns};
pub use sampler::{is_error_like, render_snippets, sample_snippets};

// --- Generation ---

pub use backend::{
    GeminiBackend, GenerationBackend, InvocationShape, OpenAiCompatBackend, build_backend,
};
pub use client::{GenerationClient, response_text};
pub use utils::{
    TextAggregator, collect_text, decode_sse_stream, parse_sse_data, parse_sse_stream,
};

// --- Configuration ---

pub use config::{
    AnalyzerOptions, AnalyzerOptionsBuilder, Backend, DEFAULT_MODEL, JobOptions, get_api_key,
    get_backend, get_base_url, get_model,
};

// --- Error Handling ---

pub use error::{Error, Result};

// --- Jobs ---

pub use ingest::{
    IngestStats, LineIngestor, ParsedLine, is_error_like_line, parse_line, progress_for,
};
pub use job::{Job, JobStatus, STARTED_PROGRESS};
pub use orchestrator::{Collaborators, JobHandle, JobOrchestrator};
pub use sink::{EventSink, JobStatusSink, ResultSink, UploadSource};
pub use store::{FileResultSink, FsUploadSource, MemoryStore};

// --- Core Types ---

pub use types::{
    AnalysisResult, EntryKey, Event, Issue, JobId, Level, LogEntry, MODEL_SOURCE_KEY, RawUpload,
    Report, ResultEnvelope, Severity, Snippet, Source, StructuredAnalysis, UploadId,
};

// --- Backend Wire Types ---

pub use types::{
    GeminiCandidate, GeminiContent, GeminiGenerationConfig, GeminiPart, GeminiRequest,
    GeminiResponse, OpenAIChoice, OpenAIChunk, OpenAICompletion, OpenAICompletionChoice,
    OpenAIDelta, OpenAIMessage, OpenAIRequest,
};

// ============================================================================
// CONVENIENCE PRELUDE
// ============================================================================

/// The types most callers need: `use log_insight::prelude::*;`
pub mod prelude {
    pub use crate::{
        AnalysisResult, Analyzer, AnalyzerOptions, Backend, Collaborators, Error,
        GenerationBackend, Job, JobOptions, JobOrchestrator, JobStatus, MemoryStore, RawUpload,
        Result, Source, UploadId,
    };
}
