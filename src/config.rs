//! Configuration for the analyzer and the job orchestrator
//!
//! Everything here is resolved once at startup and passed down explicitly:
//! [`AnalyzerOptions`] configures redaction budgets, sampling and the generation
//! backend, [`JobOptions`] configures per-job ingestion limits and the generation
//! timeout.
//!
//! # Environment
//!
//! [`AnalyzerOptions::from_env`] reads:
//!
//! | Variable | Meaning | Default |
//! |---|---|---|
//! | `LOG_INSIGHT_BACKEND` | `gemini`, `openai` (and aliases) or `none` | `gemini` when a key is set |
//! | `LOG_INSIGHT_API_KEY` / `GEMINI_API_KEY` / `GOOGLE_API_KEY` | backend credential | unset |
//! | `LOG_INSIGHT_MODEL` / `GEMINI_MODEL` | model name | `gemini-1.5-mini` |
//! | `LOG_INSIGHT_BASE_URL` | endpoint override | backend default |
//! | `GEMINI_MAX_TOKENS` | max output tokens | `1200` |
//! | `MAX_LOG_CHARS` | full-text budget before sampling | `200000` |
//! | `MAX_EVENTS_IN_MEMORY` | event extraction cap | `20000` |
//! | `LOG_INSIGHT_TIMEOUT` | HTTP request timeout (seconds) | `30` |
//!
//! # Examples
//!
//! ```rust
//! use log_insight::{AnalyzerOptions, Backend};
//!
//! let options = AnalyzerOptions::builder()
//!     .backend(Backend::OpenAiCompat)
//!     .model("qwen2.5-32b-instruct")
//!     .build()
//!     .unwrap();
//! assert_eq!(options.base_url, "http://localhost:1234/v1");
//! ```

use crate::retry::RetryConfig;
use crate::{Error, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Default model when none is configured
pub const DEFAULT_MODEL: &str = "gemini-1.5-mini";

/// Supported generation backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Google Generative Language API (`models/{model}:generateContent`)
    Gemini,
    /// Any OpenAI-compatible `/chat/completions` server (LM Studio, Ollama, vLLM, ...)
    OpenAiCompat,
}

impl Backend {
    /// Get the default base URL for this backend
    pub fn default_url(&self) -> &'static str {
        match self {
            Backend::Gemini => "https://generativelanguage.googleapis.com/v1beta",
            Backend::OpenAiCompat => "http://localhost:1234/v1",
        }
    }

    /// Parse a backend from a string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "gemini" | "google" | "genai" => Some(Backend::Gemini),
            "openai" | "openai-compat" | "openai_compat" | "lmstudio" | "ollama" | "vllm"
            | "llamacpp" | "llama.cpp" => Some(Backend::OpenAiCompat),
            _ => None,
        }
    }

    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Gemini => "gemini",
            Backend::OpenAiCompat => "openai-compat",
        }
    }
}

/// Resolve the API key from a variable lookup.
///
/// Priority: `LOG_INSIGHT_API_KEY`, `GEMINI_API_KEY`, `GOOGLE_API_KEY`. Blank values are ignored.
pub fn get_api_key<F>(lookup: F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    ["LOG_INSIGHT_API_KEY", "GEMINI_API_KEY", "GOOGLE_API_KEY"]
        .iter()
        .filter_map(|key| lookup(key))
        .find(|value| !value.trim().is_empty())
}

/// Resolve the model name from a variable lookup or fallback
///
/// Priority:
/// 1. `LOG_INSIGHT_MODEL`
/// 2. `GEMINI_MODEL`
/// 3. fallback parameter
pub fn get_model<F>(lookup: F, fallback: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup("LOG_INSIGHT_MODEL")
        .or_else(|| lookup("GEMINI_MODEL"))
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

/// Resolve the base URL from `LOG_INSIGHT_BASE_URL` or the backend default
pub fn get_base_url<F>(lookup: F, backend: Backend) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup("LOG_INSIGHT_BASE_URL")
        .filter(|u| !u.trim().is_empty())
        .unwrap_or_else(|| backend.default_url().to_string())
}

/// Resolve which backend to use.
///
/// An explicit `LOG_INSIGHT_BACKEND=none` disables generation. When the variable is
/// unset, Gemini is selected only if a credential is present.
pub fn get_backend<F>(lookup: F) -> Option<Backend>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup("LOG_INSIGHT_BACKEND") {
        Some(value) => match value.trim().to_lowercase().as_str() {
            "" => get_api_key(&lookup).map(|_| Backend::Gemini),
            "none" | "off" | "disabled" => None,
            other => {
                let parsed = Backend::from_str(other);
                if parsed.is_none() {
                    log::warn!("Unknown LOG_INSIGHT_BACKEND '{}'; generation disabled", other);
                }
                parsed
            }
        },
        None => get_api_key(&lookup).map(|_| Backend::Gemini),
    }
}

/// Parse a numeric variable, falling back to `default` when unset or malformed
pub fn env_or<T, F>(lookup: F, key: &str, default: T) -> T
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            log::warn!("Ignoring malformed {}={:?}", key, raw);
            default
        }),
        None => default,
    }
}

/// Options for the analysis pipeline
#[derive(Clone)]
pub struct AnalyzerOptions {
    /// Generation backend (None disables generation; the heuristic result is always used)
    pub backend: Option<Backend>,

    /// Model name
    pub model: String,

    /// Backend endpoint URL
    pub base_url: String,

    /// API key
    pub api_key: Option<String>,

    /// Maximum output tokens requested from the backend
    pub max_output_tokens: u32,

    /// Sampling temperature
    pub temperature: f32,

    /// HTTP request timeout in seconds
    pub request_timeout: u64,

    /// Redacted text longer than this is replaced by sampled snippets
    pub max_log_chars: usize,

    /// Event extraction cap
    pub max_events: usize,

    /// Maximum snippets sent when sampling
    pub max_snippets: usize,

    /// Lines of context on each side of a sampled error
    pub snippet_window: usize,

    /// Retry policy for transient backend failures
    pub retry: RetryConfig,
}

impl std::fmt::Debug for AnalyzerOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyzerOptions")
            .field("backend", &self.backend)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("max_output_tokens", &self.max_output_tokens)
            .field("temperature", &self.temperature)
            .field("request_timeout", &self.request_timeout)
            .field("max_log_chars", &self.max_log_chars)
            .field("max_events", &self.max_events)
            .field("max_snippets", &self.max_snippets)
            .field("snippet_window", &self.snippet_window)
            .field("retry", &self.retry)
            .finish()
    }
}

impl Default for AnalyzerOptions {
    fn default() -> Self {
        Self {
            backend: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: String::new(),
            api_key: None,
            max_output_tokens: 1200,
            temperature: 0.0,
            request_timeout: 30,
            max_log_chars: 200_000,
            max_events: 20_000,
            max_snippets: 12,
            snippet_window: 4,
            retry: RetryConfig::default()
                .with_max_attempts(2)
                .with_initial_delay(Duration::from_millis(500)),
        }
    }
}

impl AnalyzerOptions {
    /// Create a new builder for AnalyzerOptions
    pub fn builder() -> AnalyzerOptionsBuilder {
        AnalyzerOptionsBuilder::default()
    }

    /// Read options from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read options through an arbitrary variable lookup.
    ///
    /// Never fails: a backend that cannot be configured is disabled and logged, so
    /// analysis degrades to the heuristic result.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let api_key = get_api_key(&lookup);
        let mut backend = get_backend(&lookup);

        if backend == Some(Backend::Gemini) && api_key.is_none() {
            log::info!("No Gemini API key configured; using heuristic analysis only");
            backend = None;
        }

        let base_url = backend
            .map(|b| get_base_url(&lookup, b))
            .unwrap_or_default();

        Self {
            backend,
            model: get_model(&lookup, DEFAULT_MODEL),
            base_url,
            api_key,
            max_output_tokens: env_or(&lookup, "GEMINI_MAX_TOKENS", defaults.max_output_tokens),
            request_timeout: env_or(&lookup, "LOG_INSIGHT_TIMEOUT", defaults.request_timeout),
            max_log_chars: env_or(&lookup, "MAX_LOG_CHARS", defaults.max_log_chars),
            max_events: env_or(&lookup, "MAX_EVENTS_IN_MEMORY", defaults.max_events),
            ..defaults
        }
    }
}

/// Builder for AnalyzerOptions
#[derive(Default)]
pub struct AnalyzerOptionsBuilder {
    backend: Option<Backend>,
    model: Option<String>,
    base_url: Option<String>,
    api_key: Option<String>,
    max_output_tokens: Option<u32>,
    temperature: Option<f32>,
    request_timeout: Option<u64>,
    max_log_chars: Option<usize>,
    max_events: Option<usize>,
    max_snippets: Option<usize>,
    snippet_window: Option<usize>,
    retry: Option<RetryConfig>,
}

impl std::fmt::Debug for AnalyzerOptionsBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyzerOptionsBuilder")
            .field("backend", &self.backend)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl AnalyzerOptionsBuilder {
    pub fn backend(mut self, backend: Backend) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn max_output_tokens(mut self, tokens: u32) -> Self {
        self.max_output_tokens = Some(tokens);
        self
    }

    pub fn temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn request_timeout(mut self, secs: u64) -> Self {
        self.request_timeout = Some(secs);
        self
    }

    pub fn max_log_chars(mut self, chars: usize) -> Self {
        self.max_log_chars = Some(chars);
        self
    }

    pub fn max_events(mut self, events: usize) -> Self {
        self.max_events = Some(events);
        self
    }

    pub fn max_snippets(mut self, snippets: usize) -> Self {
        self.max_snippets = Some(snippets);
        self
    }

    pub fn snippet_window(mut self, window: usize) -> Self {
        self.snippet_window = Some(window);
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn build(self) -> Result<AnalyzerOptions> {
        let defaults = AnalyzerOptions::default();

        if self.max_events == Some(0) {
            return Err(Error::config("max_events must be greater than zero"));
        }

        if self.max_snippets == Some(0) {
            return Err(Error::config("max_snippets must be greater than zero"));
        }

        if let Some(temp) = self.temperature {
            if !(0.0..=2.0).contains(&temp) {
                return Err(Error::config("temperature must be between 0.0 and 2.0"));
            }
        }

        let base_url = match (self.base_url, self.backend) {
            (Some(url), _) => url.trim_end_matches('/').to_string(),
            (None, Some(backend)) => backend.default_url().to_string(),
            (None, None) => String::new(),
        };

        if self.backend == Some(Backend::Gemini) && self.api_key.is_none() {
            return Err(Error::config("api_key is required for the gemini backend"));
        }

        let model = self.model.unwrap_or(defaults.model);
        if self.backend.is_some() && model.trim().is_empty() {
            return Err(Error::config("model is required"));
        }

        Ok(AnalyzerOptions {
            backend: self.backend,
            model,
            base_url,
            api_key: self.api_key,
            max_output_tokens: self.max_output_tokens.unwrap_or(defaults.max_output_tokens),
            temperature: self.temperature.unwrap_or(defaults.temperature),
            request_timeout: self.request_timeout.unwrap_or(defaults.request_timeout),
            max_log_chars: self.max_log_chars.unwrap_or(defaults.max_log_chars),
            max_events: self.max_events.unwrap_or(defaults.max_events),
            max_snippets: self.max_snippets.unwrap_or(defaults.max_snippets),
            snippet_window: self.snippet_window.unwrap_or(defaults.snippet_window),
            retry: self.retry.unwrap_or(defaults.retry),
        })
    }
}

/// Limits applied by the job orchestrator
#[derive(Debug, Clone)]
pub struct JobOptions {
    /// Only the first N non-blank lines are ingested
    pub max_lines: usize,

    /// Stored raw line (and dedup key) length, in characters
    pub raw_truncate: usize,

    /// Stored message length, in characters
    pub message_truncate: usize,

    /// Entries per flush; progress is published at the same cadence
    pub batch_size: usize,

    /// Leading lines of the upload handed to the analyzer
    pub sample_lines: usize,

    /// Hard limit on the analysis call
    pub generation_timeout: Duration,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            max_lines: 1000,
            raw_truncate: 8000,
            message_truncate: 4000,
            batch_size: 50,
            sample_lines: 200,
            generation_timeout: Duration::from_secs(25),
        }
    }
}

impl JobOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_lines(mut self, lines: usize) -> Self {
        self.max_lines = lines;
        self
    }

    pub fn with_raw_truncate(mut self, chars: usize) -> Self {
        self.raw_truncate = chars;
        self
    }

    pub fn with_message_truncate(mut self, chars: usize) -> Self {
        self.message_truncate = chars;
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    pub fn with_sample_lines(mut self, lines: usize) -> Self {
        self.sample_lines = lines;
        self
    }

    pub fn with_generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout = timeout;
        self
    }
}
