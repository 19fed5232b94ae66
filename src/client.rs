//! Generation client: prompt in, text or nothing out
//!
//! [`GenerationClient::invoke`] never returns an error. Missing configuration,
//! transport failures, API rejections and responses without any text all collapse
//! into `None`, with the cause logged for diagnosis.
//!
//! # Flow
//!
//! ```text
//! invoke(prompt)
//!     │ for shape in backend.shapes()
//!     │     retry_transient(backend.generate(prompt, max_tokens, shape))
//!     │         Err  → log, next shape
//!     │         Ok   → response_text(body)
//!     │                  Some(text) → return Some(text)
//!     │                  None       → log, next shape
//!     ▼
//! None
//! ```
//!
//! # Text extraction
//!
//! The response body is not a contract this crate controls, so [`response_text`]
//! checks, in order:
//!
//! 1. a `text` or `output_text` field (string or list)
//! 2. an `output` list of content parts
//! 3. a `candidates` list (Gemini)
//! 4. a `choices` list (OpenAI completions)
//! 5. any other non-empty object, serialized whole

use crate::backend::{GenerationBackend, build_backend};
use crate::config::AnalyzerOptions;
use crate::retry::{RetryConfig, retry_transient};
use crate::types::{GeminiCandidate, OpenAICompletion};
use crate::Result;
use serde_json::Value;
use std::sync::Arc;

/// Wraps an optional backend with retries and defensive text extraction
#[derive(Clone)]
pub struct GenerationClient {
    backend: Option<Arc<dyn GenerationBackend>>,
    max_output_tokens: u32,
    retry: RetryConfig,
}

impl std::fmt::Debug for GenerationClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationClient")
            .field("backend", &self.backend.as_ref().map(|b| b.name().to_string()))
            .field("max_output_tokens", &self.max_output_tokens)
            .field("retry", &self.retry)
            .finish()
    }
}

impl GenerationClient {
    pub fn new(
        backend: Option<Arc<dyn GenerationBackend>>,
        max_output_tokens: u32,
        retry: RetryConfig,
    ) -> Self {
        Self {
            backend,
            max_output_tokens,
            retry,
        }
    }

    /// A client that always yields no output
    pub fn disabled() -> Self {
        Self::new(None, 0, RetryConfig::none())
    }

    /// Build the backend described by `options`.
    ///
    /// Fails only when the backend is configured but cannot be constructed.
    pub fn from_options(options: &AnalyzerOptions) -> Result<Self> {
        Ok(Self::new(
            build_backend(options)?,
            options.max_output_tokens,
            options.retry.clone(),
        ))
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    /// Generate text for `prompt`; `None` when nothing usable came back
    pub async fn invoke(&self, prompt: &str) -> Option<String> {
        let Some(backend) = &self.backend else {
            log::debug!("No generation backend configured");
            return None;
        };

        for &shape in backend.shapes() {
            let label = format!("{} {:?}", backend.name(), shape);
            let attempt = retry_transient(&self.retry, &label, || {
                backend.generate(prompt, self.max_output_tokens, shape)
            })
            .await;

            match attempt {
                Ok(body) => match response_text(&body) {
                    Some(text) => {
                        log::debug!("{}: received {} chars", label, text.len());
                        return Some(text);
                    }
                    None => log::warn!("{}: response carried no text", label),
                },
                Err(e) => log::warn!("{}: generation failed: {}", label, e),
            }
        }

        log::warn!("{}: all invocation shapes failed", backend.name());
        None
    }
}

/// Extract the generated text from an arbitrary response body
pub fn response_text(body: &Value) -> Option<String> {
    if let Value::String(s) = body {
        return non_empty(s.clone());
    }

    let Value::Object(map) = body else {
        return None;
    };

    let direct = ["text", "output_text"]
        .iter()
        .filter_map(|key| map.get(*key))
        .find_map(|v| non_empty(joined_text(v)));
    if direct.is_some() {
        return direct;
    }

    if let Some(Value::Array(parts)) = map.get("output") {
        let text: String = parts.iter().map(part_text).collect();
        if let Some(text) = non_empty(text) {
            return Some(text);
        }
    }

    if let Some(Value::Array(candidates)) = map.get("candidates") {
        if let Some(text) = non_empty(candidates.iter().map(candidate_text).collect()) {
            return Some(text);
        }
    }

    if map.contains_key("choices") {
        let completion = serde_json::from_value::<OpenAICompletion>(body.clone()).ok();
        let text: String = completion
            .into_iter()
            .flat_map(|c| c.choices)
            .filter_map(|choice| {
                choice
                    .message
                    .and_then(|m| m.content)
                    .or(choice.text)
            })
            .collect();
        if let Some(text) = non_empty(text) {
            return Some(text);
        }
    }

    if map.is_empty() {
        None
    } else {
        Some(body.to_string())
    }
}

fn non_empty(text: String) -> Option<String> {
    (!text.trim().is_empty()).then_some(text)
}

/// A string, or the concatenated strings of a list
fn joined_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(part_text).collect(),
        _ => String::new(),
    }
}

/// Text of one content part: a string, `{text}`, or `{content: [parts]}`
fn part_text(part: &Value) -> String {
    match part {
        Value::String(s) => s.clone(),
        Value::Object(map) => {
            if let Some(Value::String(s)) = map.get("text") {
                s.clone()
            } else if let Some(content) = map.get("content") {
                joined_text(content)
            } else {
                String::new()
            }
        }
        _ => String::new(),
    }
}

fn candidate_text(candidate: &Value) -> String {
    let parsed = serde_json::from_value::<GeminiCandidate>(candidate.clone()).ok();
    let from_parts: String = parsed
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect()
        })
        .unwrap_or_default();

    if from_parts.is_empty() {
        part_text(candidate)
    } else {
        from_parts
    }
}
