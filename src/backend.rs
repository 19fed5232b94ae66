//! Generation backends
//!
//! A backend turns a prompt into a raw response object. It knows the wire protocol of
//! one remote service and nothing about analysis: text extraction, retries and
//! degradation to "no output" live in [`GenerationClient`](crate::GenerationClient).
//!
//! Each backend lists the [`InvocationShape`]s it can send, in the order they should be
//! tried. Remote APIs drift across versions; a server that rejects the full request
//! often still accepts the minimal one.

use crate::config::{AnalyzerOptions, Backend};
use crate::types::{
    GeminiContent, GeminiGenerationConfig, GeminiPart, GeminiRequest, OpenAIMessage,
    OpenAIRequest,
};
use crate::utils::{collect_text, parse_sse_stream};
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

/// Request layout sent to the remote service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationShape {
    /// Role-tagged message with generation settings; streamed where supported
    Structured,
    /// Prompt only, on the oldest endpoint the service offers
    Bare,
}

/// Capability to run one generation request
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Shapes to try, first preferred
    fn shapes(&self) -> &[InvocationShape] {
        &[InvocationShape::Structured]
    }

    /// Send `prompt` and return the decoded response body
    async fn generate(
        &self,
        prompt: &str,
        max_output_tokens: u32,
        shape: InvocationShape,
    ) -> Result<Value>;
}

fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))
}

/// Turn a non-2xx response into [`Error::Api`] carrying the status and body
async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_else(|e| {
        log::warn!("Failed to read error response body: {}", e);
        "Unknown error (failed to read response body)".to_string()
    });
    Err(Error::api(format!("API error {}: {}", status, body)))
}

/// Google Generative Language API
pub struct GeminiBackend {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    temperature: f32,
}

impl std::fmt::Debug for GeminiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiBackend")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &"***")
            .finish()
    }
}

impl GeminiBackend {
    pub fn new(options: &AnalyzerOptions) -> Result<Self> {
        let api_key = options
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| Error::config("api_key is required for the gemini backend"))?;

        Ok(Self {
            http: http_client(options.request_timeout)?,
            base_url: base_url_or_default(options, Backend::Gemini),
            model: options.model.clone(),
            api_key,
            temperature: options.temperature,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl GenerationBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    fn shapes(&self) -> &[InvocationShape] {
        &[InvocationShape::Structured, InvocationShape::Bare]
    }

    async fn generate(
        &self,
        prompt: &str,
        max_output_tokens: u32,
        shape: InvocationShape,
    ) -> Result<Value> {
        let body = match shape {
            InvocationShape::Structured => serde_json::to_value(GeminiRequest {
                contents: vec![GeminiContent {
                    role: Some("user".to_string()),
                    parts: vec![GeminiPart {
                        text: Some(prompt.to_string()),
                    }],
                }],
                generation_config: GeminiGenerationConfig {
                    max_output_tokens,
                    temperature: self.temperature,
                },
            })?,
            InvocationShape::Bare => json!({ "contents": [{ "parts": [{ "text": prompt }] }] }),
        };

        log::debug!("gemini: POST {} ({:?})", self.endpoint(), shape);

        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(Error::Http)?;

        let response = ensure_success(response).await?;
        Ok(response.json::<Value>().await?)
    }
}

/// Any server speaking the OpenAI chat completions protocol
pub struct OpenAiCompatBackend {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
}

impl std::fmt::Debug for OpenAiCompatBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatBackend")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .finish()
    }
}

impl OpenAiCompatBackend {
    pub fn new(options: &AnalyzerOptions) -> Result<Self> {
        Ok(Self {
            http: http_client(options.request_timeout)?,
            base_url: base_url_or_default(options, Backend::OpenAiCompat),
            model: options.model.clone(),
            api_key: options.api_key.clone().filter(|k| !k.trim().is_empty()),
            temperature: options.temperature,
        })
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let request = self
            .http
            .post(format!("{}/{}", self.base_url, path))
            .header("Content-Type", "application/json");

        match &self.api_key {
            Some(key) => request.header("Authorization", format!("Bearer {}", key)),
            None => request,
        }
    }

    async fn chat(&self, prompt: &str, max_output_tokens: u32) -> Result<Value> {
        let request = OpenAIRequest {
            model: self.model.clone(),
            messages: vec![OpenAIMessage {
                role: "user".to_string(),
                content: Some(prompt.to_string()),
            }],
            stream: true,
            max_tokens: Some(max_output_tokens),
            temperature: Some(self.temperature),
        };

        let response = self
            .post("chat/completions")
            .json(&request)
            .send()
            .await
            .map_err(Error::Http)?;
        let response = ensure_success(response).await?;

        let streamed = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("text/event-stream"));

        if streamed {
            let text = collect_text(parse_sse_stream(response)).await?;
            Ok(json!({ "text": text }))
        } else {
            // Some servers ignore `stream: true` and answer with a whole completion
            Ok(response.json::<Value>().await?)
        }
    }

    async fn complete(&self, prompt: &str, max_output_tokens: u32) -> Result<Value> {
        let body = json!({
            "model": self.model,
            "prompt": prompt,
            "max_tokens": max_output_tokens,
        });

        let response = self
            .post("completions")
            .json(&body)
            .send()
            .await
            .map_err(Error::Http)?;
        let response = ensure_success(response).await?;
        Ok(response.json::<Value>().await?)
    }
}

#[async_trait]
impl GenerationBackend for OpenAiCompatBackend {
    fn name(&self) -> &str {
        "openai-compat"
    }

    fn shapes(&self) -> &[InvocationShape] {
        &[InvocationShape::Structured, InvocationShape::Bare]
    }

    async fn generate(
        &self,
        prompt: &str,
        max_output_tokens: u32,
        shape: InvocationShape,
    ) -> Result<Value> {
        log::debug!("openai-compat: {} ({:?})", self.base_url, shape);
        match shape {
            InvocationShape::Structured => self.chat(prompt, max_output_tokens).await,
            InvocationShape::Bare => self.complete(prompt, max_output_tokens).await,
        }
    }
}

fn base_url_or_default(options: &AnalyzerOptions, backend: Backend) -> String {
    if options.base_url.trim().is_empty() {
        backend.default_url().to_string()
    } else {
        options.base_url.trim_end_matches('/').to_string()
    }
}

/// Construct the configured backend, or `None` when generation is disabled
pub fn build_backend(options: &AnalyzerOptions) -> Result<Option<Arc<dyn GenerationBackend>>> {
    let backend: Arc<dyn GenerationBackend> = match options.backend {
        None => return Ok(None),
        Some(Backend::Gemini) => Arc::new(GeminiBackend::new(options)?),
        Some(Backend::OpenAiCompat) => Arc::new(OpenAiCompatBackend::new(options)?),
    };
    Ok(Some(backend))
}
