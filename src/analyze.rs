//! Prompt assembly and result selection
//!
//! [`Analyzer::analyze`] is the whole single-text pipeline:
//!
//! ```text
//! text ─ redact ─ extract events ─┬─ len <= max_log_chars ─ full redacted text ─┐
//!                                 └─ otherwise ─ sampled snippets ──────────────┤
//!                                                                               ▼
//!                         PROMPT_PREFIX + body ─ GenerationClient::invoke ─ select_result
//! ```
//!
//! Result selection is strict: a recovered JSON object becomes
//! [`AnalysisResult::Structured`] (every string redacted again), any other text becomes
//! [`AnalysisResult::TextOnly`], and no output at all becomes the heuristic summary.

use crate::client::GenerationClient;
use crate::config::AnalyzerOptions;
use crate::extract::EventExtractor;
use crate::heuristic;
use crate::parse::extract_json;
use crate::redact::{redact, redact_value};
use crate::sampler::{render_snippets, sample_snippets};
use crate::types::{AnalysisResult, StructuredAnalysis};
use crate::{Error, Result};

/// Instructions sent ahead of the log text
pub const PROMPT_PREFIX: &str = r#"
You are an expert log analyst. A normal non-technical user uploaded these logs from their application.
Explain clearly in plain language what is wrong (if anything), why it happened, and how to fix it.
Return a single JSON object EXACTLY like this schema (fill in values -- human text OK inside values):

{
  "summary": "<string>",

  "issues_found": [
    {
      "title": "<string>",
      "why_it_happened": "<string>",
      "how_to_fix": "<string>",
      "severity": "<low|medium|high|critical>",
      "occurrences": <number>
    }
  ],

  "extra_insights": ["<string>", ...]
}

Rules:
- DO NOT output anything outside the JSON object.
- Redact secrets/PII using [REDACTED].
- Keep responses concise and actionable.
Now analyze the logs below and return that JSON only.
LOGS:
"#;

/// Filename used for ad-hoc [`Analyzer::suggest`] queries
const QUERY_FILENAME: &str = "query.txt";

/// Runs the analysis pipeline for one text
#[derive(Debug, Clone)]
pub struct Analyzer {
    options: AnalyzerOptions,
    client: GenerationClient,
}

impl Analyzer {
    /// Build the analyzer and its backend from `options`
    pub fn new(options: AnalyzerOptions) -> Result<Self> {
        let client = GenerationClient::from_options(&options)?;
        Ok(Self { options, client })
    }

    /// Use a caller-supplied client, typically wrapping a custom backend
    pub fn with_client(options: AnalyzerOptions, client: GenerationClient) -> Self {
        Self { options, client }
    }

    /// An analyzer that never calls out and always returns the heuristic result
    pub fn heuristic_only(options: AnalyzerOptions) -> Self {
        Self::with_client(options, GenerationClient::disabled())
    }

    pub fn options(&self) -> &AnalyzerOptions {
        &self.options
    }

    pub fn is_generation_enabled(&self) -> bool {
        self.client.is_enabled()
    }

    /// Whether `redacted` fits the full-text budget, counted in characters
    fn fits_budget(&self, redacted: &str) -> bool {
        redacted.chars().count() <= self.options.max_log_chars
    }

    /// Prompt for already-redacted text: full text when it fits, sampled snippets otherwise
    pub fn build_prompt(&self, redacted: &str) -> String {
        let body = if self.fits_budget(redacted) {
            redacted.to_string()
        } else {
            let events = EventExtractor::new(self.options.max_events).extract(redacted);
            let snippets = sample_snippets(
                &events,
                self.options.max_snippets,
                self.options.snippet_window,
            );
            format!(
                "(NOTE: full log truncated; showing {} sampled snippets around errors/warnings)\n\n{}",
                snippets.len(),
                render_snippets(&snippets)
            )
        };

        format!("{}\n{}\n", PROMPT_PREFIX, body)
    }

    /// The heuristic result for raw text
    pub fn fallback(&self, text: &str) -> AnalysisResult {
        heuristic::summarize(&redact(text), self.options.max_events)
    }

    /// Analyze one text. Always produces a result.
    pub async fn analyze(&self, text: &str, filename: &str) -> AnalysisResult {
        if text.trim().is_empty() {
            return heuristic::summarize(text, self.options.max_events);
        }

        let redacted = redact(text);
        log::info!(
            "analyze: filename={} chars={} full_log={}",
            filename,
            redacted.chars().count(),
            self.fits_budget(&redacted)
        );

        let prompt = self.build_prompt(&redacted);
        let output = self.client.invoke(&prompt).await;
        select_result(output, &redacted, self.options.max_events)
    }

    /// Flatten an analysis of ad-hoc text into suggestion lines.
    ///
    /// Without a backend a single keyword hint is returned instead.
    pub async fn suggest(&self, text: &str) -> Result<Vec<String>> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::invalid_input("text required"));
        }

        if !self.client.is_enabled() {
            let lower = text.to_lowercase();
            let hint = if lower.contains("error") || lower.contains("exception") {
                "Text includes error keywords; consider running full analysis on the related logs."
            } else {
                "No obvious issues detected by lightweight analysis."
            };
            return Ok(vec![hint.to_string()]);
        }

        Ok(self.analyze(text, QUERY_FILENAME).await.suggestions())
    }
}

/// Choose the result for a generation outcome.
///
/// `redacted` feeds the heuristic when there is no output.
pub fn select_result(output: Option<String>, redacted: &str, max_events: usize) -> AnalysisResult {
    let Some(output) = output else {
        return heuristic::summarize(redacted, max_events);
    };

    match extract_json(&output).and_then(|v| StructuredAnalysis::from_value(redact_value(v))) {
        Some(analysis) => AnalysisResult::Structured(analysis),
        None => {
            log::debug!("Model output carried no JSON object; keeping it as text");
            AnalysisResult::TextOnly {
                summary: redact(&output),
            }
        }
    }
}
