//! Core types for log-insight

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Identifier of an analysis job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of an uploaded file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadId(pub u64);

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Raw bytes of an uploaded file plus its declared name
#[derive(Debug, Clone)]
pub struct RawUpload {
    pub filename: String,
    pub content: Vec<u8>,
}

impl RawUpload {
    pub fn new(filename: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            content: content.into(),
        }
    }

    /// Content decoded as UTF-8, invalid sequences replaced
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.content).into_owned()
    }
}

/// Log severity recognised in a line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Info,
    Warn,
    Error,
    Critical,
    Debug,
    Trace,
    Unknown,
}

impl Level {
    /// Map a matched level token (any case) to a level. `WARNING` folds into `Warn`.
    pub fn from_token(token: &str) -> Level {
        match token.to_ascii_uppercase().as_str() {
            "INFO" => Level::Info,
            "WARN" | "WARNING" => Level::Warn,
            "ERROR" => Level::Error,
            "CRITICAL" => Level::Critical,
            "DEBUG" => Level::Debug,
            "TRACE" => Level::Trace,
            _ => Level::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Critical => "CRITICAL",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
            Level::Unknown => "UNKNOWN",
        }
    }

    /// Level name starts with `ERR`
    pub fn is_error(&self) -> bool {
        self.as_str().starts_with("ERR")
    }

    /// Level name starts with `WARN`
    pub fn is_warning(&self) -> bool {
        self.as_str().starts_with("WARN")
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One structured record derived from a single log line
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    pub raw: String,
    /// The line carried no parseable timestamp; `timestamp` was synthesized
    pub synthetic_timestamp: bool,
}

/// A window of raw lines around a signal-bearing event
#[derive(Debug, Clone, PartialEq)]
pub struct Snippet {
    pub center_index: usize,
    pub timestamp: DateTime<Utc>,
    pub text: String,
}

/// Issue severity as reported by the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Case-insensitive parse; unrecognised values yield None
    pub fn parse(value: &str) -> Option<Severity> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" | "minor" | "info" => Some(Severity::Low),
            "medium" | "moderate" | "warning" => Some(Severity::Medium),
            "high" | "major" | "error" => Some(Severity::High),
            "critical" | "crit" | "fatal" | "blocker" => Some(Severity::Critical),
            _ => None,
        }
    }
}

/// One problem identified by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub title: String,
    #[serde(rename = "why_it_happened", default)]
    pub why: String,
    #[serde(rename = "how_to_fix", default)]
    pub fix: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub occurrences: u64,
}

impl Issue {
    /// Lenient conversion from whatever the model put in `issues_found`
    pub fn from_value(value: &Value) -> Option<Issue> {
        match value {
            Value::Object(map) => {
                let text = |keys: &[&str]| {
                    keys.iter()
                        .find_map(|k| map.get(*k))
                        .map(value_to_text)
                        .unwrap_or_default()
                };

                let severity = map
                    .get("severity")
                    .and_then(Value::as_str)
                    .and_then(Severity::parse)
                    .unwrap_or_default();

                let occurrences = match map.get("occurrences") {
                    Some(Value::Number(n)) => n
                        .as_u64()
                        .or_else(|| n.as_f64().map(|f| f.max(0.0) as u64))
                        .unwrap_or(0),
                    Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
                    _ => 0,
                };

                Some(Issue {
                    title: text(&["title", "name", "issue"]),
                    why: text(&["why_it_happened", "why", "cause"]),
                    fix: text(&["how_to_fix", "fix", "solution"]),
                    severity,
                    occurrences,
                })
            }
            Value::String(s) if !s.trim().is_empty() => Some(Issue {
                title: s.clone(),
                why: String::new(),
                fix: String::new(),
                severity: Severity::default(),
                occurrences: 0,
            }),
            _ => None,
        }
    }
}

/// Key holding the provenance tag of a serialized [`AnalysisResult`]
const RESULT_TAG: &str = "source";

/// Where a model-supplied `source` value is kept
pub const MODEL_SOURCE_KEY: &str = "model_source";

/// Analysis decoded into the issues/insights schema
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StructuredAnalysis {
    #[serde(default)]
    pub summary: String,
    #[serde(rename = "issues_found", default)]
    pub issues: Vec<Issue>,
    #[serde(default)]
    pub extra_insights: Vec<String>,
    /// Keys the model returned beyond the schema. Never contains `source`, which
    /// tags the serialized [`AnalysisResult`].
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StructuredAnalysis {
    /// Build from a JSON object recovered from model output. Non-objects yield None.
    pub fn from_value(value: Value) -> Option<StructuredAnalysis> {
        let Value::Object(mut map) = value else {
            return None;
        };

        let summary = map
            .remove("summary")
            .map(|v| value_to_text(&v))
            .unwrap_or_default();

        let issues = match map.remove("issues_found") {
            Some(Value::Array(items)) => items.iter().filter_map(Issue::from_value).collect(),
            Some(other) => Issue::from_value(&other).into_iter().collect(),
            None => Vec::new(),
        };

        let extra_insights = match map.remove("extra_insights") {
            Some(Value::Array(items)) => items.iter().filter_map(insight_text).collect(),
            Some(other) => insight_text(&other).into_iter().collect(),
            None => Vec::new(),
        };

        if let Some(claimed) = map.remove(RESULT_TAG) {
            map.entry(MODEL_SOURCE_KEY).or_insert(claimed);
        }

        Some(StructuredAnalysis {
            summary,
            issues,
            extra_insights,
            extra: map,
        })
    }
}

fn insight_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Object(map) => map
            .get("title")
            .map(value_to_text)
            .or_else(|| Some(value.to_string())),
        other => {
            let text = value_to_text(other);
            (!text.trim().is_empty()).then_some(text)
        }
    }
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Which pipeline stage produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Genai,
    GenaiText,
    HeuristicFallback,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Genai => "genai",
            Source::GenaiText => "genai_text",
            Source::HeuristicFallback => "heuristic_fallback",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final analysis of one upload, tagged with its provenance under the `source` key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source")]
pub enum AnalysisResult {
    #[serde(rename = "genai")]
    Structured(StructuredAnalysis),

    #[serde(rename = "genai_text")]
    TextOnly { summary: String },

    #[serde(rename = "heuristic_fallback")]
    Heuristic {
        summary: String,
        evidence: Vec<String>,
    },
}

impl AnalysisResult {
    pub fn source(&self) -> Source {
        match self {
            AnalysisResult::Structured(_) => Source::Genai,
            AnalysisResult::TextOnly { .. } => Source::GenaiText,
            AnalysisResult::Heuristic { .. } => Source::HeuristicFallback,
        }
    }

    pub fn summary(&self) -> &str {
        match self {
            AnalysisResult::Structured(s) => &s.summary,
            AnalysisResult::TextOnly { summary } => summary,
            AnalysisResult::Heuristic { summary, .. } => summary,
        }
    }

    /// Flatten into one-line suggestions: `"{title}: {fix}"` per issue, then each insight.
    ///
    /// Text-only and heuristic results have no issues; they yield nothing.
    pub fn suggestions(&self) -> Vec<String> {
        let AnalysisResult::Structured(analysis) = self else {
            return Vec::new();
        };

        let mut out: Vec<String> = analysis
            .issues
            .iter()
            .map(|issue| {
                if issue.fix.trim().is_empty() {
                    issue.title.trim().to_string()
                } else {
                    format!("{}: {}", issue.title, issue.fix).trim().to_string()
                }
            })
            .collect();
        out.extend(analysis.extra_insights.iter().cloned());
        out
    }
}

/// What the result sink stores per job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    pub job_id: JobId,
    pub generated_at: DateTime<Utc>,
    pub result: AnalysisResult,
}

impl ResultEnvelope {
    pub fn new(job_id: JobId, result: AnalysisResult) -> Self {
        Self {
            job_id,
            generated_at: Utc::now(),
            result,
        }
    }
}

/// Short human-readable record written after a job completes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub job_id: JobId,
    pub owner: String,
    pub title: String,
    pub summary: String,
    pub created_at: DateTime<Utc>,
}

/// One ingested line as stored by the event sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub owner: String,
    pub upload_id: UploadId,
    pub timestamp: Option<DateTime<Utc>>,
    pub level: Option<String>,
    pub service: Option<String>,
    pub message: Option<String>,
    /// Stripped line, truncated; part of the dedup key
    pub raw: String,
}

impl LogEntry {
    pub fn key(&self) -> EntryKey {
        EntryKey {
            upload_id: self.upload_id,
            owner: self.owner.clone(),
            raw: self.raw.clone(),
        }
    }
}

/// Dedup identity of an ingested line
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntryKey {
    pub upload_id: UploadId,
    pub owner: String,
    pub raw: String,
}

// ============================================================================
// BACKEND WIRE TYPES
// ============================================================================

/// OpenAI-compatible chat completion request
#[derive(Debug, Clone, Serialize)]
pub struct OpenAIRequest {
    pub model: String,
    pub messages: Vec<OpenAIMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// OpenAI message format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
}

/// One SSE chunk of a streamed completion
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAIChunk {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<OpenAIChoice>,
}

/// Streamed choice
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAIChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub delta: OpenAIDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Incremental content of a streamed choice
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenAIDelta {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

/// Non-streamed completion (servers that ignore `stream: true`)
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAICompletion {
    #[serde(default)]
    pub choices: Vec<OpenAICompletionChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAICompletionChoice {
    #[serde(default)]
    pub message: Option<OpenAIMessage>,
    #[serde(default)]
    pub text: Option<String>,
}

/// Gemini `generateContent` request
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiRequest {
    pub contents: Vec<GeminiContent>,
    pub generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiGenerationConfig {
    pub max_output_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Gemini `generateContent` response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiResponse {
    #[serde(default)]
    pub candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    pub prompt_feedback: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiCandidate {
    #[serde(default)]
    pub content: Option<GeminiContent>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_level_tokens() {
        assert_eq!(Level::from_token("warning"), Level::Warn);
        assert_eq!(Level::from_token("Error"), Level::Error);
        assert_eq!(Level::from_token("nope"), Level::Unknown);
        assert!(Level::Error.is_error());
        assert!(!Level::Critical.is_error());
        assert!(Level::Warn.is_warning());
    }

    #[test]
    fn test_severity_parse() {
        assert_eq!(Severity::parse("HIGH"), Some(Severity::High));
        assert_eq!(Severity::parse(" critical "), Some(Severity::Critical));
        assert_eq!(Severity::parse("whatever"), None);
        assert_eq!(Severity::default(), Severity::Medium);
    }

    #[test]
    fn test_structured_from_value() {
        let value = json!({
            "summary": "Disk is full",
            "issues_found": [
                {
                    "title": "No space left",
                    "why_it_happened": "Logs were never rotated",
                    "how_to_fix": "Enable logrotate",
                    "severity": "High",
                    "occurrences": "3"
                },
                "Plain string issue",
                42
            ],
            "extra_insights": ["Check cron", {"title": "Add alerting"}, null],
            "confidence": 0.8
        });

        let analysis = StructuredAnalysis::from_value(value).unwrap();
        assert_eq!(analysis.summary, "Disk is full");
        assert_eq!(analysis.issues.len(), 2);
        assert_eq!(analysis.issues[0].severity, Severity::High);
        assert_eq!(analysis.issues[0].occurrences, 3);
        assert_eq!(analysis.issues[1].title, "Plain string issue");
        assert_eq!(analysis.extra_insights, vec!["Check cron", "Add alerting"]);
        assert_eq!(analysis.extra.get("confidence"), Some(&json!(0.8)));
    }

    #[test]
    fn test_model_source_key_does_not_clash_with_tag() {
        let analysis = StructuredAnalysis::from_value(json!({
            "summary": "ok",
            "issues_found": [],
            "source": "model"
        }))
        .unwrap();
        assert!(!analysis.extra.contains_key("source"));
        assert_eq!(analysis.extra.get(MODEL_SOURCE_KEY), Some(&json!("model")));

        let envelope = ResultEnvelope::new(JobId(3), AnalysisResult::Structured(analysis));
        let text = serde_json::to_string(&envelope).unwrap();
        assert_eq!(text.matches("\"source\"").count(), 1);

        let decoded: ResultEnvelope = serde_json::from_str(&text).unwrap();
        assert_eq!(decoded, envelope);
        assert_eq!(decoded.result.source(), Source::Genai);
    }

    #[test]
    fn test_structured_from_non_object() {
        assert!(StructuredAnalysis::from_value(json!([1, 2])).is_none());
        assert!(StructuredAnalysis::from_value(json!("text")).is_none());
    }

    #[test]
    fn test_result_serialization_carries_source() {
        let heuristic = AnalysisResult::Heuristic {
            summary: "Analyzed 1 lines.".to_string(),
            evidence: vec!["line".to_string()],
        };
        let json = serde_json::to_value(&heuristic).unwrap();
        assert_eq!(json["source"], "heuristic_fallback");
        assert_eq!(json["evidence"][0], "line");

        let text = AnalysisResult::TextOnly {
            summary: "prose".to_string(),
        };
        assert_eq!(serde_json::to_value(&text).unwrap()["source"], "genai_text");

        let structured = AnalysisResult::Structured(StructuredAnalysis {
            summary: "ok".to_string(),
            ..Default::default()
        });
        let json = serde_json::to_value(&structured).unwrap();
        assert_eq!(json["source"], "genai");
        assert_eq!(json["summary"], "ok");
        assert!(json["issues_found"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_result_round_trips_through_envelope() {
        let envelope = ResultEnvelope::new(
            JobId(9),
            AnalysisResult::TextOnly {
                summary: "model prose".to_string(),
            },
        );
        let json = serde_json::to_string(&envelope).unwrap();
        let back: ResultEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back, envelope);
        assert_eq!(back.result.source(), Source::GenaiText);
    }

    #[test]
    fn test_suggestions() {
        let result = AnalysisResult::Structured(StructuredAnalysis {
            summary: "s".to_string(),
            issues: vec![
                Issue {
                    title: "DB timeout".to_string(),
                    why: String::new(),
                    fix: "Raise pool size".to_string(),
                    severity: Severity::High,
                    occurrences: 2,
                },
                Issue {
                    title: "Slow disk".to_string(),
                    why: String::new(),
                    fix: String::new(),
                    severity: Severity::Low,
                    occurrences: 1,
                },
            ],
            extra_insights: vec!["Traffic spike at 10:00".to_string()],
            extra: Map::new(),
        });

        assert_eq!(
            result.suggestions(),
            vec!["DB timeout: Raise pool size", "Slow disk", "Traffic spike at 10:00"]
        );
        assert!(
            AnalysisResult::TextOnly {
                summary: "x".to_string()
            }
            .suggestions()
            .is_empty()
        );
    }

    #[test]
    fn test_gemini_response_deserialization() {
        let body = r#"{
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Hello"}, {"text": " world"}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"totalTokenCount": 10}
        }"#;
        let resp: GeminiResponse = serde_json::from_str(body).unwrap();
        assert_eq!(resp.candidates.len(), 1);
        let parts = &resp.candidates[0].content.as_ref().unwrap().parts;
        assert_eq!(parts[1].text.as_deref(), Some(" world"));
        assert_eq!(resp.candidates[0].finish_reason.as_deref(), Some("STOP"));
    }

    #[test]
    fn test_gemini_request_serialization() {
        let request = GeminiRequest {
            contents: vec![GeminiContent {
                role: Some("user".to_string()),
                parts: vec![GeminiPart {
                    text: Some("prompt".to_string()),
                }],
            }],
            generation_config: GeminiGenerationConfig {
                max_output_tokens: 1200,
                temperature: 0.0,
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 1200);
        assert_eq!(json["contents"][0]["parts"][0]["text"], "prompt");
    }

    #[test]
    fn test_openai_chunk_deserialization() {
        let json = r#"{
            "id": "chunk_1",
            "object": "chat.completion.chunk",
            "created": 1234567890,
            "model": "qwen",
            "choices": [{"index": 0, "delta": {"content": "Hel"}, "finish_reason": null}]
        }"#;
        let chunk: OpenAIChunk = serde_json::from_str(json).unwrap();
        assert_eq!(chunk.id, "chunk_1");
        assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("Hel"));
    }
}
