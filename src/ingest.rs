//! Line ingestion: parsing, deduplication and batched inserts
//!
//! Each non-blank line becomes a [`LogEntry`]. JSON-object lines contribute their
//! `timestamp`, `level`, `service` and `message` fields; anything else is stored whole
//! as the message. A line is a duplicate when its dedup key (upload, owner, truncated
//! raw text) is already stored or already waiting in the current batch.
//!
//! Sink failures while ingesting are logged and skipped: a lost batch costs stored
//! lines, not the analysis.

use crate::config::JobOptions;
use crate::extract::parse_timestamp;
use crate::sink::EventSink;
use crate::types::{EntryKey, LogEntry, UploadId};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Counters for one ingestion run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Lines in the upload, blank ones included
    pub total_lines: usize,
    /// Non-blank lines handled, duplicates included
    pub processed: usize,
    /// Lines newly stored
    pub unique: usize,
    /// Error-like lines, duplicates included
    pub errors: usize,
}

/// One parsed line plus its error classification
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLine {
    pub entry: LogEntry,
    pub error_like: bool,
}

/// Progress for `processed` of `total` lines, in `10..=90`
pub fn progress_for(processed: usize, total: usize) -> u8 {
    let scaled = processed.saturating_mul(80) / total.max(1);
    (scaled + 10).min(90) as u8
}

/// Level starts with "err" or the message mentions "error", ignoring case
pub fn is_error_like_line(level: Option<&str>, message: Option<&str>) -> bool {
    let level_is_error = level.is_some_and(|l| l.to_lowercase().starts_with("err"));
    level_is_error || message.is_some_and(|m| m.to_lowercase().contains("error"))
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// First non-empty field among `keys`; strings as-is, other values serialized
fn first_field(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match map.get(*key)? {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    })
}

/// RFC 3339 first, then the formats the event extractor understands
fn parse_json_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| parse_timestamp(raw.trim()))
}

/// Parse one line; blank lines yield `None`
pub fn parse_line(
    line: &str,
    owner: &str,
    upload_id: UploadId,
    options: &JobOptions,
) -> Option<ParsedLine> {
    let stripped = line.trim();
    if stripped.is_empty() {
        return None;
    }

    let (timestamp, level, service, message) = match serde_json::from_str::<Value>(stripped) {
        Ok(Value::Object(map)) => {
            let timestamp = first_field(&map, &["timestamp", "time", "@timestamp"])
                .and_then(|raw| parse_json_timestamp(&raw));
            let level = first_field(&map, &["level", "severity"]);
            let service = first_field(&map, &["service", "name"]);
            let message = first_field(&map, &["message", "msg"])
                .unwrap_or_else(|| Value::Object(map.clone()).to_string());
            (timestamp, level, service, message)
        }
        _ => (None, None, None, stripped.to_string()),
    };

    let error_like = is_error_like_line(level.as_deref(), Some(&message));

    Some(ParsedLine {
        entry: LogEntry {
            owner: owner.to_string(),
            upload_id,
            timestamp,
            level: level.map(|l| l.to_uppercase()),
            service,
            message: Some(truncate_chars(&message, options.message_truncate)),
            raw: truncate_chars(stripped, options.raw_truncate),
        },
        error_like,
    })
}

/// Feeds lines into an [`EventSink`] in batches
pub struct LineIngestor<'a> {
    sink: &'a dyn EventSink,
    owner: String,
    upload_id: UploadId,
    options: &'a JobOptions,
    pending: Vec<LogEntry>,
    pending_keys: HashSet<EntryKey>,
    stats: IngestStats,
}

impl<'a> LineIngestor<'a> {
    pub fn new(
        sink: &'a dyn EventSink,
        owner: impl Into<String>,
        upload_id: UploadId,
        options: &'a JobOptions,
        total_lines: usize,
    ) -> Self {
        Self {
            sink,
            owner: owner.into(),
            upload_id,
            options,
            pending: Vec::new(),
            pending_keys: HashSet::new(),
            stats: IngestStats {
                total_lines,
                ..Default::default()
            },
        }
    }

    /// The line cap has been reached
    pub fn is_full(&self) -> bool {
        self.stats.processed >= self.options.max_lines
    }

    pub fn stats(&self) -> IngestStats {
        self.stats
    }

    /// Handle one line.
    ///
    /// Returns the new progress value every `batch_size` processed lines, after the
    /// pending batch has been flushed.
    pub async fn push_line(&mut self, line: &str) -> Option<u8> {
        let parsed = parse_line(line, &self.owner, self.upload_id, self.options)?;

        if parsed.error_like {
            self.stats.errors += 1;
        }

        let key = parsed.entry.key();
        if !self.is_duplicate(&key).await {
            self.pending_keys.insert(key);
            self.pending.push(parsed.entry);
            self.stats.unique += 1;
        }
        self.stats.processed += 1;

        if self.stats.processed % self.options.batch_size.max(1) == 0 {
            self.flush().await;
            return Some(progress_for(self.stats.processed, self.stats.total_lines));
        }
        None
    }

    async fn is_duplicate(&self, key: &EntryKey) -> bool {
        if self.pending_keys.contains(key) {
            return true;
        }
        match self.sink.exists(key).await {
            Ok(found) => found,
            Err(e) => {
                log::warn!("dedup lookup failed for upload {}: {}", self.upload_id, e);
                false
            }
        }
    }

    async fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }

        let batch = std::mem::take(&mut self.pending);
        let size = batch.len();
        if let Err(e) = self.sink.insert_batch(batch).await {
            log::warn!(
                "failed to store {} entries for upload {}: {}",
                size,
                self.upload_id,
                e
            );
        }
        self.pending_keys.clear();
    }

    /// Flush what is left and return the final counters
    pub async fn finish(mut self) -> IngestStats {
        self.flush().await;
        self.stats
    }
}
