//! Snippet sampling for oversized inputs
//!
//! When the redacted log is too large to send whole, windows of context around
//! error-like events are sent instead. Without any error-like event the most
//! recent lines are used.

use crate::types::{Event, Snippet};
use std::collections::HashSet;

/// Characters of snippet text that participate in the dedup key
const DEDUP_PREFIX_CHARS: usize = 120;

/// Level starts with `ERR`, or the raw line mentions "exception" in any case
pub fn is_error_like(event: &Event) -> bool {
    event.level.is_error() || event.raw.to_lowercase().contains("exception")
}

/// Select up to `max_snippets` snippets.
///
/// With error-like events: one window of `window` lines on each side per error (in
/// input order), skipping any whose `(center timestamp, first 120 chars)` was already
/// emitted. Without: the last `max_snippets` lines, one per snippet.
pub fn sample_snippets(events: &[Event], max_snippets: usize, window: usize) -> Vec<Snippet> {
    let error_indices: Vec<usize> = events
        .iter()
        .enumerate()
        .filter(|(_, e)| is_error_like(e))
        .map(|(i, _)| i)
        .collect();

    if error_indices.is_empty() {
        let start = events.len().saturating_sub(max_snippets);
        return events[start..]
            .iter()
            .enumerate()
            .map(|(offset, event)| Snippet {
                center_index: start + offset,
                timestamp: event.timestamp,
                text: event.raw.clone(),
            })
            .collect();
    }

    let mut snippets = Vec::new();
    let mut seen = HashSet::new();

    for idx in error_indices {
        if snippets.len() >= max_snippets {
            break;
        }

        let start = idx.saturating_sub(window);
        let end = (idx + window + 1).min(events.len());
        let text = events[start..end]
            .iter()
            .map(|e| e.raw.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let prefix: String = text.chars().take(DEDUP_PREFIX_CHARS).collect();
        if !seen.insert((events[idx].timestamp, prefix)) {
            continue;
        }

        snippets.push(Snippet {
            center_index: idx,
            timestamp: events[idx].timestamp,
            text,
        });
    }

    snippets
}

/// Render snippets for the prompt: `[timestamp]\nlines`, separated by a marker line
pub fn render_snippets(snippets: &[Snippet]) -> String {
    snippets
        .iter()
        .map(|s| format!("[{}]\n{}", s.timestamp.format("%Y-%m-%dT%H:%M:%S%.fZ"), s.text))
        .collect::<Vec<_>>()
        .join("\n\n--- SNIPPET ---\n\n")
}
