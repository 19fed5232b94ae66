//! Deterministic summary used when generation yields nothing usable

use crate::extract::EventExtractor;
use crate::types::AnalysisResult;

/// Maximum raw lines carried as evidence
pub const MAX_EVIDENCE_LINES: usize = 50;

/// Summarize already-redacted text by counting error and warning levels.
///
/// Pure apart from the synthesized timestamps, which never reach the output.
pub fn summarize(text: &str, max_events: usize) -> AnalysisResult {
    let events = EventExtractor::new(max_events).extract(text);

    let errors = events.iter().filter(|e| e.level.is_error()).count();
    let warnings = events.iter().filter(|e| e.level.is_warning()).count();

    let evidence = events
        .iter()
        .filter(|e| !e.raw.is_empty())
        .take(MAX_EVIDENCE_LINES)
        .map(|e| e.raw.clone())
        .collect();

    AnalysisResult::Heuristic {
        summary: format!(
            "Analyzed {} lines. Found {} error-like lines and {} warning-like lines.",
            events.len(),
            errors,
            warnings
        ),
        evidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Source;

    #[test]
    fn test_counts_levels() {
        let result = summarize(
            "2024-01-01 10:00:00 ERROR disk full\n2024-01-01 10:00:01 INFO ok\nWARNING low memory\n",
            1000,
        );
        assert_eq!(result.source(), Source::HeuristicFallback);
        assert_eq!(
            result.summary(),
            "Analyzed 3 lines. Found 1 error-like lines and 1 warning-like lines."
        );
    }

    #[test]
    fn test_evidence_is_capped() {
        let text: String = (0..80).map(|i| format!("INFO {}\n", i)).collect();
        let AnalysisResult::Heuristic { evidence, .. } = summarize(&text, 1000) else {
            panic!("expected heuristic result");
        };
        assert_eq!(evidence.len(), MAX_EVIDENCE_LINES);
        assert_eq!(evidence[0], "INFO 0");
    }

    #[test]
    fn test_empty_text() {
        let result = summarize("", 1000);
        assert_eq!(
            result.summary(),
            "Analyzed 0 lines. Found 0 error-like lines and 0 warning-like lines."
        );
    }

    #[test]
    fn test_deterministic() {
        let text = "ERROR a\n\nWARN b\nplain";
        assert_eq!(summarize(text, 1000), summarize(text, 1000));

        let AnalysisResult::Heuristic { evidence, .. } = summarize(text, 1000) else {
            panic!("expected heuristic result");
        };
        // Blank lines count as events but are not evidence
        assert_eq!(evidence, vec!["ERROR a", "WARN b", "plain"]);
    }
}
