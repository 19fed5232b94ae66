//! Recovery of a JSON object from free-form model output
//!
//! Models asked for "a single JSON object" still wrap it in prose, code fences,
//! comments or trailing commas. [`extract_json`] never fails; it returns `None`
//! when nothing can be recovered.
//!
//! # Algorithm
//!
//! 1. Track `{`/`}` nesting with a stack of open positions; each matched pair is a
//!    candidate span.
//! 2. Try candidates longest first: strict parse, then [`clean_json_like`] + parse.
//! 3. If none parses, try the greedy span from the first `{` to the last `}`
//!    the same way.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static RE_FENCE_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\A```(?:json)?\s*").unwrap());

static RE_FENCE_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*```\z").unwrap());

static RE_LINE_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)//.*$").unwrap());

static RE_BLOCK_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)/\*.*?\*/").unwrap());

static RE_TRAILING_COMMA: Lazy<Regex> = Lazy::new(|| Regex::new(r",\s*([}\]])").unwrap());

static RE_DUPLICATE_COMMA: Lazy<Regex> = Lazy::new(|| Regex::new(r",\s*,+").unwrap());

static RE_CONTROL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F]").unwrap());

/// Locate and parse the JSON object embedded in `text`
pub fn extract_json(text: &str) -> Option<Value> {
    if text.is_empty() {
        return None;
    }

    for (start, end) in balanced_spans(text) {
        if let Some(value) = parse_lenient(text[start..end].trim()) {
            return Some(value);
        }
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    parse_lenient(&text[start..=end])
}

/// Byte spans of every matched `{...}` pair, longest first.
///
/// Equal lengths keep the order in which the pairs closed.
fn balanced_spans(text: &str) -> Vec<(usize, usize)> {
    let mut open = Vec::new();
    let mut spans = Vec::new();

    for (i, ch) in text.char_indices() {
        match ch {
            '{' => open.push(i),
            '}' => {
                if let Some(start) = open.pop() {
                    spans.push((start, i + 1));
                }
            }
            _ => {}
        }
    }

    spans.sort_by(|a, b| (b.1 - b.0).cmp(&(a.1 - a.0)));
    spans
}

/// Strict parse, then cleanup + parse. Only objects are accepted.
fn parse_lenient(candidate: &str) -> Option<Value> {
    parse_object(candidate).or_else(|| parse_object(&clean_json_like(candidate)))
}

fn parse_object(s: &str) -> Option<Value> {
    serde_json::from_str::<Value>(s)
        .ok()
        .filter(Value::is_object)
}

/// Best-effort repair of almost-JSON.
///
/// Strips code fences, anything before the first `{`, `//` and `/* */` comments
/// and control characters; straightens curly quotes; turns a mostly single-quoted
/// document into a double-quoted one; drops trailing and doubled commas.
pub fn clean_json_like(s: &str) -> String {
    let t = s.trim();
    let t = RE_FENCE_OPEN.replace(t, "");
    let t = RE_FENCE_CLOSE.replace(&t, "").into_owned();

    let mut t = match t.find('{') {
        Some(first) if first > 0 => t[first..].to_string(),
        _ => t,
    };

    t = RE_LINE_COMMENT.replace_all(&t, "").into_owned();
    t = RE_BLOCK_COMMENT.replace_all(&t, "").into_owned();
    t = t
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    let double_quotes = t.matches('"').count();
    let single_quotes = t.matches('\'').count();
    if double_quotes < 2 && single_quotes > 2 {
        t = t.replace('\'', "\"");
    }

    t = RE_TRAILING_COMMA.replace_all(&t, "$1").into_owned();
    t = RE_DUPLICATE_COMMA.replace_all(&t, ",").into_owned();
    RE_CONTROL.replace_all(&t, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_object() {
        assert_eq!(extract_json(r#"{"a": 1}"#), Some(json!({"a": 1})));
    }

    #[test]
    fn test_prefers_outermost_object() {
        let text = r#"Result: {"summary": "x", "issues_found": [{"title": "t"}]} done"#;
        let value = extract_json(text).unwrap();
        assert_eq!(value["summary"], "x");
        assert_eq!(value["issues_found"][0]["title"], "t");
    }

    #[test]
    fn test_code_fence() {
        let text = "```json\n{\"summary\":\"ok\",\"issues_found\":[],\"extra_insights\":[]}\n```";
        let value = extract_json(text).unwrap();
        assert_eq!(value["summary"], "ok");
    }

    #[test]
    fn test_trailing_commas_and_comments() {
        let text = "Sure!\n{\n  \"summary\": \"ok\", // short\n  \"items\": [1, 2,],\n  /* note */ \"n\": 3,\n}";
        let value = extract_json(text).unwrap();
        assert_eq!(value, json!({"summary": "ok", "items": [1, 2], "n": 3}));
    }

    #[test]
    fn test_smart_and_single_quotes() {
        let value = extract_json("{\u{201C}a\u{201D}: \u{201C}b\u{201D}}").unwrap();
        assert_eq!(value, json!({"a": "b"}));

        let value = extract_json("{'summary': 'fine', 'n': 1}").unwrap();
        assert_eq!(value, json!({"summary": "fine", "n": 1}));
    }

    #[test]
    fn test_control_characters_removed() {
        let value = extract_json("{\"a\": \"b\u{0001}c\"}").unwrap();
        assert_eq!(value, json!({"a": "bc"}));
    }

    #[test]
    fn test_inner_object_when_outer_is_broken() {
        // The outer span never parses; the inner balanced object does
        let text = r#"{ broken {"ok": true} still broken"#;
        assert_eq!(extract_json(text), Some(json!({"ok": true})));
    }

    #[test]
    fn test_no_braces() {
        assert_eq!(extract_json("no json here"), None);
        assert_eq!(extract_json(""), None);
        assert_eq!(extract_json("} backwards {"), None);
    }

    #[test]
    fn test_garbage_never_panics() {
        for text in ["{", "}", "{{{{", "{]}", "{\"a\":}", "{'", "\u{201C}{\u{201D}", "{/*"] {
            let _ = extract_json(text);
        }
    }

    #[test]
    fn test_clean_json_like() {
        assert_eq!(clean_json_like("```json\n{\"a\":1,}\n```"), "{\"a\":1}");
        assert_eq!(clean_json_like("noise {\"a\":[1,,2]}"), "{\"a\":[1,2]}");
    }
}
