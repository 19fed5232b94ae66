//! Secret scrubbing applied before text leaves the process
//!
//! Substitutions run in a fixed order (credentials, passwords, e-mail addresses,
//! PEM private-key headers), each replacing the match with [`REDACTED`]. Runs of
//! three or more whitespace characters are then collapsed to one space.
//!
//! `redact(redact(x)) == redact(x)` for every input: the marker itself contains
//! nothing any pattern can match.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Replacement marker
pub const REDACTED: &str = "[REDACTED]";

static RE_CREDENTIAL: Lazy<Regex> = Lazy::new(|| {
    // api_key=..., secret: ..., Authorization: Bearer ..., token ...
    Regex::new(r"(?i)(?:api[_-]?key|secret|authorization|bearer|token)[\s:=]+[A-Za-z0-9\-._~+/=]{8,}")
        .unwrap()
});

static RE_PASSWORD: Lazy<Regex> = Lazy::new(|| {
    // Everything up to the next comma or line break
    Regex::new(r"(?i)password[\s:=]+[^,\n]+").unwrap()
});

static RE_EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap()
});

// Whitespace runs are collapsed after matching, so any run is accepted here
static RE_PRIVATE_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-----BEGIN\s+PRIVATE\s+KEY-----").unwrap());

static RE_WIDE_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{3,}").unwrap());

/// The secret patterns, in application order
pub fn secret_patterns() -> [&'static Regex; 4] {
    [&*RE_CREDENTIAL, &*RE_PASSWORD, &*RE_EMAIL, &*RE_PRIVATE_KEY]
}

/// Scrub secret-like substrings from `text`
pub fn redact(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let mut out = text.to_string();
    for re in secret_patterns() {
        if re.is_match(&out) {
            out = re.replace_all(&out, REDACTED).into_owned();
        }
    }
    RE_WIDE_SPACE.replace_all(&out, " ").into_owned()
}

/// Redact every string inside a JSON value, recursing through objects and arrays.
///
/// Object keys are left untouched; only values are scrubbed.
pub fn redact_value(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(redact(&s)),
        Value::Array(items) => Value::Array(items.into_iter().map(redact_value).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, redact_value(v)))
                .collect(),
        ),
        other => other,
    }
}
