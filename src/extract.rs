//! Line-oriented event extraction
//!
//! Every line becomes an [`Event`]. The timestamp is the first pattern (ISO-like,
//! then `MM/DD/YYYY HH:MM:SS`) that both matches and parses; lines without one
//! get `origin + n seconds`, where `n` counts only synthesized timestamps, so
//! untimestamped lines keep their relative order.

use crate::types::{Event, Level};
use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static RE_ISO_TS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:[.,]\d{1,6})?").unwrap()
});

static RE_US_TS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{1,2}/\d{1,2}/\d{4}\s+\d{2}:\d{2}:\d{2}").unwrap());

static RE_LEVEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(INFO|WARN|WARNING|ERROR|CRITICAL|DEBUG|TRACE)\b").unwrap()
});

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
];

/// Parse a matched timestamp string. Naive times are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let normalized = raw
        .replacen('T', " ", 1)
        .replace(',', ".")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    TIMESTAMP_FORMATS.iter().find_map(|fmt| {
        NaiveDateTime::parse_from_str(&normalized, fmt)
            .ok()
            .map(|ndt| Utc.from_utc_datetime(&ndt))
    })
}

/// Find the first recognisable timestamp in a line
pub fn find_timestamp(line: &str) -> Option<DateTime<Utc>> {
    [&*RE_ISO_TS, &*RE_US_TS]
        .iter()
        .find_map(|re| re.find(line).and_then(|m| parse_timestamp(m.as_str())))
}

/// First level keyword anywhere in the line, or `Unknown`
pub fn detect_level(line: &str) -> Level {
    RE_LEVEL
        .captures(line)
        .and_then(|c| c.get(1))
        .map(|m| Level::from_token(m.as_str()))
        .unwrap_or(Level::Unknown)
}

/// Converts raw text into a bounded, ordered list of events
#[derive(Debug, Clone)]
pub struct EventExtractor {
    max_events: usize,
    origin: DateTime<Utc>,
}

impl EventExtractor {
    /// Extractor capped at `max_events`, synthesizing timestamps from now
    pub fn new(max_events: usize) -> Self {
        Self {
            max_events,
            origin: Utc::now(),
        }
    }

    /// Use a fixed origin for synthesized timestamps
    pub fn with_origin(mut self, origin: DateTime<Utc>) -> Self {
        self.origin = origin;
        self
    }

    pub fn max_events(&self) -> usize {
        self.max_events
    }

    /// Extract events; lines beyond the cap are ignored
    pub fn extract(&self, text: &str) -> Vec<Event> {
        let mut events = Vec::new();
        let mut synthesized: i64 = 0;

        for line in text.lines().take(self.max_events) {
            let (timestamp, synthetic_timestamp) = match find_timestamp(line) {
                Some(ts) => (ts, false),
                None => {
                    let ts = self.origin + Duration::seconds(synthesized);
                    synthesized += 1;
                    (ts, true)
                }
            };

            events.push(Event {
                timestamp,
                level: detect_level(line),
                raw: line.to_string(),
                synthetic_timestamp,
            });
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    fn origin() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_iso_timestamps() {
        let ts = find_timestamp("2024-01-01 10:00:00 ERROR disk full").unwrap();
        assert_eq!((ts.year(), ts.hour(), ts.second()), (2024, 10, 0));

        let ts = find_timestamp("[2024-03-05T08:09:10.250] INFO up").unwrap();
        assert_eq!(ts.nanosecond(), 250_000_000);

        let ts = find_timestamp("2024-03-05 08:09:10,5 WARN slow").unwrap();
        assert_eq!(ts.nanosecond(), 500_000_000);
    }

    #[test]
    fn test_us_timestamp() {
        let ts = find_timestamp("1/5/2024 23:59:58 job ran").unwrap();
        assert_eq!((ts.month(), ts.day(), ts.hour()), (1, 5, 23));
    }

    #[test]
    fn test_unparseable_iso_falls_through_to_us_pattern() {
        // 2024-13-45 matches the ISO shape but is not a date
        let ts = find_timestamp("2024-13-45 10:00:00 then 02/03/2024 04:05:06").unwrap();
        assert_eq!((ts.month(), ts.day()), (2, 3));
    }

    #[test]
    fn test_detect_level() {
        assert_eq!(detect_level("something error happened"), Level::Error);
        assert_eq!(detect_level("[Warning] low disk"), Level::Warn);
        assert_eq!(detect_level("WARN first then ERROR"), Level::Warn);
        assert_eq!(detect_level("INFORMATION only"), Level::Unknown);
        assert_eq!(detect_level("errors everywhere"), Level::Unknown);
    }

    #[test]
    fn test_extract_mixes_parsed_and_synthetic() {
        let extractor = EventExtractor::new(100).with_origin(origin());
        let events = extractor.extract(
            "no stamp one\n2024-01-01 10:00:00 ERROR disk full\nno stamp two\nno stamp three",
        );

        assert_eq!(events.len(), 4);
        assert!(!events[1].synthetic_timestamp);
        assert_eq!(events[1].level, Level::Error);
        assert_eq!(events[0].timestamp, origin());
        assert_eq!(events[2].timestamp, origin() + Duration::seconds(1));
        assert_eq!(events[3].timestamp, origin() + Duration::seconds(2));
        assert_eq!(events[3].level, Level::Unknown);
    }

    #[test]
    fn test_synthetic_timestamps_strictly_increase() {
        let text: String = (0..50).map(|i| format!("line {}\n", i)).collect();
        let events = EventExtractor::new(1000).extract(&text);
        let synthetic: Vec<_> = events.iter().filter(|e| e.synthetic_timestamp).collect();
        assert_eq!(synthetic.len(), 50);
        assert!(synthetic.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[test]
    fn test_extract_respects_cap() {
        let text: String = (0..30).map(|i| format!("INFO {}\n", i)).collect();
        let events = EventExtractor::new(10).extract(&text);
        assert_eq!(events.len(), 10);
        assert_eq!(events[9].raw, "INFO 9");

        assert!(EventExtractor::new(0).extract(&text).is_empty());
        assert!(EventExtractor::new(10).extract("").is_empty());
    }
}
