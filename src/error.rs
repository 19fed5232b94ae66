//! Error types for log-insight

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem error (upload read, result write)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// API error from the generation backend
    #[error("API error: {0}")]
    Api(String),

    /// Streaming error
    #[error("Streaming error: {0}")]
    Stream(String),

    /// Backend produced something we could not use
    #[error("Backend error: {0}")]
    Backend(String),

    /// Requested record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// A collaborator failed to store or load state
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Job lifecycle violation (e.g. leaving a terminal state)
    #[error("Invalid job transition: {0}")]
    InvalidTransition(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Timeout error
    #[error("Request timeout")]
    Timeout,

    /// Other errors
    #[error("Error: {0}")]
    Other(String),
}

impl Error {
    /// Create a new config error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a new API error
    pub fn api(msg: impl Into<String>) -> Self {
        Error::Api(msg.into())
    }

    /// Create a new stream error
    pub fn stream(msg: impl Into<String>) -> Self {
        Error::Stream(msg.into())
    }

    /// Create a new backend error
    pub fn backend(msg: impl Into<String>) -> Self {
        Error::Backend(msg.into())
    }

    /// Create a new not-found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    /// Create a new persistence error
    pub fn persistence(msg: impl Into<String>) -> Self {
        Error::Persistence(msg.into())
    }

    /// Create a new invalid transition error
    pub fn invalid_transition(msg: impl Into<String>) -> Self {
        Error::InvalidTransition(msg.into())
    }

    /// Create a new invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    /// Create a new other error
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Create a timeout error
    pub fn timeout() -> Self {
        Error::Timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_config() {
        let err = Error::config("model is required");
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(
            err.to_string(),
            "Invalid configuration: model is required"
        );
    }

    #[test]
    fn test_error_api() {
        let err = Error::api("500 Internal Server Error");
        assert!(matches!(err, Error::Api(_)));
        assert_eq!(err.to_string(), "API error: 500 Internal Server Error");
    }

    #[test]
    fn test_error_persistence() {
        let err = Error::persistence("disk full");
        assert!(matches!(err, Error::Persistence(_)));
        assert_eq!(err.to_string(), "Persistence error: disk full");
    }

    #[test]
    fn test_error_invalid_transition() {
        let err = Error::invalid_transition("done -> running");
        assert_eq!(err.to_string(), "Invalid job transition: done -> running");
    }

    #[test]
    fn test_error_not_found() {
        let err = Error::not_found("upload 7");
        assert_eq!(err.to_string(), "Not found: upload 7");
    }

    #[test]
    fn test_error_timeout() {
        let err = Error::timeout();
        assert!(matches!(err, Error::Timeout));
        assert_eq!(err.to_string(), "Request timeout");
    }

    #[test]
    fn test_error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.log");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("missing.log"));
    }

    #[test]
    fn test_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
