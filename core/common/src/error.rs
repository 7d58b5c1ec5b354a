//! Common error types for OneIndex.

use thiserror::Error;

/// Top-level error type for OneIndex operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Token exchange produced no usable access token.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// The remote endpoint answered with a non-success status.
    #[error("Remote API error: {url} returned {status_code}: {body}")]
    RemoteApi {
        /// Request URL, including the query string.
        url: String,
        /// HTTP status code.
        status_code: u16,
        /// Raw response body text.
        body: String,
    },

    /// The request did not complete within its timeout.
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Connection-level failure other than a timeout.
    #[error("Network error: {0}")]
    Network(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// HTTP status carried by a remote API error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::RemoteApi { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }

    /// Whether this error is a transport timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_api_status_code() {
        let err = Error::RemoteApi {
            url: "https://graph.microsoft.com/v1.0/me".to_string(),
            status_code: 404,
            body: "itemNotFound".to_string(),
        };

        assert_eq!(err.status_code(), Some(404));
        assert!(!err.is_timeout());
        assert!(err.to_string().contains("404"));
        assert!(err.to_string().contains("itemNotFound"));
    }

    #[test]
    fn test_timeout_classification() {
        let err = Error::Timeout("https://graph.microsoft.com/v1.0/me".to_string());
        assert!(err.is_timeout());
        assert_eq!(err.status_code(), None);
    }

    #[test]
    fn test_json_error_conversion() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{oops");
        let err: Error = parse.unwrap_err().into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
