//! Error types for adapters.

use thiserror::Error;

/// Errors that can occur when talking to the supervisor or a webhook.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The supervisor has no process with this name.
    #[error("Process {0} not found")]
    NotFound(String),

    /// The supervisor could not be reached or the query failed.
    #[error("Supervisor unavailable: {0}")]
    Supervisor(String),

    /// The remote endpoint answered with a non-2xx status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Connection failed.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Failed to parse a response or bus frame.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// Timeout waiting for response.
    #[error("Request timed out")]
    Timeout,
}

impl AdapterError {
    /// Whether retrying the same call may succeed.
    ///
    /// Missing processes and 4xx rejections (other than 429) are final.
    pub fn is_transient(&self) -> bool {
        match self {
            AdapterError::NotFound(_) | AdapterError::Parse(_) => false,
            AdapterError::Http { status, .. } => *status == 429 || *status >= 500,
            AdapterError::Supervisor(_) | AdapterError::Connection(_) | AdapterError::Timeout => {
                true
            }
        }
    }
}

impl From<serde_json::Error> for AdapterError {
    fn from(err: serde_json::Error) -> Self {
        AdapterError::Parse(err.to_string())
    }
}

impl From<std::io::Error> for AdapterError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut => AdapterError::Timeout,
            _ => AdapterError::Connection(err.to_string()),
        }
    }
}

#[cfg(feature = "discord")]
impl From<reqwest::Error> for AdapterError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AdapterError::Timeout
        } else if err.is_connect() {
            AdapterError::Connection(err.to_string())
        } else {
            AdapterError::Connection(format!("HTTP request failed: {}", err))
        }
    }
}
