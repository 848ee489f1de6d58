//! Error types for the engine.

use std::path::PathBuf;

use pm2watch_adapters::AdapterError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can be retried a bounded number of times.
pub trait Retryable: std::error::Error {
    /// True if another attempt may succeed.
    fn is_transient(&self) -> bool;

    /// The error reported when one attempt exceeds its time budget.
    fn timed_out() -> Self;
}

/// Failure to read the process from the supervisor.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The supervisor does not know the process.
    #[error("Process {0} not found")]
    NotFound(String),

    /// The supervisor could not be reached or returned garbage.
    #[error("Supervisor unreachable: {0}")]
    Connection(String),

    #[error("Supervisor query timed out")]
    Timeout,
}

impl Retryable for SourceError {
    fn is_transient(&self) -> bool {
        !matches!(self, SourceError::NotFound(_))
    }

    fn timed_out() -> Self {
        SourceError::Timeout
    }
}

impl From<AdapterError> for SourceError {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::NotFound(name) => SourceError::NotFound(name),
            AdapterError::Timeout => SourceError::Timeout,
            other => SourceError::Connection(other.to_string()),
        }
    }
}

/// Failure to hand a document to the remote endpoint.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The endpoint answered with a non-2xx status.
    #[error("Endpoint rejected delivery with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Delivery transport error: {0}")]
    Transport(String),

    #[error("Delivery timed out")]
    Timeout,
}

impl Retryable for DeliveryError {
    fn is_transient(&self) -> bool {
        match self {
            DeliveryError::Rejected { status, .. } => *status == 429 || *status >= 500,
            DeliveryError::Transport(_) | DeliveryError::Timeout => true,
        }
    }

    fn timed_out() -> Self {
        DeliveryError::Timeout
    }
}

impl From<AdapterError> for DeliveryError {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::Http { status, body } => DeliveryError::Rejected { status, body },
            AdapterError::Timeout => DeliveryError::Timeout,
            other => DeliveryError::Transport(other.to_string()),
        }
    }
}

/// Failure to load a template collection.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Failed to read templates from {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid templates in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Any failure surfaced by the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Adapter(#[from] AdapterError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_is_never_retried() {
        assert!(!SourceError::NotFound("api".into()).is_transient());
        assert!(SourceError::Connection("refused".into()).is_transient());
        assert!(SourceError::Timeout.is_transient());
    }

    #[test]
    fn test_client_errors_are_not_retried() {
        let rejected = |status| DeliveryError::Rejected {
            status,
            body: String::new(),
        };
        assert!(!rejected(400).is_transient());
        assert!(!rejected(404).is_transient());
        assert!(rejected(429).is_transient());
        assert!(rejected(502).is_transient());
    }

    #[test]
    fn test_from_adapter_error() {
        let err: SourceError = AdapterError::NotFound("api".into()).into();
        assert!(matches!(err, SourceError::NotFound(name) if name == "api"));

        let err: DeliveryError = AdapterError::Http {
            status: 401,
            body: "unauthorized".into(),
        }
        .into();
        assert!(matches!(err, DeliveryError::Rejected { status: 401, .. }));

        let err: DeliveryError = AdapterError::Connection("reset".into()).into();
        assert!(matches!(err, DeliveryError::Transport(_)));
    }
}
