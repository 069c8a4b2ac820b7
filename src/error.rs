//! Error taxonomy for the ingestion pipeline.
//!
//! Errors are split by blast radius:
//! - [`ConfigError`]: surfaced while building the registry or supervisor config; halts startup.
//! - [`StreamError`]: one camera connection failed. Transient variants lead to backoff and
//!   reconnect, [`StreamError::Unsupported`] stops that camera's supervisor.
//! - [`FrameError`]: one frame could not be decoded; the frame is skipped, streaming continues.
//! - [`SinkError`]: a sink failed to accept an event; logged by the dispatcher and swallowed.
use std::time::Duration;
use thiserror::Error;

/// Failure of a camera connection (connect, authenticate, or mid-stream).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// DNS, refused, reset, TLS or I/O failure.
    #[error("connection failed: {reason}")]
    Connection { reason: String },
    /// The connect attempt did not finish within the configured limit.
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),
    /// The camera rejected the credentials (401/403 after answering any challenge).
    #[error("authentication rejected with status {status}")]
    Auth { status: u16 },
    /// Server-side status worth retrying (5xx, 408, 429).
    #[error("camera answered with retryable status {status}")]
    Status { status: u16 },
    /// The camera cannot be streamed at all: wrong content type, missing boundary,
    /// missing endpoint or unparseable raw framing.
    #[error("stream unsupported: {reason}")]
    Unsupported { reason: String },
}

impl StreamError {
    pub fn connection(err: impl std::fmt::Display) -> Self {
        Self::Connection { reason: err.to_string() }
    }

    pub fn unsupported(reason: impl Into<String>) -> Self {
        Self::Unsupported { reason: reason.into() }
    }

    /// Whether the supervisor should back off and reconnect.
    pub fn is_transient(&self) -> bool {
        !self.is_unsupported()
    }

    /// Whether this camera should be reported unsupported and abandoned.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }

    /// Whether the camera rejected the credentials.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }
}

impl From<reqwest::Error> for StreamError {
    fn from(err: reqwest::Error) -> Self {
        // reqwest's Display hides the interesting part (refused, dns, tls) in the source chain
        let mut reason = err.to_string();
        let mut source = std::error::Error::source(&err);
        while let Some(inner) = source {
            reason.push_str(": ");
            reason.push_str(&inner.to_string());
            source = inner.source();
        }
        Self::Connection { reason }
    }
}

impl From<std::io::Error> for StreamError {
    fn from(err: std::io::Error) -> Self {
        Self::connection(err)
    }
}

/// A single frame could not be turned into a raw event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame is not valid UTF-8")]
    InvalidUtf8,
    #[error("malformed event XML: {0}")]
    Xml(String),
    #[error("event XML carries no eventType")]
    MissingEventType,
    #[error("unrecognised event state {0:?}")]
    UnknownState(String),
    #[error("frame exceeds {limit} bytes")]
    Oversized { limit: usize },
    #[error("malformed part headers: {0}")]
    PartHeaders(String),
}

/// Invalid camera or supervisor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("camera name must not be empty")]
    EmptyName,
    #[error("camera '{0}' is configured more than once")]
    DuplicateName(String),
    #[error("camera '{name}' declares {method} auth but is missing a username or password")]
    MissingCredentials { name: String, method: &'static str },
    #[error("camera '{name}' has an invalid address: {reason}")]
    InvalidAddress { name: String, reason: String },
    #[error("camera '{0}' cannot combine rawTcp with https")]
    RawTransportTls(String),
    #[error("invalid backoff: {0}")]
    Backoff(#[from] crate::backoff::BackoffError),
    #[error("invalid supervisor setting {field}: {reason}")]
    Supervisor { field: &'static str, reason: String },
    #[error("invalid registry document: {0}")]
    Parse(String),
    #[error("cannot build HTTP client: {0}")]
    HttpClient(String),
}

/// A sink could not accept an event.
#[derive(Debug, Error)]
#[error("sink error: {0}")]
pub struct SinkError(Box<dyn std::error::Error + Send + Sync>);

impl SinkError {
    pub fn new(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self(err.into())
    }
}
