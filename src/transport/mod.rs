//! Opening camera connections.
//!
//! A [`Connector`] turns a [`CameraDescriptor`] into a [`Connection`]: the response content type
//! plus a body stream of byte chunks. Authentication and status handling happen here; decoding
//! happens in [`crate::decoder`]. The supervisor only ever sees the trait, so tests can script
//! connections without a network.

mod http;
mod raw;

pub use http::{HttpConnector, HttpConnectorBuilder};
pub use raw::RawSocketConnector;

use crate::error::{ConfigError, StreamError};
use crate::registry::{CameraDescriptor, TransportMode};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::fmt;

/// Chunks of the response body. Ends when the camera closes the stream.
pub type ByteStream = BoxStream<'static, Result<Bytes, StreamError>>;

/// An open, authenticated alert stream.
pub struct Connection {
    /// `Content-Type` the camera answered with, if any.
    pub content_type: Option<String>,
    pub body: ByteStream,
}

impl Connection {
    pub fn new(content_type: Option<String>, body: ByteStream) -> Self {
        Self { content_type, body }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// Opens the alert stream of one camera.
#[async_trait]
pub trait Connector: Send + Sync + fmt::Debug {
    async fn connect(&self, camera: &CameraDescriptor) -> Result<Connection, StreamError>;
}

#[async_trait]
impl<T: Connector + ?Sized> Connector for std::sync::Arc<T> {
    async fn connect(&self, camera: &CameraDescriptor) -> Result<Connection, StreamError> {
        (**self).connect(camera).await
    }
}

/// Routes each camera to the connector matching its transport mode.
#[derive(Debug, Clone)]
pub struct CameraConnector {
    http: HttpConnector,
    raw: RawSocketConnector,
}

impl CameraConnector {
    pub fn new(http: HttpConnector, raw: RawSocketConnector) -> Self {
        Self { http, raw }
    }

    /// Default HTTP client settings and a plain raw-socket connector.
    pub fn with_defaults() -> Result<Self, ConfigError> {
        Ok(Self::new(HttpConnector::builder().build()?, RawSocketConnector::new()))
    }
}

#[async_trait]
impl Connector for CameraConnector {
    async fn connect(&self, camera: &CameraDescriptor) -> Result<Connection, StreamError> {
        match camera.transport_mode() {
            TransportMode::MultipartHttp => self.http.connect(camera).await,
            TransportMode::RawSocket => self.raw.connect(camera).await,
        }
    }
}

/// Classify the final response status of a stream request.
///
/// 2xx streams; 401/403 is an auth failure; 5xx, 408 and 429 are retried; anything else means the
/// endpoint does not exist on this device.
pub(crate) fn check_status(status: u16) -> Result<(), StreamError> {
    match status {
        200..=299 => Ok(()),
        401 | 403 => Err(StreamError::Auth { status }),
        408 | 429 | 500..=599 => Err(StreamError::Status { status }),
        _ => Err(StreamError::unsupported(format!("alert stream request answered {status}"))),
    }
}

/// Request target (path and query) sent on the request line and in digest responses.
pub(crate) fn request_target(url: &reqwest::Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{query}", url.path()),
        None => url.path().to_string(),
    }
}
