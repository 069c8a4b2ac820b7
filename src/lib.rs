#![forbid(unsafe_code)]

//! # alarmstream
//!
//! Per-camera ingestion of Hikvision ISAPI alert streams: connect, authenticate, decode,
//! edge-trigger and dispatch alarm events.
//!
//! ## Pipeline
//!
//! - [`CameraRegistry`] validates camera configuration once, up front.
//! - [`SupervisorPool`] runs one [`ConnectionSupervisor`] per camera.
//! - A [`Connector`] opens the stream ([`HttpConnector`] for conformant `multipart/mixed`
//!   responses, [`RawSocketConnector`] for devices that do not speak valid HTTP), with Basic or
//!   Digest credentials from the [`auth`] module.
//! - A [`decoder`] turns the body into [`RawEvent`]s, the [`EventNormalizer`] maps them to
//!   [`CanonicalEvent`]s and drops repeated states.
//! - The [`Dispatcher`] hands each transition to every registered [`AlarmSink`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use alarmstream::{
//!     CameraConfig, CameraConnector, CameraRegistry, Dispatcher, LogSink, SupervisorConfig,
//!     SupervisorPool,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = CameraRegistry::new([
//!         CameraConfig::new("porch", "192.168.1.64").credentials("admin", "secret"),
//!     ])?;
//!     let pool = SupervisorPool::spawn(
//!         &registry,
//!         Arc::new(CameraConnector::with_defaults()?),
//!         Dispatcher::new(LogSink),
//!         SupervisorConfig::default(),
//!     );
//!
//!     tokio::signal::ctrl_c().await?;
//!     pool.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod backoff;
pub mod decoder;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod normalizer;
pub mod pool;
pub mod prelude;
pub mod registry;
pub mod sinks;
pub mod supervisor;
pub mod transport;

// Re-exports
pub use auth::{Authenticator, DigestAlgorithm, DigestChallenge};
pub use backoff::{BackoffError, Jitter, ReconnectBackoff};
pub use decoder::{DecoderLimits, FrameDecoder, MultipartDecoder, RawFrameScanner};
pub use dispatcher::{AlarmSink, Dispatcher, DispatcherBuilder, SinkEvent};
pub use error::{ConfigError, FrameError, SinkError, StreamError};
pub use event::{CanonicalEvent, EventKind, EventState, RawEvent};
pub use normalizer::{EventMapping, EventNormalizer, EVENT_TABLE};
pub use pool::SupervisorPool;
pub use registry::{AuthMethod, CameraConfig, CameraDescriptor, CameraRegistry, TransportMode};
pub use sinks::{LogSink, MemorySink, NullSink, ServiceSink, StreamingSink};
pub use supervisor::{
    ConnectionState, ConnectionSupervisor, SupervisorConfig, SupervisorConfigBuilder,
    SupervisorExit,
};
pub use transport::{
    CameraConnector, Connection, Connector, HttpConnector, HttpConnectorBuilder,
    RawSocketConnector,
};
