//! Lifecycle of one camera connection.
//!
//! ```text
//! Disconnected -> Connecting -> Streaming -> BackingOff -> Connecting -> ...
//!                      \             \
//!                       `-------------`--> Shutdown   (cancelled, or stream unsupported)
//! ```
//!
//! A [`ConnectionSupervisor`] owns everything that is private to a camera: the decoder of the
//! current connection, the normalizer's edge state and the reconnect attempt counter. Its
//! current [`ConnectionState`] is published through a `tokio::sync::watch` channel.

use crate::backoff::ReconnectBackoff;
use crate::decoder::{self, DecoderLimits};
use crate::dispatcher::Dispatcher;
use crate::error::{ConfigError, StreamError};
use crate::normalizer::EventNormalizer;
use crate::registry::CameraDescriptor;
use crate::transport::Connector;
use futures::StreamExt;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Observable lifecycle state of a camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Streaming,
    BackingOff,
    Shutdown,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Streaming => "streaming",
            ConnectionState::BackingOff => "backing_off",
            ConnectionState::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a supervisor stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorExit {
    /// Shutdown was requested.
    Cancelled,
    /// The camera's stream cannot be consumed; sinks were told once.
    Unsupported,
}

/// Settings shared by every camera supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorConfig {
    backoff: ReconnectBackoff,
    connect_timeout: Duration,
    max_frame_bytes: usize,
    raw_scan_limit: usize,
    auth_failure_limit: Option<usize>,
}

impl SupervisorConfig {
    pub fn builder() -> SupervisorConfigBuilder {
        SupervisorConfigBuilder::new()
    }

    pub fn backoff(&self) -> &ReconnectBackoff {
        &self.backoff
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn max_frame_bytes(&self) -> usize {
        self.max_frame_bytes
    }

    pub fn raw_scan_limit(&self) -> usize {
        self.raw_scan_limit
    }

    pub fn auth_failure_limit(&self) -> Option<usize> {
        self.auth_failure_limit
    }

    pub fn decoder_limits(&self) -> DecoderLimits {
        DecoderLimits {
            max_frame_bytes: self.max_frame_bytes,
            raw_scan_limit: self.raw_scan_limit,
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        let limits = DecoderLimits::default();
        Self {
            backoff: ReconnectBackoff::default(),
            connect_timeout: Duration::from_secs(10),
            max_frame_bytes: limits.max_frame_bytes,
            raw_scan_limit: limits.raw_scan_limit,
            auth_failure_limit: None,
        }
    }
}

/// Smallest accepted `max_frame_bytes`; a real alert document is a few hundred bytes.
const MIN_FRAME_BYTES: usize = 1024;

/// Builder for [`SupervisorConfig`]; validation happens in [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct SupervisorConfigBuilder {
    config: SupervisorConfig,
}

impl SupervisorConfigBuilder {
    pub fn new() -> Self {
        Self { config: SupervisorConfig::default() }
    }

    /// Reconnect delay schedule. The first delay must be > 0.
    pub fn backoff(mut self, backoff: ReconnectBackoff) -> Self {
        self.config.backoff = backoff;
        self
    }

    /// Bound on a single connect attempt, authentication included. Must be > 0.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Largest alert document accepted. At least 1 KiB.
    pub fn max_frame_bytes(mut self, bytes: usize) -> Self {
        self.config.max_frame_bytes = bytes;
        self
    }

    /// Raw-socket bytes tolerated without any alert document. At least `max_frame_bytes`.
    pub fn raw_scan_limit(mut self, bytes: usize) -> Self {
        self.config.raw_scan_limit = bytes;
        self
    }

    /// Give up on a camera after this many consecutive authentication failures.
    /// `None` keeps retrying forever.
    pub fn auth_failure_limit(mut self, limit: Option<usize>) -> Self {
        self.config.auth_failure_limit = limit;
        self
    }

    pub fn build(self) -> Result<SupervisorConfig, ConfigError> {
        let config = self.config;
        if config.backoff.delay(1).is_zero() {
            return Err(ConfigError::Supervisor {
                field: "backoff",
                reason: "first reconnect delay must be > 0".into(),
            });
        }
        if config.connect_timeout.is_zero() {
            return Err(ConfigError::Supervisor {
                field: "connect_timeout",
                reason: "must be > 0".into(),
            });
        }
        if config.max_frame_bytes < MIN_FRAME_BYTES {
            return Err(ConfigError::Supervisor {
                field: "max_frame_bytes",
                reason: format!(
                    "must be at least {MIN_FRAME_BYTES} (got {})",
                    config.max_frame_bytes
                ),
            });
        }
        if config.raw_scan_limit < config.max_frame_bytes {
            return Err(ConfigError::Supervisor {
                field: "raw_scan_limit",
                reason: format!(
                    "must be at least max_frame_bytes ({}), got {}",
                    config.max_frame_bytes, config.raw_scan_limit
                ),
            });
        }
        if config.auth_failure_limit == Some(0) {
            return Err(ConfigError::Supervisor {
                field: "auth_failure_limit",
                reason: "must be > 0 when set".into(),
            });
        }
        Ok(config)
    }
}

impl Default for SupervisorConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// How one connection ended.
struct Session {
    /// The connection was opened and authenticated.
    connected: bool,
    /// Frames decoded into raw events on this connection.
    frames: usize,
    /// `Ok` when the camera closed the stream.
    end: Result<(), StreamError>,
}

impl Session {
    fn failed(err: StreamError) -> Self {
        Self { connected: false, frames: 0, end: Err(err) }
    }
}

/// Runs one camera until cancelled or until its stream proves unsupported.
pub struct ConnectionSupervisor {
    camera: CameraDescriptor,
    connector: Arc<dyn Connector>,
    dispatcher: Dispatcher,
    config: SupervisorConfig,
    state: watch::Sender<ConnectionState>,
}

impl fmt::Debug for ConnectionSupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSupervisor")
            .field("camera", &self.camera.name())
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl ConnectionSupervisor {
    pub fn new(
        camera: CameraDescriptor,
        connector: Arc<dyn Connector>,
        dispatcher: Dispatcher,
        config: SupervisorConfig,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self { camera, connector, dispatcher, config, state }
    }

    pub fn camera(&self) -> &CameraDescriptor {
        &self.camera
    }

    /// Follow this supervisor's state.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(
                target: "alarmstream::supervisor",
                camera = %self.camera.name(),
                from = %previous,
                to = %state,
                "state change"
            );
        }
    }

    /// Supervise the camera until `cancel` fires or the stream is unsupported.
    pub async fn run(self, cancel: CancellationToken) -> SupervisorExit {
        let name = self.camera.name().to_string();
        let mut normalizer = EventNormalizer::new(name.clone());
        let mut attempt = 0usize;
        let mut auth_failures = 0usize;

        let exit = loop {
            if attempt > 0 {
                let delay = self.config.backoff.jittered_delay(attempt);
                self.set_state(ConnectionState::BackingOff);
                debug!(
                    target: "alarmstream::supervisor",
                    camera = %name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "backing off"
                );
                tokio::select! {
                    _ = cancel.cancelled() => break SupervisorExit::Cancelled,
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            self.set_state(ConnectionState::Connecting);
            let session = tokio::select! {
                _ = cancel.cancelled() => break SupervisorExit::Cancelled,
                session = self.session(&mut normalizer) => session,
            };

            if session.connected {
                auth_failures = 0;
            }
            if session.frames > 0 {
                attempt = 0;
            }

            match session.end {
                Ok(()) => {
                    info!(
                        target: "alarmstream::supervisor",
                        camera = %name,
                        frames = session.frames,
                        "stream closed by camera"
                    );
                }
                Err(err) if err.is_unsupported() => {
                    warn!(
                        target: "alarmstream::supervisor",
                        camera = %name,
                        error = %err,
                        "camera stream unsupported, giving up"
                    );
                    break self.give_up(&cancel).await;
                }
                Err(err) if err.is_auth() => {
                    auth_failures += 1;
                    if self.config.auth_failure_limit.is_some_and(|limit| auth_failures >= limit) {
                        warn!(
                            target: "alarmstream::supervisor",
                            camera = %name,
                            failures = auth_failures,
                            "credentials rejected repeatedly, giving up"
                        );
                        break self.give_up(&cancel).await;
                    }
                    warn!(
                        target: "alarmstream::supervisor",
                        camera = %name,
                        error = %err,
                        failures = auth_failures,
                        "authentication failed"
                    );
                }
                Err(err) => {
                    warn!(
                        target: "alarmstream::supervisor",
                        camera = %name,
                        error = %err,
                        frames = session.frames,
                        "connection failed"
                    );
                }
            }
            attempt = attempt.saturating_add(1);
        };

        self.set_state(ConnectionState::Shutdown);
        info!(
            target: "alarmstream::supervisor",
            camera = %name,
            exit = ?exit,
            "supervisor stopped"
        );
        exit
    }

    /// Report the camera unsupported. Cancellation still wins over a sink that never returns.
    async fn give_up(&self, cancel: &CancellationToken) -> SupervisorExit {
        tokio::select! {
            _ = cancel.cancelled() => SupervisorExit::Cancelled,
            _ = self.dispatcher.unsupported_camera(self.camera.name()) => {
                SupervisorExit::Unsupported
            }
        }
    }

    /// One connection, from connect to end of stream. Dropping the returned future drops the
    /// connection and any partially buffered frame.
    async fn session(&self, normalizer: &mut EventNormalizer) -> Session {
        let timeout = self.config.connect_timeout;
        let connection =
            match tokio::time::timeout(timeout, self.connector.connect(&self.camera)).await {
                Ok(Ok(connection)) => connection,
                Ok(Err(err)) => return Session::failed(err),
                Err(_) => return Session::failed(StreamError::Timeout(timeout)),
            };

        let mut decoder = match decoder::for_connection(
            self.camera.transport_mode(),
            connection.content_type.as_deref(),
            self.config.decoder_limits(),
        ) {
            Ok(decoder) => decoder,
            Err(err) => return Session { connected: true, frames: 0, end: Err(err) },
        };

        self.set_state(ConnectionState::Streaming);
        info!(
            target: "alarmstream::supervisor",
            camera = %self.camera.name(),
            transport = ?self.camera.transport_mode(),
            "streaming"
        );

        let mut body = connection.body;
        let mut frames = 0usize;
        let end = loop {
            let chunk = match body.next().await {
                Some(Ok(chunk)) => chunk,
                Some(Err(err)) => break Err(err),
                None => break Ok(()),
            };
            let decoded = match decoder.decode(&chunk) {
                Ok(decoded) => decoded,
                Err(err) => break Err(err),
            };
            for frame in decoded {
                let raw = match frame {
                    Ok(raw) => raw,
                    Err(err) => {
                        warn!(
                            target: "alarmstream::decoder",
                            camera = %self.camera.name(),
                            error = %err,
                            "skipping frame"
                        );
                        continue;
                    }
                };
                frames += 1;
                match normalizer.normalize(&raw) {
                    Ok(Some(event)) => self.dispatcher.deliver(&event).await,
                    Ok(None) => {}
                    Err(err) => warn!(
                        target: "alarmstream::normalizer",
                        camera = %self.camera.name(),
                        event_type = %raw.event_type,
                        error = %err,
                        "skipping event"
                    ),
                }
            }
        };

        if decoder.buffered() > 0 {
            debug!(
                target: "alarmstream::decoder",
                camera = %self.camera.name(),
                bytes = decoder.buffered(),
                "discarding partial frame"
            );
        }
        Session { connected: true, frames, end }
    }
}
