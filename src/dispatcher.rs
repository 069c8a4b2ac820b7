//! Fan-out of accepted transitions to the registered sinks.
//!
//! The [`Dispatcher`] is assembled once at startup and shared by every camera worker. Each
//! worker calls it inline: sinks run in registration order, errors are logged and swallowed,
//! nothing is buffered or retried.

use crate::error::SinkError;
use crate::event::CanonicalEvent;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Receiver of alarms. Implementations must tolerate concurrent calls from several cameras.
#[async_trait]
pub trait AlarmSink: Send + Sync + fmt::Debug {
    /// Called once per accepted state transition.
    async fn deliver(&self, event: &CanonicalEvent) -> Result<(), SinkError>;

    /// Called once when a camera's stream cannot be decoded and its worker stops.
    async fn unsupported_camera(&self, camera: &str) -> Result<(), SinkError>;
}

/// Owned form of a sink notification, for sinks that queue or forward events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Transition(CanonicalEvent),
    Unsupported { camera: String },
}

impl SinkEvent {
    pub fn camera(&self) -> &str {
        match self {
            SinkEvent::Transition(event) => &event.camera_name,
            SinkEvent::Unsupported { camera } => camera,
        }
    }
}

impl fmt::Display for SinkEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkEvent::Transition(e) => {
                write!(f, "{} {} {}: {}", e.camera_name, e.kind, e.state, e.description)
            }
            SinkEvent::Unsupported { camera } => write!(f, "{camera} unsupported"),
        }
    }
}

#[async_trait]
impl<T: AlarmSink + ?Sized> AlarmSink for Arc<T> {
    async fn deliver(&self, event: &CanonicalEvent) -> Result<(), SinkError> {
        (**self).deliver(event).await
    }

    async fn unsupported_camera(&self, camera: &str) -> Result<(), SinkError> {
        (**self).unsupported_camera(camera).await
    }
}

/// Immutable list of sinks, cheap to clone.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    sinks: Arc<[Arc<dyn AlarmSink>]>,
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::default()
    }

    /// Dispatcher with a single sink.
    pub fn new(sink: impl AlarmSink + 'static) -> Self {
        Self::builder().sink(sink).build()
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Hand a transition to every sink in order.
    pub async fn deliver(&self, event: &CanonicalEvent) {
        debug!(
            target: "alarmstream::dispatcher",
            camera = %event.camera_name,
            kind = %event.kind,
            state = %event.state,
            "dispatching transition"
        );
        for sink in self.sinks.iter() {
            if let Err(err) = sink.deliver(event).await {
                warn!(
                    target: "alarmstream::dispatcher",
                    camera = %event.camera_name,
                    sink = ?sink,
                    error = %err,
                    "sink rejected event"
                );
            }
        }
    }

    /// Tell every sink that `camera` has been abandoned.
    pub async fn unsupported_camera(&self, camera: &str) {
        for sink in self.sinks.iter() {
            if let Err(err) = sink.unsupported_camera(camera).await {
                warn!(
                    target: "alarmstream::dispatcher",
                    camera,
                    sink = ?sink,
                    error = %err,
                    "sink rejected unsupported-camera notice"
                );
            }
        }
    }
}

/// Collects sinks before the pool starts. There is no way to add a sink afterwards.
#[derive(Debug, Default)]
pub struct DispatcherBuilder {
    sinks: Vec<Arc<dyn AlarmSink>>,
}

impl DispatcherBuilder {
    pub fn sink(mut self, sink: impl AlarmSink + 'static) -> Self {
        self.sinks.push(Arc::new(sink));
        self
    }

    pub fn shared_sink(mut self, sink: Arc<dyn AlarmSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn build(self) -> Dispatcher {
        Dispatcher { sinks: self.sinks.into() }
    }
}
