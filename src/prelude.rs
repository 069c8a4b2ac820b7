//! Convenient re-exports for wiring up a pipeline and writing sinks.
pub use crate::{
    dispatcher::{AlarmSink, Dispatcher, SinkEvent},
    error::{ConfigError, SinkError, StreamError},
    event::{CanonicalEvent, EventKind, EventState},
    registry::{CameraConfig, CameraRegistry},
    sinks::{LogSink, MemorySink, NullSink, ServiceSink, StreamingSink},
    supervisor::{ConnectionState, SupervisorConfig, SupervisorExit},
    transport::{CameraConnector, Connector},
    SupervisorPool,
};
