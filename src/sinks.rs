//! Ready-made [`AlarmSink`] implementations.
//!
//! - [`NullSink`] discards everything.
//! - [`LogSink`] writes each notification through `tracing`.
//! - [`MemorySink`] keeps a bounded history, mostly for tests.
//! - [`StreamingSink`] broadcasts to any number of subscribers.
//! - [`ServiceSink`] adapts a `tower::Service<SinkEvent>`, which is how MQTT or webhook
//!   publishers plug in.

use crate::dispatcher::{AlarmSink, SinkEvent};
use crate::error::SinkError;
use crate::event::CanonicalEvent;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::broadcast;
use tower::{Service, ServiceExt};

/// Discards all notifications.
#[derive(Clone, Debug, Default)]
pub struct NullSink;

#[async_trait]
impl AlarmSink for NullSink {
    async fn deliver(&self, _event: &CanonicalEvent) -> Result<(), SinkError> {
        Ok(())
    }

    async fn unsupported_camera(&self, _camera: &str) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Logs notifications at `info` (transitions) and `warn` (unsupported cameras).
#[derive(Clone, Debug, Default)]
pub struct LogSink;

#[async_trait]
impl AlarmSink for LogSink {
    async fn deliver(&self, event: &CanonicalEvent) -> Result<(), SinkError> {
        tracing::info!(
            target: "alarmstream::sink",
            camera = %event.camera_name,
            kind = %event.kind,
            state = %event.state,
            channel = event.channel_id,
            timestamp = %event.timestamp,
            description = %event.description,
            "alarm"
        );
        Ok(())
    }

    async fn unsupported_camera(&self, camera: &str) -> Result<(), SinkError> {
        tracing::warn!(target: "alarmstream::sink", camera, "camera stream unsupported");
        Ok(())
    }
}

/// Stores notifications in memory, evicting the oldest once `capacity` is reached.
#[derive(Clone, Debug)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<SinkEvent>>>,
    capacity: usize,
    evicted: Arc<AtomicU64>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::with_capacity(10_000)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            capacity: capacity.max(1),
            evicted: Arc::new(AtomicU64::new(0)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<SinkEvent>> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn push(&self, event: SinkEvent) {
        let mut guard = self.lock();
        if guard.len() >= self.capacity {
            guard.remove(0);
            self.evicted.fetch_add(1, Ordering::Relaxed);
        }
        guard.push(event);
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.lock().clone()
    }

    /// Only the transitions, in arrival order.
    pub fn transitions(&self) -> Vec<CanonicalEvent> {
        self.lock()
            .iter()
            .filter_map(|e| match e {
                SinkEvent::Transition(event) => Some(event.clone()),
                SinkEvent::Unsupported { .. } => None,
            })
            .collect()
    }

    /// Cameras reported unsupported, in arrival order.
    pub fn unsupported(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter_map(|e| match e {
                SinkEvent::Unsupported { camera } => Some(camera.clone()),
                SinkEvent::Transition(_) => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AlarmSink for MemorySink {
    async fn deliver(&self, event: &CanonicalEvent) -> Result<(), SinkError> {
        self.push(SinkEvent::Transition(event.clone()));
        Ok(())
    }

    async fn unsupported_camera(&self, camera: &str) -> Result<(), SinkError> {
        self.push(SinkEvent::Unsupported { camera: camera.to_string() });
        Ok(())
    }
}

/// Broadcasts notifications to every live subscriber.
///
/// Sending with no subscriber counts as a drop; slow subscribers observe `Lagged` on their
/// receiver, as usual for `tokio::sync::broadcast`.
#[derive(Clone, Debug)]
pub struct StreamingSink {
    sender: broadcast::Sender<SinkEvent>,
    dropped: Arc<AtomicU64>,
    last_drop_ns: Arc<AtomicU64>,
}

impl StreamingSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            dropped: Arc::new(AtomicU64::new(0)),
            last_drop_ns: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SinkEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn last_drop(&self) -> Option<SystemTime> {
        match self.last_drop_ns.load(Ordering::Relaxed) {
            0 => None,
            ns => UNIX_EPOCH.checked_add(Duration::from_nanos(ns)),
        }
    }

    fn send(&self, event: SinkEvent) {
        if self.sender.send(event).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            self.last_drop_ns.store(
                SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos() as u64,
                Ordering::Relaxed,
            );
        }
    }
}

#[async_trait]
impl AlarmSink for StreamingSink {
    async fn deliver(&self, event: &CanonicalEvent) -> Result<(), SinkError> {
        self.send(SinkEvent::Transition(event.clone()));
        Ok(())
    }

    async fn unsupported_camera(&self, camera: &str) -> Result<(), SinkError> {
        self.send(SinkEvent::Unsupported { camera: camera.to_string() });
        Ok(())
    }
}

/// Drives a `tower::Service<SinkEvent>` as a sink.
///
/// The service is cloned per call and driven with `ready_oneshot`, so readiness (rate limits,
/// connection pools) is honored without holding a lock across the await.
#[derive(Clone, Debug)]
pub struct ServiceSink<S> {
    service: S,
}

impl<S> ServiceSink<S> {
    pub fn new(service: S) -> Self {
        Self { service }
    }

    pub fn get_ref(&self) -> &S {
        &self.service
    }
}

impl<S> ServiceSink<S>
where
    S: Service<SinkEvent, Response = ()> + Clone + Send + Sync + std::fmt::Debug + 'static,
    S::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    S::Future: Send,
{
    async fn send(&self, event: SinkEvent) -> Result<(), SinkError> {
        let ready = ServiceExt::<SinkEvent>::ready_oneshot(self.service.clone())
            .await
            .map_err(SinkError::new)?;
        ready.oneshot(event).await.map_err(SinkError::new)
    }
}

#[async_trait]
impl<S> AlarmSink for ServiceSink<S>
where
    S: Service<SinkEvent, Response = ()> + Clone + Send + Sync + std::fmt::Debug + 'static,
    S::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    S::Future: Send,
{
    async fn deliver(&self, event: &CanonicalEvent) -> Result<(), SinkError> {
        self.send(SinkEvent::Transition(event.clone())).await
    }

    async fn unsupported_camera(&self, camera: &str) -> Result<(), SinkError> {
        self.send(SinkEvent::Unsupported { camera: camera.to_string() }).await
    }
}
