#![allow(dead_code)]

use alarmstream::transport::ByteStream;
use alarmstream::{
    CameraConfig, CameraDescriptor, CameraRegistry, Connection, Connector, Jitter,
    ReconnectBackoff, StreamError, SupervisorConfig,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream, StreamExt};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;

pub const BOUNDARY: &str = "boundary";
pub const MULTIPART: &str = "multipart/mixed; boundary=boundary";

/// One `<EventNotificationAlert>` document as a camera pushes it.
pub fn alert(event_type: &str, state: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\r\n\
<EventNotificationAlert version=\"2.0\" xmlns=\"http://www.hikvision.com/ver20/XMLSchema\">\r\n\
<ipAddress>192.168.1.64</ipAddress>\r\n\
<portNo>80</portNo>\r\n\
<protocol>HTTP</protocol>\r\n\
<macAddress>44:19:b6:00:00:01</macAddress>\r\n\
<channelID>1</channelID>\r\n\
<dateTime>2024-05-01T10:15:30+02:00</dateTime>\r\n\
<activePostCount>1</activePostCount>\r\n\
<eventType>{event_type}</eventType>\r\n\
<eventState>{state}</eventState>\r\n\
<eventDescription>{event_type} alarm</eventDescription>\r\n\
</EventNotificationAlert>\r\n"
    )
}

/// A multipart part carrying `Content-Length`.
pub fn part(body: &str) -> String {
    format!(
        "--{BOUNDARY}\r\nContent-Type: application/xml; charset=\"UTF-8\"\r\nContent-Length: {}\r\n\r\n{body}\r\n",
        body.len()
    )
}

/// Multipart body of the given documents.
pub fn multipart(bodies: &[String]) -> String {
    bodies.iter().map(|b| part(b)).collect()
}

/// What a raw-socket camera emits: a broken header block and lying part lengths.
pub fn raw_body(bodies: &[String]) -> String {
    let mut out =
        String::from("HTTP/1.1 200 OK\r\nContent-Type: multipart/mixed; boundary=boundary\r\n\r\n");
    for body in bodies {
        out.push_str("--boundary\r\nContent-Type: application/xml\r\nContent-Length: 1\r\n\r\n");
        out.push_str(body);
        out.push_str("\r\n");
    }
    out
}

/// Split `text` into chunks of at most `size` bytes.
pub fn chunks(text: &str, size: usize) -> Vec<Bytes> {
    text.as_bytes().chunks(size).map(Bytes::copy_from_slice).collect()
}

pub fn camera(name: &str) -> CameraConfig {
    CameraConfig::new(name, "127.0.0.1")
}

pub fn registry(cameras: Vec<CameraConfig>) -> CameraRegistry {
    CameraRegistry::new(cameras).expect("valid registry")
}

pub fn descriptor(config: CameraConfig) -> CameraDescriptor {
    CameraDescriptor::from_config(config).expect("valid camera")
}

/// Constant backoff without jitter, so paused-clock tests can assert exact instants.
pub fn config_with_backoff(delay: Duration) -> SupervisorConfig {
    SupervisorConfig::builder()
        .backoff(ReconnectBackoff::constant(delay).with_jitter(Jitter::None))
        .build()
        .expect("valid config")
}

/// How a scripted connection's body ends.
#[derive(Debug, Clone)]
pub enum StreamEnd {
    Close,
    Error(StreamError),
    Hang,
}

/// One scripted connect attempt.
#[derive(Debug, Clone)]
pub enum Script {
    Fail(StreamError),
    /// `connect` never completes.
    Block,
    Stream { content_type: Option<String>, chunks: Vec<Bytes>, end: StreamEnd },
}

impl Script {
    pub fn multipart(body: &str, end: StreamEnd) -> Self {
        Script::Stream { content_type: Some(MULTIPART.into()), chunks: chunks(body, 37), end }
    }

    pub fn with_content_type(content_type: &str, body: &str, end: StreamEnd) -> Self {
        Script::Stream { content_type: Some(content_type.into()), chunks: chunks(body, 37), end }
    }
}

/// Connector that replays scripted attempts per camera. Once a camera's script is exhausted
/// every further connect blocks forever.
#[derive(Debug, Clone, Default)]
pub struct ScriptedConnector {
    scripts: Arc<Mutex<HashMap<String, VecDeque<Script>>>>,
    connects: Arc<Mutex<Vec<(String, Instant)>>>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, camera: &str, script: Script) -> &Self {
        self.scripts.lock().unwrap().entry(camera.to_string()).or_default().push_back(script);
        self
    }

    /// Instants at which `camera` was connected to, in order.
    pub fn connects(&self, camera: &str) -> Vec<Instant> {
        self.connects
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == camera)
            .map(|(_, at)| *at)
            .collect()
    }

    pub fn as_connector(&self) -> Arc<dyn Connector> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, camera: &CameraDescriptor) -> Result<Connection, StreamError> {
        self.connects.lock().unwrap().push((camera.name().to_string(), Instant::now()));
        let next =
            self.scripts.lock().unwrap().get_mut(camera.name()).and_then(VecDeque::pop_front);
        match next {
            None | Some(Script::Block) => futures::future::pending().await,
            Some(Script::Fail(err)) => Err(err),
            Some(Script::Stream { content_type, chunks, end }) => {
                let tail: ByteStream = match end {
                    StreamEnd::Close => stream::empty().boxed(),
                    StreamEnd::Error(err) => stream::once(async move { Err(err) }).boxed(),
                    StreamEnd::Hang => stream::pending().boxed(),
                };
                let body = stream::iter(chunks.into_iter().map(Ok)).chain(tail).boxed();
                Ok(Connection::new(content_type, body))
            }
        }
    }
}

/// Poll `condition` until it holds, failing the test after 30 s (virtual time when paused).
pub async fn eventually<F: FnMut() -> bool>(mut condition: F) {
    tokio::time::timeout(Duration::from_secs(30), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not met in time");
}

/// Log lines written while the returned guard is alive. The subscriber is thread-local, so this
/// sees supervisors spawned on the default current-thread test runtime.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn install() -> (Self, DefaultGuard) {
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_target(true)
            .with_ansi(false)
            .without_time()
            .finish();
        let guard = tracing::subscriber::set_default(subscriber);
        (logs, guard)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

pub struct LogWriter(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogWriter(self.0.clone())
    }
}
