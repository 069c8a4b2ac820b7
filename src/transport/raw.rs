use super::{check_status, request_target, ByteStream, Connection, Connector};
use crate::auth::Authenticator;
use crate::decoder::find;
use crate::error::StreamError;
use crate::registry::CameraDescriptor;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{stream, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::io::ReaderStream;
use tracing::debug;

/// Most bytes read while looking for the end of the response headers.
const PRELUDE_LIMIT: usize = 4 * 1024;

/// Opens the alert stream over a bare TCP socket for devices whose responses break HTTP parsers.
///
/// The request is written by hand and the response prelude is read leniently: a status line and
/// `WWW-Authenticate` headers are honored when present, anything unrecognisable is passed on to
/// the raw scanner untouched.
#[derive(Debug, Clone, Default)]
pub struct RawSocketConnector;

/// What could be recovered from the start of a raw response.
#[derive(Debug, Default, PartialEq, Eq)]
struct Prelude {
    status: Option<u16>,
    challenges: Vec<String>,
    content_type: Option<String>,
    /// Bytes read past the header block (or everything, when no header block was recognised).
    leftover: Bytes,
}

impl RawSocketConnector {
    pub fn new() -> Self {
        Self
    }

    async fn open(
        &self,
        camera: &CameraDescriptor,
        authorization: Option<&str>,
    ) -> Result<(TcpStream, Prelude), StreamError> {
        let (host, port) = socket_target(camera)?;
        let mut socket = TcpStream::connect((host, port)).await?;
        let request = build_request(camera, authorization);
        socket.write_all(request.as_bytes()).await?;
        socket.flush().await?;

        let prelude = read_prelude(&mut socket).await?;
        Ok((socket, prelude))
    }
}

/// Host and port to dial. IPv6 literals lose the brackets they carry in the URL.
fn socket_target(camera: &CameraDescriptor) -> Result<(&str, u16), StreamError> {
    let url = camera.stream_url();
    let host = url
        .host_str()
        .ok_or_else(|| StreamError::unsupported("stream URL has no host"))?;
    let host = host.strip_prefix('[').and_then(|h| h.strip_suffix(']')).unwrap_or(host);
    Ok((host, url.port_or_known_default().unwrap_or(80)))
}

#[async_trait]
impl Connector for RawSocketConnector {
    async fn connect(&self, camera: &CameraDescriptor) -> Result<Connection, StreamError> {
        let auth = Authenticator::for_camera(camera);
        let (mut socket, mut prelude) =
            self.open(camera, auth.preemptive_header().as_deref()).await?;

        if prelude.status == Some(401) && auth.answers_challenges() {
            let header = auth.answer_challenge(
                prelude.challenges.iter().map(String::as_str),
                "GET",
                &request_target(camera.stream_url()),
            )?;
            debug!(
                target: "alarmstream::transport",
                camera = %camera.name(),
                "reconnecting raw socket with digest credentials"
            );
            drop(socket);
            (socket, prelude) = self.open(camera, Some(&header)).await?;
        }

        if let Some(status) = prelude.status {
            check_status(status)?;
        }

        let leftover = prelude.leftover;
        let head: ByteStream = if leftover.is_empty() {
            stream::empty().boxed()
        } else {
            stream::once(async move { Ok::<_, StreamError>(leftover) }).boxed()
        };
        let rest = ReaderStream::new(socket).map(|chunk| chunk.map_err(StreamError::from));
        Ok(Connection::new(prelude.content_type, head.chain(rest).boxed()))
    }
}

fn build_request(camera: &CameraDescriptor, authorization: Option<&str>) -> String {
    let url = camera.stream_url();
    let host = match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_string(),
        (None, _) => String::new(),
    };
    let mut request = format!(
        "GET {} HTTP/1.1\r\nHost: {host}\r\nAccept: multipart/mixed, */*\r\nConnection: keep-alive\r\n",
        request_target(url)
    );
    if let Some(value) = authorization {
        request.push_str("Authorization: ");
        request.push_str(value);
        request.push_str("\r\n");
    }
    request.push_str("\r\n");
    request
}

/// Read until the end of the header block, EOF, or [`PRELUDE_LIMIT`] bytes.
async fn read_prelude(socket: &mut TcpStream) -> Result<Prelude, StreamError> {
    let mut buf = BytesMut::with_capacity(1024);
    loop {
        if header_end(&buf).is_some() || buf.len() >= PRELUDE_LIMIT {
            break;
        }
        let n = socket.read_buf(&mut buf).await?;
        if n == 0 {
            if buf.is_empty() {
                return Err(StreamError::connection("camera closed the socket without answering"));
            }
            break;
        }
    }
    Ok(parse_prelude(buf))
}

/// Offset just past the blank line ending the header block.
fn header_end(buf: &[u8]) -> Option<usize> {
    match (find(buf, b"\r\n\r\n"), find(buf, b"\n\n")) {
        (Some(a), Some(b)) if b + 2 < a + 4 => Some(b + 2),
        (Some(a), _) => Some(a + 4),
        (None, Some(b)) => Some(b + 2),
        (None, None) => None,
    }
}

fn parse_prelude(mut buf: BytesMut) -> Prelude {
    if !buf.starts_with(b"HTTP/") {
        return Prelude { leftover: buf.freeze(), ..Prelude::default() };
    }
    let end = header_end(&buf).unwrap_or(buf.len());
    let head = buf.split_to(end);
    let text = String::from_utf8_lossy(&head);

    let mut lines = text.lines();
    let status = lines
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|code| code.parse::<u16>().ok());

    let mut prelude = Prelude { status, ..Prelude::default() };
    for line in lines {
        let Some((name, value)) = line.split_once(':') else { continue };
        let (name, value) = (name.trim(), value.trim());
        if name.eq_ignore_ascii_case("www-authenticate") {
            prelude.challenges.push(value.to_string());
        } else if name.eq_ignore_ascii_case("content-type") {
            prelude.content_type = Some(value.to_string());
        }
    }
    prelude.leftover = buf.freeze();
    prelude
}
