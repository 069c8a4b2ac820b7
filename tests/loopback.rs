mod common;

use alarmstream::decoder::{self, DecoderLimits};
use alarmstream::{
    AuthMethod, CameraConnector, Connector, Dispatcher, EventKind, EventState, HttpConnector,
    MemorySink, RawSocketConnector, SupervisorConfig, SupervisorPool, TransportMode,
};
use common::{alert, descriptor, eventually, multipart, raw_body, registry};
use futures::StreamExt;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

const DIGEST_CHALLENGE: &str = "Digest realm=\"IP Camera\", qop=\"auth\", nonce=\"4e5449354d\", opaque=\"\", stale=\"FALSE\"";

/// Read one request head and return it lowercased.
async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = socket.read(&mut chunk).await.unwrap();
        assert!(n > 0, "client closed before finishing the request");
        buf.extend_from_slice(&chunk[..n]);
    }
    String::from_utf8_lossy(&buf).to_lowercase()
}

async fn write_stream(socket: &mut TcpStream, content_type: &str, body: &str) {
    let head =
        format!("HTTP/1.1 200 OK\r\nContent-Type: {content_type}\r\nConnection: close\r\n\r\n");
    socket.write_all(head.as_bytes()).await.unwrap();
    socket.write_all(body.as_bytes()).await.unwrap();
    socket.flush().await.unwrap();
}

async fn write_challenge(socket: &mut TcpStream) {
    let response = format!(
        "HTTP/1.1 401 Unauthorized\r\nWWW-Authenticate: {DIGEST_CHALLENGE}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
    );
    socket.write_all(response.as_bytes()).await.unwrap();
    socket.shutdown().await.unwrap();
}

#[tokio::test]
async fn http_connector_sends_basic_credentials_and_streams_parts() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;
        seen_tx.send(request).unwrap();
        let body = multipart(&[alert("VMD", "active")]);
        write_stream(&mut socket, "multipart/mixed; boundary=boundary", &body).await;
        // hold the stream open like a camera would
        tokio::time::sleep(std::time::Duration::from_secs(30)).await;
    });

    let camera = descriptor(alarmstream::CameraConfig {
        address: addr.to_string(),
        ..common::camera("porch").credentials("admin", "secret").auth(AuthMethod::Basic)
    });

    let connector = HttpConnector::builder().build().unwrap();
    let mut connection = connector.connect(&camera).await.unwrap();
    assert_eq!(connection.content_type.as_deref(), Some("multipart/mixed; boundary=boundary"));

    let request = seen_rx.recv().await.unwrap();
    assert!(request.starts_with("get /isapi/event/notification/alertstream http/1.1"));
    assert!(request.contains("authorization: basic ywrtaw46c2vjcmv0"), "{request}");

    let mut decoder = decoder::for_connection(
        TransportMode::MultipartHttp,
        connection.content_type.as_deref(),
        DecoderLimits::default(),
    )
    .unwrap();
    let mut events = Vec::new();
    while events.is_empty() {
        let chunk = connection.body.next().await.unwrap().unwrap();
        events.extend(decoder.decode(&chunk).unwrap());
    }
    assert_eq!(events[0].as_ref().unwrap().event_type, "VMD");
}

#[tokio::test]
async fn http_connector_answers_digest_challenge() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let (mut first, _) = listener.accept().await.unwrap();
        seen_tx.send(read_request(&mut first).await).unwrap();
        write_challenge(&mut first).await;

        let (mut second, _) = listener.accept().await.unwrap();
        seen_tx.send(read_request(&mut second).await).unwrap();
        write_stream(&mut second, "multipart/mixed; boundary=boundary", "").await;
    });

    let camera = descriptor(alarmstream::CameraConfig {
        address: addr.to_string(),
        ..common::camera("porch").credentials("admin", "12345")
    });
    let connector = HttpConnector::builder().build().unwrap();
    let connection = connector.connect(&camera).await.unwrap();
    assert_eq!(connection.content_type.as_deref(), Some("multipart/mixed; boundary=boundary"));

    let first = seen_rx.recv().await.unwrap();
    assert!(!first.contains("authorization:"));
    let second = seen_rx.recv().await.unwrap();
    assert!(second.contains("authorization: digest username=\"admin\""), "{second}");
    assert!(second.contains("nonce=\"4e5449354d\""));
    assert!(second.contains("uri=\"/isapi/event/notification/alertstream\""));
    assert!(second.contains("qop=auth"));
    assert!(second.contains("nc=00000001"));
}

#[tokio::test]
async fn http_connector_maps_statuses() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        for status in ["404 Not Found", "503 Service Unavailable", "401 Unauthorized"] {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_request(&mut socket).await;
            let response =
                format!("HTTP/1.1 {status}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        }
    });

    let camera = descriptor(alarmstream::CameraConfig {
        address: addr.to_string(),
        ..common::camera("porch").credentials("admin", "pw").auth(AuthMethod::Basic)
    });
    let connector = HttpConnector::builder().build().unwrap();

    assert!(connector.connect(&camera).await.unwrap_err().is_unsupported());
    let err = connector.connect(&camera).await.unwrap_err();
    assert_eq!(err, alarmstream::StreamError::Status { status: 503 });
    assert!(connector.connect(&camera).await.unwrap_err().is_auth());
}

#[tokio::test]
async fn raw_connector_answers_digest_and_scans_broken_framing() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let (mut first, _) = listener.accept().await.unwrap();
        seen_tx.send(read_request(&mut first).await).unwrap();
        write_challenge(&mut first).await;

        let (mut second, _) = listener.accept().await.unwrap();
        seen_tx.send(read_request(&mut second).await).unwrap();
        let body = raw_body(&[alert("videoloss", "inactive"), alert("VMD", "active")]);
        second.write_all(body.as_bytes()).await.unwrap();
        second.flush().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_secs(30)).await;
    });

    let camera = descriptor(alarmstream::CameraConfig {
        address: addr.to_string(),
        ..common::camera("doorbell").credentials("admin", "12345").raw_tcp(true)
    });
    let mut connection = RawSocketConnector::new().connect(&camera).await.unwrap();

    let second = {
        seen_rx.recv().await.unwrap();
        seen_rx.recv().await.unwrap()
    };
    assert!(second.contains("authorization: digest username=\"admin\""), "{second}");

    let mut decoder = decoder::for_connection(
        TransportMode::RawSocket,
        connection.content_type.as_deref(),
        DecoderLimits::default(),
    )
    .unwrap();
    let mut types = Vec::new();
    while types.len() < 2 {
        let chunk = connection.body.next().await.unwrap().unwrap();
        for frame in decoder.decode(&chunk).unwrap() {
            types.push(frame.unwrap().event_type);
        }
    }
    assert_eq!(types, vec!["videoloss", "VMD"]);
}

#[tokio::test]
async fn pool_streams_from_a_loopback_camera() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        read_request(&mut socket).await;
        let body = multipart(&[
            alert("regionEntrance", "active"),
            alert("regionEntrance", "active"),
            alert("regionEntrance", "inactive"),
        ]);
        write_stream(&mut socket, "multipart/mixed; boundary=\"boundary\"", &body).await;
        tokio::time::sleep(std::time::Duration::from_secs(30)).await;
    });

    let registry = registry(vec![alarmstream::CameraConfig {
        address: addr.to_string(),
        ..common::camera("porch")
    }]);
    let sink = MemorySink::new();
    let pool = SupervisorPool::spawn(
        &registry,
        Arc::new(CameraConnector::with_defaults().unwrap()),
        Dispatcher::new(sink.clone()),
        SupervisorConfig::default(),
    );

    eventually(|| sink.len() >= 2).await;
    pool.shutdown().await;

    let events: Vec<_> = sink.transitions().iter().map(|e| (e.kind, e.state)).collect();
    assert_eq!(
        events,
        vec![
            (EventKind::RegionEntrance, EventState::Active),
            (EventKind::RegionEntrance, EventState::Inactive),
        ]
    );
}
