mod common;

use alarmstream::{Dispatcher, EventKind, EventState, MemorySink, SupervisorPool};
use common::{
    alert, camera, config_with_backoff, eventually, multipart, registry, Script, ScriptedConnector,
    StreamEnd,
};
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn repeated_states_fire_once_per_transition() {
    let connector = ScriptedConnector::new();
    let body = multipart(&[
        alert("VMD", "active"),
        alert("VMD", "active"),
        alert("VMD", "active"),
        alert("VMD", "inactive"),
    ]);
    connector.script("porch", Script::multipart(&body, StreamEnd::Hang));

    let sink = MemorySink::new();
    let pool = SupervisorPool::spawn(
        &registry(vec![camera("porch")]),
        connector.as_connector(),
        Dispatcher::new(sink.clone()),
        config_with_backoff(Duration::from_millis(100)),
    );

    eventually(|| sink.len() >= 2).await;
    tokio::time::sleep(Duration::from_secs(1)).await;
    pool.shutdown().await;

    let states: Vec<_> = sink.transitions().iter().map(|e| (e.kind, e.state)).collect();
    assert_eq!(
        states,
        vec![(EventKind::Motion, EventState::Active), (EventKind::Motion, EventState::Inactive)]
    );
}

#[tokio::test(start_paused = true)]
async fn edge_state_survives_reconnects() {
    let connector = ScriptedConnector::new();
    connector
        .script(
            "porch",
            Script::multipart(&multipart(&[alert("videoloss", "inactive")]), StreamEnd::Close),
        )
        .script(
            "porch",
            Script::multipart(
                &multipart(&[alert("videoloss", "inactive"), alert("videoloss", "active")]),
                StreamEnd::Hang,
            ),
        );

    let sink = MemorySink::new();
    let pool = SupervisorPool::spawn(
        &registry(vec![camera("porch")]),
        connector.as_connector(),
        Dispatcher::new(sink.clone()),
        config_with_backoff(Duration::from_millis(100)),
    );

    eventually(|| connector.connects("porch").len() >= 2 && sink.len() >= 2).await;
    tokio::time::sleep(Duration::from_secs(1)).await;
    pool.shutdown().await;

    let states: Vec<_> = sink.transitions().iter().map(|e| e.state).collect();
    assert_eq!(states, vec![EventState::Inactive, EventState::Active]);
}

#[tokio::test(start_paused = true)]
async fn cameras_keep_separate_edge_state() {
    let connector = ScriptedConnector::new();
    let body = multipart(&[alert("linedetection", "active")]);
    connector.script("front", Script::multipart(&body, StreamEnd::Hang));
    connector.script("back", Script::multipart(&body, StreamEnd::Hang));

    let sink = MemorySink::new();
    let pool = SupervisorPool::spawn(
        &registry(vec![camera("front"), camera("back")]),
        connector.as_connector(),
        Dispatcher::new(sink.clone()),
        config_with_backoff(Duration::from_millis(100)),
    );

    eventually(|| sink.len() >= 2).await;
    pool.shutdown().await;

    let mut cameras: Vec<_> = sink.transitions().into_iter().map(|e| e.camera_name).collect();
    cameras.sort();
    assert_eq!(cameras, vec!["back", "front"]);
}

#[tokio::test(start_paused = true)]
async fn unknown_event_types_are_forwarded() {
    let connector = ScriptedConnector::new();
    let body = multipart(&[
        alert("tamperdetection", "active"),
        alert("tamperdetection", "active"),
        alert("VMD", "active"),
    ]);
    connector.script("porch", Script::multipart(&body, StreamEnd::Hang));

    let sink = MemorySink::new();
    let pool = SupervisorPool::spawn(
        &registry(vec![camera("porch")]),
        connector.as_connector(),
        Dispatcher::new(sink.clone()),
        config_with_backoff(Duration::from_millis(100)),
    );

    eventually(|| sink.len() >= 2).await;
    tokio::time::sleep(Duration::from_secs(1)).await;
    pool.shutdown().await;

    let events = sink.transitions();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].kind, EventKind::Unknown);
    assert_eq!(events[0].vendor_type, "tamperdetection");
    assert_eq!(events[1].kind, EventKind::Motion);
}
