//! Consumer against a real playback server on a loopback socket.

mod common;

use std::time::Duration;

use common::Recorder;
use flowcast_client::{
    CloseReason, ConnectionState, ConsumerConfig, FlowConsumer, HttpFrameSource, SessionEnd,
};
use flowcast_core::fault::ErrorCode;
use flowcast_core::prelude::*;
use flowcast_server::config::ServerConfig;
use flowcast_server::state::{AppState, PlaybackRegistry};

async fn serve(config: ServerConfig) -> (String, PlaybackRegistry) {
    let state = AppState::new(config).unwrap();
    let playbacks = state.playbacks.clone();
    let app = flowcast_server::app_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/api/flow-stream"), playbacks)
}

fn http_consumer(config: ConsumerConfig) -> FlowConsumer {
    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    let source = HttpFrameSource::with_client(client, config.url.clone());
    FlowConsumer::with_source(source, config)
}

#[tokio::test]
async fn quickstart_over_http() {
    let (url, _) = serve(ServerConfig::default().with_warmup(Duration::ZERO)).await;
    let consumer = http_consumer(ConsumerConfig::new(url).for_dataset("quickstart"));
    let (recorder, _seen) = Recorder::new();

    let started = std::time::Instant::now();
    let end = consumer.start(recorder.callback()).wait().await;
    assert_eq!(end, SessionEnd::Completed);
    assert!(started.elapsed() >= Duration::from_millis(800));

    let kinds: Vec<&str> = recorder.events().iter().map(|e| e.kind()).collect();
    assert_eq!(
        kinds,
        vec!["node_created", "node_created", "edge_created", "node_status_updated", "flow_completed"]
    );

    let snapshot = consumer.snapshot();
    assert_eq!(snapshot.graph.node_ids(), vec!["a", "b"]);
    assert_eq!(snapshot.graph.node("b").unwrap().status, NodeStatus::Success);
    assert_eq!(snapshot.graph.edges().len(), 1);
    assert_eq!(snapshot.graph.focused_node_id(), None);
    assert_eq!(snapshot.run_status, RunStatus::Completed);
    assert_eq!(snapshot.connection, ConnectionState::Closed(CloseReason::Normal));
}

#[tokio::test]
async fn unknown_dataset_fails_to_connect() {
    let (url, _) = serve(ServerConfig::default()).await;
    let consumer = http_consumer(ConsumerConfig::new(url).for_dataset("missing"));

    let end = consumer.start(|_| {}).wait().await;
    let SessionEnd::Faulted(report) = end else {
        panic!("expected fault, got {end:?}");
    };
    assert_eq!(report.details.code, ErrorCode::StreamConnectionFailed);
    assert!(report.details.message.contains("404"), "{}", report.details.message);
    assert_eq!(consumer.run_status(), RunStatus::Errored);
}

#[tokio::test]
async fn stop_releases_server_playback() {
    let (url, playbacks) = serve(ServerConfig::default().with_warmup(Duration::ZERO)).await;
    let consumer = http_consumer(ConsumerConfig::new(url));
    let (recorder, mut seen) = Recorder::new();
    let session = consumer.start(recorder.callback());

    seen.recv().await;
    assert_eq!(playbacks.active_count(), 1);
    consumer.stop();
    assert_eq!(session.wait().await, SessionEnd::Stopped);

    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    while playbacks.active_count() > 0 {
        assert!(std::time::Instant::now() < deadline, "server playback still active");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
