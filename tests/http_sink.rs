//! HttpSink against a fake backend

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use diagbridge::{Bridge, Config, Console, HttpSink, LogLevel, LogRecord, LogSink, SinkError, Value};
use tokio::sync::mpsc;
use tokio::time::timeout;

/// Start a backend that records every POSTed record and answers with `status`
async fn start_backend(status: StatusCode) -> (SocketAddr, mpsc::UnboundedReceiver<LogRecord>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let app = Router::new()
        .route(
            "/log",
            post(
                move |State(tx): State<mpsc::UnboundedSender<LogRecord>>,
                      Json(record): Json<LogRecord>| async move {
                    tx.send(record).ok();
                    status
                },
            ),
        )
        .with_state(tx);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    (addr, rx)
}

fn sink_for(addr: SocketAddr) -> HttpSink {
    HttpSink::new(format!("http://{}/log", addr), Duration::from_secs(2)).unwrap()
}

#[tokio::test]
async fn test_record_is_posted_as_json() {
    let (addr, mut rx) = start_backend(StatusCode::OK).await;

    sink_for(addr)
        .forward(LogRecord::new(LogLevel::Warn, "low disk space"))
        .await
        .unwrap();

    let received = rx.recv().await.unwrap();
    assert_eq!(received, LogRecord::new(LogLevel::Warn, "low disk space"));
}

#[tokio::test]
async fn test_error_status_is_reported() {
    let (addr, _rx) = start_backend(StatusCode::INTERNAL_SERVER_ERROR).await;

    let result = sink_for(addr)
        .forward(LogRecord::new(LogLevel::Error, "boom"))
        .await;

    assert!(matches!(result, Err(SinkError::Status(500))));
}

#[tokio::test]
async fn test_bridge_forwards_console_calls_to_backend() {
    let (addr, mut rx) = start_backend(StatusCode::OK).await;
    let config = Config {
        capture_panics: false,
        ..Config::default()
    };
    let bridge = Bridge::new(config, Arc::new(sink_for(addr))).unwrap();
    let console = Console::bare().with_handler(
        diagbridge::EntryPoint::Error,
        Arc::new(|_: &[Value]| {}),
    );
    bridge.install(&console);

    console.error(&[Value::from("request failed"), Value::from(503)]);
    console.error(&[Value::from("request failed"), Value::from(503)]);

    let first = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
    assert_eq!(first.level, LogLevel::Error);
    assert_eq!(first.message, "request failed 503");

    // The duplicate never leaves the process
    assert!(timeout(Duration::from_millis(300), rx.recv()).await.is_err());
}

#[tokio::test]
async fn test_failing_backend_does_not_stall_dispatch() {
    let (addr, mut rx) = start_backend(StatusCode::SERVICE_UNAVAILABLE).await;
    let config = Config {
        capture_panics: false,
        ..Config::default()
    };
    let bridge = Bridge::new(config, Arc::new(sink_for(addr))).unwrap();

    for i in 0..3 {
        bridge.submit(LogLevel::Info, &[Value::from(format!("attempt {}", i))]);
    }

    // Deliveries overlap, so the backend may see them in any order
    let mut received = Vec::new();
    for _ in 0..3 {
        let record = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        received.push(record.message);
    }
    received.sort();
    assert_eq!(received, ["attempt 0", "attempt 1", "attempt 2"]);
}

#[tokio::test]
async fn test_request_timeout_is_enforced() {
    let app = Router::new().route(
        "/log",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(3)).await;
            StatusCode::OK
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    let sink = HttpSink::new(format!("http://{}/log", addr), Duration::from_millis(200)).unwrap();
    let result = timeout(
        Duration::from_secs(1),
        sink.forward(LogRecord::new(LogLevel::Info, "slow backend")),
    )
    .await
    .expect("the configured timeout should fire first");

    assert!(matches!(result, Err(SinkError::Transport(e)) if e.is_timeout()));
}
