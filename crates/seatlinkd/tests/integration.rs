//! Integration tests for seatlinkd
//!
//! These tests run a real service on a temporary socket and talk to it
//! through the IPC client.

use seatlink_api::{Command, ErrorCode, EventPayload, ResponsePayload, ResponseResult};
use seatlink_config::DaemonConfig;
use seatlink_conn::CONNECTION_BUFFER_SIZE;
use seatlink_ipc::{EventStream, IpcClient, IpcError};
use seatlinkd::Service;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

struct TestDaemon {
    _dir: TempDir,
    socket_path: PathBuf,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl TestDaemon {
    async fn start(configure: impl FnOnce(&mut DaemonConfig)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = DaemonConfig {
            socket_path: dir.path().join("seatlink.sock"),
            ..Default::default()
        };
        configure(&mut config);

        let service = Service::new(config).await.unwrap();
        let socket_path = service.socket_path().to_path_buf();
        let (tx, rx) = oneshot::channel();
        let handle = tokio::spawn(service.run(async {
            let _ = rx.await;
        }));

        Self {
            _dir: dir,
            socket_path,
            shutdown: Some(tx),
            handle,
        }
    }

    async fn client(&self) -> IpcClient {
        IpcClient::connect(&self.socket_path).await.unwrap()
    }

    async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.handle.await.unwrap().unwrap();
    }
}

fn ok_payload(result: ResponseResult) -> ResponsePayload {
    match result {
        ResponseResult::Ok(payload) => payload,
        ResponseResult::Err(e) => panic!("unexpected error response: {:?}", e),
    }
}

#[tokio::test]
async fn test_ping_pong() {
    let daemon = TestDaemon::start(|_| {}).await;
    let mut client = daemon.client().await;

    let response = client.send(Command::Ping).await.unwrap();
    assert_eq!(response.request_id, 1);
    assert_eq!(ok_payload(response.result), ResponsePayload::Pong);

    daemon.stop().await;
}

#[tokio::test]
async fn test_echo_round_trip() {
    let daemon = TestDaemon::start(|_| {}).await;
    let mut client = daemon.client().await;

    for data in ["a", "hello seatlink", "ünïcödé"] {
        let response = client
            .send(Command::Echo { data: data.into() })
            .await
            .unwrap();
        assert_eq!(
            ok_payload(response.result),
            ResponsePayload::Echo { data: data.into() }
        );
    }

    daemon.stop().await;
}

#[tokio::test]
async fn test_status_reports_clients_and_buffer() {
    let daemon = TestDaemon::start(|c| c.buffer_size = 1024).await;
    let mut first = IpcClient::connect_with_capacity(&daemon.socket_path, 1024)
        .await
        .unwrap();
    let mut second = IpcClient::connect_with_capacity(&daemon.socket_path, 1024)
        .await
        .unwrap();
    second.send(Command::Ping).await.unwrap();

    let response = first.send(Command::GetStatus).await.unwrap();
    match ok_payload(response.result) {
        ResponsePayload::Status(status) => {
            assert_eq!(status.client_count, 2);
            assert_eq!(status.buffer_size, 1024);
        }
        other => panic!("unexpected payload: {:?}", other),
    }

    daemon.stop().await;
}

#[tokio::test]
async fn test_oversized_echo_gets_error_response() {
    let daemon = TestDaemon::start(|_| {}).await;
    let mut client = daemon.client().await;

    // The request fits in the buffer, the echoed response does not
    let data = "x".repeat(CONNECTION_BUFFER_SIZE - 75);
    let response = client.send(Command::Echo { data }).await.unwrap();
    match response.result {
        ResponseResult::Err(e) => assert_eq!(e.code, ErrorCode::InvalidRequest),
        ResponseResult::Ok(p) => panic!("expected error, got {:?}", p),
    }

    // The connection is still usable
    assert!(client.send(Command::Ping).await.unwrap().is_ok());

    daemon.stop().await;
}

#[tokio::test]
async fn test_request_larger_than_buffer_is_refused_locally() {
    let daemon = TestDaemon::start(|_| {}).await;
    let mut client = daemon.client().await;

    let data = "x".repeat(CONNECTION_BUFFER_SIZE);
    let err = client.send(Command::Echo { data }).await.unwrap_err();
    assert!(matches!(err, IpcError::FrameTooLarge { .. }));

    assert!(client.send(Command::Ping).await.unwrap().is_ok());

    daemon.stop().await;
}

#[tokio::test]
async fn test_rate_limiting() {
    let daemon = TestDaemon::start(|c| c.rate_limit_per_second = 2).await;
    let mut client = daemon.client().await;

    assert!(client.send(Command::Ping).await.unwrap().is_ok());
    assert!(client.send(Command::Ping).await.unwrap().is_ok());

    let response = client.send(Command::Ping).await.unwrap();
    match response.result {
        ResponseResult::Err(e) => assert_eq!(e.code, ErrorCode::RateLimited),
        ResponseResult::Ok(p) => panic!("expected rate limit, got {:?}", p),
    }

    daemon.stop().await;
}

async fn next_event(events: &mut EventStream) -> EventPayload {
    tokio::time::timeout(Duration::from_secs(5), events.next())
        .await
        .expect("timed out waiting for event")
        .unwrap()
        .payload
}

#[tokio::test]
async fn test_subscriber_sees_other_clients() {
    let daemon = TestDaemon::start(|_| {}).await;
    let mut events = daemon.client().await.subscribe().await.unwrap();

    let mut other = daemon.client().await;
    other.send(Command::Ping).await.unwrap();
    drop(other);

    // The subscriber may also see its own connection announced
    let mut connected = 0;
    loop {
        match next_event(&mut events).await {
            EventPayload::ClientConnected { .. } => connected += 1,
            EventPayload::ClientDisconnected { .. } => break,
            EventPayload::Shutdown => panic!("unexpected shutdown"),
        }
    }
    assert!(connected >= 1);

    daemon.stop().await;
}

#[tokio::test]
async fn test_shutdown_notifies_subscribers_and_removes_socket() {
    let daemon = TestDaemon::start(|_| {}).await;
    let socket_path = daemon.socket_path.clone();
    let mut events = daemon.client().await.subscribe().await.unwrap();

    daemon.stop().await;

    while next_event(&mut events).await != EventPayload::Shutdown {}
    assert!(!socket_path.exists());
}

#[tokio::test]
async fn test_connections_beyond_limit_are_refused() {
    let daemon = TestDaemon::start(|c| c.max_clients = 1).await;
    let mut first = daemon.client().await;
    assert!(first.send(Command::Ping).await.unwrap().is_ok());

    let mut second = daemon.client().await;
    let result = tokio::time::timeout(Duration::from_secs(5), second.send(Command::Ping))
        .await
        .unwrap();
    assert!(result.is_err());

    assert!(first.send(Command::Ping).await.unwrap().is_ok());

    daemon.stop().await;
}

#[tokio::test]
async fn test_peer_announcing_oversized_frame_is_dropped() {
    let daemon = TestDaemon::start(|_| {}).await;
    let socket_path = daemon.socket_path.clone();

    let closed = tokio::task::spawn_blocking(move || {
        let mut raw = std::os::unix::net::UnixStream::connect(&socket_path).unwrap();
        raw.set_read_timeout(Some(Duration::from_secs(5))).unwrap();

        let mut header = seatlink_api::OP_REQUEST.to_ne_bytes().to_vec();
        header.extend_from_slice(&u16::MAX.to_ne_bytes());
        raw.write_all(&header).unwrap();

        let mut buf = [0u8; 16];
        raw.read(&mut buf).unwrap() == 0
    })
    .await
    .unwrap();

    assert!(closed);

    daemon.stop().await;
}
