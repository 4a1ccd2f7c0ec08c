use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use relay_bridge::{Bridge, BridgeError, BridgeEvent, BridgeOptions, ConnectionState};
use relay_core::types::{CliKind, ProjectConfig};
use relay_protocol::codec::encode;
use relay_protocol::envelope::{Envelope, EnvelopeBody, WelcomePayload};
use relay_protocol::FrameParser;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};

fn project(id: &str, root: &std::path::Path, socket_path: std::path::PathBuf) -> ProjectConfig {
    ProjectConfig {
        id: id.to_string(),
        project_root: root.to_path_buf(),
        socket_path,
        lead_name: format!("{id}-lead"),
        cli_kind: CliKind::Claude,
    }
}

async fn read_until_hello(stream: &mut UnixStream, parser: &mut FrameParser) {
    let mut buf = [0u8; 4096];
    loop {
        let n = stream.read(&mut buf).await.unwrap_or(0);
        if n == 0 {
            return;
        }
        if parser
            .push_bytes(&buf[..n])
            .iter()
            .any(|e| matches!(e.body, EnvelopeBody::Hello(_)))
        {
            return;
        }
    }
}

async fn send_welcome(stream: &mut UnixStream) {
    let welcome = Envelope::new(0, EnvelopeBody::Welcome(WelcomePayload::default()));
    let bytes = encode(&welcome).unwrap();
    stream.write_all(&bytes).await.unwrap();
}

/// Daemon double: handshakes then keeps the connection open, echoing nothing.
async fn serve_and_hold(mut stream: UnixStream) {
    let mut parser = FrameParser::new();
    read_until_hello(&mut stream, &mut parser).await;
    send_welcome(&mut stream).await;
    let mut buf = [0u8; 4096];
    loop {
        let n = stream.read(&mut buf).await.unwrap_or(0);
        if n == 0 {
            return;
        }
        let _ = parser.push_bytes(&buf[..n]);
    }
}

/// Daemon double: handshakes, then immediately drops the connection.
async fn serve_then_close(mut stream: UnixStream) {
    let mut parser = FrameParser::new();
    read_until_hello(&mut stream, &mut parser).await;
    send_welcome(&mut stream).await;
}

#[tokio::test]
async fn happy_handshake_and_disconnect() {
    let dir = tempfile::tempdir().unwrap();
    let socket_path = dir.path().join("a.sock");
    let listener = UnixListener::bind(&socket_path).unwrap();
    tokio::spawn(async move {
        if let Ok((stream, _)) = listener.accept().await {
            serve_and_hold(stream).await;
        }
    });

    let (bridge, mut events) = Bridge::new(BridgeOptions::default());
    bridge
        .connect(vec![project("A", dir.path(), socket_path)])
        .await
        .expect("connect succeeds");

    assert_eq!(bridge.get_connected_projects().await, vec!["A".to_string()]);

    let ev = events.recv().await.expect("state-changed event");
    assert!(matches!(
        ev,
        BridgeEvent::StateChanged { project_id, connected: true } if project_id == "A"
    ));

    bridge.disconnect().await;
    assert!(bridge.get_connected_projects().await.is_empty());

    // idempotent: a second disconnect is a no-op, not a panic or duplicate BYE.
    bridge.disconnect().await;
    assert!(bridge.get_connected_projects().await.is_empty());
}

#[tokio::test]
async fn missing_daemon_socket_fails_connect() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.sock");

    let (bridge, _events) = Bridge::new(BridgeOptions::default());
    let err = bridge
        .connect(vec![project("X", dir.path(), missing)])
        .await
        .expect_err("connect should fail for a missing socket");
    assert!(matches!(err, BridgeError::SocketMissing { .. }));
}

#[tokio::test(start_paused = true)]
async fn handshake_timeout_without_welcome() {
    let dir = tempfile::tempdir().unwrap();
    let socket_path = dir.path().join("b.sock");
    let listener = UnixListener::bind(&socket_path).unwrap();
    tokio::spawn(async move {
        if let Ok((stream, _)) = listener.accept().await {
            // Accept but never reply — the bridge's handshake deadline should fire.
            let _stream = stream;
            std::future::pending::<()>().await
        }
    });

    let (bridge, _events) = Bridge::new(BridgeOptions::default());
    let err = bridge
        .connect(vec![project("B", dir.path(), socket_path)])
        .await
        .expect_err("connect should time out");
    assert!(matches!(err, BridgeError::ConnectionTimeout { .. }));
}

#[tokio::test(start_paused = true)]
async fn post_ready_drop_schedules_reconnect() {
    let dir = tempfile::tempdir().unwrap();
    let socket_path = dir.path().join("c.sock");
    let listener = UnixListener::bind(&socket_path).unwrap();
    tokio::spawn(async move {
        if let Ok((stream, _)) = listener.accept().await {
            serve_then_close(stream).await;
        }
    });

    let (bridge, mut events) = Bridge::new(BridgeOptions::default());
    bridge
        .connect(vec![project("C", dir.path(), socket_path)])
        .await
        .expect("connect succeeds");

    loop {
        if let BridgeEvent::StateChanged { connected: false, .. } = events.recv().await.unwrap() {
            break;
        }
    }

    let mut state = bridge.connection_state("C").await;
    for _ in 0..50 {
        if matches!(state, Some(ConnectionState::Reconnecting) | Some(ConnectionState::Connecting)) {
            break;
        }
        tokio::task::yield_now().await;
        state = bridge.connection_state("C").await;
    }
    assert!(
        matches!(state, Some(ConnectionState::Reconnecting) | Some(ConnectionState::Connecting)),
        "expected a reconnect to have been scheduled, got {state:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn max_reconnect_attempts_is_enforced_across_repeated_failures() {
    let dir = tempfile::tempdir().unwrap();
    let socket_path = dir.path().join("f.sock");
    let listener = UnixListener::bind(&socket_path).unwrap();

    let accept_count = Arc::new(AtomicUsize::new(0));
    let accept_count_srv = accept_count.clone();
    tokio::spawn(async move {
        loop {
            if let Ok((stream, _)) = listener.accept().await {
                accept_count_srv.fetch_add(1, Ordering::SeqCst);
                serve_then_close(stream).await;
            } else {
                return;
            }
        }
    });

    let options = BridgeOptions {
        reconnect: true,
        reconnect_delay_ms: 10,
        max_reconnect_delay_ms: 100,
        max_reconnect_attempts: Some(1),
        ..BridgeOptions::default()
    };
    let (bridge, mut events) = Bridge::new(options);
    bridge
        .connect(vec![project("F", dir.path(), socket_path)])
        .await
        .expect("connect succeeds");

    // Drain state-change events: initial connect, each drop, each reconnect.
    // With max_reconnect_attempts = 1 there is exactly one retry permitted
    // after the first post-Ready close, so the connection opens at most
    // twice in total (the original connection plus one reconnect).
    for _ in 0..20 {
        tokio::time::advance(Duration::from_millis(50)).await;
        tokio::task::yield_now().await;
        while events.try_recv().is_ok() {}
    }

    assert_eq!(
        accept_count.load(Ordering::SeqCst),
        2,
        "expected exactly one retry beyond the initial connection, got {} total connections",
        accept_count.load(Ordering::SeqCst)
    );
}

#[tokio::test]
async fn send_to_unready_project_returns_false() {
    let dir = tempfile::tempdir().unwrap();
    let socket_path = dir.path().join("d.sock");
    // No listener bound at all — connect() will fail, no connection ever becomes ready.
    let (bridge, _events) = Bridge::new(BridgeOptions::default());
    let _ = bridge
        .connect(vec![project("D", dir.path(), socket_path)])
        .await;
    assert!(!bridge.send_to_project("D", "lead", "hi").await);
    assert!(!bridge.send_to_project("unknown", "lead", "hi").await);
}

#[tokio::test]
async fn lead_alias_falls_back_to_configured_lead_name() {
    let dir = tempfile::tempdir().unwrap();
    let socket_path = dir.path().join("e.sock");
    let listener = UnixListener::bind(&socket_path).unwrap();
    tokio::spawn(async move {
        if let Ok((stream, _)) = listener.accept().await {
            serve_and_hold(stream).await;
        }
    });

    let (bridge, _events) = Bridge::new(BridgeOptions::default());
    bridge
        .connect(vec![project("E", dir.path(), socket_path)])
        .await
        .unwrap();

    // No explicit registerLead call: falls back to the configured lead name.
    assert!(bridge.send_to_project("E", "lead", "hi").await);
    bridge.disconnect().await;
}
