use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use threadline_connection::{
    ClientFrame, CloseCode, ConnectParams, ConnectionError, ConnectionEvent, ConnectionManager,
    ConnectionState, MemoryServer, MemoryTransport,
};
use threadline_types::token::unsigned_token;
use threadline_types::{ConnectionConfig, InboundEvent, OutboundMessage};
use tokio::sync::mpsc::UnboundedReceiver;

fn params() -> ConnectParams {
    ConnectParams::new("thread-1", "user-1", "token-abc")
}

fn setup() -> (
    MemoryTransport,
    MemoryServer,
    ConnectionManager,
    UnboundedReceiver<ConnectionEvent>,
) {
    let (transport, server) = MemoryTransport::new();
    let (manager, events) = ConnectionManager::spawn(
        Arc::new(transport.clone()),
        &ConnectionConfig::default(),
        params(),
    )
    .unwrap();
    (transport, server, manager, events)
}

async fn next_event(events: &mut UnboundedReceiver<ConnectionEvent>) -> ConnectionEvent {
    events.recv().await.expect("event channel closed")
}

#[tokio::test]
async fn test_connect_passes_credentials_in_url() {
    let (_transport, mut server, manager, mut events) = setup();

    manager.connect().unwrap();
    let conn = server.accept().await.unwrap();

    assert_eq!(next_event(&mut events).await, ConnectionEvent::Connected);
    assert_eq!(conn.url().path(), "/ws/chat/thread-1");
    assert_eq!(conn.query("token").as_deref(), Some("token-abc"));
    assert_eq!(conn.query("user_id").as_deref(), Some("user-1"));
    assert!(manager.state().is_open());
}

#[tokio::test]
async fn test_connect_refuses_missing_or_expired_token() {
    let (transport, _server) = MemoryTransport::new();
    let transport = Arc::new(transport);
    let config = ConnectionConfig::default();

    let (manager, _events) =
        ConnectionManager::spawn(transport.clone(), &config, ConnectParams::new("t", "u", "")).unwrap();
    assert!(matches!(manager.connect(), Err(ConnectionError::AuthRequired(_))));

    let expired = unsigned_token("u", Utc::now() - ChronoDuration::minutes(1));
    let (manager, _events) =
        ConnectionManager::spawn(transport.clone(), &config, ConnectParams::new("t", "u", expired)).unwrap();
    assert!(matches!(manager.connect(), Err(ConnectionError::AuthRequired(_))));

    assert_eq!(transport.open_attempts(), 0);
}

#[tokio::test]
async fn test_send_requires_open_connection() {
    let (_transport, mut server, manager, mut events) = setup();
    let message = OutboundMessage::text("thread-1", "user-1", "hello");

    assert_eq!(manager.send(&message).await, Err(ConnectionError::NotConnected));

    manager.connect().unwrap();
    let mut conn = server.accept().await.unwrap();
    assert_eq!(next_event(&mut events).await, ConnectionEvent::Connected);

    manager.send(&message).await.unwrap();
    let received = conn.recv_message().await.unwrap();
    assert_eq!(received, message);
}

#[tokio::test]
async fn test_inbound_events_and_malformed_frames() {
    let (_transport, mut server, manager, mut events) = setup();
    manager.connect().unwrap();
    let conn = server.accept().await.unwrap();
    assert_eq!(next_event(&mut events).await, ConnectionEvent::Connected);

    conn.push_raw("{not json");
    conn.push_raw(r#"{"type":"mystery"}"#);
    conn.push(&InboundEvent::Stream { content: "Hel".to_string() });

    // Bad frames are dropped; the connection stays up
    assert_eq!(
        next_event(&mut events).await,
        ConnectionEvent::Inbound(InboundEvent::Stream { content: "Hel".to_string() })
    );
    assert!(manager.state().is_open());
}

#[tokio::test(start_paused = true)]
async fn test_abnormal_close_retries_three_times_then_fails() {
    let (transport, mut server, manager, mut events) = setup();
    manager.connect().unwrap();
    let conn = server.accept().await.unwrap();
    assert_eq!(next_event(&mut events).await, ConnectionEvent::Connected);

    transport.refuse_next(10);
    conn.close(CloseCode::ABNORMAL);

    assert_eq!(
        next_event(&mut events).await,
        ConnectionEvent::Disconnected { code: CloseCode::ABNORMAL }
    );
    for (attempt, secs) in [(1, 1), (2, 2), (3, 4)] {
        assert_eq!(
            next_event(&mut events).await,
            ConnectionEvent::Reconnecting {
                attempt,
                delay: Duration::from_secs(secs)
            }
        );
    }
    assert_eq!(next_event(&mut events).await, ConnectionEvent::Failed { attempts: 4 });
    assert_eq!(manager.state(), ConnectionState::Failed);

    // Initial open plus exactly three reconnects
    assert_eq!(transport.open_attempts(), 4);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(transport.open_attempts(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_manual_connect_after_failure_starts_fresh() {
    let (transport, mut server, manager, mut events) = setup();
    transport.refuse_next(4);
    manager.connect().unwrap();

    loop {
        if let ConnectionEvent::Failed { .. } = next_event(&mut events).await {
            break;
        }
    }

    manager.connect().unwrap();
    let _conn = server.accept().await.unwrap();
    assert_eq!(next_event(&mut events).await, ConnectionEvent::Connected);
    assert_eq!(transport.open_attempts(), 5);
}

#[tokio::test]
async fn test_terminal_close_codes_do_not_reconnect() {
    for code in [CloseCode::NORMAL, CloseCode::AUTH_REJECTED] {
        let (transport, mut server, manager, mut events) = setup();
        manager.connect().unwrap();
        let conn = server.accept().await.unwrap();
        assert_eq!(next_event(&mut events).await, ConnectionEvent::Connected);

        conn.close(code);
        assert_eq!(next_event(&mut events).await, ConnectionEvent::Disconnected { code });
        assert_eq!(manager.state(), ConnectionState::Idle);
        assert_eq!(transport.open_attempts(), 1);
    }
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_succeeds_after_transient_drop() {
    let (transport, mut server, manager, mut events) = setup();
    manager.connect().unwrap();
    let first = server.accept().await.unwrap();
    assert_eq!(next_event(&mut events).await, ConnectionEvent::Connected);

    drop(first);
    assert_eq!(
        next_event(&mut events).await,
        ConnectionEvent::Disconnected { code: CloseCode::ABNORMAL }
    );
    assert!(matches!(
        next_event(&mut events).await,
        ConnectionEvent::Reconnecting { attempt: 1, .. }
    ));

    let _second = server.accept().await.unwrap();
    assert_eq!(next_event(&mut events).await, ConnectionEvent::Connected);
    assert_eq!(transport.open_attempts(), 2);
}

#[tokio::test]
async fn test_shutdown_closes_with_normal_code() {
    let (_transport, mut server, manager, mut events) = setup();
    manager.connect().unwrap();
    let mut conn = server.accept().await.unwrap();
    assert_eq!(next_event(&mut events).await, ConnectionEvent::Connected);

    manager.shutdown().await;
    assert_eq!(conn.recv().await, Some(ClientFrame::Close(CloseCode::NORMAL)));
}

#[tokio::test]
async fn test_token_expiring_while_open_stops_reconnects() {
    let (transport, mut server) = MemoryTransport::new();
    let config = ConnectionConfig::default().with_backoff(
        Duration::from_millis(10),
        2,
        Duration::from_millis(100),
    );
    let token = unsigned_token("user-1", Utc::now() + ChronoDuration::seconds(2));
    let (manager, mut events) = ConnectionManager::spawn(
        Arc::new(transport.clone()),
        &config,
        ConnectParams::new("thread-1", "user-1", token),
    )
    .unwrap();

    manager.connect().unwrap();
    let conn = server.accept().await.unwrap();
    assert_eq!(next_event(&mut events).await, ConnectionEvent::Connected);

    // Let the token lapse while the link is up
    tokio::time::sleep(Duration::from_millis(2_100)).await;
    conn.close(CloseCode::ABNORMAL);

    assert_eq!(
        next_event(&mut events).await,
        ConnectionEvent::Disconnected { code: CloseCode::ABNORMAL }
    );
    assert!(matches!(
        next_event(&mut events).await,
        ConnectionEvent::Reconnecting { attempt: 1, .. }
    ));
    assert_eq!(next_event(&mut events).await, ConnectionEvent::AuthExpired);
    assert_eq!(manager.state(), ConnectionState::Idle);
    assert_eq!(transport.open_attempts(), 1);

    assert!(matches!(manager.connect(), Err(ConnectionError::AuthRequired(_))));
}
