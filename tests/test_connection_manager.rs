//! Integration tests for `ConnectionManager`: singleton reuse, the attempt
//! counter, token pickup on reconnect, stream loss and one-shot shutdown.

use campus_link::{
    AuthProvider, CampusLinkError, ClientMessage, ConnectionEvent, EventHandlers,
    MemoryTokenStore, QueryInvalidator, RealtimeContext, TokenStore, Transport,
};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

mod common;
use common::{context, test_config, wait_for_connection, wait_until, MockTransport, RecordingInvalidator};

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_connection_is_shared_and_reused() {
    let transport = MockTransport::new();
    let ctx = context(&transport, &RecordingInvalidator::new());
    let manager = ctx.connection_manager();

    let first = manager.get_or_create_connection().await.unwrap();
    let second = manager.get_or_create_connection().await.unwrap();
    assert!(Arc::ptr_eq(&first, &second), "reused while connecting");

    assert!(wait_until(WAIT, || first.is_connected()).await);
    let third = manager.get_or_create_connection().await.unwrap();
    assert!(Arc::ptr_eq(&first, &third));
    assert_eq!(transport.open_count(), 1);
    assert_eq!(first.url(), "ws://localhost:3000/realtime");
}

#[tokio::test]
async fn test_attempt_counter_caps_and_resets() {
    let transport = MockTransport::new();
    transport.fail_opens(Some("connection refused"));
    let ctx = context(&transport, &RecordingInvalidator::new());
    let manager = ctx.connection_manager();

    let conn = manager.get_or_create_connection().await.unwrap();
    assert!(wait_until(WAIT, || !conn.is_active()).await);
    assert_eq!(manager.connect_attempts(), 5);
    assert_eq!(transport.open_count(), 5);
    assert!(ctx.health().should_use_fallback());

    // A second exhausted connection keeps the counter at its cap.
    let retry = manager.get_or_create_connection().await.unwrap();
    assert!(!Arc::ptr_eq(&conn, &retry), "gave-up connection replaced");
    assert!(wait_until(WAIT, || !retry.is_active()).await);
    assert_eq!(manager.connect_attempts(), 5);
    assert_eq!(transport.open_count(), 10);

    let result = retry.emit(ClientMessage::Subscribe { channel: "x".into() }).await;
    assert!(matches!(result, Err(CampusLinkError::NotConnected(_))));

    transport.fail_opens(None);
    let conn = manager.reconnect().await.unwrap();
    assert!(wait_until(WAIT, || conn.is_connected()).await);
    assert_eq!(manager.connect_attempts(), 0);
    assert!(!ctx.health().should_use_fallback());
}

#[tokio::test]
async fn test_reconnect_reads_current_token() {
    let transport = MockTransport::new();
    let tokens = Arc::new(MemoryTokenStore::new(None));
    let store: Arc<dyn TokenStore> = tokens.clone();
    let dyn_transport: Arc<dyn Transport> = transport.clone();
    let invalidator: Arc<dyn QueryInvalidator> = RecordingInvalidator::new();
    let ctx = RealtimeContext::builder()
        .config(test_config())
        .transport(dyn_transport)
        .shared_token_store(store)
        .shared_invalidator(invalidator)
        .build()
        .unwrap();
    let manager = ctx.connection_manager();

    manager.get_or_create_connection().await.unwrap();
    let first = wait_for_connection(&transport, 1).await;
    assert_eq!(first.auth, AuthProvider::None);

    tokens.set_token(Some("fresh-token".to_string()));
    let conn = manager.reconnect().await.unwrap();
    let second = wait_for_connection(&transport, 2).await;
    assert_eq!(second.auth, AuthProvider::jwt_token("fresh-token".to_string()));
    assert!(wait_until(WAIT, || conn.is_connected()).await);
}

#[tokio::test]
async fn test_stream_loss_triggers_reconnect() {
    let transport = MockTransport::new();
    let reconnects = Arc::new(AtomicU32::new(0));
    let r = reconnects.clone();
    let dyn_transport: Arc<dyn Transport> = transport.clone();
    let ctx = RealtimeContext::builder()
        .config(test_config())
        .transport(dyn_transport)
        .event_handlers(EventHandlers::new().on_reconnect(move |attempt| {
            r.store(attempt, Ordering::SeqCst);
        }))
        .build()
        .unwrap();

    let conn = ctx.connection_manager().get_or_create_connection().await.unwrap();
    let mut events = conn.events();
    let first = wait_for_connection(&transport, 1).await;
    assert!(wait_until(WAIT, || conn.is_connected()).await);

    first.drop_stream("server restarting");
    wait_for_connection(&transport, 2).await;
    assert!(wait_until(WAIT, || reconnects.load(Ordering::SeqCst) == 1).await);
    assert!(conn.is_connected());

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert!(seen
        .iter()
        .any(|e| matches!(e, ConnectionEvent::Disconnected(reason) if reason.message == "server restarting")));
    assert!(seen
        .iter()
        .any(|e| matches!(e, ConnectionEvent::Reconnected { attempt: 1 })));
}

#[tokio::test]
async fn test_shutdown_closes_exactly_once() {
    let transport = MockTransport::new();
    let disconnects = Arc::new(AtomicUsize::new(0));
    let d = disconnects.clone();
    let dyn_transport: Arc<dyn Transport> = transport.clone();
    let ctx = RealtimeContext::builder()
        .config(test_config())
        .transport(dyn_transport)
        .event_handlers(EventHandlers::new().on_disconnect(move |_| {
            d.fetch_add(1, Ordering::SeqCst);
        }))
        .build()
        .unwrap();
    ctx.start();
    ctx.start();

    let manager = ctx.connection_manager();
    let conn = manager.get_or_create_connection().await.unwrap();
    assert!(wait_until(WAIT, || conn.is_connected()).await);

    assert!(manager.shutdown().await);
    assert!(!manager.shutdown().await);
    conn.close().await;

    assert!(!conn.is_connected());
    assert!(!conn.is_active());
    assert!(conn.is_closed());
    assert_eq!(disconnects.load(Ordering::SeqCst), 1);
    assert!(manager.current().await.is_none());
    assert!(matches!(
        manager.get_or_create_connection().await,
        Err(CampusLinkError::ConnectionClosed)
    ));
}
