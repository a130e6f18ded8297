#![allow(dead_code)]
//! Shared harness for the integration tests: an in-memory transport, a
//! recording cache collaborator and a few polling helpers.

use async_trait::async_trait;
use campus_link::{
    AuthProvider, CampusLinkError, ConnectionOptions, DisconnectReason, QueryInvalidator,
    QueryKey, RealtimeConfig, RealtimeContext, Result, Transport, TransportFrame,
    TransportStream,
};
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ── MockTransport ─────────────────────────────────────────────────────────────

/// One stream opened through the [`MockTransport`].
#[derive(Clone)]
pub struct MockConnection {
    pub auth: AuthProvider,
    sent: Arc<Mutex<Vec<String>>>,
    inbound: mpsc::UnboundedSender<TransportFrame>,
}

impl MockConnection {
    /// Raw frames the client sent on this stream.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    /// Sent frames parsed as JSON.
    pub fn sent_json(&self) -> Vec<JsonValue> {
        self.sent()
            .iter()
            .map(|raw| serde_json::from_str(raw).unwrap())
            .collect()
    }

    /// Names (`event` field) of the sent frames, in order.
    pub fn sent_names(&self) -> Vec<String> {
        self.sent_json()
            .iter()
            .map(|v| v["event"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    /// Deliver a named server event.
    pub fn push_event(&self, name: &str, data: JsonValue) {
        let frame = json!({ "event": name, "data": data }).to_string();
        let _ = self.inbound.send(TransportFrame::Text(frame));
    }

    pub fn push_raw(&self, text: &str) {
        let _ = self.inbound.send(TransportFrame::Text(text.to_string()));
    }

    /// Simulate the server dropping the stream.
    pub fn drop_stream(&self, reason: &str) {
        let _ = self
            .inbound
            .send(TransportFrame::Close(DisconnectReason::new(reason)));
    }
}

struct MockStream {
    sent: Arc<Mutex<Vec<String>>>,
    send_failure: Arc<Mutex<Option<String>>>,
    inbound: mpsc::UnboundedReceiver<TransportFrame>,
}

#[async_trait]
impl TransportStream for MockStream {
    async fn send_text(&mut self, text: String) -> Result<()> {
        if let Some(message) = self.send_failure.lock().unwrap().clone() {
            return Err(CampusLinkError::WebSocketError(message));
        }
        self.sent.lock().unwrap().push(text);
        Ok(())
    }

    async fn ping(&mut self) -> Result<()> {
        Ok(())
    }

    async fn next_frame(&mut self) -> Result<TransportFrame> {
        match self.inbound.recv().await {
            Some(frame) => Ok(frame),
            None => Ok(TransportFrame::Close(DisconnectReason::new("mock closed"))),
        }
    }

    async fn close(&mut self) {
        self.inbound.close();
    }
}

/// In-memory transport: every successful `open` yields a [`MockConnection`]
/// the test can inspect and feed.
#[derive(Default)]
pub struct MockTransport {
    failure: Mutex<Option<String>>,
    send_failure: Arc<Mutex<Option<String>>>,
    opens: AtomicUsize,
    connections: Mutex<Vec<MockConnection>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every following `open` fail with `message` (or succeed with `None`).
    pub fn fail_opens(&self, message: Option<&str>) {
        *self.failure.lock().unwrap() = message.map(str::to_string);
    }

    /// Make every following send, on open and future streams, fail with
    /// `message` (or succeed with `None`). Failed sends are not recorded.
    pub fn fail_sends(&self, message: Option<&str>) {
        *self.send_failure.lock().unwrap() = message.map(str::to_string);
    }

    /// Number of `open` calls, failed ones included.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn connections(&self) -> Vec<MockConnection> {
        self.connections.lock().unwrap().clone()
    }

    pub fn latest(&self) -> Option<MockConnection> {
        self.connections.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self, _url: &str, auth: &AuthProvider) -> Result<Box<dyn TransportStream>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.failure.lock().unwrap().clone() {
            return Err(CampusLinkError::WebSocketError(message));
        }

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let sent = Arc::new(Mutex::new(Vec::new()));
        self.connections.lock().unwrap().push(MockConnection {
            auth: auth.clone(),
            sent: Arc::clone(&sent),
            inbound: inbound_tx,
        });
        Ok(Box::new(MockStream {
            sent,
            send_failure: Arc::clone(&self.send_failure),
            inbound: inbound_rx,
        }))
    }
}

// ── Recording cache collaborator ─────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingInvalidator {
    calls: Mutex<HashMap<QueryKey, usize>>,
}

impl RecordingInvalidator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn count(&self, key: &QueryKey) -> usize {
        self.calls.lock().unwrap().get(key).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

impl QueryInvalidator for RecordingInvalidator {
    fn invalidate(&self, key: &QueryKey) {
        *self.calls.lock().unwrap().entry(key.clone()).or_insert(0) += 1;
    }
}

// ── Context helpers ──────────────────────────────────────────────────────────

/// Config with fast reconnects and no keepalive, so tests do not wait on
/// production delays.
pub fn test_config() -> RealtimeConfig {
    let mut config = RealtimeConfig::default();
    config.connection = ConnectionOptions::new()
        .with_reconnect_delay_ms(10)
        .with_max_reconnect_delay_ms(50)
        .with_connection_timeout_ms(1_000)
        .with_ping_interval_ms(0)
        .with_pong_timeout_ms(0);
    config
}

pub fn context_with(
    config: RealtimeConfig,
    transport: &Arc<MockTransport>,
    invalidator: &Arc<RecordingInvalidator>,
) -> RealtimeContext {
    init_logging();
    let transport: Arc<dyn Transport> = transport.clone();
    let invalidator: Arc<dyn QueryInvalidator> = invalidator.clone();
    RealtimeContext::builder()
        .config(config)
        .transport(transport)
        .shared_invalidator(invalidator)
        .build()
        .unwrap()
}

pub fn context(
    transport: &Arc<MockTransport>,
    invalidator: &Arc<RecordingInvalidator>,
) -> RealtimeContext {
    context_with(test_config(), transport, invalidator)
}

/// A `table_change` payload for `table` with the given event id.
pub fn table_change(id: &str, table: &str) -> JsonValue {
    json!({
        "id": id,
        "type": "table_change",
        "table": table,
        "operation": "UPDATE",
        "data": { "id": 1 },
        "timestamp": 1_700_000_000_000u64,
    })
}

/// Poll `condition` every 5ms until it holds or `within` elapses.
pub async fn wait_until(within: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Wait until the transport has produced `n` connections and return the last.
pub async fn wait_for_connection(transport: &MockTransport, n: usize) -> MockConnection {
    assert!(
        wait_until(Duration::from_secs(5), || transport.connections().len() >= n).await,
        "expected {} connection(s), saw {}",
        n,
        transport.connections().len()
    );
    transport.connections()[n - 1].clone()
}
