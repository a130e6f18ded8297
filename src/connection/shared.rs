//! Shared realtime connection.
//!
//! One connection is multiplexed across every binder in the process. It
//! handles:
//!
//! - Connecting in the background (callers never block on the socket)
//! - Automatic reconnection with a linear-capped delay and an attempt budget
//! - Per-attempt timeouts
//! - Keepalive pings with pong timeout
//! - Fan-out of lifecycle changes and inbound events over a broadcast channel

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant as TokioInstant;

use super::transport::{Transport, TransportFrame, TransportStream};
use super::{CONNECTION_EVENT_CAPACITY, FAR_FUTURE};
use crate::auth::AuthProvider;
use crate::error::{CampusLinkError, Result};
use crate::event_handlers::{ConnectionError, DisconnectReason, EventHandlers};
use crate::models::{parse_frame, ChannelEvent, ClientMessage, ConnectionOptions};

/// Lifecycle changes and inbound events published by a [`SharedConnection`].
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// The stream is open (first connect or any reconnect).
    Connected,
    /// The stream was lost, or the connection gave up reconnecting.
    Disconnected(DisconnectReason),
    /// A connection attempt failed.
    ConnectError(ConnectionError),
    /// Follows `Connected` when the stream was re-established after a loss;
    /// carries the attempt number that succeeded.
    Reconnected { attempt: u32 },
    /// A named event from the server.
    Event(ChannelEvent),
    /// The connection was closed by the client; it will not reconnect.
    Closed,
}

// ── Commands ────────────────────────────────────────────────────────────────

enum ConnCmd {
    Emit {
        message: ClientMessage,
        result_tx: oneshot::Sender<Result<()>>,
    },
    Shutdown {
        done: Option<oneshot::Sender<()>>,
    },
}

// ── SharedConnection (public handle) ────────────────────────────────────────

/// Handle to the process-wide realtime connection.
///
/// Created through [`ConnectionManager`](crate::ConnectionManager); cloned
/// into binders as `Arc<SharedConnection>`.
pub struct SharedConnection {
    url: String,
    cmd_tx: mpsc::Sender<ConnCmd>,
    events_tx: broadcast::Sender<ConnectionEvent>,
    connected: Arc<AtomicBool>,
    active: Arc<AtomicBool>,
    closed: AtomicBool,
    _task: JoinHandle<()>,
}

impl SharedConnection {
    /// Spawn the connection task and return immediately. Must be called from
    /// within a tokio runtime.
    pub(crate) fn spawn(
        url: String,
        auth: AuthProvider,
        transport: Arc<dyn Transport>,
        options: ConnectionOptions,
        event_handlers: EventHandlers,
    ) -> Arc<Self> {
        let (cmd_tx, cmd_rx) = mpsc::channel::<ConnCmd>(256);
        let (events_tx, _) = broadcast::channel(CONNECTION_EVENT_CAPACITY);
        let connected = Arc::new(AtomicBool::new(false));
        let active = Arc::new(AtomicBool::new(true));

        let task = tokio::spawn(connection_task(
            cmd_rx,
            TaskContext {
                url: url.clone(),
                auth,
                transport,
                options,
                event_handlers,
                events_tx: events_tx.clone(),
                connected: connected.clone(),
                active: active.clone(),
            },
        ));

        Arc::new(Self {
            url,
            cmd_tx,
            events_tx,
            connected,
            active,
            closed: AtomicBool::new(false),
            _task: task,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether the stream is currently open.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Whether the connection is connected or still trying to be. `false`
    /// once it gave up reconnecting or was closed.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Subscribe to lifecycle changes and inbound events.
    ///
    /// Subscribe before checking [`is_connected`](Self::is_connected) so a
    /// connect that lands in between is not missed.
    pub fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events_tx.subscribe()
    }

    /// Send a message to the server.
    pub async fn emit(&self, message: ClientMessage) -> Result<()> {
        let (result_tx, result_rx) = oneshot::channel();
        self.cmd_tx
            .send(ConnCmd::Emit { message, result_tx })
            .await
            .map_err(|_| CampusLinkError::ConnectionClosed)?;
        result_rx.await.map_err(|_| CampusLinkError::ConnectionClosed)?
    }

    /// Close the connection. Only the first call has an effect.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let (done_tx, done_rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(ConnCmd::Shutdown {
                done: Some(done_tx),
            })
            .await
            .is_ok()
        {
            let _ = done_rx.await;
        }
    }
}

impl Drop for SharedConnection {
    fn drop(&mut self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.cmd_tx.try_send(ConnCmd::Shutdown { done: None });
        }
    }
}

impl std::fmt::Debug for SharedConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedConnection")
            .field("url", &self.url)
            .field("connected", &self.is_connected())
            .field("active", &self.is_active())
            .field("closed", &self.is_closed())
            .finish()
    }
}

// ── Background connection task ──────────────────────────────────────────────

struct TaskContext {
    url: String,
    auth: AuthProvider,
    transport: Arc<dyn Transport>,
    options: ConnectionOptions,
    event_handlers: EventHandlers,
    events_tx: broadcast::Sender<ConnectionEvent>,
    connected: Arc<AtomicBool>,
    active: Arc<AtomicBool>,
}

impl TaskContext {
    fn publish(&self, event: ConnectionEvent) {
        // No receivers is fine: nobody is bound yet.
        let _ = self.events_tx.send(event);
    }

    fn stream_lost(&self, reason: DisconnectReason) {
        log::info!("[campus-link] Realtime stream lost: {}", reason);
        self.connected.store(false, Ordering::SeqCst);
        self.event_handlers.emit_disconnect(reason.clone());
        self.publish(ConnectionEvent::Disconnected(reason));
    }

    async fn open_stream(&self) -> Result<Box<dyn TransportStream>> {
        let open = self.transport.open(&self.url, &self.auth);
        let timeout = self.options.connection_timeout();
        if timeout.is_zero() {
            return open.await;
        }
        match tokio::time::timeout(timeout, open).await {
            Ok(result) => result,
            Err(_) => Err(CampusLinkError::TimeoutError(format!(
                "Connection timeout ({:?})",
                timeout
            ))),
        }
    }
}

async fn send_message(
    stream: &mut Box<dyn TransportStream>,
    message: &ClientMessage,
    event_handlers: &EventHandlers,
) -> Result<()> {
    let payload = serde_json::to_string(message)?;
    event_handlers.emit_send(&payload);
    stream.send_text(payload).await
}

fn reject_emit(result_tx: oneshot::Sender<Result<()>>, why: &str) {
    let _ = result_tx.send(Err(CampusLinkError::NotConnected(why.to_string())));
}

async fn connection_task(mut cmd_rx: mpsc::Receiver<ConnCmd>, ctx: TaskContext) {
    let options = &ctx.options;
    let mut stream: Option<Box<dyn TransportStream>> = None;
    let mut shutdown_waiters: Vec<oneshot::Sender<()>> = Vec::new();
    let mut shutdown_requested = false;

    // Consecutive failed attempts since the last successful connect.
    let mut failures: u32 = 0;
    let mut ever_connected = false;
    let mut lost = false;

    let ping_interval = options.ping_interval();
    let has_keepalive = !ping_interval.is_zero();
    let keepalive_dur = if has_keepalive { ping_interval } else { FAR_FUTURE };
    let mut idle_deadline = TokioInstant::now() + keepalive_dur;

    let pong_timeout_dur = options.pong_timeout();
    let has_pong_timeout = has_keepalive && !pong_timeout_dur.is_zero();
    let mut awaiting_pong = false;
    let mut pong_deadline = TokioInstant::now() + FAR_FUTURE;

    loop {
        if shutdown_requested {
            if let Some(mut ws) = stream.take() {
                ws.close().await;
            }
            if ctx.connected.swap(false, Ordering::SeqCst) {
                ctx.event_handlers
                    .emit_disconnect(DisconnectReason::new("Client disconnected"));
            }
            ctx.active.store(false, Ordering::SeqCst);
            ctx.publish(ConnectionEvent::Closed);
            log::debug!("[campus-link] Connection task for {} stopped", ctx.url);
            for done in shutdown_waiters.drain(..) {
                let _ = done.send(());
            }
            return;
        }

        if let Some(ref mut ws) = stream {
            let idle_sleep = tokio::time::sleep_until(idle_deadline);
            tokio::pin!(idle_sleep);

            let pong_sleep = tokio::time::sleep_until(pong_deadline);
            tokio::pin!(pong_sleep);

            tokio::select! {
                biased;

                _ = &mut pong_sleep, if has_pong_timeout && awaiting_pong => {
                    log::warn!(
                        "[campus-link] Pong timeout ({:?}), server unresponsive",
                        pong_timeout_dur,
                    );
                    awaiting_pong = false;
                    stream = None;
                    lost = true;
                    ctx.stream_lost(DisconnectReason::new(format!(
                        "Pong timeout ({:?})",
                        pong_timeout_dur,
                    )));
                    continue;
                }

                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(ConnCmd::Emit { message, result_tx }) => {
                            let result = send_message(ws, &message, &ctx.event_handlers).await;
                            if let Err(ref e) = result {
                                log::warn!(
                                    "[campus-link] Failed to send {}: {}",
                                    message.event_name(),
                                    e
                                );
                            }
                            let _ = result_tx.send(result);
                        },
                        Some(ConnCmd::Shutdown { done }) => {
                            shutdown_waiters.extend(done);
                            shutdown_requested = true;
                        },
                        None => {
                            shutdown_requested = true;
                        },
                    }
                }

                _ = &mut idle_sleep, if has_keepalive && !awaiting_pong => {
                    if let Err(e) = ws.ping().await {
                        stream = None;
                        lost = true;
                        ctx.stream_lost(DisconnectReason::new(e.to_string()));
                        continue;
                    }
                    ctx.event_handlers.emit_send("[ping]");
                    if has_pong_timeout {
                        awaiting_pong = true;
                        pong_deadline = TokioInstant::now() + pong_timeout_dur;
                    }
                    idle_deadline = TokioInstant::now() + keepalive_dur;
                }

                frame = ws.next_frame() => {
                    idle_deadline = TokioInstant::now() + keepalive_dur;
                    if awaiting_pong {
                        awaiting_pong = false;
                        pong_deadline = TokioInstant::now() + FAR_FUTURE;
                    }

                    match frame {
                        Ok(TransportFrame::Text(text)) => {
                            ctx.event_handlers.emit_receive(&text);
                            match parse_frame(&text) {
                                Ok(Some(event)) => {
                                    log::debug!("[campus-link] Received {}", event.name);
                                    ctx.publish(ConnectionEvent::Event(event));
                                },
                                Ok(None) => {
                                    log::debug!("[campus-link] Ignoring frame with unknown event name");
                                },
                                Err(e) => log::warn!("[campus-link] Failed to parse frame: {}", e),
                            }
                        },
                        Ok(TransportFrame::Pong) => {
                            log::debug!("[campus-link] Keepalive: received Pong");
                        },
                        Ok(TransportFrame::Close(reason)) => {
                            stream = None;
                            lost = true;
                            ctx.stream_lost(reason);
                        },
                        Err(e) => {
                            stream = None;
                            lost = true;
                            ctx.stream_lost(DisconnectReason::new(format!("Stream error: {}", e)));
                        },
                    }
                }
            }
        } else {
            // ── Not connected: give up, wait, or attempt ───────────────
            let retrying = failures > 0 || lost;
            let out_of_budget = if options.auto_reconnect {
                failures >= options.max_reconnect_attempts.max(1)
            } else {
                retrying
            };

            if out_of_budget {
                ctx.active.store(false, Ordering::SeqCst);
                let reason = DisconnectReason::new(format!(
                    "Gave up after {} failed connection attempt(s)",
                    failures
                ));
                log::warn!("[campus-link] {}", reason);
                ctx.event_handlers.emit_disconnect(reason.clone());
                ctx.publish(ConnectionEvent::Disconnected(reason));

                loop {
                    match cmd_rx.recv().await {
                        Some(ConnCmd::Emit { result_tx, .. }) => {
                            reject_emit(result_tx, "connection gave up reconnecting");
                        },
                        Some(ConnCmd::Shutdown { done }) => {
                            shutdown_waiters.extend(done);
                            break;
                        },
                        None => break,
                    }
                }
                shutdown_requested = true;
                continue;
            }

            if retrying {
                let delay = options.reconnect_delay(failures.max(1));
                log::info!(
                    "[campus-link] Attempting reconnection in {}ms (attempt {})",
                    delay.as_millis(),
                    failures + 1
                );
                if wait_or_shutdown(&mut cmd_rx, delay, &mut shutdown_waiters).await {
                    shutdown_requested = true;
                    continue;
                }
            }

            let attempt = failures + 1;
            let outcome = {
                let open = ctx.open_stream();
                tokio::pin!(open);
                loop {
                    tokio::select! {
                        biased;
                        cmd = cmd_rx.recv() => match cmd {
                            Some(ConnCmd::Emit { result_tx, .. }) => {
                                reject_emit(result_tx, "connection is being established");
                            },
                            Some(ConnCmd::Shutdown { done }) => {
                                shutdown_waiters.extend(done);
                                break None;
                            },
                            None => break None,
                        },
                        result = &mut open => break Some(result),
                    }
                }
            };

            match outcome {
                None => {
                    shutdown_requested = true;
                },
                Some(Ok(ws)) => {
                    log::info!("[campus-link] Realtime channel connected to {}", ctx.url);
                    stream = Some(ws);
                    failures = 0;
                    ctx.connected.store(true, Ordering::SeqCst);
                    idle_deadline = TokioInstant::now() + keepalive_dur;
                    awaiting_pong = false;
                    pong_deadline = TokioInstant::now() + FAR_FUTURE;

                    ctx.event_handlers.emit_connect();
                    ctx.publish(ConnectionEvent::Connected);
                    if ever_connected {
                        ctx.event_handlers.emit_reconnect(attempt);
                        ctx.publish(ConnectionEvent::Reconnected { attempt });
                    }
                    ever_connected = true;
                    lost = false;
                },
                Some(Err(e)) => {
                    failures += 1;
                    let recoverable = !matches!(e, CampusLinkError::AuthenticationError(_));
                    log::warn!("[campus-link] Connection attempt {} failed: {}", attempt, e);
                    let error = ConnectionError::new(e.to_string(), recoverable);
                    ctx.event_handlers.emit_error(error.clone());
                    ctx.publish(ConnectionEvent::ConnectError(error));
                },
            }
        }
    }
}

/// Sleep for `delay` while still answering commands. Returns `true` if a
/// shutdown was requested meanwhile.
async fn wait_or_shutdown(
    cmd_rx: &mut mpsc::Receiver<ConnCmd>,
    delay: Duration,
    shutdown_waiters: &mut Vec<oneshot::Sender<()>>,
) -> bool {
    let sleep_fut = tokio::time::sleep(delay);
    tokio::pin!(sleep_fut);
    loop {
        tokio::select! {
            biased;
            cmd = cmd_rx.recv() => match cmd {
                Some(ConnCmd::Emit { result_tx, .. }) => {
                    reject_emit(result_tx, "waiting to reconnect");
                },
                Some(ConnCmd::Shutdown { done }) => {
                    shutdown_waiters.extend(done);
                    return true;
                },
                None => return true,
            },
            _ = &mut sleep_fut => return false,
        }
    }
}
