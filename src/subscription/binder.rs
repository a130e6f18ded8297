//! `SubscriptionBinder` – per-view binding of topics to a cached query.
//!
//! A binder subscribes its topics on the shared connection, turns matching
//! inbound events into invalidations of one query key, and keeps that query
//! fresh by polling whenever the channel is unusable. Mounting spawns one
//! background task per binder; unmounting stops it without touching the
//! shared connection other binders use.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::connection::{ConnectionEvent, SharedConnection};
use crate::context::RealtimeContext;
use crate::health::RecoveryHandle;
use crate::models::{ChannelEvent, EventName, InboundEvent, QueryKey, TopicDescriptor, Topics};
use crate::polling::PollingFallback;

/// Caller hook receiving every delivered event and its timestamp (epoch ms).
pub type OnEventCallback = Arc<dyn Fn(&InboundEvent, u64) + Send + Sync>;

/// Current time in millis since Unix epoch.
#[inline]
fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// What a binder is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinderConfig {
    pub topics: Topics,
    /// Query invalidated on every accepted event and polling tick
    pub query_key: QueryKey,
    /// A disabled binder does nothing at all
    pub enabled: bool,
    /// Overrides `RealtimeConfig::polling_interval_ms` for this binder
    pub polling_interval: Option<Duration>,
}

impl BinderConfig {
    pub fn new(query_key: impl Into<QueryKey>) -> Self {
        Self {
            topics: Topics::default(),
            query_key: query_key.into(),
            enabled: true,
            polling_interval: None,
        }
    }

    pub fn topics(mut self, topics: Topics) -> Self {
        self.topics = topics;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn polling_interval(mut self, interval: Duration) -> Self {
        self.polling_interval = Some(interval);
        self
    }

    /// Whether mounting with this config would do anything.
    pub fn is_active(&self) -> bool {
        self.enabled && !self.query_key.is_empty()
    }
}

/// Unmounted binder: context, parameters and optional event hook.
///
/// # Example
///
/// ```rust,no_run
/// use campus_link::{BinderConfig, QueryKey, RealtimeContext, SubscriptionBinder, Topics};
///
/// # async fn example(context: RealtimeContext) {
/// let binder = SubscriptionBinder::new(
///     context,
///     BinderConfig::new(QueryKey::new(["students", "class-7b"]))
///         .topics(Topics::new().table("students").class_id("class-7b")),
/// )
/// .on_event(|event, at| println!("{} at {}", event.event_type, at))
/// .mount();
///
/// // ... when the view goes away
/// binder.unmount().await;
/// # }
/// ```
pub struct SubscriptionBinder {
    context: RealtimeContext,
    config: BinderConfig,
    on_event: Option<OnEventCallback>,
}

impl SubscriptionBinder {
    pub fn new(context: RealtimeContext, config: BinderConfig) -> Self {
        Self {
            context,
            config,
            on_event: None,
        }
    }

    pub fn on_event(mut self, f: impl Fn(&InboundEvent, u64) + Send + Sync + 'static) -> Self {
        self.on_event = Some(Arc::new(f));
        self
    }

    /// Start the binder. Requires a tokio runtime unless the binder is inert
    /// (disabled or bound to an empty query key).
    pub fn mount(self) -> BinderHandle {
        let state = Arc::new(BinderState::default());

        if !self.config.is_active() {
            log::debug!(
                "[campus-link] Binder for {} not mounted (disabled or empty key)",
                self.config.query_key
            );
            return BinderHandle {
                context: self.context,
                config: self.config,
                on_event: self.on_event,
                state,
                polling: Arc::new(AtomicBool::new(false)),
                cmd_tx: None,
                task: None,
                recovery: None,
            };
        }

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        let weak_tx = cmd_tx.downgrade();
        let recovery = self.context.health().register_recovery_callback(move || {
            if let Some(tx) = weak_tx.upgrade() {
                let _ = tx.send(BinderCmd::Recover);
            }
        });

        let polling_interval = self
            .config
            .polling_interval
            .unwrap_or_else(|| self.context.config().polling_interval());
        let polling = PollingFallback::new(
            self.config.query_key.clone(),
            Arc::clone(self.context.invalidator()),
        );
        let polling_flag = polling.active_flag();

        let task = BinderTask {
            context: self.context.clone(),
            query_key: self.config.query_key.clone(),
            bound_table: self.config.topics.bound_table().map(str::to_string),
            descriptors: self.config.topics.descriptors(),
            on_event: self.on_event.clone(),
            state: Arc::clone(&state),
            polling,
            polling_interval,
            connection: None,
            subscribed: Vec::new(),
            connected: false,
        };

        BinderHandle {
            context: self.context,
            config: self.config,
            on_event: self.on_event,
            state,
            polling: polling_flag,
            cmd_tx: Some(cmd_tx),
            task: Some(tokio::spawn(task.run(cmd_rx))),
            recovery: Some(recovery),
        }
    }
}

enum BinderCmd {
    /// Sent by the health monitor's recovery callback.
    Recover,
    Unmount { done: oneshot::Sender<()> },
}

#[derive(Debug, Default)]
struct BinderState {
    connected: AtomicBool,
    last_event_at_ms: AtomicU64,
    delivered: AtomicU64,
}

/// A mounted binder. Dropping the handle unmounts in the background;
/// [`unmount`](Self::unmount) waits for the unsubscribes to go out.
pub struct BinderHandle {
    context: RealtimeContext,
    config: BinderConfig,
    on_event: Option<OnEventCallback>,
    state: Arc<BinderState>,
    polling: Arc<AtomicBool>,
    cmd_tx: Option<mpsc::UnboundedSender<BinderCmd>>,
    task: Option<JoinHandle<()>>,
    recovery: Option<RecoveryHandle>,
}

impl BinderHandle {
    /// Whether this binder's topics are subscribed on a live connection.
    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::SeqCst)
    }

    /// Whether this binder's polling fallback is running.
    pub fn is_polling(&self) -> bool {
        self.polling.load(Ordering::SeqCst)
    }

    /// Timestamp of the last delivered event, if any.
    pub fn last_event_at_ms(&self) -> Option<u64> {
        match self.state.last_event_at_ms.load(Ordering::SeqCst) {
            0 => None,
            ts => Some(ts),
        }
    }

    /// Events that passed filtering and deduplication.
    pub fn delivered_events(&self) -> u64 {
        self.state.delivered.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &BinderConfig {
        &self.config
    }

    pub fn is_mounted(&self) -> bool {
        self.task.is_some()
    }

    /// Re-bind with new parameters: unmount, then mount again.
    pub async fn update(&mut self, config: BinderConfig) {
        if config == self.config {
            return;
        }
        self.stop().await;
        let mut binder = SubscriptionBinder::new(self.context.clone(), config);
        binder.on_event = self.on_event.clone();
        *self = binder.mount();
    }

    /// Unsubscribe this binder's topics and stop its polling.
    pub async fn unmount(mut self) {
        self.stop().await;
    }

    async fn stop(&mut self) {
        drop(self.recovery.take());
        if let Some(cmd_tx) = self.cmd_tx.take() {
            let (done_tx, done_rx) = oneshot::channel();
            if cmd_tx.send(BinderCmd::Unmount { done: done_tx }).is_ok() {
                let _ = done_rx.await;
            }
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                log::warn!("[campus-link] Binder task ended abnormally: {}", e);
            }
        }
    }
}

impl std::fmt::Debug for BinderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinderHandle")
            .field("query_key", &self.config.query_key)
            .field("connected", &self.is_connected())
            .field("polling", &self.is_polling())
            .finish()
    }
}

// ── Background binder task ──────────────────────────────────────────────────

struct BinderTask {
    context: RealtimeContext,
    query_key: QueryKey,
    bound_table: Option<String>,
    descriptors: Vec<TopicDescriptor>,
    on_event: Option<OnEventCallback>,
    state: Arc<BinderState>,
    polling: PollingFallback,
    polling_interval: Duration,
    connection: Option<Arc<SharedConnection>>,
    /// Topics subscribed on the current connection.
    subscribed: Vec<TopicDescriptor>,
    connected: bool,
}

async fn next_connection_event(
    events: &mut Option<broadcast::Receiver<ConnectionEvent>>,
) -> std::result::Result<ConnectionEvent, RecvError> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

impl BinderTask {
    async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<BinderCmd>) {
        let mut fallback_rx = self.context.health().subscribe_fallback();
        let mut watch_fallback = true;

        if *fallback_rx.borrow_and_update() {
            self.start_polling();
        }
        let mut events = self.acquire().await;

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(BinderCmd::Recover) => {
                        if self.connection.as_ref().is_some_and(|c| c.is_connected()) {
                            self.resubscribe().await;
                        } else {
                            events = self.acquire().await;
                        }
                    },
                    Some(BinderCmd::Unmount { done }) => {
                        self.teardown().await;
                        let _ = done.send(());
                        return;
                    },
                    None => {
                        self.teardown().await;
                        return;
                    },
                },

                event = next_connection_event(&mut events) => match event {
                    Ok(ConnectionEvent::Connected) => self.on_connected().await,
                    Ok(ConnectionEvent::Disconnected(reason)) => self.on_disconnected(&reason.message),
                    Ok(ConnectionEvent::Event(event)) => self.deliver(event),
                    Ok(ConnectionEvent::ConnectError(_)) | Ok(ConnectionEvent::Reconnected { .. }) => {},
                    Ok(ConnectionEvent::Closed) | Err(RecvError::Closed) => {
                        self.mark_disconnected();
                        if self.context.connection_manager().is_terminated() {
                            self.go_idle();
                            events = None;
                        } else {
                            log::debug!(
                                "[campus-link] Connection closed under binder {}, reacquiring",
                                self.query_key
                            );
                            events = self.acquire().await;
                        }
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        log::warn!(
                            "[campus-link] Binder {} lagged behind and skipped {} event(s)",
                            self.query_key,
                            skipped
                        );
                    },
                },

                changed = fallback_rx.changed(), if watch_fallback => match changed {
                    Ok(()) => {
                        let in_fallback = *fallback_rx.borrow_and_update();
                        if in_fallback {
                            self.start_polling();
                        } else if self.connected {
                            self.stop_polling();
                        }
                    },
                    Err(_) => watch_fallback = false,
                },
            }
        }
    }

    /// Get the shared connection and subscribe to its events. Subscribes the
    /// topics right away if it is already connected.
    async fn acquire(&mut self) -> Option<broadcast::Receiver<ConnectionEvent>> {
        let manager = self.context.connection_manager();
        match manager.get_or_create_connection().await {
            Ok(conn) => {
                let events = conn.events();
                let same = self
                    .connection
                    .as_ref()
                    .is_some_and(|current| Arc::ptr_eq(current, &conn));
                if !same {
                    self.mark_disconnected();
                }
                self.connection = Some(Arc::clone(&conn));
                if conn.is_connected() {
                    self.on_connected().await;
                }
                Some(events)
            },
            Err(e) => {
                let terminated = manager.is_terminated();
                self.connection = None;
                self.mark_disconnected();
                if terminated {
                    self.go_idle();
                } else {
                    log::warn!(
                        "[campus-link] Binder {} has no realtime connection: {}",
                        self.query_key,
                        e
                    );
                    self.start_polling();
                }
                None
            },
        }
    }

    async fn on_connected(&mut self) {
        if self.connected {
            return;
        }
        let Some(conn) = self.connection.clone() else {
            return;
        };

        let mut failures = 0;
        self.subscribed.clear();
        for descriptor in &self.descriptors {
            let message = descriptor.subscribe_message();
            let name = message.event_name();
            match conn.emit(message).await {
                Ok(()) => self.subscribed.push(descriptor.clone()),
                Err(e) => {
                    failures += 1;
                    log::warn!(
                        "[campus-link] {} for {} failed: {}",
                        name,
                        self.query_key,
                        e
                    );
                },
            }
        }

        self.connected = true;
        self.state.connected.store(true, Ordering::SeqCst);
        if failures == 0 {
            log::info!(
                "[campus-link] Binder {} subscribed to {} topic(s)",
                self.query_key,
                self.subscribed.len()
            );
            self.stop_polling();
        } else {
            self.start_polling();
        }
    }

    /// Re-emit subscriptions on the current connection after a recovery.
    async fn resubscribe(&mut self) {
        self.mark_disconnected();
        self.on_connected().await;
    }

    fn on_disconnected(&mut self, reason: &str) {
        self.mark_disconnected();
        let manager = self.context.connection_manager();
        let gave_up = self.connection.as_ref().is_some_and(|c| !c.is_active());
        if gave_up || manager.attempts_exhausted() {
            log::info!(
                "[campus-link] Binder {} falling back to polling ({}/{} attempts used): {}",
                self.query_key,
                manager.connect_attempts(),
                manager.max_connect_attempts(),
                reason
            );
            self.start_polling();
        }
    }

    fn mark_disconnected(&mut self) {
        self.connected = false;
        self.subscribed.clear();
        self.state.connected.store(false, Ordering::SeqCst);
    }

    fn deliver(&mut self, channel_event: ChannelEvent) {
        let ChannelEvent { name, event } = channel_event;

        if name == EventName::TableChange {
            let matches = self
                .bound_table
                .as_deref()
                .is_some_and(|table| event.targets_table(table));
            if !matches {
                log::debug!(
                    "[campus-link] Binder {} ignoring table_change for {:?}",
                    self.query_key,
                    event.table
                );
                return;
            }
        }

        if !self.context.deduplicator().accept(&event) {
            return;
        }

        self.context.invalidator().invalidate(&self.query_key);

        let timestamp = if event.timestamp > 0 {
            event.timestamp
        } else {
            now_ms()
        };
        self.state.last_event_at_ms.store(timestamp, Ordering::SeqCst);
        self.state.delivered.fetch_add(1, Ordering::SeqCst);

        if let Some(callback) = &self.on_event {
            if catch_unwind(AssertUnwindSafe(|| callback(&event, timestamp))).is_err() {
                log::warn!(
                    "[campus-link] Event callback of binder {} panicked on {}",
                    self.query_key,
                    name
                );
            }
        }
    }

    fn start_polling(&mut self) {
        if self.context.connection_manager().is_terminated() {
            return;
        }
        self.polling.start(self.polling_interval);
    }

    /// The connection manager was shut down: nothing left to subscribe to
    /// and nothing worth polling for.
    fn go_idle(&mut self) {
        self.connection = None;
        self.stop_polling();
        log::debug!(
            "[campus-link] Binder {} idle after realtime shutdown",
            self.query_key
        );
    }

    fn stop_polling(&mut self) {
        self.polling.stop();
    }

    async fn teardown(&mut self) {
        if let Some(conn) = self.connection.take() {
            if conn.is_connected() {
                for descriptor in self.subscribed.drain(..) {
                    let message = descriptor.unsubscribe_message();
                    let name = message.event_name();
                    if let Err(e) = conn.emit(message).await {
                        log::warn!(
                            "[campus-link] {} for {} failed: {}",
                            name,
                            self.query_key,
                            e
                        );
                    }
                }
            }
        }
        self.mark_disconnected();
        self.stop_polling();
        log::debug!("[campus-link] Binder {} unmounted", self.query_key);
    }
}
