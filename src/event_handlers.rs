//! Connection lifecycle event handlers.
//!
//! Provides callback-based hooks for monitoring the shared realtime channel:
//!
//! - [`on_connect`](EventHandlers::on_connect): Fired when the channel is established
//! - [`on_disconnect`](EventHandlers::on_disconnect): Fired when the channel closes
//! - [`on_error`](EventHandlers::on_error): Fired on every failed connection attempt
//! - [`on_reconnect`](EventHandlers::on_reconnect): Fired after a successful reconnection
//! - [`on_receive`](EventHandlers::on_receive): Optional debug hook for all incoming frames
//! - [`on_send`](EventHandlers::on_send): Optional debug hook for all outgoing frames
//!
//! # Example
//!
//! ```rust
//! use campus_link::EventHandlers;
//!
//! let handlers = EventHandlers::new()
//!     .on_connect(|| println!("Realtime channel up"))
//!     .on_disconnect(|reason| println!("Disconnected: {}", reason))
//!     .on_error(|error| eprintln!("Connection error: {}", error));
//! ```

use std::fmt;
use std::sync::Arc;

/// Reason for a disconnect event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectReason {
    /// Human-readable description of why the connection closed.
    pub message: String,
    /// WebSocket close code, if available (e.g. 1000 = normal, 1006 = abnormal).
    pub code: Option<u16>,
}

impl DisconnectReason {
    /// Create a new disconnect reason with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    /// Create a new disconnect reason with a message and close code.
    pub fn with_code(message: impl Into<String>, code: u16) -> Self {
        Self {
            message: message.into(),
            code: Some(code),
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(code) = self.code {
            write!(f, "{} (code: {})", self.message, code)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

/// Error information passed to the `on_error` handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionError {
    /// Human-readable error message.
    pub message: String,
    /// Whether this error is recoverable (i.e. another attempt may succeed).
    pub recoverable: bool,
}

impl ConnectionError {
    /// Create a new connection error.
    pub fn new(message: impl Into<String>, recoverable: bool) -> Self {
        Self {
            message: message.into(),
            recoverable,
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Type alias for the on_connect callback.
pub type OnConnectCallback = Arc<dyn Fn() + Send + Sync>;

/// Type alias for the on_disconnect callback.
pub type OnDisconnectCallback = Arc<dyn Fn(DisconnectReason) + Send + Sync>;

/// Type alias for the on_error callback.
pub type OnErrorCallback = Arc<dyn Fn(ConnectionError) + Send + Sync>;

/// Type alias for the on_reconnect callback (receives the attempt number that succeeded).
pub type OnReconnectCallback = Arc<dyn Fn(u32) + Send + Sync>;

/// Type alias for the raw frame debug hooks.
pub type OnFrameCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Connection lifecycle event handlers.
///
/// All handlers are optional. Handlers are `Send + Sync` so they can be
/// invoked from the background connection task.
#[derive(Clone, Default)]
pub struct EventHandlers {
    pub(crate) on_connect: Option<OnConnectCallback>,
    pub(crate) on_disconnect: Option<OnDisconnectCallback>,
    pub(crate) on_error: Option<OnErrorCallback>,
    pub(crate) on_reconnect: Option<OnReconnectCallback>,
    pub(crate) on_receive: Option<OnFrameCallback>,
    pub(crate) on_send: Option<OnFrameCallback>,
}

impl fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandlers")
            .field("on_connect", &self.on_connect.is_some())
            .field("on_disconnect", &self.on_disconnect.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_reconnect", &self.on_reconnect.is_some())
            .field("on_receive", &self.on_receive.is_some())
            .field("on_send", &self.on_send.is_some())
            .finish()
    }
}

impl EventHandlers {
    /// Create a new empty `EventHandlers` (no callbacks registered).
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback invoked when the channel is established.
    pub fn on_connect(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_connect = Some(Arc::new(f));
        self
    }

    /// Register a callback invoked when the channel is closed.
    pub fn on_disconnect(mut self, f: impl Fn(DisconnectReason) + Send + Sync + 'static) -> Self {
        self.on_disconnect = Some(Arc::new(f));
        self
    }

    /// Register a callback invoked when a connection attempt fails.
    pub fn on_error(mut self, f: impl Fn(ConnectionError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Register a callback invoked after a successful reconnection.
    pub fn on_reconnect(mut self, f: impl Fn(u32) + Send + Sync + 'static) -> Self {
        self.on_reconnect = Some(Arc::new(f));
        self
    }

    /// Register a debug hook receiving every raw inbound frame.
    pub fn on_receive(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_receive = Some(Arc::new(f));
        self
    }

    /// Register a debug hook receiving every raw outbound frame.
    pub fn on_send(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_send = Some(Arc::new(f));
        self
    }

    /// Returns `true` if any handler is registered.
    pub fn has_any(&self) -> bool {
        self.on_connect.is_some()
            || self.on_disconnect.is_some()
            || self.on_error.is_some()
            || self.on_reconnect.is_some()
            || self.on_receive.is_some()
            || self.on_send.is_some()
    }

    /// Layer `outer` on top of `self`: each event runs `self`'s handler first,
    /// then `outer`'s.
    pub(crate) fn chain(self, outer: EventHandlers) -> EventHandlers {
        fn both<T: ?Sized>(
            first: Option<Arc<T>>,
            second: Option<Arc<T>>,
            join: impl FnOnce(Arc<T>, Arc<T>) -> Arc<T>,
        ) -> Option<Arc<T>> {
            match (first, second) {
                (Some(a), Some(b)) => Some(join(a, b)),
                (a, None) => a,
                (None, b) => b,
            }
        }

        EventHandlers {
            on_connect: both(self.on_connect, outer.on_connect, |a, b| -> OnConnectCallback {
                Arc::new(move || {
                    a();
                    b();
                })
            }),
            on_disconnect: both(self.on_disconnect, outer.on_disconnect, |a, b| -> OnDisconnectCallback {
                Arc::new(move |reason: DisconnectReason| {
                    a(reason.clone());
                    b(reason);
                })
            }),
            on_error: both(self.on_error, outer.on_error, |a, b| -> OnErrorCallback {
                Arc::new(move |error: ConnectionError| {
                    a(error.clone());
                    b(error);
                })
            }),
            on_reconnect: both(self.on_reconnect, outer.on_reconnect, |a, b| -> OnReconnectCallback {
                Arc::new(move |attempt: u32| {
                    a(attempt);
                    b(attempt);
                })
            }),
            on_receive: both(self.on_receive, outer.on_receive, |a, b| -> OnFrameCallback {
                Arc::new(move |raw: &str| {
                    a(raw);
                    b(raw);
                })
            }),
            on_send: both(self.on_send, outer.on_send, |a, b| -> OnFrameCallback {
                Arc::new(move |raw: &str| {
                    a(raw);
                    b(raw);
                })
            }),
        }
    }

    // ---------------------------------------------------------------
    // Internal dispatch helpers
    // ---------------------------------------------------------------

    pub(crate) fn emit_connect(&self) {
        if let Some(cb) = &self.on_connect {
            cb();
        }
    }

    pub(crate) fn emit_disconnect(&self, reason: DisconnectReason) {
        if let Some(cb) = &self.on_disconnect {
            cb(reason);
        }
    }

    pub(crate) fn emit_error(&self, error: ConnectionError) {
        if let Some(cb) = &self.on_error {
            cb(error);
        }
    }

    pub(crate) fn emit_reconnect(&self, attempt: u32) {
        if let Some(cb) = &self.on_reconnect {
            cb(attempt);
        }
    }

    pub(crate) fn emit_receive(&self, raw: &str) {
        if let Some(cb) = &self.on_receive {
            cb(raw);
        }
    }

    pub(crate) fn emit_send(&self, raw: &str) {
        if let Some(cb) = &self.on_send {
            cb(raw);
        }
    }
}
