//! Realtime connection management.
//!
//! This module contains:
//! - [`transport`]: The transport seam and its WebSocket implementation
//! - [`shared`]: The shared connection with auto-reconnect and keepalive
//! - [`manager`]: Owner of the process-wide connection and attempt counter

pub mod manager;
pub mod shared;
pub mod transport;

pub use manager::ConnectionManager;
pub use shared::{ConnectionEvent, SharedConnection};
pub use transport::{resolve_ws_url, Transport, TransportFrame, TransportStream, WsTransport};

/// Capacity of the per-connection event broadcast. Binders that fall this
/// far behind skip events and log a warning.
pub(crate) const CONNECTION_EVENT_CAPACITY: usize = 1024;

/// A duration far enough in the future (~100 years) to act as "never" for
/// deadline calculations without overflowing `Instant::now() + dur`.
pub(crate) const FAR_FUTURE: std::time::Duration =
    std::time::Duration::from_secs(100 * 365 * 24 * 3600);
