//! Owner of the process-wide shared connection.
//!
//! The manager creates the connection lazily on first request, recreates it
//! on `reconnect()`, counts failed connection attempts, reports every outcome
//! to the [`HealthMonitor`], and closes the connection exactly once on
//! teardown.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::shared::SharedConnection;
use super::transport::{resolve_ws_url, Transport};
use crate::auth::{AuthProvider, TokenStore};
use crate::error::{CampusLinkError, Result};
use crate::event_handlers::EventHandlers;
use crate::health::HealthMonitor;
use crate::models::ConnectionOptions;

pub struct ConnectionManager {
    server_url: String,
    options: ConnectionOptions,
    transport: Arc<dyn Transport>,
    token_store: Arc<dyn TokenStore>,
    health: Arc<HealthMonitor>,
    event_handlers: EventHandlers,
    current: Mutex<Option<Arc<SharedConnection>>>,
    attempts: Arc<AtomicU32>,
    terminated: AtomicBool,
    shutdown_hook: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    pub fn new(
        server_url: impl Into<String>,
        options: ConnectionOptions,
        transport: Arc<dyn Transport>,
        token_store: Arc<dyn TokenStore>,
        health: Arc<HealthMonitor>,
        event_handlers: EventHandlers,
    ) -> Self {
        Self {
            server_url: server_url.into(),
            options,
            transport,
            token_store,
            health,
            event_handlers,
            current: Mutex::new(None),
            attempts: Arc::new(AtomicU32::new(0)),
            terminated: AtomicBool::new(false),
            shutdown_hook: std::sync::Mutex::new(None),
        }
    }

    /// Return the shared connection, creating it if needed.
    ///
    /// An existing connection is reused while it is connected or still
    /// establishing/reconnecting within its attempt budget; a connection that
    /// gave up is replaced. Fails only after [`shutdown`](Self::shutdown) or
    /// on an unusable server URL.
    pub async fn get_or_create_connection(&self) -> Result<Arc<SharedConnection>> {
        if self.is_terminated() {
            return Err(CampusLinkError::ConnectionClosed);
        }

        let mut current = self.current.lock().await;
        if let Some(conn) = current.as_ref() {
            if conn.is_connected() || conn.is_active() {
                return Ok(Arc::clone(conn));
            }
        }

        let url = resolve_ws_url(&self.server_url, &self.options.ws_path)?;
        let auth = AuthProvider::from_store(self.token_store.as_ref());
        log::info!(
            "[campus-link] Creating shared connection to {} ({})",
            url,
            if auth.is_authenticated() {
                "authenticated"
            } else {
                "unauthenticated"
            }
        );

        let conn = SharedConnection::spawn(
            url,
            auth,
            Arc::clone(&self.transport),
            self.options.clone(),
            self.baseline_handlers().chain(self.event_handlers.clone()),
        );
        let previous = current.replace(Arc::clone(&conn));
        drop(current);

        if let Some(previous) = previous {
            previous.close().await;
        }
        Ok(conn)
    }

    /// Force-close the current connection and create a fresh one.
    pub async fn reconnect(&self) -> Result<Arc<SharedConnection>> {
        let previous = self.current.lock().await.take();
        if let Some(previous) = previous {
            log::info!("[campus-link] Forcing reconnect of the shared connection");
            previous.close().await;
        }
        self.get_or_create_connection().await
    }

    /// The current connection, if one was created and not discarded.
    pub async fn current(&self) -> Option<Arc<SharedConnection>> {
        self.current.lock().await.clone()
    }

    /// Failed connection attempts since the last successful connect, capped
    /// at [`max_connect_attempts`](Self::max_connect_attempts).
    pub fn connect_attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn max_connect_attempts(&self) -> u32 {
        self.options.max_reconnect_attempts
    }

    /// Whether the attempt counter reached its cap.
    pub fn attempts_exhausted(&self) -> bool {
        self.connect_attempts() >= self.max_connect_attempts()
    }

    pub fn health(&self) -> &Arc<HealthMonitor> {
        &self.health
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Close the connection for good. Returns `false` if already shut down.
    pub async fn shutdown(&self) -> bool {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return false;
        }
        let conn = self.current.lock().await.take();
        if let Some(conn) = conn {
            conn.close().await;
        }
        log::info!("[campus-link] Realtime connection shut down");
        true
    }

    /// Close the connection when the process is asked to terminate (Ctrl-C).
    ///
    /// Installing more than once is a no-op; the close runs at most once even
    /// if `shutdown()` is also called directly.
    pub fn install_shutdown_hook(self: &Arc<Self>) {
        let mut hook = self
            .shutdown_hook
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if hook.is_some() {
            return;
        }

        let manager: Weak<ConnectionManager> = Arc::downgrade(self);
        *hook = Some(tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::warn!("[campus-link] Cannot listen for termination signal: {}", e);
                return;
            }
            if let Some(manager) = manager.upgrade() {
                log::info!("[campus-link] Termination signal received, closing realtime connection");
                manager.shutdown().await;
            }
        }));
    }

    /// Log, count and report connection outcomes before user handlers run.
    fn baseline_handlers(&self) -> EventHandlers {
        let attempts_on_connect = Arc::clone(&self.attempts);
        let health_on_connect = Arc::clone(&self.health);
        let attempts_on_error = Arc::clone(&self.attempts);
        let health_on_error = Arc::clone(&self.health);
        let cap = self.options.max_reconnect_attempts;

        EventHandlers::new()
            .on_connect(move || {
                attempts_on_connect.store(0, Ordering::SeqCst);
                health_on_connect.record_success();
            })
            .on_disconnect(|reason| {
                log::info!("[campus-link] Disconnected: {}", reason);
            })
            .on_error(move |error| {
                let attempts = attempts_on_error
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                        Some(n.saturating_add(1).min(cap))
                    })
                    .map(|previous| previous.saturating_add(1).min(cap))
                    .unwrap_or(cap);
                log::warn!(
                    "[campus-link] Connection error ({}/{}): {}",
                    attempts,
                    cap,
                    error
                );
                health_on_error.record_error(&error.message);
            })
            .on_reconnect(|attempt| {
                log::info!("[campus-link] Reconnected on attempt {}", attempt);
            })
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(hook) = self
            .shutdown_hook
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        {
            hook.abort();
        }
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("server_url", &self.server_url)
            .field("attempts", &self.connect_attempts())
            .field("terminated", &self.is_terminated())
            .finish()
    }
}
