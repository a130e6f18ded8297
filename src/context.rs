//! The realtime context shared by every binder in the process.
//!
//! One `RealtimeContext` owns the connection manager, the deduplicator, the
//! health monitor and the cache collaborator. It is a cheap `Arc` handle;
//! clone it into every binder instead of reaching for globals.

use std::sync::Arc;

use crate::auth::{MemoryTokenStore, TokenStore};
use crate::cache::{NoopInvalidator, QueryInvalidator};
use crate::config::RealtimeConfig;
use crate::connection::{ConnectionManager, Transport, WsTransport};
use crate::dedup::EventDeduplicator;
use crate::error::Result;
use crate::event_handlers::EventHandlers;
use crate::health::HealthMonitor;
use crate::subscription::{BinderConfig, SubscriptionBinder};

struct ContextInner {
    config: RealtimeConfig,
    connection_manager: Arc<ConnectionManager>,
    deduplicator: EventDeduplicator,
    health: Arc<HealthMonitor>,
    invalidator: Arc<dyn QueryInvalidator>,
}

/// Handle to the process-wide realtime state.
///
/// # Example
///
/// ```rust,no_run
/// use campus_link::{FileTokenStore, QueryKey, RealtimeConfig, RealtimeContext};
///
/// # async fn example() -> campus_link::Result<()> {
/// let context = RealtimeContext::builder()
///     .config(RealtimeConfig::from_file("realtime.toml")?)
///     .token_store(FileTokenStore::new("session.json"))
///     .invalidator(|key: &QueryKey| println!("refetch {}", key))
///     .build()?;
///
/// context.start();
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RealtimeContext {
    inner: Arc<ContextInner>,
}

impl RealtimeContext {
    pub fn builder() -> RealtimeContextBuilder {
        RealtimeContextBuilder::new()
    }

    pub fn config(&self) -> &RealtimeConfig {
        &self.inner.config
    }

    pub fn connection_manager(&self) -> &Arc<ConnectionManager> {
        &self.inner.connection_manager
    }

    pub fn deduplicator(&self) -> &EventDeduplicator {
        &self.inner.deduplicator
    }

    pub fn health(&self) -> &Arc<HealthMonitor> {
        &self.inner.health
    }

    pub fn invalidator(&self) -> &Arc<dyn QueryInvalidator> {
        &self.inner.invalidator
    }

    /// Start the background machinery: the health recovery scheduler and
    /// the termination hook that closes the connection once. Idempotent.
    pub fn start(&self) {
        self.inner.health.start_recovery_scheduler();
        self.inner.connection_manager.install_shutdown_hook();
    }

    /// Bind a view. Shorthand for [`SubscriptionBinder::new`].
    pub fn binder(&self, config: BinderConfig) -> SubscriptionBinder {
        SubscriptionBinder::new(self.clone(), config)
    }

    /// Stop the scheduler and close the connection.
    pub async fn shutdown(&self) {
        self.inner.health.stop_recovery_scheduler();
        self.inner.connection_manager.shutdown().await;
    }
}

impl std::fmt::Debug for RealtimeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeContext")
            .field("server_url", &self.inner.config.server_url)
            .field("connection_manager", &self.inner.connection_manager)
            .field("health", &self.inner.health)
            .finish()
    }
}

/// Builder for [`RealtimeContext`].
pub struct RealtimeContextBuilder {
    config: RealtimeConfig,
    token_store: Option<Arc<dyn TokenStore>>,
    transport: Option<Arc<dyn Transport>>,
    invalidator: Option<Arc<dyn QueryInvalidator>>,
    event_handlers: EventHandlers,
}

impl RealtimeContextBuilder {
    fn new() -> Self {
        Self {
            config: RealtimeConfig::default(),
            token_store: None,
            transport: None,
            invalidator: None,
            event_handlers: EventHandlers::default(),
        }
    }

    pub fn config(mut self, config: RealtimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the server base URL (shorthand for editing the config).
    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.config.server_url = url.into();
        self
    }

    /// Where the bearer token is read from. Defaults to an empty store
    /// (unauthenticated).
    pub fn token_store(mut self, store: impl TokenStore + 'static) -> Self {
        self.token_store = Some(Arc::new(store));
        self
    }

    pub fn shared_token_store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.token_store = Some(store);
        self
    }

    /// Override the transport. Defaults to [`WsTransport`].
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// The cache collaborator. Defaults to [`NoopInvalidator`].
    pub fn invalidator(mut self, invalidator: impl QueryInvalidator + 'static) -> Self {
        self.invalidator = Some(Arc::new(invalidator));
        self
    }

    pub fn shared_invalidator(mut self, invalidator: Arc<dyn QueryInvalidator>) -> Self {
        self.invalidator = Some(invalidator);
        self
    }

    /// Application-level connection lifecycle hooks. They run after the
    /// built-in logging, counting and health reporting.
    pub fn event_handlers(mut self, handlers: EventHandlers) -> Self {
        self.event_handlers = handlers;
        self
    }

    pub fn build(self) -> Result<RealtimeContext> {
        self.config.validate()?;

        let health = Arc::new(HealthMonitor::new(self.config.health.clone()));
        let token_store = self
            .token_store
            .unwrap_or_else(|| Arc::new(MemoryTokenStore::default()));
        let transport = self.transport.unwrap_or_else(|| Arc::new(WsTransport::new()));
        let invalidator = self
            .invalidator
            .unwrap_or_else(|| Arc::new(NoopInvalidator));

        let connection_manager = Arc::new(ConnectionManager::new(
            self.config.server_url.clone(),
            self.config.connection.clone(),
            transport,
            token_store,
            Arc::clone(&health),
            self.event_handlers,
        ));

        Ok(RealtimeContext {
            inner: Arc::new(ContextInner {
                deduplicator: EventDeduplicator::with_capacity(self.config.dedup_capacity),
                config: self.config,
                connection_manager,
                health,
                invalidator,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CampusLinkError;

    #[test]
    fn test_builder_defaults() {
        let context = RealtimeContext::builder().build().unwrap();
        assert_eq!(context.config().server_url, "http://localhost:3000");
        assert_eq!(context.deduplicator().capacity(), 1000);
        assert!(!context.health().should_use_fallback());
        assert_eq!(context.connection_manager().max_connect_attempts(), 5);
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let result = RealtimeContext::builder().server_url("ftp://nowhere").build();
        assert!(matches!(result, Err(CampusLinkError::ConfigurationError(_))));
    }

    #[test]
    fn test_clones_share_state() {
        let context = RealtimeContext::builder().build().unwrap();
        let other = context.clone();
        for _ in 0..3 {
            other.health().record_error("down");
        }
        assert!(context.health().should_use_fallback());
    }
}
