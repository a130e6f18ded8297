//! # campus-link
//!
//! Realtime connectivity layer for the campus client. Keeps views in sync
//! with server-side mutations over one shared event channel, and keeps them
//! fresh by polling whenever that channel is unusable.
//!
//! ## Pieces
//!
//! - [`ConnectionManager`]: owns the single [`SharedConnection`] of the
//!   process, creates it lazily and closes it exactly once
//! - [`EventDeduplicator`]: drops redelivered events
//! - [`HealthMonitor`]: counts failures, switches to polling fallback and
//!   schedules recovery
//! - [`SubscriptionBinder`]: per-view topic subscriptions mapped to cache
//!   invalidations
//! - [`PollingFallback`]: periodic invalidation while in fallback
//!
//! All of it hangs off a [`RealtimeContext`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use campus_link::{BinderConfig, MemoryTokenStore, QueryKey, RealtimeContext, Topics};
//!
//! # async fn example() -> campus_link::Result<()> {
//! let context = RealtimeContext::builder()
//!     .server_url("https://school.example.org")
//!     .token_store(MemoryTokenStore::new(Some("eyJhbGc...".to_string())))
//!     .invalidator(|key: &QueryKey| println!("refetch {}", key))
//!     .build()?;
//! context.start();
//!
//! let binder = context
//!     .binder(
//!         BinderConfig::new(QueryKey::new(["report_cards", "class-7b"]))
//!             .topics(Topics::new().table("report_cards").class_id("class-7b")),
//!     )
//!     .mount();
//!
//! // ... later, when the view goes away
//! binder.unmount().await;
//! context.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod cache;
pub mod config;
pub mod connection;
pub mod context;
pub mod dedup;
pub mod error;
pub mod event_handlers;
pub mod health;
pub mod models;
pub mod polling;
pub mod subscription;

pub use auth::{AuthProvider, FileTokenStore, MemoryTokenStore, TokenStore};
pub use cache::{NoopInvalidator, QueryInvalidator};
pub use config::{HealthConfig, RealtimeConfig};
pub use connection::{
    resolve_ws_url, ConnectionEvent, ConnectionManager, SharedConnection, Transport,
    TransportFrame, TransportStream, WsTransport,
};
pub use context::{RealtimeContext, RealtimeContextBuilder};
pub use dedup::{EventDeduplicator, DEFAULT_DEDUP_CAPACITY};
pub use error::{CampusLinkError, Result};
pub use event_handlers::{ConnectionError, DisconnectReason, EventHandlers};
pub use health::{FailureKind, HealthMonitor, HealthState, HealthStatus, RecoveryHandle};
pub use models::{
    ChannelEvent, ClientMessage, ConnectionOptions, EventName, InboundEvent, OperationKind,
    QueryKey, ServerEnvelope, TopicDescriptor, Topics,
};
pub use polling::PollingFallback;
pub use subscription::{BinderConfig, BinderHandle, OnEventCallback, SubscriptionBinder};
