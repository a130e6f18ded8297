//! Per-view subscriptions over the shared connection.

pub mod binder;

pub use binder::{BinderConfig, BinderHandle, OnEventCallback, SubscriptionBinder};
