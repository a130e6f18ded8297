//! End-to-end fallback and recovery: failures push the health monitor into
//! fallback, binders poll, and the recovery scheduler brings them back onto
//! the realtime channel once the server is reachable again.

use campus_link::{BinderConfig, FailureKind, HealthState, QueryKey, Topics};
use std::time::Duration;

mod common;
use common::{context, table_change, wait_until, MockTransport, RecordingInvalidator};

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test(start_paused = true)]
async fn test_recovery_resubscribes_binders() {
    let transport = MockTransport::new();
    transport.fail_opens(Some("connection refused"));
    let invalidator = RecordingInvalidator::new();
    let ctx = context(&transport, &invalidator);
    ctx.health().start_recovery_scheduler();
    let key = QueryKey::from("attendance");

    let binder = ctx
        .binder(BinderConfig::new(key.clone()).topics(Topics::new().table("attendance")))
        .mount();

    assert!(wait_until(WAIT, || binder.is_polling()).await);
    assert_eq!(ctx.health().state(), HealthState::Fallback);
    assert_eq!(ctx.health().status().fallback_cause, Some(FailureKind::Generic));

    // Server comes back; the scheduler notices once the cooldown has passed.
    transport.fail_opens(None);
    assert!(wait_until(Duration::from_secs(90), || binder.is_connected()).await);
    assert!(!binder.is_polling());
    assert!(!ctx.health().should_use_fallback());
    assert!(ctx.health().status().last_recovery_attempt.is_some());

    let conn = transport.latest().unwrap();
    assert_eq!(conn.sent_names(), vec!["subscribe:table"]);
    let before = invalidator.count(&key);
    conn.push_event("table_change", table_change("a-1", "attendance"));
    assert!(wait_until(WAIT, || invalidator.count(&key) == before + 1).await);

    binder.unmount().await;
    ctx.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_limit_failures_classified() {
    let transport = MockTransport::new();
    transport.fail_opens(Some("Too many connections for this tenant"));
    let invalidator = RecordingInvalidator::new();
    let ctx = context(&transport, &invalidator);

    let binder = ctx
        .binder(BinderConfig::new("grades").topics(Topics::new().channel("grades")))
        .mount();

    assert!(wait_until(WAIT, || ctx.health().should_use_fallback()).await);
    let status = ctx.health().status();
    assert_eq!(status.fallback_cause, Some(FailureKind::ConnectionLimit));
    assert!(status.failed_connections >= 3);
    assert!(!status.connected);

    binder.unmount().await;
}

#[tokio::test(start_paused = true)]
async fn test_successful_connect_leaves_fallback() {
    let transport = MockTransport::new();
    let invalidator = RecordingInvalidator::new();
    let ctx = context(&transport, &invalidator);

    for _ in 0..3 {
        ctx.health().record_error("simulated outage");
    }
    assert!(ctx.health().should_use_fallback());

    let binder = ctx
        .binder(BinderConfig::new("users").topics(Topics::new().table("users")))
        .mount();

    // The connect is reported as a success, which ends fallback at once.
    assert!(wait_until(WAIT, || binder.is_connected()).await);
    assert!(!ctx.health().should_use_fallback());
    assert_eq!(ctx.health().status().consecutive_errors, 0);
    assert!(wait_until(WAIT, || !binder.is_polling()).await);

    binder.unmount().await;
}

#[tokio::test(start_paused = true)]
async fn test_reset_notifies_binders() {
    let transport = MockTransport::new();
    let invalidator = RecordingInvalidator::new();
    let ctx = context(&transport, &invalidator);

    let binder = ctx
        .binder(BinderConfig::new("users").topics(Topics::new().table("users")))
        .mount();
    assert!(wait_until(WAIT, || binder.is_connected()).await);
    let conn = transport.latest().unwrap();

    // A reset fires the recovery callbacks; a connected binder resubscribes.
    ctx.health().reset();
    assert!(wait_until(WAIT, || conn.sent_names().len() == 2).await);
    assert_eq!(conn.sent_names(), vec!["subscribe:table", "subscribe:table"]);
    assert_eq!(transport.open_count(), 1);

    binder.unmount().await;
}
