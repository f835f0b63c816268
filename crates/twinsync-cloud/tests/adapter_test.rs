//! Adapter entry point tests.
//!
//! Calls the adapter entry points directly, one at a time, the way the
//! runtime loop does:
//! - Signal, tick, acknowledge and re-tick
//! - Acknowledgements only clear their own event
//! - Version counter never decreases

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use twinsync_cloud::{
    AckMode, AckOutcome, CloudAdapter, CloudConfig, CloudHandlers, LoopbackTransport,
    PendingEvent, TickOutcome, TransportError,
};

/// Helper to create an adapter whose acknowledgements are driven by hand.
fn create_test_adapter(handlers: CloudHandlers) -> (CloudAdapter, Arc<LoopbackTransport>) {
    let (transport, _inbound) = LoopbackTransport::channel("loopback", 16);
    transport.set_ack_mode(AckMode::Manual);
    let adapter = CloudAdapter::new(CloudConfig::default(), transport.clone(), handlers).unwrap();
    (adapter, transport)
}

#[tokio::test]
async fn test_update_installing_lifecycle() {
    let (mut adapter, transport) = create_test_adapter(CloudHandlers::new());
    // Clear the startup event so only UpdateInstalling is in play
    adapter.on_send_ack(true, Some(PendingEvent::AppRestart.into()));

    adapter.signal_update_installing();
    assert!(adapter.is_pending(PendingEvent::UpdateInstalling));

    let outcome = adapter.on_event_tick().await;
    assert_eq!(outcome, TickOutcome::Sent(PendingEvent::UpdateInstalling));
    assert_eq!(
        transport.tagged()[0].json(),
        serde_json::json!({"UpdateInstalling": true})
    );

    let ack = adapter.on_send_ack(true, Some(PendingEvent::UpdateInstalling.into()));
    assert_eq!(ack, AckOutcome::Cleared(PendingEvent::UpdateInstalling));
    assert!(!adapter.is_pending(PendingEvent::UpdateInstalling));

    assert_eq!(adapter.on_event_tick().await, TickOutcome::Idle);
    assert_eq!(transport.tagged().len(), 1);
}

#[tokio::test]
async fn test_signal_twice_sends_once_per_tick() {
    let (mut adapter, transport) = create_test_adapter(CloudHandlers::new());

    adapter.signal_no_update_available();
    adapter.signal_no_update_available();
    assert_eq!(adapter.registry().pending_count(), 2);

    adapter.on_event_tick().await;
    assert_eq!(transport.attempts(), 1);
}

#[tokio::test]
async fn test_priority_sends_only_highest() {
    let (mut adapter, transport) = create_test_adapter(CloudHandlers::new());
    adapter.signal_no_update_available();

    let outcome = adapter.on_event_tick().await;

    assert_eq!(outcome.attempted(), Some(PendingEvent::NoUpdateAvailable));
    assert_eq!(transport.tagged().len(), 1);
    assert!(adapter.is_pending(PendingEvent::AppRestart));
}

#[tokio::test]
async fn test_failed_send_still_holds_back_lower_priority() {
    let (mut adapter, transport) = create_test_adapter(CloudHandlers::new());
    adapter.signal_no_update_available();
    transport.set_online(false);

    for tick in 1..=4 {
        let outcome = adapter.on_event_tick().await;

        assert_eq!(
            outcome,
            TickOutcome::Failed {
                event: PendingEvent::NoUpdateAvailable,
                error: TransportError::NoNetwork,
            }
        );
        assert_eq!(transport.attempts(), tick);
    }
    assert_eq!(
        adapter.status().pending,
        vec![PendingEvent::NoUpdateAvailable, PendingEvent::AppRestart]
    );
}

#[tokio::test]
async fn test_failed_ack_then_retry() {
    let (mut adapter, transport) = create_test_adapter(CloudHandlers::new());

    adapter.on_event_tick().await;
    let ack = adapter.on_send_ack(false, Some(PendingEvent::AppRestart.into()));
    assert_eq!(ack, AckOutcome::StillPending(PendingEvent::AppRestart));

    let outcome = adapter.on_event_tick().await;
    assert_eq!(outcome, TickOutcome::Sent(PendingEvent::AppRestart));
    assert_eq!(transport.tagged().len(), 2);
}

#[tokio::test]
async fn test_ack_clears_only_its_event() {
    let (mut adapter, _transport) = create_test_adapter(CloudHandlers::new());
    adapter.signal_update_installing();
    adapter.signal_no_update_available();

    adapter.on_send_ack(true, Some(PendingEvent::UpdateInstalling.into()));

    assert_eq!(
        adapter.status().pending,
        vec![PendingEvent::NoUpdateAvailable, PendingEvent::AppRestart]
    );
}

#[tokio::test]
async fn test_untagged_ack_changes_nothing() {
    let (mut adapter, _transport) = create_test_adapter(CloudHandlers::new());
    let before = adapter.status();

    assert_eq!(adapter.on_send_ack(true, None), AckOutcome::Untracked);
    assert_eq!(adapter.status(), before);
}

#[tokio::test]
async fn test_version_counter_never_decreases() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let handlers = CloudHandlers::new().with_upload_enabled_changed(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let (mut adapter, _transport) = create_test_adapter(handlers);

    let mut last = adapter.desired_version();
    for version in [3, 7, 2, 7, 0, 12, 5] {
        let document = format!(
            r#"{{"desired":{{"telemetryUploadEnabled":true,"$version":{}}}}}"#,
            version
        );
        adapter.on_desired_properties(&document);
        assert!(adapter.desired_version() >= last);
        last = adapter.desired_version();
    }

    assert_eq!(adapter.desired_version(), 12);
    assert_eq!(calls.load(Ordering::SeqCst), 7);
}

#[tokio::test]
async fn test_malformed_document_changes_nothing() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let handlers = CloudHandlers::new().with_upload_enabled_changed(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let (mut adapter, _transport) = create_test_adapter(handlers);

    assert!(adapter
        .on_desired_properties(r#"{"desired":{"telemetryUploadEnabled":tru"#)
        .is_none());

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(adapter.desired_version(), 1);
}

#[tokio::test]
async fn test_method_dispatch_through_adapter() {
    let (adapter, _transport) = create_test_adapter(CloudHandlers::new());

    let handled = adapter.on_method_invoked("displayAlert", b"hi");
    let unhandled = adapter.on_method_invoked("selfDestruct", b"");

    assert!(handled.is_handled());
    assert_eq!(unhandled.status, -1);
    assert_eq!(unhandled.body_str(), "{}");
}
