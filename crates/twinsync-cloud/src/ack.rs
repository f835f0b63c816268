//! Delivery acknowledgement handling.
//!
//! Routes the transport's asynchronous delivery result back to the pending
//! flag it was sent for. Only a successful delivery clears a flag.

use tracing::debug;

use crate::event::{DeliveryTag, EventRegistry, PendingEvent};

/// Effect of one acknowledgement on the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// Delivery succeeded and the flag was cleared.
    Cleared(PendingEvent),
    /// Delivery failed; the flag stays set for the next tick.
    StillPending(PendingEvent),
    /// The acknowledged message was not a pending event (plain telemetry).
    Untracked,
}

/// Apply a delivery acknowledgement to the registry.
pub fn handle_send_ack(
    registry: &mut EventRegistry,
    success: bool,
    tag: Option<DeliveryTag>,
) -> AckOutcome {
    let Some(tag) = tag else {
        return AckOutcome::Untracked;
    };
    let event = tag.event();

    if success {
        debug!("{} event sent to cloud OK", event);
        registry.clear(event);
        AckOutcome::Cleared(event)
    } else {
        debug!("{} event send failed, will retry", event);
        AckOutcome::StillPending(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_clears_only_tagged_event() {
        let mut registry = EventRegistry::new();
        registry.signal(PendingEvent::UpdateInstalling);

        let outcome = handle_send_ack(
            &mut registry,
            true,
            Some(PendingEvent::UpdateInstalling.into()),
        );

        assert_eq!(outcome, AckOutcome::Cleared(PendingEvent::UpdateInstalling));
        assert!(!registry.is_pending(PendingEvent::UpdateInstalling));
        assert!(registry.is_pending(PendingEvent::AppRestart));
    }

    #[test]
    fn test_failure_keeps_flag() {
        let mut registry = EventRegistry::new();

        let outcome = handle_send_ack(&mut registry, false, Some(PendingEvent::AppRestart.into()));

        assert_eq!(outcome, AckOutcome::StillPending(PendingEvent::AppRestart));
        assert!(registry.is_pending(PendingEvent::AppRestart));
    }

    #[test]
    fn test_untagged_ack_is_ignored() {
        let mut registry = EventRegistry::new();
        let before = registry.clone();

        assert_eq!(handle_send_ack(&mut registry, true, None), AckOutcome::Untracked);
        assert_eq!(handle_send_ack(&mut registry, false, None), AckOutcome::Untracked);
        assert_eq!(registry, before);
    }

    #[test]
    fn test_success_for_already_clear_event() {
        let mut registry = EventRegistry::empty();

        let outcome = handle_send_ack(
            &mut registry,
            true,
            Some(PendingEvent::NoUpdateAvailable.into()),
        );

        assert_eq!(outcome, AckOutcome::Cleared(PendingEvent::NoUpdateAvailable));
        assert_eq!(registry.pending_count(), 0);
    }
}
