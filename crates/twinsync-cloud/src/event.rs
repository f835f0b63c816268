//! One-shot notifications awaiting confirmed delivery.
//!
//! Each notification kind owns a single process-lifetime flag. A flag is set
//! by a domain signal and cleared only when the transport acknowledges a
//! successful delivery of that kind (see [`crate::ack`]).

use serde::{Deserialize, Serialize};

/// The closed set of one-shot notifications.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PendingEvent {
    /// The application (re)started. Pending from startup.
    AppRestart,
    /// An update check completed and nothing is available.
    NoUpdateAvailable,
    /// An update is being installed.
    UpdateInstalling,
}

impl PendingEvent {
    /// Delivery order evaluated by every retry tick, highest priority first.
    pub const PRIORITY: [PendingEvent; 3] = [
        PendingEvent::NoUpdateAvailable,
        PendingEvent::UpdateInstalling,
        PendingEvent::AppRestart,
    ];

    /// Name used as the message key on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            PendingEvent::AppRestart => "AppRestart",
            PendingEvent::NoUpdateAvailable => "NoUpdateAvailable",
            PendingEvent::UpdateInstalling => "UpdateInstalling",
        }
    }

    /// Rank in [`PendingEvent::PRIORITY`], 0 being the highest.
    pub fn priority(&self) -> usize {
        match self {
            PendingEvent::NoUpdateAvailable => 0,
            PendingEvent::UpdateInstalling => 1,
            PendingEvent::AppRestart => 2,
        }
    }

    fn slot(&self) -> usize {
        self.priority()
    }
}

impl std::fmt::Display for PendingEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Correlates a send attempt with its eventual acknowledgement.
///
/// Plain telemetry is sent with no tag at all (`Option<DeliveryTag>::None`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryTag {
    /// The message carries the named pending event.
    Event(PendingEvent),
}

impl DeliveryTag {
    /// The pending event this tag refers to.
    pub fn event(&self) -> PendingEvent {
        match self {
            DeliveryTag::Event(event) => *event,
        }
    }
}

impl From<PendingEvent> for DeliveryTag {
    fn from(event: PendingEvent) -> Self {
        DeliveryTag::Event(event)
    }
}

/// Pending flags for every [`PendingEvent`] kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRegistry {
    flags: [bool; 3],
}

impl EventRegistry {
    /// Registry as it looks at process start: only `AppRestart` is pending.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.signal(PendingEvent::AppRestart);
        registry
    }

    /// Registry with nothing pending.
    pub fn empty() -> Self {
        Self { flags: [false; 3] }
    }

    /// Mark `event` as pending. Signaling an already pending event has no
    /// further effect.
    pub fn signal(&mut self, event: PendingEvent) {
        self.flags[event.slot()] = true;
    }

    pub fn is_pending(&self, event: PendingEvent) -> bool {
        self.flags[event.slot()]
    }

    /// Highest priority pending event, if any.
    pub fn next_pending(&self) -> Option<PendingEvent> {
        PendingEvent::PRIORITY
            .into_iter()
            .find(|event| self.is_pending(*event))
    }

    /// All pending events in priority order.
    pub fn pending(&self) -> Vec<PendingEvent> {
        PendingEvent::PRIORITY
            .into_iter()
            .filter(|event| self.is_pending(*event))
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.flags.iter().filter(|flag| **flag).count()
    }

    // Only the acknowledgement handler clears flags.
    pub(crate) fn clear(&mut self, event: PendingEvent) {
        self.flags[event.slot()] = false;
    }
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::new()
    }
}
