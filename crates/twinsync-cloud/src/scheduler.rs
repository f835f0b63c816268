//! Fixed-cadence retry of pending events.
//!
//! Every tick sends at most one pending event: the first one pending in
//! [`PendingEvent::PRIORITY`] order. Lower priority events wait for a later
//! tick even when that send fails, so a high priority event that keeps
//! failing holds back the others. There is no backoff; the cadence is the
//! same for the first failure and the hundredth.

use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::error::{CloudError, CloudResult};
use crate::event::{EventRegistry, PendingEvent};
use crate::transport::TransportError;

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing was pending.
    Idle,
    /// The event was handed to the transport; its flag stays set until the
    /// acknowledgement arrives.
    Sent(PendingEvent),
    /// The transport refused the send; retried next tick.
    Failed {
        event: PendingEvent,
        error: TransportError,
    },
}

impl TickOutcome {
    /// Event attempted on this tick, if any.
    pub fn attempted(&self) -> Option<PendingEvent> {
        match self {
            TickOutcome::Idle => None,
            TickOutcome::Sent(event) | TickOutcome::Failed { event, .. } => Some(*event),
        }
    }
}

/// Periodic tick source and selection policy for pending events.
#[derive(Debug, Clone, Copy)]
pub struct RetryScheduler {
    period: Duration,
}

impl RetryScheduler {
    /// Create a scheduler ticking every `period`.
    ///
    /// A zero period cannot drive a timer and is reported as a timer
    /// creation failure.
    pub fn new(period: Duration) -> CloudResult<Self> {
        if period.is_zero() {
            return Err(CloudError::timer(
                "event check period must be greater than zero",
            ));
        }
        Ok(Self { period })
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Event to attempt on this tick.
    pub fn select(&self, registry: &EventRegistry) -> Option<PendingEvent> {
        registry.next_pending()
    }

    /// Create the periodic timer. The first tick fires one period from now.
    ///
    /// Must be called from within a tokio runtime.
    pub fn timer(&self) -> Interval {
        let mut interval = tokio::time::interval_at(Instant::now() + self.period, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    }
}
