//! Device-twin synchronization for a connected thermometer.
//!
//! Provides:
//! - Pending status events with fixed-priority, fixed-cadence retry
//! - Delivery acknowledgement routing
//! - Desired-property reconciliation with a monotonic version
//! - Device method dispatch with bounded payloads
//! - A transport seam and an in-process loopback transport
//! - A single-task runtime that owns all adapter state

pub mod ack;
pub mod adapter;
pub mod config;
pub mod error;
pub mod event;
pub mod handlers;
pub mod method;
pub mod runtime;
pub mod scheduler;
pub mod telemetry;
pub mod transport;
pub mod twin;

// Re-exports
pub use ack::{handle_send_ack, AckOutcome};

pub use adapter::{CloudAdapter, CloudStatus};

pub use config::CloudConfig;

pub use error::{CloudError, CloudResult, ExitCode};

pub use event::{DeliveryTag, EventRegistry, PendingEvent};

pub use handlers::CloudHandlers;

pub use method::{dispatch, BoundedPayload, DeviceMethod, MethodResponse};

pub use runtime::CloudHandle;

pub use scheduler::{RetryScheduler, TickOutcome};

pub use telemetry::Telemetry;

pub use transport::{
    AckMode, CloudTransport, LoopbackTransport, MessageKind, SentMessage, TransportError,
    TransportEvent, TransportResult,
};

pub use twin::{DesiredVersion, Reconciliation, TwinReconciler};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
