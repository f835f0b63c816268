//! Transport seam between the adapter and the cloud session layer.
//!
//! The session layer (connect, publish, subscribe, TLS, transport-level
//! retries) lives behind [`CloudTransport`]. Everything it reports back
//! arrives as a [`TransportEvent`] on the adapter's inbound channel, never
//! reentrantly from inside a send call.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::event::DeliveryTag;
use crate::method::MethodResponse;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Failure reported by the transport for a single operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// No network is available right now.
    #[error("No network connection")]
    NoNetwork,

    /// Any other transport failure.
    #[error("Transport failure: {0}")]
    Failure(String),

    /// The transport has been closed.
    #[error("Transport is closed")]
    Closed,
}

/// Notification raised by the transport towards the adapter.
#[derive(Debug)]
pub enum TransportEvent {
    /// Delivery result of an earlier `send_telemetry` call.
    SendAck {
        success: bool,
        tag: Option<DeliveryTag>,
    },
    /// A desired-property document (full twin or delta) was received.
    DesiredProperties(String),
    /// The backend invoked a device method and waits for the response.
    MethodInvoked {
        method: String,
        payload: Vec<u8>,
        reply: oneshot::Sender<MethodResponse>,
    },
    /// Connectivity to the backend changed.
    ConnectionChanged(bool),
}

/// Cloud session layer used by the adapter.
#[async_trait]
pub trait CloudTransport: Send + Sync {
    /// Get the transport name.
    fn name(&self) -> &str;

    /// Initialize the session for the given device model.
    async fn initialize(&self, model_id: &str) -> TransportResult<()>;

    /// Enqueue a telemetry message.
    ///
    /// An `Ok` only means the message was accepted for delivery. The outcome
    /// arrives later as [`TransportEvent::SendAck`] carrying the same tag.
    async fn send_telemetry(
        &self,
        payload: String,
        tag: Option<DeliveryTag>,
    ) -> TransportResult<()>;

    /// Enqueue a reported-property update.
    async fn report_state(&self, payload: String) -> TransportResult<()>;

    /// Tear the session down. Called after the adapter's timer has stopped.
    async fn close(&self) {}
}

/// How [`LoopbackTransport`] acknowledges accepted telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckMode {
    /// Report every delivery as successful.
    Succeed,
    /// Report every delivery as failed.
    Fail,
    /// Do not acknowledge; the caller drives acks with [`LoopbackTransport::ack`].
    Manual,
}

/// Kind of message accepted by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Telemetry,
    ReportedState,
}

/// A message accepted by [`LoopbackTransport`].
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub id: Uuid,
    pub kind: MessageKind,
    pub payload: String,
    pub tag: Option<DeliveryTag>,
    pub sent_at: DateTime<Utc>,
}

impl SentMessage {
    /// Parse the payload back into JSON.
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.payload).unwrap_or(serde_json::Value::Null)
    }
}

/// In-process transport that loops acknowledgements back to the adapter.
///
/// Used by the CLI when no backend is attached and by tests. Accepted
/// messages are recorded; the network can be switched off to make sends
/// fail with [`TransportError::NoNetwork`].
///
/// Automatic acknowledgements are never dropped while the adapter runs.
/// When the inbound channel is full they are delivered from a spawned task,
/// so they may arrive after later inbound events.
pub struct LoopbackTransport {
    name: String,
    inbound: mpsc::Sender<TransportEvent>,
    online: AtomicBool,
    closed: AtomicBool,
    ack_mode: Mutex<AckMode>,
    model_id: Mutex<Option<String>>,
    sent: Mutex<Vec<SentMessage>>,
    attempts: AtomicU64,
    fail_initialize: AtomicBool,
}

impl LoopbackTransport {
    /// Create a loopback transport and the inbound receiver the adapter
    /// should be started with.
    pub fn channel(
        name: impl Into<String>,
        capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<TransportEvent>) {
        let (inbound, rx) = mpsc::channel(capacity.max(1));
        let transport = Arc::new(Self {
            name: name.into(),
            inbound,
            online: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            ack_mode: Mutex::new(AckMode::Succeed),
            model_id: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
            attempts: AtomicU64::new(0),
            fail_initialize: AtomicBool::new(false),
        });
        (transport, rx)
    }

    /// Switch the simulated network on or off.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::Relaxed);
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Relaxed)
    }

    pub fn set_ack_mode(&self, mode: AckMode) {
        *self.ack_mode.lock() = mode;
    }

    /// Make the next `initialize` call fail.
    pub fn fail_initialize(&self, fail: bool) {
        self.fail_initialize.store(fail, Ordering::Relaxed);
    }

    /// Model id passed to `initialize`, if it was called.
    pub fn model_id(&self) -> Option<String> {
        self.model_id.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    /// Every accepted message, oldest first.
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().clone()
    }

    /// Accepted telemetry messages carrying a delivery tag.
    pub fn tagged(&self) -> Vec<SentMessage> {
        self.sent
            .lock()
            .iter()
            .filter(|m| m.tag.is_some())
            .cloned()
            .collect()
    }

    /// Accepted reported-property updates.
    pub fn reported(&self) -> Vec<SentMessage> {
        self.sent
            .lock()
            .iter()
            .filter(|m| m.kind == MessageKind::ReportedState)
            .cloned()
            .collect()
    }

    /// Number of telemetry sends attempted, including rejected ones.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Acknowledge a delivery by hand (for [`AckMode::Manual`]).
    pub async fn ack(&self, success: bool, tag: Option<DeliveryTag>) -> TransportResult<()> {
        self.push(TransportEvent::SendAck { success, tag }).await
    }

    /// Deliver a desired-property document to the adapter.
    pub async fn push_desired_properties(&self, document: impl Into<String>) -> TransportResult<()> {
        self.push(TransportEvent::DesiredProperties(document.into()))
            .await
    }

    /// Report a connectivity change to the adapter.
    pub async fn push_connection_changed(&self, connected: bool) -> TransportResult<()> {
        self.push(TransportEvent::ConnectionChanged(connected)).await
    }

    /// Invoke a device method and wait for the adapter's response.
    pub async fn invoke_method(
        &self,
        method: impl Into<String>,
        payload: impl Into<Vec<u8>>,
    ) -> TransportResult<MethodResponse> {
        let (reply, rx) = oneshot::channel();
        self.push(TransportEvent::MethodInvoked {
            method: method.into(),
            payload: payload.into(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| TransportError::Closed)
    }

    async fn push(&self, event: TransportEvent) -> TransportResult<()> {
        self.inbound
            .send(event)
            .await
            .map_err(|_| TransportError::Closed)
    }

    fn accept(&self, kind: MessageKind, payload: String, tag: Option<DeliveryTag>) {
        self.sent.lock().push(SentMessage {
            id: Uuid::new_v4(),
            kind,
            payload,
            tag,
            sent_at: Utc::now(),
        });
    }

    fn check_available(&self) -> TransportResult<()> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        if !self.is_online() {
            return Err(TransportError::NoNetwork);
        }
        Ok(())
    }
}

#[async_trait]
impl CloudTransport for LoopbackTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn initialize(&self, model_id: &str) -> TransportResult<()> {
        if self.fail_initialize.load(Ordering::Relaxed) {
            return Err(TransportError::Failure(format!(
                "{} refused model {}",
                self.name, model_id
            )));
        }
        *self.model_id.lock() = Some(model_id.to_string());
        Ok(())
    }

    async fn send_telemetry(
        &self,
        payload: String,
        tag: Option<DeliveryTag>,
    ) -> TransportResult<()> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        self.check_available()?;

        debug!("{} accepted telemetry: {}", self.name, payload);
        self.accept(MessageKind::Telemetry, payload, tag);

        let mode = *self.ack_mode.lock();
        let success = match mode {
            AckMode::Succeed => true,
            AckMode::Fail => false,
            AckMode::Manual => return Ok(()),
        };
        // Queued, so the adapter sees the ack only after this call returns.
        // The adapter is the only reader and is busy inside this call, so a
        // full channel is handed to a task instead of waiting here.
        match self.inbound.try_send(TransportEvent::SendAck { success, tag }) {
            Ok(()) => {}
            Err(TrySendError::Full(ack)) => {
                debug!("{} inbound channel full, deferring acknowledgement", self.name);
                let inbound = self.inbound.clone();
                let name = self.name.clone();
                tokio::spawn(async move {
                    if inbound.send(ack).await.is_err() {
                        warn!("{} dropped delivery acknowledgement: adapter stopped", name);
                    }
                });
            }
            Err(TrySendError::Closed(_)) => {
                warn!("{} dropped delivery acknowledgement: adapter stopped", self.name);
            }
        }
        Ok(())
    }

    async fn report_state(&self, payload: String) -> TransportResult<()> {
        self.check_available()?;

        debug!("{} accepted reported state: {}", self.name, payload);
        self.accept(MessageKind::ReportedState, payload, None);
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
        debug!("{} closed", self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::PendingEvent;

    #[tokio::test]
    async fn test_loopback_acks_after_send() {
        let (transport, mut rx) = LoopbackTransport::channel("loopback", 8);
        let tag = Some(DeliveryTag::Event(PendingEvent::AppRestart));

        transport
            .send_telemetry("{\"AppRestart\":true}".to_string(), tag)
            .await
            .unwrap();

        match rx.recv().await {
            Some(TransportEvent::SendAck { success, tag: acked }) => {
                assert!(success);
                assert_eq!(acked, tag);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(transport.tagged().len(), 1);
    }

    #[tokio::test]
    async fn test_loopback_full_channel_defers_ack() {
        let (transport, mut rx) = LoopbackTransport::channel("loopback", 1);
        let first = Some(DeliveryTag::Event(PendingEvent::AppRestart));
        let second = Some(DeliveryTag::Event(PendingEvent::UpdateInstalling));

        transport.send_telemetry("{}".to_string(), first).await.unwrap();
        transport.send_telemetry("{}".to_string(), second).await.unwrap();

        let mut acked = Vec::new();
        for _ in 0..2 {
            match rx.recv().await {
                Some(TransportEvent::SendAck { success, tag }) => {
                    assert!(success);
                    acked.push(tag);
                }
                other => panic!("unexpected event: {:?}", other),
            }
        }
        assert_eq!(acked, vec![first, second]);
    }

    #[tokio::test]
    async fn test_loopback_offline_rejects() {
        let (transport, mut rx) = LoopbackTransport::channel("loopback", 8);
        transport.set_online(false);

        let result = transport.send_telemetry("{}".to_string(), None).await;

        assert_eq!(result, Err(TransportError::NoNetwork));
        assert_eq!(transport.attempts(), 1);
        assert!(transport.sent().is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_loopback_manual_mode_does_not_ack() {
        let (transport, mut rx) = LoopbackTransport::channel("loopback", 8);
        transport.set_ack_mode(AckMode::Manual);

        transport.send_telemetry("{}".to_string(), None).await.unwrap();

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_loopback_initialize_records_model() {
        let (transport, _rx) = LoopbackTransport::channel("loopback", 8);

        transport.initialize("dtmi:test;1").await.unwrap();
        assert_eq!(transport.model_id().as_deref(), Some("dtmi:test;1"));

        transport.fail_initialize(true);
        assert!(transport.initialize("dtmi:test;1").await.is_err());
    }

    #[tokio::test]
    async fn test_loopback_closed_rejects_reports() {
        let (transport, _rx) = LoopbackTransport::channel("loopback", 8);
        transport.close().await;

        let result = transport.report_state("{}".to_string()).await;
        assert_eq!(result, Err(TransportError::Closed));
    }
}
