//! Cloud adapter state and entry points.
//!
//! [`CloudAdapter`] owns every piece of process-wide state: the pending
//! event flags, the desired-property version and the domain handlers. Entry
//! points take `&mut self` and run to completion one at a time, so nothing is
//! shared and nothing is locked. [`crate::runtime`] drives these entry points
//! from a single task.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::ack::{handle_send_ack, AckOutcome};
use crate::config::CloudConfig;
use crate::error::{CloudError, CloudResult};
use crate::event::{DeliveryTag, EventRegistry, PendingEvent};
use crate::handlers::CloudHandlers;
use crate::method::{self, MethodResponse};
use crate::scheduler::{RetryScheduler, TickOutcome};
use crate::telemetry::{self, Telemetry};
use crate::transport::{CloudTransport, TransportEvent};
use crate::twin::{self, DesiredVersion, Reconciliation, TwinReconciler};

/// Point-in-time view of the adapter state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CloudStatus {
    /// Pending events, highest priority first.
    pub pending: Vec<PendingEvent>,
    /// Stored desired-property version.
    pub desired_version: u32,
    /// Last connectivity reported by the transport.
    pub connected: bool,
}

/// Bridges a cloud transport to domain handlers.
pub struct CloudAdapter {
    config: CloudConfig,
    transport: Arc<dyn CloudTransport>,
    handlers: CloudHandlers,
    registry: EventRegistry,
    version: DesiredVersion,
    reconciler: TwinReconciler,
    scheduler: RetryScheduler,
    connected: bool,
}

impl CloudAdapter {
    /// Create an adapter. `AppRestart` starts out pending.
    ///
    /// Fails when the configuration is invalid or the tick period cannot
    /// drive a timer.
    pub fn new(
        config: CloudConfig,
        transport: Arc<dyn CloudTransport>,
        handlers: CloudHandlers,
    ) -> CloudResult<Self> {
        config.validate()?;
        let scheduler = RetryScheduler::new(config.event_check_interval())?;
        let reconciler = TwinReconciler::new(config.upload_enabled_property.clone());

        Ok(Self {
            config,
            transport,
            handlers,
            registry: EventRegistry::new(),
            version: DesiredVersion::new(),
            reconciler,
            scheduler,
            connected: false,
        })
    }

    pub fn config(&self) -> &CloudConfig {
        &self.config
    }

    pub fn transport(&self) -> &Arc<dyn CloudTransport> {
        &self.transport
    }

    pub fn scheduler(&self) -> RetryScheduler {
        self.scheduler
    }

    pub fn registry(&self) -> &EventRegistry {
        &self.registry
    }

    pub fn is_pending(&self, event: PendingEvent) -> bool {
        self.registry.is_pending(event)
    }

    pub fn desired_version(&self) -> u32 {
        self.version.current()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn status(&self) -> CloudStatus {
        CloudStatus {
            pending: self.registry.pending(),
            desired_version: self.version.current(),
            connected: self.connected,
        }
    }

    /// Initialize the transport for the configured device model.
    pub async fn initialize_transport(&self) -> CloudResult<()> {
        self.transport
            .initialize(&self.config.model_id)
            .await
            .map_err(CloudError::TransportInit)?;
        info!(
            "Cloud transport {} initialized for model {}",
            self.transport.name(),
            self.config.model_id
        );
        Ok(())
    }

    // ========== Domain operations ==========

    /// Queue a "no update available" notification for delivery.
    pub fn signal_no_update_available(&mut self) {
        self.registry.signal(PendingEvent::NoUpdateAvailable);
    }

    /// Queue an "update installing" notification for delivery.
    pub fn signal_update_installing(&mut self) {
        self.registry.signal(PendingEvent::UpdateInstalling);
    }

    /// Send a telemetry reading. Not retried.
    pub async fn send_telemetry(&self, reading: Telemetry) -> CloudResult<()> {
        let payload = serde_json::to_string(&reading)?;
        self.transport.send_telemetry(payload, None).await?;
        Ok(())
    }

    /// Announce that the device was moved. Not retried.
    pub async fn send_thermometer_moved(&self) -> CloudResult<()> {
        let payload = telemetry::thermometer_moved_message().to_string();
        self.transport.send_telemetry(payload, None).await?;
        Ok(())
    }

    /// Report static device identity.
    pub async fn send_device_details(&self, serial_number: &str) -> CloudResult<()> {
        let payload = twin::device_details_report(serial_number).to_string();
        self.transport.report_state(payload).await?;
        Ok(())
    }

    /// Acknowledge the applied upload-enabled state.
    ///
    /// The report is stamped with the current version, after which the
    /// counter advances by one whether or not the report is accepted.
    pub async fn report_upload_enabled(&mut self, enabled: bool) -> CloudResult<()> {
        let stamp = self.version.stamp();
        let payload = self
            .reconciler
            .upload_enabled_report(enabled, stamp)
            .to_string();
        self.transport.report_state(payload).await?;
        Ok(())
    }

    // ========== Transport entry points ==========

    /// Retry tick: attempt delivery of the highest priority pending event.
    pub async fn on_event_tick(&mut self) -> TickOutcome {
        let Some(event) = self.scheduler.select(&self.registry) else {
            return TickOutcome::Idle;
        };

        debug!("Trying to send {} event", event);
        let payload = telemetry::event_message(event).to_string();
        match self
            .transport
            .send_telemetry(payload, Some(DeliveryTag::Event(event)))
            .await
        {
            Ok(()) => TickOutcome::Sent(event),
            Err(error) => {
                debug!("{} event not sent, retrying next tick: {}", event, error);
                TickOutcome::Failed { event, error }
            }
        }
    }

    /// Delivery acknowledgement from the transport.
    pub fn on_send_ack(&mut self, success: bool, tag: Option<DeliveryTag>) -> AckOutcome {
        handle_send_ack(&mut self.registry, success, tag)
    }

    /// Desired-property document from the transport.
    pub fn on_desired_properties(&mut self, document: &str) -> Option<Reconciliation> {
        let reconciliation = self.reconciler.reconcile(document, &mut self.version)?;
        if let Some(enabled) = reconciliation.upload_enabled {
            self.handlers.upload_enabled_changed(enabled);
        }
        Some(reconciliation)
    }

    /// Device method invocation from the transport.
    pub fn on_method_invoked(&self, method_name: &str, payload: &[u8]) -> MethodResponse {
        method::dispatch(method_name, payload, &self.handlers)
    }

    /// Connectivity change from the transport.
    pub async fn on_connection_changed(&mut self, connected: bool) {
        info!("Cloud connection changed: connected={}", connected);
        self.connected = connected;
        self.handlers.connection_changed(connected);

        if !connected {
            return;
        }
        if let Some(serial) = self.config.serial_number.clone() {
            if let Err(e) = self.send_device_details(&serial).await {
                warn!("Failed to report device details: {}", e);
            }
        }
    }

    /// Route one transport notification to its entry point.
    pub async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::SendAck { success, tag } => {
                self.on_send_ack(success, tag);
            }
            TransportEvent::DesiredProperties(document) => {
                self.on_desired_properties(&document);
            }
            TransportEvent::MethodInvoked {
                method,
                payload,
                reply,
            } => {
                let response = self.on_method_invoked(&method, &payload);
                if reply.send(response).is_err() {
                    warn!("Response to method {} was dropped by the transport", method);
                }
            }
            TransportEvent::ConnectionChanged(connected) => {
                self.on_connection_changed(connected).await;
            }
        }
    }
}

impl std::fmt::Debug for CloudAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudAdapter")
            .field("transport", &self.transport.name())
            .field("registry", &self.registry)
            .field("version", &self.version)
            .field("connected", &self.connected)
            .field("handlers", &self.handlers)
            .finish()
    }
}
