//! Single-task event loop driving a [`CloudAdapter`].
//!
//! The loop owns the adapter and handles one message at a time: the retry
//! tick, transport notifications and domain requests from [`CloudHandle`].
//! Nothing else touches adapter state, so no locking is needed.
//!
//! On shutdown the periodic timer is dropped first and the transport is
//! closed afterwards, so no tick can reach a closed transport.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::adapter::{CloudAdapter, CloudStatus};
use crate::error::{CloudError, CloudResult};
use crate::scheduler::TickOutcome;
use crate::telemetry::Telemetry;
use crate::transport::TransportEvent;

type Reply<T> = oneshot::Sender<T>;

/// Domain request forwarded into the loop.
enum Request {
    SignalNoUpdateAvailable,
    SignalUpdateInstalling,
    SendTelemetry {
        reading: Telemetry,
        reply: Reply<CloudResult<()>>,
    },
    SendThermometerMoved {
        reply: Reply<CloudResult<()>>,
    },
    SendDeviceDetails {
        serial_number: String,
        reply: Reply<CloudResult<()>>,
    },
    ReportUploadEnabled {
        enabled: bool,
        reply: Reply<CloudResult<()>>,
    },
    Status {
        reply: Reply<CloudStatus>,
    },
}

impl CloudAdapter {
    /// Initialize the transport and start the event loop.
    ///
    /// `inbound` is the channel the transport reports acknowledgements,
    /// desired properties, method invocations and connectivity on.
    pub async fn start(self, inbound: mpsc::Receiver<TransportEvent>) -> CloudResult<CloudHandle> {
        self.initialize_transport().await?;

        let (requests, request_rx) = mpsc::channel(self.config().channel_capacity);
        let (shutdown, shutdown_rx) = oneshot::channel();

        info!(
            "Starting cloud adapter, checking pending events every {:?}",
            self.scheduler().period()
        );
        let task = tokio::spawn(run(self, inbound, request_rx, shutdown_rx));

        Ok(CloudHandle {
            requests,
            shutdown,
            task,
        })
    }
}

async fn run(
    mut adapter: CloudAdapter,
    mut inbound: mpsc::Receiver<TransportEvent>,
    mut requests: mpsc::Receiver<Request>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut timer = adapter.scheduler().timer();
    let mut inbound_open = true;

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => break,

            event = inbound.recv(), if inbound_open => match event {
                Some(event) => adapter.handle_transport_event(event).await,
                None => {
                    debug!("Transport notification channel closed");
                    inbound_open = false;
                }
            },

            _ = timer.tick() => {
                if let TickOutcome::Failed { event, error } = adapter.on_event_tick().await {
                    debug!("Pending {} deferred to next tick: {}", event, error);
                }
            }

            request = requests.recv() => match request {
                Some(request) => handle_request(&mut adapter, request).await,
                None => break,
            },
        }
    }

    drop(timer);
    adapter.transport().close().await;
    info!("Cloud adapter stopped");
}

async fn handle_request(adapter: &mut CloudAdapter, request: Request) {
    match request {
        Request::SignalNoUpdateAvailable => adapter.signal_no_update_available(),
        Request::SignalUpdateInstalling => adapter.signal_update_installing(),
        Request::SendTelemetry { reading, reply } => {
            let _ = reply.send(adapter.send_telemetry(reading).await);
        }
        Request::SendThermometerMoved { reply } => {
            let _ = reply.send(adapter.send_thermometer_moved().await);
        }
        Request::SendDeviceDetails {
            serial_number,
            reply,
        } => {
            let _ = reply.send(adapter.send_device_details(&serial_number).await);
        }
        Request::ReportUploadEnabled { enabled, reply } => {
            let _ = reply.send(adapter.report_upload_enabled(enabled).await);
        }
        Request::Status { reply } => {
            let _ = reply.send(adapter.status());
        }
    }
}

/// Handle to a running cloud adapter.
///
/// Dropping the handle stops the loop as well; [`CloudHandle::shutdown`]
/// additionally waits for it to finish.
pub struct CloudHandle {
    requests: mpsc::Sender<Request>,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl CloudHandle {
    /// Signal that no update is available. Delivered by the retry tick.
    pub async fn signal_no_update_available(&self) -> CloudResult<()> {
        self.send(Request::SignalNoUpdateAvailable).await
    }

    /// Signal that an update is installing. Delivered by the retry tick.
    pub async fn signal_update_installing(&self) -> CloudResult<()> {
        self.send(Request::SignalUpdateInstalling).await
    }

    /// Send a telemetry reading.
    pub async fn send_telemetry(&self, reading: Telemetry) -> CloudResult<()> {
        self.call(|reply| Request::SendTelemetry { reading, reply })
            .await?
    }

    pub async fn send_thermometer_moved(&self) -> CloudResult<()> {
        self.call(|reply| Request::SendThermometerMoved { reply })
            .await?
    }

    /// Report static device identity.
    pub async fn send_device_details(&self, serial_number: impl Into<String>) -> CloudResult<()> {
        let serial_number = serial_number.into();
        self.call(|reply| Request::SendDeviceDetails {
            serial_number,
            reply,
        })
        .await?
    }

    /// Acknowledge the applied upload-enabled state with a version stamp.
    pub async fn report_upload_enabled(&self, enabled: bool) -> CloudResult<()> {
        self.call(|reply| Request::ReportUploadEnabled { enabled, reply })
            .await?
    }

    /// Snapshot of the adapter state.
    pub async fn status(&self) -> CloudResult<CloudStatus> {
        self.call(|reply| Request::Status { reply }).await
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop the timer, close the transport and wait for the loop to exit.
    pub async fn shutdown(self) -> CloudResult<()> {
        let CloudHandle { shutdown, task, .. } = self;
        let _ = shutdown.send(());
        task.await.map_err(|e| {
            error!("Cloud adapter task failed: {}", e);
            CloudError::Stopped
        })
    }

    async fn send(&self, request: Request) -> CloudResult<()> {
        self.requests
            .send(request)
            .await
            .map_err(|_| CloudError::Stopped)
    }

    async fn call<T>(&self, make: impl FnOnce(Reply<T>) -> Request) -> CloudResult<T> {
        let (reply, rx) = oneshot::channel();
        self.send(make(reply)).await?;
        rx.await.map_err(|_| CloudError::Stopped)
    }
}
