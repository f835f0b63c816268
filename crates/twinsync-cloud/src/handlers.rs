//! Domain callbacks raised by the adapter.
//!
//! Every handler is optional. An unregistered handler falls back to a
//! warning log so unexpected cloud traffic is still visible.

use std::ffi::CStr;

use tracing::warn;

type BoolHandler = Box<dyn Fn(bool) + Send + Sync>;
type AlertHandler = Box<dyn Fn(&CStr) + Send + Sync>;

/// Registered domain handlers.
#[derive(Default)]
pub struct CloudHandlers {
    upload_enabled_changed: Option<BoolHandler>,
    display_alert: Option<AlertHandler>,
    connection_changed: Option<BoolHandler>,
}

impl CloudHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called with the desired upload-enabled state from every reconciled
    /// document that carries it.
    pub fn with_upload_enabled_changed<F>(mut self, handler: F) -> Self
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.upload_enabled_changed = Some(Box::new(handler));
        self
    }

    /// Called with the alert text of a `displayAlert` invocation, as the
    /// bounded NUL-terminated payload. The bytes are passed through as
    /// received and need not be valid UTF-8.
    pub fn with_display_alert<F>(mut self, handler: F) -> Self
    where
        F: Fn(&CStr) + Send + Sync + 'static,
    {
        self.display_alert = Some(Box::new(handler));
        self
    }

    /// Called whenever connectivity to the backend changes.
    pub fn with_connection_changed<F>(mut self, handler: F) -> Self
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.connection_changed = Some(Box::new(handler));
        self
    }

    pub(crate) fn upload_enabled_changed(&self, enabled: bool) {
        match &self.upload_enabled_changed {
            Some(handler) => handler(enabled),
            None => warn!(
                "Cloud - no handler registered for TelemetryUploadEnabled - status {}",
                enabled
            ),
        }
    }

    pub(crate) fn display_alert(&self, message: &CStr) {
        match &self.display_alert {
            Some(handler) => handler(message),
            None => warn!(
                "Cloud - no handler registered for DisplayAlert - message {}",
                message.to_string_lossy()
            ),
        }
    }

    pub(crate) fn connection_changed(&self, connected: bool) {
        match &self.connection_changed {
            Some(handler) => handler(connected),
            None => warn!(
                "Cloud - no handler registered for ConnectionChanged - status {}",
                connected
            ),
        }
    }
}

impl std::fmt::Debug for CloudHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudHandlers")
            .field("upload_enabled_changed", &self.upload_enabled_changed.is_some())
            .field("display_alert", &self.display_alert.is_some())
            .field("connection_changed", &self.connection_changed.is_some())
            .finish()
    }
}
