//! Device method dispatch.
//!
//! Maps a backend-invoked method name onto a domain handler. The payload is
//! copied into a bounded, NUL-terminated buffer local to each invocation;
//! oversized payloads are truncated, never rejected.

use std::borrow::Cow;
use std::ffi::CStr;

use tracing::{debug, warn};

use crate::handlers::CloudHandlers;

/// Largest payload, in bytes, handed to a method handler.
pub const MAX_PAYLOAD_SIZE: usize = 512;

/// Status returned for a handled method.
pub const STATUS_OK: i32 = 200;

/// Status returned for a method nobody handles.
pub const STATUS_UNHANDLED: i32 = -1;

const ALERT_DISPLAYED_RESPONSE: &str = "\"Alert message displayed successfully.\"";
const UNHANDLED_RESPONSE: &str = "{}";

/// Methods this device understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceMethod {
    DisplayAlert,
}

impl DeviceMethod {
    /// Look up a method by its wire name (case sensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "displayAlert" => Some(DeviceMethod::DisplayAlert),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DeviceMethod::DisplayAlert => "displayAlert",
        }
    }
}

/// Method payload truncated to [`MAX_PAYLOAD_SIZE`] and NUL-terminated.
///
/// Copying stops at the first NUL byte of the input, like a C string copy,
/// so the content never contains an interior NUL.
pub struct BoundedPayload {
    buf: [u8; MAX_PAYLOAD_SIZE + 1],
    len: usize,
}

impl BoundedPayload {
    pub fn copy_from(payload: &[u8]) -> Self {
        let mut buf = [0u8; MAX_PAYLOAD_SIZE + 1];
        let limit = payload.len().min(MAX_PAYLOAD_SIZE);
        let len = payload[..limit]
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(limit);
        buf[..len].copy_from_slice(&payload[..len]);
        buf[len] = 0;
        Self { buf, len }
    }

    /// Content length, excluding the terminator.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Content including the trailing NUL.
    pub fn as_bytes_with_nul(&self) -> &[u8] {
        &self.buf[..=self.len]
    }

    /// Content as handed to the alert handler. Never longer than
    /// [`MAX_PAYLOAD_SIZE`]; a multi-byte character cut at the limit is kept
    /// as its leading bytes.
    pub fn as_c_str(&self) -> &CStr {
        CStr::from_bytes_with_nul(self.as_bytes_with_nul()).unwrap_or_default()
    }

    /// Content as text. Invalid UTF-8, including a multi-byte character cut
    /// by truncation, is replaced.
    pub fn to_str_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.as_bytes())
    }
}

impl std::fmt::Debug for BoundedPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedPayload")
            .field("len", &self.len)
            .field("content", &self.to_str_lossy())
            .finish()
    }
}

/// Response to a method invocation.
///
/// The body is owned; the transport takes it and releases it after
/// transmission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodResponse {
    pub status: i32,
    pub body: Vec<u8>,
}

impl MethodResponse {
    pub fn new(status: i32, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Response for a method no handler understands.
    pub fn unhandled() -> Self {
        Self::new(STATUS_UNHANDLED, UNHANDLED_RESPONSE)
    }

    pub fn is_handled(&self) -> bool {
        self.status != STATUS_UNHANDLED
    }

    /// Size of the body in bytes.
    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    pub fn body_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// Dispatch one method invocation to the registered domain handlers.
pub fn dispatch(method_name: &str, payload: &[u8], handlers: &CloudHandlers) -> MethodResponse {
    let bounded = BoundedPayload::copy_from(payload);
    if payload.len() > MAX_PAYLOAD_SIZE {
        debug!(
            "Method {} payload truncated from {} to {} bytes",
            method_name,
            payload.len(),
            MAX_PAYLOAD_SIZE
        );
    }

    match DeviceMethod::from_name(method_name) {
        Some(DeviceMethod::DisplayAlert) => {
            handlers.display_alert(bounded.as_c_str());
            MethodResponse::new(STATUS_OK, ALERT_DISPLAYED_RESPONSE)
        }
        None => {
            warn!("Ignoring unknown device method: {}", method_name);
            MethodResponse::unhandled()
        }
    }
}
