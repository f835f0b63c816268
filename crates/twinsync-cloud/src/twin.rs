//! Desired-property reconciliation and reported-property documents.
//!
//! Incoming documents come either as a full twin (`{"desired": {...},
//! "reported": {...}}`) or as a desired-only delta. Both are handled the
//! same way once the desired section is located.
//!
//! ## Version gate
//!
//! The stored version only ever moves forward, but the recognized property is
//! applied from every parsed document that carries it, including documents
//! whose `$version` is not newer than the stored one. Stale or duplicate
//! documents therefore re-apply their value to the domain handler. This is
//! intentional and kept as-is until the contract is revised.

use serde_json::{json, Map, Value};
use tracing::{debug, warn};

/// Version the counter holds at startup.
pub const INITIAL_VERSION: u32 = 1;

/// Key carrying the document version inside the desired section.
pub const VERSION_KEY: &str = "$version";

/// Status code written into the upload-enabled acknowledgement.
pub const ACK_STATUS_OK: u32 = 200;

/// Latest applied desired-property version. Never decreases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DesiredVersion(u32);

impl DesiredVersion {
    pub fn new() -> Self {
        Self(INITIAL_VERSION)
    }

    pub fn starting_at(version: u32) -> Self {
        Self(version)
    }

    pub fn current(&self) -> u32 {
        self.0
    }

    /// Raise the counter to `requested` if it is newer. Returns whether the
    /// counter moved.
    pub fn observe(&mut self, requested: u32) -> bool {
        if requested > self.0 {
            self.0 = requested;
            true
        } else {
            false
        }
    }

    /// Take the current value as an acknowledgement stamp and advance the
    /// counter by one.
    pub fn stamp(&mut self) -> u32 {
        let stamp = self.0;
        self.0 = self.0.saturating_add(1);
        stamp
    }
}

impl Default for DesiredVersion {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of reconciling one parsed document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Reconciliation {
    /// Value of the recognized property, when present and boolean.
    pub upload_enabled: Option<bool>,
    /// `$version` read from the desired section (0 when absent).
    pub requested_version: Option<u32>,
    /// Whether the stored version was raised.
    pub version_advanced: bool,
}

/// Reconciles desired-property documents for a single boolean property.
#[derive(Debug, Clone)]
pub struct TwinReconciler {
    property: String,
}

impl TwinReconciler {
    pub fn new(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
        }
    }

    /// Reconcile one raw document against the stored version.
    ///
    /// Returns `None` when the document is not valid JSON; nothing is
    /// mutated in that case.
    pub fn reconcile(&self, document: &str, version: &mut DesiredVersion) -> Option<Reconciliation> {
        let root: Value = match serde_json::from_str(document) {
            Ok(root) => root,
            Err(e) => {
                warn!("Cannot parse the desired properties as JSON content: {}", e);
                return None;
            }
        };

        let Some(root) = root.as_object() else {
            debug!("Desired properties document is not an object, ignoring");
            return Some(Reconciliation::default());
        };

        let desired = root
            .get("desired")
            .and_then(Value::as_object)
            .unwrap_or(root);

        let Some(enabled) = desired.get(&self.property).and_then(Value::as_bool) else {
            debug!("Desired properties carry no boolean {}", self.property);
            return Some(Reconciliation::default());
        };

        let requested = desired
            .get(VERSION_KEY)
            .and_then(Value::as_f64)
            .map(|v| v as u32)
            .unwrap_or(0);
        let advanced = version.observe(requested);
        debug!(
            "Desired {}={} at version {} (stored {}, advanced: {})",
            self.property,
            enabled,
            requested,
            version.current(),
            advanced
        );

        Some(Reconciliation {
            upload_enabled: Some(enabled),
            requested_version: Some(requested),
            version_advanced: advanced,
        })
    }

    /// Reported-property acknowledgement for the upload-enabled state.
    pub fn upload_enabled_report(&self, enabled: bool, version_stamp: u32) -> Value {
        let mut root = Map::new();
        root.insert(
            self.property.clone(),
            json!({
                "value": enabled,
                "ac": ACK_STATUS_OK,
                "av": version_stamp,
                "ad": format!("Successfully updated {}", self.property),
            }),
        );
        Value::Object(root)
    }
}

/// Reported-property document carrying static device identity.
pub fn device_details_report(serial_number: &str) -> Value {
    json!({ "serialNumber": serial_number })
}
