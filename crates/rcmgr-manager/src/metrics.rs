//! Event hooks for scope lifecycle changes.
//!
//! This module purposefully avoids pulling in a metrics stack; it only emits
//! `tracing` events. Wire a subscriber or exporter up in the binary layer.

#[cfg(feature = "tracing")]
pub fn emit_event(event: &str, key_values: &[(&str, String)]) {
    tracing::debug!(target: "rcmgr", event, fields = ?key_values, "scope event");
}

#[cfg(not(feature = "tracing"))]
pub fn emit_event(_event: &str, _key_values: &[(&str, String)]) { /* no-op */
}
