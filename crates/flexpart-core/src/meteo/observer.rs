//! Observer capability injected into the `AVAILABLE` builder.
//!
//! The builder never logs on its own; callers pass a [`MeteoObserver`] and
//! decide where notifications go. [`TracingObserver`] forwards them to
//! `tracing`, [`NoopObserver`] drops them.

use std::path::Path;

use crate::config::TimeWindow;

/// Notifications emitted while the index is built. All methods default to no-ops.
pub trait MeteoObserver {
    /// A prefix-matching name had no recognisable timestamp and was skipped.
    fn unparseable_name(&self, _name: &str) {}

    /// No product fell inside `window`; every parsed product is used instead.
    fn window_fallback(&self, _window: &TimeWindow, _parsed: usize) {}

    /// The manifest was written to `path` with `entries` lines.
    fn manifest_written(&self, _path: &Path, _entries: usize) {}
}

/// Discards every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl MeteoObserver for NoopObserver {}

/// Forwards notifications as structured `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl MeteoObserver for TracingObserver {
    fn unparseable_name(&self, name: &str) {
        tracing::debug!(event = "meteo.unparseable", name = %name);
    }

    fn window_fallback(&self, window: &TimeWindow, parsed: usize) {
        tracing::warn!(
            event = "meteo.window_fallback",
            start = %window.start,
            end = %window.end,
            parsed = parsed,
            "no meteorological product inside the requested window; listing all parsed products"
        );
    }

    fn manifest_written(&self, path: &Path, entries: usize) {
        crate::obs::emit_manifest_written(path, entries);
    }
}
