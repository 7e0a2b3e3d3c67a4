//! Structured lifecycle events for FLEXPART runs.
//!
//! Every function emits one `tracing` event with a stable `event` field so
//! runs can be followed in JSON logs (`--json`).

use std::path::Path;

use tracing::info;

/// Span carrying the run id; attach it to the run future with
/// `tracing::Instrument::instrument`.
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("flexpart.run", run_id = %run_id)
}

pub fn emit_run_started(run_id: &str, workspace: &Path, use_era5: bool) {
    info!(
        event = "run.started",
        run_id = %run_id,
        workspace = %workspace.display(),
        use_era5 = use_era5,
    );
}

pub fn emit_run_finished(run_id: &str, duration_ms: u64, success: bool) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        success = success,
    );
}

pub fn emit_stage_started(stage: &str) {
    info!(event = "stage.started", stage = %stage);
}

pub fn emit_stage_finished(stage: &str, duration_ms: u64) {
    info!(event = "stage.finished", stage = %stage, duration_ms = duration_ms);
}

/// Stage failure (warning level).
pub fn emit_stage_failed(stage: &str, error: &dyn std::fmt::Display) {
    tracing::warn!(event = "stage.failed", stage = %stage, error = %error);
}

pub fn emit_manifest_written(path: &Path, entries: usize) {
    info!(
        event = "manifest.written",
        path = %path.display(),
        entries = entries,
    );
}
