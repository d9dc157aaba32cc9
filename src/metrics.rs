//! Process-wide Prometheus recorder behind the `metrics` facade.
//!
//! Stages record through `counter!`, `histogram!` and `gauge!`. Once
//! [`init_metrics`] has run, those land in an in-process registry that the
//! CLI renders to a text snapshot when a command finishes.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::fs;
use std::path::Path;
use std::sync::{Once, OnceLock};
use tracing::{info, warn};

use crate::error::Result;

/// Snapshot written under the log directory after each command
pub const METRICS_SNAPSHOT_FILE: &str = "get_it_done.prom";

static INIT: Once = Once::new();
static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global recorder. Idempotent.
pub fn init_metrics() {
    INIT.call_once(|| match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if HANDLE.set(handle).is_err() {
                warn!("Prometheus handle was already stored");
            }
            info!("Prometheus recorder installed");
        }
        Err(e) => warn!("Failed to install Prometheus recorder: {}", e),
    });
}

/// Current values in Prometheus text format, if a recorder is installed
pub fn render() -> Option<String> {
    HANDLE.get().map(PrometheusHandle::render)
}

/// Write the rendered snapshot to `path`; `false` when no recorder is installed.
pub fn write_snapshot(path: &Path) -> Result<bool> {
    let Some(text) = render() else {
        return Ok(false);
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, text)?;
    Ok(true)
}
