//! Prometheus text dump for `--metrics`
//!
//! The renewal counters are emitted by the client libraries through the
//! `metrics` facade; this module only installs the exporter and renders it.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return a handle for rendering metrics.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}
