//! Prometheus metrics.

use crate::config::MetricsSettings;
use crate::{Error, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle, PrometheusRecorder};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::thread;

/// Default port for the Prometheus HTTP listener.
pub const DEFAULT_METRICS_PORT: u16 = 9090;

/// Metrics configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsConfig {
    /// Whether metrics are enabled.
    pub enabled: bool,
    /// Address to bind the metrics exporter.
    pub listen_addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self::from_settings(&MetricsSettings::default())
    }
}

impl MetricsConfig {
    /// Builds metrics configuration from config settings.
    #[must_use]
    pub fn from_settings(settings: &MetricsSettings) -> Self {
        let port = settings.port.unwrap_or(DEFAULT_METRICS_PORT);
        Self {
            enabled: settings.enabled.unwrap_or(false),
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port),
        }
    }
}

/// Metrics handle for flushing on shutdown.
#[derive(Debug, Clone)]
pub struct MetricsHandle {
    prometheus: PrometheusHandle,
}

/// Runs recorder upkeep and logs the final exposition.
///
/// The HTTP listener goes away with the process, so the last values would
/// otherwise be lost between scrapes.
pub fn flush(handle: &MetricsHandle) {
    handle.prometheus.run_upkeep();
    let rendered = handle.prometheus.render();
    tracing::debug!(metrics = %rendered, "Final metrics");
}

/// Installs the Prometheus recorder and its HTTP listener.
///
/// Returns `None` when metrics are disabled.
pub fn install_prometheus(config: &MetricsConfig) -> Result<Option<MetricsHandle>> {
    if !config.enabled {
        return Ok(None);
    }

    let builder = PrometheusBuilder::new().with_http_listener(config.listen_addr);
    let prometheus = install_listener(builder)?;
    describe_metrics();
    tracing::info!(addr = %config.listen_addr, "Prometheus exporter listening");

    Ok(Some(MetricsHandle { prometheus }))
}

/// Registers help text for every metric the monitor emits.
fn describe_metrics() {
    metrics::describe_counter!("frames_processed_total", "Frames run through the pipeline");
    metrics::describe_counter!(
        "frames_ignored_total",
        "Frames that produced no sighting"
    );
    metrics::describe_counter!(
        "pipeline_frames_stopped_total",
        "Frames stopped early, by interpreter"
    );
    metrics::describe_counter!("registry_discovered_total", "Entities discovered, by kind");
    metrics::describe_counter!("registry_lost_total", "Entities evicted, by kind");
    metrics::describe_gauge!("registry_entities", "Live registry records, by kind");
    metrics::describe_histogram!(
        "eviction_pass_duration_ms",
        metrics::Unit::Milliseconds,
        "Duration of one registry eviction pass"
    );
    metrics::describe_counter!("events_published_total", "Events handed to subscribers");
    metrics::describe_counter!(
        "events_unobserved_total",
        "Events published with no subscriber connected"
    );
    metrics::describe_counter!(
        "events_dropped_total",
        "Events a lagging subscriber missed"
    );
    metrics::describe_counter!("publisher_subscribers_total", "Subscriber connections accepted");
}

fn install_listener(builder: PrometheusBuilder) -> Result<PrometheusHandle> {
    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        return install_with_runtime(builder, &handle);
    }
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::OperationFailed {
            operation: "metrics_runtime_init".to_string(),
            cause: e.to_string(),
        })?;
    let handle = runtime.handle().clone();
    let prometheus = install_with_runtime(builder, &handle)?;
    thread::Builder::new()
        .name("metrics-http".to_string())
        .spawn(move || runtime.block_on(std::future::pending::<()>()))
        .map_err(|e| Error::OperationFailed {
            operation: "metrics_runtime_thread".to_string(),
            cause: e.to_string(),
        })?;
    Ok(prometheus)
}

fn install_with_runtime(
    builder: PrometheusBuilder,
    runtime_handle: &tokio::runtime::Handle,
) -> Result<PrometheusHandle> {
    let (recorder, exporter) = {
        let _guard = runtime_handle.enter();
        builder.build().map_err(|e| Error::OperationFailed {
            operation: "metrics_exporter_build".to_string(),
            cause: e.to_string(),
        })?
    };
    let handle = recorder.handle();
    set_global_recorder(recorder)?;
    runtime_handle.spawn(exporter);
    Ok(handle)
}

fn set_global_recorder(recorder: PrometheusRecorder) -> Result<()> {
    metrics::set_global_recorder(recorder).map_err(|e| Error::OperationFailed {
        operation: "metrics_recorder_install".to_string(),
        cause: e.to_string(),
    })
}
