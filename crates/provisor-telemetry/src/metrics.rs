//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - One-shot runs have no scrape endpoint; `write_textfile` exports the
//!   registry in the node-exporter textfile format instead.

use std::convert::TryFrom;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;

use crate::error::{Result, TelemetryError};

/// Prometheus-backed metrics registry shared across the pipeline.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    provision_steps_total: IntCounterVec,
    provision_runs_total: IntCounterVec,
    command_duration_ms: IntGauge,
    command_exit_code: IntGauge,
}

/// Snapshot of selected gauges for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Wall-clock duration of the last external command (ms).
    pub command_duration_ms: i64,
    /// Exit code of the last external command.
    pub command_exit_code: i64,
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be
    /// registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let provision_steps_total = IntCounterVec::new(
            Opts::new(
                "provision_steps_total",
                "Provisioning lifecycle steps executed by status",
            ),
            &["step", "status"],
        )
        .map_err(|source| TelemetryError::MetricsCollector {
            name: "provision_steps_total",
            source,
        })?;
        let provision_runs_total = IntCounterVec::new(
            Opts::new("provision_runs_total", "Provisioning runs by outcome"),
            &["outcome"],
        )
        .map_err(|source| TelemetryError::MetricsCollector {
            name: "provision_runs_total",
            source,
        })?;
        let command_duration_ms = IntGauge::with_opts(Opts::new(
            "provision_command_duration_ms",
            "Wall-clock duration of the provisioning command (ms)",
        ))
        .map_err(|source| TelemetryError::MetricsCollector {
            name: "provision_command_duration_ms",
            source,
        })?;
        let command_exit_code = IntGauge::with_opts(Opts::new(
            "provision_command_exit_code",
            "Exit code reported by the provisioning command",
        ))
        .map_err(|source| TelemetryError::MetricsCollector {
            name: "provision_command_exit_code",
            source,
        })?;

        register(&registry, "provision_steps_total", &provision_steps_total)?;
        register(&registry, "provision_runs_total", &provision_runs_total)?;
        register(
            &registry,
            "provision_command_duration_ms",
            &command_duration_ms,
        )?;
        register(&registry, "provision_command_exit_code", &command_exit_code)?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                provision_steps_total,
                provision_runs_total,
                command_duration_ms,
                command_exit_code,
            }),
        })
    }

    /// Increment the lifecycle step counter.
    pub fn inc_provision_step(&self, step: &str, status: &str) {
        self.inner
            .provision_steps_total
            .with_label_values(&[step, status])
            .inc();
    }

    /// Increment the run counter for a terminal outcome.
    pub fn inc_provision_run(&self, outcome: &str) {
        self.inner
            .provision_runs_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Record the duration and exit code of the external command.
    pub fn observe_command(&self, duration: Duration, exit_code: i32) {
        self.inner
            .command_duration_ms
            .set(Self::duration_to_ms(duration));
        self.inner.command_exit_code.set(i64::from(exit_code));
    }

    /// Current value of the step counter for a label pair.
    #[must_use]
    pub fn provision_step_count(&self, step: &str, status: &str) -> u64 {
        self.inner
            .provision_steps_total
            .with_label_values(&[step, status])
            .get()
    }

    /// Render the metrics registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be encoded or if the encoded
    /// buffer is not valid UTF-8.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|source| TelemetryError::MetricsEncode { source })?;
        String::from_utf8(buffer).map_err(|source| TelemetryError::MetricsUtf8 { source })
    }

    /// Render the registry and write it to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails or the file cannot be written.
    pub fn write_textfile(&self, path: &Path) -> Result<()> {
        let rendered = self.render()?;
        fs::write(path, rendered).map_err(|source| TelemetryError::MetricsWrite {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Take a point-in-time snapshot of the command gauges.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            command_duration_ms: self.inner.command_duration_ms.get(),
            command_exit_code: self.inner.command_exit_code.get(),
        }
    }

    /// Convert a duration to milliseconds saturating at `i64::MAX`.
    pub(crate) fn duration_to_ms(duration: Duration) -> i64 {
        i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
    }
}

fn register<C>(registry: &Registry, name: &'static str, collector: &C) -> Result<()>
where
    C: prometheus::core::Collector + Clone + 'static,
{
    registry
        .register(Box::new(collector.clone()))
        .map_err(|source| TelemetryError::MetricsRegister { name, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_to_ms_saturates_on_large_values() {
        let duration = Duration::from_secs(u64::MAX / 2);
        assert_eq!(Metrics::duration_to_ms(duration), i64::MAX);
    }

    #[test]
    fn metrics_snapshot_reflects_updates() -> Result<()> {
        let metrics = Metrics::new()?;
        metrics.inc_provision_step("stage", "completed");
        metrics.inc_provision_step("stage", "completed");
        metrics.inc_provision_run("succeeded");
        metrics.observe_command(Duration::from_millis(1_250), 2);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.command_duration_ms, 1_250);
        assert_eq!(snapshot.command_exit_code, 2);
        assert_eq!(metrics.provision_step_count("stage", "completed"), 2);

        let rendered = metrics.render()?;
        assert!(rendered.contains("provision_steps_total"));
        assert!(rendered.contains("provision_runs_total"));
        assert!(rendered.contains("provision_command_duration_ms 1250"));
        Ok(())
    }

    #[test]
    fn write_textfile_persists_rendered_metrics() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("provisor.prom");
        let metrics = Metrics::new()?;
        metrics.inc_provision_run("failed");
        metrics.write_textfile(&path)?;

        let contents = fs::read_to_string(&path)?;
        assert!(contents.contains("provision_runs_total{outcome=\"failed\"} 1"));
        Ok(())
    }

    #[test]
    fn write_textfile_reports_missing_directory() -> Result<()> {
        let metrics = Metrics::new()?;
        let err = metrics
            .write_textfile(Path::new("/nonexistent/dir/provisor.prom"))
            .unwrap_err();
        assert!(matches!(err, TelemetryError::MetricsWrite { .. }));
        Ok(())
    }
}
