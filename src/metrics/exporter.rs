//! Prometheus export for batch runs.
//!
//! A batch job is gone before a scraper could reach it, so instead of serving
//! `/metrics` the recorder is rendered once at the end of the run into a text
//! file that a node exporter textfile collector (or a push step) can pick up.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use snafu::prelude::*;
use std::path::PathBuf;

use crate::error::{MetricsError, MetricsTextfileSnafu, PrometheusInitSnafu};

/// Handle to the installed recorder and its export destination.
pub struct MetricsExporter {
    handle: PrometheusHandle,
    textfile_path: PathBuf,
}

/// Install the global Prometheus recorder.
///
/// Only one recorder can be installed per process; a second call fails.
pub fn init(textfile_path: impl Into<PathBuf>) -> Result<MetricsExporter, MetricsError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context(PrometheusInitSnafu)?;

    Ok(MetricsExporter {
        handle,
        textfile_path: textfile_path.into(),
    })
}

impl MetricsExporter {
    /// Render metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }

    /// Write the rendered metrics to the configured path.
    ///
    /// The file is written next to its destination and renamed into place so
    /// collectors never observe a partial file.
    pub fn export(&self) -> Result<(), MetricsError> {
        let path = self.textfile_path.display().to_string();
        let tmp = self.textfile_path.with_extension("prom.tmp");

        std::fs::write(&tmp, self.render()).context(MetricsTextfileSnafu { path: path.clone() })?;
        std::fs::rename(&tmp, &self.textfile_path).context(MetricsTextfileSnafu { path })?;
        Ok(())
    }

    pub fn textfile_path(&self) -> &std::path::Path {
        &self.textfile_path
    }
}
