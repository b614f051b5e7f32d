// src/metrics.rs
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::path::{Path, PathBuf};

use crate::error::PersistenceError;
use crate::store::write_atomic;

/// Prometheus recorder whose exposition is dumped to a textfile when the run ends
/// (node_exporter textfile collector style; a one-shot run has no scrape endpoint).
pub struct Metrics {
    pub handle: PrometheusHandle,
    textfile: PathBuf,
}

impl Metrics {
    /// Install the global recorder. Fails if one is already installed.
    pub fn init(textfile: &Path) -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| anyhow::anyhow!("prometheus: install recorder: {e}"))?;
        Ok(Self {
            handle,
            textfile: textfile.to_path_buf(),
        })
    }

    pub fn render(&self) -> String {
        self.handle.render()
    }

    /// Write the current exposition atomically.
    pub fn flush(&self) -> Result<(), PersistenceError> {
        write_atomic(&self.textfile, self.render().as_bytes())?;
        tracing::debug!(path = %self.textfile.display(), "metrics textfile written");
        Ok(())
    }
}
