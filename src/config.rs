use std::path::PathBuf;
use std::time::Duration;

use crate::limits::{DEFAULT_COMPACT_THRESHOLD, DEFAULT_SWEEP_INTERVAL_SECS};

/// Runtime settings, read from `MOTORPOOL_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    /// Prometheus listener port; disabled when unset.
    pub metrics_port: Option<u16>,
    pub sweep_interval: Duration,
    pub compact_threshold: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8080,
            data_dir: PathBuf::from("./data"),
            metrics_port: None,
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            compact_threshold: DEFAULT_COMPACT_THRESHOLD,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unparsable numbers fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|s| s.trim().parse::<u64>().ok());

        let sweep_secs = parsed("MOTORPOOL_SWEEP_INTERVAL_SECS")
            .filter(|s| *s > 0)
            .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS);

        Self {
            bind: lookup("MOTORPOOL_BIND").unwrap_or(defaults.bind),
            port: lookup("MOTORPOOL_PORT")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(defaults.port),
            data_dir: lookup("MOTORPOOL_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            metrics_port: lookup("MOTORPOOL_METRICS_PORT").and_then(|s| s.trim().parse().ok()),
            sweep_interval: Duration::from_secs(sweep_secs),
            compact_threshold: parsed("MOTORPOOL_COMPACT_THRESHOLD")
                .unwrap_or(defaults.compact_threshold),
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn journal_path(&self) -> PathBuf {
        self.data_dir.join("motorpool.journal")
    }
}
