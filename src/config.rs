//! Engine configuration: defaults, an optional JSON file named by
//! `PGAGG_CONFIG`, then environment overrides.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::exec::parallel::{PartitionMode, StateBoundary};

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Worker tasks used by parallel aggregation.
    pub workers: usize,
    pub partition_mode: PartitionMode,
    /// Whether partial states cross a serialized boundary between workers
    /// and the coordinator.
    pub state_boundary: StateBoundary,
    /// Optional JSON file with extra seed rows.
    pub extra_seed_path: Option<PathBuf>,
    /// Abort loading on the first invalid seed row instead of skipping it.
    pub strict_seed: bool,
    /// Default tracing filter when `RUST_LOG` is unset.
    pub log_filter: String,
    /// Window evaluations that recompute more often than this are logged at warn.
    pub recompute_warn_threshold: u64,
}

impl EngineConfig {
    fn default_workers() -> usize { std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4) }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: Self::default_workers(),
            partition_mode: PartitionMode::default(),
            state_boundary: StateBoundary::default(),
            extra_seed_path: None,
            strict_seed: true,
            log_filter: "info".to_string(),
            recompute_warn_threshold: 64,
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_slice(&bytes).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Layered configuration from the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        let base = match std::env::var("PGAGG_CONFIG") {
            Ok(path) if !path.is_empty() => Self::load(Path::new(&path))?,
            _ => Self::default(),
        };
        Ok(base.with_overrides(|key| std::env::var(key).ok()))
    }

    /// Apply `PGAGG_*` overrides read through `lookup`. Unparsable values are
    /// ignored with a warning.
    pub fn with_overrides<F: Fn(&str) -> Option<String>>(mut self, lookup: F) -> Self {
        if let Some(v) = lookup("PGAGG_WORKERS") {
            match v.trim().parse::<usize>() {
                Ok(n) if n > 0 => self.workers = n,
                _ => warn!(target: "pgagg::config", "ignoring PGAGG_WORKERS='{}'", v),
            }
        }
        if let Some(v) = lookup("PGAGG_SEED_PATH") {
            self.extra_seed_path = if v.is_empty() { None } else { Some(PathBuf::from(v)) };
        }
        if let Some(v) = lookup("PGAGG_STRICT_SEED") {
            match v.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.strict_seed = true,
                "0" | "false" | "no" | "off" => self.strict_seed = false,
                _ => warn!(target: "pgagg::config", "ignoring PGAGG_STRICT_SEED='{}'", v),
            }
        }
        if let Some(v) = lookup("PGAGG_LOG") {
            if !v.is_empty() {
                self.log_filter = v;
            }
        }
        if let Some(v) = lookup("PGAGG_PARTITION_MODE") {
            match v.trim() {
                "by_group" => self.partition_mode = PartitionMode::ByGroup,
                "split" => self.partition_mode = PartitionMode::Split,
                _ => warn!(target: "pgagg::config", "ignoring PGAGG_PARTITION_MODE='{}'", v),
            }
        }
        if let Some(v) = lookup("PGAGG_STATE_BOUNDARY") {
            match v.trim() {
                "in_process" => self.state_boundary = StateBoundary::InProcess,
                "serialized" => self.state_boundary = StateBoundary::Serialized,
                _ => warn!(target: "pgagg::config", "ignoring PGAGG_STATE_BOUNDARY='{}'", v),
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn partial_file_keeps_defaults() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, r#"{{"workers": 3, "partition_mode": "split"}}"#).unwrap();
        let cfg = EngineConfig::load(f.path()).unwrap();
        assert_eq!(cfg.workers, 3);
        assert_eq!(cfg.partition_mode, PartitionMode::Split);
        assert_eq!(cfg.state_boundary, StateBoundary::InProcess);
        assert!(cfg.strict_seed);
        assert_eq!(cfg.log_filter, "info");
    }

    #[test]
    fn env_overrides_win() {
        let env: HashMap<&str, &str> = [
            ("PGAGG_WORKERS", "7"),
            ("PGAGG_STRICT_SEED", "false"),
            ("PGAGG_SEED_PATH", "/tmp/extra.json"),
            ("PGAGG_LOG", "debug"),
            ("PGAGG_STATE_BOUNDARY", "serialized"),
        ]
        .into_iter()
        .collect();
        let cfg = EngineConfig::default().with_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.workers, 7);
        assert!(!cfg.strict_seed);
        assert_eq!(cfg.extra_seed_path, Some(PathBuf::from("/tmp/extra.json")));
        assert_eq!(cfg.log_filter, "debug");
        assert_eq!(cfg.state_boundary, StateBoundary::Serialized);
    }

    #[test]
    fn bad_overrides_are_ignored() {
        let cfg = EngineConfig { workers: 2, ..EngineConfig::default() }
            .with_overrides(|k| if k == "PGAGG_WORKERS" { Some("zero".into()) } else { None });
        assert_eq!(cfg.workers, 2);
    }

    #[test]
    fn unreadable_file_is_an_error() {
        let err = EngineConfig::load(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(err.to_string().contains("reading config"));
    }
}
