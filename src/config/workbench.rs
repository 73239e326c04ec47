// src/config/workbench.rs
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::engine::GateThresholds;
use crate::fusion::FusionOptions;
use crate::keywords::MatchOptions;

pub const DEFAULT_WORKBENCH_CONFIG_PATH: &str = "config/workbench.toml";
pub const DEFAULT_SOURCE_WEIGHTS_PATH: &str = "config/source_weights.json";

pub const ENV_WORKBENCH_CONFIG_PATH: &str = "WORKBENCH_CONFIG_PATH";
pub const ENV_SOURCE_WEIGHTS_PATH: &str = "SOURCE_WEIGHTS_PATH";
pub const ENV_STORAGE_BACKEND: &str = "WORKBENCH_STORAGE_BACKEND";
pub const ENV_REMOTE_URL: &str = "WORKBENCH_REMOTE_URL";
pub const ENV_DATA_DIR: &str = "WORKBENCH_DATA_DIR";

/// 5 MiB, roughly a browser local-storage budget.
pub const DEFAULT_QUOTA_BYTES: usize = 5 * 1024 * 1024;
pub const DEFAULT_REMOTE_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Local,
    Remote,
}

impl StorageBackend {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Some(StorageBackend::Local),
            "remote" | "cloud" => Some(StorageBackend::Remote),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub data_dir: PathBuf,
    pub quota_bytes: usize,
    pub remote_url: Option<String>,
    pub timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Local,
            data_dir: PathBuf::from("data"),
            quota_bytes: DEFAULT_QUOTA_BYTES,
            remote_url: None,
            timeout_ms: DEFAULT_REMOTE_TIMEOUT_MS,
        }
    }
}

/// Whole workbench configuration. Every section is optional in TOML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkbenchConfig {
    pub storage: StorageConfig,
    pub gates: GateThresholds,
    pub keywords: MatchOptions,
    pub fusion: FusionOptions,
}

impl WorkbenchConfig {
    /// Resolve the path (`WORKBENCH_CONFIG_PATH` or the default), read it if
    /// present, then apply env overrides. A missing file means defaults.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var(ENV_WORKBENCH_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_WORKBENCH_CONFIG_PATH));

        let mut cfg = if path.exists() {
            Self::load_from_file(&path)?
        } else {
            tracing::info!(target: "config", path = %path.display(), "no workbench config file, using defaults");
            Self::default()
        };
        cfg.apply_env();
        Ok(cfg.sanitized())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!(
                "Failed to read workbench config at {}: {}",
                path.display(),
                e
            )
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(toml_str: &str) -> anyhow::Result<Self> {
        let cfg: WorkbenchConfig = toml::from_str(toml_str)?;
        Ok(cfg.sanitized())
    }

    /// `WORKBENCH_STORAGE_BACKEND`, `WORKBENCH_REMOTE_URL`, `WORKBENCH_DATA_DIR`.
    pub fn apply_env(&mut self) {
        if let Some(b) = std::env::var(ENV_STORAGE_BACKEND)
            .ok()
            .as_deref()
            .and_then(StorageBackend::parse)
        {
            self.storage.backend = b;
        }
        if let Ok(url) = std::env::var(ENV_REMOTE_URL) {
            let url = url.trim();
            if !url.is_empty() {
                self.storage.remote_url = Some(url.to_string());
            }
        }
        if let Ok(dir) = std::env::var(ENV_DATA_DIR) {
            if !dir.trim().is_empty() {
                self.storage.data_dir = PathBuf::from(dir.trim());
            }
        }
    }

    /// Replace nonsensical values with defaults.
    pub fn sanitized(mut self) -> Self {
        let d = GateThresholds::default();
        let g = &mut self.gates;
        for (v, dv) in [
            (&mut g.min_revenue, d.min_revenue),
            (&mut g.min_demand, d.min_demand),
            (&mut g.max_competition, d.max_competition),
            (&mut g.min_margin, d.min_margin),
        ] {
            if !v.is_finite() || *v < 0.0 {
                *v = dv;
            }
        }
        g.closeness_tolerance = if g.closeness_tolerance.is_finite() {
            g.closeness_tolerance.clamp(0.0, 1.0)
        } else {
            d.closeness_tolerance
        };

        let k = &mut self.keywords;
        k.top_n = k.top_n.max(1);
        if !k.min_score.is_finite() || k.min_score < 0.0 {
            k.min_score = MatchOptions::default().min_score;
        }
        if !k.primary_threshold.is_finite() || k.primary_threshold < 0.0 {
            k.primary_threshold = MatchOptions::default().primary_threshold;
        }

        if !self.fusion.verification_threshold.is_finite() || self.fusion.verification_threshold < 0.0 {
            self.fusion.verification_threshold = FusionOptions::default().verification_threshold;
        }

        if self.storage.quota_bytes == 0 {
            self.storage.quota_bytes = DEFAULT_QUOTA_BYTES;
        }
        if self.storage.timeout_ms == 0 {
            self.storage.timeout_ms = DEFAULT_REMOTE_TIMEOUT_MS;
        }
        if self
            .storage
            .remote_url
            .as_deref()
            .is_some_and(|u| u.trim().is_empty())
        {
            self.storage.remote_url = None;
        }
        self
    }
}

/// Path of the source trust table (`SOURCE_WEIGHTS_PATH` or the default).
pub fn source_weights_path() -> PathBuf {
    std::env::var(ENV_SOURCE_WEIGHTS_PATH)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_SOURCE_WEIGHTS_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_is_all_defaults() {
        let c = WorkbenchConfig::from_toml_str("").unwrap();
        assert_eq!(c, WorkbenchConfig::default());
        assert_eq!(c.gates.min_revenue, 5_000.0);
        assert_eq!(c.keywords.top_n, 10);
    }

    #[test]
    fn partial_sections_merge_with_defaults() {
        let c = WorkbenchConfig::from_toml_str(
            r#"
            [storage]
            backend = "remote"
            remote_url = "https://store.example.test"

            [gates]
            min_margin = 30.0
            "#,
        )
        .unwrap();
        assert_eq!(c.storage.backend, StorageBackend::Remote);
        assert_eq!(c.gates.min_margin, 30.0);
        assert_eq!(c.gates.min_demand, 1_000.0);
        assert_eq!(c.storage.quota_bytes, DEFAULT_QUOTA_BYTES);
    }

    #[test]
    fn bad_values_are_sanitized() {
        let c = WorkbenchConfig::from_toml_str(
            r#"
            [gates]
            min_revenue = -1.0
            closeness_tolerance = 3.0

            [keywords]
            top_n = 0

            [storage]
            quota_bytes = 0
            remote_url = "  "
            "#,
        )
        .unwrap();
        assert_eq!(c.gates.min_revenue, 5_000.0);
        assert_eq!(c.gates.closeness_tolerance, 1.0);
        assert_eq!(c.keywords.top_n, 1);
        assert_eq!(c.storage.quota_bytes, DEFAULT_QUOTA_BYTES);
        assert_eq!(c.storage.remote_url, None);
    }

    #[test]
    fn malformed_toml_is_an_error() {
        assert!(WorkbenchConfig::from_toml_str("[gates\nmin_revenue = ").is_err());
    }
}
