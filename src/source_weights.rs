// src/source_weights.rs
//! # Source Weights
//!
//! Trust table used by fusion: for each criterion, how much each data source
//! counts, in `[0.0, 1.0]`.
//!
//! - Loads from JSON (`criteria` table + criterion `aliases`).
//! - Criterion lookup is case-insensitive and tolerant of `-`/`_`/spaces.
//! - Fallback order: alias → exact criterion → default weight.
//! - `default_seed()` is the built-in table used when no file is present.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fs, path::Path};
use tracing::warn;

use crate::criteria::{CriterionId, DataSource};

/// Weight of a source the table says nothing about.
pub const DEFAULT_SOURCE_WEIGHT: f64 = 0.1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceWeightsConfig {
    #[serde(default = "default_default_weight")]
    pub default_weight: f64,
    /// criterion → (source → weight).
    #[serde(default)]
    pub criteria: HashMap<String, HashMap<DataSource, f64>>,
    /// Alternative criterion names → canonical criterion.
    #[serde(default)]
    pub aliases: HashMap<String, String>,
}

fn default_default_weight() -> f64 {
    DEFAULT_SOURCE_WEIGHT
}

impl SourceWeightsConfig {
    /// Read and parse a JSON table without any fallback.
    pub fn try_load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let s = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let cfg = serde_json::from_str::<Self>(&s)
            .with_context(|| format!("parse {}", path.display()))?;
        Ok(cfg.normalized())
    }

    /// Load from a JSON file. Falls back to `default_seed()` on any error;
    /// a file that exists but does not parse is logged.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match Self::try_load_from_file(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                if path.exists() {
                    warn!(target: "fusion", path = %path.display(), error = %format!("{e:#}"), "source weights unusable; using built-in seed");
                }
                Self::default_seed()
            }
        }
    }

    /// Base trust of `source` for `criterion`.
    pub fn weight_for(&self, criterion: &CriterionId, source: DataSource) -> f64 {
        let c = normalize(criterion.as_str());
        let key = self.aliases.get(&c).map(|a| normalize(a)).unwrap_or(c);

        self.criteria
            .get(&key)
            .and_then(|row| row.get(&source))
            .copied()
            .map(clamp01)
            .unwrap_or_else(|| clamp01(self.default_weight))
    }

    /// Built-in table.
    pub(crate) fn default_seed() -> Self {
        use DataSource::*;

        let mut criteria = HashMap::new();
        for (criterion, row) in [
            (
                "revenue",
                &[(JungleScout, 0.8), (Helium10, 0.5), (Validation, 0.4), (AmazonPoe, 0.3), (Manual, 0.2)][..],
            ),
            (
                "demand",
                &[(Helium10, 0.6), (AmazonPoe, 0.4), (JungleScout, 0.3), (Manual, 0.1)][..],
            ),
            (
                "competition",
                &[(Helium10, 0.5), (JungleScout, 0.5), (AmazonPoe, 0.3), (Manual, 0.2)][..],
            ),
            (
                "margin",
                &[(Validation, 0.9), (Manual, 0.5), (JungleScout, 0.3)][..],
            ),
            (
                "seasonality",
                &[(AmazonPoe, 0.5), (Helium10, 0.4), (JungleScout, 0.3), (Manual, 0.2)][..],
            ),
        ] {
            criteria.insert(criterion.to_string(), row.iter().copied().collect());
        }

        let mut aliases = HashMap::new();
        for (a, c) in [
            ("profitability", "margin"),
            ("profit", "margin"),
            ("sales", "revenue"),
            ("search volume", "demand"),
            ("competitors", "competition"),
        ] {
            aliases.insert(a.to_string(), c.to_string());
        }

        Self {
            default_weight: DEFAULT_SOURCE_WEIGHT,
            criteria,
            aliases,
        }
    }

    /// Re-key criteria and aliases to the lookup form.
    fn normalized(self) -> Self {
        Self {
            default_weight: self.default_weight,
            criteria: self
                .criteria
                .into_iter()
                .map(|(k, v)| (normalize(&k), v))
                .collect(),
            aliases: self
                .aliases
                .into_iter()
                .map(|(k, v)| (normalize(&k), normalize(&v)))
                .collect(),
        }
    }
}

impl Default for SourceWeightsConfig {
    fn default() -> Self {
        Self::default_seed()
    }
}

/// Lowercase, separators to spaces, collapse whitespace.
fn normalize(s: &str) -> String {
    let out = s.trim().to_ascii_lowercase().replace(['-', '_', '/', '.'], " ");
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn clamp01(x: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0)
    }
}
