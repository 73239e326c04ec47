// src/fusion.rs
//! # Data Fusion
//! Reconciles per-source observations of one criterion into a single value
//! with a disagreement index and a confidence score. Pure apart from logging
//! and counters; `*_at` variants take the clock as input for tests.
//!
//! - 0 sources → 0, method `single_source`, confidence 0.
//! - 1 source  → that value, disagreement 0, stated confidence (default 0.8).
//! - ≥2        → weighted median over `trust(criterion, source) × recency(age)`,
//!   trimmed mean when the weights are unusable; optional conservative
//!   override when sources disagree.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::criteria::{
    CriterionId, DataSource, FusedCriterion, FusionMetadata, FusionMethod, SourcedValue,
};
use crate::source_weights::SourceWeightsConfig;

/// Disagreement above this flags a criterion for re-checking.
pub const DEFAULT_VERIFICATION_THRESHOLD: f64 = 20.0;
/// Share trimmed from each end by the fallback mean.
pub const TRIM_FRACTION: f64 = 0.10;

const AGREEMENT_SPAN: f64 = 50.0;
const W_AGREEMENT: f64 = 0.6;
const W_STATED: f64 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionOptions {
    /// Default for callers that do not pass `conservative` explicitly.
    pub conservative: bool,
    pub verification_threshold: f64,
}

impl Default for FusionOptions {
    fn default() -> Self {
        Self {
            conservative: false,
            verification_threshold: DEFAULT_VERIFICATION_THRESHOLD,
        }
    }
}

/// Output of one fusion run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FusionResult {
    pub fused_value: f64,
    pub metadata: FusionMetadata,
    /// Combined weight (trust × recency) each source entered the median with.
    pub effective_weights: BTreeMap<DataSource, f64>,
    pub needs_verification: bool,
}

#[derive(Debug, Clone, Default)]
pub struct FusionEngine {
    pub weights: SourceWeightsConfig,
    pub options: FusionOptions,
}

impl FusionEngine {
    pub fn new(weights: SourceWeightsConfig, options: FusionOptions) -> Self {
        Self { weights, options }
    }

    pub fn fuse(
        &self,
        criterion: &CriterionId,
        by_source: &BTreeMap<DataSource, SourcedValue>,
        conservative: bool,
    ) -> FusionResult {
        self.fuse_at(criterion, by_source, conservative, Utc::now())
    }

    pub fn fuse_at(
        &self,
        criterion: &CriterionId,
        by_source: &BTreeMap<DataSource, SourcedValue>,
        conservative: bool,
        now: DateTime<Utc>,
    ) -> FusionResult {
        ensure_metrics_described();
        counter!("fusion_runs_total").increment(1);
        let threshold = self.options.verification_threshold;

        let single = |fused_value: f64, confidence: f64, weights: BTreeMap<DataSource, f64>| {
            FusionResult {
                fused_value,
                metadata: FusionMetadata {
                    disagreement_index: 0.0,
                    confidence_score: confidence,
                    last_fused_at: now,
                    conservative_fusion: None,
                    fusion_method: FusionMethod::SingleSource,
                },
                effective_weights: weights,
                needs_verification: false,
            }
        };

        let mut observations = by_source.values();
        match (observations.next(), observations.next()) {
            (None, _) => return single(0.0, 0.0, BTreeMap::new()),
            (Some(only), None) => {
                let w = self.combined_weight(criterion, only, now);
                return single(
                    only.value,
                    only.stated_confidence(),
                    BTreeMap::from([(only.source, w)]),
                );
            }
            _ => {}
        }

        let values: Vec<f64> = by_source.values().map(|sv| sv.value).collect();
        let effective_weights: BTreeMap<DataSource, f64> = by_source
            .values()
            .map(|sv| (sv.source, self.combined_weight(criterion, sv, now)))
            .collect();
        let pairs: Vec<(f64, f64)> = by_source
            .values()
            .map(|sv| (sv.value, effective_weights[&sv.source]))
            .collect();

        let disagreement = disagreement_index(&values);
        let (mut fused, method) = match weighted_median(&pairs) {
            Some(v) => (v, FusionMethod::WeightedMedian),
            None => (trimmed_mean(&values), FusionMethod::TrimmedMean),
        };

        let overridden = conservative && disagreement > threshold;
        if overridden {
            fused = if inverted_for_safety(criterion) {
                values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
            } else {
                values.iter().copied().fold(f64::INFINITY, f64::min)
            };
        }

        let stated: Vec<f64> = by_source.values().map(SourcedValue::stated_confidence).collect();
        let confidence = confidence_score(disagreement, &stated);

        if disagreement > threshold {
            counter!("fusion_high_disagreement_total").increment(1);
            debug!(
                target: "fusion",
                criterion = %criterion,
                disagreement,
                sources = values.len(),
                conservative = overridden,
                "sources disagree"
            );
        }

        FusionResult {
            fused_value: fused,
            metadata: FusionMetadata {
                disagreement_index: disagreement,
                confidence_score: confidence,
                last_fused_at: now,
                conservative_fusion: conservative.then_some(overridden),
                fusion_method: method,
            },
            effective_weights,
            needs_verification: disagreement > threshold,
        }
    }

    /// Upsert one source's observation and re-fuse the criterion.
    /// `fused_value` and metadata are replaced together.
    pub fn update_criterion_with_source_data(
        &self,
        criterion: &mut FusedCriterion,
        source: DataSource,
        value: f64,
        confidence: Option<f64>,
        notes: Option<String>,
    ) -> FusionResult {
        self.update_criterion_with_source_data_at(criterion, source, value, confidence, notes, Utc::now())
    }

    pub fn update_criterion_with_source_data_at(
        &self,
        criterion: &mut FusedCriterion,
        source: DataSource,
        value: f64,
        confidence: Option<f64>,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> FusionResult {
        let mut sv = SourcedValue::new(source, value, now);
        if let Some(c) = confidence {
            sv = sv.with_confidence(c);
        }
        sv.notes = notes;

        let mut by_source = criterion.by_source.clone();
        by_source.insert(source, sv);
        let result = self.fuse_at(&criterion.id, &by_source, self.options.conservative, now);

        criterion.by_source = by_source;
        criterion.apply(result.clone());
        result
    }

    fn combined_weight(&self, criterion: &CriterionId, sv: &SourcedValue, now: DateTime<Utc>) -> f64 {
        self.weights.weight_for(criterion, sv.source) * recency_weight(sv.timestamp, now)
    }
}

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("fusion_runs_total", "Fusion passes over one criterion.");
        describe_counter!(
            "fusion_high_disagreement_total",
            "Fusion passes whose disagreement exceeded the verification threshold."
        );
    });
}

/// Criteria whose risky side is the high end when sources disagree.
fn inverted_for_safety(id: &CriterionId) -> bool {
    matches!(id, CriterionId::Competition | CriterionId::Seasonality)
}

/// Freshness multiplier: ≤30 days 1.0, ≤90 days 0.8, older 0.6.
/// Timestamps in the future count as fresh.
pub fn recency_weight(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let days = (now - timestamp).num_days();
    if days <= 30 {
        1.0
    } else if days <= 90 {
        0.8
    } else {
        0.6
    }
}

/// Coefficient of variation × 100 (population stddev); 0 when the mean is 0.
pub fn disagreement_index(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if mean == 0.0 || !mean.is_finite() {
        return 0.0;
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    var.sqrt() / mean.abs() * 100.0
}

/// First value (by ascending value) at which cumulative weight reaches half
/// the total. `None` if weights are unusable or a value is not finite.
pub fn weighted_median(pairs: &[(f64, f64)]) -> Option<f64> {
    if pairs.is_empty() || pairs.iter().any(|(v, w)| !v.is_finite() || !w.is_finite() || *w < 0.0) {
        return None;
    }
    let total: f64 = pairs.iter().map(|(_, w)| w).sum();
    if total <= 0.0 {
        return None;
    }

    let mut sorted = pairs.to_vec();
    sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

    let half = total / 2.0;
    let mut cum = 0.0;
    for (v, w) in &sorted {
        cum += w;
        if cum >= half {
            return Some(*v);
        }
    }
    sorted.last().map(|(v, _)| *v)
}

/// Mean after dropping `floor(n × 10%)` values from each end.
pub fn trimmed_mean(values: &[f64]) -> f64 {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return 0.0;
    }
    sorted.sort_by(f64::total_cmp);
    let k = (sorted.len() as f64 * TRIM_FRACTION).floor() as usize;
    let kept = &sorted[k..sorted.len() - k];
    kept.iter().sum::<f64>() / kept.len() as f64
}

/// `0.6 × agreement + 0.4 × mean stated confidence`, agreement reaching 0
/// at 50% disagreement.
pub fn confidence_score(disagreement: f64, stated: &[f64]) -> f64 {
    let agreement = ((AGREEMENT_SPAN - disagreement) / AGREEMENT_SPAN).max(0.0);
    let avg = if stated.is_empty() {
        0.0
    } else {
        stated.iter().sum::<f64>() / stated.len() as f64
    };
    (W_AGREEMENT * agreement + W_STATED * avg).clamp(0.0, 1.0)
}
