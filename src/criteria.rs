// src/criteria.rs
//! # Criteria
//!
//! Scored dimensions of an opportunity in two shapes:
//! - [`ScoringCriterion`]: one plain value per criterion.
//! - [`FusedCriterion`]: per-source observations plus one reconciled value.
//!
//! [`CriteriaSet`] is the tagged union an opportunity owns. Scoring code reads
//! either shape through the [`Criterion`] trait; moving from plain to fused is
//! an explicit migration ([`CriteriaSet::into_fused`]).

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fusion::{FusionEngine, FusionResult};
use crate::ingest::normalize::normalize_competition;
use crate::ingest::types::ProductRecord;

/// Default stated confidence for observations that carry none.
pub const DEFAULT_SOURCE_CONFIDENCE: f64 = 0.8;

/// Origin of a data observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DataSource {
    #[serde(rename = "jungle_scout")]
    JungleScout,
    #[serde(rename = "helium_10")]
    Helium10,
    #[serde(rename = "amazon_poe")]
    AmazonPoe,
    #[serde(rename = "manual")]
    Manual,
    #[serde(rename = "validation")]
    Validation,
}

impl DataSource {
    pub const ALL: [DataSource; 5] = [
        DataSource::JungleScout,
        DataSource::Helium10,
        DataSource::AmazonPoe,
        DataSource::Manual,
        DataSource::Validation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DataSource::JungleScout => "jungle_scout",
            DataSource::Helium10 => "helium_10",
            DataSource::AmazonPoe => "amazon_poe",
            DataSource::Manual => "manual",
            DataSource::Validation => "validation",
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        DataSource::ALL
            .into_iter()
            .find(|d| d.as_str() == norm || d.as_str().replace('_', "") == norm)
            .ok_or_else(|| format!("unknown data source `{s}`"))
    }
}

/// One source's observation of a criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcedValue {
    pub value: f64,
    pub source: DataSource,
    pub timestamp: DateTime<Utc>,
    /// Source's own confidence in [0,1].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl SourcedValue {
    pub fn new(source: DataSource, value: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            value,
            source,
            timestamp,
            confidence: None,
            notes: None,
        }
    }

    /// Builder: stated confidence, clamped to [0,1].
    pub fn with_confidence(mut self, c: f64) -> Self {
        self.confidence = Some(clamp01(c));
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn stated_confidence(&self) -> f64 {
        self.confidence.map(clamp01).unwrap_or(DEFAULT_SOURCE_CONFIDENCE)
    }
}

/// Criterion identifier. Known ids get behaviour (inversion, gates,
/// remediation hints); anything else is carried as `Custom`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CriterionId {
    Revenue,
    Demand,
    Competition,
    Barriers,
    Seasonality,
    Profitability,
    Margin,
    Custom(String),
}

impl CriterionId {
    pub fn as_str(&self) -> &str {
        match self {
            CriterionId::Revenue => "revenue",
            CriterionId::Demand => "demand",
            CriterionId::Competition => "competition",
            CriterionId::Barriers => "barriers",
            CriterionId::Seasonality => "seasonality",
            CriterionId::Profitability => "profitability",
            CriterionId::Margin => "margin",
            CriterionId::Custom(s) => s.as_str(),
        }
    }

    /// Lower raw value is the better outcome.
    pub fn is_inverted(&self) -> bool {
        matches!(
            self,
            CriterionId::Competition | CriterionId::Barriers | CriterionId::Seasonality
        )
    }

    pub fn display_name(&self) -> String {
        let s = self.as_str();
        let mut chars = s.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
            None => String::new(),
        }
    }
}

impl From<String> for CriterionId {
    fn from(s: String) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "revenue" => CriterionId::Revenue,
            "demand" => CriterionId::Demand,
            "competition" => CriterionId::Competition,
            "barriers" => CriterionId::Barriers,
            "seasonality" => CriterionId::Seasonality,
            "profitability" => CriterionId::Profitability,
            "margin" => CriterionId::Margin,
            _ => CriterionId::Custom(s),
        }
    }
}

impl From<&str> for CriterionId {
    fn from(s: &str) -> Self {
        CriterionId::from(s.to_string())
    }
}

impl From<CriterionId> for String {
    fn from(id: CriterionId) -> Self {
        id.as_str().to_string()
    }
}

impl fmt::Display for CriterionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read access shared by both criterion shapes.
pub trait Criterion {
    fn id(&self) -> &CriterionId;
    fn name(&self) -> &str;
    /// Percentage contribution to the overall score.
    fn weight(&self) -> f64;
    /// Value the scoring engine uses.
    fn value(&self) -> f64;
    fn max_value(&self) -> f64;

    fn is_inverted(&self) -> bool {
        self.id().is_inverted()
    }
}

/// Plain criterion without provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringCriterion {
    pub id: CriterionId,
    pub name: String,
    pub weight: f64,
    pub value: f64,
    pub max_value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ScoringCriterion {
    pub fn new(id: impl Into<CriterionId>, weight: f64, value: f64, max_value: f64) -> Self {
        let id = id.into();
        Self {
            name: id.display_name(),
            id,
            weight,
            value,
            max_value,
            threshold: None,
            description: None,
        }
    }
}

impl Criterion for ScoringCriterion {
    fn id(&self) -> &CriterionId {
        &self.id
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn weight(&self) -> f64 {
        self.weight
    }
    fn value(&self) -> f64 {
        self.value
    }
    fn max_value(&self) -> f64 {
        self.max_value
    }
}

/// How a fused value was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionMethod {
    WeightedMedian,
    TrimmedMean,
    SingleSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FusionMetadata {
    /// Coefficient of variation of the raw values, in percent.
    pub disagreement_index: f64,
    /// In [0,1].
    pub confidence_score: f64,
    pub last_fused_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conservative_fusion: Option<bool>,
    pub fusion_method: FusionMethod,
}

/// Criterion with per-source provenance.
///
/// `fused_value` and `fusion_metadata` are only ever written together by the
/// fusion engine, from the current `by_source`. `is_inverted` always follows
/// the id; a payload cannot override it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "FusedCriterionWire")]
pub struct FusedCriterion {
    pub id: CriterionId,
    pub name: String,
    pub weight: f64,
    pub max_value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    pub(crate) is_inverted: bool,
    pub(crate) fused_value: f64,
    pub(crate) by_source: BTreeMap<DataSource, SourcedValue>,
    pub(crate) fusion_metadata: FusionMetadata,
}

/// Incoming shape of a fused criterion. `isInverted` is ignored if sent.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FusedCriterionWire {
    id: CriterionId,
    name: String,
    weight: f64,
    max_value: f64,
    #[serde(default)]
    unit: Option<String>,
    #[serde(default)]
    threshold: Option<f64>,
    #[serde(default)]
    fused_value: f64,
    #[serde(default)]
    by_source: BTreeMap<DataSource, SourcedValue>,
    fusion_metadata: FusionMetadata,
}

impl From<FusedCriterionWire> for FusedCriterion {
    fn from(w: FusedCriterionWire) -> Self {
        // the map key is authoritative for the observation's source
        let by_source = w
            .by_source
            .into_iter()
            .map(|(source, mut sv)| {
                sv.source = source;
                (source, sv)
            })
            .collect();
        Self {
            is_inverted: w.id.is_inverted(),
            id: w.id,
            name: w.name,
            weight: w.weight,
            max_value: w.max_value,
            unit: w.unit,
            threshold: w.threshold,
            fused_value: w.fused_value,
            by_source,
            fusion_metadata: w.fusion_metadata,
        }
    }
}

impl FusedCriterion {
    /// Empty criterion (no sources yet, fused value 0).
    pub fn new(id: impl Into<CriterionId>, weight: f64, max_value: f64, now: DateTime<Utc>) -> Self {
        let id = id.into();
        let mut c = Self {
            name: id.display_name(),
            is_inverted: id.is_inverted(),
            id,
            weight,
            max_value,
            unit: None,
            threshold: None,
            fused_value: 0.0,
            by_source: BTreeMap::new(),
            fusion_metadata: FusionMetadata {
                disagreement_index: 0.0,
                confidence_score: 0.0,
                last_fused_at: now,
                conservative_fusion: None,
                fusion_method: FusionMethod::SingleSource,
            },
        };
        c.apply(FusionEngine::default().fuse_at(&c.id, &c.by_source, false, now));
        c
    }

    /// Migrate a plain criterion, recording its value as one observation.
    pub fn from_scoring(c: &ScoringCriterion, source: DataSource, now: DateTime<Utc>) -> Self {
        let mut fused = Self::new(c.id.clone(), c.weight, c.max_value, now);
        fused.name = c.name.clone();
        fused.threshold = c.threshold;
        fused
            .by_source
            .insert(source, SourcedValue::new(source, c.value, now));
        fused.apply(FusionEngine::default().fuse_at(&fused.id, &fused.by_source, false, now));
        fused
    }

    pub fn fused_value(&self) -> f64 {
        self.fused_value
    }

    pub fn by_source(&self) -> &BTreeMap<DataSource, SourcedValue> {
        &self.by_source
    }

    pub fn fusion_metadata(&self) -> &FusionMetadata {
        &self.fusion_metadata
    }

    /// Sources disagree enough that the UI should ask for a re-check.
    pub fn needs_verification(&self, threshold: f64) -> bool {
        self.fusion_metadata.disagreement_index > threshold
    }

    pub(crate) fn apply(&mut self, r: FusionResult) {
        self.fused_value = r.fused_value;
        self.fusion_metadata = r.metadata;
    }
}

impl Criterion for FusedCriterion {
    fn id(&self) -> &CriterionId {
        &self.id
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn weight(&self) -> f64 {
        self.weight
    }
    fn value(&self) -> f64 {
        self.fused_value
    }
    fn max_value(&self) -> f64 {
        self.max_value
    }
}

/// Criteria owned by an opportunity, tagged by fusion capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "items", rename_all = "snake_case")]
pub enum CriteriaSet {
    Basic(Vec<ScoringCriterion>),
    Fused(Vec<FusedCriterion>),
}

impl Default for CriteriaSet {
    fn default() -> Self {
        CriteriaSet::Basic(Vec::new())
    }
}

impl CriteriaSet {
    pub fn len(&self) -> usize {
        match self {
            CriteriaSet::Basic(v) => v.len(),
            CriteriaSet::Fused(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_fused(&self) -> bool {
        matches!(self, CriteriaSet::Fused(_))
    }

    /// Uniform read view over either shape.
    pub fn iter(&self) -> Box<dyn Iterator<Item = &dyn Criterion> + '_> {
        match self {
            CriteriaSet::Basic(v) => Box::new(v.iter().map(|c| c as &dyn Criterion)),
            CriteriaSet::Fused(v) => Box::new(v.iter().map(|c| c as &dyn Criterion)),
        }
    }

    pub fn get(&self, id: &CriterionId) -> Option<&dyn Criterion> {
        self.iter().find(|c| c.id() == id)
    }

    /// Scoring value of `id`, if present.
    pub fn value_of(&self, id: &CriterionId) -> Option<f64> {
        self.get(id).map(|c| c.value())
    }

    pub fn ids(&self) -> Vec<CriterionId> {
        self.iter().map(|c| c.id().clone()).collect()
    }

    /// Recompute every fused value from its observations. Stored
    /// `fusedValue`/`fusionMetadata` from outside the engine are discarded.
    pub fn refuse(&mut self, engine: &FusionEngine, now: DateTime<Utc>) {
        if let CriteriaSet::Fused(items) = self {
            for c in items.iter_mut() {
                let r = engine.fuse_at(&c.id, &c.by_source, engine.options.conservative, now);
                c.apply(r);
            }
        }
    }

    /// Convert plain criteria to fused form with single-source provenance.
    /// Already-fused sets are returned unchanged.
    pub fn into_fused(self, source: DataSource, now: DateTime<Utc>) -> Self {
        match self {
            CriteriaSet::Basic(v) => CriteriaSet::Fused(
                v.iter()
                    .map(|c| FusedCriterion::from_scoring(c, source, now))
                    .collect(),
            ),
            fused => fused,
        }
    }
}

/// Default weights of the prefilled template; they sum to 100.
pub const TEMPLATE: [(CriterionId, f64, f64); 6] = [
    (CriterionId::Revenue, 25.0, 50_000.0),
    (CriterionId::Demand, 25.0, 50_000.0),
    (CriterionId::Competition, 20.0, 100.0),
    (CriterionId::Barriers, 10.0, 100.0),
    (CriterionId::Seasonality, 10.0, 100.0),
    (CriterionId::Profitability, 10.0, 100.0),
];

/// Neutral value for criteria an export cannot inform.
const NEUTRAL: f64 = 50.0;

/// Competition on a 0..100 scale from a label, else from competitor count.
pub fn competition_value(product: &ProductRecord) -> f64 {
    match product.competition_label.as_deref() {
        Some(label) if !label.trim().is_empty() => normalize_competition(label),
        _ => (product.competing_products.max(1.0).log10() / 4.0 * 100.0).min(100.0),
    }
}

/// Build the default criteria template for one imported product.
pub fn prefill_from_product(product: &ProductRecord) -> Vec<ScoringCriterion> {
    TEMPLATE
        .iter()
        .map(|(id, weight, max)| {
            let value = match id {
                CriterionId::Revenue => product.revenue,
                CriterionId::Demand => product.search_volume,
                CriterionId::Competition => competition_value(product),
                _ => NEUTRAL,
            };
            ScoringCriterion::new(id.clone(), *weight, value, *max)
        })
        .collect()
}

fn clamp01(x: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0)
    }
}
