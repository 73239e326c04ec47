// src/opportunity.rs
//! Opportunity aggregate and its lifecycle.
//!
//! ```text
//! draft ──score──▶ scored ──gather-data──▶ analyzing ──proceed──▶ sourcing
//!                    │  └──────proceed──────────────────────────▶ sourcing
//!                    └──reject──▶ archived ◀──reject── analyzing / sourcing
//! ```
//!
//! Every mutating call appends exactly one history entry. Archived
//! opportunities are read-only.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::criteria::{prefill_from_product, CriteriaSet, CriterionId, DataSource};
use crate::decision::{Branch, Decision};
use crate::error::LifecycleError;
use crate::fusion::{FusionEngine, FusionResult};
use crate::history::{EntryKind, History, HistoryEntry};
use crate::ingest::types::ProductRecord;
use crate::scoring::compute_score;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Draft,
    Scored,
    Analyzing,
    Sourcing,
    Archived,
}

impl Status {
    pub fn can_transition_to(self, to: Status) -> bool {
        use Status::*;
        matches!(
            (self, to),
            (Draft, Scored)
                | (Scored, Analyzing | Sourcing | Archived)
                | (Analyzing, Analyzing | Sourcing | Archived)
                | (Sourcing, Archived)
        )
    }

    /// Status a decision branch moves the opportunity to.
    pub fn after(branch: Branch) -> Status {
        match branch {
            Branch::Proceed => Status::Sourcing,
            Branch::GatherData => Status::Analyzing,
            Branch::Reject => Status::Archived,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Draft => "draft",
            Status::Scored => "scored",
            Status::Analyzing => "analyzing",
            Status::Sourcing => "sourcing",
            Status::Archived => "archived",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRecord {
    pub validated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub margin_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// One criterion's before/after in a refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriterionChange {
    pub id: CriterionId,
    pub old_value: f64,
    pub new_value: f64,
    /// `None` when the old value was 0.
    pub pct_change: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshData {
    pub refreshed_at: DateTime<Utc>,
    pub old_score: u8,
    pub new_score: u8,
    pub score_change: i16,
    pub changes: Vec<CriterionChange>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Opportunity {
    pub id: String,
    pub product_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asin: Option<String>,
    criteria: CriteriaSet,
    final_score: u8,
    status: Status,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_refreshed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imported_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    decision: Option<Decision>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    validation: Option<ValidationRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sourcing_packet: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_data: Option<RefreshData>,
    #[serde(default)]
    history: History,
}

/// Stable-looking id from name + creation instant (first 8 bytes of sha256).
pub fn opportunity_id(product_name: &str, at: DateTime<Utc>) -> String {
    use sha2::{Digest, Sha256};
    use std::fmt::Write as _;

    let mut hasher = Sha256::new();
    hasher.update(product_name.as_bytes());
    hasher.update(at.to_rfc3339().as_bytes());
    let digest = hasher.finalize();
    let mut out = String::from("opp_");
    for b in digest.iter().take(8) {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

impl Opportunity {
    pub fn new(product_name: impl Into<String>, criteria: CriteriaSet, now: DateTime<Utc>) -> Self {
        let product_name = product_name.into();
        Self {
            id: opportunity_id(&product_name, now),
            product_name,
            asin: None,
            criteria,
            final_score: 0,
            status: Status::Draft,
            created_at: now,
            updated_at: now,
            last_refreshed_at: None,
            imported_at: None,
            decision: None,
            validation: None,
            sourcing_packet: None,
            refresh_data: None,
            history: History::new(),
        }
    }

    /// Draft opportunity prefilled from an imported product row.
    pub fn from_import(product: &ProductRecord, fingerprint: &str, now: DateTime<Utc>) -> Self {
        let name = if product.title.trim().is_empty() {
            product.asin.clone()
        } else {
            product.title.clone()
        };
        let mut opp = Self::new(name, CriteriaSet::Basic(prefill_from_product(product)), now);
        opp.asin = (!product.asin.is_empty()).then(|| product.asin.clone());
        opp.imported_at = Some(now);
        opp.history.append(HistoryEntry::new(
            EntryKind::Import,
            now,
            format!("Imported from export {fingerprint}"),
        ));
        opp
    }

    pub fn criteria(&self) -> &CriteriaSet {
        &self.criteria
    }
    pub fn final_score(&self) -> u8 {
        self.final_score
    }
    pub fn status(&self) -> Status {
        self.status
    }
    pub fn decision(&self) -> Option<&Decision> {
        self.decision.as_ref()
    }
    pub fn validation(&self) -> Option<&ValidationRecord> {
        self.validation.as_ref()
    }
    pub fn sourcing_packet(&self) -> Option<&serde_json::Value> {
        self.sourcing_packet.as_ref()
    }
    pub fn refresh_data(&self) -> Option<&RefreshData> {
        self.refresh_data.as_ref()
    }
    pub fn history(&self) -> &History {
        &self.history
    }

    /// Called by stores on every save.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    fn ensure_open(&self) -> Result<(), LifecycleError> {
        if self.status == Status::Archived {
            Err(LifecycleError::Archived)
        } else {
            Ok(())
        }
    }

    fn move_to(&mut self, to: Status) -> Result<(), LifecycleError> {
        if !self.status.can_transition_to(to) {
            return Err(LifecycleError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    /// Recompute the score. A draft becomes `scored`.
    pub fn record_score(&mut self, now: DateTime<Utc>) -> Result<u8, LifecycleError> {
        self.ensure_open()?;
        let old = self.final_score;
        let new = compute_score(&self.criteria);
        if self.status == Status::Draft {
            self.move_to(Status::Scored)?;
        }
        self.final_score = new;
        self.updated_at = now;
        self.history.append(
            HistoryEntry::new(EntryKind::ScoreUpdate, now, format!("Scored {new}/100"))
                .scores(old, new),
        );
        Ok(new)
    }

    /// Store a user decision and move along the lifecycle.
    pub fn apply_decision(&mut self, decision: Decision, now: DateTime<Utc>) -> Result<Status, LifecycleError> {
        decision.validate()?;
        self.ensure_open()?;
        let to = Status::after(decision.branch);
        self.move_to(to)?;

        let mut summary = format!(
            "Decision: {} at score {}",
            decision.branch.as_str(),
            self.final_score
        );
        if let Some(r) = &decision.reason {
            summary.push_str(&format!(" ({})", r.trim()));
        }
        if decision.branch == Branch::Proceed {
            self.sourcing_packet = Some(json!({
                "productName": self.product_name,
                "asin": self.asin,
                "score": self.final_score,
                "decidedAt": decision.decided_at,
                "gates": decision.gates,
            }));
        }
        self.decision = Some(decision);
        self.updated_at = now;
        self.history
            .append(HistoryEntry::new(EntryKind::Decision, now, summary));
        Ok(to)
    }

    /// Apply edited criterion values and re-score. Always appends one
    /// refresh entry; status is unchanged. Fused criteria take edits as
    /// `manual` observations.
    pub fn refresh(
        &mut self,
        edits: &BTreeMap<CriterionId, f64>,
        engine: &FusionEngine,
        now: DateTime<Utc>,
    ) -> Result<RefreshData, LifecycleError> {
        self.ensure_open()?;
        if let Some(unknown) = edits.keys().find(|id| self.criteria.get(id).is_none()) {
            return Err(LifecycleError::UnknownCriterion(unknown.clone()));
        }

        let old_score = self.final_score;
        let mut changes = Vec::new();
        for (id, &value) in edits {
            let old_value = self.criteria.value_of(id).unwrap_or_default();
            match &mut self.criteria {
                CriteriaSet::Basic(items) => {
                    if let Some(c) = items.iter_mut().find(|c| &c.id == id) {
                        c.value = value;
                    }
                }
                CriteriaSet::Fused(items) => {
                    if let Some(c) = items.iter_mut().find(|c| &c.id == id) {
                        engine.update_criterion_with_source_data_at(
                            c,
                            DataSource::Manual,
                            value,
                            None,
                            Some("refresh".into()),
                            now,
                        );
                    }
                }
            }
            let new_value = self.criteria.value_of(id).unwrap_or_default();
            if new_value != old_value {
                changes.push(CriterionChange {
                    id: id.clone(),
                    old_value,
                    new_value,
                    pct_change: (old_value != 0.0)
                        .then(|| (new_value - old_value) / old_value.abs() * 100.0),
                });
            }
        }

        let new_score = compute_score(&self.criteria);
        let score_change = i16::from(new_score) - i16::from(old_score);
        let summary = if score_change == 0 {
            "Refresh: no significant changes".to_string()
        } else {
            let diffs: Vec<String> = changes.iter().map(describe_change).collect();
            format!(
                "Refresh: {}; score {old_score} → {new_score}",
                if diffs.is_empty() { "recomputed".to_string() } else { diffs.join(", ") }
            )
        };

        let data = RefreshData {
            refreshed_at: now,
            old_score,
            new_score,
            score_change,
            changes,
        };
        self.final_score = new_score;
        self.last_refreshed_at = Some(now);
        self.updated_at = now;
        self.refresh_data = Some(data.clone());
        self.history.append(
            HistoryEntry::new(EntryKind::Refresh, now, summary).scores(old_score, new_score),
        );
        Ok(data)
    }

    /// Record one source's observation. Plain criteria are migrated to fused
    /// form first (existing values become `manual` observations).
    #[allow(clippy::too_many_arguments)]
    pub fn update_source_data(
        &mut self,
        criterion: &CriterionId,
        source: DataSource,
        value: f64,
        confidence: Option<f64>,
        notes: Option<String>,
        engine: &FusionEngine,
        now: DateTime<Utc>,
    ) -> Result<FusionResult, LifecycleError> {
        self.ensure_open()?;
        if self.criteria.get(criterion).is_none() {
            return Err(LifecycleError::UnknownCriterion(criterion.clone()));
        }
        if !self.criteria.is_fused() {
            let basic = std::mem::take(&mut self.criteria);
            self.criteria = basic.into_fused(DataSource::Manual, now);
        }

        let CriteriaSet::Fused(items) = &mut self.criteria else {
            return Err(LifecycleError::UnknownCriterion(criterion.clone()));
        };
        let Some(target) = items.iter_mut().find(|c| &c.id == criterion) else {
            return Err(LifecycleError::UnknownCriterion(criterion.clone()));
        };
        let result = engine.update_criterion_with_source_data_at(target, source, value, confidence, notes, now);

        let old = self.final_score;
        let new = compute_score(&self.criteria);
        self.final_score = new;
        self.updated_at = now;
        self.history.append(
            HistoryEntry::new(
                EntryKind::ScoreUpdate,
                now,
                format!(
                    "{source} {criterion}: {value}; fused {} (disagreement {:.1}%)",
                    result.fused_value, result.metadata.disagreement_index
                ),
            )
            .scores(old, new),
        );
        Ok(result)
    }

    pub fn attach_validation(&mut self, record: ValidationRecord, now: DateTime<Utc>) -> Result<(), LifecycleError> {
        self.ensure_open()?;
        let summary = match record.margin_pct {
            Some(m) => format!("Validated: margin {m:.1}%"),
            None => "Validated".to_string(),
        };
        self.validation = Some(record);
        self.updated_at = now;
        self.history
            .append(HistoryEntry::new(EntryKind::Validation, now, summary));
        Ok(())
    }
}

fn describe_change(c: &CriterionChange) -> String {
    match c.pct_change {
        Some(p) => format!("{} {:+.1}%", c.id, p),
        None => format!("{} set to {}", c.id, c.new_value),
    }
}
