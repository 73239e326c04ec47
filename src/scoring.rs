// src/scoring.rs
//! Weighted criteria score.
//!
//! Per criterion: `normalized = inverted ? max - value : value`,
//! `percentage = normalized / max × 100` (clamped to 0..=100),
//! `contribution = percentage × weight / 100`.
//! Overall: `round(Σ contribution / Σ weight × 100)`, which is the plain sum
//! whenever the weights total 100.

use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use serde::Serialize;

use crate::criteria::{CriteriaSet, Criterion, CriterionId};

const WEIGHT_SUM_TOLERANCE: f64 = 0.5;
pub const DEFAULT_WEAKEST: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Contribution {
    pub id: CriterionId,
    pub name: String,
    pub weight: f64,
    pub value: f64,
    pub max_value: f64,
    pub inverted: bool,
    pub percentage: f64,
    pub weighted_contribution: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
    /// 0..=100.
    pub score: u8,
    pub total_weight: f64,
    pub contributions: Vec<Contribution>,
    pub warnings: Vec<String>,
}

/// Suggested follow-up for a low-scoring criterion.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeakCriterion {
    pub id: CriterionId,
    pub weighted_contribution: f64,
    pub action: String,
}

fn contribution(c: &dyn Criterion) -> Contribution {
    let inverted = c.is_inverted();
    let max = c.max_value();
    let weight = c.weight().max(0.0);
    let percentage = if max > 0.0 && c.value().is_finite() {
        let normalized = if inverted { max - c.value() } else { c.value() };
        (normalized / max * 100.0).clamp(0.0, 100.0)
    } else {
        0.0
    };
    Contribution {
        id: c.id().clone(),
        name: c.name().to_string(),
        weight,
        value: c.value(),
        max_value: max,
        inverted,
        percentage,
        weighted_contribution: percentage * weight / 100.0,
    }
}

/// Full breakdown; warnings are informational only.
pub fn score_breakdown(criteria: &CriteriaSet) -> ScoreBreakdown {
    static DESCRIBED: OnceCell<()> = OnceCell::new();
    DESCRIBED.get_or_init(|| {
        describe_counter!("scoring_runs_total", "Score breakdowns computed.");
    });
    counter!("scoring_runs_total").increment(1);

    let contributions: Vec<Contribution> = criteria.iter().map(contribution).collect();
    let total_weight: f64 = contributions.iter().map(|c| c.weight).sum();
    let sum: f64 = contributions.iter().map(|c| c.weighted_contribution).sum();

    let score = if total_weight > 0.0 {
        (sum / total_weight * 100.0).round().clamp(0.0, 100.0) as u8
    } else {
        0
    };

    let mut warnings = Vec::new();
    if !contributions.is_empty() && (total_weight - 100.0).abs() > WEIGHT_SUM_TOLERANCE {
        warnings.push(format!(
            "Criteria weights sum to {total_weight:.1}, not 100; the score is normalized by the total weight."
        ));
    }

    ScoreBreakdown {
        score,
        total_weight,
        contributions,
        warnings,
    }
}

pub fn compute_score(criteria: &CriteriaSet) -> u8 {
    score_breakdown(criteria).score
}

pub fn remediation_action(id: &CriterionId) -> String {
    match id {
        CriterionId::Margin | CriterionId::Profitability => "recheck freight/COGS".into(),
        CriterionId::Demand => "validate seasonality".into(),
        CriterionId::Competition => "analyze top 10 competitors".into(),
        CriterionId::Barriers => "research regulatory barriers".into(),
        other => format!("gather more {other} data"),
    }
}

/// Lowest weighted contributions first, at most `n`.
pub fn weakest_criteria(breakdown: &ScoreBreakdown, n: usize) -> Vec<WeakCriterion> {
    let mut ranked: Vec<&Contribution> = breakdown.contributions.iter().collect();
    ranked.sort_by(|a, b| {
        a.weighted_contribution
            .total_cmp(&b.weighted_contribution)
            .then_with(|| a.id.cmp(&b.id))
    });
    ranked
        .into_iter()
        .take(n)
        .map(|c| WeakCriterion {
            id: c.id.clone(),
            weighted_contribution: c.weighted_contribution,
            action: remediation_action(&c.id),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::ScoringCriterion;

    fn set(v: Vec<ScoringCriterion>) -> CriteriaSet {
        CriteriaSet::Basic(v)
    }

    #[test]
    fn two_criteria_scenario() {
        let b = score_breakdown(&set(vec![
            ScoringCriterion::new("revenue", 25.0, 25_000.0, 50_000.0),
            ScoringCriterion::new("competition", 20.0, 20.0, 100.0),
        ]));
        assert_eq!(b.contributions[0].weighted_contribution, 12.5);
        assert_eq!(b.contributions[1].weighted_contribution, 16.0);
        assert_eq!(b.total_weight, 45.0);
        // 28.5 / 45 × 100 = 63.3
        assert_eq!(b.score, 63);
        assert_eq!(b.warnings.len(), 1);
    }

    #[test]
    fn weights_of_100_give_plain_sum() {
        let b = score_breakdown(&set(vec![
            ScoringCriterion::new("revenue", 60.0, 50_000.0, 50_000.0),
            ScoringCriterion::new("demand", 40.0, 0.0, 50_000.0),
        ]));
        assert_eq!(b.score, 60);
        assert!(b.warnings.is_empty());
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let b = score_breakdown(&set(vec![
            ScoringCriterion::new("revenue", 50.0, 90_000.0, 50_000.0),
            ScoringCriterion::new("competition", 50.0, 150.0, 100.0),
        ]));
        assert_eq!(b.contributions[0].percentage, 100.0);
        assert_eq!(b.contributions[1].percentage, 0.0);
        assert_eq!(b.score, 50);
    }

    #[test]
    fn zero_max_contributes_nothing() {
        let b = score_breakdown(&set(vec![ScoringCriterion::new("demand", 100.0, 10.0, 0.0)]));
        assert_eq!(b.score, 0);
    }

    #[test]
    fn empty_set_scores_zero_without_warning() {
        let b = score_breakdown(&CriteriaSet::default());
        assert_eq!(b.score, 0);
        assert!(b.warnings.is_empty());
    }

    #[test]
    fn weakest_are_ranked_ascending_with_actions() {
        let b = score_breakdown(&set(vec![
            ScoringCriterion::new("revenue", 25.0, 40_000.0, 50_000.0),
            ScoringCriterion::new("demand", 25.0, 5_000.0, 50_000.0),
            ScoringCriterion::new("competition", 20.0, 90.0, 100.0),
            ScoringCriterion::new("barriers", 10.0, 50.0, 100.0),
            ScoringCriterion::new("profitability", 20.0, 50.0, 100.0),
        ]));
        let weak = weakest_criteria(&b, 3);
        let ids: Vec<_> = weak.iter().map(|w| w.id.clone()).collect();
        assert_eq!(
            ids,
            vec![CriterionId::Competition, CriterionId::Demand, CriterionId::Barriers]
        );
        assert_eq!(weak[0].action, "analyze top 10 competitors");
        assert_eq!(weak[1].action, "validate seasonality");
    }

    #[test]
    fn custom_criteria_get_generic_action() {
        assert_eq!(
            remediation_action(&CriterionId::Custom("shipping".into())),
            "gather more shipping data"
        );
    }
}
