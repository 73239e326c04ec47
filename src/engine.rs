//! # Recommendation Engine
//! Pure mapping `(criteria, thresholds)` → gates + recommendation. No I/O.
//!
//! Policy:
//! - score ≥ 80 and all four gates pass → proceed
//! - score ≥ 60 and at least two gates pass → gather-data
//! - not every gate passes but two of the three primary checks are within
//!   the closeness tolerance → gather-data
//! - otherwise → reject
//!
//! Missing revenue, demand or competition yields `InsufficientData`, never
//! a reject.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::criteria::{CriteriaSet, CriterionId};
use crate::decision::{Branch, Reason, ReasonKind};
use crate::scoring::{score_breakdown, weakest_criteria, WeakCriterion, DEFAULT_WEAKEST};

pub const PROCEED_SCORE: u8 = 80;
pub const GATHER_SCORE: u8 = 60;
pub const GATHER_MIN_GATES: usize = 2;
pub const CLOSE_PRIMARY_NEEDED: usize = 2;

/// Criteria a recommendation cannot be made without.
pub const REQUIRED: [CriterionId; 3] = [
    CriterionId::Revenue,
    CriterionId::Demand,
    CriterionId::Competition,
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateThresholds {
    /// Monthly revenue, currency units.
    pub min_revenue: f64,
    /// Monthly searches.
    pub min_demand: f64,
    /// Competition on a 0..100 scale.
    pub max_competition: f64,
    /// Margin percent.
    pub min_margin: f64,
    /// Relative miss still counted as "close" (0.20 = 20%).
    pub closeness_tolerance: f64,
}

impl Default for GateThresholds {
    fn default() -> Self {
        Self {
            min_revenue: 5_000.0,
            min_demand: 1_000.0,
            max_competition: 70.0,
            min_margin: 20.0,
            closeness_tolerance: 0.20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    AtLeast,
    AtMost,
}

impl Comparison {
    pub fn symbol(self) -> &'static str {
        match self {
            Comparison::AtLeast => ">=",
            Comparison::AtMost => "<=",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GateCheck {
    pub name: &'static str,
    pub value: Option<f64>,
    pub threshold: f64,
    pub comparison: Comparison,
    pub passed: bool,
    /// Passed, or missed by no more than the tolerance.
    pub close: bool,
    pub primary: bool,
}

impl GateCheck {
    fn new(
        name: &'static str,
        value: Option<f64>,
        threshold: f64,
        comparison: Comparison,
        tolerance: f64,
        primary: bool,
    ) -> Self {
        let (passed, close) = match value {
            None => (false, false),
            Some(v) => match comparison {
                Comparison::AtLeast => (v >= threshold, v >= threshold * (1.0 - tolerance)),
                Comparison::AtMost => (v <= threshold, v <= threshold * (1.0 + tolerance)),
            },
        };
        Self {
            name,
            value,
            threshold,
            comparison,
            passed,
            close,
            primary,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GateReport {
    pub checks: Vec<GateCheck>,
}

impl GateReport {
    pub fn passed_count(&self) -> usize {
        self.checks.iter().filter(|c| c.passed).count()
    }

    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    pub fn close_primary_count(&self) -> usize {
        self.checks.iter().filter(|c| c.primary && c.close).count()
    }

    pub fn as_map(&self) -> BTreeMap<String, bool> {
        self.checks
            .iter()
            .map(|c| (c.name.to_string(), c.passed))
            .collect()
    }
}

/// The four gates. Margin reads `margin`, else `profitability`; a missing
/// value fails its gate.
pub fn evaluate_gates(criteria: &CriteriaSet, t: &GateThresholds) -> GateReport {
    let tol = t.closeness_tolerance;
    let margin = criteria
        .value_of(&CriterionId::Margin)
        .or_else(|| criteria.value_of(&CriterionId::Profitability));
    GateReport {
        checks: vec![
            GateCheck::new(
                "revenue",
                criteria.value_of(&CriterionId::Revenue),
                t.min_revenue,
                Comparison::AtLeast,
                tol,
                true,
            ),
            GateCheck::new(
                "demand",
                criteria.value_of(&CriterionId::Demand),
                t.min_demand,
                Comparison::AtLeast,
                tol,
                true,
            ),
            GateCheck::new(
                "competition",
                criteria.value_of(&CriterionId::Competition),
                t.max_competition,
                Comparison::AtMost,
                tol,
                true,
            ),
            GateCheck::new("margin", margin, t.min_margin, Comparison::AtLeast, tol, false),
        ],
    }
}

/// Everything needed to present a recommendation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assessment {
    pub score: u8,
    pub branch: Branch,
    pub gates: GateReport,
    pub weakest: Vec<WeakCriterion>,
    pub reasons: Vec<Reason>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Evaluated(Assessment),
    InsufficientData { missing: Vec<CriterionId> },
}

impl Outcome {
    pub fn branch(&self) -> Option<Branch> {
        match self {
            Outcome::Evaluated(a) => Some(a.branch),
            Outcome::InsufficientData { .. } => None,
        }
    }
}

/// Branch from score and gates alone.
pub fn branch_for(score: u8, gates: &GateReport) -> (Branch, ReasonKind) {
    let passed = gates.passed_count();
    if score >= PROCEED_SCORE && gates.all_passed() {
        (Branch::Proceed, ReasonKind::Score)
    } else if score >= GATHER_SCORE && passed >= GATHER_MIN_GATES {
        (Branch::GatherData, ReasonKind::Score)
    } else if !gates.all_passed() && gates.close_primary_count() >= CLOSE_PRIMARY_NEEDED {
        (Branch::GatherData, ReasonKind::Closeness)
    } else {
        (Branch::Reject, ReasonKind::Score)
    }
}

pub fn recommend(criteria: &CriteriaSet, thresholds: &GateThresholds) -> Outcome {
    let missing: Vec<CriterionId> = REQUIRED
        .iter()
        .filter(|id| criteria.get(id).is_none())
        .cloned()
        .collect();
    if !missing.is_empty() {
        debug!(target: "engine", ?missing, "insufficient data for a recommendation");
        return Outcome::InsufficientData { missing };
    }

    let breakdown = score_breakdown(criteria);
    let gates = evaluate_gates(criteria, thresholds);
    let weakest = weakest_criteria(&breakdown, DEFAULT_WEAKEST);
    let (branch, kind) = branch_for(breakdown.score, &gates);

    let mut reasons = vec![Reason::new(format!(
        "Score {} with {}/{} gates passing",
        breakdown.score,
        gates.passed_count(),
        gates.checks.len()
    ))
    .kind(kind)];
    if kind == ReasonKind::Closeness {
        reasons.push(
            Reason::new(format!(
                "{} of 3 primary checks are within {:.0}% of their thresholds",
                gates.close_primary_count(),
                thresholds.closeness_tolerance * 100.0
            ))
            .kind(ReasonKind::Closeness),
        );
    }
    for g in gates.checks.iter().filter(|g| !g.passed) {
        let msg = match g.value {
            Some(v) => format!(
                "Gate {} failed: {v} (needs {} {})",
                g.name,
                g.comparison.symbol(),
                g.threshold
            ),
            None => format!("Gate {} failed: no data", g.name),
        };
        reasons.push(Reason::new(msg).kind(ReasonKind::Gate));
    }
    for w in &weakest {
        reasons.push(Reason::new(format!("Weak {}: {}", w.id, w.action)).kind(ReasonKind::Weakness));
    }

    debug!(
        target: "engine",
        score = breakdown.score,
        gates_passed = gates.passed_count(),
        branch = branch.as_str(),
        "recommendation"
    );

    Outcome::Evaluated(Assessment {
        score: breakdown.score,
        branch,
        gates,
        weakest,
        reasons,
        warnings: breakdown.warnings,
    })
}
