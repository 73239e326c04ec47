//! decision.rs: the recorded go / no-go call on an opportunity, plus
//! explainability reasons attached by the recommendation engine.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DecisionError;

/// Decision-tree outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Branch {
    Proceed,
    GatherData,
    Reject,
}

impl Branch {
    pub fn as_str(self) -> &'static str {
        match self {
            Branch::Proceed => "proceed",
            Branch::GatherData => "gather-data",
            Branch::Reject => "reject",
        }
    }
}

/// One human-readable line of explanation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reason {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ReasonKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonKind {
    Score,
    Gate,
    Closeness,
    Weakness,
    Other,
}

impl Reason {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: None,
        }
    }

    pub fn kind(mut self, kind: ReasonKind) -> Self {
        self.kind = Some(kind);
        self
    }
}

/// Decision record stored on an opportunity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub branch: Branch,
    /// Required iff `branch == Reject`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub decided_at: DateTime<Utc>,
    /// gate name → passed.
    #[serde(default)]
    pub gates: BTreeMap<String, bool>,
    #[serde(default)]
    pub weakest_criteria: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<Reason>,
}

impl Decision {
    pub fn new(branch: Branch, decided_at: DateTime<Utc>) -> Self {
        Self {
            branch,
            reason: None,
            decided_at,
            gates: BTreeMap::new(),
            weakest_criteria: Vec::new(),
            reasons: Vec::new(),
        }
    }

    pub fn proceed(decided_at: DateTime<Utc>) -> Self {
        Self::new(Branch::Proceed, decided_at)
    }
    pub fn gather_data(decided_at: DateTime<Utc>) -> Self {
        Self::new(Branch::GatherData, decided_at)
    }
    pub fn reject(reason: impl Into<String>, decided_at: DateTime<Utc>) -> Self {
        Self::new(Branch::Reject, decided_at).with_rejection_reason(reason)
    }

    pub fn with_rejection_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_gates(mut self, gates: BTreeMap<String, bool>) -> Self {
        self.gates = gates;
        self
    }

    pub fn with_weakest(mut self, ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.weakest_criteria = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_reason(mut self, r: Reason) -> Self {
        self.reasons.push(r);
        self
    }

    /// A reject needs a non-blank reason; other branches must not carry one.
    pub fn validate(&self) -> Result<(), DecisionError> {
        let has_reason = self
            .reason
            .as_deref()
            .is_some_and(|r| !r.trim().is_empty());
        match (self.branch, has_reason) {
            (Branch::Reject, false) => Err(DecisionError::ReasonRequired),
            (Branch::Proceed | Branch::GatherData, _) if self.reason.is_some() => {
                Err(DecisionError::ReasonNotAllowed)
            }
            _ => Ok(()),
        }
    }
}
