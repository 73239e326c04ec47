//! Error taxonomy for the workbench core.
//!
//! Only true failures live here. Mapping gaps, weight-sum mismatches and
//! small keyword corpora are reported as warnings on the result types.

use thiserror::Error;

use crate::criteria::CriterionId;
use crate::opportunity::Status;

/// Fatal problems with an uploaded CSV export.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImportError {
    /// Nothing but whitespace (or nothing at all) was uploaded.
    #[error("the file is empty")]
    Empty,
    /// A header row exists but every data row was blank.
    #[error("the file has a header row but no data rows")]
    NoDataRows,
    /// A column the import cannot proceed without is absent.
    #[error("required column `{0}` was not found")]
    MissingColumn(&'static str),
}

/// Validation failures when recording a user decision.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecisionError {
    #[error("a reason is required when rejecting an opportunity")]
    ReasonRequired,
    #[error("a reason may only be given when rejecting an opportunity")]
    ReasonNotAllowed,
}

/// Illegal mutations of an opportunity.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LifecycleError {
    #[error("cannot move opportunity from {from:?} to {to:?}")]
    InvalidTransition { from: Status, to: Status },
    #[error("opportunity is archived")]
    Archived,
    #[error("opportunity has no criterion `{0}`")]
    UnknownCriterion(CriterionId),
    #[error(transparent)]
    Decision(#[from] DecisionError),
}

/// Persistence collaborator failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Local store would grow beyond its configured quota.
    #[error("local storage quota exceeded ({needed} bytes needed, quota {quota})")]
    QuotaExceeded { needed: usize, quota: usize },
    #[error("storage io: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage encoding: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("remote store: {0}")]
    Remote(String),
    #[error("opportunity `{0}` not found")]
    NotFound(String),
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        StoreError::Remote(e.to_string())
    }
}
