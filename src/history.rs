//! history.rs: append-only audit log owned by an opportunity.
//!
//! Entries can be appended and read, never edited or removed. The inner
//! vector is private so the only mutation path is `append`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Import,
    Validation,
    ScoreUpdate,
    Decision,
    Refresh,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub kind: EntryKind,
    pub date: DateTime<Utc>,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_score: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_score: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_change: Option<i16>,
}

impl HistoryEntry {
    pub fn new(kind: EntryKind, date: DateTime<Utc>, summary: impl Into<String>) -> Self {
        Self {
            kind,
            date,
            summary: summary.into(),
            old_score: None,
            new_score: None,
            score_change: None,
        }
    }

    /// Attach old/new score; the delta is derived.
    pub fn scores(mut self, old: u8, new: u8) -> Self {
        self.old_score = Some(old);
        self.new_score = Some(new);
        self.score_change = Some(i16::from(new) - i16::from(old));
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History(Vec<HistoryEntry>);

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, entry: HistoryEntry) {
        self.0.push(entry);
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&HistoryEntry> {
        self.0.last()
    }

    /// Most recent `n` entries, oldest first.
    pub fn last_n(&self, n: usize) -> &[HistoryEntry] {
        let start = self.0.len().saturating_sub(n);
        &self.0[start..]
    }
}
