// src/store/handoff.rs
//! Single-use mailbox between the import path and the scoring path.
//! A value is written once and taken once; taking clears it.

use std::sync::Mutex;

/// Key the import path writes prefilled criteria under.
pub const PREFILLED_SCORING_DATA: &str = "prefilled_scoring_data";

#[derive(Debug)]
pub struct HandoffSlot<T> {
    key: &'static str,
    slot: Mutex<Option<T>>,
}

impl<T> HandoffSlot<T> {
    pub fn new(key: &'static str) -> Self {
        Self {
            key,
            slot: Mutex::new(None),
        }
    }

    pub fn key(&self) -> &'static str {
        self.key
    }

    /// Store a value, replacing any unclaimed one.
    pub fn put(&self, value: T) {
        *self.slot.lock().unwrap_or_else(|p| p.into_inner()) = Some(value);
    }

    /// Take the value; a second take returns `None`.
    pub fn take(&self) -> Option<T> {
        self.slot.lock().unwrap_or_else(|p| p.into_inner()).take()
    }

    pub fn is_empty(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .is_none()
    }
}

impl<T> Default for HandoffSlot<T> {
    fn default() -> Self {
        Self::new(PREFILLED_SCORING_DATA)
    }
}
