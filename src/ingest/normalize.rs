// src/ingest/normalize.rs
//! Value coercion for vendor-formatted cells.
//!
//! `normalize_value` is total: every input yields a finite number >= 0.
//! Unparseable cells become 0 so a dirty export never stops an import.

use once_cell::sync::Lazy;
use regex::Regex;

/// Fixed anchors for categorical competition labels.
pub const COMPETITION_LOW: f64 = 25.0;
pub const COMPETITION_MEDIUM: f64 = 50.0;
pub const COMPETITION_HIGH: f64 = 75.0;

static RE_STRIP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\s$€£¥₹,%<>~≈+]").expect("strip regex"));

/// Parse a vendor cell into a number, or `None` when it is not numeric.
///
/// Handles currency symbols, thousands separators, percent signs, comparison
/// prefixes (`>306`) and `K`/`M` suffixes. Negative and non-finite results are
/// treated as unparseable.
pub fn try_normalize_value(raw: &str) -> Option<f64> {
    let cleaned = RE_STRIP.replace_all(raw.trim(), "");
    let cleaned = cleaned.as_ref();
    if cleaned.is_empty() {
        return None;
    }

    let (digits, multiplier) = match cleaned.chars().last() {
        Some('k') | Some('K') => (&cleaned[..cleaned.len() - 1], 1_000.0),
        Some('m') | Some('M') => (&cleaned[..cleaned.len() - 1], 1_000_000.0),
        _ => (cleaned, 1.0),
    };

    let v = digits.parse::<f64>().ok()? * multiplier;
    if v.is_finite() && v >= 0.0 {
        Some(v)
    } else {
        None
    }
}

/// Total coercion: returns 0 for empty or unparseable input.
pub fn normalize_value(raw: &str) -> f64 {
    try_normalize_value(raw).unwrap_or(0.0)
}

/// Map `low`/`medium`/`high` to fixed anchors, else parse as a number, else 50.
pub fn normalize_competition(text: &str) -> f64 {
    match text.trim().to_ascii_lowercase().as_str() {
        "low" => COMPETITION_LOW,
        "medium" => COMPETITION_MEDIUM,
        "high" => COMPETITION_HIGH,
        other => try_normalize_value(other).unwrap_or(COMPETITION_MEDIUM),
    }
}
