// src/ingest/types.rs
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One product row from a Black Box style export, normalized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRecord {
    pub asin: String,
    pub title: String,
    pub brand: String,
    pub category: String,
    pub price: f64,
    pub revenue: f64,
    pub parent_revenue: f64,
    pub sales: f64,
    pub bsr: f64,
    pub rating: f64,
    pub review_count: f64,
    pub search_volume: f64,
    pub competing_products: f64,
    pub sellers: f64,
    /// Categorical or numeric competition cell, kept verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub competition_label: Option<String>,
    pub dimensions: String,
    pub weight: String,
    pub fulfillment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_keyword: Option<KeywordSuggestion>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggested_keywords: Vec<KeywordSuggestion>,
    /// Every cell of the source row, keyed by header.
    #[serde(default)]
    pub raw_data: BTreeMap<String, String>,
    /// Cells whose headers did not map to a canonical field.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Which keyword tool produced an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeywordSource {
    /// Keyword research without per-ASIN columns.
    Magnet,
    /// Reverse-ASIN lookup; the export carries ASIN columns.
    Cerebro,
}

/// One keyword row from a Magnet/Cerebro export, normalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordRecord {
    pub keyword: String,
    pub search_volume: f64,
    pub competing_products: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpc: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seasonality: Option<String>,
    pub source: KeywordSource,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl KeywordRecord {
    pub fn new(keyword: impl Into<String>, search_volume: f64, competing_products: f64) -> Self {
        Self {
            keyword: keyword.into(),
            search_volume,
            competing_products,
            cpc: None,
            seasonality: None,
            source: KeywordSource::Magnet,
            metadata: BTreeMap::new(),
        }
    }
}

/// A ranked keyword candidate for a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordSuggestion {
    pub keyword: String,
    pub search_volume: f64,
    pub competing_products: f64,
    /// Relevance in roughly [0,1].
    pub score: f64,
}
