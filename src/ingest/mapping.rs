// src/ingest/mapping.rs
//! Header auto-mapping for vendor exports.
//!
//! Each vendor format has a table of canonical fields and the header
//! spellings that stand for them. Lookup is case-insensitive; a field is
//! fixed by the first (synonym, header) pair that matches, and a header is
//! never claimed by two fields.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::types::KeywordSource;

/// Canonical field names the importers understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CanonicalField {
    Asin,
    Title,
    Brand,
    Category,
    Bsr,
    Price,
    Revenue,
    ParentRevenue,
    Sales,
    ReviewCount,
    Rating,
    Sellers,
    Competition,
    Dimensions,
    Weight,
    Fulfillment,
    Keyword,
    SearchVolume,
    CompetingProducts,
    Cpc,
    KeywordSales,
    SearchVolumeTrend,
    TitleDensity,
    OrganicRank,
}

/// How a synonym is compared against a lowercased header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    Exact,
    Contains,
}

/// Vendor export layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportFormat {
    BlackBox,
    Magnet,
    Cerebro,
}

type Entry = (CanonicalField, MatchMode, &'static [&'static str]);

// Order matters: more specific fields come before the generic ones that
// would otherwise swallow their headers ("parent level revenue" vs "revenue").
const BLACK_BOX_TABLE: &[Entry] = &[
    (CanonicalField::Asin, MatchMode::Exact, &["asin"]),
    (
        CanonicalField::Title,
        MatchMode::Contains,
        &["product title", "title", "product name"],
    ),
    (CanonicalField::Brand, MatchMode::Contains, &["brand"]),
    (CanonicalField::Category, MatchMode::Exact, &["category", "product category"]),
    (
        CanonicalField::Bsr,
        MatchMode::Contains,
        &["best seller rank", "bsr", "category bsr"],
    ),
    (
        CanonicalField::ParentRevenue,
        MatchMode::Contains,
        &["parent level revenue"],
    ),
    (
        CanonicalField::Revenue,
        MatchMode::Contains,
        &["asin revenue", "monthly revenue", "revenue"],
    ),
    (
        CanonicalField::Sales,
        MatchMode::Contains,
        &["asin sales", "monthly sales", "sales"],
    ),
    (CanonicalField::Price, MatchMode::Contains, &["price"]),
    (
        CanonicalField::ReviewCount,
        MatchMode::Contains,
        &["review count", "reviews", "ratings count"],
    ),
    (CanonicalField::Rating, MatchMode::Contains, &["review rating", "rating"]),
    (
        CanonicalField::SearchVolume,
        MatchMode::Contains,
        &["search volume", "monthly search volume"],
    ),
    (
        CanonicalField::CompetingProducts,
        MatchMode::Contains,
        &["competing products", "competitors", "num competitors"],
    ),
    (
        CanonicalField::Sellers,
        MatchMode::Contains,
        &["active sellers", "seller count", "sellers"],
    ),
    (
        CanonicalField::Competition,
        MatchMode::Contains,
        &["competition level", "competition"],
    ),
    (
        CanonicalField::Dimensions,
        MatchMode::Contains,
        &["dimensions", "size tier"],
    ),
    (CanonicalField::Weight, MatchMode::Contains, &["weight"]),
    (
        CanonicalField::Fulfillment,
        MatchMode::Contains,
        &["fulfillment", "fulfilled by"],
    ),
];

const KEYWORD_TABLE: &[Entry] = &[
    (
        CanonicalField::Keyword,
        MatchMode::Contains,
        &["keyword phrase", "keyword", "search term"],
    ),
    (
        CanonicalField::SearchVolumeTrend,
        MatchMode::Contains,
        &["search volume trend", "seasonality"],
    ),
    (
        CanonicalField::SearchVolume,
        MatchMode::Contains,
        &["search volume", "monthly search volume"],
    ),
    (
        CanonicalField::CompetingProducts,
        MatchMode::Contains,
        &["competing products", "competitors", "num competitors"],
    ),
    (
        CanonicalField::Cpc,
        MatchMode::Contains,
        &["cpc", "suggested ppc bid", "ppc bid"],
    ),
    (CanonicalField::KeywordSales, MatchMode::Contains, &["keyword sales"]),
    (CanonicalField::TitleDensity, MatchMode::Contains, &["title density"]),
    (CanonicalField::OrganicRank, MatchMode::Contains, &["organic rank"]),
    (CanonicalField::Asin, MatchMode::Exact, &["asin"]),
];

/// canonical field → source header.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FieldMapping {
    fields: BTreeMap<CanonicalField, String>,
}

impl FieldMapping {
    pub fn header(&self, field: CanonicalField) -> Option<&str> {
        self.fields.get(&field).map(String::as_str)
    }

    pub fn contains(&self, field: CanonicalField) -> bool {
        self.fields.contains_key(&field)
    }

    /// Column index of a mapped field within `headers`.
    pub fn index_in(&self, field: CanonicalField, headers: &[String]) -> Option<usize> {
        let h = self.header(field)?;
        headers.iter().position(|x| x == h)
    }

    /// True if `header` was claimed by any canonical field.
    pub fn is_mapped_header(&self, header: &str) -> bool {
        self.fields.values().any(|h| h == header)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn insert(&mut self, field: CanonicalField, header: &str) {
        self.fields.entry(field).or_insert_with(|| header.to_string());
    }
}

fn table_for(format: ImportFormat) -> &'static [Entry] {
    match format {
        ImportFormat::BlackBox => BLACK_BOX_TABLE,
        ImportFormat::Magnet | ImportFormat::Cerebro => KEYWORD_TABLE,
    }
}

/// Map `headers` against the table of `format`.
pub fn auto_map(headers: &[String], format: ImportFormat) -> FieldMapping {
    let lowered: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();
    let mut claimed = vec![false; headers.len()];
    let mut mapping = FieldMapping::default();

    for (field, mode, synonyms) in table_for(format) {
        'field: for syn in synonyms.iter() {
            // An exact spelling beats a header that merely contains the synonym.
            let passes: &[MatchMode] = match mode {
                MatchMode::Exact => &[MatchMode::Exact],
                MatchMode::Contains => &[MatchMode::Exact, MatchMode::Contains],
            };
            for pass in passes {
                for (i, h) in lowered.iter().enumerate() {
                    if claimed[i] {
                        continue;
                    }
                    let hit = match pass {
                        MatchMode::Exact => h == syn,
                        MatchMode::Contains => h.contains(syn),
                    };
                    if hit {
                        mapping.insert(*field, &headers[i]);
                        claimed[i] = true;
                        break 'field;
                    }
                }
            }
        }
    }

    mapping
}

static RE_ASIN_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^b0[a-z0-9]{8}$").expect("asin header regex"));

/// A keyword export with an ASIN-like column is a Cerebro export.
pub fn infer_keyword_source(headers: &[String]) -> KeywordSource {
    let asin_like = headers.iter().any(|h| {
        let t = h.trim();
        t.eq_ignore_ascii_case("asin") || RE_ASIN_HEADER.is_match(t)
    });
    if asin_like {
        KeywordSource::Cerebro
    } else {
        KeywordSource::Magnet
    }
}

impl From<KeywordSource> for ImportFormat {
    fn from(s: KeywordSource) -> Self {
        match s {
            KeywordSource::Magnet => ImportFormat::Magnet,
            KeywordSource::Cerebro => ImportFormat::Cerebro,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hs(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn black_box_headers_map_case_insensitively() {
        let headers = hs(&[
            "ASIN",
            "Product Title",
            "Brand",
            "Category BSR",
            "Parent Level Revenue",
            "ASIN Revenue",
            "Price  ($)",
            "Reviews",
            "Review Rating",
            "Unknown Column",
        ]);
        let m = auto_map(&headers, ImportFormat::BlackBox);
        assert_eq!(m.header(CanonicalField::Asin), Some("ASIN"));
        assert_eq!(m.header(CanonicalField::Title), Some("Product Title"));
        assert_eq!(m.header(CanonicalField::Bsr), Some("Category BSR"));
        assert_eq!(m.header(CanonicalField::Revenue), Some("ASIN Revenue"));
        assert_eq!(
            m.header(CanonicalField::ParentRevenue),
            Some("Parent Level Revenue")
        );
        assert_eq!(m.header(CanonicalField::ReviewCount), Some("Reviews"));
        assert_eq!(m.header(CanonicalField::Rating), Some("Review Rating"));
        assert_eq!(m.header(CanonicalField::Price), Some("Price  ($)"));
        assert!(!m.is_mapped_header("Unknown Column"));
    }

    #[test]
    fn first_match_wins_and_is_fixed() {
        let headers = hs(&["Revenue", "ASIN Revenue"]);
        let m = auto_map(&headers, ImportFormat::BlackBox);
        // "asin revenue" is the first synonym, so it claims the second header.
        assert_eq!(m.header(CanonicalField::Revenue), Some("ASIN Revenue"));
    }

    #[test]
    fn keyword_table_keeps_trend_apart_from_volume() {
        let headers = hs(&["Keyword Phrase", "Search Volume Trend", "Search Volume", "CPR"]);
        let m = auto_map(&headers, ImportFormat::Magnet);
        assert_eq!(m.header(CanonicalField::Keyword), Some("Keyword Phrase"));
        assert_eq!(
            m.header(CanonicalField::SearchVolumeTrend),
            Some("Search Volume Trend")
        );
        assert_eq!(m.header(CanonicalField::SearchVolume), Some("Search Volume"));
    }

    #[test]
    fn exact_header_beats_substring() {
        let headers = hs(&["Keyword Sales", "Keyword"]);
        let m = auto_map(&headers, ImportFormat::Magnet);
        assert_eq!(m.header(CanonicalField::Keyword), Some("Keyword"));
        assert_eq!(m.header(CanonicalField::KeywordSales), Some("Keyword Sales"));
    }

    #[test]
    fn asin_columns_mean_cerebro() {
        assert_eq!(
            infer_keyword_source(&hs(&["Keyword", "Search Volume"])),
            KeywordSource::Magnet
        );
        assert_eq!(
            infer_keyword_source(&hs(&["Keyword", "ASIN"])),
            KeywordSource::Cerebro
        );
        assert_eq!(
            infer_keyword_source(&hs(&["Keyword", "B07XYZ1234"])),
            KeywordSource::Cerebro
        );
    }
}
