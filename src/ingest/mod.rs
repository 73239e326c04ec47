// src/ingest/mod.rs
//! Import pipeline: raw export text → parsed CSV → mapped + normalized records.
//!
//! Parse errors are fatal. Mapping gaps only add warnings; downstream
//! fields default to 0 / empty.

pub mod csv;
pub mod mapping;
pub mod normalize;
pub mod types;

use std::collections::BTreeMap;

use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use serde::Serialize;

use crate::error::ImportError;
use mapping::{auto_map, infer_keyword_source, CanonicalField, FieldMapping, ImportFormat};
use normalize::{normalize_value, try_normalize_value};
use types::{KeywordRecord, ProductRecord};

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("import_rows_total", "Data rows turned into records.");
        describe_counter!(
            "import_dropped_rows_total",
            "Blank rows dropped while parsing."
        );
        describe_counter!(
            "import_warnings_total",
            "Non-fatal warnings attached to import results."
        );
    });
}

/// Short content fingerprint (first 6 bytes of sha256, hex).
pub fn fingerprint(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Outcome of importing a product research export.
#[derive(Debug, Clone, Serialize)]
pub struct ProductImport {
    pub format: ImportFormat,
    pub fingerprint: String,
    pub mapping: FieldMapping,
    pub products: Vec<ProductRecord>,
    pub blank_rows: usize,
    pub ragged_rows: usize,
    pub warnings: Vec<String>,
}

/// Outcome of importing a keyword export.
#[derive(Debug, Clone, Serialize)]
pub struct KeywordImport {
    pub format: ImportFormat,
    pub fingerprint: String,
    pub mapping: FieldMapping,
    pub keywords: Vec<KeywordRecord>,
    pub blank_rows: usize,
    pub ragged_rows: usize,
    pub warnings: Vec<String>,
}

/// Row accessor bound to one mapping.
struct RowView<'a> {
    headers: &'a [String],
    row: &'a [String],
    mapping: &'a FieldMapping,
}

impl<'a> RowView<'a> {
    fn text(&self, field: CanonicalField) -> &'a str {
        self.mapping
            .index_in(field, self.headers)
            .and_then(|i| self.row.get(i))
            .map(String::as_str)
            .unwrap_or("")
    }

    fn number(&self, field: CanonicalField) -> f64 {
        normalize_value(self.text(field))
    }

    fn raw_data(&self) -> BTreeMap<String, String> {
        self.headers
            .iter()
            .cloned()
            .zip(self.row.iter().cloned())
            .collect()
    }

    fn unmapped(&self) -> BTreeMap<String, String> {
        self.headers
            .iter()
            .zip(self.row.iter())
            .filter(|(h, _)| !self.mapping.is_mapped_header(h))
            .map(|(h, v)| (h.clone(), v.clone()))
            .collect()
    }
}

/// Import a Black Box style product export.
pub fn import_products(text: &str) -> Result<ProductImport, ImportError> {
    ensure_metrics_described();
    let parsed = csv::parse(text)?;
    let mapping = auto_map(&parsed.headers, ImportFormat::BlackBox);

    let mut warnings = Vec::new();
    for (field, label) in [
        (CanonicalField::Title, "title"),
        (CanonicalField::Asin, "ASIN"),
        (CanonicalField::Revenue, "revenue"),
    ] {
        if !mapping.contains(field) {
            warnings.push(format!(
                "No {label} column found; {label} defaults to empty/0."
            ));
        }
    }
    if parsed.ragged_rows > 0 {
        warnings.push(format!(
            "{} row(s) had a different number of cells than the header and were padded or cut.",
            parsed.ragged_rows
        ));
    }

    let products: Vec<ProductRecord> = parsed
        .rows
        .iter()
        .map(|row| {
            let v = RowView {
                headers: &parsed.headers,
                row,
                mapping: &mapping,
            };
            let competition = v.text(CanonicalField::Competition);
            ProductRecord {
                asin: v.text(CanonicalField::Asin).to_string(),
                title: v.text(CanonicalField::Title).to_string(),
                brand: v.text(CanonicalField::Brand).to_string(),
                category: v.text(CanonicalField::Category).to_string(),
                price: v.number(CanonicalField::Price),
                revenue: v.number(CanonicalField::Revenue),
                parent_revenue: v.number(CanonicalField::ParentRevenue),
                sales: v.number(CanonicalField::Sales),
                bsr: v.number(CanonicalField::Bsr),
                rating: v.number(CanonicalField::Rating),
                review_count: v.number(CanonicalField::ReviewCount),
                search_volume: v.number(CanonicalField::SearchVolume),
                competing_products: v.number(CanonicalField::CompetingProducts),
                sellers: v.number(CanonicalField::Sellers),
                competition_label: (!competition.is_empty()).then(|| competition.to_string()),
                dimensions: v.text(CanonicalField::Dimensions).to_string(),
                weight: v.text(CanonicalField::Weight).to_string(),
                fulfillment: v.text(CanonicalField::Fulfillment).to_string(),
                primary_keyword: None,
                suggested_keywords: Vec::new(),
                raw_data: v.raw_data(),
                metadata: v.unmapped(),
            }
        })
        .collect();

    let fp = fingerprint(text);
    record_import_metrics(products.len(), parsed.blank_rows, warnings.len());
    tracing::info!(
        target: "ingest",
        fingerprint = %fp,
        rows = products.len(),
        mapped = mapping.len(),
        warnings = warnings.len(),
        "product export imported"
    );

    Ok(ProductImport {
        format: ImportFormat::BlackBox,
        fingerprint: fp,
        mapping,
        products,
        blank_rows: parsed.blank_rows,
        ragged_rows: parsed.ragged_rows,
        warnings,
    })
}

/// Import a Magnet or Cerebro keyword export.
///
/// A file without any keyword column cannot be used and fails.
pub fn import_keywords(text: &str) -> Result<KeywordImport, ImportError> {
    ensure_metrics_described();
    let parsed = csv::parse(text)?;
    let source = infer_keyword_source(&parsed.headers);
    let format = ImportFormat::from(source);
    let mapping = auto_map(&parsed.headers, format);

    if !mapping.contains(CanonicalField::Keyword) {
        return Err(ImportError::MissingColumn("keyword"));
    }

    let mut warnings = Vec::new();
    if !mapping.contains(CanonicalField::SearchVolume) {
        warnings.push("No search volume column found; volumes default to 0.".to_string());
    }
    if !mapping.contains(CanonicalField::CompetingProducts) {
        warnings.push(
            "No competing products column found; competitor counts default to 0.".to_string(),
        );
    }
    if parsed.ragged_rows > 0 {
        warnings.push(format!(
            "{} row(s) had a different number of cells than the header and were padded or cut.",
            parsed.ragged_rows
        ));
    }

    let mut skipped = 0usize;
    let mut keywords = Vec::with_capacity(parsed.rows.len());
    for row in &parsed.rows {
        let v = RowView {
            headers: &parsed.headers,
            row,
            mapping: &mapping,
        };
        let keyword = v.text(CanonicalField::Keyword).trim();
        if keyword.is_empty() {
            skipped += 1;
            continue;
        }
        let trend = v.text(CanonicalField::SearchVolumeTrend);
        keywords.push(KeywordRecord {
            keyword: keyword.to_string(),
            search_volume: v.number(CanonicalField::SearchVolume),
            competing_products: v.number(CanonicalField::CompetingProducts),
            cpc: try_normalize_value(v.text(CanonicalField::Cpc)),
            seasonality: (!trend.is_empty()).then(|| trend.to_string()),
            source,
            metadata: v.unmapped(),
        });
    }
    if skipped > 0 {
        warnings.push(format!("{skipped} row(s) without a keyword were skipped."));
    }

    let fp = fingerprint(text);
    record_import_metrics(keywords.len(), parsed.blank_rows, warnings.len());
    tracing::info!(
        target: "ingest",
        fingerprint = %fp,
        source = ?source,
        rows = keywords.len(),
        warnings = warnings.len(),
        "keyword export imported"
    );

    Ok(KeywordImport {
        format,
        fingerprint: fp,
        mapping,
        keywords,
        blank_rows: parsed.blank_rows,
        ragged_rows: parsed.ragged_rows,
        warnings,
    })
}

fn record_import_metrics(rows: usize, blank: usize, warnings: usize) {
    counter!("import_rows_total").increment(rows as u64);
    counter!("import_dropped_rows_total").increment(blank as u64);
    counter!("import_warnings_total").increment(warnings as u64);
}
