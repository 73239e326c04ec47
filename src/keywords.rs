// src/keywords.rs
//! Keyword ↔ product relevance: tokenizer, inverted index, scoring and the
//! enrichment pass that attaches a primary keyword to each product.
//!
//! Score = 0.6·overlap + 0.3·volume + 0.1·length, where
//! - overlap: share of the keyword's tokens that contain or are contained in a title token,
//! - volume:  log10(max(volume, 1)) / 6,
//! - length:  max(0, 1 - chars / 50), favouring short specific phrases.
//!
//! The index is rebuilt for every enrichment pass; corpora are bounded by one import.

use std::collections::{HashMap, HashSet};

use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ingest::types::{KeywordRecord, KeywordSuggestion, ProductRecord};

pub const DEFAULT_TOP_N: usize = 10;
pub const DEFAULT_MIN_SCORE: f64 = 0.1;
pub const DEFAULT_PRIMARY_THRESHOLD: f64 = 0.2;
pub const DEFAULT_MIN_CORPUS_SIZE: usize = 20;

const W_OVERLAP: f64 = 0.6;
const W_VOLUME: f64 = 0.3;
const W_LENGTH: f64 = 0.1;
const MIN_TOKEN_CHARS: usize = 3;

/// Tunables for ranking and enrichment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchOptions {
    pub top_n: usize,
    /// Candidates at or below this score are discarded.
    pub min_score: f64,
    /// The best candidate must exceed this to become the primary keyword.
    pub primary_threshold: f64,
    /// Corpora smaller than this produce a warning.
    pub min_corpus_size: usize,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            top_n: DEFAULT_TOP_N,
            min_score: DEFAULT_MIN_SCORE,
            primary_threshold: DEFAULT_PRIMARY_THRESHOLD,
            min_corpus_size: DEFAULT_MIN_CORPUS_SIZE,
        }
    }
}

/// Lowercase, drop punctuation, keep words of 3+ chars, then add adjacent
/// bigrams and trigrams. Order-preserving, deduplicated.
pub fn tokenize(text: &str) -> Vec<String> {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    let words: Vec<&str> = cleaned
        .split_whitespace()
        .filter(|w| w.chars().count() >= MIN_TOKEN_CHARS)
        .collect();

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    let mut push = |t: String| {
        if seen.insert(t.clone()) {
            out.push(t);
        }
    };

    for w in &words {
        push((*w).to_string());
    }
    for n in 2..=3 {
        for win in words.windows(n) {
            push(win.join(" "));
        }
    }
    out
}

/// Inverted index over one keyword corpus.
#[derive(Debug)]
pub struct KeywordIndex<'a> {
    keywords: &'a [KeywordRecord],
    tokens: Vec<Vec<String>>,
    postings: HashMap<String, Vec<usize>>,
}

impl<'a> KeywordIndex<'a> {
    pub fn build(keywords: &'a [KeywordRecord]) -> Self {
        let tokens: Vec<Vec<String>> = keywords.iter().map(|k| tokenize(&k.keyword)).collect();
        let mut postings: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, toks) in tokens.iter().enumerate() {
            for t in toks {
                postings.entry(t.clone()).or_default().push(i);
            }
        }
        Self {
            keywords,
            tokens,
            postings,
        }
    }

    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    /// Rank keywords for a product title; best first.
    pub fn suggest(&self, title: &str, opts: &MatchOptions) -> Vec<KeywordSuggestion> {
        let query = tokenize(title);
        if query.is_empty() || self.is_empty() {
            return Vec::new();
        }

        let mut candidates: Vec<usize> = query
            .iter()
            .filter_map(|t| self.postings.get(t))
            .flatten()
            .copied()
            .collect();
        candidates.sort_unstable();
        candidates.dedup();

        // Duplicate keyword strings keep their best-scoring row.
        let mut best: HashMap<String, KeywordSuggestion> = HashMap::new();
        for i in candidates {
            let kw = &self.keywords[i];
            let score = score_keyword(&self.tokens[i], &kw.keyword, kw.search_volume, &query);
            if score <= opts.min_score {
                continue;
            }
            let key = kw.keyword.trim().to_lowercase();
            let better = best.get(&key).map_or(true, |prev| score > prev.score);
            if better {
                best.insert(
                    key,
                    KeywordSuggestion {
                        keyword: kw.keyword.clone(),
                        search_volume: kw.search_volume,
                        competing_products: kw.competing_products,
                        score,
                    },
                );
            }
        }

        let mut ranked: Vec<KeywordSuggestion> = best.into_values().collect();
        ranked.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(b.search_volume.total_cmp(&a.search_volume))
                .then_with(|| a.keyword.cmp(&b.keyword))
        });
        ranked.truncate(opts.top_n.max(1));
        ranked
    }
}

/// Relevance of one keyword against the query token set.
pub fn score_keyword(kw_tokens: &[String], keyword: &str, volume: f64, query: &[String]) -> f64 {
    let overlap = if kw_tokens.is_empty() {
        0.0
    } else {
        let hits = kw_tokens
            .iter()
            .filter(|kt| {
                query
                    .iter()
                    .any(|qt| qt.contains(kt.as_str()) || kt.contains(qt.as_str()))
            })
            .count();
        hits as f64 / kw_tokens.len() as f64
    };
    let volume_score = volume.max(1.0).log10() / 6.0;
    let length_penalty = (1.0 - keyword.chars().count() as f64 / 50.0).max(0.0);

    W_OVERLAP * overlap + W_VOLUME * volume_score + W_LENGTH * length_penalty
}

/// Result of one enrichment pass.
#[derive(Debug, Clone, Serialize)]
pub struct Enrichment {
    pub products: Vec<ProductRecord>,
    pub matched: usize,
    pub warnings: Vec<String>,
}

/// Attach ranked suggestions and a primary keyword to each product.
///
/// Products with an empty title pass through unchanged. A primary keyword
/// can only raise the stored search volume, never lower it.
pub fn enrich_products(
    products: Vec<ProductRecord>,
    keywords: &[KeywordRecord],
    opts: &MatchOptions,
) -> Enrichment {
    let mut warnings = Vec::new();
    if keywords.is_empty() {
        warnings.push("No keywords available; products were not enriched.".to_string());
    } else if keywords.len() < opts.min_corpus_size {
        warnings.push(format!(
            "Only {} keywords available; suggestions may be weak (recommend at least {}).",
            keywords.len(),
            opts.min_corpus_size
        ));
    }

    let index = KeywordIndex::build(keywords);
    let mut matched = 0usize;
    let products = products
        .into_iter()
        .map(|p| {
            let enriched = enrich_one(p, &index, opts);
            if enriched.primary_keyword.is_some() {
                matched += 1;
            }
            enriched
        })
        .collect::<Vec<_>>();

    static DESCRIBED: OnceCell<()> = OnceCell::new();
    DESCRIBED.get_or_init(|| {
        describe_counter!(
            "keyword_enrich_matched_total",
            "Products that received at least one keyword match."
        );
    });
    counter!("keyword_enrich_matched_total").increment(matched as u64);
    debug!(
        target: "keywords",
        corpus = index.len(),
        products = products.len(),
        matched,
        "enrichment pass finished"
    );

    Enrichment {
        products,
        matched,
        warnings,
    }
}

fn enrich_one(mut product: ProductRecord, index: &KeywordIndex<'_>, opts: &MatchOptions) -> ProductRecord {
    if product.title.trim().is_empty() {
        return product;
    }
    let suggestions = index.suggest(&product.title, opts);
    if suggestions.is_empty() {
        return product;
    }

    if let Some(top) = suggestions.first().filter(|s| s.score > opts.primary_threshold) {
        if top.search_volume > product.search_volume {
            product.search_volume = top.search_volume;
        }
        if product.competing_products <= 0.0 {
            product.competing_products = top.competing_products;
        }
        product.primary_keyword = Some(top.clone());
    }
    product.suggested_keywords = suggestions;
    product
}
