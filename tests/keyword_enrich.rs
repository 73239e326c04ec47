// tests/keyword_enrich.rs
//
// Product + keyword imports joined by the enrichment pass.

use research_workbench::ingest::{self, types::KeywordRecord};
use research_workbench::keywords::{enrich_products, tokenize, KeywordIndex, MatchOptions};

const PRODUCTS: &str = "ASIN,Product Title,ASIN Revenue,Search Volume\n\
B0MAT00001,Silicone Baking Mat Set for Oven,9000,0\n\
B0EMPTY001,,100,0\n\
B0ZZZ00001,Quartz Wristwatch,500,0\n";

const MAGNET: &str = "Keyword Phrase,Search Volume,Competing Products\n\
silicone baking mat,40000,900\n\
baking mat,2500,1500\n\
oven mitt,30000,2000\n\
Silicone Baking Mat,100,5\n";

#[test]
fn enrichment_attaches_primary_keyword() {
    let products = ingest::import_products(PRODUCTS).unwrap().products;
    let keywords = ingest::import_keywords(MAGNET).unwrap().keywords;

    let out = enrich_products(products, &keywords, &MatchOptions::default());
    assert_eq!(out.matched, 1);
    // small corpus
    assert!(out.warnings.iter().any(|w| w.contains("Only 4 keywords")));

    let mat = &out.products[0];
    let primary = mat.primary_keyword.as_ref().expect("primary keyword");
    assert_eq!(primary.keyword, "silicone baking mat");
    assert_eq!(mat.search_volume, 40_000.0);
    assert_eq!(mat.competing_products, 900.0);
    // duplicate phrase keeps its best row only
    assert_eq!(
        mat.suggested_keywords
            .iter()
            .filter(|s| s.keyword.eq_ignore_ascii_case("silicone baking mat"))
            .count(),
        1
    );
    assert!(mat
        .suggested_keywords
        .windows(2)
        .all(|w| w[0].score >= w[1].score));

    let untitled = &out.products[1];
    assert!(untitled.primary_keyword.is_none());
    assert!(untitled.suggested_keywords.is_empty());

    let watch = &out.products[2];
    assert!(watch.primary_keyword.is_none());
}

#[test]
fn empty_corpus_warns_and_leaves_products_alone() {
    let products = ingest::import_products(PRODUCTS).unwrap().products;
    let out = enrich_products(products.clone(), &[], &MatchOptions::default());
    assert_eq!(out.matched, 0);
    assert_eq!(out.products, products);
    assert_eq!(out.warnings.len(), 1);
}

#[test]
fn top_n_bounds_suggestions() {
    let keywords: Vec<KeywordRecord> = (0..30)
        .map(|i| KeywordRecord::new(format!("garden hose {i:03}"), 1_000.0 + i as f64, 10.0))
        .collect();
    let index = KeywordIndex::build(&keywords);
    let opts = MatchOptions {
        top_n: 5,
        ..MatchOptions::default()
    };
    let ranked = index.suggest("Expandable Garden Hose 50ft", &opts);
    assert_eq!(ranked.len(), 5);
    // same overlap and length, so volume decides
    assert_eq!(ranked[0].search_volume, 1_029.0);
    assert_eq!(ranked[4].search_volume, 1_025.0);
}

#[test]
fn tokenizer_drops_short_words_and_adds_ngrams() {
    let t = tokenize("A Big, Red Ball!");
    assert!(t.contains(&"big".to_string()));
    assert!(t.contains(&"red ball".to_string()));
    assert!(t.contains(&"big red ball".to_string()));
    assert!(!t.iter().any(|s| s == "a"));
}
