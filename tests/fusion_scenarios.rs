// tests/fusion_scenarios.rs
//
// Multi-source fusion against the shipped trust table
// (config/source_weights.json), including recency and conservative mode.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};

use research_workbench::criteria::{CriterionId, DataSource, FusedCriterion, FusionMethod, SourcedValue};
use research_workbench::fusion::{disagreement_index, FusionEngine, FusionOptions};
use research_workbench::source_weights::SourceWeightsConfig;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 15, 9, 30, 0).unwrap()
}

fn engine() -> FusionEngine {
    let weights = SourceWeightsConfig::load_from_file("config/source_weights.json");
    FusionEngine::new(weights, FusionOptions::default())
}

fn observations(rows: &[(DataSource, f64, i64)]) -> BTreeMap<DataSource, SourcedValue> {
    rows.iter()
        .map(|(s, v, age_days)| (*s, SourcedValue::new(*s, *v, now() - Duration::days(*age_days))))
        .collect()
}

#[test]
fn shipped_table_matches_builtin_seed() {
    let weights = SourceWeightsConfig::load_from_file("config/source_weights.json");
    assert_eq!(weights.weight_for(&CriterionId::Demand, DataSource::Helium10), 0.6);
    assert_eq!(weights.weight_for(&CriterionId::Revenue, DataSource::JungleScout), 0.8);
    // profitability is an alias of margin
    assert_eq!(weights.weight_for(&CriterionId::Profitability, DataSource::Validation), 0.9);
    assert_eq!(weights.weight_for(&CriterionId::Barriers, DataSource::Manual), 0.1);
}

#[test]
fn three_vendor_demand_scenario() {
    let obs = observations(&[
        (DataSource::JungleScout, 1000.0, 0),
        (DataSource::Helium10, 1050.0, 0),
        (DataSource::AmazonPoe, 3000.0, 0),
    ]);
    let e = engine();

    let plain = e.fuse_at(&CriterionId::Demand, &obs, false, now());
    assert_eq!(plain.fused_value, 1050.0);
    assert_eq!(plain.metadata.fusion_method, FusionMethod::WeightedMedian);
    assert!(plain.metadata.disagreement_index > 50.0);
    assert!(plain.needs_verification);

    let safe = e.fuse_at(&CriterionId::Demand, &obs, true, now());
    assert_eq!(safe.fused_value, 1000.0);
    assert_eq!(safe.metadata.conservative_fusion, Some(true));
    assert!((safe.metadata.confidence_score - 0.32).abs() < 1e-9);
}

#[test]
fn stale_observations_lose_weight() {
    let fresh = observations(&[
        (DataSource::JungleScout, 1000.0, 0),
        (DataSource::AmazonPoe, 1500.0, 0),
        (DataSource::Helium10, 2000.0, 0),
    ]);
    let e = engine();
    assert_eq!(e.fuse_at(&CriterionId::Demand, &fresh, false, now()).fused_value, 1500.0);

    let stale_poe = observations(&[
        (DataSource::JungleScout, 1000.0, 0),
        (DataSource::AmazonPoe, 1500.0, 120),
        (DataSource::Helium10, 2000.0, 0),
    ]);
    let r = e.fuse_at(&CriterionId::Demand, &stale_poe, false, now());
    assert_eq!(r.fused_value, 2000.0);
    assert!((r.effective_weights[&DataSource::AmazonPoe] - 0.24).abs() < 1e-9);
}

#[test]
fn disagreement_ignores_source_order() {
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..200 {
        let n = rng.random_range(2..8);
        let mut values: Vec<f64> = (0..n).map(|_| rng.random_range(1.0..10_000.0)).collect();
        let before = disagreement_index(&values);
        values.shuffle(&mut rng);
        let after = disagreement_index(&values);
        assert!((before - after).abs() < 1e-9, "{before} vs {after}");
        assert!(before >= 0.0);
    }
}

#[test]
fn fused_value_tracks_latest_observations() {
    let e = engine();
    let mut c = FusedCriterion::new(CriterionId::Revenue, 25.0, 50_000.0, now());
    let updates = [
        (DataSource::JungleScout, 12_000.0),
        (DataSource::Helium10, 9_000.0),
        (DataSource::AmazonPoe, 30_000.0),
        (DataSource::JungleScout, 11_000.0),
    ];
    for (i, (source, value)) in updates.into_iter().enumerate() {
        let at = now() + Duration::minutes(i as i64);
        let r = e.update_criterion_with_source_data_at(&mut c, source, value, None, None, at);
        let refused = e.fuse_at(&c.id, c.by_source(), e.options.conservative, at);
        assert_eq!(r.fused_value, c.fused_value());
        assert_eq!(refused.fused_value, c.fused_value());
        assert_eq!(c.fusion_metadata().last_fused_at, at);
    }
    assert_eq!(c.by_source().len(), 3);
    assert_eq!(c.by_source()[&DataSource::JungleScout].value, 11_000.0);
}
