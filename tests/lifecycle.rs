// tests/lifecycle.rs
//
// One opportunity from import to archive: scoring, decisions, multi-source
// updates, refreshes and the history trail they leave.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, TimeZone, Utc};

use research_workbench::criteria::{CriterionId, DataSource};
use research_workbench::decision::Decision;
use research_workbench::fusion::FusionEngine;
use research_workbench::history::EntryKind;
use research_workbench::ingest;
use research_workbench::opportunity::{Opportunity, Status, ValidationRecord};
use research_workbench::{DecisionError, LifecycleError};

const EXPORT: &str = "ASIN,Product Title,ASIN Revenue,Search Volume,Competition\n\
B0LIFE0001,Collapsible Dog Bowl,18000,9000,Low\n";

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 10, 8, 0, 0).unwrap()
}

fn imported() -> Opportunity {
    let import = ingest::import_products(EXPORT).unwrap();
    Opportunity::from_import(&import.products[0], &import.fingerprint, t0())
}

#[test]
fn import_to_archive() {
    let engine = FusionEngine::default();
    let mut opp = imported();
    assert_eq!(opp.status(), Status::Draft);
    assert_eq!(opp.asin.as_deref(), Some("B0LIFE0001"));
    assert!(opp.id.starts_with("opp_"));
    assert_eq!(opp.criteria().value_of(&CriterionId::Competition), Some(25.0));

    let score = opp.record_score(t0() + Duration::minutes(1)).unwrap();
    assert_eq!(opp.status(), Status::Scored);
    assert_eq!(opp.final_score(), score);

    let status = opp
        .apply_decision(Decision::gather_data(t0() + Duration::minutes(2)), t0() + Duration::minutes(2))
        .unwrap();
    assert_eq!(status, Status::Analyzing);

    let fusion = opp
        .update_source_data(
            &CriterionId::Demand,
            DataSource::Helium10,
            12_000.0,
            Some(0.9),
            None,
            &engine,
            t0() + Duration::minutes(3),
        )
        .unwrap();
    assert!(opp.criteria().is_fused());
    // prefilled value is kept as a manual observation
    assert_eq!(fusion.effective_weights.len(), 2);

    let edits = BTreeMap::from([(CriterionId::Revenue, 36_000.0)]);
    let refreshed = opp.refresh(&edits, &engine, t0() + Duration::minutes(4)).unwrap();
    assert_eq!(refreshed.changes.len(), 1);
    assert_eq!(refreshed.changes[0].pct_change, Some(100.0));
    assert_eq!(opp.status(), Status::Analyzing);
    assert!(opp.last_refreshed_at.is_some());

    opp.attach_validation(
        ValidationRecord {
            validated_at: t0() + Duration::minutes(5),
            margin_pct: Some(32.0),
            notes: Some("supplier quote".into()),
        },
        t0() + Duration::minutes(5),
    )
    .unwrap();

    opp.apply_decision(Decision::proceed(t0() + Duration::hours(1)), t0() + Duration::hours(1))
        .unwrap();
    assert_eq!(opp.status(), Status::Sourcing);
    let packet = opp.sourcing_packet().expect("sourcing packet");
    assert_eq!(packet["asin"], "B0LIFE0001");

    opp.apply_decision(
        Decision::reject("supplier fell through", t0() + Duration::hours(2)),
        t0() + Duration::hours(2),
    )
    .unwrap();
    assert_eq!(opp.status(), Status::Archived);

    let kinds: Vec<EntryKind> = opp.history().iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![
            EntryKind::Import,
            EntryKind::ScoreUpdate,
            EntryKind::Decision,
            EntryKind::ScoreUpdate,
            EntryKind::Refresh,
            EntryKind::Validation,
            EntryKind::Decision,
            EntryKind::Decision,
        ]
    );
    assert!(opp
        .history()
        .iter()
        .zip(opp.history().iter().skip(1))
        .all(|(a, b)| a.date <= b.date));
}

#[test]
fn archived_opportunities_are_frozen() {
    let engine = FusionEngine::default();
    let mut opp = imported();
    opp.record_score(t0()).unwrap();
    opp.apply_decision(Decision::reject("too seasonal", t0()), t0())
        .unwrap();

    assert!(matches!(opp.record_score(t0()), Err(LifecycleError::Archived)));
    assert!(matches!(
        opp.refresh(&BTreeMap::new(), &engine, t0()),
        Err(LifecycleError::Archived)
    ));
    assert!(matches!(
        opp.apply_decision(Decision::proceed(t0()), t0()),
        Err(LifecycleError::Archived)
    ));
}

#[test]
fn decisions_need_a_scored_opportunity_and_valid_reason() {
    let mut opp = imported();
    assert!(matches!(
        opp.apply_decision(Decision::proceed(t0()), t0()),
        Err(LifecycleError::InvalidTransition {
            from: Status::Draft,
            to: Status::Sourcing
        })
    ));

    opp.record_score(t0()).unwrap();
    let blank = Decision::reject("   ", t0());
    assert!(matches!(
        opp.apply_decision(blank, t0()),
        Err(LifecycleError::Decision(DecisionError::ReasonRequired))
    ));
    let chatty = Decision::proceed(t0()).with_rejection_reason("looks great");
    assert!(matches!(
        opp.apply_decision(chatty, t0()),
        Err(LifecycleError::Decision(DecisionError::ReasonNotAllowed))
    ));
    assert_eq!(opp.status(), Status::Scored);
}

#[test]
fn refresh_without_changes_says_so() {
    let engine = FusionEngine::default();
    let mut opp = imported();
    opp.record_score(t0()).unwrap();
    let data = opp.refresh(&BTreeMap::new(), &engine, t0()).unwrap();
    assert_eq!(data.score_change, 0);
    let last = opp.history().last().unwrap();
    assert_eq!(last.kind, EntryKind::Refresh);
    assert_eq!(last.summary, "Refresh: no significant changes");
}

#[test]
fn unknown_criterion_is_rejected() {
    let engine = FusionEngine::default();
    let mut opp = imported();
    let edits = BTreeMap::from([(CriterionId::from("shipping"), 3.0)]);
    assert!(matches!(
        opp.refresh(&edits, &engine, t0()),
        Err(LifecycleError::UnknownCriterion(_))
    ));
}
