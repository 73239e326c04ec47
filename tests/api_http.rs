// tests/api_http.rs
//
// HTTP-level tests for the public API Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot, backed by
// a local store in a temp dir.
//
// Covered:
// - GET /health
// - POST /import/products (prefill handoff + save), /import/keywords
// - POST /opportunities consuming the handoff, GET/DELETE by id
// - score → decision → refresh lifecycle incl. 409/422 mapping
// - POST /score, POST /fusion/fuse, GET /debug/source-weight
// - fused criteria posted to /score and /opportunities are re-fused

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value as Json};
use tempfile::TempDir;
use tower::ServiceExt as _; // for `oneshot`

use research_workbench::store::LocalStore;
use research_workbench::{api, AppState, WorkbenchConfig};

const BODY_LIMIT: usize = 1024 * 1024; // 1MB, safe for tests

const EXPORT: &str = "ASIN,Product Title,ASIN Revenue,Search Volume,Competition\n\
B0HTTP0001,Stainless Steel Ice Cube Tray,22000,14000,Low\n\
B0HTTP0002,Beeswax Food Wraps,3000,800,High\n";

/// Router over a fresh store; keep the TempDir alive for the test.
fn test_router() -> (Router, TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(LocalStore::new(dir.path(), 1024 * 1024));
    let state = AppState::new(WorkbenchConfig::default(), store);
    (api::router(state), dir)
}

async fn send(app: &Router, method: &str, uri: &str, body: Body, json_body: bool) -> (StatusCode, String) {
    let mut req = Request::builder().method(method).uri(uri);
    if json_body {
        req = req.header("content-type", "application/json");
    }
    let req = req.body(body).expect("build request");
    let resp = app.clone().oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    (status, String::from_utf8(bytes).expect("utf8"))
}

async fn get(app: &Router, uri: &str) -> (StatusCode, String) {
    send(app, "GET", uri, Body::empty(), false).await
}

async fn post_json(app: &Router, uri: &str, payload: Json) -> (StatusCode, Json) {
    let (status, text) = send(
        app,
        "POST",
        uri,
        Body::from(serde_json::to_vec(&payload).expect("serialize payload")),
        true,
    )
    .await;
    let v = if text.is_empty() { Json::Null } else { serde_json::from_str(&text).expect("json body") };
    (status, v)
}

fn parse(text: &str) -> Json {
    serde_json::from_str(text).expect("json body")
}

#[tokio::test]
async fn api_health_returns_200_and_ok_body() {
    let (app, _dir) = test_router();
    let (status, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK, "health should be 200");
    assert_eq!(body.trim(), "OK", "health body should be 'OK'");
}

#[tokio::test]
async fn import_fills_handoff_once_and_saves_drafts() {
    let (app, _dir) = test_router();

    let (status, body) = send(&app, "POST", "/import/products?prefill=1&save=true", Body::from(EXPORT), false).await;
    assert_eq!(status, StatusCode::OK);
    let import = parse(&body);
    assert_eq!(import["products"].as_array().map(Vec::len), Some(2));
    assert!(import["fingerprint"].as_str().is_some_and(|f| !f.is_empty()));

    let (status, body) = get(&app, "/opportunities").await;
    assert_eq!(status, StatusCode::OK);
    let all = parse(&body);
    assert_eq!(all.as_array().map(Vec::len), Some(2));
    assert!(all.as_array().unwrap().iter().all(|o| o["status"] == "draft"));

    let (status, body) = get(&app, "/handoff").await;
    assert_eq!(status, StatusCode::OK);
    let pre = parse(&body);
    assert_eq!(pre["product"]["asin"], "B0HTTP0002");
    assert_eq!(pre["criteria"].as_array().map(Vec::len), Some(6));

    let (status, body) = get(&app, "/handoff").await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_empty());
}

#[tokio::test]
async fn create_from_handoff_then_score_decide_and_archive() {
    let (app, _dir) = test_router();
    let (status, _) = send(&app, "POST", "/import/products", Body::from(EXPORT), false).await;
    assert_eq!(status, StatusCode::OK);

    let (status, opp) = post_json(&app, "/opportunities", json!({})).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(opp["productName"], "Stainless Steel Ice Cube Tray");
    assert_eq!(opp["criteria"]["kind"], "basic");
    let id = opp["id"].as_str().expect("id").to_string();

    // handoff was consumed
    let (status, _) = get(&app, "/handoff").await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, scored) = post_json(&app, &format!("/opportunities/{id}/score"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(scored["opportunity"]["status"], "scored");
    assert_eq!(scored["outcome"]["status"], "evaluated");

    let (status, err) = post_json(&app, &format!("/opportunities/{id}/decision"), json!({ "branch": "reject" })).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(err["error"].as_str().is_some_and(|e| e.contains("reason")));

    let (status, archived) = post_json(
        &app,
        &format!("/opportunities/{id}/decision"),
        json!({ "branch": "reject", "reason": "margin too thin after freight" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(archived["status"], "archived");
    assert_eq!(archived["decision"]["reason"], "margin too thin after freight");

    let (status, _) = post_json(
        &app,
        &format!("/opportunities/{id}/refresh"),
        json!({ "edits": { "revenue": 30000.0 } }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn source_updates_and_refresh_rescore() {
    let (app, _dir) = test_router();
    let (_, opp) = post_json(
        &app,
        "/opportunities",
        json!({
            "productName": "Magnetic Knife Strip",
            "criteria": { "kind": "basic", "items": [
                { "id": "revenue", "name": "Revenue", "weight": 40.0, "value": 20000.0, "maxValue": 50000.0 },
                { "id": "demand", "name": "Demand", "weight": 40.0, "value": 10000.0, "maxValue": 50000.0 },
                { "id": "competition", "name": "Competition", "weight": 20.0, "value": 40.0, "maxValue": 100.0 }
            ]}
        }),
    )
    .await;
    let id = opp["id"].as_str().expect("id").to_string();

    let (status, upd) = post_json(
        &app,
        &format!("/opportunities/{id}/sources"),
        json!({ "criterion": "demand", "source": "helium_10", "value": 12000.0, "confidence": 0.9 }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(upd["fusion"]["fusedValue"].as_f64().is_some());
    assert!(upd["finalScore"].as_u64().is_some());

    let (status, refresh) = post_json(
        &app,
        &format!("/opportunities/{id}/refresh"),
        json!({ "edits": { "revenue": 40000.0 } }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(refresh["newScore"].as_u64() > refresh["oldScore"].as_u64());

    let (status, body) = get(&app, &format!("/opportunities/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    let stored = parse(&body);
    assert_eq!(stored["criteria"]["kind"], "fused");
    assert_eq!(stored["history"].as_array().map(Vec::len), Some(2));

    let (status, _) = post_json(
        &app,
        &format!("/opportunities/{id}/sources"),
        json!({ "criterion": "shipping", "source": "manual", "value": 1.0 }),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn unknown_ids_are_404_and_delete_is_idempotent() {
    let (app, _dir) = test_router();
    let (status, body) = get(&app, "/opportunities/opp_missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(parse(&body)["error"].as_str().is_some());

    let (status, _) = send(&app, "DELETE", "/opportunities/opp_missing", Body::empty(), false).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn bad_imports_are_422() {
    let (app, _dir) = test_router();
    let (status, body) = send(&app, "POST", "/import/products", Body::from("  "), false).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(parse(&body)["error"], "the file is empty");

    let (status, _) = send(&app, "POST", "/import/keywords", Body::from("Foo,Bar\n1,2\n"), false).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn stateless_score_and_fuse_endpoints() {
    let (app, _dir) = test_router();

    let (status, scored) = post_json(
        &app,
        "/score",
        json!({ "criteria": { "kind": "basic", "items": [
            { "id": "revenue", "name": "Revenue", "weight": 50.0, "value": 50000.0, "maxValue": 50000.0 }
        ]}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(scored["breakdown"]["score"], 100);
    assert_eq!(scored["outcome"]["status"], "insufficient_data");

    let (status, fused) = post_json(
        &app,
        "/fusion/fuse",
        json!({
            "criterion": "demand",
            "conservative": true,
            "observations": [
                { "source": "jungle_scout", "value": 1000.0, "timestamp": chrono::Utc::now() },
                { "source": "helium_10", "value": 1050.0, "timestamp": chrono::Utc::now() },
                { "source": "amazon_poe", "value": 3000.0, "timestamp": chrono::Utc::now() }
            ]
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fused["fusedValue"], 1000.0);
    assert_eq!(fused["needsVerification"], true);
}

#[tokio::test]
async fn debug_source_weight_reports_alias_resolution() {
    let (app, _dir) = test_router();
    let (status, body) = get(&app, "/debug/source-weight?criterion=profitability&source=validation").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("weight=0.90"), "got: {body}");

    let (_, body) = get(&app, "/debug/source-weight?criterion=demand&source=nobody").await;
    assert!(!body.contains("weight="));
}

/// Fused competition set whose fused value and inversion flag disagree with
/// its single manual observation of 20.
fn tampered_fused_criteria() -> Json {
    let now = chrono::Utc::now();
    json!({ "kind": "fused", "items": [{
        "id": "competition", "name": "Competition", "weight": 100.0, "maxValue": 100.0,
        "isInverted": false,
        "fusedValue": 999.0,
        "bySource": { "manual": { "source": "manual", "value": 20.0, "timestamp": now } },
        "fusionMetadata": {
            "disagreementIndex": 0.0, "confidenceScore": 1.0,
            "lastFusedAt": now, "fusionMethod": "single_source"
        }
    }]})
}

#[tokio::test]
async fn score_refuses_incoming_fused_criteria() {
    let (app, _dir) = test_router();

    let (status, basic) = post_json(
        &app,
        "/score",
        json!({ "criteria": { "kind": "basic", "items": [
            { "id": "competition", "name": "Competition", "weight": 100.0, "value": 20.0, "maxValue": 100.0 }
        ]}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(basic["breakdown"]["score"], 80);

    let (status, fused) = post_json(&app, "/score", json!({ "criteria": tampered_fused_criteria() })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fused["breakdown"]["score"], basic["breakdown"]["score"]);
}

#[tokio::test]
async fn create_refuses_incoming_fused_criteria() {
    let (app, _dir) = test_router();

    let (status, created) = post_json(
        &app,
        "/opportunities",
        json!({ "productName": "Cable Organizer", "criteria": tampered_fused_criteria() }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let item = &created["criteria"]["items"][0];
    assert_eq!(item["fusedValue"], 20.0);
    assert_eq!(item["isInverted"], true);
    assert_eq!(item["fusionMetadata"]["fusionMethod"], "single_source");

    let id = created["id"].as_str().expect("id");
    let (status, scored) = post_json(&app, &format!("/opportunities/{id}/score"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(scored["opportunity"]["finalScore"], 80);
}
