// src/api.rs
//! HTTP surface over the workbench pipeline.
//!
//! Import and matching endpoints are stateless; opportunity endpoints go
//! through the configured store. The fusion trust table can be reloaded at
//! runtime.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::config::{source_weights_path, WorkbenchConfig};
use crate::criteria::{CriteriaSet, CriterionId, DataSource, SourcedValue};
use crate::decision::{Branch, Decision};
use crate::engine::{self, Outcome};
use crate::error::{ImportError, LifecycleError, StoreError};
use crate::fusion::{FusionEngine, FusionResult};
use crate::ingest::{self, types::KeywordRecord, types::ProductRecord};
use crate::keywords::{enrich_products, Enrichment, MatchOptions};
use crate::opportunity::{Opportunity, RefreshData, ValidationRecord};
use crate::scoring::{score_breakdown, ScoreBreakdown};
use crate::source_weights::SourceWeightsConfig;
use crate::store::{HandoffSlot, OpportunityStore, PREFILLED_SCORING_DATA};

/// Product selected on import, waiting to be turned into an opportunity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrefilledScoringData {
    pub fingerprint: String,
    pub product: ProductRecord,
    pub criteria: Vec<crate::criteria::ScoringCriterion>,
}

#[derive(Clone)]
pub struct AppState {
    config: Arc<WorkbenchConfig>,
    fusion: Arc<RwLock<FusionEngine>>,
    store: Arc<dyn OpportunityStore>,
    handoff: Arc<HandoffSlot<PrefilledScoringData>>,
    source_weights_path: PathBuf,
}

impl AppState {
    pub fn new(config: WorkbenchConfig, store: Arc<dyn OpportunityStore>) -> Self {
        let path = source_weights_path();
        let engine = FusionEngine::new(SourceWeightsConfig::load_from_file(&path), config.fusion);
        Self {
            config: Arc::new(config),
            fusion: Arc::new(RwLock::new(engine)),
            store,
            handoff: Arc::new(HandoffSlot::new(PREFILLED_SCORING_DATA)),
            source_weights_path: path,
        }
    }

    /// Snapshot of the current engine (cheap; the lock is not held across awaits).
    fn fusion_engine(&self) -> FusionEngine {
        self.fusion
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn store(&self) -> Arc<dyn OpportunityStore> {
        self.store.clone()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/import/products", post(import_products))
        .route("/import/keywords", post(import_keywords))
        .route("/keywords/enrich", post(enrich))
        .route("/fusion/fuse", post(fuse))
        .route("/score", post(score))
        .route("/opportunities", get(list_opportunities).post(create_opportunity))
        .route(
            "/opportunities/{id}",
            get(get_opportunity).delete(delete_opportunity),
        )
        .route("/opportunities/{id}/score", post(score_opportunity))
        .route("/opportunities/{id}/refresh", post(refresh_opportunity))
        .route("/opportunities/{id}/decision", post(decide_opportunity))
        .route("/opportunities/{id}/sources", post(update_sources))
        .route("/opportunities/{id}/validation", post(attach_validation))
        .route("/handoff", get(take_handoff))
        .route("/debug/source-weight", get(debug_source_weight))
        .route("/admin/reload-source-weights", get(admin_reload_source_weights))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

// ---------- errors ----------

#[derive(Debug)]
pub enum ApiError {
    Import(ImportError),
    Lifecycle(LifecycleError),
    Store(StoreError),
    NotFound(String),
}

impl From<ImportError> for ApiError {
    fn from(e: ImportError) -> Self {
        ApiError::Import(e)
    }
}
impl From<LifecycleError> for ApiError {
    fn from(e: LifecycleError) -> Self {
        ApiError::Lifecycle(e)
    }
}
impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Store(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, msg) = match &self {
            ApiError::Import(e) => (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
            ApiError::Lifecycle(e) => {
                let status = match e {
                    LifecycleError::InvalidTransition { .. } | LifecycleError::Archived => {
                        StatusCode::CONFLICT
                    }
                    LifecycleError::UnknownCriterion(_) | LifecycleError::Decision(_) => {
                        StatusCode::UNPROCESSABLE_ENTITY
                    }
                };
                (status, e.to_string())
            }
            ApiError::Store(e) => {
                let status = match e {
                    StoreError::NotFound(_) => StatusCode::NOT_FOUND,
                    StoreError::QuotaExceeded { .. } => StatusCode::INSUFFICIENT_STORAGE,
                    StoreError::Remote(_) => StatusCode::BAD_GATEWAY,
                    StoreError::Io(_) | StoreError::Serde(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, e.to_string())
            }
            ApiError::NotFound(id) => (StatusCode::NOT_FOUND, format!("opportunity `{id}` not found")),
        };
        if status.is_server_error() {
            warn!(target: "api", status = status.as_u16(), error = %msg, "request failed");
        }
        (status, Json(json!({ "error": msg }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

async fn load(state: &AppState, id: &str) -> ApiResult<Opportunity> {
    state
        .store
        .get_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(id.to_string()))
}

// ---------- import / matching ----------

#[derive(Deserialize)]
struct ImportParams {
    /// Row whose prefilled criteria go to the handoff slot.
    #[serde(default)]
    prefill: Option<usize>,
    /// Create a draft opportunity per product.
    #[serde(default)]
    save: bool,
}

async fn import_products(
    State(state): State<AppState>,
    Query(params): Query<ImportParams>,
    body: String,
) -> ApiResult<Json<ingest::ProductImport>> {
    let imported = ingest::import_products(&body)?;

    let pick = params.prefill.unwrap_or(0);
    if let Some(product) = imported.products.get(pick) {
        state.handoff.put(PrefilledScoringData {
            fingerprint: imported.fingerprint.clone(),
            product: product.clone(),
            criteria: crate::criteria::prefill_from_product(product),
        });
    }

    if params.save {
        let now = Utc::now();
        for product in &imported.products {
            let mut opp = Opportunity::from_import(product, &imported.fingerprint, now);
            state.store.save(&mut opp).await?;
        }
        info!(target: "api", count = imported.products.len(), "draft opportunities created from import");
    }
    Ok(Json(imported))
}

async fn import_keywords(body: String) -> ApiResult<Json<ingest::KeywordImport>> {
    Ok(Json(ingest::import_keywords(&body)?))
}

#[derive(Deserialize)]
struct EnrichReq {
    products: Vec<ProductRecord>,
    keywords: Vec<KeywordRecord>,
    #[serde(default)]
    options: Option<MatchOptions>,
}

async fn enrich(State(state): State<AppState>, Json(req): Json<EnrichReq>) -> Json<Enrichment> {
    let opts = req.options.unwrap_or(state.config.keywords);
    Json(enrich_products(req.products, &req.keywords, &opts))
}

#[derive(Deserialize)]
struct FuseReq {
    criterion: CriterionId,
    observations: Vec<SourcedValue>,
    #[serde(default)]
    conservative: Option<bool>,
}

async fn fuse(State(state): State<AppState>, Json(req): Json<FuseReq>) -> Json<FusionResult> {
    let engine = state.fusion_engine();
    // one observation per source; later entries win
    let by_source: BTreeMap<DataSource, SourcedValue> = req
        .observations
        .into_iter()
        .map(|sv| (sv.source, sv))
        .collect();
    let conservative = req.conservative.unwrap_or(engine.options.conservative);
    Json(engine.fuse(&req.criterion, &by_source, conservative))
}

#[derive(Deserialize)]
struct ScoreReq {
    criteria: CriteriaSet,
}

#[derive(Serialize)]
struct ScoreResp {
    breakdown: ScoreBreakdown,
    outcome: Outcome,
}

async fn score(State(state): State<AppState>, Json(req): Json<ScoreReq>) -> Json<ScoreResp> {
    let mut criteria = req.criteria;
    criteria.refuse(&state.fusion_engine(), Utc::now());
    Json(ScoreResp {
        breakdown: score_breakdown(&criteria),
        outcome: engine::recommend(&criteria, &state.config.gates),
    })
}

// ---------- opportunities ----------

async fn list_opportunities(State(state): State<AppState>) -> ApiResult<Json<Vec<Opportunity>>> {
    Ok(Json(state.store.get_all().await?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateReq {
    #[serde(default)]
    product_name: Option<String>,
    #[serde(default)]
    asin: Option<String>,
    /// Absent: consume the handoff slot.
    #[serde(default)]
    criteria: Option<CriteriaSet>,
}

async fn create_opportunity(
    State(state): State<AppState>,
    Json(req): Json<CreateReq>,
) -> ApiResult<(StatusCode, Json<Opportunity>)> {
    let now = Utc::now();
    let mut opp = match req.criteria {
        Some(mut criteria) => {
            criteria.refuse(&state.fusion_engine(), now);
            Opportunity::new(
                req.product_name.unwrap_or_else(|| "Untitled".to_string()),
                criteria,
                now,
            )
        }
        None => match state.handoff.take() {
            Some(pre) => {
                let mut o = Opportunity::from_import(&pre.product, &pre.fingerprint, now);
                if let Some(name) = req.product_name {
                    o.product_name = name;
                }
                o
            }
            None => Opportunity::new(
                req.product_name.unwrap_or_else(|| "Untitled".to_string()),
                CriteriaSet::default(),
                now,
            ),
        },
    };
    if req.asin.is_some() {
        opp.asin = req.asin;
    }
    state.store.save(&mut opp).await?;
    info!(target: "api", id = %opp.id, "opportunity created");
    Ok((StatusCode::CREATED, Json(opp)))
}

async fn get_opportunity(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Opportunity>> {
    Ok(Json(load(&state, &id).await?))
}

async fn delete_opportunity(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.store.delete(&id).await?;
    info!(target: "api", %id, "opportunity deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
struct ScoredResp {
    opportunity: Opportunity,
    outcome: Outcome,
}

async fn score_opportunity(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ScoredResp>> {
    let mut opp = load(&state, &id).await?;
    opp.record_score(Utc::now())?;
    state.store.save(&mut opp).await?;
    let outcome = engine::recommend(opp.criteria(), &state.config.gates);
    Ok(Json(ScoredResp {
        opportunity: opp,
        outcome,
    }))
}

#[derive(Deserialize)]
struct RefreshReq {
    #[serde(default)]
    edits: BTreeMap<CriterionId, f64>,
}

async fn refresh_opportunity(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<RefreshReq>,
) -> ApiResult<Json<RefreshData>> {
    let engine = state.fusion_engine();
    let mut opp = load(&state, &id).await?;
    let data = opp.refresh(&req.edits, &engine, Utc::now())?;
    state.store.save(&mut opp).await?;
    Ok(Json(data))
}

#[derive(Deserialize)]
struct DecisionReq {
    branch: Branch,
    #[serde(default)]
    reason: Option<String>,
}

async fn decide_opportunity(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<DecisionReq>,
) -> ApiResult<Json<Opportunity>> {
    let now = Utc::now();
    let mut opp = load(&state, &id).await?;

    let mut decision = Decision::new(req.branch, now);
    decision.reason = req.reason;
    if let Outcome::Evaluated(a) = engine::recommend(opp.criteria(), &state.config.gates) {
        decision = decision
            .with_gates(a.gates.as_map())
            .with_weakest(a.weakest.iter().map(|w| w.id.to_string()));
        for r in a.reasons {
            decision = decision.with_reason(r);
        }
    }

    let status = opp.apply_decision(decision, now)?;
    state.store.save(&mut opp).await?;
    info!(target: "api", %id, branch = req.branch.as_str(), %status, "decision recorded");
    Ok(Json(opp))
}

#[derive(Deserialize)]
struct SourceReq {
    criterion: CriterionId,
    source: DataSource,
    value: f64,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    notes: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SourceResp {
    fusion: FusionResult,
    final_score: u8,
}

async fn update_sources(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SourceReq>,
) -> ApiResult<Json<SourceResp>> {
    let engine = state.fusion_engine();
    let mut opp = load(&state, &id).await?;
    let fusion = opp.update_source_data(
        &req.criterion,
        req.source,
        req.value,
        req.confidence,
        req.notes,
        &engine,
        Utc::now(),
    )?;
    state.store.save(&mut opp).await?;
    Ok(Json(SourceResp {
        fusion,
        final_score: opp.final_score(),
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValidationReq {
    #[serde(default)]
    margin_pct: Option<f64>,
    #[serde(default)]
    notes: Option<String>,
}

async fn attach_validation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ValidationReq>,
) -> ApiResult<Json<Opportunity>> {
    let now = Utc::now();
    let mut opp = load(&state, &id).await?;
    opp.attach_validation(
        ValidationRecord {
            validated_at: now,
            margin_pct: req.margin_pct,
            notes: req.notes,
        },
        now,
    )?;
    state.store.save(&mut opp).await?;
    Ok(Json(opp))
}

async fn take_handoff(State(state): State<AppState>) -> Response {
    match state.handoff.take() {
        Some(data) => Json(data).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

// ---------- debug / admin ----------

async fn debug_source_weight(
    State(state): State<AppState>,
    Query(q): Query<HashMap<String, String>>,
) -> String {
    let criterion = CriterionId::from(q.get("criterion").cloned().unwrap_or_default());
    let source = q.get("source").cloned().unwrap_or_default();
    match source.parse::<DataSource>() {
        Ok(src) => {
            let w = state.fusion_engine().weights.weight_for(&criterion, src);
            format!("criterion='{}' source='{}' -> weight={:.2}", criterion, src, w)
        }
        Err(e) => e,
    }
}

async fn admin_reload_source_weights(State(state): State<AppState>) -> String {
    let path = &state.source_weights_path;
    let (fresh, reply) = match SourceWeightsConfig::try_load_from_file(path) {
        Ok(cfg) => (cfg, "reloaded".to_string()),
        Err(e) => {
            warn!(target: "fusion", path = %path.display(), error = %format!("{e:#}"), "source weights reload fell back to built-in seed");
            (SourceWeightsConfig::default_seed(), format!("reloaded built-in seed: {e:#}"))
        }
    };
    match state.fusion.write() {
        Ok(mut engine) => {
            engine.weights = fresh;
            info!(target: "api", path = %path.display(), "source weights reloaded");
            reply
        }
        Err(_) => "failed: lock poisoned".to_string(),
    }
}
