//! HTTP API handlers.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use dilemma_core::deposit::spawn_deposit_timer;
use dilemma_core::{
    BackendError, Choice, Deal, DealEngine, DealId, Deposit, DepositKind, EngineConfig, Order,
    OrderId, PlayerProfile, Product, ProductId, Session,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::state::{AppState, Snapshot};

/// Application error type: status code plus a JSON `error` body.
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn not_logged_in() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "not logged in")
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

impl From<BackendError> for AppError {
    fn from(e: BackendError) -> Self {
        let status = match &e {
            BackendError::Transport(_) => StatusCode::BAD_GATEWAY,
            BackendError::PlayerNotFound(_)
            | BackendError::DealNotFound(_)
            | BackendError::ProductNotFound
            | BackendError::OrderNotFound
            | BackendError::DepositNotFound => StatusCode::NOT_FOUND,
            _ => StatusCode::BAD_REQUEST,
        };
        Self::new(status, e.to_string())
    }
}

fn require_engine(state: &AppState) -> Result<Arc<DealEngine>, AppError> {
    state.engine().ok_or_else(AppError::not_logged_in)
}

/// Admin identity comes from a header, as the hosted UI sends it.
fn admin_from_header(headers: &HeaderMap) -> Result<String, AppError> {
    headers
        .get("X-Admin-Code")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| AppError::new(StatusCode::UNAUTHORIZED, "missing X-Admin-Code header"))
}

// ============ Session ============

#[derive(Deserialize)]
pub struct LoginRequest {
    pub code: String,
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<PlayerProfile>, AppError> {
    let profile = state.backend.login(&req.code.as_str().into()).await?;

    let session = Session {
        code: profile.code.clone(),
        name: profile.name.clone(),
    };
    if let Err(e) = state.store.save(&session) {
        tracing::warn!(error = %e, "could not persist session");
    }

    let engine = Arc::new(DealEngine::new(
        state.backend.clone(),
        session,
        EngineConfig::default(),
    ));

    // Seed the snapshot so the first roster read has data before the
    // refresh loop's next tick.
    let roster = engine.roster().await.unwrap_or_default();
    state.publish(Snapshot {
        profile: Some(profile.clone()),
        roster,
        refreshed_at: Some(chrono::Utc::now()),
    });

    state.set_engine(Some(engine));
    tracing::info!(player = %profile.code, "logged in");
    Ok(Json(profile))
}

pub async fn logout(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    state.set_engine(None);
    state.publish(Snapshot::default());
    if let Err(e) = state.store.clear() {
        tracing::warn!(error = %e, "could not clear session file");
    }
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

pub async fn me(State(state): State<AppState>) -> Result<Json<PlayerProfile>, AppError> {
    let engine = require_engine(&state)?;
    let profile = state.backend.fetch_player(&engine.session().code).await?;
    Ok(Json(profile))
}

// ============ Roster & leaderboard ============

pub async fn players(State(state): State<AppState>) -> Result<Json<Snapshot>, AppError> {
    require_engine(&state)?;
    Ok(Json(state.snapshot()))
}

#[derive(Deserialize)]
pub struct LeaderboardQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    10
}

pub async fn leaderboard(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<Vec<PlayerProfile>>, AppError> {
    Ok(Json(state.backend.leaderboard(query.limit).await?))
}

// ============ Deals ============

#[derive(Deserialize)]
pub struct ProposeRequest {
    pub counterpart: String,
    pub choice: Choice,
}

pub async fn propose_deal(
    State(state): State<AppState>,
    Json(req): Json<ProposeRequest>,
) -> Result<Json<Deal>, AppError> {
    let engine = require_engine(&state)?;
    let deal = engine
        .propose_deal(&req.counterpart.as_str().into(), req.choice)
        .await?;

    // Wait for the counterpart in the background; the panel follows the
    // deal through GET /api/deals/:id.
    let waiter = engine.clone();
    let deal_id = deal.id;
    tokio::spawn(async move {
        match waiter.await_counterpart(deal_id).await {
            Ok(done) => tracing::info!(deal = %done.id, status = ?done.status, "deal finished"),
            Err(e) => tracing::warn!(deal = %deal_id, error = %e, "deal wait failed"),
        }
    });

    Ok(Json(deal))
}

pub async fn get_deal(
    State(state): State<AppState>,
    Path(id): Path<DealId>,
) -> Result<Json<Deal>, AppError> {
    require_engine(&state)?;
    Ok(Json(state.backend.fetch_deal(id).await?))
}

#[derive(Deserialize)]
pub struct RespondRequest {
    pub choice: Choice,
}

pub async fn respond_to_deal(
    State(state): State<AppState>,
    Path(id): Path<DealId>,
    Json(req): Json<RespondRequest>,
) -> Result<Json<Deal>, AppError> {
    let engine = require_engine(&state)?;
    Ok(Json(engine.respond_to_deal(id, req.choice).await?))
}

pub async fn cancel_active_deal(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let engine = require_engine(&state)?;
    let cancelled = engine.cancel_active().await?;
    Ok(Json(serde_json::json!({ "cancelled": cancelled })))
}

pub async fn my_deals(State(state): State<AppState>) -> Result<Json<Vec<Deal>>, AppError> {
    let engine = require_engine(&state)?;
    Ok(Json(state.backend.list_deals(&engine.session().code).await?))
}

// ============ Shop ============

pub async fn products(State(state): State<AppState>) -> Result<Json<Vec<Product>>, AppError> {
    Ok(Json(state.backend.list_products().await?))
}

#[derive(Deserialize)]
pub struct PurchaseRequest {
    pub product_id: ProductId,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

pub async fn purchase(
    State(state): State<AppState>,
    Json(req): Json<PurchaseRequest>,
) -> Result<Json<Order>, AppError> {
    let engine = require_engine(&state)?;
    let order = state
        .backend
        .purchase(&engine.session().code, req.product_id, req.quantity)
        .await?;
    Ok(Json(order))
}

pub async fn my_orders(State(state): State<AppState>) -> Result<Json<Vec<Order>>, AppError> {
    let engine = require_engine(&state)?;
    Ok(Json(state.backend.list_orders(Some(&engine.session().code)).await?))
}

// ============ Admin ============

pub async fn all_orders(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Order>>, AppError> {
    admin_from_header(&headers)?;
    Ok(Json(state.backend.list_orders(None).await?))
}

#[derive(Deserialize, Default)]
pub struct OrderActionRequest {
    pub note: Option<String>,
}

pub async fn confirm_order(
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
    headers: HeaderMap,
    Json(req): Json<OrderActionRequest>,
) -> Result<Json<Order>, AppError> {
    let admin = admin_from_header(&headers)?;
    Ok(Json(state.backend.confirm_order(id, &admin, req.note).await?))
}

pub async fn cancel_order(
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
    headers: HeaderMap,
    Json(req): Json<OrderActionRequest>,
) -> Result<Json<Order>, AppError> {
    let admin = admin_from_header(&headers)?;
    Ok(Json(state.backend.cancel_order(id, &admin, req.note).await?))
}

// ============ Deposits ============

#[derive(Deserialize)]
pub struct OpenDepositRequest {
    pub amount: i64,
    pub kind: DepositKind,
    pub duration_secs: i64,
}

pub async fn open_deposit(
    State(state): State<AppState>,
    Json(req): Json<OpenDepositRequest>,
) -> Result<Json<Deposit>, AppError> {
    let engine = require_engine(&state)?;
    let deposit = state
        .backend
        .open_deposit(
            &engine.session().code,
            req.amount,
            req.kind,
            chrono::Duration::seconds(req.duration_secs),
        )
        .await?;

    spawn_deposit_timer(state.backend.clone(), deposit.clone());
    Ok(Json(deposit))
}

pub async fn my_deposits(State(state): State<AppState>) -> Result<Json<Vec<Deposit>>, AppError> {
    let engine = require_engine(&state)?;
    Ok(Json(state.backend.list_deposits(&engine.session().code).await?))
}

pub async fn health() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_errors_map_to_bad_gateway() {
        let err: AppError = BackendError::Transport("connection refused".to_string()).into();
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_missing_records_map_to_not_found() {
        let err: AppError = BackendError::OrderNotFound.into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_rejections_map_to_bad_request() {
        let err: AppError = BackendError::RateLimitExceeded.into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        let err: AppError = BackendError::InsufficientFunds.into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }
}
