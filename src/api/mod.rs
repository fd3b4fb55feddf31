//! HTTP surface: health, wallet and position snapshots, and a manual
//! cycle trigger.

use crate::engine::StrategyEngine;
use crate::error::AppError;
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<StrategyEngine>,
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/v1/balances", get(get_balances))
        .route("/v1/positions", get(get_positions))
        .route("/v1/cycle", post(run_cycle))
        .layer(cors)
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn get_balances(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let balances = state.engine.balances_snapshot().await?;
    Ok(Json(json!({ "balances": balances })))
}

async fn get_positions(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let positions = state.engine.positions_snapshot().await?;
    Ok(Json(json!({ "positions": positions })))
}

/// Run one strategy cycle immediately and return the operation report.
///
/// Serialized against the scheduled cycle by the engine's internal lock.
async fn run_cycle(State(state): State<AppState>) -> String {
    state.engine.run_cycle().await
}
