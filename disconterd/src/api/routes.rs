use std::sync::Arc;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::types::ServiceInstance;
use crate::metrics::Metrics;
use crate::registry::Registry;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub metrics: Metrics,
}

#[derive(Serialize)]
pub struct ServicesResponse {
    pub hash: String,
    pub fetched_at: DateTime<Utc>,
    pub instances: Vec<ServiceInstance>,
}

#[derive(Deserialize)]
pub struct ServiceQuery {
    pub service: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/metrics", get(get_metrics))
        .route("/v1/services", get(get_services))
        .route("/v1/services/hash", get(get_hash))
        .route("/v1/instances/:name", get(get_instance))
        .with_state(state)
}

async fn get_metrics(State(state): State<AppState>) -> Result<impl IntoResponse, StatusCode> {
    let body = state.metrics.export().map_err(|e| {
        tracing::error!("Failed to export metrics: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    ))
}

async fn get_services(
    State(state): State<AppState>,
    Query(params): Query<ServiceQuery>,
) -> Json<ServicesResponse> {
    let snapshot = state.registry.read();
    let instances = snapshot
        .instances
        .iter()
        .filter(|i| params.service.as_deref().map_or(true, |s| i.service.name == s))
        .cloned()
        .collect();

    Json(ServicesResponse {
        hash: snapshot.hash.clone(),
        fetched_at: snapshot.fetched_at,
        instances,
    })
}

async fn get_hash(State(state): State<AppState>) -> String {
    state.registry.read().hash.clone()
}

async fn get_instance(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ServiceInstance>, StatusCode> {
    state
        .registry
        .read()
        .instances
        .iter()
        .rev()
        .find(|i| i.name == name)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}
