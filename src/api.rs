// src/api.rs
//! Read-only diagnostics endpoints over the fetcher and the category catalog.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use tower_http::cors::CorsLayer;

use crate::catalog::{CatalogHandle, CategoryCount};
use crate::fetcher::{Fetcher, FetcherStats};

#[derive(Clone)]
pub struct AppState {
    pub fetcher: Fetcher,
    pub catalog: CatalogHandle,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/debug/catalog", get(debug_catalog))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Serialize)]
struct CatalogInfo {
    fetcher: FetcherStats,
    total: usize,
    categories: Vec<CategoryCount>,
}

async fn debug_catalog(State(state): State<AppState>) -> Json<CatalogInfo> {
    let snapshot = state.catalog.snapshot();
    Json(CatalogInfo {
        fetcher: state.fetcher.stats(),
        total: snapshot.len(),
        categories: snapshot.counts(),
    })
}
