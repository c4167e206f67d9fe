use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;

use super::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthInfo {
    pub version: &'static str,
    pub built_at: &'static str,
    /// A complete store is live / 词典库可用
    pub store_ready: bool,
}

/// 健康检查
pub async fn health(State(state): State<Arc<AppState>>) -> Json<ApiResponse<HealthInfo>> {
    Json(ApiResponse::success(HealthInfo {
        version: env!("CARGO_PKG_VERSION"),
        built_at: env!("KANAGEN_BUILT_AT"),
        store_ready: state.store.current().is_some(),
    }))
}
