//! Dictionary status and admin endpoints / 词典状态与管理接口

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use super::{ApiError, ApiResponse};
use crate::state::AppState;
use kanagen_backend::dict::{BuildProgress, StoreStats};

/// 词典状态
#[derive(Debug, Serialize)]
pub struct DictStatus {
    /// `building` / `error` / `not_built` / `ready`
    pub status: String,
    pub generation: Option<String>,
    pub store: Option<StoreStats>,
    pub built_at: Option<String>,
    pub frequency_enabled: bool,
    pub progress: BuildProgress,
}

pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<ApiResponse<DictStatus>> {
    let progress = state.builder.state().get_progress();
    let current = state.store.current();

    let (generation, store) = match &current {
        Some(s) => (
            s.path().file_name().map(|n| n.to_string_lossy().into_owned()),
            Some(s.stats().await),
        ),
        None => (None, None),
    };

    let status = if progress.is_running {
        "building"
    } else if progress.error.is_some() {
        "error"
    } else if current.is_none() {
        "not_built"
    } else {
        "ready"
    };

    let built_at = store.as_ref().and_then(|s| s.built_at).map(|ts| {
        chrono::DateTime::from_timestamp(ts, 0)
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_default()
    });

    Json(ApiResponse::success(DictStatus {
        status: status.to_string(),
        generation,
        store,
        built_at,
        frequency_enabled: state.config.frequency.enabled,
        progress,
    }))
}

pub async fn rebuild(State(state): State<Arc<AppState>>) -> Result<Json<ApiResponse<()>>, ApiError> {
    state.builder.spawn_rebuild(state.store.clone())?;
    tracing::info!("Dictionary rebuild requested");
    Ok(Json(ApiResponse::success(())))
}

pub async fn stop_build(State(state): State<Arc<AppState>>) -> (StatusCode, Json<ApiResponse<()>>) {
    if !state.builder.state().cancel() {
        return (
            StatusCode::CONFLICT,
            Json(ApiResponse::error_with_code(409, "no dictionary build is running")),
        );
    }
    tracing::info!("Dictionary build stop requested");
    (StatusCode::OK, Json(ApiResponse::success(())))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::api::router;
    use crate::api::testutil::{empty_state, ready_state, send};

    #[tokio::test]
    async fn test_status_before_and_after_build() {
        let dir = tempfile::tempdir().unwrap();
        let (status, body) = send(router(empty_state(dir.path())), "GET", "/api/dict/status").await;
        assert_eq!(status, 200);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["data"]["status"], "not_built");
        assert!(json["data"]["store"].is_null());

        let dir = tempfile::tempdir().unwrap();
        let (_, body) = send(router(ready_state(dir.path()).await), "GET", "/api/dict/status").await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["data"]["status"], "ready");
        assert_eq!(json["data"]["store"]["entry_count"], 3);
        assert_eq!(json["data"]["store"]["complete"], true);
        assert_eq!(json["data"]["progress"]["is_done"], true);
        assert!(json["data"]["built_at"].is_string());
    }

    #[tokio::test]
    async fn test_rebuild_in_background() {
        let dir = tempfile::tempdir().unwrap();
        let state = empty_state(dir.path());

        let (status, _) = send(router(state.clone()), "POST", "/api/admin/dict/rebuild").await;
        assert_eq!(status, 200);

        for _ in 0..100 {
            if state.store.current().is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        let store = state.store.current().expect("rebuild finished");
        assert!(store.is_complete().await);

        let (status, _) = send(router(state), "GET", "/generate?length=2").await;
        assert_eq!(status, 200);
    }

    #[tokio::test]
    async fn test_rebuild_conflict_and_stop() {
        let dir = tempfile::tempdir().unwrap();
        let state = empty_state(dir.path());

        let (status, _) = send(router(state.clone()), "POST", "/api/admin/dict/stop").await;
        assert_eq!(status, 409);

        // hold the build slot so the request sees a running build
        assert!(state.builder.state().try_start());
        let (status, body) = send(router(state.clone()), "POST", "/api/admin/dict/rebuild").await;
        assert_eq!(status, 409);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["code"], 409);

        let (status, _) = send(router(state.clone()), "POST", "/api/admin/dict/stop").await;
        assert_eq!(status, 200);
        assert!(state.builder.state().is_cancelled());
    }
}
