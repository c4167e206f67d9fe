pub mod dict;
pub mod generate;
pub mod server;

use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::state::AppState;
use kanagen_backend::dict::DictError;

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: 200,
            message: "success".to_string(),
            data: Some(data),
        }
    }

    pub fn error_with_code(code: i32, message: &str) -> Self {
        Self {
            code,
            message: message.to_string(),
            data: None,
        }
    }
}

/// Dictionary error rendered as an error envelope / 错误响应
pub struct ApiError(pub DictError);

impl From<DictError> for ApiError {
    fn from(e: DictError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            DictError::Validation(_) => StatusCode::BAD_REQUEST,
            DictError::BuildRunning => StatusCode::CONFLICT,
            DictError::StoreNotReady => StatusCode::SERVICE_UNAVAILABLE,
            e => {
                tracing::error!("Request failed: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = ApiResponse::<()>::error_with_code(status.as_u16() as i32, &self.0.to_string());
        (status, Json(body)).into_response()
    }
}

/// All routes, state attached / 路由表
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/generate", get(generate::generate))
        .route("/api/generate", get(generate::generate))
        .route("/api/health", get(server::health))
        .route("/api/dict/status", get(dict::get_status))
        .route("/api/admin/dict/rebuild", post(dict::rebuild))
        .route("/api/admin/dict/stop", post(dict::stop_build))
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod testutil {
    use std::path::Path;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::Request;
    use axum::Router;
    use tower::ServiceExt;

    use crate::state::AppState;
    use kanagen_backend::config::{AppConfig, CorpusConfig};
    use kanagen_backend::dict::{DictBuilder, Generations, NoFrequency, StoreHandle};

    pub const CORPUS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE JMdict [
<!ENTITY n "noun (common) (futsuumeishi)">
]>
<JMdict>
<entry>
<ent_seq>1582710</ent_seq>
<k_ele><keb>日本</keb><ke_pri>news1</ke_pri></k_ele>
<r_ele><reb>にほん</reb><re_pri>news1</re_pri></r_ele>
<sense><pos>&n;</pos><gloss>Japan</gloss></sense>
</entry>
<entry>
<ent_seq>1</ent_seq>
<r_ele><reb>かさ</reb><re_pri>ichi1</re_pri></r_ele>
<sense><gloss>umbrella</gloss><gloss>parasol</gloss></sense>
</entry>
<entry>
<ent_seq>2</ent_seq>
<r_ele><reb>はは</reb><re_pri>ichi1</re_pri></r_ele>
<sense><gloss>mother</gloss></sense>
</entry>
</JMdict>
"#;

    fn state_in(dir: &Path) -> Arc<AppState> {
        let xml = dir.join("JMdict_e.xml");
        std::fs::write(&xml, CORPUS).unwrap();

        let mut config = AppConfig::default();
        config.database.data_dir = dir.to_string_lossy().into_owned();
        config.frequency.enabled = false;
        config.corpus = CorpusConfig {
            xml_path: xml.to_string_lossy().into_owned(),
            auto_download: false,
            ..CorpusConfig::default()
        };

        let builder = Arc::new(DictBuilder::new(
            Generations::new(config.get_dict_dir(), "jmdict"),
            config.corpus.clone(),
            Arc::new(NoFrequency),
        ));
        Arc::new(AppState::new(config, Arc::new(StoreHandle::default()), builder))
    }

    /// State with no store built yet / 未构建词典的状态
    pub fn empty_state(dir: &Path) -> Arc<AppState> {
        state_in(dir)
    }

    /// State with the corpus above built and live / 已构建词典的状态
    pub async fn ready_state(dir: &Path) -> Arc<AppState> {
        let state = state_in(dir);
        state.builder.rebuild(&state.store).await.unwrap();
        state
    }

    pub async fn send(app: Router, method: &str, uri: &str) -> (u16, String) {
        let resp = app
            .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status().as_u16();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }
}
