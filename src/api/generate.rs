//! Word generation endpoint / 生成接口

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;

use super::ApiError;
use crate::state::AppState;
use kanagen_backend::dict::{DictError, GenerateRequest, OutputFormat, QueryEngine};

/// Raw query parameters, parsed by hand so bad values get the error envelope
#[derive(Debug, Default, Deserialize)]
pub struct GenerateParams {
    pub length: Option<String>,
    #[serde(alias = "tags")]
    pub tag: Option<String>,
    pub exclude: Option<String>,
    pub within: Option<String>,
    pub repeat: Option<String>,
    pub small: Option<String>,
    pub format: Option<String>,
    pub offset: Option<String>,
    pub limit: Option<String>,
}

fn parse_int(name: &str, value: Option<&str>) -> Result<Option<i64>, DictError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => v
            .parse()
            .map(Some)
            .map_err(|_| DictError::validation(format!("{} must be an integer, got {:?}", name, v))),
    }
}

/// Checkbox-style flag: `on` / `true` / `1` / 开关参数
fn parse_flag(value: Option<&str>) -> bool {
    matches!(value.map(str::trim), Some("on") | Some("true") | Some("1"))
}

fn parse_format(value: Option<&str>) -> Result<OutputFormat, DictError> {
    match value.map(str::trim) {
        None | Some("") | Some("json") => Ok(OutputFormat::Json),
        Some("txt") | Some("text") => Ok(OutputFormat::Txt),
        Some(other) => Err(DictError::validation(format!(
            "format must be json or txt, got {:?}",
            other
        ))),
    }
}

impl GenerateParams {
    pub fn into_request(self) -> Result<(GenerateRequest, OutputFormat), DictError> {
        let format = parse_format(self.format.as_deref())?;
        let req = GenerateRequest {
            length: parse_int("length", self.length.as_deref())?,
            tags: self.tag.unwrap_or_default(),
            exclude: self.exclude.unwrap_or_default(),
            within: self.within.unwrap_or_default(),
            normalize_small: parse_flag(self.small.as_deref()),
            allow_repeat: parse_flag(self.repeat.as_deref()),
            offset: parse_int("offset", self.offset.as_deref())?,
            limit: parse_int("limit", self.limit.as_deref())?,
        };
        Ok((req, format))
    }
}

pub async fn generate(
    State(state): State<Arc<AppState>>,
    Query(params): Query<GenerateParams>,
) -> Result<Response, ApiError> {
    let (req, format) = params.into_request()?;
    // 校验在访问存储之前完成
    let plan = req.plan()?;

    let store = state.store.current_or_err()?;
    let result = QueryEngine::new(&store).execute(&plan).await?;

    Ok(match format {
        OutputFormat::Json => Json(result).into_response(),
        OutputFormat::Txt => (
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            result.to_text(),
        )
            .into_response(),
    })
}
