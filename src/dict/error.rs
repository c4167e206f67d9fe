//! Dictionary error type / 词典模块错误类型

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DictError>;

#[derive(Debug, Error)]
pub enum DictError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Frequency lookup failed, the current batch is not committed / 词频查询失败
    #[error("frequency lookup failed: {0}")]
    Enrichment(String),

    #[error("corpus download failed: {0}")]
    Download(String),

    /// Bad filter request, raised before the store is touched / 请求参数无效
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("dictionary build cancelled")]
    Cancelled,

    #[error("a dictionary build is already running")]
    BuildRunning,

    #[error("dictionary store is not ready")]
    StoreNotReady,
}

impl DictError {
    pub fn validation(msg: impl Into<String>) -> Self {
        DictError::Validation(msg.into())
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, DictError::Validation(_))
    }
}

impl From<reqwest::Error> for DictError {
    fn from(e: reqwest::Error) -> Self {
        DictError::Enrichment(e.to_string())
    }
}
