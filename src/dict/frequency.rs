//! Word-frequency enrichment / 词频补充
//!
//! The loader only sees the `FrequencySource` trait; the HTTP service is one
//! implementation of it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use super::error::{DictError, Result};
use crate::config::FrequencyConfig;

/// External frequency lookup, keyed by slug / 外部词频查询
#[async_trait]
pub trait FrequencySource: Send + Sync {
    /// Slugs missing from the returned map keep no frequency / 未返回的键没有词频
    async fn lookup_frequencies(&self, slugs: &[String]) -> Result<HashMap<String, f64>>;
}

#[derive(Serialize)]
struct LookupBody<'a> {
    q: &'a [String],
}

/// Frequency service reached over HTTP (`POST { q: [...] }`) / HTTP 词频服务
pub struct HttpFrequencySource {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpFrequencySource {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DictError::Enrichment(format!("failed to build http client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl FrequencySource for HttpFrequencySource {
    async fn lookup_frequencies(&self, slugs: &[String]) -> Result<HashMap<String, f64>> {
        if slugs.is_empty() {
            return Ok(HashMap::new());
        }

        let resp = self
            .client
            .post(&self.endpoint)
            .json(&LookupBody { q: slugs })
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(DictError::Enrichment(format!(
                "{} responded with HTTP {}",
                self.endpoint, status
            )));
        }

        let data: HashMap<String, f64> = resp.json().await?;
        tracing::debug!("Frequency lookup: {} slugs -> {} scores", slugs.len(), data.len());
        Ok(data)
    }
}

/// Used when enrichment is switched off; every entry keeps no frequency / 关闭词频时使用
pub struct NoFrequency;

#[async_trait]
impl FrequencySource for NoFrequency {
    async fn lookup_frequencies(&self, _slugs: &[String]) -> Result<HashMap<String, f64>> {
        Ok(HashMap::new())
    }
}

/// Build the configured frequency source / 根据配置创建词频来源
pub fn from_config(config: &FrequencyConfig) -> Result<Arc<dyn FrequencySource>> {
    if !config.enabled {
        tracing::info!("Frequency enrichment disabled");
        return Ok(Arc::new(NoFrequency));
    }
    let source = HttpFrequencySource::new(
        config.endpoint.clone(),
        Duration::from_secs(config.timeout_secs),
    )?;
    Ok(Arc::new(source))
}
