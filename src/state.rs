use std::sync::Arc;

use kanagen_backend::config::AppConfig;
use kanagen_backend::dict::{DictBuilder, StoreHandle};

/// Shared application state / 应用共享状态
pub struct AppState {
    pub config: AppConfig,
    /// Live dictionary store, swapped by rebuilds / 当前词典库
    pub store: Arc<StoreHandle>,
    /// Builds new store generations / 词典构建器
    pub builder: Arc<DictBuilder>,
}

impl AppState {
    pub fn new(config: AppConfig, store: Arc<StoreHandle>, builder: Arc<DictBuilder>) -> Self {
        Self {
            config,
            store,
            builder,
        }
    }
}
