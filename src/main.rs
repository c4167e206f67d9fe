use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod state;

use kanagen_backend::config;
use kanagen_backend::dict::{frequency, DictBuilder, StoreHandle};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kanagen_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration / 加载配置
    let app_config = config::load_config().map_err(anyhow::Error::msg)?;
    tracing::info!("Server will listen on {}:{}", app_config.server.host, app_config.server.port);

    // Create data directory if not exists / 创建数据目录
    let dict_dir = app_config.get_dict_dir();
    if !dict_dir.exists() {
        std::fs::create_dir_all(&dict_dir)?;
        tracing::info!("Created dictionary directory: {:?}", dict_dir);
    }

    let frequency = frequency::from_config(&app_config.frequency)?;
    let builder = Arc::new(DictBuilder::from_config(&app_config, frequency));

    // 打开最新的完整词典库，没有则先构建再提供服务
    let store = Arc::new(StoreHandle::new(builder.generations().open_current().await?));
    match store.current() {
        Some(current) => tracing::info!("Serving dictionary generation {:?}", current.path()),
        None if app_config.corpus.auto_build => {
            tracing::info!("No complete dictionary store, building before serving");
            builder.rebuild(&store).await?;
        }
        None => {
            tracing::warn!("No dictionary store; generate requests fail until a rebuild completes");
        }
    }

    let bind_addr = app_config.get_bind_address();
    let state = Arc::new(AppState::new(app_config, store, builder));

    let app = api::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    tracing::info!("Server running at http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
