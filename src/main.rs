use clap::Parser;
use tracing_subscriber::EnvFilter;

use vllm_proxy::api::{AppState, create_router};
use vllm_proxy::model::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env 不存在时忽略
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::parse();
    let state = AppState::from_config(&config)?;
    let app = create_router(state);

    let addr = config.listen_addr();
    tracing::info!("启动 vllm-proxy: {}", addr);
    tracing::info!("上游: {}，模型: {}", config.upstream_base_trimmed(), config.model_name);
    tracing::info!("指标日志: {}", config.metrics_file().display());

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
