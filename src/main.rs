use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use novachat::adapters::ai::{OpenAiConfig, OpenAiProvider};
use novachat::adapters::http::{chat_router, ChatAppState};
use novachat::config::AppConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    config.validate()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.server.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // A missing key is not fatal: the relay reports it per request as a
    // stream-framed error.
    let state = if config.ai.has_api_key() {
        let api_key = config.ai.api_key.clone().unwrap_or_default();
        let provider = OpenAiProvider::new(
            OpenAiConfig::new(api_key)
                .with_model(&config.ai.model)
                .with_base_url(&config.ai.base_url)
                .with_timeout(config.ai.timeout()),
        );
        ChatAppState::new(Arc::new(provider))
    } else {
        tracing::warn!("no API key configured; chat requests will report an error");
        ChatAppState::without_provider()
    };

    let app = chat_router()
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
