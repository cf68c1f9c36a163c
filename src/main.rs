//! Script Chat composer server
//!
//! Serves the script-chat and auto-dialog endpoints in front of an
//! `OpenAI`-compatible completion gateway.

use script_chat::api::{create_router, AppState};
use script_chat::llm::LlmConfig;
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "script_chat=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // Configuration
    let port: u16 = std::env::var("SCRIPT_CHAT_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8000);

    let llm_config = LlmConfig::from_env();
    let completion = llm_config.build_service()?;
    if completion.is_some() {
        tracing::info!(
            model = %llm_config.model,
            gateway = %llm_config.gateway_url,
            "Upstream gateway configured"
        );
    } else {
        tracing::warn!("No API key configured; set SCRIPT_CHAT_API_KEY or LOVABLE_API_KEY");
    }

    let app = create_router(AppState::new(completion)).layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Script chat server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
