//! Theta-Meter session server: hosts the broadcaster and exposes it over a
//! single WebSocket endpoint, routing protocol messages to the active
//! session.

mod ai;
mod config;
mod protocol;
mod router;
mod state;
mod stt;
mod store;
mod ws;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use clap::Parser;
use meter_core::{AiAuditor, Broadcaster, CaseStore, SpeechToText};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ServerConfig;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::parse();
    let bind_addr = config.bind_addr();

    let ai_auditor: Option<Arc<dyn AiAuditor>> = config
        .anthropic_api_key
        .clone()
        .map(|key| Arc::new(ai::AnthropicAuditor::new(key)) as Arc<dyn AiAuditor>);

    let speech_to_text: Option<Arc<dyn SpeechToText>> = config
        .openai_api_key
        .clone()
        .map(|key| Arc::new(stt::WhisperTranscriber::new(key)) as Arc<dyn SpeechToText>);

    let case_store: Arc<dyn CaseStore> = Arc::new(store::SqliteStore::open(&config.db_path)?);

    let broadcaster = Arc::new(Broadcaster::new());
    let broadcaster_handle = broadcaster.clone();
    tokio::spawn(async move { broadcaster_handle.run().await });

    let app_state = Arc::new(AppState::new(config, broadcaster, ai_auditor, speech_to_text, case_store));

    let app = Router::new()
        .route("/ws", get(ws::ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state.clone());

    info!(%bind_addr, "Theta-Meter server starting");
    println!("METER_SERVER_READY:{bind_addr}");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    app_state.broadcaster.stop();
    Ok(())
}
