use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use rivalscope_common::MessageRecord;
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::chat::ChatReply;
use crate::state::SharedState;

/// Build the application router with all routes.
pub fn build_router(state: SharedState) -> Router {
    let cors_allow_all = state.config.gateway.cors_allow_all;

    let router = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/chat", post(chat))
        .route("/memory", get(get_memory))
        .route("/clear-memory", post(clear_memory))
        .route("/memory/dedupe", post(dedupe_memory))
        .route("/api/status", get(status))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if cors_allow_all {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "Competitive Intelligence Chatbot is ready!",
    }))
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Deserialize)]
struct ChatRequest {
    query: String,
}

/// POST /chat: run one advisor turn.
async fn chat(State(state): State<SharedState>, Json(body): Json<ChatRequest>) -> Json<ChatReply> {
    Json(state.chat.handle_query(&body.query).await)
}

/// GET /memory: the stored conversation, plain contents plus full records.
async fn get_memory(State(state): State<SharedState>) -> Json<serde_json::Value> {
    let memory = state.chat.memory();
    let records: Vec<MessageRecord> = memory.get_messages().await;
    let messages: Vec<&str> = records.iter().map(|r| r.content.as_str()).collect();

    Json(serde_json::json!({
        "messages": messages,
        "records": records,
        "mode": memory.mode(),
    }))
}

async fn clear_memory(State(state): State<SharedState>) -> Json<serde_json::Value> {
    state.chat.memory().clear().await;
    info!("memory cleared");
    Json(serde_json::json!({ "status": "Memory cleared" }))
}

async fn dedupe_memory(State(state): State<SharedState>) -> Json<serde_json::Value> {
    let removed = state.chat.memory().dedupe().await;
    Json(serde_json::json!({ "removed": removed }))
}

async fn status(State(state): State<SharedState>) -> Json<serde_json::Value> {
    let memory = state.chat.memory();
    let agent = state.chat.agent();

    Json(serde_json::json!({
        "status": "running",
        "version": env!("CARGO_PKG_VERSION"),
        "session_id": memory.session_id(),
        "memory_mode": memory.mode(),
        "memory_backend": state.config.memory.backend,
        "providers": agent.provider_ids(),
        "tools": agent.tool_names(),
    }))
}
