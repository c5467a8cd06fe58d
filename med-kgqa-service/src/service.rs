use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use med_kgqa::QaPipeline;
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::chat;
use crate::graph_link::{GraphLink, LinkStatus};
use crate::llm::StreamingGenerator;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<QaPipeline>,
    pub graph: Arc<GraphLink>,
    pub generator: Arc<StreamingGenerator>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/api/chat/stream", post(chat::stream_chat))
        .route("/api/neo4j/status", get(neo4j_status))
        .route("/api/neo4j/connect", post(neo4j_connect))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "Medical KG-QA Service",
        "version": "0.1.0",
        "description": "Knowledge-graph grounded medical question answering with streaming generation",
        "endpoints": {
            "POST /api/chat/stream": "Grounded chat with NDJSON event stream",
            "GET /api/neo4j/status": "Graph store connection status",
            "POST /api/neo4j/connect": "Reconnect to the graph store",
            "GET /health": "Health check"
        }
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn neo4j_status(State(state): State<AppState>) -> Json<LinkStatus> {
    Json(state.graph.status().await)
}

#[derive(Debug, Deserialize)]
struct ConnectRequest {
    password: Option<String>,
}

async fn neo4j_connect(
    State(state): State<AppState>,
    Json(request): Json<ConnectRequest>,
) -> Json<LinkStatus> {
    state.graph.connect(request.password.as_deref()).await;
    Json(state.graph.status().await)
}
