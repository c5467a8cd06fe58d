use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Json};
use med_kgqa::GraphStore;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info};
use uuid::Uuid;

use crate::service::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub query: String,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub neo4j_password: Option<String>,
}

/// POST /api/chat/stream — newline-delimited JSON events: one `meta`,
/// zero or more `delta`, an optional `error`, then `done`.
pub async fn stream_chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> impl IntoResponse {
    let request_id = Uuid::new_v4();
    info!("chat request {}: {}", request_id, request.query);

    let (tx, rx) = mpsc::channel::<String>(32);
    tokio::spawn(run_chat(state, request, tx));

    let lines = ReceiverStream::new(rx).map(Ok::<String, Infallible>);
    (
        [(header::CONTENT_TYPE, "application/json")],
        Body::from_stream(lines),
    )
}

async fn run_chat(state: AppState, request: ChatRequest, tx: mpsc::Sender<String>) {
    if request.neo4j_password.is_some() && !state.graph.connected().await {
        state
            .graph
            .connect(request.neo4j_password.as_deref())
            .await;
    }

    let store = state.graph.store().await;
    let graph = store.as_deref().map(|s| s as &dyn GraphStore);
    let answer = state.pipeline.ground(&request.query, graph).await;

    let meta = json!({
        "type": "meta",
        "intent": answer.intent,
        "entities": answer.entities,
        "prompt": answer.prompt,
        "knowledge": answer.knowledge,
    });
    if !send_event(&tx, &meta).await {
        return;
    }

    let (delta_tx, mut delta_rx) = mpsc::channel::<String>(32);
    let generator = Arc::clone(&state.generator);
    let model = request.model.clone();
    let api_key = request.api_key.clone();
    let prompt = answer.prompt;
    let generation = tokio::spawn(async move {
        generator
            .stream_completion(model.as_deref(), api_key.as_deref(), &prompt, delta_tx)
            .await
    });

    while let Some(content) = delta_rx.recv().await {
        let event = json!({ "type": "delta", "content": content });
        if !send_event(&tx, &event).await {
            // Client went away; dropping delta_rx stops the upstream
            // generation stream at its next send.
            return;
        }
    }

    match generation.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            error!("generation failed: {}", e);
            let event = json!({ "type": "error", "message": format!("生成答案失败: {e}") });
            send_event(&tx, &event).await;
        }
        Err(e) => {
            error!("generation task panicked: {}", e);
            let event = json!({ "type": "error", "message": "生成答案失败: 内部错误" });
            send_event(&tx, &event).await;
        }
    }

    send_event(&tx, &json!({ "type": "done" })).await;
}

/// Send one NDJSON line; false when the client has disconnected.
async fn send_event(tx: &mpsc::Sender<String>, event: &Value) -> bool {
    let mut line = event.to_string();
    line.push('\n');
    tx.send(line).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_are_newline_terminated_json() {
        let (tx, mut rx) = mpsc::channel(4);
        assert!(send_event(&tx, &json!({"type": "done"})).await);
        let line = rx.recv().await.unwrap();
        assert!(line.ends_with('\n'));
        let value: Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(value["type"], "done");
    }

    #[tokio::test]
    async fn send_event_reports_dropped_receiver() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        assert!(!send_event(&tx, &json!({"type": "done"})).await);
    }
}
