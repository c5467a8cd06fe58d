mod chat;
mod graph_link;
mod llm;
mod service;

use std::sync::Arc;

use med_kgqa::{QaPipeline, TermIndex};
use tokio::net::TcpListener;
use tracing::{Level, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::graph_link::GraphLink;
use crate::llm::{RigIntentClassifier, StreamingGenerator};
use crate::service::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let data_dir = std::env::var("KG_DATA_DIR").unwrap_or_else(|_| "data/ent_aug".to_string());
    info!("loading canonical term lists from {}", data_dir);
    let index = TermIndex::from_dir(&data_dir)?;

    let generator = Arc::new(StreamingGenerator::from_env());
    let mut pipeline = QaPipeline::new(&index);
    if std::env::var("OPENROUTER_API_KEY").is_ok() {
        pipeline = pipeline
            .with_intent_classifier(Arc::new(RigIntentClassifier::new(generator.default_model())));
    } else {
        warn!("OPENROUTER_API_KEY not set; intent recognition is keyword-only");
    }

    let graph = Arc::new(GraphLink::new());
    if !graph.connect(None).await {
        warn!("starting without a graph store connection; prompts will degrade");
    }

    let state = AppState {
        pipeline: Arc::new(pipeline),
        graph,
        generator,
    };
    let app = service::build_router(state);

    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(8000);
    let listener = TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    let addr = listener.local_addr()?;

    info!("Medical KG-QA Service starting on {}", addr);
    info!("Chat endpoint: POST http://{}/api/chat/stream", addr);
    info!("Health check endpoint: http://{}/health", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
