use std::sync::Arc;

use med_kgqa::Neo4jHttpStore;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{info, warn};

#[derive(Debug, Default)]
struct LinkState {
    store: Option<Arc<Neo4jHttpStore>>,
    last_error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LinkStatus {
    pub connected: bool,
    pub error: Option<String>,
}

/// Mutable handle to the graph store connection. Unreachability is a
/// normal state, not an error: requests observe `store() == None` and
/// degrade to the not-connected prompt path.
pub struct GraphLink {
    inner: RwLock<LinkState>,
}

impl GraphLink {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(LinkState::default()),
        }
    }

    /// (Re)connect, trying a caller-supplied password before the
    /// configured one. Returns whether a connection was established.
    pub async fn connect(&self, custom_password: Option<&str>) -> bool {
        let base_url =
            std::env::var("NEO4J_URL").unwrap_or_else(|_| "http://localhost:7474".to_string());
        let user = std::env::var("NEO4J_USER").unwrap_or_else(|_| "neo4j".to_string());

        let mut passwords: Vec<String> = Vec::new();
        if let Some(password) = custom_password {
            passwords.push(password.to_string());
        }
        if let Ok(password) = std::env::var("NEO4J_PASSWORD") {
            passwords.push(password);
        }
        passwords.push("neo4j".to_string());

        let mut last_error = None;
        for password in &passwords {
            let store = Neo4jHttpStore::new(&base_url, &user, password);
            match store.ping().await {
                Ok(()) => {
                    info!("connected to graph store at {}", base_url);
                    let mut state = self.inner.write().await;
                    state.store = Some(Arc::new(store));
                    state.last_error = None;
                    return true;
                }
                Err(e) => last_error = Some(e.to_string()),
            }
        }

        warn!(
            "graph store unreachable at {}: {}",
            base_url,
            last_error.as_deref().unwrap_or("no attempts")
        );
        let mut state = self.inner.write().await;
        state.store = None;
        state.last_error = last_error;
        false
    }

    pub async fn store(&self) -> Option<Arc<Neo4jHttpStore>> {
        self.inner.read().await.store.clone()
    }

    pub async fn connected(&self) -> bool {
        self.inner.read().await.store.is_some()
    }

    pub async fn status(&self) -> LinkStatus {
        let state = self.inner.read().await;
        LinkStatus {
            connected: state.store.is_some(),
            error: state.last_error.clone(),
        }
    }
}

impl Default for GraphLink {
    fn default() -> Self {
        Self::new()
    }
}
