//! HTTP server for SUB trees and the process-wide session.
//!
//! Routes:
//!
//! | Route                               | Handler                          |
//! |-------------------------------------|----------------------------------|
//! | `GET /api/subs`                     | dataset names, ascending         |
//! | `GET /api/datasets`                 | `[{ sub_name, node_count }]`     |
//! | `GET /api/subs/:name/tree`          | full tree                        |
//! | `PATCH /api/subs/:name/nodes/:id`   | partial node edit, full tree     |
//! | `POST /api/subs/:name/save`         | flush to storage, `{ "ok": true }` |
//! | `POST /api/upload_excel`            | multipart field `file`, tree     |
//! | `GET /api/state`                    | session state                    |
//! | `POST /api/state`                   | replace session state            |
//!
//! Errors are answered with the status from [`SubTreeError::status_code`] and a
//! `{ "detail": ... }` body.

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    routing::{get, patch, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::{future::Future, net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::{
    config::ServerConfig,
    error::{Result, SubTreeError},
    ingest::{JsonTreeIngestor, TreeIngestor},
    model::{DatasetInfo, NodeId, NodePatch, SessionState, Tree},
    store::{JsonFileStore, MemoryStore, TreeStore},
};

/// Upper bound for an uploaded source file.
pub const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

#[derive(Clone)]
struct ServerState {
    store: Arc<dyn TreeStore>,
    ingestor: Arc<dyn TreeIngestor>,
}

pub struct SubTreeServer {
    state: ServerState,
}

impl SubTreeServer {
    pub fn new(store: Arc<dyn TreeStore>) -> Self {
        SubTreeServer {
            state: ServerState {
                store,
                ingestor: Arc::new(JsonTreeIngestor),
            },
        }
    }

    /// Pick the storage backend from configuration: a data directory means JSON files.
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        let store: Arc<dyn TreeStore> = match &config.data_dir {
            Some(dir) => Arc::new(JsonFileStore::open(dir)?),
            None => {
                tracing::info!("[SubTreeServer] no data_dir configured, using in-memory store");
                Arc::new(MemoryStore::new())
            }
        };
        Ok(SubTreeServer::new(store))
    }

    pub fn with_ingestor(mut self, ingestor: Arc<dyn TreeIngestor>) -> Self {
        self.state.ingestor = ingestor;
        self
    }

    pub fn store(&self) -> Arc<dyn TreeStore> {
        self.state.store.clone()
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/subs", get(list_subs))
            .route("/api/datasets", get(list_datasets))
            .route("/api/subs/:name/tree", get(get_tree))
            .route("/api/subs/:name/nodes/:id", patch(patch_node))
            .route("/api/subs/:name/save", post(save_tree))
            .route("/api/upload_excel", post(upload))
            .route("/api/state", get(get_state).post(set_state))
            .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Bind `addr` and serve until `shutdown_signal` resolves.
    pub async fn serve(
        self,
        addr: SocketAddr,
        shutdown_signal: impl Future<Output = ()> + Send + 'static,
    ) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve_listener(listener, shutdown_signal).await
    }

    /// Serve on an already bound listener (tests bind port 0 and read the address back).
    pub async fn serve_listener(
        self,
        listener: TcpListener,
        shutdown_signal: impl Future<Output = ()> + Send + 'static,
    ) -> Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!("SUB tree server listening on http://{}", addr);
        axum::serve(listener, self.router().into_make_service())
            .with_graceful_shutdown(shutdown_signal)
            .await?;
        tracing::info!("SUB tree server shut down");
        Ok(())
    }
}

async fn list_subs(State(state): State<ServerState>) -> Json<Vec<String>> {
    Json(state.store.names())
}

async fn list_datasets(State(state): State<ServerState>) -> Json<Vec<DatasetInfo>> {
    Json(state.store.list())
}

async fn get_tree(
    State(state): State<ServerState>,
    Path(name): Path<String>,
) -> Result<Json<Tree>> {
    Ok(Json(state.store.get(&name)?))
}

async fn patch_node(
    State(state): State<ServerState>,
    Path((name, id)): Path<(String, String)>,
    Json(patch): Json<NodePatch>,
) -> Result<Json<Tree>> {
    let tree = state.store.patch_node(&name, &NodeId::from(id), &patch)?;
    Ok(Json(tree))
}

async fn save_tree(
    State(state): State<ServerState>,
    Path(name): Path<String>,
) -> Result<Json<Value>> {
    state.store.flush(&name)?;
    Ok(Json(json!({ "ok": true })))
}

async fn upload(State(state): State<ServerState>, mut multipart: Multipart) -> Result<Json<Tree>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| SubTreeError::InvalidInput(format!("malformed multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or("upload").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| SubTreeError::InvalidInput(format!("could not read upload: {e}")))?;
        let tree = state.ingestor.ingest(&filename, &bytes)?;
        let tree = state.store.put(tree)?;
        state
            .store
            .set_session(SessionState::new(Some(tree.sub_name.clone()), None))?;
        return Ok(Json(tree));
    }
    Err(SubTreeError::InvalidInput(
        "multipart field 'file' is required".to_string(),
    ))
}

async fn get_state(State(state): State<ServerState>) -> Json<SessionState> {
    Json(state.store.session())
}

async fn set_state(
    State(state): State<ServerState>,
    Json(session): Json<SessionState>,
) -> Result<Json<SessionState>> {
    tracing::debug!(
        "[SubTreeServer] session sub={:?} selected={:?}",
        session.sub_name,
        session.selected_id.as_ref().map(NodeId::as_str)
    );
    Ok(Json(state.store.set_session(session)?))
}
