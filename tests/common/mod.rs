//! Shared test utilities for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

use std::{net::SocketAddr, sync::Arc};
use subtree_core::{
    model::{Node, NodeId, Tree},
    server::SubTreeServer,
    store::TreeStore,
};
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};

/// Initialize tracing for tests, respecting RUST_LOG env var.
///
/// Safe to call multiple times; subsequent calls are no-ops.
#[allow(dead_code)]
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// The two-node tree used throughout the HTTP tests, with numeric ids.
#[allow(dead_code)]
pub fn root_child_tree(sub_name: &str) -> Tree {
    Tree::new(
        sub_name,
        vec![
            Node::new(1i64, None, 0, "Root"),
            Node::new(2i64, Some(NodeId::from(1i64)), 0, "Child"),
        ],
    )
}

/// A running server bound to an ephemeral localhost port.
#[allow(dead_code)]
pub struct TestServer {
    pub addr: SocketAddr,
    pub store: Arc<dyn TreeStore>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

#[allow(dead_code)]
impl TestServer {
    pub async fn start(store: Arc<dyn TreeStore>) -> TestServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();
        let server = SubTreeServer::new(store.clone());
        let handle = tokio::spawn(async move {
            server
                .serve_listener(listener, async {
                    let _ = rx.await;
                })
                .await
                .unwrap();
        });
        TestServer {
            addr,
            store,
            shutdown: Some(tx),
            handle: Some(handle),
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Stop accepting connections and wait for the server task to finish.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.await.unwrap();
        }
    }
}
