//! Shared test utilities for tree and controller testing

use async_trait::async_trait;
use parking_lot::Mutex;
use std::{collections::BTreeMap, sync::Arc};
use tokio::sync::Notify;

use crate::{
    error::{Result, SubTreeError},
    gateway::DatasetGateway,
    model::{Node, NodeId, NodePatch, SessionState, Tree},
};

/// Initialize logging for tests
#[allow(dead_code)]
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// Helper function to create a bare node with string ids
pub fn node(id: &str, parent: Option<&str>, order: i64, name: &str) -> Node {
    Node::new(id, parent.map(NodeId::from), order, name)
}

/// A small lamp assembly:
///
/// ```text
/// Lamp (1, ASSY)
/// ├── Housing (2, order 0)
/// │   └── Screw (5, qty 4)
/// ├── Lens (3, order 1)
/// └── Bracket (4, order 2)
/// ```
///
/// Listed out of display order on purpose.
pub fn sample_nodes() -> Vec<Node> {
    let mut lamp = node("1", None, 0, "Lamp");
    lamp.kind = "ASSY".to_string();
    lamp.vehicle = Some("NX4".to_string());

    let lens = node("3", Some("1"), 1, "Lens");
    let mut housing = node("2", Some("1"), 0, "Housing");
    housing.material = Some("PC".to_string());
    let bracket = node("4", Some("1"), 2, "Bracket");
    let mut screw = node("5", Some("2"), 0, "Screw");
    screw.qty = Some(4.0);

    vec![lamp, lens, housing, bracket, screw]
}

pub fn sample_tree(sub_name: &str) -> Tree {
    Tree::new(sub_name, sample_nodes())
}

/// In-memory [`DatasetGateway`] that records every call.
///
/// Calls are logged as `"METHOD /path"` strings. Tree fetches, patches and uploads can be gated so
/// that they only complete once the returned [`Notify`] is signalled, which lets tests deliver
/// responses out of order.
#[derive(Default)]
pub struct FakeGateway {
    state: Mutex<FakeState>,
    gates: Mutex<BTreeMap<String, Arc<Notify>>>,
}

#[derive(Default)]
struct FakeState {
    trees: BTreeMap<String, Tree>,
    session: SessionState,
    saved: Vec<SessionState>,
    patches: Vec<(String, NodeId, NodePatch)>,
    calls: Vec<String>,
    fail_all: bool,
    fail_session_writes: bool,
    fail_patches: bool,
}

impl FakeGateway {
    pub fn with_trees(trees: Vec<Tree>) -> Self {
        let gateway = FakeGateway::default();
        for tree in trees {
            gateway.insert(tree);
        }
        gateway
    }

    pub fn insert(&self, tree: Tree) {
        self.state.lock().trees.insert(tree.sub_name.clone(), tree);
    }

    pub fn tree(&self, sub_name: &str) -> Option<Tree> {
        self.state.lock().trees.get(sub_name).cloned()
    }

    pub fn seed_session(&self, session: SessionState) {
        self.state.lock().session = session;
    }

    pub fn session(&self) -> SessionState {
        self.state.lock().session.clone()
    }

    pub fn saved_sessions(&self) -> Vec<SessionState> {
        self.state.lock().saved.clone()
    }

    pub fn patches(&self) -> Vec<(String, NodeId, NodePatch)> {
        self.state.lock().patches.clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.state.lock().calls.iter().filter(|c| *c == call).count()
    }

    pub fn fail_all(&self, fail: bool) {
        self.state.lock().fail_all = fail;
    }

    pub fn fail_session_writes(&self, fail: bool) {
        self.state.lock().fail_session_writes = fail;
    }

    pub fn fail_patches(&self, fail: bool) {
        self.state.lock().fail_patches = fail;
    }

    /// Hold `fetch_tree(sub_name)` until the returned notify is signalled.
    pub fn gate(&self, sub_name: &str) -> Arc<Notify> {
        self.add_gate(format!("GET {sub_name}"))
    }

    /// Hold `patch_node` calls on `sub_name` until the returned notify is signalled.
    pub fn gate_patches(&self, sub_name: &str) -> Arc<Notify> {
        self.add_gate(format!("PATCH {sub_name}"))
    }

    /// Hold `upload` calls until the returned notify is signalled.
    pub fn gate_uploads(&self) -> Arc<Notify> {
        self.add_gate("UPLOAD".to_string())
    }

    fn add_gate(&self, key: String) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        self.gates.lock().insert(key, notify.clone());
        notify
    }

    async fn pass_gate(&self, key: &str) {
        let gate = self.gates.lock().get(key).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
    }

    fn record(&self, call: String) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(call);
        if state.fail_all {
            return Err(SubTreeError::Network("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DatasetGateway for FakeGateway {
    async fn list_subs(&self) -> Result<Vec<String>> {
        self.record("GET /api/subs".to_string())?;
        Ok(self.state.lock().trees.keys().cloned().collect())
    }

    async fn fetch_tree(&self, sub_name: &str) -> Result<Tree> {
        self.record(format!("GET /api/subs/{sub_name}/tree"))?;
        self.pass_gate(&format!("GET {sub_name}")).await;
        self.state
            .lock()
            .trees
            .get(sub_name)
            .cloned()
            .ok_or_else(|| SubTreeError::Rejected {
                status: 404,
                message: format!("Unknown SUB name {sub_name}"),
            })
    }

    async fn upload(&self, filename: &str, bytes: Vec<u8>) -> Result<Tree> {
        self.record(format!("POST /api/upload_excel {filename}"))?;
        self.pass_gate("UPLOAD").await;
        let tree: Tree = serde_json::from_slice(&bytes).map_err(|e| SubTreeError::Rejected {
            status: 400,
            message: format!("{e}"),
        })?;
        self.insert(tree.clone());
        Ok(tree)
    }

    async fn patch_node(&self, sub_name: &str, id: &NodeId, patch: &NodePatch) -> Result<Tree> {
        self.record(format!("PATCH /api/subs/{sub_name}/nodes/{id}"))?;
        self.pass_gate(&format!("PATCH {sub_name}")).await;
        let mut state = self.state.lock();
        state
            .patches
            .push((sub_name.to_string(), id.clone(), patch.clone()));
        if state.fail_patches {
            return Err(SubTreeError::Rejected {
                status: 500,
                message: "patch failed".to_string(),
            });
        }
        let tree = state
            .trees
            .get_mut(sub_name)
            .ok_or_else(|| SubTreeError::Rejected {
                status: 404,
                message: "Tree not loaded".to_string(),
            })?;
        let node = tree.get_mut(id).ok_or_else(|| SubTreeError::Rejected {
            status: 404,
            message: "Node not found".to_string(),
        })?;
        patch.apply(node);
        Ok(tree.clone())
    }

    async fn get_session(&self) -> Result<SessionState> {
        self.record("GET /api/state".to_string())?;
        Ok(self.state.lock().session.clone())
    }

    async fn set_session(&self, session: &SessionState) -> Result<()> {
        self.record("POST /api/state".to_string())?;
        let mut state = self.state.lock();
        if state.fail_session_writes {
            return Err(SubTreeError::Rejected {
                status: 503,
                message: "unavailable".to_string(),
            });
        }
        state.session = session.clone();
        state.saved.push(session.clone());
        Ok(())
    }
}
