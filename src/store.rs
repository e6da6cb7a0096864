//! Server-side storage for SUB trees and the process-wide session.
//!
//! [`MemoryStore`] keeps everything in memory. [`JsonFileStore`] additionally mirrors it to two
//! JSON files:
//!
//! ```text
//! <data_dir>/
//!   tree_store.json      { "<sub_name>": Tree, ... }
//!   session_state.json   { "sub_name": ..., "selected_id": ... }
//! ```
//!
//! Files are replaced atomically (write to a temp file, then rename). A file that cannot be read
//! or parsed is treated as empty and logged.

use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use crate::{
    error::{Result, SubTreeError},
    model::{DatasetInfo, NodeId, NodePatch, SessionState, Tree},
};

pub const TREE_STORE_FILE: &str = "tree_store.json";
pub const SESSION_STATE_FILE: &str = "session_state.json";

/// Server-side storage seam. All dataset names are reported in ascending order.
pub trait TreeStore: Send + Sync {
    fn names(&self) -> Vec<String>;
    fn list(&self) -> Vec<DatasetInfo>;
    fn get(&self, sub_name: &str) -> Result<Tree>;
    /// Store a freshly ingested tree.
    ///
    /// If a tree with the same name exists, user edits on nodes with matching ids are carried over.
    fn put(&self, tree: Tree) -> Result<Tree>;
    /// Apply `patch` to one node and return the full updated tree.
    fn patch_node(&self, sub_name: &str, id: &NodeId, patch: &NodePatch) -> Result<Tree>;
    fn session(&self) -> SessionState;
    fn set_session(&self, session: SessionState) -> Result<SessionState>;
    /// Force the named dataset to durable storage.
    fn flush(&self, sub_name: &str) -> Result<()>;
}

#[derive(Debug, Clone, Default)]
struct StoreData {
    trees: BTreeMap<String, Tree>,
    session: SessionState,
}

impl StoreData {
    fn list(&self) -> Vec<DatasetInfo> {
        self.trees
            .values()
            .map(|tree| DatasetInfo {
                sub_name: tree.sub_name.clone(),
                node_count: tree.nodes.len(),
            })
            .collect()
    }

    fn get(&self, sub_name: &str) -> Result<&Tree> {
        self.trees.get(sub_name).ok_or_else(|| unknown_sub(sub_name))
    }

    fn put(&mut self, tree: Tree) -> Tree {
        let tree = match self.trees.get(&tree.sub_name) {
            Some(saved) => merge_user_edits(tree, saved),
            None => tree,
        };
        self.trees.insert(tree.sub_name.clone(), tree.clone());
        tracing::info!(
            "[TreeStore] stored '{}' ({} nodes)",
            tree.sub_name,
            tree.nodes.len()
        );
        tree
    }

    fn patch_node(&mut self, sub_name: &str, id: &NodeId, patch: &NodePatch) -> Result<Tree> {
        let patch = normalize_patch(patch)?;
        let tree = self
            .trees
            .get_mut(sub_name)
            .ok_or_else(|| unknown_sub(sub_name))?;
        let node = tree
            .get_mut(id)
            .ok_or_else(|| SubTreeError::NotFound(format!("Node '{id}' not found")))?;
        patch.apply(node);
        tracing::debug!("[TreeStore] patched {}/{}", sub_name, id);
        Ok(tree.clone())
    }
}

fn unknown_sub(sub_name: &str) -> SubTreeError {
    SubTreeError::NotFound(format!("Unknown SUB name '{sub_name}'"))
}

/// Volatile store; everything is lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<StoreData>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }
}

impl TreeStore for MemoryStore {
    fn names(&self) -> Vec<String> {
        self.data.read().trees.keys().cloned().collect()
    }

    fn list(&self) -> Vec<DatasetInfo> {
        self.data.read().list()
    }

    fn get(&self, sub_name: &str) -> Result<Tree> {
        self.data.read().get(sub_name).cloned()
    }

    fn put(&self, tree: Tree) -> Result<Tree> {
        Ok(self.data.write().put(tree))
    }

    fn patch_node(&self, sub_name: &str, id: &NodeId, patch: &NodePatch) -> Result<Tree> {
        self.data.write().patch_node(sub_name, id, patch)
    }

    fn session(&self) -> SessionState {
        self.data.read().session.clone()
    }

    fn set_session(&self, session: SessionState) -> Result<SessionState> {
        self.data.write().session = session.clone();
        Ok(session)
    }

    fn flush(&self, sub_name: &str) -> Result<()> {
        self.data.read().get(sub_name).map(|_| ())
    }
}

/// Store mirrored to JSON files under a data directory. Every mutation is written through.
///
/// A mutation is applied to a copy first and only becomes visible once it is on disk, so a failed
/// write leaves both memory and files at the previous state.
#[derive(Debug)]
pub struct JsonFileStore {
    data: RwLock<StoreData>,
    data_dir: PathBuf,
}

impl JsonFileStore {
    /// Open (or create) a store persisted under `data_dir`.
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        fs::create_dir_all(&data_dir)?;
        let trees: BTreeMap<String, Tree> =
            read_json(&data_dir.join(TREE_STORE_FILE)).unwrap_or_default();
        let session = read_json(&data_dir.join(SESSION_STATE_FILE)).unwrap_or_default();
        tracing::info!(
            "[TreeStore] opened {} ({} dataset(s))",
            data_dir.display(),
            trees.len()
        );
        Ok(JsonFileStore {
            data: RwLock::new(StoreData { trees, session }),
            data_dir,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn persist_trees(&self, data: &StoreData) -> Result<()> {
        write_json(&self.data_dir.join(TREE_STORE_FILE), &data.trees)
    }
}

impl TreeStore for JsonFileStore {
    fn names(&self) -> Vec<String> {
        self.data.read().trees.keys().cloned().collect()
    }

    fn list(&self) -> Vec<DatasetInfo> {
        self.data.read().list()
    }

    fn get(&self, sub_name: &str) -> Result<Tree> {
        self.data.read().get(sub_name).cloned()
    }

    fn put(&self, tree: Tree) -> Result<Tree> {
        let mut data = self.data.write();
        let mut next = data.clone();
        let tree = next.put(tree);
        self.persist_trees(&next)?;
        *data = next;
        Ok(tree)
    }

    fn patch_node(&self, sub_name: &str, id: &NodeId, patch: &NodePatch) -> Result<Tree> {
        let mut data = self.data.write();
        let mut next = data.clone();
        let tree = next.patch_node(sub_name, id, patch)?;
        self.persist_trees(&next)?;
        *data = next;
        Ok(tree)
    }

    fn session(&self) -> SessionState {
        self.data.read().session.clone()
    }

    fn set_session(&self, session: SessionState) -> Result<SessionState> {
        let mut data = self.data.write();
        write_json(&self.data_dir.join(SESSION_STATE_FILE), &session)?;
        data.session = session.clone();
        Ok(session)
    }

    fn flush(&self, sub_name: &str) -> Result<()> {
        let data = self.data.read();
        data.get(sub_name)?;
        self.persist_trees(&data)
    }
}

/// Copy editable fields from `saved` onto nodes of `base` with the same id.
pub fn merge_user_edits(mut base: Tree, saved: &Tree) -> Tree {
    let saved_nodes: BTreeMap<&NodeId, _> = saved.nodes.iter().map(|n| (&n.id, n)).collect();
    for node in base.nodes.iter_mut() {
        if let Some(edited) = saved_nodes.get(&node.id) {
            node.name = edited.name.clone();
            node.kind = edited.kind.clone();
            node.vehicle = edited.vehicle.clone();
            node.material = edited.material.clone();
            node.qty = edited.qty;
        }
    }
    base
}

/// Trim text fields and reject quantities that are not finite.
fn normalize_patch(patch: &NodePatch) -> Result<NodePatch> {
    let mut patch = patch.clone();
    patch.name = patch.name.map(|n| n.trim().to_string());
    patch.kind = patch.kind.map(|k| k.trim().to_string());
    if let Some(Some(qty)) = patch.qty {
        if !qty.is_finite() {
            return Err(SubTreeError::InvalidInput(format!(
                "quantity must be finite, got {qty}"
            )));
        }
    }
    Ok(patch)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    if !path.exists() {
        return None;
    }
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            tracing::warn!("[TreeStore] could not read {}: {}", path.display(), e);
            return None;
        }
    };
    match serde_json::from_str(&content) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("[TreeStore] ignoring unreadable {}: {}", path.display(), e);
            None
        }
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_string_pretty(value)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
