//! Tree Builder: flat node list to parent/child index.
//!
//! The hierarchy is arena-style. Children are stored as indices into the flat `nodes` slice the
//! hierarchy was built from, so it never owns or points into nodes. It is rebuilt from scratch for
//! every render and carries no memory of earlier builds.
//!
//! The builder does not trust its input. Parent references that resolve to nothing leave the node
//! in the [`Hierarchy::orphans`] bucket, and nodes on a parent cycle are simply unreachable from
//! the roots. Neither case panics; [`diagnose`] reports them.

use petgraph::{algo::tarjan_scc, Graph};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::model::{Node, NodeId};

/// Parent/child index over a flat node list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hierarchy {
    roots: Vec<usize>,
    children: BTreeMap<NodeId, Vec<usize>>,
    orphans: Vec<usize>,
}

impl Hierarchy {
    /// Group `nodes` by parent and stable-sort every bucket by `order`.
    pub fn build(nodes: &[Node]) -> Hierarchy {
        let ids: BTreeSet<&NodeId> = nodes.iter().map(|n| &n.id).collect();
        let mut hierarchy = Hierarchy::default();

        for (idx, node) in nodes.iter().enumerate() {
            match &node.parent_id {
                None => hierarchy.roots.push(idx),
                Some(parent) if ids.contains(parent) => hierarchy
                    .children
                    .entry(parent.clone())
                    .or_default()
                    .push(idx),
                Some(parent) => {
                    tracing::debug!("[Hierarchy] node {} has unknown parent {}", node.id, parent);
                    hierarchy.orphans.push(idx);
                }
            }
        }

        // slice::sort_by_key is stable, so equal orders keep list order.
        hierarchy.roots.sort_by_key(|idx| nodes[*idx].order);
        for bucket in hierarchy.children.values_mut() {
            bucket.sort_by_key(|idx| nodes[*idx].order);
        }
        hierarchy
    }

    /// Indices of nodes without a parent, in display order.
    pub fn roots(&self) -> &[usize] {
        &self.roots
    }

    /// Indices of the direct children of `id`, in display order.
    pub fn children_of(&self, id: &NodeId) -> &[usize] {
        self.children.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Nodes whose `parent_id` names no node in the list. Never rendered.
    pub fn orphans(&self) -> &[usize] {
        &self.orphans
    }
}

/// Structural problems in a node list. Informational only: the builder tolerates all of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TreeDiagnostic {
    DuplicateId(NodeId),
    DanglingParent { id: NodeId, parent_id: NodeId },
    SelfParent(NodeId),
    /// Ids forming a parent cycle, in list order.
    Cycle(Vec<NodeId>),
}

/// Check whether `nodes` forms a forest.
pub fn diagnose(nodes: &[Node]) -> Vec<TreeDiagnostic> {
    let mut diagnostics = Vec::new();
    let mut first_index: BTreeMap<&NodeId, usize> = BTreeMap::new();
    for (idx, node) in nodes.iter().enumerate() {
        if first_index.contains_key(&node.id) {
            diagnostics.push(TreeDiagnostic::DuplicateId(node.id.clone()));
        } else {
            first_index.insert(&node.id, idx);
        }
    }

    let mut graph: Graph<usize, ()> = Graph::with_capacity(nodes.len(), nodes.len());
    let graph_idx: Vec<_> = (0..nodes.len()).map(|idx| graph.add_node(idx)).collect();
    for (idx, node) in nodes.iter().enumerate() {
        let Some(parent) = &node.parent_id else {
            continue;
        };
        if parent == &node.id {
            diagnostics.push(TreeDiagnostic::SelfParent(node.id.clone()));
            continue;
        }
        match first_index.get(parent) {
            Some(parent_idx) => {
                graph.add_edge(graph_idx[*parent_idx], graph_idx[idx], ());
            }
            None => diagnostics.push(TreeDiagnostic::DanglingParent {
                id: node.id.clone(),
                parent_id: parent.clone(),
            }),
        }
    }

    for component in tarjan_scc(&graph) {
        if component.len() < 2 {
            continue;
        }
        let mut members: Vec<usize> = component.iter().map(|n| graph[*n]).collect();
        members.sort_unstable();
        diagnostics.push(TreeDiagnostic::Cycle(
            members.into_iter().map(|i| nodes[i].id.clone()).collect(),
        ));
    }

    for diagnostic in diagnostics.iter() {
        tracing::warn!("[Hierarchy] {:?}", diagnostic);
    }
    diagnostics
}
