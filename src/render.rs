//! Renderer: hierarchy to nested card structure, plus the connector geometry pass.
//!
//! Rendering is a full replace. Every call produces a fresh [`RenderedTree`] from the flat node list
//! and its [`Hierarchy`]; the selection marker is reset and then restored only when the selected id
//! still names a node in the tree.
//!
//! Connector geometry depends on measured on-screen positions, so it is a separate pass
//! ([`apply_connectors`]) run once layout is known. Measurement sits behind the [`Measure`] trait;
//! [`StackedLayout`] is a deterministic implementation for text output and tests.

use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt::Write};

use crate::{
    hierarchy::Hierarchy,
    model::{Node, NodeId, Tree},
};

pub const NO_DATASET_PLACEHOLDER: &str = "Select a SUB to display its tree.";
pub const EMPTY_DATASET_PLACEHOLDER: &str = "This SUB has no nodes.";

/// The interactive card for one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardRow {
    pub name: String,
    pub kind: String,
    pub vehicle: Option<String>,
    pub material: Option<String>,
    pub qty: Option<f64>,
    pub assembly: bool,
    pub selected: bool,
}

impl From<&Node> for CardRow {
    fn from(node: &Node) -> Self {
        CardRow {
            name: node.name.clone(),
            kind: node.kind.clone(),
            vehicle: node.vehicle.clone(),
            material: node.material.clone(),
            qty: node.qty,
            assembly: node.is_assembly(),
            selected: false,
        }
    }
}

/// Vertical connector span inside a children container, relative to the container's top edge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Connector {
    pub line_top: f64,
    pub line_height: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildrenContainer {
    pub nodes: Vec<NodeView>,
    /// `None` until the geometry pass has run, and always `None` for an empty container.
    pub connector: Option<Connector>,
}

/// Wrapper for one rendered node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeView {
    /// Index of the node in the tree's flat list. Unique within a render.
    pub key: usize,
    pub id: NodeId,
    pub level: usize,
    pub row: CardRow,
    pub children: Option<ChildrenContainer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RenderedTree {
    Placeholder(String),
    Forest {
        sub_name: String,
        roots: Vec<NodeView>,
    },
}

impl Default for RenderedTree {
    fn default() -> Self {
        RenderedTree::Placeholder(NO_DATASET_PLACEHOLDER.to_string())
    }
}

impl RenderedTree {
    /// All node views in display order.
    pub fn views(&self) -> Vec<&NodeView> {
        fn collect<'a>(views: &'a [NodeView], out: &mut Vec<&'a NodeView>) {
            for view in views {
                out.push(view);
                if let Some(container) = &view.children {
                    collect(&container.nodes, out);
                }
            }
        }
        let mut out = Vec::new();
        if let RenderedTree::Forest { roots, .. } = self {
            collect(roots, &mut out);
        }
        out
    }

    pub fn selected(&self) -> Vec<&NodeView> {
        self.views().into_iter().filter(|v| v.row.selected).collect()
    }
}

/// Render `tree` into a fresh visual structure.
///
/// `selected` marks at most one row: the first one, in display order, whose id equals it.
pub fn render(tree: Option<&Tree>, hierarchy: &Hierarchy, selected: Option<&NodeId>) -> RenderedTree {
    let Some(tree) = tree else {
        return RenderedTree::Placeholder(NO_DATASET_PLACEHOLDER.to_string());
    };
    if tree.is_empty() {
        return RenderedTree::Placeholder(EMPTY_DATASET_PLACEHOLDER.to_string());
    }

    let mut builder = ViewBuilder {
        nodes: &tree.nodes,
        hierarchy,
        selected: selected.filter(|id| tree.contains(id)),
        marked: false,
        seen: vec![false; tree.nodes.len()],
    };
    let roots = builder.views(hierarchy.roots(), 0);
    tracing::debug!(
        "[Render] {} with {} root(s), selection marked: {}",
        tree.sub_name,
        roots.len(),
        builder.marked
    );
    RenderedTree::Forest {
        sub_name: tree.sub_name.clone(),
        roots,
    }
}

struct ViewBuilder<'a> {
    nodes: &'a [Node],
    hierarchy: &'a Hierarchy,
    selected: Option<&'a NodeId>,
    marked: bool,
    seen: Vec<bool>,
}

impl ViewBuilder<'_> {
    fn views(&mut self, indices: &[usize], level: usize) -> Vec<NodeView> {
        let mut out = Vec::with_capacity(indices.len());
        for idx in indices {
            if std::mem::replace(&mut self.seen[*idx], true) {
                continue;
            }
            let node = &self.nodes[*idx];
            let mut row = CardRow::from(node);
            if !self.marked && self.selected == Some(&node.id) {
                row.selected = true;
                self.marked = true;
            }
            let child_indices = self.hierarchy.children_of(&node.id);
            let children = if child_indices.is_empty() {
                None
            } else {
                Some(ChildrenContainer {
                    nodes: self.views(child_indices, level + 1),
                    connector: None,
                })
            };
            out.push(NodeView {
                key: *idx,
                id: node.id.clone(),
                level,
                row,
                children,
            });
        }
        out
    }
}

/// Measured box, in the same coordinate space for rows and containers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub top: f64,
    pub height: f64,
}

impl Rect {
    pub fn mid(&self) -> f64 {
        self.top + self.height / 2.0
    }
}

/// On-screen measurement of a committed render.
pub trait Measure {
    /// Box of the card row for the node view with this key.
    fn row(&self, key: usize) -> Option<Rect>;
    /// Box of the children container owned by the node view with this key.
    fn container(&self, parent_key: usize) -> Option<Rect>;
}

/// Compute connector spans for every children container.
///
/// The span runs from the midpoint of the first child row to the midpoint of the last one.
/// Empty containers, and containers whose rows cannot be measured, are cleared.
pub fn apply_connectors(rendered: &mut RenderedTree, measure: &dyn Measure) {
    fn apply(views: &mut [NodeView], measure: &dyn Measure) {
        for view in views.iter_mut() {
            if let Some(container) = view.children.as_mut() {
                apply(&mut container.nodes, measure);
                container.connector = connector_for(view.key, container, measure);
            }
        }
    }
    if let RenderedTree::Forest { roots, .. } = rendered {
        apply(roots, measure);
    }
}

fn connector_for(
    parent_key: usize,
    container: &ChildrenContainer,
    measure: &dyn Measure,
) -> Option<Connector> {
    let first = container.nodes.first()?;
    let last = container.nodes.last()?;
    let frame = measure.container(parent_key)?;
    let first_mid = measure.row(first.key)?.mid();
    let last_mid = measure.row(last.key)?.mid();
    Some(Connector {
        line_top: first_mid - frame.top,
        line_height: last_mid - first_mid,
    })
}

/// Fixed-height vertical stacking layout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StackedLayout {
    pub row_height: f64,
    pub gap: f64,
}

impl Default for StackedLayout {
    fn default() -> Self {
        StackedLayout {
            row_height: 40.0,
            gap: 8.0,
        }
    }
}

/// Row and container boxes produced by [`StackedLayout::measure`].
#[derive(Debug, Clone, Default)]
pub struct MeasuredLayout {
    rows: BTreeMap<usize, Rect>,
    containers: BTreeMap<usize, Rect>,
}

impl StackedLayout {
    pub fn measure(&self, rendered: &RenderedTree) -> MeasuredLayout {
        let mut layout = MeasuredLayout::default();
        if let RenderedTree::Forest { roots, .. } = rendered {
            self.place(roots, 0.0, &mut layout);
        }
        layout
    }

    /// Lay out `views` starting at `top`; returns the bottom edge.
    fn place(&self, views: &[NodeView], mut top: f64, layout: &mut MeasuredLayout) -> f64 {
        for view in views {
            layout.rows.insert(
                view.key,
                Rect {
                    top,
                    height: self.row_height,
                },
            );
            top += self.row_height + self.gap;
            if let Some(container) = &view.children {
                let container_top = top;
                top = self.place(&container.nodes, top, layout);
                layout.containers.insert(
                    view.key,
                    Rect {
                        top: container_top,
                        height: top - container_top,
                    },
                );
            }
        }
        top
    }
}

impl Measure for MeasuredLayout {
    fn row(&self, key: usize) -> Option<Rect> {
        self.rows.get(&key).copied()
    }

    fn container(&self, parent_key: usize) -> Option<Rect> {
        self.containers.get(&parent_key).copied()
    }
}

/// Indented text outline of a render. The selected row is prefixed with `>`.
pub fn outline(rendered: &RenderedTree) -> String {
    let mut out = String::new();
    match rendered {
        RenderedTree::Placeholder(message) => {
            out.push_str(message);
            out.push('\n');
        }
        RenderedTree::Forest { sub_name, .. } => {
            let _ = writeln!(out, "SUB {sub_name}");
            for view in rendered.views() {
                let _ = writeln!(out, "{}", outline_row(view));
            }
        }
    }
    out
}

fn outline_row(view: &NodeView) -> String {
    let marker = if view.row.selected { '>' } else { ' ' };
    let mut line = format!("{marker} {}{} [{}]", "  ".repeat(view.level), view.row.name, view.id);
    if !view.row.kind.is_empty() {
        let _ = write!(line, " {}", view.row.kind);
    }
    if let Some(vehicle) = &view.row.vehicle {
        let _ = write!(line, " vehicle={vehicle}");
    }
    if let Some(material) = &view.row.material {
        let _ = write!(line, " material={material}");
    }
    if let Some(qty) = view.row.qty {
        let _ = write!(line, " qty={qty}");
    }
    line
}
