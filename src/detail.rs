//! Detail Panel form binding.
//!
//! The form holds raw text exactly as a user would type it. [`DetailForm::parse`] is the single
//! conversion point to a [`NodePatch`] and is shared by local and persisted apply, so both modes
//! validate identically.

use serde::{Deserialize, Serialize};

use crate::{
    error::{Result, SubTreeError},
    model::{Node, NodeId, NodePatch},
};

/// Editable fields of the selected node, as text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailForm {
    pub name: String,
    pub kind: String,
    pub vehicle: String,
    pub material: String,
    pub qty: String,
}

impl DetailForm {
    pub fn from_node(node: &Node) -> Self {
        DetailForm {
            name: node.name.clone(),
            kind: node.kind.clone(),
            vehicle: node.vehicle.clone().unwrap_or_default(),
            material: node.material.clone().unwrap_or_default(),
            qty: node.qty.map(|q| q.to_string()).unwrap_or_default(),
        }
    }

    /// Convert the form into a patch carrying every editable field.
    ///
    /// Empty `vehicle`, `material` and `qty` become null. A quantity that is not a finite number
    /// is rejected.
    pub fn parse(&self) -> Result<NodePatch> {
        Ok(NodePatch::full(
            self.name.clone(),
            self.kind.clone(),
            optional_text(&self.vehicle),
            optional_text(&self.material),
            parse_qty(&self.qty)?,
        ))
    }
}

fn optional_text(raw: &str) -> Option<String> {
    if raw.trim().is_empty() {
        None
    } else {
        Some(raw.to_string())
    }
}

/// Empty input is "no quantity"; anything else must parse as a finite number.
pub fn parse_qty(raw: &str) -> Result<Option<f64>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    match raw.parse::<f64>() {
        Ok(qty) if qty.is_finite() => Ok(Some(qty)),
        _ => Err(SubTreeError::InvalidInput(format!(
            "quantity must be a number, got '{raw}'"
        ))),
    }
}

/// What the detail panel shows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetailView {
    #[default]
    Empty,
    Node { id: NodeId, form: DetailForm },
}

impl DetailView {
    pub fn for_node(node: Option<&Node>) -> Self {
        match node {
            Some(node) => DetailView::Node {
                id: node.id.clone(),
                form: DetailForm::from_node(node),
            },
            None => DetailView::Empty,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, DetailView::Empty)
    }
}
