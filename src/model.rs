//! Wire and in-memory data model for SUB trees.
//!
//! A [`Tree`] is the unit of load and replace. Nodes reference their parent by [`NodeId`] only;
//! the parent/child structure is derived on demand by [`crate::hierarchy`].

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::{
    cmp::Ordering,
    collections::BTreeMap,
    fmt::{self, Display, Formatter},
    hash::{Hash, Hasher},
};

/// The `type` value marking an assembly node.
pub const ASSEMBLY_TYPE: &str = "ASSY";

/// Node identifier.
///
/// Datasets may carry numeric or string ids. Identity is always the normalized string form so that
/// `1` and `"1"` name the same node; the numeric flag only controls how the id is written back out.
#[derive(Debug, Clone)]
pub struct NodeId {
    raw: String,
    numeric: bool,
}

impl NodeId {
    pub fn new(raw: impl Into<String>) -> Self {
        NodeId {
            raw: raw.into(),
            numeric: false,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl PartialEq for NodeId {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for NodeId {}

impl Hash for NodeId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state)
    }
}

impl PartialOrd for NodeId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NodeId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.raw.cmp(&other.raw)
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl From<&str> for NodeId {
    fn from(raw: &str) -> Self {
        NodeId::new(raw)
    }
}

impl From<String> for NodeId {
    fn from(raw: String) -> Self {
        NodeId::new(raw)
    }
}

impl From<i64> for NodeId {
    fn from(n: i64) -> Self {
        NodeId {
            raw: n.to_string(),
            numeric: true,
        }
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.numeric {
            if let Ok(n) = self.raw.parse::<i64>() {
                return serializer.serialize_i64(n);
            }
        }
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::String(s) => Ok(NodeId::new(s)),
            Value::Number(n) => {
                let raw = match (n.as_i64(), n.as_u64()) {
                    (Some(i), _) => i.to_string(),
                    (None, Some(u)) => u.to_string(),
                    _ => n.to_string(),
                };
                Ok(NodeId { raw, numeric: true })
            }
            other => Err(de::Error::custom(format!(
                "node id must be a string or number, found {other}"
            ))),
        }
    }
}

/// One item of a SUB tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    #[serde(default)]
    pub parent_id: Option<NodeId>,
    #[serde(default)]
    pub order: i64,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub vehicle: Option<String>,
    #[serde(default)]
    pub material: Option<String>,
    #[serde(default)]
    pub qty: Option<f64>,
    /// Fields this crate does not interpret, kept so that a round trip through the server is lossless.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Node {
    pub fn new(id: impl Into<NodeId>, parent_id: Option<NodeId>, order: i64, name: &str) -> Self {
        Node {
            id: id.into(),
            parent_id,
            order,
            name: name.to_string(),
            kind: String::new(),
            vehicle: None,
            material: None,
            qty: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn is_assembly(&self) -> bool {
        self.kind == ASSEMBLY_TYPE
    }
}

/// A named dataset: the unit of load and replace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub sub_name: String,
    #[serde(default)]
    pub nodes: Vec<Node>,
}

impl Tree {
    pub fn new(sub_name: impl Into<String>, nodes: Vec<Node>) -> Self {
        Tree {
            sub_name: sub_name.into(),
            nodes,
        }
    }

    pub fn get(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    pub fn get_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| &n.id == id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.get(id).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Partial field set for a node edit.
///
/// Outer `None` means "leave unchanged". For the nullable fields an inner `None` clears the value,
/// which on the wire is an explicit `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub vehicle: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub material: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub qty: Option<Option<f64>>,
}

/// Maps a present field (including an explicit `null`) to `Some`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl NodePatch {
    /// A patch carrying every editable field, as sent by a persisted apply.
    pub fn full(
        name: String,
        kind: String,
        vehicle: Option<String>,
        material: Option<String>,
        qty: Option<f64>,
    ) -> Self {
        NodePatch {
            name: Some(name),
            kind: Some(kind),
            vehicle: Some(vehicle),
            material: Some(material),
            qty: Some(qty),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.kind.is_none()
            && self.vehicle.is_none()
            && self.material.is_none()
            && self.qty.is_none()
    }

    pub fn apply(&self, node: &mut Node) {
        if let Some(name) = &self.name {
            node.name = name.clone();
        }
        if let Some(kind) = &self.kind {
            node.kind = kind.clone();
        }
        if let Some(vehicle) = &self.vehicle {
            node.vehicle = vehicle.clone();
        }
        if let Some(material) = &self.material {
            node.material = material.clone();
        }
        if let Some(qty) = self.qty {
            node.qty = qty;
        }
    }
}

/// Server-held session: which dataset and node are active.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(default)]
    pub sub_name: Option<String>,
    #[serde(default)]
    pub selected_id: Option<NodeId>,
}

impl SessionState {
    pub fn new(sub_name: Option<String>, selected_id: Option<NodeId>) -> Self {
        SessionState {
            sub_name,
            selected_id,
        }
    }
}

/// Informational listing entry for a stored dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub sub_name: String,
    pub node_count: usize,
}
