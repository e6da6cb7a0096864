use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use crate::model::NodeId;

/// Indicates where the tree that replaced client state came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum EventOrigin {
    /// Speculative edit applied in memory only. Lost on reload.
    Local,

    /// Tree delivered by the server (fetch, upload, or persisted edit). Authoritative.
    #[default]
    Remote,
}

/// Notifications emitted by [`crate::app::App`] for whatever presents the UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UiEvent {
    /// The active tree was replaced and re-rendered.
    TreeReplaced { sub_name: String, origin: EventOrigin },
    /// Selection changed; highlight and detail panel were refreshed.
    SelectionChanged(Option<NodeId>),
    /// Detail panel contents were rebuilt from the selected node.
    DetailRefreshed,
    /// A render was committed and awaits the connector geometry pass.
    GeometryPending,
    /// Status caption, e.g. while a tree is loading or after a non-fatal failure.
    Caption(String),
    /// A failure the user must acknowledge (persisted apply, upload).
    Alert(String),
    /// A response arrived for a dataset that is no longer active and was dropped.
    StaleDiscarded { sub_name: String },
}

impl Display for UiEvent {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            UiEvent::TreeReplaced { sub_name, origin } => {
                write!(f, "TreeReplaced({sub_name}, {origin:?})")
            }
            UiEvent::SelectionChanged(Some(id)) => write!(f, "SelectionChanged({id})"),
            UiEvent::SelectionChanged(None) => write!(f, "SelectionChanged(none)"),
            UiEvent::DetailRefreshed => write!(f, "DetailRefreshed"),
            UiEvent::GeometryPending => write!(f, "GeometryPending"),
            UiEvent::Caption(text) => write!(f, "Caption({text})"),
            UiEvent::Alert(text) => write!(f, "Alert({text})"),
            UiEvent::StaleDiscarded { sub_name } => write!(f, "StaleDiscarded({sub_name})"),
        }
    }
}
