//! Selection Controller: the single "currently selected" node id.
//!
//! The controller stores an id, not a node, and never migrates a stale id into a new tree. Callers
//! drive the highlight and detail refresh after every change (see [`crate::app::App`]).

use crate::model::{NodeId, Tree};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    current: Option<NodeId>,
}

impl Selection {
    pub fn current(&self) -> Option<&NodeId> {
        self.current.as_ref()
    }

    /// Returns true when the selection actually changed.
    pub fn select(&mut self, id: NodeId) -> bool {
        if self.current.as_ref() == Some(&id) {
            return false;
        }
        tracing::debug!("[Selection] select {}", id);
        self.current = Some(id);
        true
    }

    /// Returns true when something was selected before.
    pub fn clear(&mut self) -> bool {
        let had = self.current.take();
        if let Some(id) = &had {
            tracing::debug!("[Selection] clear (was {})", id);
        }
        had.is_some()
    }

    /// The selected id, only if it names a node in `tree`.
    pub fn resolve<'a>(&self, tree: Option<&'a Tree>) -> Option<&'a NodeId> {
        let id = self.current.as_ref()?;
        tree?.get(id).map(|node| &node.id)
    }
}
