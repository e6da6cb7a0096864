//! Upload ingestion boundary.
//!
//! Turning an uploaded source file into a [`Tree`] is delegated to a [`TreeIngestor`]. The
//! bundled [`JsonTreeIngestor`] accepts a serialized [`Tree`]; spreadsheet parsing lives outside
//! this crate and plugs in through the same trait.

use std::collections::BTreeSet;

use crate::{
    error::{Result, SubTreeError},
    model::Tree,
};

pub trait TreeIngestor: Send + Sync {
    fn ingest(&self, filename: &str, bytes: &[u8]) -> Result<Tree>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonTreeIngestor;

impl TreeIngestor for JsonTreeIngestor {
    fn ingest(&self, filename: &str, bytes: &[u8]) -> Result<Tree> {
        let mut tree: Tree = serde_json::from_slice(bytes).map_err(|e| {
            SubTreeError::InvalidInput(format!("could not parse upload '{filename}': {e}"))
        })?;
        tree.sub_name = tree.sub_name.trim().to_string();
        if tree.sub_name.is_empty() {
            return Err(SubTreeError::InvalidInput(format!(
                "upload '{filename}' does not name a SUB"
            )));
        }
        let mut seen = BTreeSet::new();
        if let Some(dup) = tree.nodes.iter().find(|n| !seen.insert(&n.id)) {
            return Err(SubTreeError::InvalidInput(format!(
                "upload '{filename}' repeats node id '{}'",
                dup.id
            )));
        }
        tracing::debug!(
            "[JsonTreeIngestor] {} -> '{}' ({} nodes)",
            filename,
            tree.sub_name,
            tree.nodes.len()
        );
        Ok(tree)
    }
}
