//! Walk-scoped visited map

use crate::content::ContentKey;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Nodes claimed during a walk.
///
/// The first claimant of a key runs the node; later claimants get the
/// same cell and wait on it, so a parent never completes before a
/// shared child does.
#[derive(Debug, Default)]
pub(crate) struct VisitedSet {
    nodes: DashMap<ContentKey, Arc<OnceCell<()>>>,
}

impl VisitedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cell for `key`, inserted if absent
    pub fn claim(&self, key: ContentKey) -> Arc<OnceCell<()>> {
        Arc::clone(self.nodes.entry(key).or_default().value())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }
}
