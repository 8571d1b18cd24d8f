//! Graph-aware copy between targets
//!
//! [`copy_graph`] replicates a manifest and everything it references,
//! children before parents. [`extended_copy`] then keeps following
//! predecessors (signatures, SBOMs, indexes) until nothing new appears.
//! Both skip content the destination already holds and bound in-flight
//! I/O with a semaphore.

mod extended;
mod graph;
mod tags;
mod visited;

pub use extended::{extended_copy, ExtendedCopyOptions};
pub use graph::copy_graph;
pub use tags::tag_all;

use crate::content::Descriptor;
use crate::error::OrcaError;
use crate::referrers::ReferrersMode;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Default number of in-flight node operations
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Callbacks fired as nodes complete. All methods default to no-ops.
pub trait CopyObserver: Send + Sync {
    fn on_copied(&self, _desc: &Descriptor) {}

    fn on_mounted(&self, _desc: &Descriptor, _from_repository: &str) {}

    /// The destination already had the node
    fn on_skipped(&self, _desc: &Descriptor) {}

    /// Dry run: the node is missing at the destination
    fn on_would_copy(&self, _desc: &Descriptor) {}
}

/// Options for a graph copy
#[derive(Clone)]
pub struct CopyGraphOptions {
    /// Maximum in-flight fetch, push and mount operations (minimum 1)
    pub concurrency: usize,
    /// Extra repositories in the destination registry to mount blobs from
    pub mount_from: Vec<String>,
    pub observer: Option<Arc<dyn CopyObserver>>,
    pub cancel: CancellationToken,
    /// Report untitled leaf blobs as skipped instead of copying them
    pub prune_unnamed_leaves: bool,
    /// Walk and report without pushing anything
    pub dry_run: bool,
    /// How the destination records referrers
    pub referrers: ReferrersMode,
    /// Keep superseded referrers indexes instead of deleting them
    pub skip_gc: bool,
}

impl Default for CopyGraphOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            mount_from: Vec::new(),
            observer: None,
            cancel: CancellationToken::new(),
            prune_unnamed_leaves: false,
            dry_run: false,
            referrers: ReferrersMode::Auto,
            skip_gc: false,
        }
    }
}

impl fmt::Debug for CopyGraphOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CopyGraphOptions")
            .field("concurrency", &self.concurrency)
            .field("mount_from", &self.mount_from)
            .field("observer", &self.observer.is_some())
            .field("prune_unnamed_leaves", &self.prune_unnamed_leaves)
            .field("dry_run", &self.dry_run)
            .field("referrers", &self.referrers)
            .field("skip_gc", &self.skip_gc)
            .finish()
    }
}

/// Outcome of a copy
#[derive(Debug, Default)]
pub struct CopyReport {
    /// Root descriptor as resolved at the source
    pub root: Option<Descriptor>,
    pub copied: usize,
    pub mounted: usize,
    pub skipped: usize,
    pub would_copy: usize,
    /// Bytes pushed to the destination (mounts excluded)
    pub bytes_copied: u64,
    /// Soft failures; the copy itself succeeded
    pub warnings: Vec<OrcaError>,
}

impl CopyReport {
    /// Fold another report into this one, keeping this root
    pub fn merge(&mut self, other: CopyReport) {
        if self.root.is_none() {
            self.root = other.root;
        }
        self.copied += other.copied;
        self.mounted += other.mounted;
        self.skipped += other.skipped;
        self.would_copy += other.would_copy;
        self.bytes_copied += other.bytes_copied;
        self.warnings.extend(other.warnings);
    }
}
