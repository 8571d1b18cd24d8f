//! Storage targets
//!
//! A target is a capability set over a storage endpoint. Every target
//! supports [`Storage`]; [`Target`] adds references, and the optional
//! capabilities (reference fetch, mount, predecessor lookup, delete) are
//! exposed through `as_*` accessors that return `None` when unsupported.
//! Callers snapshot them once with [`Capabilities::of`].

mod file;
pub(crate) mod graph;
mod layout;
mod memory;
mod readonly;
pub mod reference;
mod union;

pub use file::FileStore;
pub use layout::{BlobUsage, OciLayout};
pub use memory::{MemoryRegistry, MemoryRepository, MemoryStore};
pub use readonly::ReadOnly;
pub use reference::{LayoutReference, Reference};
pub use union::UnionStorage;

use crate::content::{BlobReader, Descriptor};
use crate::error::OrcaResult;
use async_trait::async_trait;
use std::fmt;

/// Content-addressed blob storage
#[async_trait]
pub trait Storage: Send + Sync {
    /// Check whether the content exists
    async fn exists(&self, desc: &Descriptor) -> OrcaResult<bool>;

    /// Open a stream over the content
    async fn fetch(&self, desc: &Descriptor) -> OrcaResult<BlobReader>;

    /// Store content, verifying it against `desc` while draining `content`.
    ///
    /// Pushing content that already exists succeeds without rewriting it.
    async fn push(&self, desc: &Descriptor, content: BlobReader) -> OrcaResult<()>;
}

/// Where a remote repository lives, for mount decisions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryLocation {
    pub registry: String,
    pub repository: String,
}

impl fmt::Display for RepositoryLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.registry, self.repository)
    }
}

/// Storage with references (tags)
#[async_trait]
pub trait Target: Storage {
    /// Resolve a tag or digest string to a descriptor
    async fn resolve(&self, reference: &str) -> OrcaResult<Descriptor>;

    /// Point `reference` at `desc`
    async fn tag(&self, desc: &Descriptor, reference: &str) -> OrcaResult<()>;

    /// Human-readable name for logs and progress output
    fn name(&self) -> String;

    /// Repository location, if this target is a registry repository
    fn location(&self) -> Option<RepositoryLocation> {
        None
    }

    fn as_reference_fetcher(&self) -> Option<&dyn ReferenceFetcher> {
        None
    }

    fn as_mounter(&self) -> Option<&dyn Mounter> {
        None
    }

    fn as_predecessor_finder(&self) -> Option<&dyn PredecessorFinder> {
        None
    }

    fn as_deleter(&self) -> Option<&dyn Deleter> {
        None
    }
}

/// Atomic resolve + fetch
#[async_trait]
pub trait ReferenceFetcher: Send + Sync {
    async fn fetch_reference(&self, reference: &str) -> OrcaResult<(Descriptor, BlobReader)>;
}

/// Cross-repository blob mount
#[async_trait]
pub trait Mounter: Send + Sync {
    /// Make `desc` available in this repository by mounting it from
    /// `from_repository` in the same registry, without uploading it.
    async fn mount(&self, desc: &Descriptor, from_repository: &str) -> OrcaResult<()>;
}

/// Reverse-edge (referrers) lookup
#[async_trait]
pub trait PredecessorFinder: Send + Sync {
    /// Manifests that list `desc` as a successor or subject
    async fn predecessors(&self, desc: &Descriptor) -> OrcaResult<Vec<Descriptor>>;
}

/// Content removal
#[async_trait]
pub trait Deleter: Send + Sync {
    async fn delete(&self, desc: &Descriptor) -> OrcaResult<()>;
}

/// Snapshot of the optional capabilities a target declares
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub reference_fetch: bool,
    pub mount: bool,
    pub predecessors: bool,
    pub delete: bool,
}

impl Capabilities {
    pub fn of(target: &dyn Target) -> Self {
        Self {
            reference_fetch: target.as_reference_fetcher().is_some(),
            mount: target.as_mounter().is_some(),
            predecessors: target.as_predecessor_finder().is_some(),
            delete: target.as_deleter().is_some(),
        }
    }
}

/// Resolve and fetch in one step, using the atomic capability when present
pub async fn fetch_reference(
    target: &dyn Target,
    reference: &str,
) -> OrcaResult<(Descriptor, BlobReader)> {
    if let Some(fetcher) = target.as_reference_fetcher() {
        return fetcher.fetch_reference(reference).await;
    }
    let desc = target.resolve(reference).await?;
    let reader = target.fetch(&desc).await?;
    Ok((desc, reader))
}
