//! Read-only view of a target

use crate::content::{BlobReader, Descriptor};
use crate::error::{OrcaError, OrcaResult};
use crate::target::{PredecessorFinder, ReferenceFetcher, RepositoryLocation, Storage, Target};
use async_trait::async_trait;

/// Forwards reads to the wrapped target and rejects every write
#[derive(Debug)]
pub struct ReadOnly<T> {
    inner: T,
}

impl<T: Target> ReadOnly<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

#[async_trait]
impl<T: Target> Storage for ReadOnly<T> {
    async fn exists(&self, desc: &Descriptor) -> OrcaResult<bool> {
        self.inner.exists(desc).await
    }

    async fn fetch(&self, desc: &Descriptor) -> OrcaResult<BlobReader> {
        self.inner.fetch(desc).await
    }

    async fn push(&self, _desc: &Descriptor, _content: BlobReader) -> OrcaResult<()> {
        Err(OrcaError::ReadOnly("push"))
    }
}

#[async_trait]
impl<T: Target> Target for ReadOnly<T> {
    async fn resolve(&self, reference: &str) -> OrcaResult<Descriptor> {
        self.inner.resolve(reference).await
    }

    async fn tag(&self, _desc: &Descriptor, _reference: &str) -> OrcaResult<()> {
        Err(OrcaError::ReadOnly("tag"))
    }

    fn name(&self) -> String {
        format!("{} (read-only)", self.inner.name())
    }

    fn location(&self) -> Option<RepositoryLocation> {
        self.inner.location()
    }

    fn as_reference_fetcher(&self) -> Option<&dyn ReferenceFetcher> {
        self.inner.as_reference_fetcher()
    }

    fn as_predecessor_finder(&self) -> Option<&dyn PredecessorFinder> {
        self.inner.as_predecessor_finder()
    }
}
