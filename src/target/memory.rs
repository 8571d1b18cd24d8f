//! In-memory targets
//!
//! [`MemoryStore`] holds content, tags and a predecessor index in
//! concurrent maps. [`MemoryRegistry`] groups named repositories that can
//! mount blobs from each other, the way a registry does.

use crate::content::{bytes_reader, read_all, BlobReader, Descriptor, Digest};
use crate::error::{OrcaError, OrcaResult};
use crate::target::graph::PredecessorIndex;
use crate::target::{
    Deleter, Mounter, PredecessorFinder, ReferenceFetcher, RepositoryLocation, Storage, Target,
};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Content and tags held in memory
#[derive(Debug)]
pub struct MemoryStore {
    blobs: DashMap<Digest, (Descriptor, Bytes)>,
    tags: DashMap<String, Descriptor>,
    graph: PredecessorIndex,
    referrers_api: bool,
    fetches: AtomicUsize,
    push_log: Mutex<Vec<Descriptor>>,
    tag_log: Mutex<Vec<String>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            blobs: DashMap::new(),
            tags: DashMap::new(),
            graph: PredecessorIndex::default(),
            referrers_api: true,
            fetches: AtomicUsize::new(0),
            push_log: Mutex::new(Vec::new()),
            tag_log: Mutex::new(Vec::new()),
        }
    }

    /// A store that answers no referrers queries, like a registry
    /// without the referrers API. Referrers must then travel through the
    /// tag-scheme index.
    pub fn without_referrers_api() -> Self {
        Self {
            referrers_api: false,
            ..Self::new()
        }
    }

    /// Insert verified content directly, bypassing the push counters
    pub fn put(&self, desc: &Descriptor, content: Bytes) -> OrcaResult<()> {
        if content.len() as u64 != desc.size {
            return Err(OrcaError::SizeMismatch {
                digest: desc.digest.to_string(),
                expected: desc.size,
                actual: content.len() as u64,
            });
        }
        let actual = desc.digest.recompute(&content);
        if actual != desc.digest {
            return Err(OrcaError::DigestMismatch {
                expected: desc.digest.to_string(),
                actual: actual.to_string(),
            });
        }
        self.graph.index(desc, &content)?;
        self.blobs
            .entry(desc.digest.clone())
            .or_insert_with(|| (desc.plain(), content));
        Ok(())
    }

    /// Raw content, if present
    pub fn get(&self, digest: &Digest) -> Option<Bytes> {
        self.blobs.get(digest).map(|entry| entry.1.clone())
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// All tags currently defined
    pub fn tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.tags.iter().map(|e| e.key().clone()).collect();
        tags.sort();
        tags
    }

    /// Number of `fetch` calls served or attempted
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Descriptors passed to `push`, in call order
    pub fn push_log(&self) -> Vec<Descriptor> {
        self.push_log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    /// References passed to `tag`, in call order
    pub fn tag_log(&self) -> Vec<String> {
        self.tag_log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    fn resolve_sync(&self, reference: &str) -> OrcaResult<Descriptor> {
        if let Ok(digest) = reference.parse::<Digest>() {
            return self
                .blobs
                .get(&digest)
                .map(|entry| entry.0.clone())
                .ok_or_else(|| OrcaError::not_found(reference));
        }
        self.tags
            .get(reference)
            .map(|entry| entry.clone())
            .ok_or_else(|| OrcaError::not_found(reference))
    }
}

#[async_trait]
impl Storage for MemoryStore {
    async fn exists(&self, desc: &Descriptor) -> OrcaResult<bool> {
        Ok(self.blobs.contains_key(&desc.digest))
    }

    async fn fetch(&self, desc: &Descriptor) -> OrcaResult<BlobReader> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.get(&desc.digest)
            .map(bytes_reader)
            .ok_or_else(|| OrcaError::not_found(&desc.digest))
    }

    async fn push(&self, desc: &Descriptor, content: BlobReader) -> OrcaResult<()> {
        if let Ok(mut log) = self.push_log.lock() {
            log.push(desc.clone());
        }
        if self.blobs.contains_key(&desc.digest) {
            return Ok(());
        }
        let content = read_all(content, desc).await?;
        self.put(desc, content)
    }
}

#[async_trait]
impl Target for MemoryStore {
    async fn resolve(&self, reference: &str) -> OrcaResult<Descriptor> {
        self.resolve_sync(reference)
    }

    async fn tag(&self, desc: &Descriptor, reference: &str) -> OrcaResult<()> {
        if let Ok(mut log) = self.tag_log.lock() {
            log.push(reference.to_string());
        }
        if !self.blobs.contains_key(&desc.digest) {
            return Err(OrcaError::not_found(&desc.digest));
        }
        self.tags.insert(reference.to_string(), desc.clone());
        Ok(())
    }

    fn name(&self) -> String {
        "memory".to_string()
    }

    fn as_reference_fetcher(&self) -> Option<&dyn ReferenceFetcher> {
        Some(self)
    }

    fn as_predecessor_finder(&self) -> Option<&dyn PredecessorFinder> {
        if self.referrers_api {
            Some(self)
        } else {
            None
        }
    }

    fn as_deleter(&self) -> Option<&dyn Deleter> {
        Some(self)
    }
}

#[async_trait]
impl ReferenceFetcher for MemoryStore {
    async fn fetch_reference(&self, reference: &str) -> OrcaResult<(Descriptor, BlobReader)> {
        let desc = self.resolve_sync(reference)?;
        let reader = self.fetch(&desc).await?;
        Ok((desc, reader))
    }
}

#[async_trait]
impl PredecessorFinder for MemoryStore {
    async fn predecessors(&self, desc: &Descriptor) -> OrcaResult<Vec<Descriptor>> {
        Ok(self.graph.predecessors(&desc.digest))
    }
}

#[async_trait]
impl Deleter for MemoryStore {
    async fn delete(&self, desc: &Descriptor) -> OrcaResult<()> {
        if self.blobs.remove(&desc.digest).is_none() {
            return Err(OrcaError::not_found(&desc.digest));
        }
        self.tags.retain(|_, tagged| tagged.digest != desc.digest);
        self.graph.remove(&desc.digest);
        debug!(digest = %desc.digest, "Deleted from memory store");
        Ok(())
    }
}

/// A set of in-memory repositories under one registry host
#[derive(Debug)]
pub struct MemoryRegistry {
    host: String,
    repositories: DashMap<String, Arc<MemoryStore>>,
    mounts: AtomicUsize,
}

impl MemoryRegistry {
    pub fn new(host: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            host: host.into(),
            repositories: DashMap::new(),
            mounts: AtomicUsize::new(0),
        })
    }

    /// Open (creating if needed) a repository
    pub fn repository(self: &Arc<Self>, name: &str) -> MemoryRepository {
        let store = self
            .repositories
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryStore::new()))
            .clone();
        MemoryRepository {
            registry: Arc::clone(self),
            name: name.to_string(),
            store,
        }
    }

    /// Number of successful cross-repository mounts
    pub fn mount_count(&self) -> usize {
        self.mounts.load(Ordering::SeqCst)
    }
}

/// One repository of a [`MemoryRegistry`]
#[derive(Debug, Clone)]
pub struct MemoryRepository {
    registry: Arc<MemoryRegistry>,
    name: String,
    store: Arc<MemoryStore>,
}

impl MemoryRepository {
    /// Backing store, for inspection
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }
}

#[async_trait]
impl Storage for MemoryRepository {
    async fn exists(&self, desc: &Descriptor) -> OrcaResult<bool> {
        self.store.exists(desc).await
    }

    async fn fetch(&self, desc: &Descriptor) -> OrcaResult<BlobReader> {
        self.store.fetch(desc).await
    }

    async fn push(&self, desc: &Descriptor, content: BlobReader) -> OrcaResult<()> {
        self.store.push(desc, content).await
    }
}

#[async_trait]
impl Target for MemoryRepository {
    async fn resolve(&self, reference: &str) -> OrcaResult<Descriptor> {
        self.store.resolve(reference).await
    }

    async fn tag(&self, desc: &Descriptor, reference: &str) -> OrcaResult<()> {
        self.store.tag(desc, reference).await
    }

    fn name(&self) -> String {
        format!("{}/{}", self.registry.host, self.name)
    }

    fn location(&self) -> Option<RepositoryLocation> {
        Some(RepositoryLocation {
            registry: self.registry.host.clone(),
            repository: self.name.clone(),
        })
    }

    fn as_reference_fetcher(&self) -> Option<&dyn ReferenceFetcher> {
        self.store.as_reference_fetcher()
    }

    fn as_mounter(&self) -> Option<&dyn Mounter> {
        Some(self)
    }

    fn as_predecessor_finder(&self) -> Option<&dyn PredecessorFinder> {
        self.store.as_predecessor_finder()
    }

    fn as_deleter(&self) -> Option<&dyn Deleter> {
        self.store.as_deleter()
    }
}

#[async_trait]
impl Mounter for MemoryRepository {
    async fn mount(&self, desc: &Descriptor, from_repository: &str) -> OrcaResult<()> {
        let source = self
            .registry
            .repositories
            .get(from_repository)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| OrcaError::not_found(format!("repository {}", from_repository)))?;
        let content = source
            .get(&desc.digest)
            .ok_or_else(|| OrcaError::not_found(&desc.digest))?;
        self.store.put(desc, content)?;
        self.registry.mounts.fetch_add(1, Ordering::SeqCst);
        debug!(digest = %desc.digest, from = from_repository, to = %self.name, "Mounted blob");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn push_then_fetch_roundtrip() {
        let store = MemoryStore::new();
        let desc = Descriptor::from_bytes("text/plain", b"content");
        store
            .push(&desc, bytes_reader(Bytes::from_static(b"content")))
            .await
            .unwrap();

        assert!(store.exists(&desc).await.unwrap());
        let fetched = read_all(store.fetch(&desc).await.unwrap(), &desc)
            .await
            .unwrap();
        assert_eq!(&fetched[..], b"content");
    }

    #[tokio::test]
    async fn push_rejects_corrupt_content() {
        let store = MemoryStore::new();
        let desc = Descriptor::from_bytes("text/plain", b"content");
        let err = store
            .push(&desc, bytes_reader(Bytes::from_static(b"CONTENT")))
            .await
            .unwrap_err();
        assert!(err.is_verification_failure());
        assert!(!store.exists(&desc).await.unwrap());
    }

    #[tokio::test]
    async fn tag_and_resolve() {
        let store = MemoryStore::new();
        let desc = Descriptor::from_bytes("text/plain", b"x");
        store.put(&desc, Bytes::from_static(b"x")).unwrap();

        assert!(store.resolve("v1").await.unwrap_err().is_not_found());
        store.tag(&desc, "v1").await.unwrap();
        assert_eq!(store.resolve("v1").await.unwrap().digest, desc.digest);
        assert_eq!(
            store.resolve(&desc.digest.to_string()).await.unwrap().digest,
            desc.digest
        );
    }

    #[tokio::test]
    async fn tag_missing_content_fails() {
        let store = MemoryStore::new();
        let desc = Descriptor::from_bytes("text/plain", b"x");
        assert!(store.tag(&desc, "v1").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn delete_removes_tags() {
        let store = MemoryStore::new();
        let desc = Descriptor::from_bytes("text/plain", b"x");
        store.put(&desc, Bytes::from_static(b"x")).unwrap();
        store.tag(&desc, "v1").await.unwrap();

        store.delete(&desc).await.unwrap();
        assert!(!store.exists(&desc).await.unwrap());
        assert!(store.tags().is_empty());
    }

    #[tokio::test]
    async fn mount_between_repositories() {
        let registry = MemoryRegistry::new("registry.local");
        let src = registry.repository("team/app");
        let dst = registry.repository("team/mirror");
        let desc = Descriptor::from_bytes("text/plain", b"layer");
        src.store().put(&desc, Bytes::from_static(b"layer")).unwrap();

        dst.as_mounter()
            .unwrap()
            .mount(&desc, "team/app")
            .await
            .unwrap();
        assert!(dst.exists(&desc).await.unwrap());
        assert_eq!(registry.mount_count(), 1);
        assert_eq!(dst.location().unwrap().to_string(), "registry.local/team/mirror");
    }

    #[tokio::test]
    async fn mount_from_unknown_repository_fails() {
        let registry = MemoryRegistry::new("registry.local");
        let dst = registry.repository("a");
        let desc = Descriptor::from_bytes("text/plain", b"layer");
        let err = dst.mount(&desc, "missing").await.unwrap_err();
        assert!(err.is_not_found());
    }
}
