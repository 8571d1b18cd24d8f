//! Write-through caching proxy

use crate::cache::tee::TeeReader;
use crate::content::{BlobReader, Descriptor};
use crate::error::OrcaResult;
use crate::target::{
    Deleter, Mounter, PredecessorFinder, ReferenceFetcher, RepositoryLocation, Storage, Target,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::trace;

/// A target whose reads are served from a cache when possible.
///
/// Cache misses stream from the origin while a background task writes
/// the same bytes into the cache. Writes, tags and resolution always go
/// to the origin.
pub struct CachedTarget {
    origin: Arc<dyn Target>,
    cache: Arc<dyn Storage>,
}

impl CachedTarget {
    pub fn new(origin: Arc<dyn Target>, cache: Arc<dyn Storage>) -> Self {
        Self { origin, cache }
    }

    pub fn origin(&self) -> &Arc<dyn Target> {
        &self.origin
    }

    fn tee(&self, origin: BlobReader, desc: &Descriptor) -> BlobReader {
        Box::pin(TeeReader::spawn(origin, desc, Arc::clone(&self.cache)))
    }

    async fn cached(&self, desc: &Descriptor) -> OrcaResult<Option<BlobReader>> {
        if !self.cache.exists(desc).await? {
            return Ok(None);
        }
        match self.cache.fetch(desc).await {
            Ok(reader) => {
                trace!(digest = %desc.digest, "Cache hit");
                Ok(Some(reader))
            }
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl Storage for CachedTarget {
    async fn exists(&self, desc: &Descriptor) -> OrcaResult<bool> {
        if self.cache.exists(desc).await? {
            return Ok(true);
        }
        self.origin.exists(desc).await
    }

    async fn fetch(&self, desc: &Descriptor) -> OrcaResult<BlobReader> {
        if let Some(reader) = self.cached(desc).await? {
            return Ok(reader);
        }
        trace!(digest = %desc.digest, "Cache miss");
        let origin = self.origin.fetch(desc).await?;
        Ok(self.tee(origin, desc))
    }

    async fn push(&self, desc: &Descriptor, content: BlobReader) -> OrcaResult<()> {
        self.origin.push(desc, content).await
    }
}

#[async_trait]
impl Target for CachedTarget {
    async fn resolve(&self, reference: &str) -> OrcaResult<Descriptor> {
        self.origin.resolve(reference).await
    }

    async fn tag(&self, desc: &Descriptor, reference: &str) -> OrcaResult<()> {
        self.origin.tag(desc, reference).await
    }

    fn name(&self) -> String {
        self.origin.name()
    }

    fn location(&self) -> Option<RepositoryLocation> {
        self.origin.location()
    }

    fn as_reference_fetcher(&self) -> Option<&dyn ReferenceFetcher> {
        Some(self)
    }

    fn as_mounter(&self) -> Option<&dyn Mounter> {
        self.origin.as_mounter()
    }

    fn as_predecessor_finder(&self) -> Option<&dyn PredecessorFinder> {
        self.origin.as_predecessor_finder()
    }

    fn as_deleter(&self) -> Option<&dyn Deleter> {
        self.origin.as_deleter()
    }
}

#[async_trait]
impl ReferenceFetcher for CachedTarget {
    /// Tags are mutable, so the reference is always resolved at the origin
    async fn fetch_reference(&self, reference: &str) -> OrcaResult<(Descriptor, BlobReader)> {
        if let Some(fetcher) = self.origin.as_reference_fetcher() {
            let (desc, origin) = fetcher.fetch_reference(reference).await?;
            if let Some(reader) = self.cached(&desc).await? {
                return Ok((desc, reader));
            }
            let reader = self.tee(origin, &desc);
            return Ok((desc, reader));
        }

        let desc = self.origin.resolve(reference).await?;
        let reader = self.fetch(&desc).await?;
        Ok((desc, reader))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{bytes_reader, read_all};
    use crate::error::{from_io, OrcaError};
    use crate::target::MemoryStore;
    use bytes::Bytes;
    use tokio::io::AsyncReadExt;

    fn setup(content: &[u8]) -> (Arc<MemoryStore>, Arc<MemoryStore>, CachedTarget, Descriptor) {
        let origin = Arc::new(MemoryStore::new());
        let cache = Arc::new(MemoryStore::new());
        let desc = Descriptor::from_bytes("application/octet-stream", content);
        origin.put(&desc, Bytes::copy_from_slice(content)).unwrap();
        let proxy = CachedTarget::new(origin.clone(), cache.clone());
        (origin, cache, proxy, desc)
    }

    #[tokio::test]
    async fn second_fetch_is_served_from_cache() {
        let (origin, cache, proxy, desc) = setup(b"cached content");

        let first = read_all(proxy.fetch(&desc).await.unwrap(), &desc).await.unwrap();
        assert_eq!(&first[..], b"cached content");
        assert!(cache.exists(&desc).await.unwrap());
        assert_eq!(origin.fetch_count(), 1);

        // Poison the origin: the cached copy must be used
        origin.delete(&desc).await.unwrap();
        let second = read_all(proxy.fetch(&desc).await.unwrap(), &desc).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(origin.fetch_count(), 1);
    }

    #[tokio::test]
    async fn exists_does_not_populate() {
        let (_origin, cache, proxy, desc) = setup(b"x");
        assert!(proxy.exists(&desc).await.unwrap());
        assert!(!cache.exists(&desc).await.unwrap());
    }

    #[tokio::test]
    async fn push_goes_to_origin_only() {
        let origin = Arc::new(MemoryStore::new());
        let cache = Arc::new(MemoryStore::new());
        let proxy = CachedTarget::new(origin.clone(), cache.clone());
        let desc = Descriptor::from_bytes("text/plain", b"new");

        proxy
            .push(&desc, bytes_reader(Bytes::from_static(b"new")))
            .await
            .unwrap();
        assert!(origin.exists(&desc).await.unwrap());
        assert!(!cache.exists(&desc).await.unwrap());
    }

    #[tokio::test]
    async fn fetch_reference_follows_moved_tag() {
        let (origin, _cache, proxy, old) = setup(b"old");
        origin.tag(&old, "latest").await.unwrap();
        let (desc, reader) = proxy.fetch_reference("latest").await.unwrap();
        read_all(reader, &desc).await.unwrap();

        let new = Descriptor::from_bytes("application/octet-stream", b"new");
        origin.put(&new, Bytes::from_static(b"new")).unwrap();
        origin.tag(&new, "latest").await.unwrap();

        let (desc, reader) = proxy.fetch_reference("latest").await.unwrap();
        assert_eq!(desc.digest, new.digest);
        assert_eq!(&read_all(reader, &desc).await.unwrap()[..], b"new");
    }

    #[tokio::test]
    async fn dropped_reader_leaves_no_cache_entry() {
        let content = vec![7u8; 64 * 1024];
        let (_origin, cache, proxy, desc) = setup(&content);

        let mut reader = proxy.fetch(&desc).await.unwrap();
        let mut head = [0u8; 10];
        reader.read_exact(&mut head).await.unwrap();
        drop(reader);

        for _ in 0..100 {
            tokio::task::yield_now().await;
        }
        assert!(!cache.exists(&desc).await.unwrap());
    }

    /// Cache that accepts the stream and then refuses to commit it
    struct FailingCache;

    #[async_trait]
    impl Storage for FailingCache {
        async fn exists(&self, _desc: &Descriptor) -> OrcaResult<bool> {
            Ok(false)
        }

        async fn fetch(&self, desc: &Descriptor) -> OrcaResult<BlobReader> {
            Err(OrcaError::not_found(&desc.digest))
        }

        async fn push(&self, desc: &Descriptor, content: BlobReader) -> OrcaResult<()> {
            read_all(content, desc).await?;
            Err(OrcaError::Internal("disk full".to_string()))
        }
    }

    #[tokio::test]
    async fn cache_failure_surfaces_at_end_of_stream() {
        let origin = Arc::new(MemoryStore::new());
        let desc = Descriptor::from_bytes("application/octet-stream", b"payload");
        origin.put(&desc, Bytes::from_static(b"payload")).unwrap();
        let proxy = CachedTarget::new(origin, Arc::new(FailingCache));

        let mut reader = proxy.fetch(&desc).await.unwrap();
        let mut delivered = Vec::new();
        let err = reader.read_to_end(&mut delivered).await.unwrap_err();

        assert_eq!(delivered, b"payload");
        let err = from_io("reading", err);
        assert!(matches!(err, OrcaError::CacheWrite { .. }));
    }
}
