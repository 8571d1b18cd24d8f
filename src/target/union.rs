//! Ordered union of storages

use crate::content::{BlobReader, Descriptor};
use crate::error::{OrcaError, OrcaResult};
use crate::target::Storage;
use async_trait::async_trait;
use std::sync::Arc;

/// Reads consult members in order; writes go to the first member
pub struct UnionStorage {
    members: Vec<Arc<dyn Storage>>,
}

impl UnionStorage {
    pub fn new(members: Vec<Arc<dyn Storage>>) -> OrcaResult<Self> {
        if members.is_empty() {
            return Err(OrcaError::Internal(
                "union storage needs at least one member".to_string(),
            ));
        }
        Ok(Self { members })
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[async_trait]
impl Storage for UnionStorage {
    async fn exists(&self, desc: &Descriptor) -> OrcaResult<bool> {
        for member in &self.members {
            if member.exists(desc).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn fetch(&self, desc: &Descriptor) -> OrcaResult<BlobReader> {
        for member in &self.members {
            match member.fetch(desc).await {
                Ok(reader) => return Ok(reader),
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
        }
        Err(OrcaError::not_found(&desc.digest))
    }

    async fn push(&self, desc: &Descriptor, content: BlobReader) -> OrcaResult<()> {
        self.members[0].push(desc, content).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{bytes_reader, read_all};
    use crate::target::MemoryStore;
    use bytes::Bytes;

    #[tokio::test]
    async fn reads_fall_through_and_writes_hit_first() {
        let first = Arc::new(MemoryStore::new());
        let second = Arc::new(MemoryStore::new());
        let shared = Descriptor::from_bytes("text/plain", b"shared");
        second.put(&shared, Bytes::from_static(b"shared")).unwrap();

        let union = UnionStorage::new(vec![
            first.clone() as Arc<dyn Storage>,
            second.clone() as Arc<dyn Storage>,
        ]).unwrap();
        assert!(union.exists(&shared).await.unwrap());
        let content = read_all(union.fetch(&shared).await.unwrap(), &shared)
            .await
            .unwrap();
        assert_eq!(&content[..], b"shared");

        let fresh = Descriptor::from_bytes("text/plain", b"fresh");
        union
            .push(&fresh, bytes_reader(Bytes::from_static(b"fresh")))
            .await
            .unwrap();
        assert!(first.exists(&fresh).await.unwrap());
        assert!(!second.exists(&fresh).await.unwrap());
    }

    #[test]
    fn empty_union_is_rejected() {
        assert!(UnionStorage::new(Vec::new()).is_err());
    }
}
