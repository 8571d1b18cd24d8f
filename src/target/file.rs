//! Named-file store
//!
//! Titled blobs are materialized as files under a working directory,
//! named by their title annotation. Everything else (manifests, untitled
//! blobs) is held in memory so a pulled artifact can still be resolved
//! and tagged.

use crate::content::{BlobReader, Descriptor, Digest, VerifyReader};
use crate::error::{from_io, OrcaError, OrcaResult};
use crate::target::memory::MemoryStore;
use crate::target::{PredecessorFinder, Storage, Target};
use async_trait::async_trait;
use dashmap::DashMap;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

/// Target that writes titled blobs to files
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    files: DashMap<String, Digest>,
    memory: MemoryStore,
}

impl FileStore {
    pub async fn open(dir: impl Into<PathBuf>) -> OrcaResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| OrcaError::io(format!("creating {}", dir.display()), e))?;
        Ok(Self {
            dir,
            files: DashMap::new(),
            memory: MemoryStore::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Files written so far, relative to the store directory
    pub fn written(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = self.files.iter().map(|e| PathBuf::from(e.key())).collect();
        files.sort();
        files
    }

    /// Map a title to a path inside the store directory
    fn file_path(&self, title: &str) -> OrcaResult<PathBuf> {
        let relative = Path::new(title);
        let escapes = relative.components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if escapes || relative.components().next().is_none() {
            return Err(OrcaError::PathInvalid {
                path: relative.to_path_buf(),
                reason: "title must name a path inside the output directory".to_string(),
            });
        }
        Ok(self.dir.join(relative))
    }

    fn titled_blob<'a>(&self, desc: &'a Descriptor) -> Option<&'a str> {
        if desc.is_manifest() {
            None
        } else {
            desc.title()
        }
    }

    async fn write_file(&self, title: &str, desc: &Descriptor, content: BlobReader) -> OrcaResult<()> {
        let path = self.file_path(title)?;
        let parent = path.parent().unwrap_or(&self.dir).to_path_buf();
        fs::create_dir_all(&parent)
            .await
            .map_err(|e| OrcaError::io(format!("creating {}", parent.display()), e))?;

        let tmp = parent.join(format!(".{}.part", Uuid::new_v4()));
        let result = async {
            let mut file = fs::File::create(&tmp)
                .await
                .map_err(|e| OrcaError::io(format!("creating {}", tmp.display()), e))?;
            let mut verified = VerifyReader::new(content, desc);
            tokio::io::copy(&mut verified, &mut file)
                .await
                .map_err(|e| from_io(format!("writing {}", title), e))?;
            file.flush()
                .await
                .map_err(|e| OrcaError::io(format!("flushing {}", title), e))?;
            fs::rename(&tmp, &path)
                .await
                .map_err(|e| OrcaError::io(format!("writing {}", path.display()), e))
        }
        .await;

        if result.is_err() {
            let _ = fs::remove_file(&tmp).await;
        }
        result
    }
}

#[async_trait]
impl Storage for FileStore {
    async fn exists(&self, desc: &Descriptor) -> OrcaResult<bool> {
        match self.titled_blob(desc) {
            Some(title) => Ok(self
                .files
                .get(title)
                .is_some_and(|digest| *digest == desc.digest)),
            None => self.memory.exists(desc).await,
        }
    }

    async fn fetch(&self, desc: &Descriptor) -> OrcaResult<BlobReader> {
        let title = self
            .titled_blob(desc)
            .map(str::to_string)
            .or_else(|| {
                self.files
                    .iter()
                    .find(|e| *e.value() == desc.digest)
                    .map(|e| e.key().clone())
            });
        let Some(title) = title else {
            return self.memory.fetch(desc).await;
        };
        let path = self.file_path(&title)?;
        match fs::File::open(&path).await {
            Ok(file) => Ok(Box::pin(file)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(OrcaError::not_found(&desc.digest)),
            Err(e) => Err(OrcaError::io(format!("opening {}", path.display()), e)),
        }
    }

    async fn push(&self, desc: &Descriptor, content: BlobReader) -> OrcaResult<()> {
        let Some(title) = self.titled_blob(desc) else {
            return self.memory.push(desc, content).await;
        };
        self.write_file(title, desc, content).await?;
        self.files.insert(title.to_string(), desc.digest.clone());
        debug!(file = title, digest = %desc.digest, "Wrote file");
        Ok(())
    }
}

#[async_trait]
impl Target for FileStore {
    async fn resolve(&self, reference: &str) -> OrcaResult<Descriptor> {
        self.memory.resolve(reference).await
    }

    async fn tag(&self, desc: &Descriptor, reference: &str) -> OrcaResult<()> {
        self.memory.tag(desc, reference).await
    }

    fn name(&self) -> String {
        self.dir.display().to_string()
    }

    fn as_predecessor_finder(&self) -> Option<&dyn PredecessorFinder> {
        self.memory.as_predecessor_finder()
    }
}
