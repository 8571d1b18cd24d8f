//! OCI image layout on the local filesystem
//!
//! ```text
//! <root>/oci-layout
//! <root>/index.json
//! <root>/blobs/<alg>/<encoded>
//! <root>/blobs/.ingest/<uuid>     (in-flight pushes)
//! ```
//!
//! Tags are `org.opencontainers.image.ref.name` annotations on the
//! entries of `index.json`. Pushed manifests are also recorded there
//! untagged, so the predecessor index can be rebuilt on open.

use crate::content::manifest::Index;
use crate::content::media_type::{self, Dialect};
use crate::content::{annotations, bytes_reader, read_all, BlobReader, Descriptor, Digest, VerifyReader};
use crate::error::{from_io, OrcaError, OrcaResult};
use crate::successors::parse_successors;
use crate::target::graph::PredecessorIndex;
use crate::target::{Deleter, PredecessorFinder, Storage, Target};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};
use uuid::Uuid;

const LAYOUT_FILE: &str = "oci-layout";
const INDEX_FILE: &str = "index.json";
const LAYOUT_VERSION: &str = "1.0.0";
/// Largest blob read when guessing whether it is a manifest
const MAX_SNIFF_SIZE: u64 = 4 * 1024 * 1024;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LayoutMarker {
    image_layout_version: String,
}

/// Blob count and total size of a layout
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlobUsage {
    pub blobs: usize,
    pub bytes: u64,
}

/// Target over an OCI image layout directory
#[derive(Debug)]
pub struct OciLayout {
    root: PathBuf,
    index: Mutex<Vec<Descriptor>>,
    graph: PredecessorIndex,
}

impl OciLayout {
    /// Open a layout, creating it if the directory is empty or missing
    pub async fn open(root: impl Into<PathBuf>) -> OrcaResult<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("blobs"))
            .await
            .map_err(|e| OrcaError::io(format!("creating {}", root.display()), e))?;

        let marker = root.join(LAYOUT_FILE);
        if !exists(&marker).await? {
            let content = serde_json::to_vec(&LayoutMarker {
                image_layout_version: LAYOUT_VERSION.to_string(),
            })?;
            write_atomic(&root, &marker, &content).await?;
        }
        Self::load(root).await
    }

    /// Open a layout that must already exist
    pub async fn open_existing(root: impl Into<PathBuf>) -> OrcaResult<Self> {
        let root = root.into();
        if !exists(&root.join(LAYOUT_FILE)).await? {
            return Err(OrcaError::InvalidLayout {
                path: root,
                reason: format!("missing {}", LAYOUT_FILE),
            });
        }
        Self::load(root).await
    }

    async fn load(root: PathBuf) -> OrcaResult<Self> {
        let marker: LayoutMarker = read_json(&root, &root.join(LAYOUT_FILE)).await?;
        if marker.image_layout_version != LAYOUT_VERSION {
            return Err(OrcaError::InvalidLayout {
                path: root,
                reason: format!(
                    "unsupported layout version {}",
                    marker.image_layout_version
                ),
            });
        }

        let index_path = root.join(INDEX_FILE);
        let manifests = if exists(&index_path).await? {
            let index: Index = read_json(&root, &index_path).await?;
            index.manifests
        } else {
            Vec::new()
        };

        let layout = Self {
            root,
            index: Mutex::new(manifests),
            graph: PredecessorIndex::default(),
        };
        layout.rebuild_graph().await?;
        debug!(root = %layout.root.display(), "Opened OCI layout");
        Ok(layout)
    }

    /// Index every manifest reachable from `index.json`
    async fn rebuild_graph(&self) -> OrcaResult<()> {
        let mut pending: Vec<Descriptor> = self.index.lock().await.clone();
        let mut seen = HashSet::new();

        while let Some(desc) = pending.pop() {
            if !desc.is_manifest() || !seen.insert(desc.digest.clone()) {
                continue;
            }
            let content = match fs::read(self.blob_path(&desc.digest)).await {
                Ok(content) => content,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    warn!(digest = %desc.digest, "Manifest listed in index.json is missing");
                    continue;
                }
                Err(e) => return Err(OrcaError::io(format!("reading {}", desc.digest), e)),
            };
            self.graph.index(&desc, &content)?;
            let successors = parse_successors(&desc, &content)?;
            pending.extend(successors.descriptors().into_iter().filter(|d| d.is_manifest()));
        }
        trace!(manifests = seen.len(), "Rebuilt predecessor index");
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, digest: &Digest) -> PathBuf {
        self.root
            .join("blobs")
            .join(digest.algorithm().as_str())
            .join(digest.encoded())
    }

    /// Tags defined in `index.json`, sorted
    pub async fn tags(&self) -> Vec<String> {
        let index = self.index.lock().await;
        let mut tags: Vec<String> = index
            .iter()
            .filter_map(|d| d.annotation(annotations::REF_NAME))
            .map(str::to_string)
            .collect();
        tags.sort();
        tags.dedup();
        tags
    }

    /// Count blobs and their total size
    pub async fn blob_usage(&self) -> OrcaResult<BlobUsage> {
        let mut usage = BlobUsage::default();
        let blobs = self.root.join("blobs");
        let mut algorithms = fs::read_dir(&blobs)
            .await
            .map_err(|e| OrcaError::io(format!("listing {}", blobs.display()), e))?;
        while let Some(alg) = algorithms
            .next_entry()
            .await
            .map_err(|e| OrcaError::io("listing blobs", e))?
        {
            if alg.file_name() == ".ingest" {
                continue;
            }
            let mut entries = fs::read_dir(alg.path())
                .await
                .map_err(|e| OrcaError::io("listing blobs", e))?;
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| OrcaError::io("listing blobs", e))?
            {
                let meta = entry
                    .metadata()
                    .await
                    .map_err(|e| OrcaError::io("reading blob metadata", e))?;
                if meta.is_file() {
                    usage.blobs += 1;
                    usage.bytes += meta.len();
                }
            }
        }
        Ok(usage)
    }

    async fn save_index(&self, manifests: &[Descriptor]) -> OrcaResult<()> {
        let index = Index::new(manifests.to_vec());
        let content = serde_json::to_vec(&index)?;
        write_atomic(&self.root, &self.root.join(INDEX_FILE), &content).await
    }

    /// Record a pushed manifest in `index.json` if nothing lists it yet
    async fn record_manifest(&self, desc: &Descriptor) -> OrcaResult<()> {
        let mut index = self.index.lock().await;
        if index.iter().any(|d| d.digest == desc.digest) {
            return Ok(());
        }
        let mut entry = desc.plain();
        entry.platform = desc.platform.clone();
        entry.artifact_type = desc.artifact_type.clone();
        index.push(entry);
        self.save_index(&index).await
    }

    /// Media type of a stored blob that no index entry describes
    async fn sniff_media_type(&self, digest: &Digest) -> OrcaResult<Descriptor> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct MediaTypeProbe {
            media_type: Option<String>,
        }

        let path = self.blob_path(digest);
        let size = match fs::metadata(&path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(OrcaError::not_found(digest));
            }
            Err(e) => return Err(OrcaError::io(format!("reading {}", digest), e)),
        };
        if size > MAX_SNIFF_SIZE {
            return Ok(Descriptor::new(media_type::DEFAULT_BLOB, digest.clone(), size));
        }

        let content = fs::read(&path)
            .await
            .map_err(|e| OrcaError::io(format!("reading {}", digest), e))?;
        let media_type = serde_json::from_slice::<MediaTypeProbe>(&content)
            .ok()
            .and_then(|p| p.media_type)
            .filter(|m| Dialect::of(m).is_manifest())
            .unwrap_or_else(|| media_type::DEFAULT_BLOB.to_string());
        Ok(Descriptor::new(media_type, digest.clone(), content.len() as u64))
    }

    async fn ingest(&self, desc: &Descriptor, content: BlobReader) -> OrcaResult<()> {
        let ingest_dir = self.root.join("blobs").join(".ingest");
        fs::create_dir_all(&ingest_dir)
            .await
            .map_err(|e| OrcaError::io("creating ingest directory", e))?;
        let ingest_path = ingest_dir.join(Uuid::new_v4().to_string());

        let result = async {
            let mut file = fs::File::create(&ingest_path)
                .await
                .map_err(|e| OrcaError::io(format!("creating {}", ingest_path.display()), e))?;
            let mut verified = VerifyReader::new(content, desc);
            tokio::io::copy(&mut verified, &mut file)
                .await
                .map_err(|e| from_io(format!("writing {}", desc.digest), e))?;
            file.flush()
                .await
                .map_err(|e| OrcaError::io(format!("flushing {}", desc.digest), e))?;
            self.commit(&ingest_path, &desc.digest).await
        }
        .await;

        if result.is_err() {
            let _ = fs::remove_file(&ingest_path).await;
        }
        result
    }

    async fn commit(&self, ingest_path: &Path, digest: &Digest) -> OrcaResult<()> {
        let target = self.blob_path(digest);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| OrcaError::io(format!("creating {}", parent.display()), e))?;
        }
        fs::rename(ingest_path, &target)
            .await
            .map_err(|e| OrcaError::io(format!("committing {}", digest), e))
    }
}

#[async_trait]
impl Storage for OciLayout {
    async fn exists(&self, desc: &Descriptor) -> OrcaResult<bool> {
        exists(&self.blob_path(&desc.digest)).await
    }

    async fn fetch(&self, desc: &Descriptor) -> OrcaResult<BlobReader> {
        match fs::File::open(self.blob_path(&desc.digest)).await {
            Ok(file) => Ok(Box::pin(file)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(OrcaError::not_found(&desc.digest)),
            Err(e) => Err(OrcaError::io(format!("opening {}", desc.digest), e)),
        }
    }

    async fn push(&self, desc: &Descriptor, content: BlobReader) -> OrcaResult<()> {
        if self.exists(desc).await? {
            trace!(digest = %desc.digest, "Blob already in layout");
            return Ok(());
        }

        if desc.is_manifest() {
            let bytes = read_all(content, desc).await?;
            self.ingest(desc, bytes_reader(bytes.clone())).await?;
            self.graph.index(desc, &bytes)?;
            self.record_manifest(desc).await?;
        } else {
            self.ingest(desc, content).await?;
        }
        debug!(digest = %desc.digest, size = desc.size, "Pushed to layout");
        Ok(())
    }
}

#[async_trait]
impl Target for OciLayout {
    async fn resolve(&self, reference: &str) -> OrcaResult<Descriptor> {
        if let Ok(digest) = reference.parse::<Digest>() {
            let listed = {
                let index = self.index.lock().await;
                index.iter().find(|d| d.digest == digest).cloned()
            };
            return match listed {
                Some(desc) if self.exists(&desc).await? => Ok(strip_ref_name(desc)),
                Some(_) => Err(OrcaError::not_found(reference)),
                None => self.sniff_media_type(&digest).await,
            };
        }

        let index = self.index.lock().await;
        index
            .iter()
            .find(|d| d.annotation(annotations::REF_NAME) == Some(reference))
            .cloned()
            .map(strip_ref_name)
            .ok_or_else(|| OrcaError::not_found(reference))
    }

    async fn tag(&self, desc: &Descriptor, reference: &str) -> OrcaResult<()> {
        if reference.is_empty() || reference.parse::<Digest>().is_ok() {
            return Err(OrcaError::InvalidReference {
                reference: reference.to_string(),
                reason: "tag must be a non-empty name".to_string(),
            });
        }
        if !self.exists(desc).await? {
            return Err(OrcaError::not_found(&desc.digest));
        }

        let mut index = self.index.lock().await;
        index.retain(|d| {
            let ref_name = d.annotation(annotations::REF_NAME);
            let untagged_same = ref_name.is_none() && d.digest == desc.digest;
            ref_name != Some(reference) && !untagged_same
        });
        let mut entry = strip_ref_name(desc.clone()).with_annotation(annotations::REF_NAME, reference);
        entry.data = None;
        index.push(entry);
        self.save_index(&index).await?;
        debug!(digest = %desc.digest, reference, "Tagged in layout");
        Ok(())
    }

    fn name(&self) -> String {
        self.root.display().to_string()
    }

    fn as_predecessor_finder(&self) -> Option<&dyn PredecessorFinder> {
        Some(self)
    }

    fn as_deleter(&self) -> Option<&dyn Deleter> {
        Some(self)
    }
}

#[async_trait]
impl PredecessorFinder for OciLayout {
    async fn predecessors(&self, desc: &Descriptor) -> OrcaResult<Vec<Descriptor>> {
        Ok(self.graph.predecessors(&desc.digest))
    }
}

#[async_trait]
impl Deleter for OciLayout {
    async fn delete(&self, desc: &Descriptor) -> OrcaResult<()> {
        match fs::remove_file(self.blob_path(&desc.digest)).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(OrcaError::not_found(&desc.digest))
            }
            Err(e) => return Err(OrcaError::io(format!("deleting {}", desc.digest), e)),
        }
        self.graph.remove(&desc.digest);

        let mut index = self.index.lock().await;
        let before = index.len();
        index.retain(|d| d.digest != desc.digest);
        if index.len() != before {
            self.save_index(&index).await?;
        }
        debug!(digest = %desc.digest, "Deleted from layout");
        Ok(())
    }
}

fn strip_ref_name(mut desc: Descriptor) -> Descriptor {
    if let Some(annotations) = desc.annotations.as_mut() {
        annotations.remove(annotations::REF_NAME);
        if annotations.is_empty() {
            desc.annotations = None;
        }
    }
    desc
}

async fn exists(path: &Path) -> OrcaResult<bool> {
    fs::try_exists(path)
        .await
        .map_err(|e| OrcaError::io(format!("checking {}", path.display()), e))
}

async fn read_json<T: serde::de::DeserializeOwned>(root: &Path, path: &Path) -> OrcaResult<T> {
    let content = fs::read(path)
        .await
        .map_err(|e| OrcaError::io(format!("reading {}", path.display()), e))?;
    serde_json::from_slice(&content).map_err(|e| OrcaError::InvalidLayout {
        path: root.to_path_buf(),
        reason: format!("{}: {}", path.display(), e),
    })
}

/// Write through a temporary file so readers never see a torn document
async fn write_atomic(root: &Path, path: &Path, content: &[u8]) -> OrcaResult<()> {
    let tmp = root.join(format!(".{}.tmp", Uuid::new_v4()));
    fs::write(&tmp, content)
        .await
        .map_err(|e| OrcaError::io(format!("writing {}", tmp.display()), e))?;
    fs::rename(&tmp, path)
        .await
        .map_err(|e| OrcaError::io(format!("replacing {}", path.display()), e))
}
