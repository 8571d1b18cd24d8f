//! Content graph builders shared by unit tests

use crate::content::manifest::{ImageManifest, Index};
use crate::content::{annotations, media_type, Descriptor};
use crate::target::MemoryStore;
use bytes::Bytes;

pub(crate) struct Image {
    pub manifest: Descriptor,
    pub config: Descriptor,
    pub layers: Vec<Descriptor>,
}

impl Image {
    /// Manifest, config and layers
    pub fn node_count(&self) -> usize {
        2 + self.layers.len()
    }
}

pub(crate) fn blob(store: &MemoryStore, media_type: &str, content: &[u8]) -> Descriptor {
    let desc = Descriptor::from_bytes(media_type, content);
    store.put(&desc, Bytes::copy_from_slice(content)).unwrap();
    desc
}

pub(crate) fn titled_blob(store: &MemoryStore, title: &str, content: &[u8]) -> Descriptor {
    blob(store, media_type::OCI_LAYER, content).with_annotation(annotations::TITLE, title)
}

pub(crate) fn manifest(store: &MemoryStore, manifest: &ImageManifest) -> Descriptor {
    let content = serde_json::to_vec(manifest).unwrap();
    blob(store, media_type::OCI_MANIFEST, &content)
}

pub(crate) fn index(store: &MemoryStore, manifests: &[Descriptor]) -> Descriptor {
    let content = serde_json::to_vec(&Index::new(manifests.to_vec())).unwrap();
    blob(store, media_type::OCI_INDEX, &content)
}

/// Image whose layers are titled `layer-<n>.txt`
pub(crate) fn image(store: &MemoryStore, layers: &[&[u8]]) -> Image {
    let layers: Vec<Descriptor> = layers
        .iter()
        .enumerate()
        .map(|(i, content)| titled_blob(store, &format!("layer-{i}.txt"), content))
        .collect();
    let digests: Vec<String> = layers.iter().map(|l| l.digest.to_string()).collect();
    let config = blob(
        store,
        media_type::OCI_CONFIG,
        serde_json::to_string(&digests).unwrap().as_bytes(),
    );
    let manifest = manifest(store, &ImageManifest::new(config.clone(), layers.clone()));
    Image {
        manifest,
        config,
        layers,
    }
}

/// Artifact manifest pointing at `subject`
pub(crate) fn referrer(
    store: &MemoryStore,
    subject: &Descriptor,
    artifact_type: &str,
    payload: &[u8],
) -> Descriptor {
    let config = blob(store, media_type::OCI_EMPTY, b"{}");
    let layer = blob(store, "application/octet-stream", payload);
    let mut doc = ImageManifest::new(config, vec![layer]);
    doc.artifact_type = Some(artifact_type.to_string());
    doc.subject = Some(subject.plain());
    manifest(store, &doc).with_artifact_type(artifact_type)
}
