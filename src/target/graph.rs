//! Reverse-edge index shared by the local stores

use crate::content::manifest::{ArtifactManifest, ImageManifest, Index};
use crate::content::media_type::Dialect;
use crate::content::{Descriptor, Digest};
use crate::error::OrcaResult;
use crate::successors::parse_successors;
use dashmap::DashMap;

/// Maps a node to the manifests pointing at it
#[derive(Debug, Default)]
pub(crate) struct PredecessorIndex {
    edges: DashMap<Digest, Vec<Descriptor>>,
}

impl PredecessorIndex {
    /// Record the outgoing edges of a manifest.
    ///
    /// Children and subject both gain `node` as a predecessor.
    pub fn index(&self, node: &Descriptor, content: &[u8]) -> OrcaResult<()> {
        if !node.is_manifest() {
            return Ok(());
        }
        let successors = parse_successors(node, content)?;
        let referrer = referrer_descriptor(node, content);

        let targets = successors
            .children
            .iter()
            .map(|n| &n.descriptor)
            .chain(successors.subject.as_ref());
        for target in targets {
            let mut preds = self.edges.entry(target.digest.clone()).or_default();
            if !preds.iter().any(|p| p.digest == referrer.digest) {
                preds.push(referrer.clone());
            }
        }
        Ok(())
    }

    pub fn predecessors(&self, digest: &Digest) -> Vec<Descriptor> {
        self.edges
            .get(digest)
            .map(|preds| preds.clone())
            .unwrap_or_default()
    }

    /// Drop every edge from or to `digest`
    pub fn remove(&self, digest: &Digest) {
        self.edges.remove(digest);
        for mut preds in self.edges.iter_mut() {
            preds.retain(|p| &p.digest != digest);
        }
        self.edges.retain(|_, preds| !preds.is_empty());
    }
}

/// Descriptor of a manifest as listed by a referrers query.
///
/// Carries the manifest's artifact type (falling back to the config media
/// type) and its annotations, so callers can filter without fetching.
pub(crate) fn referrer_descriptor(node: &Descriptor, content: &[u8]) -> Descriptor {
    let mut desc = node.plain();
    let (artifact_type, annotations) = match node.dialect() {
        Dialect::OciManifest | Dialect::DockerManifest => {
            match serde_json::from_slice::<ImageManifest>(content) {
                Ok(m) => (
                    m.artifact_type.or(Some(m.config.media_type)),
                    m.annotations,
                ),
                Err(_) => (None, None),
            }
        }
        Dialect::OciArtifactManifest => match serde_json::from_slice::<ArtifactManifest>(content) {
            Ok(m) => (m.artifact_type, m.annotations),
            Err(_) => (None, None),
        },
        Dialect::OciIndex | Dialect::DockerManifestList => {
            match serde_json::from_slice::<Index>(content) {
                Ok(i) => (i.artifact_type, i.annotations),
                Err(_) => (None, None),
            }
        }
        Dialect::Blob => (None, None),
    };
    desc.artifact_type = artifact_type;
    desc.annotations = annotations;
    desc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::media_type;

    fn manifest_with_subject(subject: &Descriptor, layer: &Descriptor) -> (Descriptor, Vec<u8>) {
        let config = Descriptor::from_bytes("application/vnd.example.sig", b"{}");
        let mut manifest = ImageManifest::new(config, vec![layer.clone()]);
        manifest.subject = Some(subject.clone());
        let content = serde_json::to_vec(&manifest).unwrap();
        let desc = Descriptor::from_bytes(media_type::OCI_MANIFEST, &content);
        (desc, content)
    }

    #[test]
    fn index_records_subject_and_children() {
        let index = PredecessorIndex::default();
        let subject = Descriptor::from_bytes(media_type::OCI_MANIFEST, b"subject");
        let layer = Descriptor::from_bytes(media_type::OCI_LAYER, b"sig");
        let (referrer, content) = manifest_with_subject(&subject, &layer);

        index.index(&referrer, &content).unwrap();
        index.index(&referrer, &content).unwrap();

        let preds = index.predecessors(&subject.digest);
        assert_eq!(preds.len(), 1);
        assert_eq!(preds[0].digest, referrer.digest);
        assert_eq!(
            preds[0].artifact_type.as_deref(),
            Some("application/vnd.example.sig")
        );
        assert_eq!(index.predecessors(&layer.digest).len(), 1);

        index.remove(&referrer.digest);
        assert!(index.predecessors(&subject.digest).is_empty());
    }

    #[test]
    fn blobs_are_not_indexed() {
        let index = PredecessorIndex::default();
        let blob = Descriptor::from_bytes(media_type::OCI_LAYER, b"x");
        index.index(&blob, b"x").unwrap();
        assert!(index.predecessors(&blob.digest).is_empty());
    }
}
