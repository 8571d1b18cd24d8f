//! Successor resolution for manifest graphs
//!
//! Maps a descriptor to its direct children by interpreting the manifest
//! dialect named by its media type. Resolution never recurses; walking
//! the graph is the copy orchestrator's job.

use crate::content::manifest::{ArtifactManifest, ImageManifest, Index};
use crate::content::media_type::Dialect;
use crate::content::{read_all, Descriptor};
use crate::error::{OrcaError, OrcaResult};
use crate::target::Storage;
use serde::de::DeserializeOwned;
use tracing::trace;

/// Why a node appears in a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    /// Image or artifact configuration blob
    Config,
    /// Layer or artifact blob
    Layer,
    /// Manifest listed by an index
    IndexMember,
}

/// A node of the copy plan
#[derive(Debug, Clone, PartialEq)]
pub struct PlanNode {
    pub descriptor: Descriptor,
    pub role: NodeRole,
}

/// Direct children of a node, with the subject kept apart
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Successors {
    pub children: Vec<PlanNode>,
    pub subject: Option<Descriptor>,
}

impl Successors {
    pub fn is_empty(&self) -> bool {
        self.children.is_empty() && self.subject.is_none()
    }

    /// Child descriptors in document order
    pub fn descriptors(&self) -> Vec<Descriptor> {
        self.children.iter().map(|n| n.descriptor.clone()).collect()
    }

    fn from_children(
        children: impl IntoIterator<Item = (Descriptor, NodeRole)>,
        subject: Option<Descriptor>,
    ) -> Self {
        Self {
            children: children
                .into_iter()
                .map(|(descriptor, role)| PlanNode { descriptor, role })
                .collect(),
            subject,
        }
    }
}

fn parse<T: DeserializeOwned>(desc: &Descriptor, content: &[u8]) -> OrcaResult<T> {
    serde_json::from_slice(content).map_err(|e| OrcaError::ManifestParse {
        digest: desc.digest.to_string(),
        reason: e.to_string(),
    })
}

/// Resolve successors from already-fetched manifest bytes
pub fn parse_successors(desc: &Descriptor, content: &[u8]) -> OrcaResult<Successors> {
    let dialect = desc.dialect();
    if !dialect.is_manifest() {
        return Ok(Successors::default());
    }
    if content.is_empty() {
        return Err(OrcaError::EmptyContent(desc.digest.to_string()));
    }

    let successors = match dialect {
        Dialect::DockerManifest | Dialect::OciManifest => {
            let manifest: ImageManifest = parse(desc, content)?;
            let config = std::iter::once((manifest.config, NodeRole::Config));
            let layers = manifest.layers.into_iter().map(|l| (l, NodeRole::Layer));
            Successors::from_children(config.chain(layers), manifest.subject)
        }
        Dialect::OciArtifactManifest => {
            let manifest: ArtifactManifest = parse(desc, content)?;
            let blobs = manifest.blobs.into_iter().map(|b| (b, NodeRole::Layer));
            Successors::from_children(blobs, manifest.subject)
        }
        Dialect::OciIndex | Dialect::DockerManifestList => {
            let index: Index = parse(desc, content)?;
            let members = index
                .manifests
                .into_iter()
                .map(|m| (m, NodeRole::IndexMember));
            Successors::from_children(members, index.subject)
        }
        Dialect::Blob => Successors::default(),
    };

    trace!(
        digest = %desc.digest,
        children = successors.children.len(),
        has_subject = successors.subject.is_some(),
        "Resolved successors"
    );
    Ok(successors)
}

/// Fetch a node and resolve its successors.
///
/// Opaque blobs have no successors and are not fetched.
pub async fn successors(storage: &dyn Storage, desc: &Descriptor) -> OrcaResult<Successors> {
    if !desc.is_manifest() {
        return Ok(Successors::default());
    }
    let reader = storage.fetch(desc).await?;
    let content = read_all(reader, desc).await?;
    parse_successors(desc, &content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::media_type;
    use crate::target::MemoryStore;
    use bytes::Bytes;

    const CONFIG: &str = "sha256:b5b2b2c507a0944348e0303114d8d93aaaa081732b86451d9bce1f432a537bc7";
    const LAYER1: &str = "sha256:9834876dcfb05cb167a5c24953eba58c4ac89b1adf57f28f2f9d09af107ee8f0";
    const LAYER2: &str = "sha256:3e23e8160039594a33894f6564e1b1348bbd7a0088d42c4acb73eeaed59c009d";
    const SUBJECT: &str = "sha256:2e7d2c03a9507ae265ecf5b5356885a53393a2029d241394997265a1a25aefc6";

    fn image_manifest_json(with_subject: bool) -> String {
        let subject = if with_subject {
            format!(
                r#","subject":{{"mediaType":"{}","digest":"{SUBJECT}","size":10}}"#,
                media_type::OCI_MANIFEST
            )
        } else {
            String::new()
        };
        format!(
            r#"{{"schemaVersion":2,"mediaType":"{}","config":{{"mediaType":"{}","digest":"{CONFIG}","size":2}},"layers":[{{"mediaType":"{}","digest":"{LAYER1}","size":3}},{{"mediaType":"{}","digest":"{LAYER2}","size":4}}]{subject}}}"#,
            media_type::OCI_MANIFEST,
            media_type::OCI_CONFIG,
            media_type::OCI_LAYER,
            media_type::OCI_LAYER,
        )
    }

    #[test]
    fn image_manifest_children_in_order() {
        let json = image_manifest_json(true);
        let desc = Descriptor::from_bytes(media_type::OCI_MANIFEST, json.as_bytes());
        let succ = parse_successors(&desc, json.as_bytes()).unwrap();

        let digests: Vec<String> = succ
            .descriptors()
            .iter()
            .map(|d| d.digest.to_string())
            .collect();
        assert_eq!(digests, vec![CONFIG, LAYER1, LAYER2]);
        assert_eq!(succ.children[0].role, NodeRole::Config);
        assert_eq!(succ.children[2].role, NodeRole::Layer);
        assert_eq!(succ.subject.unwrap().digest.to_string(), SUBJECT);
    }

    #[test]
    fn image_manifest_without_subject() {
        let json = image_manifest_json(false);
        let desc = Descriptor::from_bytes(media_type::OCI_MANIFEST, json.as_bytes());
        let succ = parse_successors(&desc, json.as_bytes()).unwrap();
        assert_eq!(succ.children.len(), 3);
        assert!(succ.subject.is_none());
    }

    #[test]
    fn docker_manifest_uses_image_shape() {
        let json = image_manifest_json(false);
        let desc = Descriptor::from_bytes(media_type::DOCKER_MANIFEST, json.as_bytes());
        let succ = parse_successors(&desc, json.as_bytes()).unwrap();
        assert_eq!(succ.children.len(), 3);
    }

    #[test]
    fn artifact_manifest_blobs() {
        let json = format!(
            r#"{{"mediaType":"{}","artifactType":"application/vnd.example.sbom","blobs":[{{"mediaType":"application/json","digest":"{LAYER1}","size":3}}],"subject":{{"mediaType":"{}","digest":"{SUBJECT}","size":10}}}}"#,
            media_type::OCI_ARTIFACT_MANIFEST,
            media_type::OCI_MANIFEST
        );
        let desc = Descriptor::from_bytes(media_type::OCI_ARTIFACT_MANIFEST, json.as_bytes());
        let succ = parse_successors(&desc, json.as_bytes()).unwrap();
        assert_eq!(succ.children.len(), 1);
        assert_eq!(succ.children[0].descriptor.digest.to_string(), LAYER1);
        assert!(succ.subject.is_some());
    }

    #[test]
    fn index_members() {
        let json = format!(
            r#"{{"schemaVersion":2,"mediaType":"{}","manifests":[{{"mediaType":"{}","digest":"{LAYER1}","size":3,"platform":{{"architecture":"amd64","os":"linux"}}}},{{"mediaType":"{}","digest":"{LAYER2}","size":4}}]}}"#,
            media_type::OCI_INDEX,
            media_type::OCI_MANIFEST,
            media_type::OCI_MANIFEST
        );
        let desc = Descriptor::from_bytes(media_type::OCI_INDEX, json.as_bytes());
        let succ = parse_successors(&desc, json.as_bytes()).unwrap();
        assert_eq!(succ.children.len(), 2);
        assert!(succ
            .children
            .iter()
            .all(|n| n.role == NodeRole::IndexMember));
    }

    #[test]
    fn opaque_blob_has_no_children() {
        let desc = Descriptor::from_bytes("application/octet-stream", b"{}");
        assert!(parse_successors(&desc, b"{}").unwrap().is_empty());
    }

    #[test]
    fn malformed_manifest_is_error() {
        let desc = Descriptor::from_bytes(media_type::OCI_MANIFEST, b"{not json");
        let err = parse_successors(&desc, b"{not json").unwrap_err();
        assert!(matches!(err, OrcaError::ManifestParse { .. }));
    }

    #[test]
    fn empty_manifest_is_error() {
        let desc = Descriptor::from_bytes(media_type::OCI_MANIFEST, b"");
        let err = parse_successors(&desc, b"").unwrap_err();
        assert!(matches!(err, OrcaError::EmptyContent(_)));
    }

    #[tokio::test]
    async fn successors_fetches_manifest() {
        let store = MemoryStore::new();
        let json = image_manifest_json(false);
        let desc = Descriptor::from_bytes(media_type::OCI_MANIFEST, json.as_bytes());
        store.put(&desc, Bytes::from(json)).unwrap();

        let succ = successors(&store, &desc).await.unwrap();
        assert_eq!(succ.children.len(), 3);
    }

    #[tokio::test]
    async fn successors_skips_fetch_for_blobs() {
        // Not present in the store: a fetch would fail
        let store = MemoryStore::new();
        let desc = Descriptor::from_bytes(media_type::OCI_LAYER, b"layer");
        assert!(successors(&store, &desc).await.unwrap().is_empty());
    }
}
