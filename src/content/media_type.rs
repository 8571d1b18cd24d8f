//! Media types understood by the successor resolver

pub const OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
pub const OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";
pub const OCI_ARTIFACT_MANIFEST: &str = "application/vnd.oci.artifact.manifest.v1+json";
pub const OCI_CONFIG: &str = "application/vnd.oci.image.config.v1+json";
pub const OCI_EMPTY: &str = "application/vnd.oci.empty.v1+json";
pub const OCI_LAYER: &str = "application/vnd.oci.image.layer.v1.tar";

pub const DOCKER_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";
pub const DOCKER_MANIFEST_LIST: &str = "application/vnd.docker.distribution.manifest.list.v2+json";

/// Default media type for files pushed without an explicit type
pub const DEFAULT_BLOB: &str = "application/vnd.oci.image.layer.v1.tar";

/// Manifest dialect selected by media type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    DockerManifest,
    DockerManifestList,
    OciManifest,
    OciIndex,
    OciArtifactManifest,
    /// Anything else: an opaque blob
    Blob,
}

impl Dialect {
    pub fn of(media_type: &str) -> Self {
        match media_type {
            DOCKER_MANIFEST => Self::DockerManifest,
            DOCKER_MANIFEST_LIST => Self::DockerManifestList,
            OCI_MANIFEST => Self::OciManifest,
            OCI_INDEX => Self::OciIndex,
            OCI_ARTIFACT_MANIFEST => Self::OciArtifactManifest,
            _ => Self::Blob,
        }
    }

    pub fn is_manifest(&self) -> bool {
        !matches!(self, Self::Blob)
    }

    pub fn is_index(&self) -> bool {
        matches!(self, Self::OciIndex | Self::DockerManifestList)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dialect_selection() {
        assert_eq!(Dialect::of(OCI_MANIFEST), Dialect::OciManifest);
        assert_eq!(Dialect::of(DOCKER_MANIFEST_LIST), Dialect::DockerManifestList);
        assert_eq!(Dialect::of("application/json"), Dialect::Blob);
        assert!(Dialect::of(OCI_INDEX).is_index());
        assert!(!Dialect::of(OCI_LAYER).is_manifest());
    }
}
