//! OCI content descriptors

use crate::content::digest::Digest;
use crate::content::media_type::Dialect;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Well-known annotation keys
pub mod annotations {
    /// Names a blob for filesystem materialization
    pub const TITLE: &str = "org.opencontainers.image.title";
    /// Tag of a manifest inside an OCI layout `index.json`
    pub const REF_NAME: &str = "org.opencontainers.image.ref.name";
    /// RFC 3339 creation time of an artifact
    pub const CREATED: &str = "org.opencontainers.image.created";
}

/// Platform a manifest in an index was built for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    pub architecture: String,

    pub os: String,

    #[serde(rename = "os.version", skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,

    #[serde(rename = "os.features", skip_serializing_if = "Option::is_none")]
    pub os_features: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

/// Content-addressed pointer to a manifest or blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    pub media_type: String,

    pub digest: Digest,

    pub size: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urls: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,

    /// Embedded content, base64 encoded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_type: Option<String>,
}

impl Descriptor {
    pub fn new(media_type: impl Into<String>, digest: Digest, size: u64) -> Self {
        Self {
            media_type: media_type.into(),
            digest,
            size,
            urls: None,
            annotations: None,
            data: None,
            platform: None,
            artifact_type: None,
        }
    }

    /// Describe `content` with a freshly computed sha256 digest
    pub fn from_bytes(media_type: impl Into<String>, content: &[u8]) -> Self {
        Self::new(media_type, Digest::from_bytes(content), content.len() as u64)
    }

    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn with_artifact_type(mut self, artifact_type: impl Into<String>) -> Self {
        self.artifact_type = Some(artifact_type.into());
        self
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations
            .as_ref()
            .and_then(|a| a.get(key))
            .map(String::as_str)
    }

    /// Title annotation naming this node on disk
    pub fn title(&self) -> Option<&str> {
        self.annotation(annotations::TITLE)
            .filter(|title| !title.is_empty())
    }

    pub fn dialect(&self) -> Dialect {
        Dialect::of(&self.media_type)
    }

    pub fn is_manifest(&self) -> bool {
        self.dialect().is_manifest()
    }

    /// Copy of this descriptor carrying only the identifying fields
    pub fn plain(&self) -> Self {
        Self::new(self.media_type.clone(), self.digest.clone(), self.size)
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.title() {
            Some(title) => write!(f, "{} ({})", self.digest, title),
            None => write!(f, "{}", self.digest),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_json_roundtrips_byte_identically() {
        let json = r#"{"mediaType":"application/vnd.oci.image.manifest.v1+json","digest":"sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855","size":0,"annotations":{"a":"1","org.opencontainers.image.title":"x.txt"},"platform":{"architecture":"amd64","os":"linux"},"artifactType":"application/vnd.example"}"#;
        let desc: Descriptor = serde_json::from_str(json).unwrap();
        assert_eq!(desc.title(), Some("x.txt"));
        assert_eq!(serde_json::to_string(&desc).unwrap(), json);
    }

    #[test]
    fn absent_fields_are_omitted() {
        let desc = Descriptor::from_bytes("application/octet-stream", b"hi");
        let json = serde_json::to_string(&desc).unwrap();
        assert!(!json.contains("annotations"));
        assert!(!json.contains("artifactType"));
        assert!(json.contains(r#""size":2"#));
    }

    #[test]
    fn empty_title_is_unnamed() {
        let desc = Descriptor::from_bytes("application/octet-stream", b"hi")
            .with_annotation(annotations::TITLE, "");
        assert_eq!(desc.title(), None);
    }

    #[test]
    fn display_includes_title() {
        let desc = Descriptor::from_bytes("application/octet-stream", b"hi")
            .with_annotation(annotations::TITLE, "hi.txt");
        assert!(desc.to_string().ends_with("(hi.txt)"));
    }
}
