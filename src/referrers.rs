//! Referrers discovery and tag-scheme index maintenance
//!
//! Targets with a referrers API answer predecessor queries directly.
//! Targets without one carry, per subject, an image index tagged
//! `<alg>-<encoded>` whose `manifests` list the referrers. Writers keep
//! that index current; readers fall back to it.

use crate::content::manifest::Index;
use crate::content::{media_type, read_all, bytes_reader, Descriptor, Digest};
use crate::error::{OrcaError, OrcaResult};
use crate::successors::parse_successors;
use crate::target::{Capabilities, Target};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

/// How referrers are discovered and recorded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ReferrersMode {
    /// Use the referrers API when the target has one, else the tag scheme
    #[default]
    Auto,
    /// Require the referrers API
    Api,
    /// Always use the tag scheme
    TagScheme,
}

impl ReferrersMode {
    /// Whether `target` should be read and written through the tag scheme
    pub fn uses_tag_scheme(&self, target: &dyn Target) -> bool {
        self.uses_tag_scheme_for(Capabilities::of(target))
    }

    pub fn uses_tag_scheme_for(&self, caps: Capabilities) -> bool {
        match self {
            Self::Auto => !caps.predecessors,
            Self::Api => false,
            Self::TagScheme => true,
        }
    }
}

impl fmt::Display for ReferrersMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Api => write!(f, "api"),
            Self::TagScheme => write!(f, "tag-scheme"),
        }
    }
}

/// Tag of the referrers index for `digest`
pub fn referrers_tag(digest: &Digest) -> String {
    let alg = digest.algorithm().as_str();
    let encoded = digest.encoded();
    format!(
        "{}-{}",
        &alg[..alg.len().min(32)],
        &encoded[..encoded.len().min(64)]
    )
}

fn matches_type(desc: &Descriptor, artifact_type: Option<&str>) -> bool {
    artifact_type.is_none_or(|wanted| desc.artifact_type.as_deref() == Some(wanted))
}

/// Fetch the tag-scheme index for `subject`, if one exists
async fn read_index(target: &dyn Target, subject: &Descriptor) -> OrcaResult<Option<(Descriptor, Index)>> {
    let desc = match target.resolve(&referrers_tag(&subject.digest)).await {
        Ok(desc) => desc,
        Err(e) if e.is_not_found() => return Ok(None),
        Err(e) => return Err(e),
    };
    let content = read_all(target.fetch(&desc).await?, &desc).await?;
    let index: Index = serde_json::from_slice(&content).map_err(|e| OrcaError::ManifestParse {
        digest: desc.digest.to_string(),
        reason: e.to_string(),
    })?;
    Ok(Some((desc, index)))
}

/// Manifests pointing at `desc`, as used by extended copy.
///
/// With a referrers API this is every predecessor (including indexes
/// listing `desc`); through the tag scheme only referrers are visible.
pub async fn find_predecessors(
    target: &dyn Target,
    desc: &Descriptor,
    mode: ReferrersMode,
    artifact_type: Option<&str>,
) -> OrcaResult<Vec<Descriptor>> {
    let predecessors = if mode.uses_tag_scheme(target) {
        read_index(target, desc)
            .await?
            .map(|(_, index)| index.manifests)
            .unwrap_or_default()
    } else {
        let finder = target.as_predecessor_finder().ok_or_else(|| {
            OrcaError::Unsupported(format!("{} has no referrers API", target.name()))
        })?;
        finder.predecessors(desc).await?
    };
    Ok(predecessors
        .into_iter()
        .filter(|p| matches_type(p, artifact_type))
        .collect())
}

/// Manifests declaring `subject` as their subject
pub async fn find_referrers(
    target: &dyn Target,
    subject: &Descriptor,
    mode: ReferrersMode,
    artifact_type: Option<&str>,
) -> OrcaResult<Vec<Descriptor>> {
    if mode.uses_tag_scheme(target) {
        return find_predecessors(target, subject, mode, artifact_type).await;
    }

    let mut referrers = Vec::new();
    for candidate in find_predecessors(target, subject, mode, artifact_type).await? {
        let content = read_all(target.fetch(&candidate).await?, &candidate).await?;
        let successors = parse_successors(&candidate, &content)?;
        if successors
            .subject
            .is_some_and(|s| s.digest == subject.digest)
        {
            referrers.push(candidate);
        }
    }
    Ok(referrers)
}

/// Add `referrer` to the tag-scheme index of `subject`
pub async fn add_referrer(
    target: &dyn Target,
    subject: &Descriptor,
    referrer: &Descriptor,
    skip_gc: bool,
) -> OrcaResult<()> {
    update_index(target, subject, skip_gc, |manifests| {
        if manifests.iter().any(|m| m.digest == referrer.digest) {
            return false;
        }
        manifests.push(referrer.clone());
        true
    })
    .await
}

/// Drop `referrer` from the tag-scheme index of `subject`
pub async fn remove_referrer(
    target: &dyn Target,
    subject: &Descriptor,
    referrer: &Digest,
    skip_gc: bool,
) -> OrcaResult<()> {
    update_index(target, subject, skip_gc, |manifests| {
        let before = manifests.len();
        manifests.retain(|m| &m.digest != referrer);
        manifests.len() != before
    })
    .await
}

async fn update_index(
    target: &dyn Target,
    subject: &Descriptor,
    skip_gc: bool,
    edit: impl FnOnce(&mut Vec<Descriptor>) -> bool,
) -> OrcaResult<()> {
    let soft = |reason: String| OrcaError::ReferrersIndex {
        subject: subject.digest.to_string(),
        reason,
    };

    let current = read_index(target, subject)
        .await
        .map_err(|e| soft(e.to_string()))?;
    let (old, mut manifests) = match current {
        Some((desc, index)) => (Some(desc), index.manifests),
        None => (None, Vec::new()),
    };
    if !edit(&mut manifests) {
        return Ok(());
    }

    let content = serde_json::to_vec(&Index::new(manifests))?;
    let desc = Descriptor::from_bytes(media_type::OCI_INDEX, &content);
    target
        .push(&desc, bytes_reader(content.into()))
        .await
        .map_err(|e| soft(format!("pushing index: {}", e)))?;
    let tag = referrers_tag(&subject.digest);
    target
        .tag(&desc, &tag)
        .await
        .map_err(|e| soft(format!("tagging {}: {}", tag, e)))?;
    debug!(subject = %subject.digest, index = %desc.digest, "Updated referrers index");

    let Some(old) = old.filter(|old| old.digest != desc.digest) else {
        return Ok(());
    };
    if skip_gc {
        return Ok(());
    }
    match target.as_deleter() {
        Some(deleter) => deleter
            .delete(&old)
            .await
            .map_err(|e| soft(format!("deleting superseded index {}: {}", old.digest, e))),
        None => {
            warn!(index = %old.digest, "Target cannot delete superseded referrers index");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::manifest::ImageManifest;
    use crate::target::{MemoryStore, Storage};
    use bytes::Bytes;

    fn put_manifest(store: &MemoryStore, manifest: &ImageManifest) -> Descriptor {
        let content = serde_json::to_vec(manifest).unwrap();
        let desc = Descriptor::from_bytes(media_type::OCI_MANIFEST, &content);
        store.put(&desc, Bytes::from(content)).unwrap();
        crate::target::graph::referrer_descriptor(&desc, &serde_json::to_vec(manifest).unwrap())
    }

    fn subject_and_referrer(store: &MemoryStore, artifact_type: &str) -> (Descriptor, Descriptor) {
        let config = Descriptor::from_bytes(media_type::OCI_EMPTY, b"{}");
        store.put(&config, Bytes::from_static(b"{}")).unwrap();
        let subject = put_manifest(store, &ImageManifest::new(config.clone(), vec![]));
        let mut referrer = ImageManifest::new(config, vec![]);
        referrer.artifact_type = Some(artifact_type.to_string());
        referrer.subject = Some(subject.plain());
        let referrer = put_manifest(store, &referrer);
        (subject, referrer)
    }

    #[test]
    fn tag_scheme_name() {
        let digest: Digest = "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
            .parse()
            .unwrap();
        assert_eq!(
            referrers_tag(&digest),
            "sha256-e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );

        let long = Digest::from_bytes(b"x");
        assert_eq!(referrers_tag(&long).len(), "sha256-".len() + 64);
    }

    #[tokio::test]
    async fn api_referrers_are_filtered_by_subject_and_type() {
        let store = MemoryStore::new();
        let (subject, referrer) = subject_and_referrer(&store, "application/vnd.example.sig");

        let found = find_referrers(&store, &subject, ReferrersMode::Auto, None)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].digest, referrer.digest);

        let none = find_referrers(
            &store,
            &subject,
            ReferrersMode::Auto,
            Some("application/vnd.example.sbom"),
        )
        .await
        .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn api_mode_requires_api() {
        let store = MemoryStore::without_referrers_api();
        let subject = Descriptor::from_bytes(media_type::OCI_MANIFEST, b"s");
        let err = find_referrers(&store, &subject, ReferrersMode::Api, None)
            .await
            .unwrap_err();
        assert!(matches!(err, OrcaError::Unsupported(_)));
    }

    #[tokio::test]
    async fn tag_scheme_index_roundtrip_and_gc() {
        let store = MemoryStore::without_referrers_api();
        let (subject, first) = subject_and_referrer(&store, "application/vnd.example.sig");
        let (_, second) = subject_and_referrer_for(&store, &subject, "application/vnd.example.sbom");

        add_referrer(&store, &subject, &first, false).await.unwrap();
        let first_index = store.resolve(&referrers_tag(&subject.digest)).await.unwrap();
        add_referrer(&store, &subject, &second, false).await.unwrap();
        add_referrer(&store, &subject, &second, false).await.unwrap();

        let found = find_referrers(&store, &subject, ReferrersMode::Auto, None)
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert!(!store.exists(&first_index).await.unwrap());

        remove_referrer(&store, &subject, &first.digest, true).await.unwrap();
        let found = find_referrers(&store, &subject, ReferrersMode::TagScheme, None)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].digest, second.digest);
    }

    fn subject_and_referrer_for(
        store: &MemoryStore,
        subject: &Descriptor,
        artifact_type: &str,
    ) -> (Descriptor, Descriptor) {
        let config = Descriptor::from_bytes(media_type::OCI_EMPTY, b"{}");
        let mut referrer = ImageManifest::new(config, vec![]);
        referrer.artifact_type = Some(artifact_type.to_string());
        referrer.subject = Some(subject.plain());
        let referrer = put_manifest(store, &referrer);
        (subject.clone(), referrer)
    }

    /// Target that refuses to be tagged
    struct NoTags(MemoryStore);

    #[async_trait::async_trait]
    impl Storage for NoTags {
        async fn exists(&self, desc: &Descriptor) -> OrcaResult<bool> {
            self.0.exists(desc).await
        }

        async fn fetch(&self, desc: &Descriptor) -> OrcaResult<crate::content::BlobReader> {
            self.0.fetch(desc).await
        }

        async fn push(&self, desc: &Descriptor, content: crate::content::BlobReader) -> OrcaResult<()> {
            self.0.push(desc, content).await
        }
    }

    #[async_trait::async_trait]
    impl Target for NoTags {
        async fn resolve(&self, reference: &str) -> OrcaResult<Descriptor> {
            self.0.resolve(reference).await
        }

        async fn tag(&self, _desc: &Descriptor, _reference: &str) -> OrcaResult<()> {
            Err(OrcaError::Unsupported("tag".to_string()))
        }

        fn name(&self) -> String {
            "no-tags".to_string()
        }
    }

    #[tokio::test]
    async fn index_failure_is_soft() {
        let target = NoTags(MemoryStore::new());
        let subject = Descriptor::from_bytes(media_type::OCI_MANIFEST, b"s");
        let referrer = Descriptor::from_bytes(media_type::OCI_MANIFEST, b"r");

        let err = add_referrer(&target, &subject, &referrer, false)
            .await
            .unwrap_err();
        assert!(err.is_soft());
        assert!(matches!(err, OrcaError::ReferrersIndex { .. }));
    }
}
