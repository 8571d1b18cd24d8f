//! Tag, discover and delete within a single target

use crate::content::{read_all, Descriptor, Digest};
use crate::copy::tag_all;
use crate::error::{OrcaError, OrcaResult};
use crate::ops::resolve_root;
use crate::referrers::{find_referrers, remove_referrer, ReferrersMode};
use crate::successors::parse_successors;
use crate::target::Target;
use futures_util::future::{BoxFuture, FutureExt};
use std::collections::HashSet;
use tracing::{info, warn};

/// Point `new_tags` at whatever `reference` resolves to
pub async fn tag(
    target: &dyn Target,
    reference: &str,
    new_tags: &[String],
    concurrency: usize,
) -> OrcaResult<(Descriptor, Vec<String>)> {
    if new_tags.is_empty() {
        return Err(OrcaError::User("no tags given".to_string()));
    }
    let desc = resolve_root(target, reference).await?;
    let committed = tag_all(target, &desc, new_tags, concurrency).await?;
    info!(digest = %desc.digest, tags = committed.len(), "Tagged artifact");
    Ok((desc, committed))
}

/// An artifact and the artifacts referring to it
#[derive(Debug, Clone, PartialEq)]
pub struct ReferrerNode {
    pub descriptor: Descriptor,
    pub children: Vec<ReferrerNode>,
}

impl ReferrerNode {
    /// Number of referrers below this node
    pub fn count(&self) -> usize {
        self.children.iter().map(|c| 1 + c.count()).sum()
    }
}

/// Build the referrers tree of `reference`.
///
/// `depth` limits how many levels are expanded; `None` expands until no
/// new referrer appears.
pub async fn discover(
    target: &dyn Target,
    reference: &str,
    artifact_type: Option<&str>,
    mode: ReferrersMode,
    depth: Option<usize>,
) -> OrcaResult<ReferrerNode> {
    let root = resolve_root(target, reference).await?;
    let mut seen = HashSet::from([root.digest.clone()]);
    expand(target, root, artifact_type, mode, depth, &mut seen).await
}

fn expand<'a>(
    target: &'a dyn Target,
    descriptor: Descriptor,
    artifact_type: Option<&'a str>,
    mode: ReferrersMode,
    depth: Option<usize>,
    seen: &'a mut HashSet<Digest>,
) -> BoxFuture<'a, OrcaResult<ReferrerNode>> {
    async move {
        if depth == Some(0) {
            return Ok(ReferrerNode {
                descriptor,
                children: Vec::new(),
            });
        }
        let mut children = Vec::new();
        for referrer in find_referrers(target, &descriptor, mode, artifact_type).await? {
            if !seen.insert(referrer.digest.clone()) {
                continue;
            }
            let child = expand(
                target,
                referrer,
                artifact_type,
                mode,
                depth.map(|d| d - 1),
                &mut *seen,
            )
            .await?;
            children.push(child);
        }
        Ok(ReferrerNode {
            descriptor,
            children,
        })
    }
    .boxed()
}

/// Options for [`delete`]
#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteOptions {
    pub referrers: ReferrersMode,
    pub skip_gc: bool,
}

/// Result of [`delete`]
#[derive(Debug)]
pub struct DeleteOutcome {
    pub deleted: Descriptor,
    /// Soft failures while updating the referrers index
    pub warnings: Vec<OrcaError>,
}

/// Delete the manifest or blob `reference` resolves to.
///
/// A deleted manifest with a subject is dropped from the subject's
/// referrers index on targets using the tag scheme.
pub async fn delete(
    target: &dyn Target,
    reference: &str,
    opts: &DeleteOptions,
) -> OrcaResult<DeleteOutcome> {
    let deleter = target
        .as_deleter()
        .ok_or_else(|| OrcaError::Unsupported(format!("{} does not support deletion", target.name())))?;
    let desc = target.resolve(reference).await?;

    let subject = if desc.is_manifest() {
        let content = read_all(target.fetch(&desc).await?, &desc).await?;
        parse_successors(&desc, &content)?.subject
    } else {
        None
    };

    deleter.delete(&desc).await?;
    info!(digest = %desc.digest, target = %target.name(), "Deleted");

    let mut warnings = Vec::new();
    if let Some(subject) = subject.filter(|_| opts.referrers.uses_tag_scheme(target)) {
        if let Err(e) = remove_referrer(target, &subject, &desc.digest, opts.skip_gc).await {
            warn!(subject = %subject.digest, error = %e, "Referrers index not updated");
            warnings.push(e);
        }
    }
    Ok(DeleteOutcome {
        deleted: desc,
        warnings,
    })
}
