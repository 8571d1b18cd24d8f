//! Copy an artifact between targets

use crate::content::Descriptor;
use crate::copy::{copy_graph, extended_copy, tag_all, CopyGraphOptions, CopyReport, ExtendedCopyOptions};
use crate::error::{OrcaError, OrcaResult};
use crate::ops::resolve_root;
use crate::target::reference::Reference;
use crate::target::Target;
use std::str::FromStr;
use tracing::info;

/// Options for [`copy`]
#[derive(Debug, Clone, Default)]
pub struct CopyOptions {
    pub graph: CopyGraphOptions,
    /// Follow referrers of the root (extended copy)
    pub recursive: bool,
    /// Rounds of referrer discovery; `None` runs to a fixed point
    pub depth: Option<usize>,
    pub artifact_type: Option<String>,
    pub extra_tags: Vec<String>,
}

/// Result of [`copy`]
#[derive(Debug)]
pub struct CopyOutcome {
    pub root: Descriptor,
    pub report: CopyReport,
    /// References committed at the destination
    pub tags: Vec<String>,
}

/// Copy `src_ref` from `src` to `dst`.
///
/// The destination is tagged `dst_ref`, or `src_ref` when no destination
/// reference is given and the source reference is a tag. A digest
/// destination reference must name the copied root.
pub async fn copy(
    src: &dyn Target,
    src_ref: &str,
    dst: &dyn Target,
    dst_ref: Option<&str>,
    opts: &CopyOptions,
) -> OrcaResult<CopyOutcome> {
    let root = resolve_root(src, src_ref).await?;

    let tag = match dst_ref.filter(|r| !r.is_empty()) {
        Some(reference) => match Reference::from_str(reference)? {
            Reference::Digest(digest) if digest != root.digest => {
                return Err(OrcaError::InvalidReference {
                    reference: reference.to_string(),
                    reason: format!("source resolved to {}", root.digest),
                });
            }
            Reference::Digest(_) => None,
            Reference::Tag(tag) => Some(tag),
        },
        None => match Reference::from_str(src_ref) {
            Ok(Reference::Tag(tag)) => Some(tag),
            _ => None,
        },
    };

    let report = if opts.recursive {
        let extended = ExtendedCopyOptions {
            graph: opts.graph.clone(),
            depth: opts.depth,
            artifact_type: opts.artifact_type.clone(),
        };
        extended_copy(src, dst, &root, &extended).await?
    } else {
        copy_graph(src, dst, &root, &opts.graph).await?
    };

    let mut tags = Vec::new();
    if !opts.graph.dry_run {
        if let Some(tag) = tag {
            dst.tag(&root, &tag).await?;
            tags.push(tag);
        }
        if !opts.extra_tags.is_empty() {
            tags.extend(tag_all(dst, &root, &opts.extra_tags, opts.graph.concurrency).await?);
        }
    }

    info!(
        src = %src.name(),
        dst = %dst.name(),
        digest = %root.digest,
        copied = report.copied,
        skipped = report.skipped,
        "Copied artifact"
    );
    Ok(CopyOutcome { root, report, tags })
}
