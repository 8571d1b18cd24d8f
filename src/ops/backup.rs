//! Back up artifacts into an OCI layout and restore them from one

use crate::content::Descriptor;
use crate::copy::{copy_graph, extended_copy, CopyGraphOptions, CopyReport, ExtendedCopyOptions};
use crate::error::{OrcaError, OrcaResult};
use crate::ops::resolve_root;
use crate::target::reference::Reference;
use crate::target::{OciLayout, ReadOnly, Target};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// Options for [`backup`]
#[derive(Debug, Clone, Default)]
pub struct BackupOptions {
    pub graph: CopyGraphOptions,
    /// Copy only the artifacts themselves, not what refers to them
    pub exclude_referrers: bool,
    pub artifact_type: Option<String>,
}

/// Options for [`restore`]
#[derive(Debug, Clone, Default)]
pub struct RestoreOptions {
    /// Graph options; `dry_run` reports what would be copied
    pub graph: CopyGraphOptions,
    pub exclude_referrers: bool,
    pub artifact_type: Option<String>,
}

async fn copy_one(
    src: &dyn Target,
    dst: &dyn Target,
    root: &Descriptor,
    graph: &CopyGraphOptions,
    exclude_referrers: bool,
    artifact_type: Option<&str>,
) -> OrcaResult<CopyReport> {
    if exclude_referrers {
        return copy_graph(src, dst, root, graph).await;
    }
    let opts = ExtendedCopyOptions {
        graph: graph.clone(),
        depth: None,
        artifact_type: artifact_type.map(str::to_string),
    };
    extended_copy(src, dst, root, &opts).await
}

/// Tag `root` at `dst` when `reference` is a tag and this is not a dry run
async fn tag_if_named(
    dst: &dyn Target,
    root: &Descriptor,
    reference: &str,
    dry_run: bool,
) -> OrcaResult<()> {
    if dry_run {
        return Ok(());
    }
    match Reference::from_str(reference)? {
        Reference::Tag(tag) => dst.tag(root, &tag).await,
        Reference::Digest(_) => Ok(()),
    }
}

/// Copy each of `references` from `src` into the layout at `layout_dir`.
///
/// The layout is created when missing. Tags are kept under the same
/// name, so a later [`restore`] without references brings all back.
pub async fn backup(
    src: &dyn Target,
    references: &[String],
    layout_dir: &Path,
    opts: &BackupOptions,
) -> OrcaResult<CopyReport> {
    if references.is_empty() {
        return Err(OrcaError::User("nothing to back up: no references given".to_string()));
    }
    let layout = OciLayout::open(layout_dir).await?;

    let mut report = CopyReport::default();
    for reference in references {
        let root = resolve_root(src, reference).await?;
        let part = copy_one(
            src,
            &layout,
            &root,
            &opts.graph,
            opts.exclude_referrers,
            opts.artifact_type.as_deref(),
        )
        .await?;
        tag_if_named(&layout, &root, reference, opts.graph.dry_run).await?;
        debug!(reference = %reference, digest = %root.digest, copied = part.copied, "Backed up");
        report.merge(part);
    }

    info!(
        layout = %layout_dir.display(),
        references = references.len(),
        copied = report.copied,
        skipped = report.skipped,
        "Backup complete"
    );
    Ok(report)
}

/// Copy `references` out of the layout at `layout_dir` into `dst`.
///
/// With no references every tag in the layout is restored. The layout is
/// only read, never modified.
pub async fn restore(
    layout_dir: &Path,
    dst: &dyn Target,
    references: &[String],
    opts: &RestoreOptions,
) -> OrcaResult<CopyReport> {
    let layout = OciLayout::open_existing(layout_dir).await?;
    let references = if references.is_empty() {
        layout.tags().await
    } else {
        references.to_vec()
    };
    if references.is_empty() {
        return Err(OrcaError::User(format!(
            "{} has no tags to restore",
            layout_dir.display()
        )));
    }
    let src = ReadOnly::new(layout);

    let mut report = CopyReport::default();
    for reference in &references {
        let root = src.resolve(reference).await?;
        let part = copy_one(
            &src,
            dst,
            &root,
            &opts.graph,
            opts.exclude_referrers,
            opts.artifact_type.as_deref(),
        )
        .await?;
        tag_if_named(dst, &root, reference, opts.graph.dry_run).await?;
        debug!(reference = %reference, digest = %root.digest, copied = part.copied, "Restored");
        report.merge(part);
    }

    info!(
        layout = %layout_dir.display(),
        references = references.len(),
        copied = report.copied,
        would_copy = report.would_copy,
        "Restore complete"
    );
    Ok(report)
}
