//! Restore an artifact's named files into a directory

use crate::content::manifest::ImageManifest;
use crate::content::media_type::Dialect;
use crate::content::{read_all, Descriptor, VerifyReader};
use crate::copy::{copy_graph, extended_copy, CopyGraphOptions, CopyReport, ExtendedCopyOptions};
use crate::error::{from_io, OrcaError, OrcaResult};
use crate::ops::resolve_root;
use crate::target::{FileStore, Target};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::info;

/// Options for [`pull`]
#[derive(Debug, Clone, Default)]
pub struct PullOptions {
    pub copy: CopyGraphOptions,
    /// Also pull artifacts referring to the root
    pub include_referrers: bool,
    /// Restrict followed referrers to this artifact type
    pub artifact_type: Option<String>,
    /// Write the config blob to this path, relative to the output directory
    pub config_path: Option<PathBuf>,
}

/// Result of [`pull`]
#[derive(Debug)]
pub struct PullOutcome {
    pub root: Descriptor,
    /// Files written, relative to the output directory
    pub files: Vec<PathBuf>,
    pub report: CopyReport,
}

/// Pull `reference` from `src`, writing titled blobs under `output`
pub async fn pull(
    src: &dyn Target,
    reference: &str,
    output: &Path,
    opts: &PullOptions,
) -> OrcaResult<PullOutcome> {
    let root = resolve_root(src, reference).await?;
    let store = FileStore::open(output).await?;

    let graph = CopyGraphOptions {
        prune_unnamed_leaves: true,
        ..opts.copy.clone()
    };
    let report = if opts.include_referrers {
        let extended = ExtendedCopyOptions {
            graph,
            depth: None,
            artifact_type: opts.artifact_type.clone(),
        };
        extended_copy(src, &store, &root, &extended).await?
    } else {
        copy_graph(src, &store, &root, &graph).await?
    };

    let mut files = store.written();
    if let Some(config_path) = &opts.config_path {
        if !opts.copy.dry_run {
            write_config(src, &root, &output.join(config_path)).await?;
            files.push(config_path.clone());
        }
    }

    info!(
        digest = %root.digest,
        files = files.len(),
        skipped = report.skipped,
        "Pulled artifact"
    );
    Ok(PullOutcome {
        root,
        files,
        report,
    })
}

async fn write_config(src: &dyn Target, root: &Descriptor, path: &Path) -> OrcaResult<()> {
    if !matches!(root.dialect(), Dialect::OciManifest | Dialect::DockerManifest) {
        return Err(OrcaError::User(format!(
            "{} has no config: it is a {}",
            root.digest, root.media_type
        )));
    }
    let content = read_all(src.fetch(root).await?, root).await?;
    let manifest: ImageManifest =
        serde_json::from_slice(&content).map_err(|e| OrcaError::ManifestParse {
            digest: root.digest.to_string(),
            reason: e.to_string(),
        })?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| OrcaError::io(format!("creating {}", parent.display()), e))?;
    }
    let reader = src.fetch(&manifest.config).await?;
    let mut verified = VerifyReader::new(reader, &manifest.config);
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| OrcaError::io(format!("creating {}", path.display()), e))?;
    tokio::io::copy(&mut verified, &mut file)
        .await
        .map_err(|e| from_io(format!("writing {}", path.display()), e))?;
    file.flush()
        .await
        .map_err(|e| OrcaError::io(format!("writing {}", path.display()), e))
}
