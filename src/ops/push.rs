//! Package files as an artifact and push it

use crate::content::manifest::ImageManifest;
use crate::content::{annotations, media_type, Descriptor};
use crate::copy::{copy_graph, tag_all, CopyGraphOptions, CopyReport};
use crate::error::{OrcaError, OrcaResult};
use crate::target::reference::Reference;
use crate::target::{MemoryStore, Target};
use bytes::Bytes;
use chrono::{SecondsFormat, Utc};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

/// Artifact type used when an artifact has neither a config nor a type
pub const UNKNOWN_ARTIFACT_TYPE: &str = "application/vnd.unknown.artifact.v1";

/// A file to push, written `path[:media-type]` on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSpec {
    pub path: PathBuf,
    pub media_type: Option<String>,
}

impl FileSpec {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            media_type: None,
        }
    }
}

impl FromStr for FileSpec {
    type Err = OrcaError;

    fn from_str(s: &str) -> OrcaResult<Self> {
        // Media types always contain '/', paths with ':' keep their colon
        match s.rsplit_once(':') {
            Some((path, media_type)) if !path.is_empty() && media_type.contains('/') => Ok(Self {
                path: PathBuf::from(path),
                media_type: Some(media_type.to_string()),
            }),
            _ if s.is_empty() => Err(OrcaError::User("empty file argument".to_string())),
            _ => Ok(Self::new(s)),
        }
    }
}

/// Options for [`push_files`]
#[derive(Debug, Clone, Default)]
pub struct PushOptions {
    pub artifact_type: Option<String>,
    /// Media type for files without their own
    pub default_media_type: Option<String>,
    /// File holding the config blob; an empty `{}` config is used otherwise
    pub config: Option<FileSpec>,
    /// Manifest annotations, in addition to the creation time
    pub annotations: BTreeMap<String, String>,
    /// Manifest this artifact refers to
    pub subject: Option<Descriptor>,
    pub extra_tags: Vec<String>,
    pub copy: CopyGraphOptions,
}

/// Result of [`push_files`]
#[derive(Debug)]
pub struct PushOutcome {
    pub manifest: Descriptor,
    pub tags: Vec<String>,
    pub report: CopyReport,
}

async fn read_file(path: &Path) -> OrcaResult<Bytes> {
    tokio::fs::read(path)
        .await
        .map(Bytes::from)
        .map_err(|e| OrcaError::io(format!("reading {}", path.display()), e))
}

fn title_of(path: &Path) -> OrcaResult<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| OrcaError::PathInvalid {
            path: path.to_path_buf(),
            reason: "not a file name".to_string(),
        })
}

/// Stage an artifact from `files` and push it to `dst` under `reference`.
///
/// Layers are titled with their file names. The manifest is pushed only
/// after every blob, then tagged; extra tags follow.
pub async fn push_files(
    dst: &dyn Target,
    reference: &str,
    files: &[FileSpec],
    opts: &PushOptions,
) -> OrcaResult<PushOutcome> {
    let staging = MemoryStore::new();
    let default_type = opts
        .default_media_type
        .as_deref()
        .unwrap_or(media_type::DEFAULT_BLOB);

    let mut titles = HashSet::new();
    let mut layers = Vec::with_capacity(files.len());
    for file in files {
        let title = title_of(&file.path)?;
        if !titles.insert(title.clone()) {
            return Err(OrcaError::User(format!("duplicate file name: {}", title)));
        }
        let content = read_file(&file.path).await?;
        let desc = Descriptor::from_bytes(file.media_type.as_deref().unwrap_or(default_type), &content)
            .with_annotation(annotations::TITLE, &title);
        staging.put(&desc, content)?;
        debug!(file = %file.path.display(), digest = %desc.digest, "Staged file");
        layers.push(desc);
    }

    let (config, artifact_type) = match &opts.config {
        Some(spec) => {
            let content = read_file(&spec.path).await?;
            let desc = Descriptor::from_bytes(
                spec.media_type.as_deref().unwrap_or(media_type::OCI_CONFIG),
                &content,
            );
            staging.put(&desc, content)?;
            (desc, opts.artifact_type.clone())
        }
        None => {
            let desc = Descriptor::from_bytes(media_type::OCI_EMPTY, b"{}");
            staging.put(&desc, Bytes::from_static(b"{}"))?;
            let artifact_type = opts
                .artifact_type
                .clone()
                .unwrap_or_else(|| UNKNOWN_ARTIFACT_TYPE.to_string());
            (desc, Some(artifact_type))
        }
    };

    let mut manifest = ImageManifest::new(config, layers);
    manifest.artifact_type = artifact_type;
    manifest.subject = opts.subject.as_ref().map(Descriptor::plain);
    let mut doc_annotations = opts.annotations.clone();
    doc_annotations
        .entry(annotations::CREATED.to_string())
        .or_insert_with(|| Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true));
    manifest.annotations = Some(doc_annotations);

    let content = serde_json::to_vec(&manifest)?;
    let mut manifest_desc = Descriptor::from_bytes(media_type::OCI_MANIFEST, &content);
    staging.put(&manifest_desc, Bytes::from(content))?;
    manifest_desc.artifact_type = manifest.artifact_type.clone();

    let report = copy_graph(&staging, dst, &manifest_desc, &opts.copy).await?;

    let mut tags = Vec::new();
    if !reference.is_empty() && !Reference::from_str(reference)?.is_digest() {
        dst.tag(&manifest_desc, reference).await?;
        tags.push(reference.to_string());
    }
    if !opts.extra_tags.is_empty() {
        tags.extend(tag_all(dst, &manifest_desc, &opts.extra_tags, opts.copy.concurrency).await?);
    }

    info!(
        digest = %manifest_desc.digest,
        files = files.len(),
        copied = report.copied,
        skipped = report.skipped,
        "Pushed artifact"
    );
    Ok(PushOutcome {
        manifest: manifest_desc,
        tags,
        report,
    })
}
