//! Post-order graph copy

use crate::content::{bytes_reader, read_all, ContentKey, Descriptor};
use crate::copy::visited::VisitedSet;
use crate::copy::{CopyGraphOptions, CopyReport};
use crate::error::{OrcaError, OrcaResult};
use crate::referrers;
use crate::successors::parse_successors;
use crate::target::graph::referrer_descriptor;
use crate::target::{Capabilities, Target};
use bytes::Bytes;
use futures_util::future::{try_join_all, BoxFuture, FutureExt};
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{debug, trace, warn};

/// Copy `root` and everything it references from `src` to `dst`.
///
/// Children are pushed before their parents, so a manifest only appears
/// at the destination once its whole graph is there. Nodes the
/// destination already holds are skipped with their subtrees.
pub async fn copy_graph(
    src: &dyn Target,
    dst: &dyn Target,
    root: &Descriptor,
    opts: &CopyGraphOptions,
) -> OrcaResult<CopyReport> {
    let walker = Walker::new(src, dst, opts);
    walker.copy(root.clone()).await?;
    Ok(walker.finish(root))
}

#[derive(Debug, Default)]
struct Stats {
    copied: AtomicUsize,
    mounted: AtomicUsize,
    skipped: AtomicUsize,
    would_copy: AtomicUsize,
    bytes: AtomicU64,
}

/// State shared by every node of one copy (or one extended copy)
pub(crate) struct Walker<'a> {
    src: &'a dyn Target,
    dst: &'a dyn Target,
    opts: &'a CopyGraphOptions,
    limiter: Semaphore,
    visited: VisitedSet,
    mount_sources: Vec<String>,
    index_referrers: bool,
    referrers_lock: tokio::sync::Mutex<()>,
    stats: Stats,
    warnings: Mutex<Vec<OrcaError>>,
}

impl<'a> Walker<'a> {
    pub fn new(src: &'a dyn Target, dst: &'a dyn Target, opts: &'a CopyGraphOptions) -> Self {
        let caps = Capabilities::of(dst);
        let mount_sources = if caps.mount {
            mount_sources(src, dst, &opts.mount_from)
        } else {
            Vec::new()
        };
        let index_referrers = !opts.dry_run && opts.referrers.uses_tag_scheme_for(caps);
        debug!(
            src = %src.name(),
            dst = %dst.name(),
            concurrency = opts.concurrency,
            mount_sources = mount_sources.len(),
            index_referrers,
            "Starting graph copy"
        );
        Self {
            src,
            dst,
            opts,
            limiter: Semaphore::new(opts.concurrency.max(1)),
            visited: VisitedSet::new(),
            mount_sources,
            index_referrers,
            referrers_lock: tokio::sync::Mutex::new(()),
            stats: Stats::default(),
            warnings: Mutex::new(Vec::new()),
        }
    }

    pub fn source(&self) -> &'a dyn Target {
        self.src
    }

    /// Copy a root; nodes already visited by this walker are not redone
    pub async fn copy(&self, root: Descriptor) -> OrcaResult<()> {
        self.copy_node(root).await
    }

    pub fn finish(self, root: &Descriptor) -> CopyReport {
        let warnings = self.warnings.into_inner().unwrap_or_default();
        CopyReport {
            root: Some(root.clone()),
            copied: self.stats.copied.into_inner(),
            mounted: self.stats.mounted.into_inner(),
            skipped: self.stats.skipped.into_inner(),
            would_copy: self.stats.would_copy.into_inner(),
            bytes_copied: self.stats.bytes.into_inner(),
            warnings,
        }
    }

    fn copy_node(&self, desc: Descriptor) -> BoxFuture<'_, OrcaResult<()>> {
        async move {
            let cell = self.visited.claim(ContentKey::of(&desc));
            cell.get_or_try_init(|| self.visit(desc)).await.map(|_| ())
        }
        .boxed()
    }

    /// Report a node the destination already holds, with its subtree
    fn skip_node(&self, desc: Descriptor) -> BoxFuture<'_, OrcaResult<()>> {
        async move {
            let cell = self.visited.claim(ContentKey::of(&desc));
            cell.get_or_try_init(|| self.report_existing(desc))
                .await
                .map(|_| ())
        }
        .boxed()
    }

    async fn visit(&self, desc: Descriptor) -> OrcaResult<()> {
        let exists = {
            let _permit = self.permit().await?;
            self.guard(self.dst.exists(&desc)).await?
        };
        if exists {
            return self.report_existing(desc).await;
        }

        if !desc.is_manifest() {
            if self.opts.prune_unnamed_leaves && desc.title().is_none() {
                trace!(digest = %desc.digest, "Pruned unnamed leaf");
                self.skipped(&desc);
                return Ok(());
            }
            if self.opts.dry_run {
                self.would_copy(&desc);
                return Ok(());
            }
            return self.copy_blob(&desc).await;
        }

        let content = self.fetch_manifest(&desc).await?;
        let successors = parse_successors(&desc, &content)?;
        let subject = successors.subject.clone();
        let children = successors
            .descriptors()
            .into_iter()
            .chain(subject.iter().cloned())
            .map(|child| self.copy_node(child));
        try_join_all(children).await?;

        if self.opts.dry_run {
            self.would_copy(&desc);
            return Ok(());
        }

        {
            let _permit = self.permit().await?;
            self.guard(self.dst.push(&desc, bytes_reader(content.clone())))
                .await?;
        }
        self.copied(&desc);

        if let Some(subject) = subject.filter(|_| self.index_referrers) {
            self.index_referrer(&subject, &desc, &content).await;
        }
        Ok(())
    }

    async fn report_existing(&self, desc: Descriptor) -> OrcaResult<()> {
        self.skipped(&desc);
        if !desc.is_manifest() {
            return Ok(());
        }
        // Held by the destination, so its subtree is too; the source may lack it
        let content = self.read_manifest(self.dst, &desc).await?;
        let children = parse_successors(&desc, &content)?
            .descriptors()
            .into_iter()
            .map(|child| self.skip_node(child));
        try_join_all(children).await?;
        Ok(())
    }

    async fn fetch_manifest(&self, desc: &Descriptor) -> OrcaResult<Bytes> {
        self.read_manifest(self.src, desc).await
    }

    async fn read_manifest(&self, from: &dyn Target, desc: &Descriptor) -> OrcaResult<Bytes> {
        let _permit = self.permit().await?;
        self.guard(async {
            let reader = from.fetch(desc).await?;
            read_all(reader, desc).await
        })
        .await
    }

    async fn copy_blob(&self, desc: &Descriptor) -> OrcaResult<()> {
        if let Some(from) = self.try_mount(desc).await? {
            self.stats.mounted.fetch_add(1, Ordering::SeqCst);
            if let Some(observer) = &self.opts.observer {
                observer.on_mounted(desc, &from);
            }
            return Ok(());
        }

        let _permit = self.permit().await?;
        self.guard(async {
            let reader = self.src.fetch(desc).await?;
            self.dst.push(desc, reader).await
        })
        .await?;
        self.copied(desc);
        Ok(())
    }

    /// Mount `desc` from the first source repository that accepts it
    async fn try_mount(&self, desc: &Descriptor) -> OrcaResult<Option<String>> {
        let Some(mounter) = self.dst.as_mounter() else {
            return Ok(None);
        };
        for repository in &self.mount_sources {
            let _permit = self.permit().await?;
            match self.guard(mounter.mount(desc, repository)).await {
                Ok(()) => {
                    trace!(digest = %desc.digest, from = %repository, "Mounted");
                    return Ok(Some(repository.clone()));
                }
                Err(OrcaError::Cancelled) => return Err(OrcaError::Cancelled),
                Err(e) => {
                    debug!(digest = %desc.digest, from = %repository, error = %e, "Mount failed, copying instead");
                }
            }
        }
        Ok(None)
    }

    async fn index_referrer(&self, subject: &Descriptor, desc: &Descriptor, content: &[u8]) {
        let referrer = referrer_descriptor(desc, content);
        let _serial = self.referrers_lock.lock().await;
        if let Err(e) =
            referrers::add_referrer(self.dst, subject, &referrer, self.opts.skip_gc).await
        {
            let e = if e.is_soft() {
                e
            } else {
                OrcaError::ReferrersIndex {
                    subject: subject.digest.to_string(),
                    reason: e.to_string(),
                }
            };
            warn!(subject = %subject.digest, error = %e, "Referrers index not updated");
            if let Ok(mut warnings) = self.warnings.lock() {
                warnings.push(e);
            }
        }
    }

    async fn permit(&self) -> OrcaResult<SemaphorePermit<'_>> {
        self.guard(async {
            self.limiter
                .acquire()
                .await
                .map_err(|_| OrcaError::Internal("copy limiter closed".to_string()))
        })
        .await
    }

    /// Race `fut` against cancellation
    async fn guard<T>(&self, fut: impl Future<Output = OrcaResult<T>>) -> OrcaResult<T> {
        tokio::select! {
            biased;
            _ = self.opts.cancel.cancelled() => Err(OrcaError::Cancelled),
            result = fut => result,
        }
    }

    fn copied(&self, desc: &Descriptor) {
        self.stats.copied.fetch_add(1, Ordering::SeqCst);
        self.stats.bytes.fetch_add(desc.size, Ordering::SeqCst);
        if let Some(observer) = &self.opts.observer {
            observer.on_copied(desc);
        }
    }

    fn skipped(&self, desc: &Descriptor) {
        self.stats.skipped.fetch_add(1, Ordering::SeqCst);
        if let Some(observer) = &self.opts.observer {
            observer.on_skipped(desc);
        }
    }

    fn would_copy(&self, desc: &Descriptor) {
        self.stats.would_copy.fetch_add(1, Ordering::SeqCst);
        if let Some(observer) = &self.opts.observer {
            observer.on_would_copy(desc);
        }
    }
}

/// Repositories blobs may be mounted from, computed once per copy
fn mount_sources(src: &dyn Target, dst: &dyn Target, extra: &[String]) -> Vec<String> {
    let mut sources = Vec::new();
    if let (Some(from), Some(to)) = (src.location(), dst.location()) {
        if from.registry == to.registry && from.repository != to.repository {
            sources.push(from.repository);
        }
    }
    for repository in extra {
        if !sources.contains(repository) {
            sources.push(repository.clone());
        }
    }
    sources
}
