//! CLI command implementations

pub mod backup;
pub mod cache;
pub mod config;
pub mod copy;
pub mod delete;
pub mod discover;
pub mod pull;
pub mod push;
pub mod tag;

pub use backup::{backup, restore};
pub use cache::execute as cache;
pub use config::execute as config;
pub use copy::execute as copy;
pub use delete::execute as delete;
pub use discover::execute as discover;
pub use pull::execute as pull;
pub use push::execute as push;
pub use tag::execute as tag;

use crate::cache as content_cache;
use crate::cli::args::CopyFlags;
use crate::config::Config;
use crate::copy::{CopyGraphOptions, CopyReport};
use crate::error::{OrcaError, OrcaResult};
use crate::target::{LayoutReference, OciLayout, Target};
use crate::ui::{self, UiContext};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Graph options from command flags layered over the config file
pub(crate) fn graph_options(flags: &CopyFlags, config: &Config, dry_run: bool) -> CopyGraphOptions {
    CopyGraphOptions {
        concurrency: flags.concurrency.unwrap_or(config.copy.concurrency).max(1),
        referrers: flags.referrers.unwrap_or(config.copy.referrers),
        skip_gc: flags.skip_gc || config.copy.skip_gc,
        dry_run,
        cancel: cancel_on_interrupt(),
        ..Default::default()
    }
}

/// Put `layout` behind the content cache unless caching is off
pub(crate) async fn behind_cache(
    layout: OciLayout,
    no_cache: bool,
    config: &Config,
) -> OrcaResult<Arc<dyn Target>> {
    let origin: Arc<dyn Target> = Arc::new(layout);
    if no_cache {
        return Ok(origin);
    }
    let roots = content_cache::cache_roots(config.cache.root.as_deref());
    let cache = content_cache::open(&roots).await?;
    if cache.is_some() {
        debug!(roots = roots.len(), "Reading through cache");
    }
    Ok(content_cache::wrap(origin, cache))
}

/// The tag or digest of a layout argument, required by the command
pub(crate) fn required_reference(target: &LayoutReference) -> OrcaResult<String> {
    target
        .reference
        .as_ref()
        .map(ToString::to_string)
        .ok_or_else(|| {
            OrcaError::User(format!(
                "{} names no artifact; use {}:<tag> or {}@<digest>",
                target,
                target.path.display(),
                target.path.display()
            ))
        })
}

/// Token cancelled when the user presses Ctrl-C
fn cancel_on_interrupt() -> CancellationToken {
    let token = CancellationToken::new();
    let on_signal = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling in-flight transfers");
            on_signal.cancel();
        }
    });
    token
}

/// Print node counts and any soft failures of a copy
pub(crate) fn summarize(ctx: &UiContext, report: &CopyReport) {
    if report.would_copy > 0 {
        ui::key_value(ctx, "Would copy", &report.would_copy.to_string());
    } else {
        ui::key_value(
            ctx,
            "Copied",
            &format!("{} ({} bytes)", report.copied, report.bytes_copied),
        );
    }
    if report.mounted > 0 {
        ui::key_value(ctx, "Mounted", &report.mounted.to_string());
    }
    ui::key_value(ctx, "Existing", &report.skipped.to_string());
    print_warnings(ctx, &report.warnings);
}

/// Print soft failures with their hints
pub(crate) fn print_warnings(ctx: &UiContext, warnings: &[OrcaError]) {
    for warning in warnings {
        match warning.hint() {
            Some(hint) => ui::step_warn_hint(ctx, &warning.to_string(), hint),
            None => ui::step_warn(ctx, &warning.to_string()),
        }
    }
}
