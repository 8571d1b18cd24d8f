//! Cache command - inspect or clear the content cache

use crate::cache::{self, CACHE_ENV};
use crate::cli::args::{CacheAction, CacheArgs};
use crate::config::Config;
use crate::error::{OrcaError, OrcaResult};
use crate::ui::{self, UiContext};
use std::path::PathBuf;
use tokio::fs;
use tracing::debug;

/// Execute the cache command
pub async fn execute(args: CacheArgs, config: &Config) -> OrcaResult<()> {
    let roots = cache::cache_roots(config.cache.root.as_deref());
    let ctx = UiContext::detect();

    if roots.is_empty() {
        ui::step_warn_hint(
            &ctx,
            "No cache configured",
            &format!("Set {} or cache.root in the config file", CACHE_ENV),
        );
        return Ok(());
    }

    match args.action {
        CacheAction::Info => show_info(&ctx, &roots).await,
        CacheAction::Clear { yes } => clear(&ctx.with_auto_yes(yes), &roots).await,
    }
}

async fn show_info(ctx: &UiContext, roots: &[PathBuf]) -> OrcaResult<()> {
    for info in cache::info(roots).await? {
        ui::section(ctx, &info.root.display().to_string());
        ui::key_value(ctx, "Mode", if info.writable { "read-write" } else { "read-only" });
        ui::key_value(ctx, "Blobs", &info.usage.blobs.to_string());
        ui::key_value(ctx, "Size", &format_size(info.usage.bytes));
    }
    Ok(())
}

/// Remove the writable root; shared read-only roots are left alone
async fn clear(ctx: &UiContext, roots: &[PathBuf]) -> OrcaResult<()> {
    let Some(root) = roots.first() else {
        return Ok(());
    };
    if !root.exists() {
        ui::step_ok(ctx, "Cache is already empty");
        return Ok(());
    }

    let prompt = format!("Remove every blob cached in {}?", root.display());
    if !ui::confirm(ctx, &prompt, false).await? {
        ui::outro_warn(ctx, "Aborted (pass --yes to clear without asking)");
        return Ok(());
    }

    debug!(root = %root.display(), "Clearing cache");
    fs::remove_dir_all(root)
        .await
        .map_err(|e| OrcaError::io(format!("removing {}", root.display()), e))?;
    ui::outro_success(ctx, &format!("Cleared {}", root.display()));
    Ok(())
}

fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
