//! Backup and restore commands - move artifacts through a backup layout

use super::{behind_cache, graph_options, summarize};
use crate::cli::args::{BackupArgs, RestoreArgs};
use crate::config::Config;
use crate::error::{OrcaError, OrcaResult};
use crate::ops::{self, BackupOptions, RestoreOptions};
use crate::target::OciLayout;
use crate::ui::{self, CopyProgress, UiContext};

/// Execute the backup command
pub async fn backup(args: BackupArgs, config: &Config) -> OrcaResult<()> {
    let ctx = UiContext::detect();
    let layout = OciLayout::open_existing(&args.source.path).await?;

    let references = if !args.references.is_empty() {
        args.references
    } else if let Some(reference) = &args.source.reference {
        vec![reference.to_string()]
    } else {
        layout.tags().await
    };
    if references.is_empty() {
        return Err(OrcaError::User(format!(
            "{} has no tags; name what to back up with --ref",
            args.source.path.display()
        )));
    }
    let src = behind_cache(layout, args.no_cache, config).await?;

    let progress = CopyProgress::new(&ctx, "Backing up");
    let mut graph = graph_options(&args.flags, config, false);
    graph.observer = Some(progress.clone());
    let opts = BackupOptions {
        graph,
        exclude_referrers: args.exclude_referrers,
        artifact_type: args.artifact_type,
    };

    let result = ops::backup(&*src, &references, &args.output, &opts).await;
    progress.finish();
    let report = result?;

    summarize(&ctx, &report);
    ui::outro_success(
        &ctx,
        &format!(
            "Backed up {} to {}",
            references.join(", "),
            args.output.display()
        ),
    );
    Ok(())
}

/// Execute the restore command
pub async fn restore(args: RestoreArgs, config: &Config) -> OrcaResult<()> {
    let ctx = UiContext::detect();
    let dst = OciLayout::open(&args.destination).await?;

    let progress = CopyProgress::new(&ctx, "Restoring");
    let mut graph = graph_options(&args.flags, config, args.dry_run);
    graph.observer = Some(progress.clone());
    let opts = RestoreOptions {
        graph,
        exclude_referrers: args.exclude_referrers,
        artifact_type: args.artifact_type,
    };

    let result = ops::restore(&args.input, &dst, &args.references, &opts).await;
    progress.finish();
    let report = result?;

    summarize(&ctx, &report);
    if args.dry_run {
        ui::outro_warn(&ctx, "Dry run: nothing was written");
    } else {
        ui::outro_success(
            &ctx,
            &format!(
                "Restored {} into {}",
                args.input.display(),
                args.destination.display()
            ),
        );
    }
    Ok(())
}
