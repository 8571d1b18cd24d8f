//! Pull command - write an artifact's files to a directory

use super::{behind_cache, graph_options, required_reference, summarize};
use crate::cli::args::PullArgs;
use crate::config::Config;
use crate::error::OrcaResult;
use crate::ops::{self, PullOptions};
use crate::target::OciLayout;
use crate::ui::{self, CopyProgress, UiContext};

/// Execute the pull command
pub async fn execute(args: PullArgs, config: &Config) -> OrcaResult<()> {
    let ctx = UiContext::detect();
    let reference = required_reference(&args.source)?;
    let src = behind_cache(
        OciLayout::open_existing(&args.source.path).await?,
        args.no_cache,
        config,
    )
    .await?;

    let progress = CopyProgress::new(&ctx, "Pulling");
    let mut copy = graph_options(&args.flags, config, args.dry_run);
    copy.observer = Some(progress.clone());
    let opts = PullOptions {
        copy,
        include_referrers: args.include_referrers,
        artifact_type: args.artifact_type,
        config_path: args.config_path,
    };

    let result = ops::pull(&*src, &reference, &args.output, &opts).await;
    progress.finish();
    let outcome = result?;

    summarize(&ctx, &outcome.report);
    for file in &outcome.files {
        ui::step_ok(&ctx, &args.output.join(file).display().to_string());
    }
    if args.dry_run {
        ui::outro_warn(&ctx, "Dry run: no files were written");
    } else {
        ui::outro_success(
            &ctx,
            &format!(
                "Pulled {} file(s) from {}",
                outcome.files.len(),
                outcome.root.digest
            ),
        );
    }
    Ok(())
}
