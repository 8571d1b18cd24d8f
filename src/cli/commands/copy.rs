//! Copy command - replicate an artifact between layouts

use super::{behind_cache, graph_options, required_reference, summarize};
use crate::cli::args::CopyArgs;
use crate::config::Config;
use crate::error::OrcaResult;
use crate::ops::{self, CopyOptions};
use crate::target::{OciLayout, Reference};
use crate::ui::{self, CopyProgress, UiContext};

/// Execute the copy command
pub async fn execute(args: CopyArgs, config: &Config) -> OrcaResult<()> {
    let ctx = UiContext::detect();
    let src_ref = required_reference(&args.source)?;
    let src = behind_cache(
        OciLayout::open_existing(&args.source.path).await?,
        args.no_cache,
        config,
    )
    .await?;
    let dst = OciLayout::open(&args.destination.path).await?;

    let progress = CopyProgress::new(&ctx, "Copying");
    let mut graph = graph_options(&args.flags, config, args.dry_run);
    graph.observer = Some(progress.clone());
    let opts = CopyOptions {
        graph,
        recursive: args.recursive,
        depth: args.depth,
        artifact_type: args.artifact_type,
        extra_tags: args.tag,
    };
    let dst_ref = args.destination.reference.as_ref().map(Reference::to_string);

    let result = ops::copy(&*src, &src_ref, &dst, dst_ref.as_deref(), &opts).await;
    progress.finish();
    let outcome = result?;

    summarize(&ctx, &outcome.report);
    ui::key_value(&ctx, "Digest", &outcome.root.digest.to_string());
    if !outcome.tags.is_empty() {
        ui::key_value(&ctx, "Tags", &outcome.tags.join(", "));
    }
    if args.dry_run {
        ui::outro_warn(&ctx, "Dry run: nothing was written");
    } else {
        ui::outro_success(
            &ctx,
            &format!("Copied {} to {}", args.source, args.destination.path.display()),
        );
    }
    Ok(())
}
