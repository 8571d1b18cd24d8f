//! Push command - package files as an artifact in a layout

use super::{graph_options, summarize};
use crate::cli::args::PushArgs;
use crate::config::Config;
use crate::error::OrcaResult;
use crate::ops::{self, PushOptions};
use crate::target::{OciLayout, Target};
use crate::ui::{self, CopyProgress, UiContext};

/// Tag used when the destination names none
const DEFAULT_TAG: &str = "latest";

/// Execute the push command
pub async fn execute(args: PushArgs, config: &Config) -> OrcaResult<()> {
    let ctx = UiContext::detect();
    let dst = OciLayout::open(&args.destination.path).await?;
    let reference = args.destination.reference_or(DEFAULT_TAG);

    let subject = match &args.subject {
        Some(subject) => Some(dst.resolve(subject).await?),
        None => None,
    };

    let progress = CopyProgress::new(&ctx, "Pushing");
    let mut copy = graph_options(&args.flags, config, false);
    copy.observer = Some(progress.clone());
    let opts = PushOptions {
        artifact_type: args.artifact_type,
        default_media_type: args.media_type,
        config: args.config_file,
        annotations: args.annotation.into_iter().collect(),
        subject,
        extra_tags: args.tag,
        copy,
    };

    let result = ops::push_files(&dst, &reference, &args.files, &opts).await;
    progress.finish();
    let outcome = result?;

    summarize(&ctx, &outcome.report);
    ui::key_value(&ctx, "Digest", &outcome.manifest.digest.to_string());
    if !outcome.tags.is_empty() {
        ui::key_value(&ctx, "Tags", &outcome.tags.join(", "));
    }
    ui::outro_success(
        &ctx,
        &format!(
            "Pushed {} file(s) to {}",
            args.files.len(),
            args.destination.path.display()
        ),
    );
    Ok(())
}
